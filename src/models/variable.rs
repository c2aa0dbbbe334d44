// State store data model: scoped variables, variable groups, and the
// change event feed emitted on every mutation.
//
// Grounded in `original_source/core/state_manager.py`'s StateScope,
// StatePermission, StateVariableMeta, StateVariable, StateGroup, and
// StateChangeEvent classes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::value::Value;

/// Visibility/lifetime scope of a variable.
///
/// ## Rust Learning Notes:
/// Python's reference implementation represents this as a string enum.
/// Rust's `#[derive(Serialize, Deserialize)]` on a plain enum gives the same
/// wire format (lowercase variant names via `rename_all`) with compile-time
/// exhaustiveness instead of stringly-typed comparisons.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StateScope {
    /// Visible only within the step that created it.
    Step,
    /// Visible to the whole workflow run that created it.
    Workflow,
    /// Visible across workflow runs (process lifetime).
    Global,
    /// Visible only to the session that created it.
    Session,
}

/// Access control applied to reads/writes of a variable.
///
/// Grounded in `original_source/core/state_manager.py`'s `StatePermission`
/// enum (`read_only`, `read_write`, `private`, `shared`, `protected`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatePermission {
    ReadWrite,
    /// Rejects every write after the value set at creation.
    ReadOnly,
    /// Rejects writes from any requestor other than `owner_id`.
    Private,
    /// No additional restriction beyond `ReadWrite`; marks intent that the
    /// variable is meant to be read across steps/agents.
    Shared,
    /// Like `Private`, but also accepts requestors listed in `access_list`.
    Protected,
}

/// Metadata describing a variable's provenance and constraints, separate
/// from its current value so the value can be replaced without losing
/// history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VariableMeta {
    pub scope: StateScope,
    pub permission: StatePermission,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub created_by: Option<String>,
    pub description: Option<String>,
    /// Name of the type this variable was first assigned (`number`,
    /// `string`, ...). Subsequent writes must match unless the variable was
    /// declared untyped.
    pub value_type: Option<String>,
    /// Requestor id that owns the variable, checked by `Private`/`Protected`.
    pub owner_id: Option<String>,
    /// Additional requestor ids accepted by `Protected` permission.
    pub access_list: Vec<String>,
    /// Free-form labels; no semantics beyond grouping/filtering.
    pub tags: Vec<String>,
    /// Seconds since `updated_at` after which this variable is treated as
    /// absent (`spec.md` §3/§4.A: "a variable is treated as absent if
    /// `now − updated > ttl`"). `None` means no expiry.
    pub ttl_seconds: Option<u64>,
}

/// A single named, scoped, typed value held by the state store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Variable {
    pub name: String,
    pub value: Value,
    pub meta: VariableMeta,
}

impl Variable {
    pub fn new(name: impl Into<String>, value: Value, scope: StateScope) -> Self {
        let now = Utc::now();
        let value_type = value.type_name().to_string();
        Variable {
            name: name.into(),
            meta: VariableMeta {
                scope,
                permission: StatePermission::ReadWrite,
                created_at: now,
                updated_at: now,
                created_by: None,
                description: None,
                value_type: Some(value_type),
                owner_id: None,
                access_list: Vec::new(),
                tags: Vec::new(),
                ttl_seconds: None,
            },
            value,
        }
    }

    pub fn with_owner(mut self, owner_id: impl Into<String>) -> Self {
        self.meta.owner_id = Some(owner_id.into());
        self
    }

    pub fn with_permission(mut self, permission: StatePermission) -> Self {
        self.meta.permission = permission;
        self
    }

    pub fn with_ttl(mut self, ttl_seconds: u64) -> Self {
        self.meta.ttl_seconds = Some(ttl_seconds);
        self
    }

    /// Whether this variable should behave as absent right now, per
    /// `spec.md` §4.A's TTL rule.
    pub fn is_expired(&self) -> bool {
        match self.meta.ttl_seconds {
            Some(ttl) => {
                let age_ms = (Utc::now() - self.meta.updated_at).num_milliseconds();
                age_ms > ttl as i64 * 1000
            }
            None => false,
        }
    }
}

/// A named collection of variables sharing one scope, used when a step
/// needs to pass a bundle of related values (e.g. "request headers") as a
/// unit rather than one variable at a time.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct VariableGroup {
    pub name: String,
    pub description: Option<String>,
    /// Names of variables this group references. The group does not own
    /// the variables; it is a named view over a subset of the store for
    /// bulk operations.
    pub variable_names: Vec<String>,
}

impl VariableGroup {
    pub fn new(name: impl Into<String>) -> Self {
        VariableGroup {
            name: name.into(),
            description: None,
            variable_names: Vec::new(),
        }
    }

    pub fn add(&mut self, variable_name: impl Into<String>) {
        let name = variable_name.into();
        if !self.variable_names.contains(&name) {
            self.variable_names.push(name);
        }
    }
}

/// The kind of mutation a [`StateChangeEvent`] describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeEventKind {
    Created,
    Updated,
    Deleted,
}

/// A single recorded mutation of the state store, used both for audit and
/// for driving watchers that react to specific variables changing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateChangeEvent {
    pub id: Uuid,
    pub variable: String,
    pub kind: ChangeEventKind,
    pub old_value: Option<Value>,
    pub new_value: Option<Value>,
    pub scope: StateScope,
    /// Requestor id that performed the mutation, per `spec.md` §3's Change
    /// Event field list. `None` for writes made through the trusted,
    /// unchecked `set_value` path (internal callers like the Checkpoint
    /// Manager) rather than `set_value_as`.
    pub requestor: Option<String>,
    pub timestamp: DateTime<Utc>,
}
