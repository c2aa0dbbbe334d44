// State Store: scoped, typed variable storage with a change event feed.
//
// Grounded in `original_source/core/state_manager.py`'s StateManager class
// and in this crate's `engine::storage` teacher module's Repository-pattern
// shape (trait + concrete in-memory implementation behind an RwLock).

//! # State Store
//!
//! The State Store is the single source of truth for variables a running
//! workflow reads and writes. Every other engine module that needs a
//! snapshot of live state (the Checkpoint Manager, the Execution Logger)
//! goes through [`StateStore::export_state`] rather than reaching into a
//! private field, so there is exactly one coherent "give me everything"
//! method (SPEC_FULL.md §2.A resolves a naming inconsistency in the Python
//! reference this way).
//!
//! ## Rust Learning Notes:
//!
//! ### RwLock over RLock
//! The Python reference guards its variable table with a single
//! `threading.RLock`, serializing even concurrent reads. `StateStore` uses
//! `tokio::sync::RwLock` instead: multiple readers run concurrently, and
//! only a writer excludes everyone else. This is safe here because, unlike
//! the Python reference, no code path re-enters a lock it already holds.

use chrono::Utc;
use std::collections::{HashMap, VecDeque};
use std::path::Path;
use std::sync::Arc;
use tokio::fs;
use tokio::sync::{broadcast, RwLock};
use uuid::Uuid;

use crate::models::{
    ChangeEventKind, StateChangeEvent, StatePermission, StateScope, Value, Variable, VariableGroup,
};
use crate::{Result, RuntimeError};

/// The capacity of the change-event broadcast channel. Slow watchers that
/// fall this far behind miss older events rather than stalling publishers;
/// tuned the same order of magnitude as the reference crate's NATS stream
/// buffers.
const CHANGE_EVENT_CHANNEL_CAPACITY: usize = 1024;

/// How many change events the in-memory history ring retains, per
/// `spec.md` §3's "retained in a bounded in-memory ring" requirement.
const CHANGE_HISTORY_CAPACITY: usize = 2048;

/// A `pre_change`/`validation` hook: inspects an about-to-be-applied write
/// and can reject it. Runs under the store's write lock, so it must not
/// call back into the store (SPEC_FULL.md / spec.md §4.A's documented
/// hook contract).
pub type GuardHook = Box<dyn Fn(&str, &Value) -> Result<()> + Send + Sync>;

/// A `post_change` hook: observes a committed mutation. Exceptions
/// (returned `Err`s) are logged, not propagated — the mutation already
/// committed.
pub type ObserverHook = Box<dyn Fn(&StateChangeEvent) + Send + Sync>;

#[derive(Default)]
struct Hooks {
    pre_change: Vec<GuardHook>,
    validation: Vec<GuardHook>,
    post_change: Vec<ObserverHook>,
}

/// On-disk representation of a whole store, per `spec.md` §6's
/// `state.json` shape.
#[derive(serde::Serialize, serde::Deserialize)]
struct PersistedState {
    variables: HashMap<String, Variable>,
    groups: HashMap<String, VariableGroup>,
    timestamp: chrono::DateTime<Utc>,
}

/// Scoped, typed variable storage for a single workflow run.
///
/// Cloning a `StateStore` handle is cheap (it's `Arc`-backed internally);
/// hand clones to every component that needs to read or write variables.
pub struct StateStore {
    variables: RwLock<HashMap<String, Variable>>,
    groups: RwLock<HashMap<String, VariableGroup>>,
    change_events: broadcast::Sender<StateChangeEvent>,
    history: RwLock<VecDeque<StateChangeEvent>>,
    hooks: RwLock<Hooks>,
}

impl Default for StateStore {
    fn default() -> Self {
        let (tx, _rx) = broadcast::channel(CHANGE_EVENT_CHANNEL_CAPACITY);
        StateStore {
            variables: RwLock::new(HashMap::new()),
            groups: RwLock::new(HashMap::new()),
            change_events: tx,
            history: RwLock::new(VecDeque::new()),
            hooks: RwLock::new(Hooks::default()),
        }
    }
}

impl StateStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Subscribe to the live feed of variable mutations.
    pub fn subscribe(&self) -> broadcast::Receiver<StateChangeEvent> {
        self.change_events.subscribe()
    }

    /// Declare a new variable. Fails if a variable with the same name
    /// already exists, matching the Python reference's `set_value(...,
    /// create=True)` guard against accidental redeclaration.
    pub async fn declare(
        &self,
        name: impl Into<String>,
        value: Value,
        scope: StateScope,
    ) -> Result<()> {
        let name = name.into();
        let mut vars = self.variables.write().await;
        if vars.contains_key(&name) {
            return Err(RuntimeError::ValidationFailed {
                reason: format!("variable {name} already declared"),
            });
        }
        let variable = Variable::new(name.clone(), value.clone(), scope);
        vars.insert(name.clone(), variable);
        drop(vars);
        self.emit(name, ChangeEventKind::Created, None, Some(value), scope, None).await;
        Ok(())
    }

    /// Set an existing variable's value.
    ///
    /// Mutation order is fixed per SPEC_FULL.md §2.A: validate permission,
    /// validate type, compute the diff, apply it, then emit the change
    /// event. Every step below happens in that order and nowhere else.
    /// Internal trusted write path (no requestor attribution); see
    /// `set_value_as` for the permission-checked path that records one.
    pub async fn set_value(&self, name: &str, value: Value) -> Result<()> {
        self.set_value_internal(name, value, None).await
    }

    async fn set_value_internal(&self, name: &str, value: Value, requestor: Option<String>) -> Result<()> {
        let mut vars = self.variables.write().await;
        let variable = vars
            .get_mut(name)
            .ok_or_else(|| RuntimeError::VariableNotFound {
                name: name.to_string(),
            })?;

        // 1. validate permission
        if variable.meta.permission == StatePermission::ReadOnly {
            return Err(RuntimeError::VariableAccessDenied {
                name: name.to_string(),
                scope: format!("{:?}", variable.meta.scope),
            });
        }
        // 2. validate type, if one was pinned by the first write
        if let Some(expected) = &variable.meta.value_type {
            if expected != value.type_name() {
                return Err(RuntimeError::ValidationFailed {
                    reason: format!(
                        "variable {name} expected type {expected}, got {}",
                        value.type_name()
                    ),
                });
            }
        }

        // 3. compute the diff
        let old_value = variable.value.clone();
        let scope = variable.meta.scope;

        // 4. apply
        variable.value = value.clone();
        variable.meta.updated_at = Utc::now();
        if variable.meta.value_type.is_none() {
            variable.meta.value_type = Some(value.type_name().to_string());
        }
        drop(vars);

        // 5. notify watchers
        self.emit(
            name.to_string(),
            ChangeEventKind::Updated,
            Some(old_value),
            Some(value),
            scope,
            requestor,
        )
        .await;
        Ok(())
    }

    /// Set a variable's value, creating it in `scope` if it doesn't already
    /// exist. Used by the Checkpoint Manager's restore path, which must
    /// re-create variables absent from the live store (see `engine::checkpoint`).
    pub async fn set_or_create(&self, name: &str, value: Value, scope: StateScope) -> Result<()> {
        let exists = self.variables.read().await.contains_key(name);
        if exists {
            self.set_value(name, value).await
        } else {
            self.declare(name.to_string(), value, scope).await
        }
    }

    /// Register a `pre_change` or `validation` hook. `phase` distinguishes
    /// them only for the caller's own bookkeeping; both run before the
    /// write is applied, `pre_change` first.
    pub async fn add_pre_change_hook(&self, hook: GuardHook) {
        self.hooks.write().await.pre_change.push(hook);
    }

    pub async fn add_validation_hook(&self, hook: GuardHook) {
        self.hooks.write().await.validation.push(hook);
    }

    pub async fn add_post_change_hook(&self, hook: ObserverHook) {
        self.hooks.write().await.post_change.push(hook);
    }

    /// Requestor-checked write, enforcing the permission semantics of
    /// `spec.md` §4.A: `read_only` rejects every write after creation;
    /// `private`/`protected` require `requestor` to be the owner (or, for
    /// `protected`, to appear in `access_list`); `read_write`/`shared`
    /// accept any requestor. Runs pre_change and validation hooks before
    /// committing, then post_change hooks after.
    pub async fn set_value_as(&self, name: &str, value: Value, requestor: &str) -> Result<()> {
        {
            let vars = self.variables.read().await;
            let variable = vars
                .get(name)
                .ok_or_else(|| RuntimeError::VariableNotFound { name: name.to_string() })?;
            self.check_permission(variable, requestor)?;
        }

        {
            let hooks = self.hooks.read().await;
            for hook in hooks.pre_change.iter().chain(hooks.validation.iter()) {
                hook(name, &value)?;
            }
        }

        self.set_value_internal(name, value, Some(requestor.to_string())).await?;

        if let Some(event) = self.history.read().await.back().cloned() {
            let hooks = self.hooks.read().await;
            for hook in hooks.post_change.iter() {
                hook(&event);
            }
        }
        Ok(())
    }

    fn check_permission(&self, variable: &Variable, requestor: &str) -> Result<()> {
        use StatePermission::*;
        match variable.meta.permission {
            ReadOnly => Err(RuntimeError::VariableAccessDenied {
                name: variable.name.clone(),
                scope: format!("{:?}", variable.meta.scope),
            }),
            ReadWrite | Shared => Ok(()),
            Private => {
                if variable.meta.owner_id.as_deref() == Some(requestor) {
                    Ok(())
                } else {
                    Err(RuntimeError::VariableAccessDenied {
                        name: variable.name.clone(),
                        scope: format!("{:?}", variable.meta.scope),
                    })
                }
            }
            Protected => {
                if variable.meta.owner_id.as_deref() == Some(requestor)
                    || variable.meta.access_list.iter().any(|a| a == requestor)
                {
                    Ok(())
                } else {
                    Err(RuntimeError::VariableAccessDenied {
                        name: variable.name.clone(),
                        scope: format!("{:?}", variable.meta.scope),
                    })
                }
            }
        }
    }

    /// Declare a variable with explicit permission/owner metadata, for
    /// callers that need `private`/`protected` enforcement.
    pub async fn declare_with_meta(
        &self,
        name: impl Into<String>,
        value: Value,
        scope: StateScope,
        permission: StatePermission,
        owner_id: Option<String>,
    ) -> Result<()> {
        let name = name.into();
        let mut vars = self.variables.write().await;
        if vars.contains_key(&name) {
            return Err(RuntimeError::ValidationFailed {
                reason: format!("variable {name} already declared"),
            });
        }
        let mut variable = Variable::new(name.clone(), value.clone(), scope).with_permission(permission);
        variable.meta.owner_id = owner_id;
        vars.insert(name.clone(), variable);
        drop(vars);
        self.emit(name, ChangeEventKind::Created, None, Some(value), scope, None).await;
        Ok(())
    }

    /// Declare a variable with a TTL: it behaves as absent once
    /// `now - updated_at > ttl_seconds` (`spec.md` §3/§4.A).
    pub async fn declare_with_ttl(
        &self,
        name: impl Into<String>,
        value: Value,
        scope: StateScope,
        ttl_seconds: u64,
    ) -> Result<()> {
        let name = name.into();
        let mut vars = self.variables.write().await;
        if vars.contains_key(&name) {
            return Err(RuntimeError::ValidationFailed {
                reason: format!("variable {name} already declared"),
            });
        }
        let variable = Variable::new(name.clone(), value.clone(), scope).with_ttl(ttl_seconds);
        vars.insert(name.clone(), variable);
        drop(vars);
        self.emit(name, ChangeEventKind::Created, None, Some(value), scope, None).await;
        Ok(())
    }

    /// Variable-name-filtered, most-recent-first view of the change
    /// history ring.
    pub async fn change_history(&self, name: Option<&str>, limit: usize) -> Vec<StateChangeEvent> {
        let history = self.history.read().await;
        history
            .iter()
            .rev()
            .filter(|e| name.map(|n| e.variable == n).unwrap_or(true))
            .take(limit)
            .cloned()
            .collect()
    }

    /// Create (or extend) a named group referencing existing variables for
    /// bulk operations. The group does not own the variables.
    pub async fn add_to_group(&self, group: &str, variable_name: &str) -> Result<()> {
        if !self.variables.read().await.contains_key(variable_name) {
            return Err(RuntimeError::VariableNotFound {
                name: variable_name.to_string(),
            });
        }
        let mut groups = self.groups.write().await;
        groups
            .entry(group.to_string())
            .or_insert_with(|| VariableGroup::new(group))
            .add(variable_name);
        Ok(())
    }

    /// Values of every variable currently referenced by `group`. Missing
    /// variables (deleted since being added) are silently skipped.
    pub async fn group_values(&self, group: &str) -> HashMap<String, Value> {
        let Some(g) = self.groups.read().await.get(group).cloned() else {
            return HashMap::new();
        };
        let vars = self.variables.read().await;
        g.variable_names
            .iter()
            .filter_map(|name| vars.get(name).map(|v| (name.clone(), v.value.clone())))
            .collect()
    }

    /// Persist the whole store (variables + groups) as `state.json`, per
    /// `spec.md` §6.
    pub async fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let snapshot = PersistedState {
            variables: self.variables.read().await.clone(),
            groups: self.groups.read().await.clone(),
            timestamp: Utc::now(),
        };
        let json = serde_json::to_vec_pretty(&snapshot)?;
        if let Some(parent) = path.as_ref().parent() {
            fs::create_dir_all(parent).await?;
        }
        fs::write(path, json).await?;
        Ok(())
    }

    /// Replace this store's contents with a previously `save`d snapshot.
    pub async fn load(&self, path: impl AsRef<Path>) -> Result<()> {
        let bytes = fs::read(path).await?;
        let snapshot: PersistedState = serde_json::from_slice(&bytes)?;
        *self.variables.write().await = snapshot.variables;
        *self.groups.write().await = snapshot.groups;
        Ok(())
    }

    /// Returns `None` if the variable doesn't exist, or if it exists but
    /// has lapsed its TTL (`spec.md` §4.A: "a variable is treated as
    /// absent if `now - updated > ttl`").
    pub async fn get(&self, name: &str) -> Option<Value> {
        self.variables
            .read()
            .await
            .get(name)
            .filter(|v| !v.is_expired())
            .map(|v| v.value.clone())
    }

    pub async fn get_required(&self, name: &str) -> Result<Value> {
        self.get(name)
            .await
            .ok_or_else(|| RuntimeError::VariableNotFound {
                name: name.to_string(),
            })
    }

    pub async fn delete(&self, name: &str) -> Result<()> {
        let mut vars = self.variables.write().await;
        let removed = vars.remove(name).ok_or_else(|| RuntimeError::VariableNotFound {
            name: name.to_string(),
        })?;
        drop(vars);
        self.emit(
            name.to_string(),
            ChangeEventKind::Deleted,
            Some(removed.value),
            None,
            removed.meta.scope,
            None,
        )
        .await;
        Ok(())
    }

    /// Snapshot every variable's value. This is the single coherent
    /// "export everything" method every other component uses; see the
    /// module doc comment for why that matters. Expired (TTL-lapsed)
    /// variables behave as absent and are excluded.
    pub async fn export_state(&self) -> HashMap<String, Value> {
        self.variables
            .read()
            .await
            .iter()
            .filter(|(_, v)| !v.is_expired())
            .map(|(name, variable)| (name.clone(), variable.value.clone()))
            .collect()
    }

    /// All variables within one scope, used by the Checkpoint Manager to
    /// snapshot only the relevant subset. Expired variables are excluded.
    pub async fn export_scope(&self, scope: StateScope) -> HashMap<String, Value> {
        self.variables
            .read()
            .await
            .iter()
            .filter(|(_, v)| v.meta.scope == scope && !v.is_expired())
            .map(|(name, variable)| (name.clone(), variable.value.clone()))
            .collect()
    }

    async fn emit(
        &self,
        variable: String,
        kind: ChangeEventKind,
        old_value: Option<Value>,
        new_value: Option<Value>,
        scope: StateScope,
        requestor: Option<String>,
    ) {
        let event = StateChangeEvent {
            id: Uuid::new_v4(),
            variable,
            kind,
            old_value,
            new_value,
            scope,
            requestor,
            timestamp: Utc::now(),
        };

        let mut history = self.history.write().await;
        if history.len() >= CHANGE_HISTORY_CAPACITY {
            history.pop_front();
        }
        history.push_back(event.clone());
        drop(history);

        // `send` fails only when there are no receivers; that's expected
        // when nobody is watching, so the error is intentionally ignored.
        let _ = self.change_events.send(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn declare_then_read_roundtrips() {
        let store = StateStore::new();
        store
            .declare("counter", Value::Number(1.0), StateScope::Workflow)
            .await
            .unwrap();
        assert_eq!(store.get("counter").await, Some(Value::Number(1.0)));
    }

    #[tokio::test]
    async fn redeclaring_an_existing_variable_fails() {
        let store = StateStore::new();
        store
            .declare("x", Value::Bool(true), StateScope::Step)
            .await
            .unwrap();
        let err = store
            .declare("x", Value::Bool(false), StateScope::Step)
            .await
            .unwrap_err();
        assert!(matches!(err, RuntimeError::ValidationFailed { .. }));
    }

    #[tokio::test]
    async fn set_value_on_missing_variable_fails() {
        let store = StateStore::new();
        let err = store.set_value("missing", Value::Null).await.unwrap_err();
        assert!(matches!(err, RuntimeError::VariableNotFound { .. }));
    }

    #[tokio::test]
    async fn read_only_variable_rejects_writes() {
        let store = StateStore::new();
        store
            .declare("pinned", Value::Number(1.0), StateScope::Global)
            .await
            .unwrap();
        {
            let mut vars = store.variables.write().await;
            vars.get_mut("pinned").unwrap().meta.permission = StatePermission::ReadOnly;
        }
        let err = store
            .set_value("pinned", Value::Number(2.0))
            .await
            .unwrap_err();
        assert!(matches!(err, RuntimeError::VariableAccessDenied { .. }));
    }

    #[tokio::test]
    async fn type_mismatch_is_rejected() {
        let store = StateStore::new();
        store
            .declare("n", Value::Number(1.0), StateScope::Workflow)
            .await
            .unwrap();
        let err = store
            .set_value("n", Value::String("oops".into()))
            .await
            .unwrap_err();
        assert!(matches!(err, RuntimeError::ValidationFailed { .. }));
    }

    #[tokio::test]
    async fn change_events_are_broadcast() {
        let store = StateStore::new();
        let mut rx = store.subscribe();
        store
            .declare("y", Value::Number(1.0), StateScope::Workflow)
            .await
            .unwrap();
        let event = rx.recv().await.unwrap();
        assert_eq!(event.variable, "y");
        assert_eq!(event.kind, ChangeEventKind::Created);
    }

    #[tokio::test]
    async fn export_state_contains_all_scopes() {
        let store = StateStore::new();
        store
            .declare("a", Value::Number(1.0), StateScope::Step)
            .await
            .unwrap();
        store
            .declare("b", Value::Number(2.0), StateScope::Global)
            .await
            .unwrap();
        let snapshot = store.export_state().await;
        assert_eq!(snapshot.len(), 2);
    }

    #[tokio::test]
    async fn set_or_create_recreates_missing_variable_in_given_scope() {
        let store = StateStore::new();
        store
            .set_or_create("restored", Value::Number(42.0), StateScope::Workflow)
            .await
            .unwrap();
        assert_eq!(store.get("restored").await, Some(Value::Number(42.0)));
    }

    #[tokio::test]
    async fn private_variable_rejects_writes_from_a_non_owner() {
        let store = StateStore::new();
        store
            .declare_with_meta(
                "secret",
                Value::Number(1.0),
                StateScope::Workflow,
                StatePermission::Private,
                Some("alice".into()),
            )
            .await
            .unwrap();

        let err = store
            .set_value_as("secret", Value::Number(2.0), "mallory")
            .await
            .unwrap_err();
        assert!(matches!(err, RuntimeError::VariableAccessDenied { .. }));

        store
            .set_value_as("secret", Value::Number(2.0), "alice")
            .await
            .unwrap();
        assert_eq!(store.get("secret").await, Some(Value::Number(2.0)));
    }

    #[tokio::test]
    async fn protected_variable_accepts_access_list_members() {
        let store = StateStore::new();
        store
            .declare_with_meta(
                "shared_budget",
                Value::Number(100.0),
                StateScope::Workflow,
                StatePermission::Protected,
                Some("owner".into()),
            )
            .await
            .unwrap();
        {
            let mut vars = store.variables.write().await;
            vars.get_mut("shared_budget").unwrap().meta.access_list.push("reviewer".into());
        }
        store
            .set_value_as("shared_budget", Value::Number(50.0), "reviewer")
            .await
            .unwrap();
        let err = store
            .set_value_as("shared_budget", Value::Number(1.0), "stranger")
            .await
            .unwrap_err();
        assert!(matches!(err, RuntimeError::VariableAccessDenied { .. }));
    }

    #[tokio::test]
    async fn pre_change_hook_can_reject_a_write() {
        let store = StateStore::new();
        store
            .declare("n", Value::Number(1.0), StateScope::Workflow)
            .await
            .unwrap();
        store
            .add_validation_hook(Box::new(|_name, value| match value.as_f64() {
                Some(v) if v >= 0.0 => Ok(()),
                _ => Err(RuntimeError::ValidationFailed {
                    reason: "must be non-negative".into(),
                }),
            }))
            .await;

        let err = store
            .set_value_as("n", Value::Number(-1.0), "system")
            .await
            .unwrap_err();
        assert!(matches!(err, RuntimeError::ValidationFailed { .. }));
        assert_eq!(store.get("n").await, Some(Value::Number(1.0)));
    }

    #[tokio::test]
    async fn change_history_is_queryable_by_name() {
        let store = StateStore::new();
        store.declare("a", Value::Number(1.0), StateScope::Workflow).await.unwrap();
        store.declare("b", Value::Number(1.0), StateScope::Workflow).await.unwrap();
        store.set_value("a", Value::Number(2.0)).await.unwrap();

        let all = store.change_history(None, 10).await;
        assert_eq!(all.len(), 3);
        let for_a = store.change_history(Some("a"), 10).await;
        assert_eq!(for_a.len(), 2);
    }

    #[tokio::test]
    async fn groups_bundle_variables_for_bulk_reads() {
        let store = StateStore::new();
        store.declare("host", Value::String("localhost".into()), StateScope::Workflow).await.unwrap();
        store.declare("port", Value::Number(8080.0), StateScope::Workflow).await.unwrap();
        store.add_to_group("connection", "host").await.unwrap();
        store.add_to_group("connection", "port").await.unwrap();

        let values = store.group_values("connection").await;
        assert_eq!(values.len(), 2);
        assert_eq!(values.get("host"), Some(&Value::String("localhost".into())));
    }

    #[tokio::test]
    async fn save_then_load_round_trips_variables() {
        let dir = std::env::temp_dir().join(format!("state-store-test-{}", Uuid::new_v4()));
        let path = dir.join("state.json");

        let original = StateStore::new();
        original.declare("x", Value::Number(10.0), StateScope::Workflow).await.unwrap();
        original.save(&path).await.unwrap();

        let restored = StateStore::new();
        restored.load(&path).await.unwrap();
        assert_eq!(restored.get("x").await, Some(Value::Number(10.0)));

        let _ = tokio::fs::remove_dir_all(dir).await;
    }

    #[tokio::test]
    async fn variable_with_ttl_is_absent_after_it_elapses() {
        let store = StateStore::new();
        store
            .declare_with_ttl("session_token", Value::String("abc".into()), StateScope::Session, 1)
            .await
            .unwrap();
        assert_eq!(store.get("session_token").await, Some(Value::String("abc".into())));

        tokio::time::sleep(std::time::Duration::from_millis(1100)).await;

        assert_eq!(store.get("session_token").await, None);
        assert!(store.export_state().await.get("session_token").is_none());
    }

    #[tokio::test]
    async fn set_value_as_records_the_requestor_on_the_change_event() {
        let store = StateStore::new();
        store
            .declare("n", Value::Number(1.0), StateScope::Workflow)
            .await
            .unwrap();

        store.set_value_as("n", Value::Number(2.0), "alice").await.unwrap();

        let history = store.change_history(Some("n"), 10).await;
        let update = history
            .iter()
            .find(|e| e.kind == ChangeEventKind::Updated)
            .unwrap();
        assert_eq!(update.requestor.as_deref(), Some("alice"));
    }
}
