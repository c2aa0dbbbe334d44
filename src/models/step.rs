// External playbook step representation.
//
// The playbook YAML loader and its schema validator are out of scope per
// `spec.md` §1 ("Out of scope (external collaborators)"). This type is the
// minimal shape this crate consumes from that external loader: enough for
// the Condition Evaluator's playbook-wide scanner and the Graph Workflow's
// node dispatch to reference a step by name and inspect its condition
// strings, without owning the loader or its schema.

use serde::{Deserialize, Serialize};

/// A single step as handed to this crate by an external playbook loader.
/// This crate never constructs or validates these; it only reads the
/// fields it needs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlaybookStep {
    pub id: String,
    pub name: String,
    /// Condition expression strings gating whether this step runs, in the
    /// grammar `engine::condition` implements.
    pub conditions: Vec<String>,
}
