// ProgressState: the progress item arena, weighted-rollup recomputation,
// and cascading status updates.
//
// Grounded in `original_source/core/progress_tracker.py`'s ProgressState
// class.

use std::collections::{HashMap, VecDeque};
use tokio::sync::RwLock;

use crate::models::{ProgressItemState, ProgressStatus};
use crate::{Result, RuntimeError};

use super::item::ProgressItem;

/// Held together under one lock so that a cascading status update (walking
/// descendants, then rolling percentages back up to the root) never needs
/// to acquire the lock a second time from within a call already holding it.
///
/// ## Rust Learning Notes: the cascade deadlock this avoids
///
/// The Python reference's `mark_item_status` cascades a status change to
/// descendants by calling itself recursively, each call re-acquiring the
/// same non-reentrant `threading.Lock` the outer call already holds — a
/// guaranteed deadlock if ported literally (SPEC_FULL.md §2.F). Here, the
/// whole cascade (descendant discovery, per-item mutation, and rollup) runs
/// as plain synchronous code across one `write()` guard, so there's only
/// ever one lock acquisition per public method call.
struct Inner {
    items: HashMap<String, ProgressItem>,
    children: HashMap<String, Vec<String>>,
}

pub struct ProgressState {
    inner: RwLock<Inner>,
}

impl Default for ProgressState {
    fn default() -> Self {
        ProgressState {
            inner: RwLock::new(Inner {
                items: HashMap::new(),
                children: HashMap::new(),
            }),
        }
    }
}

impl ProgressState {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn add_item(&self, item: ProgressItem) {
        let mut inner = self.inner.write().await;
        if let Some(parent_id) = item.parent_id.clone() {
            inner.children.entry(parent_id).or_default().push(item.id.clone());
        }
        inner.items.insert(item.id.clone(), item);
    }

    pub async fn get_item(&self, id: &str) -> Option<ProgressItemState> {
        self.inner.read().await.items.get(id).map(|item| item.to_state())
    }

    pub async fn get_children(&self, id: &str) -> Vec<String> {
        self.inner
            .read()
            .await
            .children
            .get(id)
            .cloned()
            .unwrap_or_default()
    }

    /// Apply `mutate` to the item `id`, then recompute its ancestors'
    /// weighted rollup all the way to the root. Returns the new state of
    /// `id` on success.
    pub async fn update_item<F>(&self, id: &str, mutate: F) -> Result<ProgressItemState>
    where
        F: FnOnce(&mut ProgressItem),
    {
        let mut inner = self.inner.write().await;
        let parent_id = {
            let item = inner
                .items
                .get_mut(id)
                .ok_or_else(|| RuntimeError::Internal(format!("progress item not found: {id}")))?;
            mutate(item);
            item.parent_id.clone()
        };
        Self::rollup_ancestors(&mut inner, parent_id);
        Ok(inner.items.get(id).unwrap().to_state())
    }

    /// Recompute every item status in `id`'s subtree (breadth-first,
    /// iterative — no recursive lock re-entry), then roll percentages up
    /// from the changed leaves to the root.
    pub async fn mark_item_status(&self, id: &str, status: ProgressStatus, cascade: bool) -> Result<()> {
        let mut inner = self.inner.write().await;
        if !inner.items.contains_key(id) {
            return Err(RuntimeError::Internal(format!("progress item not found: {id}")));
        }

        let mut queue = VecDeque::new();
        queue.push_back(id.to_string());
        let mut touched = Vec::new();
        while let Some(current) = queue.pop_front() {
            if let Some(item) = inner.items.get_mut(&current) {
                item.status = status;
                if status == ProgressStatus::Completed {
                    item.percent_complete = 100.0;
                }
                touched.push(current.clone());
            }
            if cascade {
                if let Some(children) = inner.children.get(&current).cloned() {
                    queue.extend(children);
                }
            }
        }

        let parent_id = inner.items.get(id).and_then(|item| item.parent_id.clone());
        Self::rollup_ancestors(&mut inner, parent_id);
        Ok(())
    }

    pub async fn remove_item(&self, id: &str) -> Result<()> {
        let mut inner = self.inner.write().await;
        let item = inner
            .items
            .remove(id)
            .ok_or_else(|| RuntimeError::Internal(format!("progress item not found: {id}")))?;
        if let Some(parent_id) = &item.parent_id {
            if let Some(siblings) = inner.children.get_mut(parent_id) {
                siblings.retain(|child| child != id);
            }
        }
        inner.children.remove(id);
        let parent_id = item.parent_id;
        Self::rollup_ancestors(&mut inner, parent_id);
        Ok(())
    }

    /// Walk from `start` up through ancestors, recomputing each one's
    /// `percent_complete` as the weighted average of its children:
    /// `Σ(child.percent × child.weight) / Σ(child.weight)`.
    fn rollup_ancestors(inner: &mut Inner, start: Option<String>) {
        let mut current = start;
        while let Some(id) = current {
            let children_ids = inner.children.get(&id).cloned().unwrap_or_default();
            if children_ids.is_empty() {
                break;
            }
            let mut weighted_sum = 0.0;
            let mut weight_total = 0.0;
            for child_id in &children_ids {
                if let Some(child) = inner.items.get(child_id) {
                    weighted_sum += child.percent_complete * child.weight;
                    weight_total += child.weight;
                }
            }
            let rolled_up = if weight_total > 0.0 {
                weighted_sum / weight_total
            } else {
                0.0
            };
            let next_parent = match inner.items.get_mut(&id) {
                Some(item) => {
                    item.percent_complete = rolled_up;
                    item.parent_id.clone()
                }
                None => break,
            };
            current = next_parent;
        }
    }

    pub async fn get_item_tree(&self, root_id: &str) -> Vec<ProgressItemState> {
        let inner = self.inner.read().await;
        let mut result = Vec::new();
        let mut queue = VecDeque::new();
        queue.push_back(root_id.to_string());
        while let Some(current) = queue.pop_front() {
            if let Some(item) = inner.items.get(&current) {
                result.push(item.to_state());
            }
            if let Some(children) = inner.children.get(&current) {
                queue.extend(children.clone());
            }
        }
        result
    }

    pub async fn get_progress_summary(&self) -> HashMap<String, f64> {
        self.inner
            .read()
            .await
            .items
            .iter()
            .map(|(id, item)| (id.clone(), item.percent_complete))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ProgressItemType;

    #[tokio::test]
    async fn rollup_averages_children_by_weight() {
        let state = ProgressState::new();
        state
            .add_item(ProgressItem::new("root", None, "root", ProgressItemType::Workflow, 1.0))
            .await;
        state
            .add_item(ProgressItem::new(
                "a",
                Some("root".into()),
                "a",
                ProgressItemType::Step,
                1.0,
            ))
            .await;
        state
            .add_item(ProgressItem::new(
                "b",
                Some("root".into()),
                "b",
                ProgressItemType::Step,
                3.0,
            ))
            .await;

        state.update_item("a", |item| item.update(100.0, None)).await.unwrap();
        state.update_item("b", |item| item.update(0.0, None)).await.unwrap();

        let root = state.get_item("root").await.unwrap();
        assert_eq!(root.percent_complete, 25.0);
    }

    #[tokio::test]
    async fn cascading_status_update_reaches_every_descendant() {
        let state = ProgressState::new();
        state
            .add_item(ProgressItem::new("root", None, "root", ProgressItemType::Workflow, 1.0))
            .await;
        state
            .add_item(ProgressItem::new(
                "child",
                Some("root".into()),
                "child",
                ProgressItemType::Step,
                1.0,
            ))
            .await;
        state
            .add_item(ProgressItem::new(
                "grandchild",
                Some("child".into()),
                "grandchild",
                ProgressItemType::Subtask,
                1.0,
            ))
            .await;

        state
            .mark_item_status("root", ProgressStatus::Completed, true)
            .await
            .unwrap();

        assert_eq!(
            state.get_item("grandchild").await.unwrap().status,
            ProgressStatus::Completed
        );
    }
}
