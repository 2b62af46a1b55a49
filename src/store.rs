use std::collections::BTreeMap;
use std::future::Future;

use anyhow::anyhow;
use chrono::Utc;
use tokio::sync::RwLock;

use crate::algorithms;
use crate::error::{LibError, Result};
use crate::invariants::GroupIndex;
use crate::models::{
    Group, GroupChanges, GroupDraft, GroupId, GroupLink, GroupNode, GroupWithChildren,
};

pub const GROUP_NOT_FOUND: &str = "The requested group was not found.";

pub(crate) fn group_not_found(group_id: GroupId) -> LibError {
    LibError::not_found(GROUP_NOT_FOUND, anyhow!("group {} not found", group_id))
}

/// Durable storage of groups.
///
/// Every mutation runs its integrity checks and its write inside one serialized
/// scope, so two concurrent re-parentings cannot both pass the cycle check.
pub trait GroupStore: Send + Sync + 'static {
    /// Root groups with full subtrees, ordered by id.
    fn list_roots(&self) -> impl Future<Output = Result<Vec<GroupNode>>> + Send;

    /// A group with its immediate children.
    fn get_by_id(
        &self,
        group_id: GroupId,
    ) -> impl Future<Output = Result<GroupWithChildren>> + Send;

    fn create(&self, draft: GroupDraft) -> impl Future<Output = Result<Group>> + Send;

    fn update(
        &self,
        group_id: GroupId,
        changes: GroupChanges,
    ) -> impl Future<Output = Result<Group>> + Send;

    fn delete(&self, group_id: GroupId) -> impl Future<Output = Result<()>> + Send;

    fn count_children(&self, group_id: GroupId) -> impl Future<Output = Result<i64>> + Send;
}

#[derive(Debug, Default)]
struct MemoryState {
    last_id: i64,
    rows: BTreeMap<GroupId, Group>,
}

impl MemoryState {
    fn index(&self) -> GroupIndex {
        GroupIndex::new(self.rows.values().map(GroupLink::from))
    }
}

/// In-process store. Writers hold the lock across check and write.
#[derive(Debug, Default)]
pub struct MemoryGroupStore {
    state: RwLock<MemoryState>,
}

impl MemoryGroupStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl GroupStore for MemoryGroupStore {
    async fn list_roots(&self) -> Result<Vec<GroupNode>> {
        let state = self.state.read().await;
        Ok(algorithms::build_forest(state.rows.values().cloned().collect()))
    }

    async fn get_by_id(&self, group_id: GroupId) -> Result<GroupWithChildren> {
        let state = self.state.read().await;
        let group = state
            .rows
            .get(&group_id)
            .cloned()
            .ok_or_else(|| group_not_found(group_id))?;
        let children = state
            .rows
            .values()
            .filter(|row| row.parent_id == Some(group_id))
            .cloned()
            .collect();
        Ok(GroupWithChildren { group, children })
    }

    async fn create(&self, draft: GroupDraft) -> Result<Group> {
        let mut state = self.state.write().await;
        state.index().ensure_can_create(&draft)?;

        state.last_id += 1;
        let now = Utc::now().naive_utc();
        let group = Group {
            id: GroupId(state.last_id),
            name: draft.name,
            description: draft.description,
            kind: draft.kind,
            parent_id: draft.parent_id,
            created_at: now,
            updated_at: now,
        };
        state.rows.insert(group.id, group.clone());
        Ok(group)
    }

    async fn update(&self, group_id: GroupId, changes: GroupChanges) -> Result<Group> {
        let mut state = self.state.write().await;
        let existing = state
            .rows
            .get(&group_id)
            .cloned()
            .ok_or_else(|| group_not_found(group_id))?;
        let draft = state.index().ensure_can_update(&existing, &changes)?;

        let group = Group {
            name: draft.name,
            description: draft.description,
            kind: draft.kind,
            parent_id: draft.parent_id,
            updated_at: Utc::now().naive_utc(),
            ..existing
        };
        state.rows.insert(group_id, group.clone());
        Ok(group)
    }

    async fn delete(&self, group_id: GroupId) -> Result<()> {
        let mut state = self.state.write().await;
        if !state.rows.contains_key(&group_id) {
            return Err(group_not_found(group_id));
        }
        state.index().ensure_can_delete(group_id)?;
        state.rows.remove(&group_id);
        Ok(())
    }

    async fn count_children(&self, group_id: GroupId) -> Result<i64> {
        let state = self.state.read().await;
        let count = state
            .rows
            .values()
            .filter(|row| row.parent_id == Some(group_id))
            .count();
        Ok(count as i64)
    }
}
