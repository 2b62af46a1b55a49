use std::sync::Arc;

use anyhow::anyhow;

use crate::error::{LibError, Result};
use crate::invariants;
use crate::models::{
    CreateGroupPayload, Group, GroupId, GroupNode, GroupWithChildren, UpdateGroupPayload,
};
use crate::store::GroupStore;

/// Group use cases over any [`GroupStore`].
///
/// Payloads are validated here; tree checks that depend on stored state run
/// inside the store's mutation scope.
pub struct GroupOperations<St> {
    store: Arc<St>,
}

impl<St> Clone for GroupOperations<St> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
        }
    }
}

impl<St: GroupStore> GroupOperations<St> {
    pub fn new(store: Arc<St>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> Arc<St> {
        Arc::clone(&self.store)
    }

    pub async fn list_groups(&self) -> Result<Vec<GroupNode>> {
        self.store.list_roots().await
    }

    pub async fn create_group(&self, payload: CreateGroupPayload) -> Result<Group> {
        let draft = payload.normalize()?;
        let group = self.store.create(draft).await?;
        tracing::info!(
            group_id = %group.id,
            parent_id = ?group.parent_id,
            kind = %group.kind,
            "group created"
        );
        Ok(group)
    }

    pub async fn get_group(&self, group_id: GroupId) -> Result<GroupWithChildren> {
        self.store.get_by_id(group_id).await
    }

    pub async fn update_group(
        &self,
        group_id: GroupId,
        payload: UpdateGroupPayload,
    ) -> Result<Group> {
        let changes = payload.normalize()?;
        let group = self.store.update(group_id, changes).await?;
        tracing::info!(group_id = %group.id, parent_id = ?group.parent_id, "group updated");
        Ok(group)
    }

    pub async fn delete_group(&self, group_id: GroupId) -> Result<()> {
        self.store.get_by_id(group_id).await?;

        let child_count = self.store.count_children(group_id).await?;
        let child_count = usize::try_from(child_count).map_err(|_| {
            LibError::database(
                "Failed to count group children",
                anyhow!("negative child count {} for group {}", child_count, group_id),
            )
        })?;
        invariants::ensure_no_children(group_id, child_count)?;

        // The store repeats the child check under its own lock.
        self.store.delete(group_id).await?;
        tracing::info!(group_id = %group_id, "group deleted");
        Ok(())
    }
}
