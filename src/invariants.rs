use std::collections::HashMap;

use anyhow::anyhow;
use serde::Serialize;

use crate::error::{LibError, Result};
use crate::models::{Group, GroupChanges, GroupDraft, GroupId, GroupLink};
use crate::validation::{self, ValidationErrors};

pub const SELF_PARENT_MESSAGE: &str = "A group cannot be its own parent.";
pub const CYCLIC_ANCESTRY_MESSAGE: &str =
    "A group cannot be moved beneath one of its own descendants.";
pub const HAS_CHILDREN_MESSAGE: &str = "Cannot delete group with children.";

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TreeViolation {
    DuplicateName {
        name: String,
        parent_id: Option<GroupId>,
        existing_id: GroupId,
    },
    SelfParent {
        group_id: GroupId,
    },
    CyclicAncestry {
        group_id: GroupId,
        proposed_parent_id: GroupId,
    },
}

impl TreeViolation {
    pub const fn error_code(&self) -> &'static str {
        match self {
            TreeViolation::DuplicateName { .. } => "group_duplicate_name",
            TreeViolation::SelfParent { .. } => "group_self_parent",
            TreeViolation::CyclicAncestry { .. } => "group_cyclic_ancestry",
        }
    }

    pub const fn public_message(&self) -> &'static str {
        match self {
            TreeViolation::DuplicateName { .. } => validation::NAME_TAKEN,
            TreeViolation::SelfParent { .. } => SELF_PARENT_MESSAGE,
            TreeViolation::CyclicAncestry { .. } => CYCLIC_ANCESTRY_MESSAGE,
        }
    }
}

impl From<TreeViolation> for LibError {
    fn from(value: TreeViolation) -> Self {
        let source = anyhow!("tree invariant violated: {:?}", value);
        match value {
            TreeViolation::DuplicateName { .. } => duplicate_name_error(source),
            _ => LibError::invalid_with_code(value.error_code(), value.public_message(), source),
        }
    }
}

/// Duplicate sibling names are reported against the `name` field.
pub fn duplicate_name_error(source: anyhow::Error) -> LibError {
    let mut err = LibError::validation(ValidationErrors::single("name", validation::NAME_TAKEN));
    err.code = "group_duplicate_name";
    err.source = source;
    err
}

pub fn ensure_no_children(group_id: GroupId, child_count: usize) -> Result<()> {
    if child_count > 0 {
        return Err(LibError::conflict(
            "group_has_children",
            HAS_CHILDREN_MESSAGE,
            anyhow!("group {} still has {} children", group_id, child_count),
        ));
    }
    Ok(())
}

/// Adjacency snapshot of the group forest.
///
/// Holds each group's parent and name plus the ordered child ids of every parent
/// scope, with `None` as the root scope. Stores build one inside the same
/// serialized scope as the write it guards.
#[derive(Debug, Clone, Default)]
pub struct GroupIndex {
    parents: HashMap<GroupId, Option<GroupId>>,
    names: HashMap<GroupId, String>,
    children: HashMap<Option<GroupId>, Vec<GroupId>>,
}

impl GroupIndex {
    pub fn new<I>(links: I) -> Self
    where
        I: IntoIterator<Item = GroupLink>,
    {
        let mut index = GroupIndex::default();
        for link in links {
            index.parents.insert(link.id, link.parent_id);
            index.names.insert(link.id, link.name);
            index.children.entry(link.parent_id).or_default().push(link.id);
        }
        for ids in index.children.values_mut() {
            ids.sort();
        }
        index
    }

    pub fn len(&self) -> usize {
        self.parents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.parents.is_empty()
    }

    pub fn contains(&self, group_id: GroupId) -> bool {
        self.parents.contains_key(&group_id)
    }

    pub fn children_of(&self, scope: Option<GroupId>) -> &[GroupId] {
        self.children.get(&scope).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn child_count(&self, group_id: GroupId) -> usize {
        self.children_of(Some(group_id)).len()
    }

    /// Parent chain of `group_id`, nearest first. Stops at a root, at an id the
    /// index does not know, or after `len()` steps if the stored data loops.
    pub fn ancestors(&self, group_id: GroupId) -> Vec<GroupId> {
        let mut ancestors = Vec::new();
        let mut cursor = self.parents.get(&group_id).copied().flatten();
        while let Some(current) = cursor {
            if ancestors.len() >= self.len() {
                break;
            }
            ancestors.push(current);
            cursor = self.parents.get(&current).copied().flatten();
        }
        ancestors
    }

    pub fn check_name_unique(
        &self,
        name: &str,
        parent_scope: Option<GroupId>,
        exclude_id: Option<GroupId>,
    ) -> std::result::Result<(), TreeViolation> {
        let duplicate = self.children_of(parent_scope).iter().find(|sibling| {
            Some(**sibling) != exclude_id
                && self.names.get(*sibling).map(String::as_str) == Some(name)
        });

        match duplicate {
            Some(existing_id) => Err(TreeViolation::DuplicateName {
                name: name.to_string(),
                parent_id: parent_scope,
                existing_id: *existing_id,
            }),
            None => Ok(()),
        }
    }

    pub fn check_no_cycle(
        &self,
        group_id: GroupId,
        proposed_parent_id: GroupId,
    ) -> std::result::Result<(), TreeViolation> {
        if group_id == proposed_parent_id {
            return Err(TreeViolation::SelfParent { group_id });
        }

        let cyclic = TreeViolation::CyclicAncestry {
            group_id,
            proposed_parent_id,
        };
        let mut cursor = Some(proposed_parent_id);
        let mut steps = 0usize;
        while let Some(current) = cursor {
            if current == group_id {
                return Err(cyclic);
            }
            steps += 1;
            if steps > self.len() {
                // The stored parent chain already loops without passing through group_id.
                return Err(cyclic);
            }
            cursor = self.parents.get(&current).copied().flatten();
        }

        Ok(())
    }

    pub fn ensure_parent_exists(&self, parent_id: Option<GroupId>) -> Result<()> {
        match parent_id {
            Some(parent_id) if !self.contains(parent_id) => {
                let mut err = LibError::validation(ValidationErrors::single(
                    "parent_id",
                    validation::PARENT_INVALID,
                ));
                err.source = anyhow!("parent group {} does not exist", parent_id);
                Err(err)
            }
            _ => Ok(()),
        }
    }

    pub fn ensure_can_create(&self, draft: &GroupDraft) -> Result<()> {
        self.ensure_parent_exists(draft.parent_id)?;
        self.check_name_unique(&draft.name, draft.parent_id, None)?;
        Ok(())
    }

    /// Resolves `changes` against `existing` and checks the result, returning the
    /// row to write.
    pub fn ensure_can_update(
        &self,
        existing: &Group,
        changes: &GroupChanges,
    ) -> Result<GroupDraft> {
        if let Some(Some(parent_id)) = changes.parent_id {
            if parent_id == existing.id {
                return Err(TreeViolation::SelfParent {
                    group_id: existing.id,
                }
                .into());
            }
            self.ensure_parent_exists(Some(parent_id))?;
            self.check_no_cycle(existing.id, parent_id)?;
        }

        let draft = changes.apply_to(existing);
        self.check_name_unique(&draft.name, draft.parent_id, Some(existing.id))?;
        Ok(draft)
    }

    pub fn ensure_can_delete(&self, group_id: GroupId) -> Result<()> {
        ensure_no_children(group_id, self.child_count(group_id))
    }
}
