use std::collections::{HashMap, HashSet};

use crate::models::{Group, GroupId, GroupNode};

/// Child ids of every parent scope, ordered by id. `None` is the root scope.
pub fn children_map(groups: &[Group]) -> HashMap<Option<GroupId>, Vec<GroupId>> {
    let mut children: HashMap<Option<GroupId>, Vec<GroupId>> = HashMap::new();
    for group in groups {
        children.entry(group.parent_id).or_default().push(group.id);
    }
    for ids in children.values_mut() {
        ids.sort();
    }
    children
}

/// Assembles root groups with their full subtrees attached.
///
/// Iterative post-order walk, so depth is not limited by the call stack. Rows
/// that cannot be reached from a root (dangling parent or a stored loop) are
/// left out.
pub fn build_forest(groups: Vec<Group>) -> Vec<GroupNode> {
    let children = children_map(&groups);
    let mut rows: HashMap<GroupId, Group> = groups
        .into_iter()
        .map(|group| (group.id, group))
        .collect();

    let roots = children.get(&None).cloned().unwrap_or_default();
    let mut built: HashMap<GroupId, GroupNode> = HashMap::with_capacity(rows.len());
    let mut visited: HashSet<GroupId> = HashSet::with_capacity(rows.len());
    let mut stack: Vec<(GroupId, bool)> = roots.iter().rev().map(|id| (*id, false)).collect();

    while let Some((group_id, expanded)) = stack.pop() {
        let child_ids = children
            .get(&Some(group_id))
            .map(Vec::as_slice)
            .unwrap_or(&[]);

        if !expanded {
            if !visited.insert(group_id) {
                continue;
            }
            stack.push((group_id, true));
            for child_id in child_ids.iter().rev() {
                if !visited.contains(child_id) {
                    stack.push((*child_id, false));
                }
            }
            continue;
        }

        let Some(group) = rows.remove(&group_id) else {
            continue;
        };
        let nodes = child_ids
            .iter()
            .filter_map(|child_id| built.remove(child_id))
            .collect();
        built.insert(
            group_id,
            GroupNode {
                group,
                children: nodes,
            },
        );
    }

    roots
        .iter()
        .filter_map(|root_id| built.remove(root_id))
        .collect()
}

/// Number of groups in a forest, counting every nested child.
pub fn forest_size(forest: &[GroupNode]) -> usize {
    let mut count = 0usize;
    let mut pending: Vec<&GroupNode> = forest.iter().collect();
    while let Some(node) = pending.pop() {
        count += 1;
        pending.extend(node.children.iter());
    }
    count
}
