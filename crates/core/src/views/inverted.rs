use std::collections::HashMap;

use crate::model::call_tree::detached_copy;
use crate::model::{CallTree, NodeId, TreeError};

/// Turn the subtrees under `roots` upside down.
///
/// Every leaf of those subtrees becomes a child of the new root, followed by
/// its callers up to the subtree root it was found under. Pass the children
/// of [`CallTree::root`] to invert a whole tree. Copied nodes keep their
/// frame and weights; lock and recursion state is not carried over.
pub fn invert_call_tree(tree: &CallTree, roots: &[NodeId]) -> Result<CallTree, TreeError> {
    let mut callers: HashMap<NodeId, NodeId> = HashMap::new();
    let mut leaves = Vec::new();

    let mut pending: Vec<NodeId> = roots.iter().rev().copied().collect();
    while let Some(id) = pending.pop() {
        let node = tree.node(id)?;
        if node.children().is_empty() {
            leaves.push(id);
            continue;
        }
        for &child in node.children().iter().rev() {
            callers.insert(child, id);
            pending.push(child);
        }
    }

    let mut inverted = CallTree::new();
    for leaf in leaves {
        let mut tail = inverted.push_detached(detached_copy(tree.node(leaf)?, Some(CallTree::ROOT)));
        inverted.push_child_id(CallTree::ROOT, tail)?;

        let mut caller = callers.get(&leaf).copied();
        while let Some(id) = caller {
            let copy = inverted.push_detached(detached_copy(tree.node(id)?, Some(tail)));
            inverted.push_child_id(tail, copy)?;
            tail = copy;
            caller = callers.get(&id).copied();
        }
    }
    Ok(inverted)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{FrameDialect, FrameId, FrameInfo, FrameTable};

    fn frames(names: &[&str]) -> Vec<FrameId> {
        let mut table = FrameTable::new();
        names
            .iter()
            .enumerate()
            .map(|(i, n)| table.insert(FrameInfo::new(i, *n), FrameDialect::Mobile))
            .collect()
    }

    #[test]
    fn leaves_become_roots() {
        let f = frames(&["main", "a", "b", "c"]);
        let mut tree = CallTree::new();
        let main = tree.append_child(CallTree::ROOT, f[0]).unwrap();
        let a = tree.append_child(main, f[1]).unwrap();
        tree.append_child(a, f[2]).unwrap();
        tree.append_child(main, f[3]).unwrap();
        tree.add_to_total_weight(a, 7.0).unwrap();

        let inverted = invert_call_tree(&tree, tree.root().children()).unwrap();
        let roots = inverted.root().children();
        assert_eq!(roots.len(), 2);

        let b_copy = inverted.node(roots[0]).unwrap();
        assert_eq!(b_copy.frame(), f[2]);
        assert_eq!(b_copy.parent(), Some(CallTree::ROOT));

        let a_copy = inverted.node(b_copy.children()[0]).unwrap();
        assert_eq!(a_copy.frame(), f[1]);
        assert_eq!(a_copy.total_weight(), 7.0);

        let main_copy = inverted.node(a_copy.children()[0]).unwrap();
        assert_eq!(main_copy.frame(), f[0]);
        assert!(main_copy.children().is_empty());

        let c_copy = inverted.node(roots[1]).unwrap();
        assert_eq!(c_copy.frame(), f[3]);
        assert_eq!(c_copy.children().len(), 1);
    }

    #[test]
    fn inversion_stops_at_given_roots() {
        let f = frames(&["main", "a"]);
        let mut tree = CallTree::new();
        let main = tree.append_child(CallTree::ROOT, f[0]).unwrap();
        let a = tree.append_child(main, f[1]).unwrap();

        let inverted = invert_call_tree(&tree, &[a]).unwrap();
        assert_eq!(inverted.len(), 2);
        let a_copy = inverted.node(inverted.root().children()[0]).unwrap();
        assert!(a_copy.children().is_empty());
    }

    #[test]
    fn copies_are_unlocked_and_not_recursive() {
        let f = frames(&["a", "b"]);
        let mut tree = CallTree::new();
        let outer = tree.append_child(CallTree::ROOT, f[0]).unwrap();
        let middle = tree.append_child(outer, f[1]).unwrap();
        let inner = tree.append_child(middle, f[0]).unwrap();
        tree.set_recursive_through(outer, inner).unwrap();
        tree.lock(inner).unwrap();

        let inverted = invert_call_tree(&tree, &[outer]).unwrap();
        for id in inverted.ids() {
            assert!(!inverted.is_locked(id));
            assert!(!inverted.node(id).unwrap().is_recursive());
        }
        assert_eq!(inverted.len(), 4);
    }

    #[test]
    fn unknown_root_is_an_error() {
        let tree = CallTree::new();
        let stray = {
            let mut other = CallTree::new();
            other.append_child(CallTree::ROOT, FrameId::ROOT).unwrap()
        };
        assert_eq!(
            invert_call_tree(&tree, &[stray]).unwrap_err(),
            TreeError::UnknownNode(stray)
        );
    }
}
