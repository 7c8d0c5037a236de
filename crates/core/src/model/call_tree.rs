use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::frame::FrameId;
use super::weight::Weight;

#[derive(Debug, Error, PartialEq)]
pub enum TreeError {
    #[error("cannot append a child to locked node {0}")]
    Locked(NodeId),
    #[error("unknown call tree node {0}")]
    UnknownNode(NodeId),
}

/// Index of a node inside its owning [`CallTree`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(usize);

impl NodeId {
    pub fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// One occurrence of a frame at a particular call path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallTreeNode {
    frame: FrameId,
    /// Back-reference only; the tree owns every node.
    parent: Option<NodeId>,
    children: Vec<NodeId>,
    locked: bool,
    recursive: Option<NodeId>,
    weight: Weight,
}

impl CallTreeNode {
    fn new(frame: FrameId, parent: Option<NodeId>) -> Self {
        Self {
            frame,
            parent,
            children: Vec::new(),
            locked: false,
            recursive: None,
            weight: Weight::default(),
        }
    }

    pub fn frame(&self) -> FrameId {
        self.frame
    }

    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    pub fn children(&self) -> &[NodeId] {
        &self.children
    }

    pub fn is_locked(&self) -> bool {
        self.locked
    }

    /// The other end of the recursion edge, if one was ever recorded.
    pub fn recursive(&self) -> Option<NodeId> {
        self.recursive
    }

    pub fn is_recursive(&self) -> bool {
        self.recursive.is_some()
    }

    pub fn total_weight(&self) -> f64 {
        self.weight.total
    }

    pub fn self_weight(&self) -> f64 {
        self.weight.self_weight
    }

    pub fn weight(&self) -> Weight {
        self.weight
    }
}

/// Arena-backed call tree. Node 0 is the root, bound to [`FrameId::ROOT`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CallTree {
    nodes: Vec<CallTreeNode>,
}

impl CallTree {
    pub const ROOT: NodeId = NodeId(0);

    pub fn new() -> Self {
        Self {
            nodes: vec![CallTreeNode::new(FrameId::ROOT, None)],
        }
    }

    pub fn root(&self) -> &CallTreeNode {
        &self.nodes[0]
    }

    pub fn get(&self, id: NodeId) -> Option<&CallTreeNode> {
        self.nodes.get(id.0)
    }

    pub fn node(&self, id: NodeId) -> Result<&CallTreeNode, TreeError> {
        self.nodes.get(id.0).ok_or(TreeError::UnknownNode(id))
    }

    fn node_mut(&mut self, id: NodeId) -> Result<&mut CallTreeNode, TreeError> {
        self.nodes.get_mut(id.0).ok_or(TreeError::UnknownNode(id))
    }

    /// Number of nodes, including the root.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Whether the tree holds nothing but its root.
    pub fn is_empty(&self) -> bool {
        self.nodes.len() == 1
    }

    pub fn is_root(&self, id: NodeId) -> bool {
        id == Self::ROOT
    }

    /// All node ids in allocation order, root first.
    pub fn ids(&self) -> impl Iterator<Item = NodeId> {
        (0..self.nodes.len()).map(NodeId)
    }

    /// Create a node for `frame` under `parent`. Locked parents reject new
    /// children.
    pub fn append_child(&mut self, parent: NodeId, frame: FrameId) -> Result<NodeId, TreeError> {
        let id = NodeId(self.nodes.len());
        let parent_node = self.node_mut(parent)?;
        if parent_node.locked {
            return Err(TreeError::Locked(parent));
        }
        parent_node.children.push(id);
        self.nodes.push(CallTreeNode::new(frame, Some(parent)));
        Ok(id)
    }

    /// Rewrite the parent back-reference of `id`. Does not touch either
    /// parent's child list.
    pub fn set_parent(&mut self, id: NodeId, parent: Option<NodeId>) -> Result<(), TreeError> {
        self.node_mut(id)?.parent = parent;
        Ok(())
    }

    /// Freeze `id`: no further children may be appended. There is no unlock.
    pub fn lock(&mut self, id: NodeId) -> Result<(), TreeError> {
        self.node_mut(id)?.locked = true;
        Ok(())
    }

    pub fn is_locked(&self, id: NodeId) -> bool {
        self.get(id).is_some_and(CallTreeNode::is_locked)
    }

    /// Record a recursion edge between `a` and `b`, in both directions.
    pub fn set_recursive_through(&mut self, a: NodeId, b: NodeId) -> Result<(), TreeError> {
        self.node(b)?;
        self.node_mut(a)?.recursive = Some(b);
        self.node_mut(b)?.recursive = Some(a);
        Ok(())
    }

    /// True when the parent of `id` is bound to the same frame.
    pub fn is_direct_recursive(&self, id: NodeId) -> bool {
        let Some(node) = self.get(id) else {
            return false;
        };
        node.parent
            .and_then(|p| self.get(p))
            .is_some_and(|parent| parent.frame == node.frame)
    }

    /// The last child of `parent` when it is unlocked and bound to `frame`.
    /// Consecutive identical frames reuse that child instead of adding a
    /// sibling.
    pub fn last_unlocked_child(&self, parent: NodeId, frame: FrameId) -> Option<NodeId> {
        let last = *self.get(parent)?.children.last()?;
        let node = self.get(last)?;
        (!node.locked && node.frame == frame).then_some(last)
    }

    /// Reuse [`CallTree::last_unlocked_child`] or append a fresh child.
    pub fn child_for(&mut self, parent: NodeId, frame: FrameId) -> Result<NodeId, TreeError> {
        match self.last_unlocked_child(parent, frame) {
            Some(id) => Ok(id),
            None => self.append_child(parent, frame),
        }
    }

    pub fn add_to_total_weight(&mut self, id: NodeId, delta: f64) -> Result<f64, TreeError> {
        Ok(self.node_mut(id)?.weight.add_to_total(delta))
    }

    pub fn add_to_self_weight(&mut self, id: NodeId, delta: f64) -> Result<f64, TreeError> {
        Ok(self.node_mut(id)?.weight.add_to_self(delta))
    }

    /// Number of ancestors between `id` and the root (root children are 0).
    pub fn depth(&self, id: NodeId) -> usize {
        self.path_to_root(id).len().saturating_sub(1)
    }

    /// Ancestors of `id`, innermost first, starting with `id` itself and
    /// excluding the root.
    pub fn path_to_root(&self, id: NodeId) -> Vec<NodeId> {
        let mut path = Vec::new();
        let mut current = Some(id);
        while let Some(nid) = current {
            if self.is_root(nid) {
                break;
            }
            path.push(nid);
            current = self.get(nid).and_then(CallTreeNode::parent);
        }
        path
    }

    /// Link `node` with the innermost node on `path` bound to the same frame.
    ///
    /// The scan runs from the end of `path` towards its start and stops at the
    /// first match. Quadratic in stack depth over a whole profile.
    pub fn mark_recursion(&mut self, path: &[NodeId], node: NodeId) -> Result<(), TreeError> {
        let frame = self.node(node)?.frame;
        let ancestor = path
            .iter()
            .rev()
            .copied()
            .find(|&candidate| candidate != node && self.get(candidate).is_some_and(|n| n.frame == frame));
        if let Some(ancestor) = ancestor {
            self.set_recursive_through(ancestor, node)?;
        }
        Ok(())
    }

    pub(crate) fn push_detached(&mut self, node: CallTreeNode) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(node);
        id
    }

    pub(crate) fn push_child_id(&mut self, parent: NodeId, child: NodeId) -> Result<(), TreeError> {
        self.node_mut(parent)?.children.push(child);
        Ok(())
    }
}

impl Default for CallTree {
    fn default() -> Self {
        Self::new()
    }
}

/// Shallow copy of a node: frame and weights are kept, links are cleared.
pub(crate) fn detached_copy(node: &CallTreeNode, parent: Option<NodeId>) -> CallTreeNode {
    CallTreeNode {
        frame: node.frame,
        parent,
        children: Vec::new(),
        locked: false,
        recursive: None,
        weight: node.weight,
    }
}
