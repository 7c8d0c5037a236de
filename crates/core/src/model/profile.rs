use serde::Serialize;

use super::call_tree::{CallTree, CallTreeNode, NodeId};
use super::frame::{Frame, FrameTable};
use super::unit::ValueUnit;

/// Identity and time bounds of a profile, known before any sample is added.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProfileHeader {
    pub name: String,
    pub unit: ValueUnit,
    pub thread_id: u64,
    pub started_at: f64,
    pub ended_at: f64,
}

/// Counters for samples that were not turned into call tree weight.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ProfileStats {
    pub discarded_samples_count: u64,
    pub negative_samples_count: u64,
}

/// A built profile: the append-order call tree plus the flat sample list
/// that attributes elapsed time to nodes of that tree.
///
/// `samples[i]` is the node that was on top of the stack while
/// `weights[i]` elapsed. Both lists always have the same length.
#[derive(Debug, Clone, Serialize)]
pub struct Profile {
    name: String,
    unit: ValueUnit,
    thread_id: u64,
    duration: f64,
    started_at: f64,
    ended_at: f64,
    min_frame_duration: f64,
    frames: FrameTable,
    call_tree: CallTree,
    samples: Vec<NodeId>,
    weights: Vec<f64>,
    stats: ProfileStats,
}

impl Profile {
    pub(crate) fn new(header: ProfileHeader, frames: FrameTable) -> Self {
        Self {
            duration: header.ended_at - header.started_at,
            name: header.name,
            unit: header.unit,
            thread_id: header.thread_id,
            started_at: header.started_at,
            ended_at: header.ended_at,
            min_frame_duration: f64::INFINITY,
            frames,
            call_tree: CallTree::new(),
            samples: Vec::new(),
            weights: Vec::new(),
            stats: ProfileStats::default(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn unit(&self) -> ValueUnit {
        self.unit
    }

    pub fn thread_id(&self) -> u64 {
        self.thread_id
    }

    pub fn duration(&self) -> f64 {
        self.duration
    }

    pub fn started_at(&self) -> f64 {
        self.started_at
    }

    pub fn ended_at(&self) -> f64 {
        self.ended_at
    }

    /// Shortest positive sample seen, or the whole duration when there was
    /// none (which disables finer zoom levels downstream).
    pub fn min_frame_duration(&self) -> f64 {
        self.min_frame_duration
    }

    pub fn frames(&self) -> &FrameTable {
        &self.frames
    }

    pub fn call_tree(&self) -> &CallTree {
        &self.call_tree
    }

    pub fn samples(&self) -> &[NodeId] {
        &self.samples
    }

    pub fn weights(&self) -> &[f64] {
        &self.weights
    }

    pub fn stats(&self) -> ProfileStats {
        self.stats
    }

    /// The frame a call tree node is bound to.
    pub fn frame_of(&self, node: NodeId) -> Option<&Frame> {
        self.call_tree
            .get(node)
            .and_then(|n| self.frames.get(n.frame()))
    }

    /// Sum of all sample weights.
    pub fn total_weight(&self) -> f64 {
        self.weights.iter().sum()
    }

    pub(crate) fn frames_mut(&mut self) -> &mut FrameTable {
        &mut self.frames
    }

    pub(crate) fn call_tree_mut(&mut self) -> &mut CallTree {
        &mut self.call_tree
    }

    pub(crate) fn stats_mut(&mut self) -> &mut ProfileStats {
        &mut self.stats
    }

    pub(crate) fn push_sample(&mut self, node: NodeId, weight: f64) {
        self.samples.push(node);
        self.weights.push(weight);
    }

    /// Push a sample, or grow the previous one when it landed on the same
    /// node.
    pub(crate) fn merge_sample(&mut self, node: NodeId, weight: f64) {
        if self.samples.last() == Some(&node)
            && let Some(last) = self.weights.last_mut()
        {
            *last += weight;
            return;
        }
        self.push_sample(node, weight);
    }

    pub(crate) fn observe_frame_duration(&mut self, duration: f64) {
        self.min_frame_duration = self.min_frame_duration.min(duration);
    }

    /// Stretch the duration to cover every sample and settle the minimum
    /// frame duration.
    pub(crate) fn finalize(&mut self) {
        self.duration = self.duration.max(self.total_weight());
        if self.min_frame_duration == f64::INFINITY {
            log::warn!(
                "profile {:?} has no positive-weight samples; min frame duration set to {}",
                self.name,
                self.duration
            );
            self.min_frame_duration = self.duration;
        }
    }

    /// Replay the flat sample list as a sequence of open and close events.
    ///
    /// `open` and `close` receive the node and the running value (the sum of
    /// the weights of all previous samples). Nodes are opened outermost
    /// first and closed innermost first; the root is never reported.
    pub fn for_each<O, C>(&self, mut open: O, mut close: C)
    where
        O: FnMut(NodeId, f64),
        C: FnMut(NodeId, f64),
    {
        let tree = &self.call_tree;
        let mut prev_stack: Vec<NodeId> = Vec::new();
        let mut value = 0.0;

        for (&stack_top, &weight) in self.samples.iter().zip(&self.weights) {
            // Deepest ancestor of this sample that is still open.
            let mut top = Some(stack_top);
            while let Some(id) = top {
                if tree.is_root(id) || prev_stack.contains(&id) {
                    break;
                }
                top = tree.get(id).and_then(CallTreeNode::parent);
            }

            while let Some(&last) = prev_stack.last() {
                if Some(last) == top {
                    break;
                }
                prev_stack.pop();
                close(last, value);
            }

            let mut to_open = Vec::new();
            let mut node = Some(stack_top);
            while let Some(id) = node {
                if tree.is_root(id) || Some(id) == top {
                    break;
                }
                to_open.push(id);
                node = tree.get(id).and_then(CallTreeNode::parent);
            }
            for &id in to_open.iter().rev() {
                open(id, value);
                prev_stack.push(id);
            }

            value += weight;
        }

        for &id in prev_stack.iter().rev() {
            close(id, value);
        }
    }
}

/// The result of one import: every profile found in the input.
#[derive(Debug, Clone, Serialize)]
pub struct ProfileGroup {
    pub name: String,
    pub trace_id: String,
    pub active_profile_index: usize,
    pub profiles: Vec<Profile>,
}

impl ProfileGroup {
    pub fn active_profile(&self) -> Option<&Profile> {
        self.profiles.get(self.active_profile_index)
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;

    use super::*;
    use crate::model::{FrameDialect, FrameId, FrameInfo};

    fn header() -> ProfileHeader {
        ProfileHeader {
            name: "test".into(),
            unit: ValueUnit::Milliseconds,
            thread_id: 1,
            started_at: 0.0,
            ended_at: 10.0,
        }
    }

    fn profile_with(names: &[&str]) -> (Profile, Vec<FrameId>) {
        let mut frames = FrameTable::new();
        let ids = names
            .iter()
            .enumerate()
            .map(|(i, n)| frames.insert(FrameInfo::new(i, *n), FrameDialect::Mobile))
            .collect();
        (Profile::new(header(), frames), ids)
    }

    #[test]
    fn finalize_stretches_duration_to_weights() {
        let (mut profile, f) = profile_with(&["a"]);
        let a = profile
            .call_tree_mut()
            .append_child(CallTree::ROOT, f[0])
            .unwrap();
        profile.push_sample(a, 8.0);
        profile.push_sample(CallTree::ROOT, 7.0);
        profile.finalize();
        assert_eq!(profile.duration(), 15.0);
        assert_eq!(profile.samples().len(), profile.weights().len());
    }

    #[test]
    fn finalize_without_samples_collapses_min_frame_duration() {
        let (mut profile, _) = profile_with(&[]);
        assert_eq!(profile.min_frame_duration(), f64::INFINITY);
        profile.finalize();
        assert_eq!(profile.duration(), 10.0);
        assert_eq!(profile.min_frame_duration(), 10.0);
    }

    #[test]
    fn merge_sample_extends_same_node() {
        let (mut profile, f) = profile_with(&["a", "b"]);
        let tree = profile.call_tree_mut();
        let a = tree.append_child(CallTree::ROOT, f[0]).unwrap();
        let b = tree.append_child(CallTree::ROOT, f[1]).unwrap();
        profile.merge_sample(a, 1.0);
        profile.merge_sample(a, 2.0);
        profile.merge_sample(b, 4.0);
        assert_eq!(profile.samples(), &[a, b]);
        assert_eq!(profile.weights(), &[3.0, 4.0]);
    }

    #[test]
    fn for_each_replays_open_and_close() {
        let (mut profile, f) = profile_with(&["a", "b", "c"]);
        let tree = profile.call_tree_mut();
        let a = tree.append_child(CallTree::ROOT, f[0]).unwrap();
        let b = tree.append_child(a, f[1]).unwrap();
        let c = tree.append_child(a, f[2]).unwrap();
        profile.push_sample(b, 2.0);
        profile.push_sample(c, 3.0);
        profile.push_sample(CallTree::ROOT, 1.0);

        let events = RefCell::new(Vec::new());
        profile.for_each(
            |node, at| events.borrow_mut().push(("open", node, at)),
            |node, at| events.borrow_mut().push(("close", node, at)),
        );

        assert_eq!(
            events.into_inner(),
            vec![
                ("open", a, 0.0),
                ("open", b, 0.0),
                ("close", b, 2.0),
                ("open", c, 2.0),
                ("close", c, 5.0),
                ("close", a, 5.0),
            ]
        );
    }

    #[test]
    fn for_each_closes_everything_at_the_end() {
        let (mut profile, f) = profile_with(&["a", "b"]);
        let tree = profile.call_tree_mut();
        let a = tree.append_child(CallTree::ROOT, f[0]).unwrap();
        let b = tree.append_child(a, f[1]).unwrap();
        profile.push_sample(b, 4.0);

        let mut closes = Vec::new();
        profile.for_each(|_, _| {}, |node, at| closes.push((node, at)));
        assert_eq!(closes, vec![(b, 4.0), (a, 4.0)]);
    }

    #[test]
    fn group_active_profile() {
        let (profile, _) = profile_with(&[]);
        let group = ProfileGroup {
            name: "g".into(),
            trace_id: "t".into(),
            active_profile_index: 0,
            profiles: vec![profile],
        };
        assert_eq!(group.active_profile().map(Profile::name), Some("test"));
    }
}
