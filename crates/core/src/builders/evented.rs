use crate::model::{CallTree, FrameId, FrameTable, NodeId, Profile, ProfileHeader};

use super::BuildError;

/// Builds a profile from open/close events.
///
/// Elapsed time between two events is attributed to whatever was on top of
/// the stack while it elapsed.
#[derive(Debug, Clone)]
pub struct EventedBuilder {
    profile: Profile,
    stack: Vec<FrameId>,
    /// Starts with the tree root, which is never popped.
    append_order_stack: Vec<NodeId>,
    last_value: f64,
}

impl EventedBuilder {
    pub fn new(header: ProfileHeader, frames: FrameTable) -> Self {
        Self {
            profile: Profile::new(header, frames),
            stack: Vec::new(),
            append_order_stack: vec![CallTree::ROOT],
            last_value: 0.0,
        }
    }

    /// Timestamp of the last processed event.
    pub fn last_value(&self) -> f64 {
        self.last_value
    }

    /// Frames currently open, outermost first.
    pub fn open_frames(&self) -> &[FrameId] {
        &self.stack
    }

    /// Length of the append-order stack, root included.
    pub fn append_order_depth(&self) -> usize {
        self.append_order_stack.len()
    }

    pub fn frame_total_weight(&self, frame: FrameId) -> Option<f64> {
        self.profile.frames().get(frame).map(|f| f.total_weight())
    }

    pub fn frames(&self) -> &FrameTable {
        self.profile.frames()
    }

    pub fn frames_mut(&mut self) -> &mut FrameTable {
        self.profile.frames_mut()
    }

    fn elapsed_until(&self, at: f64) -> Result<f64, BuildError> {
        let delta = at - self.last_value;
        if delta < 0.0 {
            return Err(BuildError::NegativeSampleDelta {
                at,
                last: self.last_value,
            });
        }
        Ok(delta)
    }

    /// Credit `delta` to every open frame and node; only the tops of the
    /// stacks get it as self weight.
    fn add_weight(&mut self, delta: f64) -> Result<(), BuildError> {
        let frames = self.profile.frames_mut();
        for &frame in &self.stack {
            frames
                .get_mut(frame)
                .ok_or(BuildError::UnknownFrame(frame))?
                .add_to_total_weight(delta);
        }
        if let Some(&top) = self.stack.last() {
            frames
                .get_mut(top)
                .ok_or(BuildError::UnknownFrame(top))?
                .add_to_self_weight(delta);
        }

        let tree = self.profile.call_tree_mut();
        for &node in &self.append_order_stack {
            tree.add_to_total_weight(node, delta)?;
        }
        if let Some(&top) = self.append_order_stack.last() {
            tree.add_to_self_weight(top, delta)?;
        }
        Ok(())
    }

    pub fn enter_frame(&mut self, frame: FrameId, at: f64) -> Result<(), BuildError> {
        if !self.profile.frames().contains(frame) {
            return Err(BuildError::UnknownFrame(frame));
        }
        let delta = self.elapsed_until(at)?;
        self.add_weight(delta)?;

        let top = *self
            .append_order_stack
            .last()
            .ok_or(BuildError::UnbalancedStack)?;
        // Time since the previous event belongs to the frame that was on top.
        if delta > 0.0 {
            self.profile.push_sample(top, delta);
        }

        let tree = self.profile.call_tree_mut();
        let node = tree.child_for(top, frame)?;
        tree.mark_recursion(&self.append_order_stack, node)?;

        self.append_order_stack.push(node);
        self.stack.push(frame);
        self.last_value = at;
        Ok(())
    }

    pub fn leave_frame(&mut self, frame: FrameId, at: f64) -> Result<(), BuildError> {
        let delta = self.elapsed_until(at)?;
        self.add_weight(delta)?;

        if self.append_order_stack.len() <= 1 {
            return Err(BuildError::UnbalancedStack);
        }
        let leaving = self
            .append_order_stack
            .pop()
            .ok_or(BuildError::UnbalancedStack)?;
        self.profile.call_tree_mut().lock(leaving)?;

        if delta > 0.0 {
            self.profile.push_sample(leaving, delta);
            self.profile.observe_frame_duration(delta);
        } else {
            self.profile.stats_mut().discarded_samples_count += 1;
        }

        if self.stack.last() != Some(&frame) {
            log::debug!("closing {frame:?} while {:?} is on top", self.stack.last());
        }
        self.stack.pop();
        self.last_value = at;
        Ok(())
    }

    /// Finish the profile. Every opened frame must have been closed.
    pub fn build(mut self) -> Result<Profile, BuildError> {
        if self.append_order_stack.len() > 1 {
            return Err(BuildError::UnbalancedStack);
        }
        self.profile.finalize();
        log::debug!(
            "built evented profile {:?}: {} samples, {} nodes",
            self.profile.name(),
            self.profile.samples().len(),
            self.profile.call_tree().len()
        );
        Ok(self.profile)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{FrameDialect, FrameInfo, ValueUnit};

    fn builder(names: &[&str]) -> (EventedBuilder, Vec<FrameId>) {
        let mut frames = FrameTable::new();
        let ids = names
            .iter()
            .enumerate()
            .map(|(i, n)| frames.insert(FrameInfo::new(i, *n), FrameDialect::Mobile))
            .collect();
        let header = ProfileHeader {
            name: "evented".into(),
            unit: ValueUnit::Milliseconds,
            thread_id: 0,
            started_at: 0.0,
            ended_at: 100.0,
        };
        (EventedBuilder::new(header, frames), ids)
    }

    #[test]
    fn balanced_events_build() {
        let (mut b, f) = builder(&["main", "foo", "bar"]);
        b.enter_frame(f[0], 0.0).unwrap();
        b.enter_frame(f[1], 10.0).unwrap();
        b.leave_frame(f[1], 50.0).unwrap();
        b.enter_frame(f[2], 60.0).unwrap();
        b.leave_frame(f[2], 80.0).unwrap();
        b.leave_frame(f[0], 100.0).unwrap();
        assert_eq!(b.append_order_depth(), 1);
        assert!(b.open_frames().is_empty());

        let profile = b.build().unwrap();
        assert_eq!(profile.samples().len(), profile.weights().len());
        assert_eq!(profile.weights(), &[10.0, 40.0, 10.0, 20.0, 20.0]);
        assert_eq!(profile.duration(), 100.0);
        assert_eq!(profile.min_frame_duration(), 20.0);

        let main = profile.frames().get(f[0]).unwrap();
        assert_eq!(main.total_weight(), 100.0);
        assert_eq!(main.self_weight(), 40.0);
        let foo = profile.frames().get(f[1]).unwrap();
        assert_eq!(foo.total_weight(), 40.0);
        assert_eq!(foo.self_weight(), 40.0);

        let tree = profile.call_tree();
        let main_node = tree.root().children()[0];
        assert_eq!(tree.node(main_node).unwrap().total_weight(), 100.0);
        assert_eq!(tree.node(main_node).unwrap().children().len(), 2);
        assert!(tree.is_locked(main_node));
    }

    #[test]
    fn out_of_order_enter_is_fatal() {
        let (mut b, f) = builder(&["a", "b"]);
        b.enter_frame(f[0], 10.0).unwrap();
        let err = b.enter_frame(f[1], 5.0).unwrap_err();
        assert_eq!(
            err,
            BuildError::NegativeSampleDelta {
                at: 5.0,
                last: 10.0
            }
        );
    }

    #[test]
    fn out_of_order_leave_is_fatal() {
        let (mut b, f) = builder(&["a"]);
        b.enter_frame(f[0], 10.0).unwrap();
        assert!(matches!(
            b.leave_frame(f[0], 9.0),
            Err(BuildError::NegativeSampleDelta { .. })
        ));
    }

    #[test]
    fn unclosed_frame_fails_build() {
        let (mut b, f) = builder(&["a"]);
        b.enter_frame(f[0], 0.0).unwrap();
        assert_eq!(b.build().unwrap_err(), BuildError::UnbalancedStack);
    }

    #[test]
    fn closing_more_than_opened_is_fatal() {
        let (mut b, f) = builder(&["a"]);
        assert_eq!(
            b.leave_frame(f[0], 1.0).unwrap_err(),
            BuildError::UnbalancedStack
        );
    }

    #[test]
    fn idle_time_is_attributed_to_root() {
        let (mut b, f) = builder(&["a"]);
        b.enter_frame(f[0], 5.0).unwrap();
        b.leave_frame(f[0], 8.0).unwrap();
        let profile = b.build().unwrap();
        assert_eq!(profile.samples()[0], CallTree::ROOT);
        assert_eq!(profile.weights(), &[5.0, 3.0]);
    }

    #[test]
    fn reopening_closed_frame_creates_sibling() {
        let (mut b, f) = builder(&["a"]);
        b.enter_frame(f[0], 0.0).unwrap();
        b.leave_frame(f[0], 1.0).unwrap();
        b.enter_frame(f[0], 1.0).unwrap();
        b.leave_frame(f[0], 2.0).unwrap();
        let profile = b.build().unwrap();
        assert_eq!(profile.call_tree().root().children().len(), 2);
    }

    #[test]
    fn recursion_is_detected_on_push() {
        let (mut b, f) = builder(&["a", "b"]);
        b.enter_frame(f[0], 0.0).unwrap();
        b.enter_frame(f[1], 1.0).unwrap();
        b.enter_frame(f[0], 2.0).unwrap();
        b.leave_frame(f[0], 3.0).unwrap();
        b.leave_frame(f[1], 4.0).unwrap();
        b.leave_frame(f[0], 5.0).unwrap();
        let profile = b.build().unwrap();

        let tree = profile.call_tree();
        let outer = tree.root().children()[0];
        let middle = tree.node(outer).unwrap().children()[0];
        let inner = tree.node(middle).unwrap().children()[0];
        assert_eq!(tree.node(outer).unwrap().recursive(), Some(inner));
        assert_eq!(tree.node(inner).unwrap().recursive(), Some(outer));
    }

    #[test]
    fn same_timestamp_close_counts_as_discarded() {
        let (mut b, f) = builder(&["a", "b"]);
        b.enter_frame(f[0], 0.0).unwrap();
        b.enter_frame(f[1], 0.0).unwrap();
        b.leave_frame(f[1], 4.0).unwrap();
        b.leave_frame(f[0], 4.0).unwrap();
        let profile = b.build().unwrap();
        assert_eq!(profile.stats().discarded_samples_count, 1);
        assert_eq!(profile.weights(), &[4.0]);
    }

    #[test]
    fn unknown_frame_is_rejected() {
        let (mut b, _) = builder(&["a"]);
        let mut other = FrameTable::new();
        other.insert(FrameInfo::new(0usize, "x"), FrameDialect::Mobile);
        let stray = other.insert(FrameInfo::new(1usize, "y"), FrameDialect::Mobile);
        assert_eq!(
            b.enter_frame(stray, 0.0).unwrap_err(),
            BuildError::UnknownFrame(stray)
        );
    }
}
