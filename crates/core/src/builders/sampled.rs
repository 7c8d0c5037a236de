use crate::model::{CallTree, FrameId, FrameTable, NodeId, Profile, ProfileHeader};

use super::BuildError;

/// What to do with a sample that carries no weight.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ZeroWeight {
    /// Count it as discarded and leave the tree alone.
    Discard,
    /// Insert its stack anyway, so later samples can share the path.
    Retain,
}

/// Builds a profile from discrete stacks, each carrying a weight.
///
/// Every call walks the whole stack from the root; no state other than the
/// tree itself is carried between samples.
#[derive(Debug, Clone)]
pub struct SampledBuilder {
    profile: Profile,
    zero_weight: ZeroWeight,
}

impl SampledBuilder {
    pub fn new(header: ProfileHeader, frames: FrameTable) -> Self {
        Self::with_zero_weight(header, frames, ZeroWeight::Discard)
    }

    pub fn with_zero_weight(header: ProfileHeader, frames: FrameTable, zero_weight: ZeroWeight) -> Self {
        Self {
            profile: Profile::new(header, frames),
            zero_weight,
        }
    }

    /// Change the zero-weight policy for samples appended from now on.
    pub fn set_zero_weight(&mut self, zero_weight: ZeroWeight) {
        self.zero_weight = zero_weight;
    }

    pub fn profile(&self) -> &Profile {
        &self.profile
    }

    /// Append one sample. `stack` runs from the outermost frame to the leaf.
    pub fn append_sample_with_weight(&mut self, stack: &[FrameId], weight: f64) -> Result<(), BuildError> {
        if weight < 0.0 {
            self.profile.stats_mut().negative_samples_count += 1;
        }
        if weight == 0.0 && self.zero_weight == ZeroWeight::Discard {
            self.profile.stats_mut().discarded_samples_count += 1;
            return Ok(());
        }
        if let Some(&unknown) = stack.iter().find(|&&f| !self.profile.frames().contains(f)) {
            return Err(BuildError::UnknownFrame(unknown));
        }

        let tree = self.profile.call_tree_mut();
        let mut node = CallTree::ROOT;
        let mut path: Vec<NodeId> = Vec::with_capacity(stack.len());
        for &frame in stack {
            node = tree.child_for(node, frame)?;
            tree.add_to_total_weight(node, weight)?;
            tree.mark_recursion(&path, node)?;
            path.push(node);
        }
        tree.add_to_self_weight(node, weight)?;

        // Samples arrive in time order, so nothing below this leaf may
        // branch again.
        let children = tree.node(node)?.children().to_vec();
        for child in children {
            tree.lock(child)?;
        }

        let frames = self.profile.frames_mut();
        let leaf_frame = stack.last().copied().unwrap_or(FrameId::ROOT);
        frames
            .get_mut(leaf_frame)
            .ok_or(BuildError::UnknownFrame(leaf_frame))?
            .add_to_self_weight(weight);
        for &frame in stack {
            frames
                .get_mut(frame)
                .ok_or(BuildError::UnknownFrame(frame))?
                .add_to_total_weight(weight);
        }

        if weight > 0.0 {
            self.profile.observe_frame_duration(weight);
        }
        self.profile.merge_sample(node, weight);
        Ok(())
    }

    pub fn build(mut self) -> Profile {
        self.profile.finalize();
        log::debug!(
            "built sampled profile {:?}: {} samples, {} nodes, {:?}",
            self.profile.name(),
            self.profile.samples().len(),
            self.profile.call_tree().len(),
            self.profile.stats()
        );
        self.profile
    }
}
