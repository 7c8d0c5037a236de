use std::collections::HashMap;

use serde::Serialize;

use crate::model::{FrameId, Profile};

/// A single row in the ranked table.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RankedFrame {
    pub frame: FrameId,
    pub name: String,
    pub self_weight: f64,
    pub total_weight: f64,
    /// Number of call tree nodes bound to the frame.
    pub count: u32,
}

/// Sort field for the ranked view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RankedSort {
    SelfWeight,
    TotalWeight,
    Name,
    Count,
}

/// Frames of `profile` that carry any weight, heaviest first. Ties are broken
/// by name.
pub fn rank_frames(profile: &Profile, sort: RankedSort) -> Vec<RankedFrame> {
    let tree = profile.call_tree();
    let mut counts: HashMap<FrameId, u32> = HashMap::new();
    for id in tree.ids().filter(|&id| !tree.is_root(id)) {
        if let Some(node) = tree.get(id) {
            *counts.entry(node.frame()).or_default() += 1;
        }
    }

    let mut entries: Vec<RankedFrame> = profile
        .frames()
        .iter()
        .filter(|(_, frame)| !frame.is_root())
        .filter(|(_, frame)| frame.total_weight() != 0.0 || frame.self_weight() != 0.0)
        .map(|(id, frame)| RankedFrame {
            frame: id,
            name: frame.name.clone(),
            self_weight: frame.self_weight(),
            total_weight: frame.total_weight(),
            count: counts.get(&id).copied().unwrap_or(0),
        })
        .collect();

    match sort {
        RankedSort::SelfWeight => entries.sort_by(|a, b| {
            b.self_weight
                .total_cmp(&a.self_weight)
                .then_with(|| a.name.cmp(&b.name))
        }),
        RankedSort::TotalWeight => entries.sort_by(|a, b| {
            b.total_weight
                .total_cmp(&a.total_weight)
                .then_with(|| a.name.cmp(&b.name))
        }),
        RankedSort::Name => entries.sort_by(|a, b| a.name.cmp(&b.name)),
        RankedSort::Count => {
            entries.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.name.cmp(&b.name)));
        }
    }
    entries
}
