use std::collections::HashMap;
use std::io::Write;

use anyhow::Result;
use calltree_core::model::{FrameId, Profile, ProfileGroup, ProfileStats, ValueUnit};
use calltree_core::views::{
    CollapsedStack, RankedFrame, RankedSort, collapse_stacks, invert_call_tree, rank_frames,
};
use serde::Serialize;

use crate::args::Args;

/// The parts of the command line that shape a report.
#[derive(Debug, Clone, Copy)]
pub struct ReportOptions {
    pub top: usize,
    pub inverted: bool,
    pub collapsed: bool,
}

impl From<&Args> for ReportOptions {
    fn from(args: &Args) -> Self {
        Self {
            top: args.top,
            inverted: args.inverted,
            collapsed: args.collapsed,
        }
    }
}

/// A leaf of the inverted call tree, summed over every node bound to the
/// same frame.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HotLeaf {
    pub name: String,
    pub total_weight: f64,
}

fn hot_leaves(profile: &Profile, top: usize) -> Result<Vec<HotLeaf>> {
    let tree = profile.call_tree();
    let inverted = invert_call_tree(tree, tree.root().children())?;

    let mut by_frame: HashMap<FrameId, f64> = HashMap::new();
    for &leaf in inverted.root().children() {
        let node = inverted.node(leaf)?;
        *by_frame.entry(node.frame()).or_default() += node.total_weight();
    }

    let mut leaves: Vec<HotLeaf> = by_frame
        .into_iter()
        .filter_map(|(frame, total_weight)| {
            let name = profile.frames().get(frame)?.name.clone();
            Some(HotLeaf { name, total_weight })
        })
        .collect();
    leaves.sort_by(|a, b| {
        b.total_weight
            .total_cmp(&a.total_weight)
            .then_with(|| a.name.cmp(&b.name))
    });
    leaves.truncate(top);
    Ok(leaves)
}

#[derive(Debug, Serialize)]
pub struct ProfileReport<'a> {
    name: &'a str,
    unit: ValueUnit,
    thread_id: u64,
    duration: f64,
    min_frame_duration: f64,
    samples: usize,
    stats: ProfileStats,
    top_frames: Vec<RankedFrame>,
    #[serde(skip_serializing_if = "Option::is_none")]
    hot_leaves: Option<Vec<HotLeaf>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    collapsed: Option<Vec<CollapsedStack>>,
}

impl<'a> ProfileReport<'a> {
    fn new(profile: &'a Profile, options: &ReportOptions) -> Result<Self> {
        let mut top_frames = rank_frames(profile, RankedSort::SelfWeight);
        top_frames.truncate(options.top);
        let hot_leaves = if options.inverted {
            Some(hot_leaves(profile, options.top)?)
        } else {
            None
        };
        Ok(Self {
            name: profile.name(),
            unit: profile.unit(),
            thread_id: profile.thread_id(),
            duration: profile.duration(),
            min_frame_duration: profile.min_frame_duration(),
            samples: profile.samples().len(),
            stats: profile.stats(),
            top_frames,
            hot_leaves,
            collapsed: options.collapsed.then(|| collapse_stacks(profile)),
        })
    }
}

#[derive(Debug, Serialize)]
pub struct GroupReport<'a> {
    name: &'a str,
    trace_id: &'a str,
    active_profile_index: usize,
    profiles: Vec<ProfileReport<'a>>,
}

impl<'a> GroupReport<'a> {
    pub fn new(group: &'a ProfileGroup, options: &ReportOptions) -> Result<Self> {
        let profiles = group
            .profiles
            .iter()
            .map(|p| ProfileReport::new(p, options))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            name: &group.name,
            trace_id: &group.trace_id,
            active_profile_index: group.active_profile_index,
            profiles,
        })
    }
}

/// Write a human readable summary of `group`.
pub fn write_text(out: &mut impl Write, group: &ProfileGroup, options: &ReportOptions) -> Result<()> {
    let report = GroupReport::new(group, options)?;
    writeln!(
        out,
        "{} (trace {}): {} profile(s)",
        report.name,
        report.trace_id,
        report.profiles.len()
    )?;

    for (i, profile) in report.profiles.iter().enumerate() {
        let unit = profile.unit;
        let marker = if i == report.active_profile_index { " [active]" } else { "" };
        writeln!(out)?;
        writeln!(out, "{}{marker}", profile.name)?;
        writeln!(
            out,
            "  thread {}  duration {}  samples {}  discarded {}  negative {}",
            profile.thread_id,
            unit.format_value(profile.duration),
            profile.samples,
            profile.stats.discarded_samples_count,
            profile.stats.negative_samples_count
        )?;

        writeln!(out, "  {:>12}  {:>12}  frame", "self", "total")?;
        for frame in &profile.top_frames {
            writeln!(
                out,
                "  {:>12}  {:>12}  {}",
                unit.format_value(frame.self_weight),
                unit.format_value(frame.total_weight),
                frame.name
            )?;
        }

        if let Some(leaves) = &profile.hot_leaves {
            writeln!(out, "  hottest leaves:")?;
            for leaf in leaves {
                writeln!(out, "  {:>12}  {}", unit.format_value(leaf.total_weight), leaf.name)?;
            }
        }

        if let Some(stacks) = &profile.collapsed {
            for stack in stacks {
                writeln!(out, "{stack}")?;
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const TRACE: &str = r#"[
        {"name": "thread_name", "ph": "M", "pid": 1, "tid": 1, "args": {"name": "Main"}},
        {"name": "main", "ph": "X", "ts": 0, "dur": 100, "pid": 1, "tid": 1},
        {"name": "parse", "ph": "X", "ts": 10, "dur": 30, "pid": 1, "tid": 1},
        {"name": "emit", "ph": "X", "ts": 50, "dur": 40, "pid": 1, "tid": 1}
    ]"#;

    fn group() -> ProfileGroup {
        calltree_core::import_dropped_profile("trace.json", TRACE).unwrap()
    }

    fn options(inverted: bool, collapsed: bool) -> ReportOptions {
        ReportOptions {
            top: 10,
            inverted,
            collapsed,
        }
    }

    #[test]
    fn text_report_lists_frames() {
        let mut out = Vec::new();
        write_text(&mut out, &group(), &options(false, false)).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.starts_with("chrometrace (trace trace.json): 1 profile(s)"));
        assert!(text.contains("pid (1): Main (1) [active]"));
        assert!(text.contains("emit"));
        assert!(!text.contains("hottest leaves"));
    }

    #[test]
    fn inverted_report_sums_leaves() {
        let group = group();
        let leaves = hot_leaves(&group.profiles[0], 10).unwrap();
        assert_eq!(
            leaves,
            [
                HotLeaf {
                    name: "emit".into(),
                    total_weight: 40.0
                },
                HotLeaf {
                    name: "parse".into(),
                    total_weight: 30.0
                },
            ]
        );
    }

    #[test]
    fn collapsed_lines_are_appended() {
        let mut out = Vec::new();
        write_text(&mut out, &group(), &options(false, true)).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("main;parse 30"));
        assert!(text.contains("main 30"));
    }

    #[test]
    fn json_report_skips_disabled_sections() {
        let group = group();
        let report = GroupReport::new(&group, &options(true, false)).unwrap();
        let value = serde_json::to_value(&report).unwrap();
        let profile = &value["profiles"][0];
        assert_eq!(profile["unit"], "microseconds");
        assert!(profile.get("collapsed").is_none());
        assert_eq!(profile["hot_leaves"][0]["name"], "emit");
    }
}
