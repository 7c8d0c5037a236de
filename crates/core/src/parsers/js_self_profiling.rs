use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;

use crate::builders::{BuildError, SampledBuilder, ZeroWeight};
use crate::model::{
    FrameDialect, FrameId, FrameInfo, FrameKey, FrameTable, Profile, ProfileGroup, ProfileHeader,
    ValueUnit,
};

#[derive(Debug, Error)]
pub enum JsSelfProfileParseError {
    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Build(#[from] BuildError),
    #[error("missing stackId {0} in trace, cannot resolve stack")]
    MissingStack(usize),
    #[error("stack {0} has a cyclic parent chain")]
    StackCycle(usize),
    #[error("trace contains no samples")]
    NoSamples,
}

/// A trace produced by the JS Self-Profiling API.
///
/// Stacks are stored as parent-linked entries rather than arrays.
#[derive(Debug, Clone, Deserialize)]
pub struct JsSelfTrace {
    #[serde(default)]
    pub frames: Vec<JsFrame>,
    #[serde(default)]
    pub resources: Vec<String>,
    #[serde(default)]
    pub samples: Vec<JsSample>,
    #[serde(default)]
    pub stacks: Vec<JsStack>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JsFrame {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub resource_id: Option<usize>,
    #[serde(default)]
    pub line: Option<u32>,
    #[serde(default)]
    pub column: Option<u32>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JsSample {
    pub timestamp: f64,
    #[serde(default)]
    pub stack_id: Option<usize>,
    #[serde(default)]
    pub marker: Option<Marker>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JsStack {
    pub frame_id: usize,
    #[serde(default)]
    pub parent_id: Option<usize>,
}

/// What the browser was doing when a sample was taken.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Marker {
    Gc,
    Layout,
    Other,
    Paint,
    Script,
    Style,
}

impl Marker {
    pub const ALL: [Marker; 6] = [
        Marker::Gc,
        Marker::Layout,
        Marker::Other,
        Marker::Paint,
        Marker::Script,
        Marker::Style,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Marker::Gc => "gc",
            Marker::Layout => "layout",
            Marker::Other => "other",
            Marker::Paint => "paint",
            Marker::Script => "script",
            Marker::Style => "style",
        }
    }
}

/// Frame ids for a trace: one per trace frame plus one per marker.
#[derive(Debug, Clone)]
pub struct JsFrameIndex {
    pub table: FrameTable,
    frames: Vec<FrameId>,
    markers: [FrameId; 6],
}

impl JsFrameIndex {
    pub fn new(trace: &JsSelfTrace) -> Self {
        let mut table = FrameTable::new();
        let frames = trace
            .frames
            .iter()
            .enumerate()
            .map(|(i, frame)| {
                let mut info = FrameInfo::new(i, frame.name.clone());
                info.line = frame.line;
                info.column = frame.column;
                info.resource = frame
                    .resource_id
                    .and_then(|r| trace.resources.get(r))
                    .cloned();
                table.insert(info, FrameDialect::Web)
            })
            .collect();
        // Markers have no source location; keep their names verbatim.
        let markers = Marker::ALL.map(|m| {
            table.insert(FrameInfo::new(FrameKey::from(m.as_str()), m.as_str()), FrameDialect::Mobile)
        });
        Self {
            table,
            frames,
            markers,
        }
    }

    pub fn frame(&self, frame_id: usize) -> Option<FrameId> {
        self.frames.get(frame_id).copied()
    }

    pub fn marker(&self, marker: Marker) -> FrameId {
        self.markers[marker as usize]
    }
}

/// Resolve `stack_id` into frames ordered outermost first.
///
/// A marker other than `script` becomes the innermost frame. A sample
/// without a stack id resolves to just its marker (or nothing: the thread
/// was idle). An unknown stack id is fatal; a stack entry whose frame cannot
/// be found ends the walk early and keeps what was resolved so far.
pub fn resolve_stack(
    trace: &JsSelfTrace,
    stack_id: Option<usize>,
    index: &JsFrameIndex,
    marker: Option<Marker>,
) -> Result<Vec<FrameId>, JsSelfProfileParseError> {
    let mut leaf_first = Vec::new();
    if let Some(marker) = marker.filter(|&m| m != Marker::Script) {
        leaf_first.push(index.marker(marker));
    }

    let Some(stack_id) = stack_id else {
        return Ok(leaf_first);
    };
    let mut current = Some(
        trace
            .stacks
            .get(stack_id)
            .ok_or(JsSelfProfileParseError::MissingStack(stack_id))?,
    );

    let mut steps = 0;
    while let Some(stack) = current {
        steps += 1;
        if steps > trace.stacks.len() {
            return Err(JsSelfProfileParseError::StackCycle(stack_id));
        }
        let Some(frame) = index.frame(stack.frame_id) else {
            log::warn!(
                "stack {stack_id} references missing frame {}, truncating",
                stack.frame_id
            );
            break;
        };
        leaf_first.push(frame);
        current = stack.parent_id.and_then(|p| trace.stacks.get(p));
    }

    leaf_first.reverse();
    Ok(leaf_first)
}

/// Build a profile from a decoded trace.
pub fn build_js_self_profile(trace: &JsSelfTrace) -> Result<Profile, JsSelfProfileParseError> {
    let (Some(first), Some(last)) = (trace.samples.first(), trace.samples.last()) else {
        return Err(JsSelfProfileParseError::NoSamples);
    };

    let index = JsFrameIndex::new(trace);
    let header = ProfileHeader {
        name: "JSSelfProfiling".to_string(),
        unit: ValueUnit::Milliseconds,
        thread_id: 0,
        started_at: first.timestamp,
        ended_at: last.timestamp,
    };
    let mut builder = SampledBuilder::with_zero_weight(header, index.table.clone(), ZeroWeight::Retain);

    // The profiler takes a sample on start, so the first one never has any
    // weight. It is still appended so the next sample can extend its stack.
    let stack = resolve_stack(trace, first.stack_id, &index, first.marker)?;
    builder.append_sample_with_weight(&stack, 0.0)?;
    builder.set_zero_weight(ZeroWeight::Discard);

    for pair in trace.samples.windows(2) {
        let (prev, sample) = (&pair[0], &pair[1]);
        // GC samples may come without a stack; the thread was busy, so the
        // collection is attributed to the previous stack.
        let stack_id = match sample.marker {
            Some(Marker::Gc) => sample.stack_id.or(prev.stack_id),
            _ => sample.stack_id,
        };
        let stack = resolve_stack(trace, stack_id, &index, sample.marker)?;
        builder.append_sample_with_weight(&stack, sample.timestamp - prev.timestamp)?;
    }

    Ok(builder.build())
}

/// Import a JS Self-Profiling trace as a single-profile group.
pub fn import_js_self_profile(
    input: &Value,
    trace_id: &str,
) -> Result<ProfileGroup, JsSelfProfileParseError> {
    let trace = JsSelfTrace::deserialize(input)?;
    let profile = build_js_self_profile(&trace)?;
    Ok(ProfileGroup {
        name: trace_id.to_string(),
        trace_id: trace_id.to_string(),
        active_profile_index: 0,
        profiles: vec![profile],
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn trace() -> JsSelfTrace {
        serde_json::from_value(json!({
            "frames": [
                {"name": "main", "line": 1, "column": 1, "resourceId": 0},
                {"name": "work", "line": 10, "column": 4, "resourceId": 0},
                {"name": "", "line": 20, "column": 2}
            ],
            "resources": ["app.js"],
            "stacks": [
                {"frameId": 0},
                {"frameId": 1, "parentId": 0},
                {"frameId": 2, "parentId": 1},
                {"frameId": 9, "parentId": 1}
            ],
            "samples": [
                {"timestamp": 100, "stackId": 1},
                {"timestamp": 110, "stackId": 1},
                {"timestamp": 125, "stackId": 2},
                {"timestamp": 130, "marker": "gc"}
            ]
        }))
        .unwrap()
    }

    fn names(index: &JsFrameIndex, stack: &[FrameId]) -> Vec<String> {
        stack
            .iter()
            .map(|&id| index.table.get(id).unwrap().name.clone())
            .collect()
    }

    #[test]
    fn resolves_parent_linked_stack_outermost_first() {
        let trace = trace();
        let index = JsFrameIndex::new(&trace);
        let stack = resolve_stack(&trace, Some(2), &index, None).unwrap();
        assert_eq!(names(&index, &stack), vec!["main", "work", "anonymous"]);
    }

    #[test]
    fn marker_becomes_leaf_except_script() {
        let trace = trace();
        let index = JsFrameIndex::new(&trace);
        let stack = resolve_stack(&trace, Some(1), &index, Some(Marker::Paint)).unwrap();
        assert_eq!(names(&index, &stack), vec!["main", "work", "paint"]);
        let stack = resolve_stack(&trace, Some(1), &index, Some(Marker::Script)).unwrap();
        assert_eq!(names(&index, &stack), vec!["main", "work"]);
    }

    #[test]
    fn idle_sample_resolves_to_empty_stack() {
        let trace = trace();
        let index = JsFrameIndex::new(&trace);
        assert!(resolve_stack(&trace, None, &index, None).unwrap().is_empty());
    }

    #[test]
    fn missing_stack_is_fatal() {
        let trace = trace();
        let index = JsFrameIndex::new(&trace);
        assert!(matches!(
            resolve_stack(&trace, Some(42), &index, None),
            Err(JsSelfProfileParseError::MissingStack(42))
        ));
    }

    #[test]
    fn missing_frame_truncates_stack() {
        let trace = trace();
        let index = JsFrameIndex::new(&trace);
        let stack = resolve_stack(&trace, Some(3), &index, Some(Marker::Gc)).unwrap();
        assert_eq!(names(&index, &stack), vec!["gc"]);
    }

    #[test]
    fn cyclic_stack_is_rejected() {
        let trace: JsSelfTrace = serde_json::from_value(json!({
            "frames": [{"name": "a", "line": 1}],
            "resources": [],
            "stacks": [{"frameId": 0, "parentId": 1}, {"frameId": 0, "parentId": 0}],
            "samples": []
        }))
        .unwrap();
        let index = JsFrameIndex::new(&trace);
        assert!(matches!(
            resolve_stack(&trace, Some(0), &index, None),
            Err(JsSelfProfileParseError::StackCycle(0))
        ));
    }

    #[test]
    fn resources_are_attached_to_frames() {
        let trace = trace();
        let index = JsFrameIndex::new(&trace);
        let main = index.table.get(index.frame(0).unwrap()).unwrap();
        assert_eq!(main.resource.as_deref(), Some("app.js"));
        assert!(main.is_application);
    }

    #[test]
    fn builds_profile_from_timestamps() {
        let profile = build_js_self_profile(&trace()).unwrap();
        assert_eq!(profile.name(), "JSSelfProfiling");
        assert_eq!(profile.started_at(), 100.0);
        assert_eq!(profile.ended_at(), 130.0);
        // First sample has zero weight and merges with the second.
        assert_eq!(profile.weights(), &[10.0, 15.0, 5.0]);
        assert_eq!(profile.duration(), 30.0);
        assert_eq!(profile.min_frame_duration(), 5.0);

        // The gc sample reuses the previous stack with gc on top.
        let gc_leaf = *profile.samples().last().unwrap();
        assert_eq!(profile.frame_of(gc_leaf).unwrap().name, "gc");
    }

    #[test]
    fn repeated_timestamp_is_discarded() {
        let trace: JsSelfTrace = serde_json::from_value(json!({
            "frames": [
                {"name": "main", "line": 1},
                {"name": "work", "line": 2},
                {"name": "other", "line": 3}
            ],
            "resources": [],
            "stacks": [
                {"frameId": 0},
                {"frameId": 1, "parentId": 0},
                {"frameId": 2, "parentId": 0}
            ],
            "samples": [
                {"timestamp": 0, "stackId": 0},
                {"timestamp": 10, "stackId": 0},
                {"timestamp": 10, "stackId": 2},
                {"timestamp": 20, "stackId": 1}
            ]
        }))
        .unwrap();
        let profile = build_js_self_profile(&trace).unwrap();
        assert_eq!(profile.weights(), &[10.0, 10.0]);
        assert_eq!(profile.stats().discarded_samples_count, 1);
        // root, main and work; the zero-weight sample never reached the tree
        assert_eq!(profile.call_tree().len(), 3);
        assert!(profile.samples().iter().all(|&n| profile.frame_of(n).unwrap().name != "other"));
    }

    #[test]
    fn empty_trace_is_rejected() {
        let trace: JsSelfTrace =
            serde_json::from_value(json!({"frames": [], "resources": [], "samples": [], "stacks": []}))
                .unwrap();
        assert!(matches!(
            build_js_self_profile(&trace),
            Err(JsSelfProfileParseError::NoSamples)
        ));
    }
}
