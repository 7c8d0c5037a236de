use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;

use super::guards::{is_evented_profile, is_js_profile, is_sampled_profile};
use super::js_self_profiling::{JsSelfProfileParseError, JsSelfTrace, build_js_self_profile};
use crate::builders::{BuildError, EventedBuilder, SampledBuilder};
use crate::model::{
    FrameDialect, FrameId, FrameInfo, FrameTable, Profile, ProfileGroup, ProfileHeader, ValueUnit,
};

#[derive(Debug, Error)]
pub enum SchemaParseError {
    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Build(#[from] BuildError),
    #[error(transparent)]
    JsSelfProfile(#[from] JsSelfProfileParseError),
    #[error("cannot retrieve frame {0} from frame index")]
    UnknownFrame(usize),
    #[error("unknown event type {0:?}")]
    UnknownEventType(String),
    #[error("expected samples.length ({samples}) to equal weights.length ({weights})")]
    SampleWeightMismatch { samples: usize, weights: usize },
    #[error("Unrecognized trace format")]
    Unrecognized,
}

/// Sentry profiling schema: several profiles sharing one frame list.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SchemaFile {
    #[serde(default)]
    transaction_name: Option<String>,
    profiles: Vec<Value>,
    #[serde(default)]
    shared: SharedData,
    #[serde(default)]
    active_profile_index: Option<usize>,
    #[serde(default)]
    metadata: Option<SchemaMetadata>,
}

#[derive(Debug, Default, Deserialize)]
struct SharedData {
    #[serde(default)]
    frames: Vec<SchemaFrame>,
}

#[derive(Debug, Deserialize)]
struct SchemaMetadata {
    #[serde(default)]
    platform: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SchemaFrame {
    #[serde(default)]
    name: String,
    #[serde(default)]
    file: Option<String>,
    #[serde(default)]
    path: Option<String>,
    #[serde(default)]
    line: Option<u32>,
    #[serde(default, alias = "col")]
    column: Option<u32>,
    #[serde(default)]
    is_application: bool,
    #[serde(default)]
    image: Option<String>,
    #[serde(default)]
    resource: Option<String>,
    #[serde(default, alias = "threadId")]
    thread_id: Option<u64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EventedInput {
    #[serde(default)]
    name: String,
    #[serde(default)]
    unit: ValueUnit,
    start_value: f64,
    end_value: f64,
    #[serde(default, alias = "threadID")]
    thread_id: u64,
    #[serde(default)]
    events: Vec<EventInput>,
}

#[derive(Debug, Deserialize)]
struct EventInput {
    #[serde(rename = "type")]
    kind: String,
    frame: usize,
    at: f64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SampledInput {
    #[serde(default)]
    name: String,
    #[serde(default)]
    unit: ValueUnit,
    start_value: f64,
    end_value: f64,
    #[serde(default, alias = "threadID")]
    thread_id: u64,
    #[serde(default)]
    samples: Vec<Vec<usize>>,
    #[serde(default)]
    weights: Vec<f64>,
}

/// Shared frames, indexed by their position in `shared.frames`.
struct SchemaFrameIndex {
    table: FrameTable,
    ids: Vec<FrameId>,
}

impl SchemaFrameIndex {
    fn new(frames: Vec<SchemaFrame>, dialect: FrameDialect) -> Self {
        let mut table = FrameTable::new();
        let ids = frames
            .into_iter()
            .enumerate()
            .map(|(i, f)| {
                let info = FrameInfo {
                    key: i.into(),
                    name: f.name,
                    file: f.file,
                    path: f.path,
                    line: f.line,
                    column: f.column,
                    is_application: f.is_application,
                    image: f.image,
                    resource: f.resource,
                    thread_id: f.thread_id,
                };
                table.insert(info, dialect)
            })
            .collect();
        Self { table, ids }
    }

    fn resolve(&self, index: usize) -> Result<FrameId, SchemaParseError> {
        self.ids
            .get(index)
            .copied()
            .ok_or(SchemaParseError::UnknownFrame(index))
    }
}

fn dialect_for(metadata: Option<&SchemaMetadata>) -> FrameDialect {
    match metadata.and_then(|m| m.platform.as_deref()) {
        Some("javascript" | "node" | "web") => FrameDialect::Web,
        _ => FrameDialect::Mobile,
    }
}

fn import_evented(input: EventedInput, index: &SchemaFrameIndex) -> Result<Profile, SchemaParseError> {
    let header = ProfileHeader {
        name: input.name,
        unit: input.unit,
        thread_id: input.thread_id,
        started_at: input.start_value,
        ended_at: input.end_value,
    };
    let mut builder = EventedBuilder::new(header, index.table.clone());
    for event in input.events {
        let frame = index.resolve(event.frame)?;
        let at = event.at - input.start_value;
        match event.kind.as_str() {
            "O" => builder.enter_frame(frame, at)?,
            "C" => builder.leave_frame(frame, at)?,
            other => return Err(SchemaParseError::UnknownEventType(other.to_string())),
        }
    }
    Ok(builder.build()?)
}

fn import_sampled(input: SampledInput, index: &SchemaFrameIndex) -> Result<Profile, SchemaParseError> {
    if input.samples.len() != input.weights.len() {
        return Err(SchemaParseError::SampleWeightMismatch {
            samples: input.samples.len(),
            weights: input.weights.len(),
        });
    }
    let header = ProfileHeader {
        name: input.name,
        unit: input.unit,
        thread_id: input.thread_id,
        started_at: input.start_value,
        ended_at: input.end_value,
    };
    let mut builder = SampledBuilder::new(header, index.table.clone());
    for (sample, &weight) in input.samples.iter().zip(&input.weights) {
        let stack = sample
            .iter()
            .map(|&i| index.resolve(i))
            .collect::<Result<Vec<_>, _>>()?;
        builder.append_sample_with_weight(&stack, weight)?;
    }
    Ok(builder.build())
}

/// Dispatch one inner profile on its `type`.
fn import_single_profile(profile: &Value, index: &SchemaFrameIndex) -> Result<Profile, SchemaParseError> {
    if is_evented_profile(profile) {
        return import_evented(EventedInput::deserialize(profile)?, index);
    }
    if is_sampled_profile(profile) {
        return import_sampled(SampledInput::deserialize(profile)?, index);
    }
    if is_js_profile(profile) {
        let trace = JsSelfTrace::deserialize(profile)?;
        return Ok(build_js_self_profile(&trace)?);
    }
    Err(SchemaParseError::Unrecognized)
}

/// Import a Sentry schema document. Every profile gets its own copy of the
/// shared frames.
pub fn import_schema(input: &Value, trace_id: &str) -> Result<ProfileGroup, SchemaParseError> {
    let file = SchemaFile::deserialize(input)?;
    let dialect = dialect_for(file.metadata.as_ref());
    let index = SchemaFrameIndex::new(file.shared.frames, dialect);

    let profiles = file
        .profiles
        .iter()
        .map(|p| import_single_profile(p, &index))
        .collect::<Result<Vec<_>, _>>()?;
    log::debug!("imported {} schema profiles", profiles.len());

    Ok(ProfileGroup {
        name: file.transaction_name.unwrap_or_else(|| trace_id.to_string()),
        trace_id: trace_id.to_string(),
        active_profile_index: file.active_profile_index.unwrap_or(0),
        profiles,
    })
}
