//! V8 CPU profiles embedded in Chrome performance traces.
//!
//! A `Profile` event opens a session and `ProfileChunk` events carry
//! incremental node lists, sampled node ids, and the time between samples.
//! Events of one session share their `pid` and `id`.

use std::collections::HashMap;

use serde::Deserialize;
use serde_json::Value;

use super::chrome::{ChromeParseError, TraceEvent, profile_name};
use crate::builders::SampledBuilder;
use crate::model::{
    FrameDialect, FrameId, FrameInfo, FrameKey, FrameTable, Profile, ProfileHeader, ValueUnit,
};

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SessionStart {
    #[serde(default)]
    start_time: Option<f64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChunkData {
    #[serde(default)]
    cpu_profile: ChunkProfile,
    #[serde(default)]
    time_deltas: Vec<f64>,
}

#[derive(Debug, Default, Deserialize)]
struct ChunkProfile {
    #[serde(default)]
    nodes: Vec<V8Node>,
    #[serde(default)]
    samples: Vec<u64>,
}

#[derive(Debug, Clone, Deserialize)]
struct V8Node {
    id: u64,
    #[serde(default)]
    parent: Option<u64>,
    #[serde(rename = "callFrame")]
    call_frame: CallFrame,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CallFrame {
    #[serde(default)]
    function_name: String,
    #[serde(default)]
    url: String,
    /// Zero-based, -1 when unknown.
    #[serde(default = "unknown_position")]
    line_number: i64,
    #[serde(default = "unknown_position")]
    column_number: i64,
}

fn unknown_position() -> i64 {
    -1
}

fn one_based(position: i64) -> Option<u32> {
    u32::try_from(position).ok().and_then(|p| p.checked_add(1))
}

impl V8Node {
    fn is_root(&self) -> bool {
        self.parent.is_none() && self.call_frame.function_name == "(root)"
    }

    fn frame_key(&self) -> FrameKey {
        let cf = &self.call_frame;
        FrameKey::Text(format!(
            "{}:{}:{}:{}",
            cf.function_name, cf.url, cf.line_number, cf.column_number
        ))
    }

    /// V8 pseudo frames such as `(program)` or `(garbage collector)` carry
    /// no source position and are kept verbatim.
    fn dialect(&self) -> FrameDialect {
        if self.call_frame.function_name.starts_with('(') {
            FrameDialect::Mobile
        } else {
            FrameDialect::Web
        }
    }

    fn frame_info(&self) -> FrameInfo {
        let cf = &self.call_frame;
        let mut info = FrameInfo::new(self.frame_key(), cf.function_name.as_str());
        if !cf.url.is_empty() {
            info.file = Some(cf.url.clone());
        }
        info.line = one_based(cf.line_number);
        info.column = one_based(cf.column_number);
        info
    }
}

/// Everything gathered for one profiling session.
#[derive(Debug, Default)]
struct Session {
    pid: u64,
    tid: u64,
    start_time: Option<f64>,
    nodes: HashMap<u64, V8Node>,
    samples: Vec<u64>,
    time_deltas: Vec<f64>,
}

impl Session {
    /// Sample timestamps, in time order. V8 may emit negative deltas, so
    /// the running sum is not monotonic before sorting.
    fn timed_samples(&self) -> Vec<(f64, u64)> {
        let mut ts = self.start_time.unwrap_or(0.0);
        let mut timed: Vec<(f64, u64)> = self
            .samples
            .iter()
            .zip(&self.time_deltas)
            .map(|(&node, &delta)| {
                ts += delta;
                (ts, node)
            })
            .collect();
        timed.sort_by(|a, b| a.0.total_cmp(&b.0));
        timed
    }
}

/// Resolves sampled node ids to root-first frame stacks.
struct StackResolver<'a> {
    nodes: &'a HashMap<u64, V8Node>,
    frames: FrameTable,
    cache: HashMap<u64, Vec<FrameId>>,
}

impl<'a> StackResolver<'a> {
    fn new(nodes: &'a HashMap<u64, V8Node>) -> Self {
        Self {
            nodes,
            frames: FrameTable::new(),
            cache: HashMap::new(),
        }
    }

    fn resolve(&mut self, node_id: u64) -> Result<Vec<FrameId>, ChromeParseError> {
        if let Some(stack) = self.cache.get(&node_id) {
            return Ok(stack.clone());
        }

        let mut stack = Vec::new();
        let mut current = Some(node_id);
        while let Some(id) = current {
            let node = self.nodes.get(&id).ok_or(ChromeParseError::UnknownNode(id))?;
            if node.is_root() {
                break;
            }
            if stack.len() > self.nodes.len() {
                log::warn!("cycle in V8 node parents at node {id}; truncating stack");
                break;
            }
            let frame = self
                .frames
                .get_or_insert_with(&node.frame_key(), node.dialect(), || node.frame_info());
            stack.push(frame);
            current = node.parent;
        }
        stack.reverse();

        self.cache.insert(node_id, stack.clone());
        Ok(stack)
    }
}

fn chunk_data(event: &TraceEvent) -> Option<&Value> {
    event.args.as_ref()?.get("data")
}

/// Group `Profile`/`ProfileChunk` events into sessions, in first-seen order.
fn collect_sessions(events: &[TraceEvent]) -> Result<Vec<Session>, ChromeParseError> {
    let mut index: HashMap<(u64, String), usize> = HashMap::new();
    let mut sessions: Vec<Session> = Vec::new();

    for event in events {
        if event.ph != "P" || !matches!(event.name.as_str(), "Profile" | "ProfileChunk") {
            continue;
        }
        let id = event.id.as_ref().map(Value::to_string).unwrap_or_default();
        let slot = *index.entry((event.pid, id)).or_insert_with(|| {
            sessions.push(Session {
                pid: event.pid,
                tid: event.tid,
                ..Session::default()
            });
            sessions.len() - 1
        });
        let session = &mut sessions[slot];

        let Some(data) = chunk_data(event) else {
            continue;
        };
        if event.name == "Profile" {
            let start = SessionStart::deserialize(data)?;
            session.start_time = start.start_time.or(session.start_time);
            session.tid = event.tid;
            continue;
        }

        let chunk = ChunkData::deserialize(data)?;
        for node in chunk.cpu_profile.nodes {
            session.nodes.insert(node.id, node);
        }
        session.samples.extend(chunk.cpu_profile.samples);
        session.time_deltas.extend(chunk.time_deltas);
    }
    Ok(sessions)
}

fn import_session(
    session: &Session,
    process_names: &HashMap<u64, String>,
    thread_names: &HashMap<(u64, u64), String>,
) -> Result<Option<Profile>, ChromeParseError> {
    let timed = session.timed_samples();
    let (Some(&(started_at, _)), Some(&(ended_at, _))) = (timed.first(), timed.last()) else {
        log::warn!(
            "skipping V8 profile on thread {}:{}: no samples",
            session.pid,
            session.tid
        );
        return Ok(None);
    };

    let mut resolver = StackResolver::new(&session.nodes);
    let stacks = timed
        .iter()
        .map(|&(_, node)| resolver.resolve(node))
        .collect::<Result<Vec<_>, _>>()?;

    let header = ProfileHeader {
        name: profile_name(
            session.pid,
            session.tid,
            process_names.get(&session.pid).map(String::as_str),
            thread_names
                .get(&(session.pid, session.tid))
                .map(String::as_str),
        ),
        unit: ValueUnit::Microseconds,
        thread_id: session.tid,
        started_at,
        ended_at,
    };
    let mut builder = SampledBuilder::new(header, resolver.frames);

    // Each sample lasts until the next one; the last has no known end.
    for (i, stack) in stacks.iter().enumerate() {
        let weight = timed.get(i + 1).map_or(0.0, |next| next.0 - timed[i].0);
        builder.append_sample_with_weight(stack, weight)?;
    }
    Ok(Some(builder.build()))
}

/// Import every V8 profiling session found in a Chrome trace event array.
pub(crate) fn import_v8_chunks(events: &[TraceEvent]) -> Result<Vec<Profile>, ChromeParseError> {
    let mut process_names = HashMap::new();
    let mut thread_names = HashMap::new();
    for event in events.iter().filter(|e| e.ph == "M") {
        let Some(name) = event.metadata_name() else {
            continue;
        };
        match event.name.as_str() {
            "process_name" => {
                process_names.insert(event.pid, name.to_string());
            }
            "thread_name" => {
                thread_names.insert((event.pid, event.tid), name.to_string());
            }
            _ => {}
        }
    }

    let sessions = collect_sessions(events)?;
    log::debug!("found {} V8 profiling sessions", sessions.len());

    let mut profiles = Vec::new();
    for session in &sessions {
        if let Some(profile) = import_session(session, &process_names, &thread_names)? {
            profiles.push(profile);
        }
    }
    Ok(profiles)
}
