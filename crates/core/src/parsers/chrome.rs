use std::collections::HashMap;

use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;

use super::guards::{is_chrome_trace_array_format, is_chrome_trace_object_format};
use super::v8_chunks::import_v8_chunks;
use crate::builders::{BuildError, EventedBuilder};
use crate::model::{
    FrameDialect, FrameId, FrameInfo, FrameKey, FrameTable, Profile, ProfileGroup, ProfileHeader,
    ValueUnit,
};

#[derive(Debug, Error)]
pub enum ChromeParseError {
    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Build(#[from] BuildError),
    #[error("Chrometrace object format is not yet supported")]
    ObjectFormat,
    #[error("cannot leave frame {0:?} that was never opened")]
    NeverOpened(String),
    #[error("cannot leave frame: stack is empty")]
    EmptyStack,
    #[error("sample references unknown node {0}")]
    UnknownNode(u64),
}

/// Raw Chrome trace event as found in DevTools JSON exports.
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct TraceEvent {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub ph: String,
    #[serde(default)]
    pub ts: f64,
    #[serde(default)]
    pub dur: Option<f64>,
    #[serde(default)]
    pub tdur: Option<f64>,
    #[serde(default)]
    pub pid: u64,
    #[serde(default)]
    pub tid: u64,
    #[serde(default)]
    pub id: Option<Value>,
    #[serde(default)]
    pub args: Option<Value>,
}

impl TraceEvent {
    /// `args.name` of an `M` metadata event.
    pub(super) fn metadata_name(&self) -> Option<&str> {
        self.args.as_ref()?.get("name")?.as_str()
    }
}

/// Frames are identified by their name plus the compact JSON of their args,
/// so the same function with different arguments gets distinct frames.
fn frame_key(event: &TraceEvent) -> String {
    match &event.args {
        Some(args) => format!("{}{}", event.name, args),
        None => event.name.clone(),
    }
}

/// One half of a span waiting in a begin or end queue.
#[derive(Debug, Clone)]
struct QueuedEvent<'a> {
    ts: f64,
    /// Position in the input, for stable ordering of equal timestamps.
    order: usize,
    name: &'a str,
    key: String,
}

impl<'a> QueuedEvent<'a> {
    fn new(event: &'a TraceEvent, ts: f64, order: usize) -> Self {
        Self {
            ts,
            order,
            name: &event.name,
            key: frame_key(event),
        }
    }
}

/// Latest first, so `pop` yields the next event in time.
fn sort_reverse_chronological(queue: &mut [QueuedEvent<'_>]) {
    queue.sort_by(|a, b| b.ts.total_cmp(&a.ts).then(b.order.cmp(&a.order)));
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Queue {
    Begin,
    End,
}

/// The queue holding the next event in time. Ties go to the begin queue.
fn next_queue(begin: &[QueuedEvent<'_>], end: &[QueuedEvent<'_>]) -> Option<Queue> {
    match (begin.last(), end.last()) {
        (None, None) => None,
        (Some(_), None) => Some(Queue::Begin),
        (None, Some(_)) => Some(Queue::End),
        (Some(b), Some(e)) if b.ts <= e.ts => Some(Queue::Begin),
        (Some(_), Some(_)) => Some(Queue::End),
    }
}

/// Ends sharing a timestamp arrive in no particular order. When the next end
/// does not close the open frame, look among the ends with the same
/// timestamp for one that does and move it to the front.
fn prefer_open_frame(end: &mut [QueuedEvent<'_>], open_key: &str) {
    let Some(next) = end.last() else {
        return;
    };
    if next.key == open_key {
        return;
    }
    let ts = next.ts;
    let front = end.len() - 1;
    let candidate = (0..front)
        .rev()
        .take_while(|&i| end[i].ts == ts)
        .find(|&i| end[i].key == open_key);
    if let Some(i) = candidate {
        end.swap(i, front);
    }
}

/// Events of one (pid, tid) pair, with their input positions.
struct ThreadEvents<'a> {
    pid: u64,
    tid: u64,
    events: Vec<(usize, &'a TraceEvent)>,
}

/// Split events by pid, then tid, both in first-seen order.
fn split_threads(events: &[TraceEvent]) -> Vec<ThreadEvents<'_>> {
    let mut pids: Vec<u64> = Vec::new();
    let mut index: HashMap<(u64, u64), usize> = HashMap::new();
    let mut threads: Vec<ThreadEvents<'_>> = Vec::new();

    for (order, event) in events.iter().enumerate() {
        if !pids.contains(&event.pid) {
            pids.push(event.pid);
        }
        let slot = *index.entry((event.pid, event.tid)).or_insert_with(|| {
            threads.push(ThreadEvents {
                pid: event.pid,
                tid: event.tid,
                events: Vec::new(),
            });
            threads.len() - 1
        });
        threads[slot].events.push((order, event));
    }

    threads.sort_by_key(|t| pids.iter().position(|&p| p == t.pid));
    for thread in &threads {
        log::trace!(
            "chrome thread {}:{} has {} events",
            thread.pid,
            thread.tid,
            thread.events.len()
        );
    }
    threads
}

pub(super) fn profile_name(pid: u64, tid: u64, process: Option<&str>, thread: Option<&str>) -> String {
    let process = match process {
        Some(name) => format!("{name} ({pid})"),
        None => format!("pid ({pid})"),
    };
    let thread = match thread {
        Some(name) => format!("{name} ({tid})"),
        None => format!("tid ({tid})"),
    };
    format!("{process}: {thread}")
}

/// Replay one thread's spans through an [`EventedBuilder`]. Returns `None`
/// for threads without any begin event.
fn import_thread(
    thread: &ThreadEvents<'_>,
    process_names: &HashMap<u64, String>,
) -> Result<Option<Profile>, ChromeParseError> {
    let mut thread_name = None;
    let mut begin = Vec::new();
    let mut end = Vec::new();

    for &(order, event) in &thread.events {
        match event.ph.as_str() {
            "M" if event.name == "thread_name" => thread_name = event.metadata_name(),
            "B" => begin.push(QueuedEvent::new(event, event.ts, order)),
            "E" => end.push(QueuedEvent::new(event, event.ts, order)),
            "X" => {
                let dur = event.dur.or(event.tdur).unwrap_or(0.0);
                begin.push(QueuedEvent::new(event, event.ts, order));
                end.push(QueuedEvent::new(event, event.ts + dur, order));
            }
            _ => {}
        }
    }

    sort_reverse_chronological(&mut begin);
    sort_reverse_chronological(&mut end);

    let (Some(first), Some(last_begin)) = (begin.last(), begin.first()) else {
        log::warn!(
            "skipping chrome thread {}:{}: no begin events",
            thread.pid,
            thread.tid
        );
        return Ok(None);
    };
    let started_at = first.ts;
    let ended_at = end.first().map_or(last_begin.ts, |e| e.ts.max(last_begin.ts));

    let header = ProfileHeader {
        name: profile_name(
            thread.pid,
            thread.tid,
            process_names.get(&thread.pid).map(String::as_str),
            thread_name,
        ),
        unit: ValueUnit::Microseconds,
        thread_id: thread.tid,
        started_at,
        ended_at,
    };
    let mut builder = EventedBuilder::new(header, FrameTable::new());

    while let Some(queue) = next_queue(&begin, &end) {
        match queue {
            Queue::Begin => {
                let Some(event) = begin.pop() else { break };
                let key = FrameKey::Text(event.key.clone());
                let frame = builder
                    .frames_mut()
                    .get_or_insert_with(&key, FrameDialect::Mobile, || {
                        let name = if event.name.is_empty() { "Unknown" } else { event.name };
                        FrameInfo::new(key.clone(), name)
                    });
                builder.enter_frame(frame, event.ts - started_at)?;
            }
            Queue::End => {
                let open = open_frame_key(&builder);
                if let Some(open) = &open {
                    prefer_open_frame(&mut end, open);
                }
                let Some(event) = end.pop() else { break };
                let frame = if event.name.is_empty() {
                    builder.open_frames().last().copied()
                } else {
                    let frame = builder
                        .frames()
                        .by_key(&FrameKey::Text(event.key.clone()))
                        .ok_or_else(|| ChromeParseError::NeverOpened(event.key.clone()))?;
                    Some(frame).filter(|_| open.is_some())
                };
                let frame = frame.ok_or(ChromeParseError::EmptyStack)?;
                builder.leave_frame(frame, event.ts - started_at)?;
            }
        }
    }

    let leftover: Vec<FrameId> = builder.open_frames().iter().rev().copied().collect();
    if !leftover.is_empty() {
        log::warn!(
            "force-closing {} frames left open on chrome thread {}:{}",
            leftover.len(),
            thread.pid,
            thread.tid
        );
    }
    for frame in leftover {
        let at = builder
            .frame_total_weight(frame)
            .unwrap_or(0.0)
            .max(builder.last_value());
        builder.leave_frame(frame, at)?;
    }

    Ok(Some(builder.build()?))
}

fn open_frame_key(builder: &EventedBuilder) -> Option<String> {
    let top = *builder.open_frames().last()?;
    builder.frames().get(top).map(|f| f.key.to_string())
}

/// Import a Chrome trace event array without profile chunks, one profile
/// per thread.
pub(crate) fn import_chrome_events(events: &[TraceEvent]) -> Result<Vec<Profile>, ChromeParseError> {
    let process_names: HashMap<u64, String> = events
        .iter()
        .filter(|e| e.ph == "M" && e.name == "process_name")
        .filter_map(|e| Some((e.pid, e.metadata_name()?.to_string())))
        .collect();

    let mut profiles = Vec::new();
    for thread in split_threads(events) {
        if let Some(profile) = import_thread(&thread, &process_names)? {
            profiles.push(profile);
        }
    }
    Ok(profiles)
}

/// Import any Chrome trace shape. The object format is recognized but
/// rejected.
pub fn import_chrome_trace(input: &Value, trace_id: &str) -> Result<ProfileGroup, ChromeParseError> {
    if is_chrome_trace_object_format(input) {
        return Err(ChromeParseError::ObjectFormat);
    }
    let events = Vec::<TraceEvent>::deserialize(input)?;
    let profiles = if is_chrome_trace_array_format(input) {
        import_v8_chunks(&events)?
    } else {
        import_chrome_events(&events)?
    };
    log::debug!("imported {} chrome trace profiles", profiles.len());

    Ok(ProfileGroup {
        name: "chrometrace".to_string(),
        trace_id: trace_id.to_string(),
        active_profile_index: 0,
        profiles,
    })
}
