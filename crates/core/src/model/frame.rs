use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use super::weight::Weight;

/// Name carried by the root sentinel frame.
pub const ROOT_FRAME_NAME: &str = "sentry root";

/// Index of a frame inside its owning [`FrameTable`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FrameId(usize);

impl FrameId {
    /// The root sentinel, present in every frame table.
    pub const ROOT: FrameId = FrameId(0);

    pub fn index(self) -> usize {
        self.0
    }
}

/// Caller-supplied identity of a frame.
///
/// Index-based formats key frames by their position in the frame list;
/// Chrome traces key them by a string built from the event name and args.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FrameKey {
    Index(u64),
    Text(String),
}

impl fmt::Display for FrameKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Index(i) => write!(f, "{i}"),
            Self::Text(s) => f.write_str(s),
        }
    }
}

impl From<usize> for FrameKey {
    fn from(value: usize) -> Self {
        Self::Index(value as u64)
    }
}

impl From<&str> for FrameKey {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

/// How raw frame fields are interpreted when a [`Frame`] is constructed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FrameDialect {
    /// Browser JavaScript: anonymous and native frames are normalized.
    Web,
    /// Everything else: fields are taken verbatim.
    Mobile,
}

/// Raw identity fields of a call site, before normalization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrameInfo {
    pub key: FrameKey,
    pub name: String,
    pub file: Option<String>,
    pub path: Option<String>,
    pub line: Option<u32>,
    pub column: Option<u32>,
    pub is_application: bool,
    pub image: Option<String>,
    pub resource: Option<String>,
    pub thread_id: Option<u64>,
}

impl FrameInfo {
    pub fn new(key: impl Into<FrameKey>, name: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            name: name.into(),
            file: None,
            path: None,
            line: None,
            column: None,
            is_application: false,
            image: None,
            resource: None,
            thread_id: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FrameKind {
    Root,
    Regular,
}

/// A call site. Frames accumulate weight across the whole profile,
/// independent of where they appear in the call tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Frame {
    pub key: FrameKey,
    pub name: String,
    pub file: Option<String>,
    pub path: Option<String>,
    pub line: Option<u32>,
    pub column: Option<u32>,
    pub is_application: bool,
    pub image: Option<String>,
    pub resource: Option<String>,
    pub thread_id: Option<u64>,
    kind: FrameKind,
    weight: Weight,
}

impl Frame {
    pub fn new(info: FrameInfo, dialect: FrameDialect) -> Self {
        let FrameInfo {
            key,
            mut name,
            file,
            path,
            line,
            column,
            is_application,
            image,
            resource,
            thread_id,
        } = info;

        let is_application = match dialect {
            FrameDialect::Web => {
                // Unnamed web frames are IIFEs or anonymous callbacks.
                if name.is_empty() {
                    name.push_str("anonymous");
                }
                let native = line.is_none() && column.is_none();
                if native {
                    name.push_str(" [native code]");
                }
                !native
            }
            FrameDialect::Mobile => is_application,
        };

        Self {
            key,
            name,
            file,
            path,
            line,
            column,
            is_application,
            image,
            resource,
            thread_id,
            kind: FrameKind::Regular,
            weight: Weight::default(),
        }
    }

    /// The root sentinel frame.
    pub fn root() -> Self {
        Self {
            key: FrameKey::Text(ROOT_FRAME_NAME.to_string()),
            name: ROOT_FRAME_NAME.to_string(),
            file: None,
            path: None,
            line: None,
            column: None,
            is_application: false,
            image: None,
            resource: None,
            thread_id: None,
            kind: FrameKind::Root,
            weight: Weight::default(),
        }
    }

    /// Whether this is the root sentinel. Checked by tag, so a user frame
    /// that happens to be named "sentry root" is not a root.
    pub fn is_root(&self) -> bool {
        self.kind == FrameKind::Root
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

    pub fn add_to_total_weight(&mut self, delta: f64) -> f64 {
        self.weight.add_to_total(delta)
    }

    pub fn add_to_self_weight(&mut self, delta: f64) -> f64 {
        self.weight.add_to_self(delta)
    }
}

/// Per-import frame arena. Slot 0 always holds the root sentinel.
///
/// Every built profile owns its own copy, so frame weights accumulated by
/// one profile never show up in another.
#[derive(Debug, Clone, Serialize)]
pub struct FrameTable {
    frames: Vec<Frame>,
    #[serde(skip)]
    by_key: HashMap<FrameKey, FrameId>,
}

impl FrameTable {
    pub fn new() -> Self {
        Self {
            frames: vec![Frame::root()],
            by_key: HashMap::new(),
        }
    }

    /// Add a frame. A later frame with the same key shadows the earlier one
    /// in [`FrameTable::by_key`] lookups.
    pub fn insert(&mut self, info: FrameInfo, dialect: FrameDialect) -> FrameId {
        let id = FrameId(self.frames.len());
        let frame = Frame::new(info, dialect);
        self.by_key.insert(frame.key.clone(), id);
        self.frames.push(frame);
        id
    }

    /// Return the frame registered under `key`, creating it from `info` the
    /// first time the key is seen.
    pub fn get_or_insert_with(
        &mut self,
        key: &FrameKey,
        dialect: FrameDialect,
        info: impl FnOnce() -> FrameInfo,
    ) -> FrameId {
        if let Some(&id) = self.by_key.get(key) {
            return id;
        }
        self.insert(info(), dialect)
    }

    pub fn by_key(&self, key: &FrameKey) -> Option<FrameId> {
        self.by_key.get(key).copied()
    }

    pub fn get(&self, id: FrameId) -> Option<&Frame> {
        self.frames.get(id.0)
    }

    pub fn get_mut(&mut self, id: FrameId) -> Option<&mut Frame> {
        self.frames.get_mut(id.0)
    }

    pub fn contains(&self, id: FrameId) -> bool {
        id.0 < self.frames.len()
    }

    pub fn root(&self) -> &Frame {
        &self.frames[0]
    }

    /// Number of frames, including the root sentinel.
    pub fn len(&self) -> usize {
        self.frames.len()
    }

    /// Whether the table holds nothing but the root sentinel.
    pub fn is_empty(&self) -> bool {
        self.frames.len() == 1
    }

    /// All frames with their ids, root first.
    pub fn iter(&self) -> impl Iterator<Item = (FrameId, &Frame)> {
        self.frames.iter().enumerate().map(|(i, f)| (FrameId(i), f))
    }
}

impl Default for FrameTable {
    fn default() -> Self {
        Self::new()
    }
}
