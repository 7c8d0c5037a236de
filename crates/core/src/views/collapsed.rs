use std::cell::RefCell;
use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;

use crate::model::{NodeId, Profile};

/// One line of folded-stack output: frame names joined by `;`, outermost
/// first, with the self weight spent at exactly that stack.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CollapsedStack {
    pub stack: String,
    pub weight: f64,
}

impl fmt::Display for CollapsedStack {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.stack, self.weight)
    }
}

struct Folder<'a> {
    profile: &'a Profile,
    names: Vec<&'a str>,
    /// Open value and accumulated child time for each open node.
    open: Vec<(f64, f64)>,
    folded: BTreeMap<String, f64>,
}

impl<'a> Folder<'a> {
    fn open(&mut self, node: NodeId, value: f64) {
        let name = self.profile.frame_of(node).map_or("?", |f| f.name.as_str());
        self.names.push(name);
        self.open.push((value, 0.0));
    }

    fn close(&mut self, value: f64) {
        let Some((opened_at, children)) = self.open.pop() else {
            return;
        };
        let total = value - opened_at;
        let self_weight = total - children;
        if self_weight > 0.0 {
            *self.folded.entry(self.names.join(";")).or_default() += self_weight;
        }
        self.names.pop();
        if let Some(parent) = self.open.last_mut() {
            parent.1 += total;
        }
    }
}

/// Fold the sample timeline of `profile` into collapsed stacks, sorted by
/// stack. Time spent directly on the root is not reported.
pub fn collapse_stacks(profile: &Profile) -> Vec<CollapsedStack> {
    let folder = RefCell::new(Folder {
        profile,
        names: Vec::new(),
        open: Vec::new(),
        folded: BTreeMap::new(),
    });
    profile.for_each(
        |node, value| folder.borrow_mut().open(node, value),
        |_, value| folder.borrow_mut().close(value),
    );

    folder
        .into_inner()
        .folded
        .into_iter()
        .map(|(stack, weight)| CollapsedStack { stack, weight })
        .collect()
}
