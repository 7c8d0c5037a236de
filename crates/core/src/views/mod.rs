//! Read-only views derived from built profiles.

pub mod collapsed;
pub mod inverted;
pub mod ranked;

pub use collapsed::{CollapsedStack, collapse_stacks};
pub use inverted::invert_call_tree;
pub use ranked::{RankedFrame, RankedSort, rank_frames};
