pub mod call_tree;
pub mod frame;
pub mod profile;
pub mod unit;
pub mod weight;

pub use call_tree::{CallTree, CallTreeNode, NodeId, TreeError};
pub use frame::{Frame, FrameDialect, FrameId, FrameInfo, FrameKey, FrameTable, ROOT_FRAME_NAME};
pub use profile::{Profile, ProfileGroup, ProfileHeader, ProfileStats};
pub use unit::ValueUnit;
pub use weight::Weight;
