//! The two ways a [`Profile`](crate::model::Profile) is populated: explicit
//! open/close events, or discrete weighted stack samples.

pub mod evented;
pub mod sampled;

pub use evented::EventedBuilder;
pub use sampled::{SampledBuilder, ZeroWeight};

use thiserror::Error;

use crate::model::{FrameId, TreeError};

#[derive(Debug, Error, PartialEq)]
pub enum BuildError {
    #[error(
        "sample delta cannot be negative ({at} is before {last}), samples may be corrupt or out of order"
    )]
    NegativeSampleDelta { at: f64, last: f64 },
    #[error("unbalanced append order stack")]
    UnbalancedStack,
    #[error("frame {0:?} is not in the frame table")]
    UnknownFrame(FrameId),
    #[error(transparent)]
    Tree(#[from] TreeError),
}
