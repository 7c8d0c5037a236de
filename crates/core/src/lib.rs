//! Weighted call trees built from profiling data.
//!
//! Importers in [`parsers`] turn Sentry schema documents, JS Self-Profiling
//! traces and Chrome trace event arrays into [`model::ProfileGroup`]s. Each
//! profile is populated by one of the two strategies in [`builders`].

pub mod builders;
pub mod model;
pub mod parsers;
pub mod views;

pub use model::{Profile, ProfileGroup};
pub use parsers::{ImportError, import_dropped_profile, import_profile, parse_json};
