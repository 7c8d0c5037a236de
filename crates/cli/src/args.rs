//! CLI argument definitions

use std::path::PathBuf;

use clap::Parser;

#[derive(Debug, Parser)]
#[command(
    name = "calltree",
    about = "Summarize profiling data as weighted call trees",
    after_help = "\
INPUTS:
    Sentry profiling schema, JS Self-Profiling traces and Chrome trace
    event arrays (including V8 ProfileChunk traces). Chrome traces cut
    short without their closing bracket are accepted.

EXAMPLES:
    calltree profile.json                    Heaviest frames of every profile
    calltree trace.json --top 25 --inverted  Also list the hottest leaves
    calltree trace.json --collapsed          Folded stacks for flamegraph tools"
)]
pub struct Args {
    /// Profile file to import
    #[arg(value_name = "INPUT")]
    pub input: PathBuf,

    /// Trace id to attach to the import (defaults to the file name)
    #[arg(long, value_name = "ID")]
    pub trace_id: Option<String>,

    /// Number of frames to list per profile
    #[arg(long, default_value_t = 10)]
    pub top: usize,

    /// List the leaves of the inverted call tree
    #[arg(long)]
    pub inverted: bool,

    /// Print folded stacks
    #[arg(long)]
    pub collapsed: bool,

    /// Emit a JSON report instead of text
    #[arg(long)]
    pub json: bool,

    /// Log debug output (RUST_LOG takes precedence)
    #[arg(short, long)]
    pub verbose: bool,
}
