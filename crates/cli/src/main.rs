mod args;
mod report;

use std::io::Write;

use anyhow::{Context, Result};
use clap::Parser;

use args::Args;
use report::ReportOptions;

fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.verbose);

    let contents = std::fs::read_to_string(&args.input)
        .with_context(|| format!("failed to read {}", args.input.display()))?;
    let file_name = args.input.file_name().map_or_else(
        || args.input.display().to_string(),
        |name| name.to_string_lossy().into_owned(),
    );

    let mut group = calltree_core::import_dropped_profile(&file_name, &contents)
        .with_context(|| format!("failed to import {file_name}"))?;
    if let Some(trace_id) = &args.trace_id {
        group.trace_id.clone_from(trace_id);
    }
    log::info!("imported {} profiles from {file_name}", group.profiles.len());

    let options = ReportOptions::from(&args);
    let mut out = std::io::stdout().lock();
    if args.json {
        let report = report::GroupReport::new(&group, &options)?;
        serde_json::to_writer_pretty(&mut out, &report)?;
        writeln!(out)?;
    } else {
        report::write_text(&mut out, &group, &options)?;
    }
    Ok(())
}

fn init_logging(verbose: bool) {
    let default_filter = if verbose { "debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .init();
}
