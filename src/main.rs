// This file is part of RecLo, the offline-recording core of a wearable audio capture device.
// Copyright (c) 2026 RecLo Authors; see LICENSE.txt.
// SPDX-License-Identifier: MIT
//! `reclo`: builds the chunk store, recorder, and transfer stack described
//! by `SPEC_FULL.md` and runs a demonstration session against a synthetic
//! frame source and an in-process simulated link.
//!
//! Grounded on the teacher's `src/main.rs` top-level `Args` parsing; this
//! binary has one job rather than the teacher's `check`/`config`/`init`/
//! `run`/... subcommand set, so there's a single flat `Args` struct instead
//! of a dispatched enum.

use std::path::PathBuf;
use std::time::Duration;

use bpaf::Bpaf;
use reclo::config::{Config, FileConfig};
use reclo::demo::run_demo;

#[derive(Bpaf, Debug)]
#[bpaf(options, version)]
struct Args {
    /// Path to an optional TOML config file (`SPEC_FULL.md` §1.3).
    ///
    /// Any field present here is overridden by the matching CLI flag below
    /// when that flag is also given.
    #[bpaf(long("config"), argument("PATH"))]
    config: Option<PathBuf>,

    /// Directory chunks are written to.
    #[bpaf(long("storage-dir"), argument("DIR"))]
    storage_dir: Option<PathBuf>,

    /// Chunk duration in seconds (`D` in spec.md §4.2).
    #[bpaf(long("chunk-duration-s"), argument("SECONDS"))]
    chunk_duration_s: Option<u32>,

    /// Recorder mode: `streaming` (bounded ring buffer) or `accumulate`
    /// (grow until rotation).
    #[bpaf(long("mode"), argument("MODE"))]
    mode: Option<String>,

    /// Staging buffer capacity in bytes, streaming mode only.
    #[bpaf(long("buffer-cap"), argument("BYTES"))]
    buffer_cap: Option<usize>,

    /// Opus codec identifier stored in each chunk header.
    #[bpaf(long("codec-id"), argument("ID"))]
    codec_id: Option<u8>,

    /// Sample rate in Hz stored in each chunk header.
    #[bpaf(long("sample-rate"), argument("HZ"))]
    sample_rate: Option<u32>,

    /// Include not-yet-retimestamped (`.upt`) chunks in upload batches.
    #[bpaf(long("include-unsynced"), switch)]
    include_unsynced: bool,

    /// Number of synthetic frames to ingest during the demonstration run.
    #[bpaf(long("frames"), argument("N"), fallback(500))]
    frames: u32,

    /// Delay between synthetic frames in milliseconds (0 runs as fast as
    /// possible, useful for tests and CI).
    #[bpaf(long("frame-period-ms"), argument("MS"), fallback(0))]
    frame_period_ms: u64,
}

fn load_config(args: &Args) -> anyhow::Result<Config> {
    let mut config = Config::default();
    if let Some(path) = &args.config {
        let text = std::fs::read_to_string(path)?;
        let file: FileConfig = toml::from_str(&text)?;
        config = config.apply_file(file);
    }
    if let Some(v) = &args.storage_dir {
        config.storage_dir = v.clone();
    }
    if let Some(v) = args.chunk_duration_s {
        config.chunk_duration_s = v;
    }
    if let Some(v) = &args.mode {
        config = config.apply_file(FileConfig {
            mode: Some(v.clone()),
            ..Default::default()
        });
    }
    if let Some(v) = args.buffer_cap {
        config = config.apply_file(FileConfig {
            buffer_cap: Some(v),
            ..Default::default()
        });
    }
    if let Some(v) = args.codec_id {
        config.codec_id = v;
    }
    if let Some(v) = args.sample_rate {
        config.sample_rate = v;
    }
    if args.include_unsynced {
        config.include_unsynced = true;
    }
    Ok(config)
}

fn main() -> anyhow::Result<()> {
    reclo_base::tracing_setup::install();

    let args = args().run();
    let config = load_config(&args)?;

    tracing::info!(?config, "starting reclo demonstration session");
    let report = run_demo(
        &config,
        args.frames,
        Duration::from_millis(args.frame_period_ms),
    )?;
    tracing::info!(
        frames_ingested = report.frames_ingested,
        dropped_frames = report.dropped_frames,
        packets_sent = report.packets_sent,
        "demonstration session complete"
    );
    Ok(())
}
