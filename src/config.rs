// This file is part of RecLo, the offline-recording core of a wearable audio capture device.
// Copyright (c) 2026 RecLo Authors; see LICENSE.txt.
// SPDX-License-Identifier: MIT
//! CLI/file configuration (`SPEC_FULL.md` §1.3).
//!
//! Grounded on the teacher's `cmds/run/config.rs` split between a
//! `serde`-deserializable on-disk shape and the flags layered on top of
//! it: every field here is optional so a TOML file can supply a subset and
//! CLI flags can override just the ones the operator cares about.

use std::path::PathBuf;

use reclo_recorder::{RecorderConfig, RecorderMode};
use reclo_transfer::PacingConfig;
use serde::Deserialize;

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileConfig {
    pub storage_dir: Option<PathBuf>,
    pub chunk_duration_s: Option<u32>,
    pub mode: Option<String>,
    pub buffer_cap: Option<usize>,
    pub codec_id: Option<u8>,
    pub sample_rate: Option<u32>,
    pub data_interval_ms: Option<u64>,
    pub chunk_interval_ms: Option<u64>,
    pub header_settle_ms: Option<u64>,
    pub include_unsynced: Option<bool>,
}

/// Fully resolved configuration: CLI flags win over the file, the file
/// wins over these built-in defaults (which mirror the original firmware,
/// `SPEC_FULL.md` §0: `codec_id = 20`, `/lfs/reclo`, `D = 30` for the
/// streaming variant).
#[derive(Debug, Clone)]
pub struct Config {
    pub storage_dir: PathBuf,
    pub chunk_duration_s: u32,
    pub mode: RecorderMode,
    pub codec_id: u8,
    pub sample_rate: u32,
    pub pacing: PacingConfig,
    pub include_unsynced: bool,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            storage_dir: PathBuf::from("/lfs/reclo"),
            chunk_duration_s: 30,
            mode: RecorderMode::Streaming { buffer_cap: 4096 },
            codec_id: 20,
            sample_rate: 16_000,
            pacing: PacingConfig::default(),
            include_unsynced: false,
        }
    }
}

impl Config {
    pub fn apply_file(mut self, file: FileConfig) -> Self {
        if let Some(v) = file.storage_dir {
            self.storage_dir = v;
        }
        if let Some(v) = file.chunk_duration_s {
            self.chunk_duration_s = v;
        }
        if let Some(v) = file.mode {
            self.mode = parse_mode(&v, self.mode_buffer_cap());
        }
        if let Some(v) = file.buffer_cap {
            self.mode = match self.mode {
                RecorderMode::Streaming { .. } => RecorderMode::Streaming { buffer_cap: v },
                RecorderMode::Accumulate => RecorderMode::Accumulate,
            };
        }
        if let Some(v) = file.codec_id {
            self.codec_id = v;
        }
        if let Some(v) = file.sample_rate {
            self.sample_rate = v;
        }
        if let Some(v) = file.data_interval_ms {
            self.pacing.data_interval = std::time::Duration::from_millis(v);
        }
        if let Some(v) = file.chunk_interval_ms {
            self.pacing.chunk_interval = std::time::Duration::from_millis(v);
        }
        if let Some(v) = file.header_settle_ms {
            self.pacing.header_settle = std::time::Duration::from_millis(v);
        }
        if let Some(v) = file.include_unsynced {
            self.include_unsynced = v;
        }
        self
    }

    fn mode_buffer_cap(&self) -> usize {
        match self.mode {
            RecorderMode::Streaming { buffer_cap } => buffer_cap,
            RecorderMode::Accumulate => 4096,
        }
    }

    pub fn recorder_config(&self) -> RecorderConfig {
        RecorderConfig {
            chunk_duration_s: self.chunk_duration_s,
            mode: self.mode,
            codec_id: self.codec_id,
            sample_rate: self.sample_rate,
        }
    }
}

fn parse_mode(s: &str, buffer_cap: usize) -> RecorderMode {
    match s {
        "accumulate" => RecorderMode::Accumulate,
        _ => RecorderMode::Streaming { buffer_cap },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_overrides_are_applied_field_by_field() {
        let cfg = Config::default().apply_file(FileConfig {
            storage_dir: Some(PathBuf::from("/tmp/reclo")),
            chunk_duration_s: Some(15),
            mode: Some("accumulate".into()),
            codec_id: Some(21),
            ..Default::default()
        });
        assert_eq!(cfg.storage_dir, PathBuf::from("/tmp/reclo"));
        assert_eq!(cfg.chunk_duration_s, 15);
        assert!(matches!(cfg.mode, RecorderMode::Accumulate));
        assert_eq!(cfg.codec_id, 21);
        assert_eq!(cfg.sample_rate, 16_000); // untouched default
    }

    #[test]
    fn unset_fields_keep_defaults() {
        let cfg = Config::default().apply_file(FileConfig::default());
        let default = Config::default();
        assert_eq!(cfg.storage_dir, default.storage_dir);
        assert_eq!(cfg.chunk_duration_s, default.chunk_duration_s);
    }
}
