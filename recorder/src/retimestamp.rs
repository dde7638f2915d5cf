// This file is part of RecLo, the offline-recording core of a wearable audio capture device.
// Copyright (c) 2026 RecLo Authors; see LICENSE.txt.
// SPDX-License-Identifier: MIT
//! Component C4: the retimestamper (spec.md §4.4).
//!
//! Converts uptime-tagged chunks to wall-clock-tagged chunks once the
//! phone has provided a clock sync. Has no counterpart in the original
//! firmware (it never retimestamps anything — see `SPEC_FULL.md` §0); this
//! module is built directly from the specification, in the idiom of the
//! recorder's own finalize-under-lock, rename-on-success shape.

use std::fs::OpenOptions;
use std::io::{Read, Seek, SeekFrom, Write};

use byteorder::{ByteOrder, LittleEndian};
use reclo_base::{Clocks, Error};
use reclo_store::{ChunkHeader, ChunkStore, Suffix, HEADER_LEN, TS_OFFSET};
use tracing::warn;

use crate::recorder::Recorder;

/// At most this many files are retimestamped per call (spec.md §4.4). If
/// more exist, the caller is expected to invoke [`Recorder::retimestamp`]
/// again; `remaining` on the returned report says how many are left.
pub const N_MAX: usize = 64;

#[derive(Debug, Default, Eq, PartialEq)]
pub struct RetimestampReport {
    pub processed: usize,
    pub remaining: usize,
}

fn real_ts(wall_now_s: i64, uptime_now_s: i64, file_ts: u32) -> u32 {
    let delta = uptime_now_s - file_ts as i64;
    (wall_now_s - delta).max(0) as u32
}

/// Patches the `ts` field of an on-disk `.upt` file and renames it to
/// `.bin`. Leaves the file as `.upt` (and logs) on any failure, per
/// spec.md §4.4's stated failure mode: the next sync retries.
fn retimestamp_upt_file(store: &ChunkStore, old_ts: u32, wall_now_s: i64, uptime_now_s: i64) {
    let old_path = store.path_for(old_ts, Suffix::Upt);
    let outcome: Result<u32, Error> = (|| {
        let mut file = OpenOptions::new().read(true).write(true).open(&old_path)?;
        let mut header_buf = [0u8; HEADER_LEN];
        file.read_exact(&mut header_buf)?;
        let header = ChunkHeader::decode(&header_buf)?;
        let new_ts = real_ts(wall_now_s, uptime_now_s, header.ts);
        file.seek(SeekFrom::Start(TS_OFFSET as u64))?;
        let mut ts_buf = [0u8; 4];
        LittleEndian::write_u32(&mut ts_buf, new_ts);
        file.write_all(&ts_buf)?;
        file.sync_all()?;
        Ok(new_ts)
    })();
    match outcome {
        Ok(new_ts) => match store.publish(&old_path, new_ts, Suffix::Bin) {
            Ok(_) => {}
            Err(e) => warn!(old_ts, error = %e, "retimestamp rename failed, left as .upt"),
        },
        Err(e) => warn!(old_ts, error = %e, "retimestamp patch failed, left as .upt"),
    }
}

impl<C: Clocks> Recorder<C> {
    /// Retimestamps the currently-open chunk (if unsynced) and up to
    /// [`N_MAX`] `.upt` files, using the recorder's own time source to
    /// compute `U` and `W` (spec.md §4.4). Safe to call whether or not the
    /// recorder is currently recording.
    pub fn retimestamp(&self) -> Result<RetimestampReport, Error> {
        let wall_now_s = self.time_source().now_s();
        let uptime_now_s = self.time_source().now_uptime_s();
        let mut budget = N_MAX;
        let mut processed = 0usize;

        if self.retimestamp_open_file(wall_now_s, uptime_now_s) {
            processed += 1;
            budget -= 1;
        }

        let upts = self.store().enumerate_upt()?;
        let remaining = upts.len().saturating_sub(budget);
        for ts in upts.into_iter().take(budget) {
            retimestamp_upt_file(self.store(), ts, wall_now_s, uptime_now_s);
            processed += 1;
        }

        Ok(RetimestampReport { processed, remaining })
    }

    /// Returns `true` if the currently-open file was unsynced (and was
    /// therefore retimestamped, counting against the batch budget).
    fn retimestamp_open_file(&self, wall_now_s: i64, uptime_now_s: i64) -> bool {
        let mut state = self.lock_state();
        let state = &mut *state;
        if !state.open || !state.unsynced {
            return false;
        }
        let old_ts = state.ts;
        let new_ts = real_ts(wall_now_s, uptime_now_s, old_ts);

        let patch_result: Result<(), Error> = (|| {
            let file = state.file.as_mut().expect("open implies file present");
            file.seek(SeekFrom::Start(TS_OFFSET as u64))?;
            let mut ts_buf = [0u8; 4];
            LittleEndian::write_u32(&mut ts_buf, new_ts);
            file.write_all(&ts_buf)?;
            file.sync_all()?;
            Ok(())
        })();
        if let Err(e) = patch_result {
            warn!(old_ts, error = %e, "failed to patch open chunk header, left unsynced");
            return false;
        }

        // Close, rename the .tmp path to reflect the new ts, reopen for
        // append, per spec.md §4.4 ("the file reopened for append after
        // rename").
        state.file = None;
        let old_tmp_path = state.tmp_path.take().expect("open implies tmp_path present");
        match self.store().publish(&old_tmp_path, new_ts, Suffix::Tmp) {
            Ok(new_path) => match OpenOptions::new().append(true).open(&new_path) {
                Ok(f) => {
                    state.file = Some(f);
                    state.tmp_path = Some(new_path);
                    state.ts = new_ts;
                    state.unsynced = false;
                    true
                }
                Err(e) => {
                    warn!(old_ts, new_ts, error = %e, "failed to reopen renamed tmp file");
                    // Best-effort: leave the recorder without an open
                    // handle rather than silently losing future frames;
                    // the next rotation will open a fresh chunk.
                    state.open = false;
                    state.tmp_path = Some(new_path);
                    true
                }
            },
            Err(e) => {
                warn!(old_ts, new_ts, error = %e, "retimestamp rename of open chunk failed");
                match OpenOptions::new().append(true).open(&old_tmp_path) {
                    Ok(f) => {
                        state.file = Some(f);
                        state.tmp_path = Some(old_tmp_path);
                    }
                    Err(reopen_err) => {
                        warn!(old_ts, error = %reopen_err, "failed to reopen original tmp file after failed rename");
                        state.open = false;
                    }
                }
                false
            }
        }
    }
}
