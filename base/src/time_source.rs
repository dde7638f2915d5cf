// This file is part of RecLo, the offline-recording core of a wearable audio capture device.
// Copyright (c) 2026 RecLo Authors; see LICENSE.txt.
// SPDX-License-Identifier: MIT
//! Component C1: wall-clock seconds, with explicit tracking of whether the
//! clock has ever been synchronized to the phone's time-sync command.
//!
//! Grounded on the teacher's `Clocks` abstraction (`clock.rs`) for the
//! underlying monotonic reading; the synced/unsynced bookkeeping itself has
//! no teacher counterpart and is built directly from spec.md §4.1.

use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::Arc;

use crate::clock::Clocks;

/// `(epoch_base, uptime_base_ms, synced)` per spec.md §4.1, implemented with
/// atomics rather than a mutex since reads vastly outnumber writes (every
/// frame touches `now_s()` indirectly through the recorder) and writes
/// happen at most once per phone connection.
pub struct TimeSource<C: Clocks> {
    clocks: C,
    epoch_base_s: AtomicI64,
    uptime_base_ms: AtomicI64,
    synced: AtomicBool,
}

impl<C: Clocks> TimeSource<C> {
    pub fn new(clocks: C) -> Arc<Self> {
        let uptime_base_ms = clocks.monotonic_ms();
        Arc::new(TimeSource {
            clocks,
            epoch_base_s: AtomicI64::new(0),
            uptime_base_ms: AtomicI64::new(uptime_base_ms),
            synced: AtomicBool::new(false),
        })
    }

    /// Seconds since some origin: wall-clock epoch seconds if synced, else
    /// uptime seconds since process start.
    pub fn now_s(&self) -> i64 {
        let uptime_ms = self.clocks.monotonic_ms();
        if self.synced.load(Ordering::Acquire) {
            let base_s = self.epoch_base_s.load(Ordering::Acquire);
            let base_ms = self.uptime_base_ms.load(Ordering::Acquire);
            base_s + (uptime_ms - base_ms) / 1000
        } else {
            uptime_ms / 1000
        }
    }

    /// Returns uptime seconds regardless of sync state; used by the
    /// retimestamper, which needs both `now_s()` (wall, if synced) and the
    /// raw uptime to compute `U` in spec.md §4.4.
    pub fn now_uptime_s(&self) -> i64 {
        self.clocks.monotonic_ms() / 1000
    }

    /// Captures the current uptime as the base for `epoch`. Idempotent: a
    /// repeated call simply rebases. Per spec.md §4.1, callers must not pass
    /// an `epoch` that moves the clock backward relative to a prior call —
    /// the time source does not defend against that, it only records it.
    pub fn set_epoch(&self, epoch: i64) {
        let uptime_ms = self.clocks.monotonic_ms();
        self.epoch_base_s.store(epoch, Ordering::Release);
        self.uptime_base_ms.store(uptime_ms, Ordering::Release);
        self.synced.store(true, Ordering::Release);
    }

    pub fn is_synced(&self) -> bool {
        self.synced.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::SimClocks;
    use std::time::Duration;

    #[test]
    fn unsynced_clock_reports_uptime_seconds() {
        let clocks = SimClocks::new();
        let ts = TimeSource::new(clocks.clone());
        assert!(!ts.is_synced());
        clocks.advance(Duration::from_millis(5_500));
        assert_eq!(ts.now_s(), 5);
        assert_eq!(ts.now_uptime_s(), 5);
    }

    #[test]
    fn set_epoch_rebases_wall_clock_and_flips_synced() {
        let clocks = SimClocks::new();
        let ts = TimeSource::new(clocks.clone());
        clocks.advance(Duration::from_secs(10));
        ts.set_epoch(1_700_000_000);
        assert!(ts.is_synced());
        assert_eq!(ts.now_s(), 1_700_000_000);
        clocks.advance(Duration::from_secs(5));
        assert_eq!(ts.now_s(), 1_700_000_005);
        // uptime keeps advancing independently of the wall-clock base.
        assert_eq!(ts.now_uptime_s(), 15);
    }

    #[test]
    fn set_epoch_is_idempotent_and_rebaseable() {
        let clocks = SimClocks::new();
        let ts = TimeSource::new(clocks.clone());
        ts.set_epoch(1_700_000_000);
        clocks.advance(Duration::from_secs(3));
        ts.set_epoch(1_800_000_000);
        assert_eq!(ts.now_s(), 1_800_000_000);
    }
}
