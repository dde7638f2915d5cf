// This file is part of RecLo, the offline-recording core of a wearable audio capture device.
// Copyright (c) 2026 RecLo Authors; see LICENSE.txt.
// SPDX-License-Identifier: MIT
//! Abstract interface to wall-clock/monotonic time and sleeping, so the
//! recorder's rotation timer and the transfer worker's pacing can be driven
//! by a real clock in production and a fake one in tests.
//!
//! Grounded on the teacher's `base::clock::Clocks` trait (real vs. mock
//! clock for testability), simplified to `std::time` types since this
//! crate has no need for the teacher's `CLOCK_BOOTTIME` distinction.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::time::Duration;

/// Abstract interface to the system clock, for testability.
pub trait Clocks: Send + Sync + 'static {
    /// Milliseconds since an arbitrary, monotonically increasing origin.
    /// Used to measure elapsed time (e.g. since the clock was last synced).
    fn monotonic_ms(&self) -> i64;

    /// Sleeps the calling thread for roughly `d`.
    fn sleep(&self, d: Duration);
}

#[derive(Copy, Clone, Default)]
pub struct RealClocks;

impl Clocks for RealClocks {
    fn monotonic_ms(&self) -> i64 {
        // `Instant` has no fixed epoch we can read across instances, so we
        // anchor to process start the first time this is called.
        static START: std::sync::OnceLock<std::time::Instant> = std::sync::OnceLock::new();
        let start = *START.get_or_init(std::time::Instant::now);
        start.elapsed().as_millis() as i64
    }

    fn sleep(&self, d: Duration) {
        std::thread::sleep(d);
    }
}

/// A fake clock for tests: `monotonic_ms` is driven explicitly, and `sleep`
/// returns immediately after advancing the clock by the requested amount,
/// so tests don't block on real time.
#[derive(Clone)]
pub struct SimClocks(Arc<SimClocksInner>);

struct SimClocksInner {
    ms: AtomicU64,
    cv: Condvar,
    lock: Mutex<()>,
}

impl Default for SimClocks {
    fn default() -> Self {
        Self::new()
    }
}

impl SimClocks {
    pub fn new() -> Self {
        SimClocks(Arc::new(SimClocksInner {
            ms: AtomicU64::new(0),
            cv: Condvar::new(),
            lock: Mutex::new(()),
        }))
    }

    /// Advances the simulated clock and wakes anyone blocked in `sleep`.
    pub fn advance(&self, d: Duration) {
        self.0.ms.fetch_add(d.as_millis() as u64, Ordering::SeqCst);
        let _guard = self.0.lock.lock().unwrap();
        self.0.cv.notify_all();
    }
}

impl Clocks for SimClocks {
    fn monotonic_ms(&self) -> i64 {
        self.0.ms.load(Ordering::SeqCst) as i64
    }

    fn sleep(&self, d: Duration) {
        let target = self.monotonic_ms() + d.as_millis() as i64;
        let guard = self.0.lock.lock().unwrap();
        let _unused = self
            .0
            .cv
            .wait_while(guard, |_| self.monotonic_ms() < target);
    }
}
