// This file is part of RecLo, the offline-recording core of a wearable audio capture device.
// Copyright (c) 2026 RecLo Authors; see LICENSE.txt.
// SPDX-License-Identifier: MIT
//! Ambient foundations shared by `reclo-store`, `reclo-recorder`, and
//! `reclo-transfer`: the crate-wide error type, a testable clock
//! abstraction, the time source (component C1), and `tracing` setup.

pub mod clock;
pub mod error;
pub mod time_source;
pub mod tracing_setup;

pub use clock::{Clocks, RealClocks, SimClocks};
pub use error::{Error, ErrorKind, ResultExt, Result};
pub use time_source::TimeSource;
