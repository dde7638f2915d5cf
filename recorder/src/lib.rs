// This file is part of RecLo, the offline-recording core of a wearable audio capture device.
// Copyright (c) 2026 RecLo Authors; see LICENSE.txt.
// SPDX-License-Identifier: MIT
//! Component C3 (recorder) and component C4 (retimestamper), spec.md §4.3,
//! §4.4.

pub mod recorder;
pub mod retimestamp;

pub use recorder::{Recorder, RecorderConfig, RecorderMode, MAX_FRAME_LEN};
pub use retimestamp::{RetimestampReport, N_MAX};
