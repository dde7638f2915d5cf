// This file is part of RecLo, the offline-recording core of a wearable audio capture device.
// Copyright (c) 2026 RecLo Authors; see LICENSE.txt.
// SPDX-License-Identifier: MIT
//! Logic for setting up a `tracing` subscriber according to our preferences.
//!
//! Simplified from the teacher's `base::tracing_setup` (`MOONFIRE_LOG`,
//! systemd/json formatters, custom panic hook): a wearable's companion CLI
//! has no systemd unit to talk to, so only the human-readable formatter and
//! env-filter layering are kept, under the `RECLO_LOG` variable.

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Installs a process-global `tracing` subscriber. Call once, near the top
/// of `main`.
pub fn install() {
    let filter = EnvFilter::builder()
        .with_default_directive(tracing_subscriber::filter::LevelFilter::INFO.into())
        .with_env_var("RECLO_LOG")
        .from_env_lossy();
    tracing_subscriber::registry()
        .with(
            fmt::Layer::new()
                .with_writer(std::io::stderr)
                .with_thread_names(true)
                .with_filter(filter),
        )
        .init();
}

/// Installs a subscriber suitable for `cargo test`: writes through the test
/// harness's captured-output writer instead of stderr directly.
pub fn install_for_tests() {
    let filter = EnvFilter::builder()
        .with_default_directive(tracing_subscriber::filter::LevelFilter::INFO.into())
        .with_env_var("RECLO_LOG")
        .from_env_lossy();
    let _ = tracing_subscriber::registry()
        .with(
            fmt::Layer::new()
                .with_test_writer()
                .with_thread_names(true)
                .with_filter(filter),
        )
        .try_init();
}
