// This file is part of RecLo, the offline-recording core of a wearable audio capture device.
// Copyright (c) 2026 RecLo Authors; see LICENSE.txt.
// SPDX-License-Identifier: MIT
//! The wireless link as an external collaborator (spec.md §6, §9 design
//! note on callback registration): rather than this crate reaching for a
//! concrete BLE stack, callers hand it a [`DataSink`] implementation. This
//! mirrors `denizetkar-walkie-talkie-app`'s `PacketTransport`-style trait
//! boundary between protocol logic and the actual transport.

use reclo_base::Error;

use crate::packet::PACKET_LEN;

/// The outbound data channel: fixed 244-byte notifications.
pub trait DataSink: Send + Sync {
    /// Sends one packet. Implementations should map transient backpressure
    /// (e.g. a full notify queue) to `ErrorKind::WouldBlock` — the upload
    /// worker pauses and retries those — and a severed connection to
    /// `ErrorKind::NotConnected`, which aborts the batch (spec.md §7).
    fn send(&self, packet: &[u8; PACKET_LEN]) -> Result<(), Error>;
}
