// This file is part of RecLo, the offline-recording core of a wearable audio capture device.
// Copyright (c) 2026 RecLo Authors; see LICENSE.txt.
// SPDX-License-Identifier: MIT
//! Component C6: the session controller (spec.md §4.6).
//!
//! Grounded on the teacher's connection/worker-thread wiring in
//! `src/streamer.rs` and the notification-push pattern in `src/web/live.rs`
//! (a connected peer's subscription state gates whether work is pushed to
//! it); the control-command dispatch itself is built from spec.md §4.5-4.6.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use crossbeam_channel::{bounded, Receiver, Sender};
use reclo_base::{Clocks, Error, TimeSource};
use reclo_recorder::Recorder;
use reclo_store::ChunkStore;
use tracing::{debug, info, warn};

use crate::control::{parse_control, ControlCommand};
use crate::link::DataSink;
use crate::upload::{upload_batch, PacingConfig};

/// Tracks link/session state and gates the upload worker (spec.md §4.6).
pub struct SessionController<C: Clocks, S: DataSink + 'static> {
    store: ChunkStore,
    recorder: Arc<Recorder<C>>,
    time: Arc<TimeSource<C>>,
    sink: Arc<S>,
    pacing: PacingConfig,
    include_unsynced: bool,

    connected: AtomicBool,
    notify_enabled: AtomicBool,
    upload_active: AtomicBool,

    wake_tx: Sender<()>,
    wake_rx: Mutex<Option<Receiver<()>>>,
    worker: Mutex<Option<std::thread::JoinHandle<()>>>,
}

impl<C: Clocks, S: DataSink + 'static> SessionController<C, S> {
    pub fn new(
        store: ChunkStore,
        recorder: Arc<Recorder<C>>,
        time: Arc<TimeSource<C>>,
        sink: Arc<S>,
        pacing: PacingConfig,
        include_unsynced: bool,
    ) -> Arc<Self> {
        let (wake_tx, wake_rx) = bounded(1);
        Arc::new(SessionController {
            store,
            recorder,
            time,
            sink,
            pacing,
            include_unsynced,
            connected: AtomicBool::new(false),
            notify_enabled: AtomicBool::new(false),
            upload_active: AtomicBool::new(false),
            wake_tx,
            wake_rx: Mutex::new(Some(wake_rx)),
            worker: Mutex::new(None),
        })
    }

    /// Spawns the dedicated upload worker (spec.md §5: "upload worker —
    /// blocks on a binary semaphore; runs the upload batch"). The
    /// `crossbeam_channel` bounded(1) channel plays the role of that
    /// semaphore.
    pub fn start_worker(self: &Arc<Self>) {
        let Some(wake_rx) = self.wake_rx.lock().unwrap().take() else {
            return; // already started
        };
        let this = Arc::clone(self);
        let handle = std::thread::Builder::new()
            .name("reclo-upload".into())
            .spawn(move || this.upload_worker_loop(wake_rx))
            .expect("spawn upload worker");
        *self.worker.lock().unwrap() = Some(handle);
    }

    fn upload_worker_loop(self: Arc<Self>, wake_rx: Receiver<()>) {
        while wake_rx.recv().is_ok() {
            if !self.upload_active.load(Ordering::Acquire) {
                continue;
            }
            match upload_batch(
                &self.store,
                self.sink.as_ref(),
                &self.upload_active,
                &self.connected,
                &self.pacing,
                self.include_unsynced,
            ) {
                Ok(report) => info!(?report, "upload batch finished"),
                Err(e) => warn!(error = %e, "upload batch failed"),
            }
            // Batch completion clears upload_active regardless of how it
            // ended (spec.md §4.6).
            self.upload_active.store(false, Ordering::Release);
        }
    }

    pub fn on_connect(&self) {
        self.connected.store(true, Ordering::Release);
        info!("link connected");
    }

    /// Disconnect clears `upload_active` (spec.md §4.6); the worker
    /// observes `connected=false` at the next packet/chunk boundary and
    /// stops without sending `UPLOAD_DONE`.
    pub fn on_disconnect(&self) {
        self.connected.store(false, Ordering::Release);
        self.notify_enabled.store(false, Ordering::Release);
        self.upload_active.store(false, Ordering::Release);
        info!("link disconnected");
    }

    pub fn set_notify_enabled(&self, enabled: bool) {
        self.notify_enabled.store(enabled, Ordering::Release);
    }

    pub fn is_upload_active(&self) -> bool {
        self.upload_active.load(Ordering::Acquire)
    }

    /// The phone writes the current epoch seconds on connect (spec.md §6,
    /// external "time sync input"). This updates the time source and
    /// schedules the retimestamper.
    pub fn on_time_sync(&self, epoch_s: i64) {
        self.time.set_epoch(epoch_s);
        info!(epoch_s, "clock synced, scheduling retimestamp");
        match self.recorder.retimestamp() {
            Ok(report) => {
                info!(processed = report.processed, remaining = report.remaining, "retimestamp pass done");
                if report.remaining > 0 {
                    debug!(remaining = report.remaining, "more unsynced chunks than one batch can handle");
                }
            }
            Err(e) => warn!(error = %e, "retimestamp pass failed"),
        }
    }

    /// Dispatches one inbound control-channel write (spec.md §4.5, §4.6).
    pub fn handle_control(&self, bytes: &[u8]) {
        let cmd = match parse_control(bytes) {
            Ok(cmd) => cmd,
            Err(e) => {
                warn!(error = %e, "malformed control write");
                return;
            }
        };
        match cmd {
            ControlCommand::RequestUpload => self.request_upload(),
            ControlCommand::AckChunk { ts } => self.store.unlink(ts),
            ControlCommand::Abort => {
                self.upload_active.store(false, Ordering::Release);
                info!("upload aborted by phone");
            }
            ControlCommand::Unknown(b) => {
                debug!(cmd = b, "ignoring unknown control command");
            }
        }
    }

    /// Wakes the upload worker if the link is up and the phone has
    /// subscribed to notifications; idempotent while a batch is already
    /// active (spec.md §4.5 REQUEST_UPLOAD semantics).
    fn request_upload(&self) {
        if !self.connected.load(Ordering::Acquire) || !self.notify_enabled.load(Ordering::Acquire) {
            debug!("ignoring REQUEST_UPLOAD, link not ready");
            return;
        }
        if self.upload_active.swap(true, Ordering::AcqRel) {
            debug!("REQUEST_UPLOAD while already active, ignoring");
            return;
        }
        let _ = self.wake_tx.try_send(());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packet::PACKET_LEN;
    use reclo_base::SimClocks;
    use reclo_recorder::RecorderConfig;
    use reclo_store::Suffix;
    use std::sync::Mutex as StdMutex;
    use tempfile::tempdir;

    struct NullSink {
        sent: StdMutex<usize>,
    }
    impl DataSink for NullSink {
        fn send(&self, _packet: &[u8; PACKET_LEN]) -> Result<(), Error> {
            *self.sent.lock().unwrap() += 1;
            Ok(())
        }
    }

    fn controller_with(
        tmp: &tempfile::TempDir,
    ) -> Arc<SessionController<SimClocks, NullSink>> {
        let store = ChunkStore::new(tmp.path());
        store.ensure_dir().unwrap();
        let clocks = SimClocks::new();
        let time = TimeSource::new(clocks);
        let recorder = Recorder::new(store.clone(), time.clone(), RecorderConfig::default());
        let sink = Arc::new(NullSink { sent: StdMutex::new(0) });
        let ctrl = SessionController::new(
            store,
            recorder,
            time,
            sink,
            PacingConfig {
                data_interval: std::time::Duration::ZERO,
                chunk_interval: std::time::Duration::ZERO,
                header_settle: std::time::Duration::ZERO,
            },
            false,
        );
        ctrl.start_worker();
        ctrl
    }

    #[test]
    fn request_upload_is_ignored_until_connected_and_subscribed() {
        let tmp = tempdir().unwrap();
        let ctrl = controller_with(&tmp);
        ctrl.handle_control(&[0x01]);
        assert!(!ctrl.is_upload_active());
        ctrl.on_connect();
        ctrl.handle_control(&[0x01]);
        assert!(!ctrl.is_upload_active()); // still not notify-subscribed
        ctrl.set_notify_enabled(true);
        ctrl.handle_control(&[0x01]);
        // worker runs asynchronously and clears the flag on completion of
        // an (empty) batch; just confirm request_upload didn't panic and
        // the store is reachable.
        std::thread::sleep(std::time::Duration::from_millis(50));
        assert!(!ctrl.is_upload_active());
    }

    #[test]
    fn ack_chunk_deletes_file_idempotently() {
        let tmp = tempdir().unwrap();
        let ctrl = controller_with(&tmp);
        let store = ChunkStore::new(tmp.path());
        let path = store.path_for(42, Suffix::Bin);
        std::fs::write(&path, b"RCLO0000000000000").unwrap();
        ctrl.handle_control(&[0x02, 42, 0, 0, 0]);
        assert!(!path.exists());
        // second ACK for the same ts is a no-op, not an error.
        ctrl.handle_control(&[0x02, 42, 0, 0, 0]);
    }

    #[test]
    fn disconnect_clears_upload_active() {
        let tmp = tempdir().unwrap();
        let ctrl = controller_with(&tmp);
        ctrl.on_connect();
        ctrl.set_notify_enabled(true);
        ctrl.upload_active.store(true, Ordering::Release);
        ctrl.on_disconnect();
        assert!(!ctrl.is_upload_active());
    }

    #[test]
    fn unknown_control_command_does_not_panic() {
        let tmp = tempdir().unwrap();
        let ctrl = controller_with(&tmp);
        ctrl.handle_control(&[0xEE, 1, 2, 3]);
    }
}
