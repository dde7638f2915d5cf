// This file is part of RecLo, the offline-recording core of a wearable audio capture device.
// Copyright (c) 2026 RecLo Authors; see LICENSE.txt.
// SPDX-License-Identifier: MIT
//! Component C3: the recorder (spec.md §4.3).
//!
//! Grounded on the teacher's `Streamer` (`src/streamer.rs`): a long-lived
//! object wrapped in `Arc`, driven by a dedicated worker thread, with a
//! single mutex guarding the mutable recording state and an atomic flag
//! gating whether that worker should still be running. The file
//! open/flush/rename state machine itself is grounded on
//! `db::dir::writer::Writer`'s rotate-on-timer, finalize-under-lock shape.

use std::fs::File;
use std::io::{Seek, SeekFrom, Write};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use byteorder::{ByteOrder, LittleEndian};
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender};
use reclo_base::{Clocks, Error, ErrorKind, TimeSource};
use reclo_store::format::encode_frame;
use reclo_store::{ChunkHeader, ChunkStore, Suffix, DATA_SIZE_OFFSET};
use tracing::{debug, info, warn};

/// Maximum frame size the codec is allowed to hand us (spec.md §3).
pub const MAX_FRAME_LEN: usize = u16::MAX as usize;

/// Which RAM strategy the write path uses (spec.md §4.3). Both variants
/// produce the same on-disk chunk format; they differ only in how much of
/// the chunk is buffered in RAM before it hits the filesystem.
#[derive(Clone, Copy, Debug)]
pub enum RecorderMode {
    /// Flush the staging buffer to the open file whenever appending the
    /// next frame would exceed `buffer_cap` bytes. Bounds peak RAM, exposes
    /// up to one buffer's worth of audio to power loss.
    Streaming { buffer_cap: usize },
    /// Keep the whole chunk in RAM and write it in one shot on finalize.
    Accumulate,
}

impl RecorderMode {
    pub fn streaming_default() -> Self {
        RecorderMode::Streaming { buffer_cap: 4096 }
    }
}

#[derive(Clone, Debug)]
pub struct RecorderConfig {
    pub chunk_duration_s: u32,
    pub mode: RecorderMode,
    pub codec_id: u8,
    pub sample_rate: u32,
}

impl Default for RecorderConfig {
    fn default() -> Self {
        RecorderConfig {
            chunk_duration_s: 30,
            mode: RecorderMode::streaming_default(),
            codec_id: 20,
            sample_rate: 16_000,
        }
    }
}

pub(crate) struct RecorderState {
    pub(crate) open: bool,
    pub(crate) file: Option<File>,
    pub(crate) tmp_path: Option<PathBuf>,
    pub(crate) ts: u32,
    pub(crate) unsynced: bool,
    buf: Vec<u8>,
    total_bytes: u64,
}

impl RecorderState {
    fn closed() -> Self {
        RecorderState {
            open: false,
            file: None,
            tmp_path: None,
            ts: 0,
            unsynced: false,
            buf: Vec::new(),
            total_bytes: 0,
        }
    }
}

struct RotationWorker {
    stop_tx: Sender<()>,
    handle: std::thread::JoinHandle<()>,
}

/// The recorder: consumes encoded frames (component C3) and rotates chunk
/// files every `chunk_duration_s` seconds. Intended to be held in an `Arc`
/// and shared with whatever external collaborator produces frames (spec.md
/// §9's "callback registration as global state" note: rather than a global
/// callback slot, callers hold an `Arc<Recorder<_>>` and call
/// [`Recorder::ingest`] directly).
pub struct Recorder<C: Clocks> {
    store: ChunkStore,
    time: Arc<TimeSource<C>>,
    config: RecorderConfig,
    state: Mutex<RecorderState>,
    recording: AtomicBool,
    dropped_frames: AtomicU64,
    worker: Mutex<Option<RotationWorker>>,
}

impl<C: Clocks> Recorder<C> {
    pub fn new(store: ChunkStore, time: Arc<TimeSource<C>>, config: RecorderConfig) -> Arc<Self> {
        Arc::new(Recorder {
            store,
            time,
            config,
            state: Mutex::new(RecorderState::closed()),
            recording: AtomicBool::new(false),
            dropped_frames: AtomicU64::new(0),
            worker: Mutex::new(None),
        })
    }

    /// Creates the storage directory if absent. Idempotent.
    pub fn init(&self) -> Result<(), Error> {
        self.store.ensure_dir()
    }

    pub fn is_recording(&self) -> bool {
        self.recording.load(Ordering::Acquire)
    }

    pub fn dropped_frames(&self) -> u64 {
        self.dropped_frames.load(Ordering::Relaxed)
    }

    pub fn count(&self) -> Result<usize, Error> {
        self.store.count_bin()
    }

    pub(crate) fn store(&self) -> &ChunkStore {
        &self.store
    }

    pub(crate) fn time_source(&self) -> &TimeSource<C> {
        &self.time
    }

    pub(crate) fn lock_state(&self) -> std::sync::MutexGuard<'_, RecorderState> {
        self.state.lock().unwrap()
    }

    /// Opens the first file, arms the rotation timer. Idempotent if already
    /// recording.
    pub fn start(self: &Arc<Self>) -> Result<(), Error> {
        if self.recording.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        self.store.ensure_dir()?;
        {
            let mut state = self.state.lock().unwrap();
            self.open_new_chunk_locked(&mut state)?;
        }
        let (stop_tx, stop_rx) = bounded(1);
        let this = Arc::clone(self);
        let period = Duration::from_secs(self.config.chunk_duration_s as u64);
        let handle = std::thread::Builder::new()
            .name("reclo-rotation".into())
            .spawn(move || this.rotation_loop(stop_rx, period))
            .expect("spawn rotation worker");
        *self.worker.lock().unwrap() = Some(RotationWorker { stop_tx, handle });
        info!(chunk_duration_s = self.config.chunk_duration_s, "recorder started");
        Ok(())
    }

    /// Disarms the timer, finalizes and publishes the open file. Idempotent
    /// if already stopped.
    pub fn stop(&self) -> Result<(), Error> {
        if !self.recording.swap(false, Ordering::AcqRel) {
            return Ok(());
        }
        if let Some(w) = self.worker.lock().unwrap().take() {
            let _ = w.stop_tx.send(());
            let _ = w.handle.join();
        }
        let mut state = self.state.lock().unwrap();
        self.finalize_locked(&mut state);
        info!("recorder stopped");
        Ok(())
    }

    /// Frame ingest callback (spec.md §4.3). Never propagates errors:
    /// invalid or unbuffered frames are logged and counted, never fatal.
    pub fn ingest(&self, frame: &[u8]) {
        if frame.is_empty() || frame.len() > MAX_FRAME_LEN {
            self.dropped_frames.fetch_add(1, Ordering::Relaxed);
            warn!(len = frame.len(), "dropping out-of-range frame");
            return;
        }
        let mut state = self.state.lock().unwrap();
        if !state.open {
            self.dropped_frames.fetch_add(1, Ordering::Relaxed);
            debug!("dropping frame, no chunk file open");
            return;
        }
        let mut encoded = Vec::with_capacity(frame.len() + 2);
        // Length already validated above; this cannot fail.
        encode_frame(&mut encoded, frame).expect("frame length already validated");

        match self.config.mode {
            RecorderMode::Accumulate => {
                state.buf.extend_from_slice(&encoded);
            }
            RecorderMode::Streaming { buffer_cap } => {
                if encoded.len() > buffer_cap {
                    self.dropped_frames.fetch_add(1, Ordering::Relaxed);
                    warn!(len = encoded.len(), buffer_cap, "frame too large for staging buffer, dropping");
                    return;
                }
                if state.buf.len() + encoded.len() > buffer_cap {
                    if let Err(e) = Self::flush_buf(&mut state) {
                        warn!(error = %e, "staging buffer flush failed");
                    }
                }
                state.buf.extend_from_slice(&encoded);
            }
        }
        state.total_bytes += encoded.len() as u64;
    }

    fn flush_buf(state: &mut RecorderState) -> Result<(), Error> {
        if state.buf.is_empty() {
            return Ok(());
        }
        let file = state.file.as_mut().ok_or_else(|| Error::new(ErrorKind::InvalidArgument))?;
        file.write_all(&state.buf)?;
        state.buf.clear();
        Ok(())
    }

    fn open_new_chunk_locked(&self, state: &mut RecorderState) -> Result<(), Error> {
        let (ts, unsynced) = if self.time.is_synced() {
            (self.time.now_s() as u32, false)
        } else {
            (self.time.now_uptime_s() as u32, true)
        };
        let tmp_path = self.store.path_for(ts, Suffix::Tmp);
        let mut file = File::create(&tmp_path).map_err(|e| Error::from(e).with_path(tmp_path.clone()))?;
        let header = ChunkHeader {
            ts,
            codec_id: self.config.codec_id,
            sample_rate: self.config.sample_rate,
            data_size: 0,
        };
        file.write_all(&header.encode())
            .map_err(|e| Error::from(e).with_path(tmp_path.clone()))?;
        state.open = true;
        state.file = Some(file);
        state.tmp_path = Some(tmp_path);
        state.ts = ts;
        state.unsynced = unsynced;
        state.buf.clear();
        state.total_bytes = 0;
        debug!(ts, unsynced, "opened chunk");
        Ok(())
    }

    /// Flushes, back-fills `data_size`, closes, and publishes the currently
    /// open file, if any. Publish (rename) failure is logged and swallowed
    /// per spec.md §7: the file is left as `.tmp`, invisible to upload, and
    /// a future start/rotation will eventually succeed or it becomes
    /// garbage.
    fn finalize_locked(&self, state: &mut RecorderState) {
        if !state.open {
            return;
        }
        if let Err(e) = Self::flush_buf(state) {
            warn!(error = %e, "final buffer flush failed");
        }
        let result: Result<(), Error> = (|| {
            let file = state.file.as_mut().expect("open implies file present");
            file.seek(SeekFrom::Start(DATA_SIZE_OFFSET as u64))?;
            let mut size_buf = [0u8; 4];
            LittleEndian::write_u32(&mut size_buf, state.total_bytes as u32);
            file.write_all(&size_buf)?;
            file.sync_all()?;
            Ok(())
        })();
        let tmp_path = state.file.take().and(state.tmp_path.take());
        if let Err(e) = result {
            warn!(ts = state.ts, error = %e, "failed to finalize chunk, left as .tmp");
            state.open = false;
            return;
        }
        let suffix = if state.unsynced { Suffix::Upt } else { Suffix::Bin };
        if let Some(tmp_path) = tmp_path {
            match self.store.publish(&tmp_path, state.ts, suffix) {
                Ok(_) => {}
                Err(e) => warn!(ts = state.ts, error = %e, "failed to publish chunk, left as .tmp"),
            }
        }
        state.open = false;
    }

    /// Called directly by tests, or by the rotation worker thread on each
    /// timer tick: finalizes the current chunk and opens the next one
    /// (spec.md §4.3 "Rotation").
    pub fn rotate_now(&self) -> Result<(), Error> {
        let mut state = self.state.lock().unwrap();
        self.finalize_locked(&mut state);
        if self.recording.load(Ordering::Acquire) {
            self.open_new_chunk_locked(&mut state)?;
        }
        Ok(())
    }

    fn rotation_loop(self: Arc<Self>, stop_rx: Receiver<()>, period: Duration) {
        loop {
            match stop_rx.recv_timeout(period) {
                Ok(()) | Err(RecvTimeoutError::Disconnected) => return,
                Err(RecvTimeoutError::Timeout) => {
                    if let Err(e) = self.rotate_now() {
                        warn!(error = %e, "rotation failed");
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reclo_base::SimClocks;
    use reclo_store::format::FrameReader;
    use tempfile::tempdir;

    fn recorder_with(
        tmp: &tempfile::TempDir,
        mode: RecorderMode,
    ) -> (Arc<Recorder<SimClocks>>, Arc<TimeSource<SimClocks>>) {
        let store = ChunkStore::new(tmp.path());
        let clocks = SimClocks::new();
        let time = TimeSource::new(clocks);
        time.set_epoch(1_700_000_000);
        let config = RecorderConfig {
            chunk_duration_s: 15,
            mode,
            codec_id: 20,
            sample_rate: 16_000,
        };
        (Recorder::new(store.clone(), time.clone(), config), time)
    }

    // S1 — single chunk: 750 frames of 80 bytes, D=15, synced, ts=1700000000.
    #[test]
    fn s1_single_chunk_roundtrips_and_sizes_correctly() {
        let tmp = tempdir().unwrap();
        let (rec, _time) = recorder_with(&tmp, RecorderMode::streaming_default());
        rec.init().unwrap();
        rec.start().unwrap();
        let frame = vec![7u8; 80];
        for _ in 0..750 {
            rec.ingest(&frame);
        }
        rec.stop().unwrap();

        let store = ChunkStore::new(tmp.path());
        let bins = store.enumerate_bin().unwrap();
        assert_eq!(bins, vec![1_700_000_000]);
        let size = store.file_size(1_700_000_000, Suffix::Bin).unwrap();
        assert_eq!(size, 17 + 750 * (2 + 80));

        let bytes = std::fs::read(store.path_for(1_700_000_000, Suffix::Bin)).unwrap();
        let header = ChunkHeader::decode(&bytes[..17]).unwrap();
        assert_eq!(header.codec_id, 20);
        assert_eq!(header.data_size, 750 * (2 + 80));
        let frames: Vec<&[u8]> = FrameReader::new(&bytes[17..]).collect();
        assert_eq!(frames.len(), 750);
        assert!(frames.iter().all(|f| *f == frame.as_slice()));
    }

    #[test]
    fn accumulate_mode_produces_identical_format_to_streaming() {
        let tmp = tempdir().unwrap();
        let (rec, _time) = recorder_with(&tmp, RecorderMode::Accumulate);
        rec.init().unwrap();
        rec.start().unwrap();
        for _ in 0..10 {
            rec.ingest(&[1, 2, 3]);
        }
        rec.stop().unwrap();
        let store = ChunkStore::new(tmp.path());
        let size = store.file_size(1_700_000_000, Suffix::Bin).unwrap();
        assert_eq!(size, 17 + 10 * (2 + 3));
    }

    #[test]
    fn ingest_drops_invalid_length_frames() {
        let tmp = tempdir().unwrap();
        let (rec, _time) = recorder_with(&tmp, RecorderMode::streaming_default());
        rec.init().unwrap();
        rec.start().unwrap();
        rec.ingest(&[]);
        let oversize = vec![0u8; MAX_FRAME_LEN + 1];
        rec.ingest(&oversize);
        assert_eq!(rec.dropped_frames(), 2);
        rec.stop().unwrap();
    }

    #[test]
    fn ingest_drops_when_no_file_open() {
        let tmp = tempdir().unwrap();
        let (rec, _time) = recorder_with(&tmp, RecorderMode::streaming_default());
        rec.init().unwrap();
        rec.ingest(&[1, 2, 3]); // never started
        assert_eq!(rec.dropped_frames(), 1);
    }

    #[test]
    fn start_and_stop_are_idempotent() {
        let tmp = tempdir().unwrap();
        let (rec, _time) = recorder_with(&tmp, RecorderMode::streaming_default());
        rec.init().unwrap();
        rec.start().unwrap();
        rec.start().unwrap();
        rec.stop().unwrap();
        rec.stop().unwrap();
        let store = ChunkStore::new(tmp.path());
        assert_eq!(store.count_bin().unwrap(), 1);
    }

    #[test]
    fn unsynced_clock_publishes_upt_suffix() {
        let tmp = tempdir().unwrap();
        let store = ChunkStore::new(tmp.path());
        let clocks = SimClocks::new();
        let time = TimeSource::new(clocks.clone());
        clocks.advance(Duration::from_secs(0));
        let config = RecorderConfig {
            chunk_duration_s: 15,
            mode: RecorderMode::streaming_default(),
            codec_id: 20,
            sample_rate: 16_000,
        };
        let rec = Recorder::new(store.clone(), time, config);
        rec.init().unwrap();
        rec.start().unwrap();
        rec.ingest(&[1, 2, 3]);
        rec.stop().unwrap();
        assert!(store.enumerate_bin().unwrap().is_empty());
        assert_eq!(store.enumerate_upt().unwrap(), vec![0]);
    }

    #[test]
    fn manual_rotation_produces_multiple_chunks() {
        let tmp = tempdir().unwrap();
        let store = ChunkStore::new(tmp.path());
        let clocks = SimClocks::new();
        let time = TimeSource::new(clocks.clone());
        time.set_epoch(1_700_000_000);
        let config = RecorderConfig {
            chunk_duration_s: 15,
            mode: RecorderMode::streaming_default(),
            codec_id: 20,
            sample_rate: 16_000,
        };
        let rec = Recorder::new(store.clone(), time, config);
        rec.init().unwrap();
        rec.start().unwrap();
        rec.ingest(&[1, 2, 3]);
        clocks.advance(Duration::from_secs(15));
        rec.rotate_now().unwrap();
        rec.ingest(&[4, 5, 6]);
        clocks.advance(Duration::from_secs(15));
        rec.rotate_now().unwrap();
        rec.stop().unwrap();
        let mut bins = store.enumerate_bin().unwrap();
        bins.sort();
        assert_eq!(bins, vec![1_700_000_000, 1_700_000_015, 1_700_000_030]);
    }
}
