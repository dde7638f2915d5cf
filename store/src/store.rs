// This file is part of RecLo, the offline-recording core of a wearable audio capture device.
// Copyright (c) 2026 RecLo Authors; see LICENSE.txt.
// SPDX-License-Identifier: MIT
//! Component C2: the chunk store (spec.md §4.2).
//!
//! The store exposes no read API beyond filename enumeration; callers open
//! files directly. Synchronization is delegated entirely to the
//! filesystem's rename/unlink atomicity (spec.md §5), the way the teacher's
//! `db::dir` treats the sample-file directory as the canonical index rather
//! than mirroring it in memory.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use reclo_base::{Error, ErrorKind};
use tracing::{debug, info, warn};

use crate::filename::{format_filename, parse_filename, Suffix};

/// A directory of chunk files on a local filesystem.
#[derive(Clone, Debug)]
pub struct ChunkStore {
    dir: PathBuf,
}

impl ChunkStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        ChunkStore { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, ts: u32, suffix: Suffix) -> PathBuf {
        self.dir.join(format_filename(ts, suffix))
    }

    /// Creates the storage directory if absent. Idempotent.
    pub fn ensure_dir(&self) -> Result<(), Error> {
        match fs::create_dir_all(&self.dir) {
            Ok(()) => Ok(()),
            Err(e) => Err(Error::from(e).with_path(self.dir.clone())),
        }
    }

    /// Atomically renames `tmp_path` to `final_name` within the store
    /// directory (spec.md §4.2). This is the publish point: once the
    /// rename completes, the chunk is visible to enumeration.
    pub fn publish(&self, tmp_path: &Path, ts: u32, suffix: Suffix) -> Result<PathBuf, Error> {
        let final_path = self.path_for(ts, suffix);
        fs::rename(tmp_path, &final_path).map_err(|e| Error::from(e).with_path(final_path.clone()))?;
        info!(ts, suffix = %suffix, "published chunk");
        Ok(final_path)
    }

    /// Deletes `{ts:010}.bin`. A missing file is swallowed (logged, not
    /// returned as an error): an ACK for a chunk we no longer hold is
    /// benign (spec.md §4.2, §8 invariant 6).
    pub fn unlink(&self, ts: u32) {
        let path = self.path_for(ts, Suffix::Bin);
        match fs::remove_file(&path) {
            Ok(()) => info!(ts, "deleted chunk after ack"),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!(ts, "ack for chunk we don't hold, ignoring");
            }
            Err(e) => {
                warn!(ts, error = %e, "failed to delete acked chunk");
            }
        }
    }

    /// Returns the set of `.bin` filenames (10-digit ts, exactly 14 bytes
    /// long). Order is unspecified; callers sort.
    pub fn enumerate_bin(&self) -> Result<Vec<u32>, Error> {
        self.enumerate(Suffix::Bin)
    }

    /// Returns the set of `.upt` filenames, same rules as `enumerate_bin`.
    pub fn enumerate_upt(&self) -> Result<Vec<u32>, Error> {
        self.enumerate(Suffix::Upt)
    }

    pub fn count_bin(&self) -> Result<usize, Error> {
        Ok(self.enumerate_bin()?.len())
    }

    fn enumerate(&self, want: Suffix) -> Result<Vec<u32>, Error> {
        let rd = match fs::read_dir(&self.dir) {
            Ok(rd) => rd,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(Error::from(e).with_path(self.dir.clone())),
        };
        let mut out = Vec::new();
        for entry in rd {
            let entry = entry.map_err(|e| Error::from(e).with_path(self.dir.clone()))?;
            let name = entry.file_name();
            let Some(name) = name.to_str() else {
                continue;
            };
            match parse_filename(name) {
                Some((ts, suffix)) if suffix == want => out.push(ts),
                Some(_) => {}
                None => {
                    if name != "." && name != ".." {
                        debug!(name, "ignoring unrecognized entry in chunk store");
                    }
                }
            }
        }
        Ok(out)
    }

    /// Opens `{ts:010}.{suffix}` for reading, mapping a missing file to
    /// `ErrorKind::NotFound`.
    pub fn open(&self, ts: u32, suffix: Suffix) -> Result<fs::File, Error> {
        let path = self.path_for(ts, suffix);
        fs::File::open(&path).map_err(|e| Error::from(e).with_path(path))
    }

    /// Size in bytes of `{ts:010}.{suffix}`.
    pub fn file_size(&self, ts: u32, suffix: Suffix) -> Result<u64, Error> {
        let path = self.path_for(ts, suffix);
        fs::metadata(&path)
            .map(|m| m.len())
            .map_err(|e| Error::from(e).with_path(path))
    }

    pub fn missing_is_not_found(err: &Error) -> bool {
        err.kind() == ErrorKind::NotFound
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::tempdir;

    #[test]
    fn ensure_dir_is_idempotent() {
        let tmp = tempdir().unwrap();
        let dir = tmp.path().join("reclo");
        let store = ChunkStore::new(&dir);
        store.ensure_dir().unwrap();
        store.ensure_dir().unwrap();
        assert!(dir.is_dir());
    }

    #[test]
    fn publish_renames_and_enumeration_finds_it() {
        let tmp = tempdir().unwrap();
        let store = ChunkStore::new(tmp.path());
        store.ensure_dir().unwrap();
        let tmp_path = tmp.path().join("0000000001.tmp");
        fs::File::create(&tmp_path).unwrap().write_all(b"x").unwrap();
        store.publish(&tmp_path, 1, Suffix::Bin).unwrap();
        assert_eq!(store.enumerate_bin().unwrap(), vec![1]);
        assert!(store.enumerate_upt().unwrap().is_empty());
    }

    #[test]
    fn unlink_missing_file_does_not_error() {
        let tmp = tempdir().unwrap();
        let store = ChunkStore::new(tmp.path());
        store.ensure_dir().unwrap();
        store.unlink(1234567890); // no such file; must not panic.
    }

    #[test]
    fn enumerate_ignores_malformed_names() {
        let tmp = tempdir().unwrap();
        let store = ChunkStore::new(tmp.path());
        store.ensure_dir().unwrap();
        fs::File::create(tmp.path().join("not-a-chunk.txt")).unwrap();
        fs::File::create(tmp.path().join("0000000002.bin")).unwrap();
        fs::File::create(tmp.path().join("0000000003.tmp")).unwrap();
        assert_eq!(store.enumerate_bin().unwrap(), vec![2]);
    }

    #[test]
    fn enumerate_on_missing_dir_returns_empty() {
        let tmp = tempdir().unwrap();
        let store = ChunkStore::new(tmp.path().join("does-not-exist"));
        assert!(store.enumerate_bin().unwrap().is_empty());
    }
}
