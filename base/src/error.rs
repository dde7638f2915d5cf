// This file is part of RecLo, the offline-recording core of a wearable audio capture device.
// Copyright (c) 2026 RecLo Authors; see LICENSE.txt.
// SPDX-License-Identifier: MIT
//! Crate-wide error type shared by the store, recorder, and transfer crates.
//!
//! Mirrors the error kinds named in the RecLo design (§7): most device-side
//! failures are logged and swallowed rather than propagated, so `ErrorKind`
//! stays small and is mostly used to decide *whether* to log-and-continue or
//! abort a batch/session, not to drive rich error UX.

use std::fmt;
use std::path::PathBuf;

/// Coarse classification of a failure, used by callers to decide whether to
/// retry, skip, or abort.
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
#[non_exhaustive]
pub enum ErrorKind {
    InvalidArgument,
    NotFound,
    Io,
    CorruptHeader,
    Overflow,
    Canceled,
    NotConnected,
    WouldBlock,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorKind::InvalidArgument => "invalid argument",
            ErrorKind::NotFound => "not found",
            ErrorKind::Io => "I/O error",
            ErrorKind::CorruptHeader => "corrupt chunk header",
            ErrorKind::Overflow => "overflow",
            ErrorKind::Canceled => "canceled",
            ErrorKind::NotConnected => "not connected",
            ErrorKind::WouldBlock => "would block",
        };
        write!(f, "{s}")
    }
}

/// A [`std::error::Error`] tagged with an [`ErrorKind`] and, where it helps
/// diagnostics, the path involved.
#[derive(Debug)]
pub struct Error {
    pub kind: ErrorKind,
    pub path: Option<PathBuf>,
    pub source: Option<Box<dyn std::error::Error + Send + Sync + 'static>>,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.kind)?;
        if let Some(p) = &self.path {
            write!(f, " ({})", p.display())?;
        }
        if let Some(e) = &self.source {
            write!(f, ": {e}")?;
        }
        Ok(())
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_ref()
            .map(|e| e.as_ref() as &(dyn std::error::Error + 'static))
    }
}

impl Error {
    pub fn new(kind: ErrorKind) -> Self {
        Error {
            kind,
            path: None,
            source: None,
        }
    }

    pub fn with_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.path = Some(path.into());
        self
    }

    pub fn with_source(mut self, source: impl std::error::Error + Send + Sync + 'static) -> Self {
        self.source = Some(Box::new(source));
        self
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }
}

impl From<ErrorKind> for Error {
    fn from(kind: ErrorKind) -> Self {
        Error::new(kind)
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        let kind = match e.kind() {
            std::io::ErrorKind::NotFound => ErrorKind::NotFound,
            std::io::ErrorKind::WouldBlock => ErrorKind::WouldBlock,
            std::io::ErrorKind::InvalidInput | std::io::ErrorKind::InvalidData => {
                ErrorKind::InvalidArgument
            }
            _ => ErrorKind::Io,
        };
        Error::new(kind).with_source(e)
    }
}

pub type Result<T> = std::result::Result<T, Error>;

/// Extension methods mirroring the teacher's `ResultExt`, for tagging a
/// foreign error with a [`ErrorKind`] and optional path at the call site.
pub trait ResultExt<T> {
    fn err_kind(self, kind: ErrorKind) -> Result<T>;
    fn err_path(self, kind: ErrorKind, path: impl Into<PathBuf>) -> Result<T>;
}

impl<T, E> ResultExt<T> for std::result::Result<T, E>
where
    E: std::error::Error + Send + Sync + 'static,
{
    fn err_kind(self, kind: ErrorKind) -> Result<T> {
        self.map_err(|e| Error::new(kind).with_source(e))
    }

    fn err_path(self, kind: ErrorKind, path: impl Into<PathBuf>) -> Result<T> {
        self.map_err(|e| Error::new(kind).with_path(path).with_source(e))
    }
}
