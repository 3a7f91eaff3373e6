use std::io;

use reqwest::StatusCode;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryClass {
    Retryable, // transient errors, 5xx, network errors, checksum mismatch
    Fatal,     // configuration, session mismatch, local state I/O
}

#[derive(thiserror::Error, Debug)]
pub enum UploadError {
    #[error("{0}")]
    Config(String),
    #[error("file has changed since the upload session was created (rerun with --force to override)")]
    FileChanged,
    #[error("file too small: {parts_needed} parts of {part_size} bytes, service requires at least {min_parts}")]
    FileTooSmall {
        parts_needed: u64,
        part_size: u64,
        min_parts: u64,
    },
    #[error("file too big: {parts_needed} parts of {part_size} bytes, service allows at most {max_parts}")]
    FileTooBig {
        parts_needed: u64,
        part_size: u64,
        max_parts: u64,
    },
    #[error("bad status {status}: {body}")]
    BadStatus { status: StatusCode, body: String },
    #[error("part checksum mismatch: sent {sent}, service replied {received}")]
    ChecksumMismatch { sent: String, received: String },
    #[error("unexpected service response: {0}")]
    Protocol(String),
    #[error("malformed session document: {0}")]
    BadSession(#[from] serde_json::Error),
    #[error(transparent)]
    Transport(#[from] reqwest::Error),
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Any(#[from] anyhow::Error),
}

impl UploadError {
    /// Transient failures feed the scheduler's backoff loop; everything
    /// else surfaces to the top level and terminates the run.
    pub fn retry_class(&self) -> RetryClass {
        match self {
            UploadError::BadStatus { .. }
            | UploadError::ChecksumMismatch { .. }
            | UploadError::Protocol(_)
            | UploadError::Transport(_) => RetryClass::Retryable,
            UploadError::Config(_)
            | UploadError::FileChanged
            | UploadError::FileTooSmall { .. }
            | UploadError::FileTooBig { .. }
            | UploadError::BadSession(_)
            | UploadError::Io(_)
            | UploadError::Any(_) => RetryClass::Fatal,
        }
    }
}
