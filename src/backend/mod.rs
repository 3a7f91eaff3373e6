pub mod b2;
pub mod glacier;
pub mod sigv4;

use std::io::{self, SeekFrom};
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::fs::File;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncSeekExt};
use tokio_util::io::ReaderStream;

use crate::error::UploadError;
use crate::part::Part;

/// Read-only numeric limits a backend advertises.
#[derive(Debug, Clone, Copy)]
pub struct BackendLimits {
    pub min_parts: u64,
    pub max_parts: u64,
    pub min_part_size: u64,
    pub max_part_size: u64,
}

/// Factory for independent read streams over one byte range of the
/// source file. Passed instead of a single stream because some services
/// read the range twice: once to checksum before the request, once as
/// the request body.
#[derive(Debug, Clone)]
pub struct FileSlice {
    path: PathBuf,
    part: Part,
}

impl FileSlice {
    pub fn new(path: PathBuf, part: Part) -> Self {
        Self { path, part }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn part(&self) -> Part {
        self.part
    }

    /// A fresh reader positioned at the range start and bounded to its
    /// length. Every call opens its own file handle.
    pub async fn open(&self) -> io::Result<impl AsyncRead + Send + Unpin> {
        let mut file = File::open(&self.path).await?;
        file.seek(SeekFrom::Start(self.part.start)).await?;
        Ok(file.take(self.part.len()))
    }

    /// A fresh streaming request body over the range; the part is never
    /// materialised in memory.
    pub async fn body(&self) -> io::Result<reqwest::Body> {
        let reader = self.open().await?;
        Ok(reqwest::Body::wrap_stream(ReaderStream::new(reader)))
    }
}

/// The capability interface the engine drives. Implementations are
/// value-typed handles constructed from parsed options (which may
/// authenticate eagerly).
#[async_trait]
pub trait StorageBackend: Send + Sync {
    fn limits(&self) -> BackendLimits;

    /// Recommended part size for a file of `file_size` bytes. May be
    /// non-deterministic (e.g. a server recommendation); once a session
    /// is written the persisted size is authoritative.
    async fn ideal_part_size(&self, file_size: u64) -> Result<u64, UploadError>;

    /// Start a multipart upload, returning the backend-opaque upload id.
    async fn initiate(&self, file_name: &str, part_size: u64) -> Result<String, UploadError>;

    /// Upload one part, returning the backend-specific part hash that
    /// finalisation will compose.
    async fn upload_part(&self, upload_id: &str, slice: &FileSlice)
        -> Result<Vec<u8>, UploadError>;

    /// Assemble the archive from the ordered per-part hashes. Returns
    /// only once the service acknowledges durable success.
    async fn complete(
        &self,
        upload_id: &str,
        file_size: u64,
        part_hashes: &[Vec<u8>],
    ) -> Result<(), UploadError>;
}

/// Shared "bad status" conversion: drains the response body into the
/// error so diagnostics carry what the service actually said.
pub(crate) async fn bad_status(resp: reqwest::Response) -> UploadError {
    let status = resp.status();
    let body = resp.text().await.unwrap_or_default();
    UploadError::BadStatus { status, body }
}
