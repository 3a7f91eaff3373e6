use std::io;
use std::path::{Path, PathBuf};

use tokio::fs;

use crate::constants::{PART_HASH_PREFIX, PART_HASH_SUFFIX, SESSION_KEY};
use crate::error::UploadError;
use crate::session::Session;

/// Durable key → bytes store over the working directory. One upload owns
/// the directory exclusively; concurrent runs against it are undefined.
#[derive(Debug, Clone)]
pub struct StateStore {
    root: PathBuf,
}

impl StateStore {
    pub async fn open(root: &Path) -> Result<Self, UploadError> {
        let meta = fs::metadata(root).await.map_err(|e| {
            UploadError::Config(format!("cannot open work dir {}: {}", root.display(), e))
        })?;
        if !meta.is_dir() {
            return Err(UploadError::Config(format!(
                "{} is not a directory",
                root.display()
            )));
        }
        Ok(Self {
            root: root.to_path_buf(),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// `None` iff the key does not exist; any other I/O error surfaces.
    pub async fn read(&self, key: &str) -> Result<Option<Vec<u8>>, UploadError> {
        match fs::read(self.root.join(key)).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Overwrites via a temp file and rename so a crash never leaves a
    /// half-written value under the final key.
    pub async fn write(&self, key: &str, bytes: &[u8]) -> Result<(), UploadError> {
        let tmp = self.root.join(format!("{key}.tmp"));
        fs::write(&tmp, bytes).await?;
        fs::rename(&tmp, self.root.join(key)).await?;
        Ok(())
    }

    pub async fn read_session(&self) -> Result<Option<Session>, UploadError> {
        match self.read(SESSION_KEY).await? {
            None => Ok(None),
            Some(raw) => Ok(Some(serde_json::from_slice(&raw)?)),
        }
    }

    pub async fn write_session(&self, session: &Session) -> Result<(), UploadError> {
        let doc = serde_json::to_vec(session)?;
        self.write(SESSION_KEY, &doc).await
    }

    pub fn part_hash_key(index: u64) -> String {
        format!("{PART_HASH_PREFIX}{index}{PART_HASH_SUFFIX}")
    }

    pub async fn read_part_hash(&self, index: u64) -> Result<Option<Vec<u8>>, UploadError> {
        self.read(&Self::part_hash_key(index)).await
    }

    /// The durability point: a stored hash means the part's bytes are on
    /// the service.
    pub async fn write_part_hash(&self, index: u64, hash: &[u8]) -> Result<(), UploadError> {
        self.write(&Self::part_hash_key(index), hash).await
    }

    /// Per-part hashes in index order; `None` marks a pending part.
    pub async fn load_part_hashes(
        &self,
        parts_needed: u64,
    ) -> Result<Vec<Option<Vec<u8>>>, UploadError> {
        let mut hashes = Vec::with_capacity(parts_needed as usize);
        for n in 0..parts_needed {
            hashes.push(self.read_part_hash(n).await?);
        }
        Ok(hashes)
    }
}
