use std::path::{Path, PathBuf};

use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

use crate::error::UploadError;

/// The upload target. Identity (path + mtime) is captured once and must
/// stay stable for the lifetime of a session.
#[derive(Debug, Clone)]
pub struct SourceFile {
    pub path: PathBuf,
    pub size: u64,
    pub last_modified: String,
}

impl SourceFile {
    pub async fn probe(path: &Path) -> Result<Self, UploadError> {
        let meta = tokio::fs::metadata(path).await.map_err(|e| {
            UploadError::Config(format!("cannot stat {}: {}", path.display(), e))
        })?;
        if !meta.is_file() {
            return Err(UploadError::Config(format!(
                "{} is not a regular file",
                path.display()
            )));
        }
        let modified = meta.modified().map_err(|e| {
            UploadError::Config(format!("cannot read mtime of {}: {}", path.display(), e))
        })?;
        let last_modified = OffsetDateTime::from(modified)
            .format(&Rfc3339)
            .map_err(|e| UploadError::Config(format!("cannot format mtime: {}", e)))?;
        Ok(Self {
            path: path.to_path_buf(),
            size: meta.len(),
            last_modified,
        })
    }

    pub fn name(&self) -> Result<&str, UploadError> {
        self.path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| {
                UploadError::Config(format!(
                    "{} has no usable file name",
                    self.path.display()
                ))
            })
    }
}
