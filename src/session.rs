use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::backend::StorageBackend;
use crate::error::UploadError;
use crate::part;
use crate::source::SourceFile;
use crate::store::StateStore;

/// The resumable handle, serialised once as a single JSON document and
/// never rewritten. The original part geometry stays authoritative on
/// resume even if the backend would recommend a different size today.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub upload_id: String,
    pub file_path: String,
    pub file_last_changed: String,
    pub part_size: u64,
    pub parts_needed: u64,
}

/// Resume the persisted session if one exists, otherwise negotiate part
/// geometry with the backend, initiate the upload, and persist the new
/// session before any part moves.
pub async fn load_or_create(
    store: &StateStore,
    backend: &dyn StorageBackend,
    file: &SourceFile,
    force: bool,
) -> Result<Session, UploadError> {
    if let Some(session) = store.read_session().await? {
        validate(&session, file, force)?;
        info!(
            upload_id = %session.upload_id,
            parts = session.parts_needed,
            part_size = session.part_size,
            "resuming upload session"
        );
        return Ok(session);
    }

    let limits = backend.limits();
    let ideal = backend.ideal_part_size(file.size).await?;
    let part_size = ideal.clamp(limits.min_part_size, limits.max_part_size);
    let parts_needed = part::parts_needed(file.size, part_size);
    if parts_needed < limits.min_parts {
        return Err(UploadError::FileTooSmall {
            parts_needed,
            part_size,
            min_parts: limits.min_parts,
        });
    }
    if parts_needed > limits.max_parts {
        return Err(UploadError::FileTooBig {
            parts_needed,
            part_size,
            max_parts: limits.max_parts,
        });
    }

    let upload_id = backend.initiate(file.name()?, part_size).await?;
    let session = Session {
        upload_id,
        file_path: file.path.display().to_string(),
        file_last_changed: file.last_modified.clone(),
        part_size,
        parts_needed,
    };
    store.write_session(&session).await?;
    info!(
        upload_id = %session.upload_id,
        parts = parts_needed,
        part_size,
        "created upload session"
    );
    Ok(session)
}

fn validate(session: &Session, file: &SourceFile, force: bool) -> Result<(), UploadError> {
    let same_path = session.file_path == file.path.display().to_string();
    let same_mtime = session.file_last_changed == file.last_modified;
    if same_path && same_mtime {
        return Ok(());
    }
    if force {
        warn!(
            recorded = %session.file_last_changed,
            current = %file.last_modified,
            "file identity changed, continuing because of --force"
        );
        return Ok(());
    }
    Err(UploadError::FileChanged)
}
