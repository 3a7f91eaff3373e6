use std::sync::{Arc, Mutex};

use futures_util::future::try_join_all;
use tracing::info;

use crate::backend::{FileSlice, StorageBackend};
use crate::error::UploadError;
use crate::part::{self, Part};
use crate::progress::ProgressReporter;
use crate::scheduler::PartScheduler;
use crate::session::{self, Session};
use crate::source::SourceFile;
use crate::store::StateStore;

pub struct UploadContext {
    pub file: SourceFile,
    pub store: StateStore,
    pub backend: Arc<dyn StorageBackend>,
    pub concurrency: usize,
    pub quiet: bool,
    pub force: bool,
}

/// Drives the whole lifecycle: resume or create the session, enumerate
/// missing parts, upload them under the scheduler, then finalise with
/// the composed checksum vector.
pub async fn run(ctx: UploadContext) -> Result<(), UploadError> {
    let session =
        session::load_or_create(&ctx.store, ctx.backend.as_ref(), &ctx.file, ctx.force).await?;
    let loaded = ctx.store.load_part_hashes(session.parts_needed).await?;
    let completed = loaded.iter().filter(|h| h.is_some()).count() as u64;

    let progress = ProgressReporter::new(session.parts_needed, completed, ctx.quiet);
    if completed > 0 {
        progress.log(&format!(
            "resuming: {completed}/{} parts already uploaded",
            session.parts_needed
        ));
    }
    let result = drive(&ctx, &session, loaded, &progress).await;
    if result.is_ok() {
        progress.finished();
        info!(
            parts = session.parts_needed,
            bytes = ctx.file.size,
            "upload complete"
        );
    } else {
        progress.clear();
    }
    result
}

async fn drive(
    ctx: &UploadContext,
    session: &Session,
    loaded: Vec<Option<Vec<u8>>>,
    progress: &ProgressReporter,
) -> Result<(), UploadError> {
    let missing: Vec<Part> = loaded
        .iter()
        .enumerate()
        .filter(|(_, hash)| hash.is_none())
        .map(|(n, _)| part::part_at(ctx.file.size, session.part_size, n as u64))
        .collect();

    let hashes = Mutex::new(loaded);
    let scheduler = PartScheduler::new(ctx.concurrency);

    try_join_all(missing.into_iter().map(|p| {
        upload_one(
            &scheduler,
            ctx.backend.as_ref(),
            &ctx.store,
            session,
            &ctx.file,
            p,
            &hashes,
            progress,
        )
    }))
    .await?;

    progress.finalising();
    let mut ordered = Vec::with_capacity(session.parts_needed as usize);
    for (n, hash) in hashes.into_inner().unwrap().into_iter().enumerate() {
        ordered.push(hash.ok_or_else(|| {
            UploadError::Protocol(format!("part {n} finished without a recorded hash"))
        })?);
    }
    ctx.backend
        .complete(&session.upload_id, ctx.file.size, &ordered)
        .await?;
    Ok(())
}

#[allow(clippy::too_many_arguments)]
async fn upload_one(
    scheduler: &PartScheduler,
    backend: &dyn StorageBackend,
    store: &StateStore,
    session: &Session,
    file: &SourceFile,
    part: Part,
    hashes: &Mutex<Vec<Option<Vec<u8>>>>,
    progress: &ProgressReporter,
) -> Result<(), UploadError> {
    let slice = FileSlice::new(file.path.clone(), part);
    let label = format!("part {}", part.index);
    let hash = scheduler
        .run(&label, || backend.upload_part(&session.upload_id, &slice))
        .await?;
    // Persist only after the backend confirmed the part; this is the
    // durability point resume relies on.
    store.write_part_hash(part.index, &hash).await?;
    hashes.lock().unwrap()[part.index as usize] = Some(hash);
    progress.part_done();
    Ok(())
}
