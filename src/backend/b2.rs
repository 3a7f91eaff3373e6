//! Backblaze B2 large-file backend. Parts carry SHA-1 checksums; account
//! authorization is renewable, with concurrent renewals coalesced into a
//! single request.

use std::io::SeekFrom;
use std::sync::Arc;

use reqwest::header::CONTENT_LENGTH;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use sha1::{Digest, Sha1};
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::backend::{bad_status, BackendLimits, FileSlice, StorageBackend};
use crate::constants::{HTTP_TIMEOUT_SECS, MEBIBYTE};
use crate::error::UploadError;
use crate::part::Part;

const AUTHORIZE_URL: &str = "https://api.backblazeb2.com/b2api/v2/b2_authorize_account";

const LIMITS: BackendLimits = BackendLimits {
    min_parts: 2,
    max_parts: 10_000,
    min_part_size: 5_000_000,
    max_part_size: 5_000_000_000,
};

#[derive(Debug, Clone)]
pub struct B2Options {
    pub account_id: String,
    pub application_key: String,
    pub bucket_id: String,
}

#[derive(Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
struct Authorization {
    authorization_token: String,
    api_url: String,
    recommended_part_size: u64,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct StartLargeFile {
    file_id: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct UploadPartUrl {
    upload_url: String,
    authorization_token: String,
}

struct AuthSlot {
    generation: u64,
    auth: Arc<Authorization>,
}

pub struct B2Backend {
    http: Client,
    account_id: String,
    application_key: String,
    bucket_id: String,
    auth: Mutex<AuthSlot>,
}

impl B2Backend {
    pub async fn from_options(opts: B2Options) -> Result<Self, UploadError> {
        let http = Client::builder()
            .timeout(std::time::Duration::from_secs(HTTP_TIMEOUT_SECS))
            .build()?;
        let auth = authorize(&http, &opts.account_id, &opts.application_key).await?;
        Ok(Self {
            http,
            account_id: opts.account_id,
            application_key: opts.application_key,
            bucket_id: opts.bucket_id,
            auth: Mutex::new(AuthSlot {
                generation: 0,
                auth: Arc::new(auth),
            }),
        })
    }

    async fn current_auth(&self) -> (u64, Arc<Authorization>) {
        let slot = self.auth.lock().await;
        (slot.generation, slot.auth.clone())
    }

    /// Renew the account authorization. Callers pass the generation they
    /// observed failing; whoever gets the lock first performs the
    /// request, and everyone who queued behind it shares the outcome
    /// instead of hitting the API again.
    async fn renew_auth(&self, observed_generation: u64) -> Result<(), UploadError> {
        let mut slot = self.auth.lock().await;
        if slot.generation != observed_generation {
            return Ok(());
        }
        let auth = authorize(&self.http, &self.account_id, &self.application_key).await?;
        slot.generation += 1;
        slot.auth = Arc::new(auth);
        debug!("account authorization renewed");
        Ok(())
    }

    async fn api_post(
        &self,
        auth: &Authorization,
        call: &str,
        body: serde_json::Value,
    ) -> Result<reqwest::Response, UploadError> {
        let resp = self
            .http
            .post(format!("{}/b2api/v2/{}", auth.api_url, call))
            .header("authorization", auth.authorization_token.as_str())
            .json(&body)
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(bad_status(resp).await);
        }
        Ok(resp)
    }
}

async fn authorize(
    http: &Client,
    account_id: &str,
    application_key: &str,
) -> Result<Authorization, UploadError> {
    let resp = http
        .get(AUTHORIZE_URL)
        .basic_auth(account_id, Some(application_key))
        .send()
        .await?;
    if !resp.status().is_success() {
        return Err(bad_status(resp).await);
    }
    Ok(resp.json::<Authorization>().await?)
}

/// SHA-1 of the range, streamed one 1 MiB chunk at a time.
async fn sha1_range(slice: &FileSlice) -> Result<[u8; 20], UploadError> {
    let part: Part = slice.part();
    let mut file = File::open(slice.path()).await?;
    file.seek(SeekFrom::Start(part.start)).await?;

    let mut hasher = Sha1::new();
    let mut buf = vec![0u8; MEBIBYTE as usize];
    let mut remaining = part.len();
    while remaining > 0 {
        let want = (buf.len() as u64).min(remaining) as usize;
        let n = file.read(&mut buf[..want]).await?;
        if n == 0 {
            return Err(UploadError::Io(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                "file shorter than the planned part range",
            )));
        }
        hasher.update(&buf[..n]);
        remaining -= n as u64;
    }
    Ok(hasher.finalize().into())
}

#[async_trait::async_trait]
impl StorageBackend for B2Backend {
    fn limits(&self) -> BackendLimits {
        LIMITS
    }

    /// Prefer the server recommendation unless it would need more parts
    /// than the service allows.
    async fn ideal_part_size(&self, file_size: u64) -> Result<u64, UploadError> {
        let (_, auth) = self.current_auth().await;
        let recommended = auth.recommended_part_size;
        if file_size.div_ceil(recommended) <= LIMITS.max_parts {
            Ok(recommended)
        } else {
            Ok(file_size.div_ceil(LIMITS.max_parts))
        }
    }

    async fn initiate(&self, file_name: &str, _part_size: u64) -> Result<String, UploadError> {
        let (_, auth) = self.current_auth().await;
        let resp = self
            .api_post(
                &auth,
                "b2_start_large_file",
                serde_json::json!({
                    "bucketId": self.bucket_id,
                    "fileName": file_name,
                    "contentType": "application/octet-stream",
                }),
            )
            .await?;
        Ok(resp.json::<StartLargeFile>().await?.file_id)
    }

    async fn upload_part(
        &self,
        upload_id: &str,
        slice: &FileSlice,
    ) -> Result<Vec<u8>, UploadError> {
        let part = slice.part();
        let sha1 = sha1_range(slice).await?;
        let sha1_hex = hex::encode(sha1);

        // Every attempt gets a fresh per-part upload URL and token. A 401
        // here means the account token expired: kick off one renewal and
        // still fail this attempt so the scheduler retries with the fresh
        // token.
        let (generation, auth) = self.current_auth().await;
        let target = match self
            .api_post(
                &auth,
                "b2_get_upload_part_url",
                serde_json::json!({ "fileId": upload_id }),
            )
            .await
        {
            Ok(resp) => resp.json::<UploadPartUrl>().await?,
            Err(e) => {
                let expired = matches!(
                    &e,
                    UploadError::BadStatus { status, .. } if *status == StatusCode::UNAUTHORIZED
                );
                if expired {
                    if let Err(renew_err) = self.renew_auth(generation).await {
                        warn!("authorization renewal failed: {renew_err}");
                    }
                }
                return Err(e);
            }
        };

        let resp = self
            .http
            .post(&target.upload_url)
            .header("authorization", target.authorization_token.as_str())
            .header("x-bz-part-number", part.index + 1)
            .header("x-bz-content-sha1", sha1_hex.as_str())
            .header(CONTENT_LENGTH, part.len())
            .body(slice.body().await?)
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(bad_status(resp).await);
        }
        debug!(part = part.index, "part accepted");
        Ok(sha1.to_vec())
    }

    async fn complete(
        &self,
        upload_id: &str,
        _file_size: u64,
        part_hashes: &[Vec<u8>],
    ) -> Result<(), UploadError> {
        let part_sha1_array: Vec<String> = part_hashes.iter().map(hex::encode).collect();
        let (_, auth) = self.current_auth().await;
        self.api_post(
            &auth,
            "b2_finish_large_file",
            serde_json::json!({
                "fileId": upload_id,
                "partSha1Array": part_sha1_array,
            }),
        )
        .await?;
        info!(
            file_id = upload_id,
            parts = part_sha1_array.len(),
            "large file assembled"
        );
        Ok(())
    }
}
