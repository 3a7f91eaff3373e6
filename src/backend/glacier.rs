//! AWS S3 Glacier multipart backend, authenticated with SigV4 and
//! checksummed with the SHA-256 tree hash.

use std::collections::BTreeMap;

use reqwest::header::CONTENT_LENGTH;
use reqwest::{Client, Method};
use time::OffsetDateTime;
use tracing::{debug, info};

use crate::backend::sigv4::{self, Credentials, SignParams, EMPTY_PAYLOAD_SHA256};
use crate::backend::{bad_status, BackendLimits, FileSlice, StorageBackend};
use crate::constants::{HTTP_TIMEOUT_SECS, MEBIBYTE};
use crate::error::UploadError;
use crate::treehash::{self, Digest32};

const GLACIER_VERSION: &str = "2012-06-01";
const SERVICE: &str = "glacier";

const LIMITS: BackendLimits = BackendLimits {
    min_parts: 1,
    max_parts: 10_000,
    min_part_size: MEBIBYTE,
    max_part_size: 4096 * MEBIBYTE,
};

#[derive(Debug, Clone)]
pub struct GlacierOptions {
    pub region: String,
    pub access_key: String,
    pub secret_key: String,
    pub vault: String,
}

pub struct GlacierBackend {
    http: Client,
    region: String,
    vault: String,
    host: String,
    endpoint: String,
    creds: Credentials,
}

impl GlacierBackend {
    pub fn from_options(opts: GlacierOptions) -> Result<Self, UploadError> {
        let http = Client::builder()
            .timeout(std::time::Duration::from_secs(HTTP_TIMEOUT_SECS))
            .build()?;
        let host = format!("glacier.{}.amazonaws.com", opts.region);
        Ok(Self {
            http,
            endpoint: format!("https://{host}"),
            host,
            region: opts.region,
            vault: opts.vault,
            creds: Credentials {
                access_key: opts.access_key,
                secret_key: opts.secret_key,
            },
        })
    }

    fn uploads_path(&self) -> String {
        format!("/-/vaults/{}/multipart-uploads", self.vault)
    }

    /// Sign and send one request. `extra` headers are covered by the
    /// signature alongside the standard host/date/version/content-sha256
    /// set.
    async fn send(
        &self,
        method: Method,
        path: &str,
        extra: &[(&str, String)],
        payload_sha256: &str,
        body: Option<reqwest::Body>,
        content_length: Option<u64>,
    ) -> Result<reqwest::Response, UploadError> {
        let now = OffsetDateTime::now_utc();
        let mut headers = BTreeMap::new();
        headers.insert("host".to_string(), self.host.clone());
        headers.insert("x-amz-date".to_string(), sigv4::amz_datetime(now));
        headers.insert(
            "x-amz-glacier-version".to_string(),
            GLACIER_VERSION.to_string(),
        );
        headers.insert(
            "x-amz-content-sha256".to_string(),
            payload_sha256.to_string(),
        );
        for (name, value) in extra {
            headers.insert(name.to_string(), value.clone());
        }

        let params = SignParams {
            method: method.as_str(),
            path,
            query: &[],
            headers: &headers,
            payload_sha256,
            region: &self.region,
            service: SERVICE,
            timestamp: now,
        };
        let authorization = sigv4::authorization_header(&self.creds, &params);

        let mut req = self.http.request(method, format!("{}{}", self.endpoint, path));
        for (name, value) in &headers {
            if name == "host" {
                continue; // set by the transport
            }
            req = req.header(name.as_str(), value.as_str());
        }
        req = req.header("authorization", authorization);
        if let Some(len) = content_length {
            req = req.header(CONTENT_LENGTH, len);
        }
        if let Some(body) = body {
            req = req.body(body);
        }

        let resp = req.send().await?;
        if !resp.status().is_success() {
            return Err(bad_status(resp).await);
        }
        Ok(resp)
    }
}

fn header_str(resp: &reqwest::Response, name: &str) -> Result<String, UploadError> {
    resp.headers()
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
        .ok_or_else(|| UploadError::Protocol(format!("response is missing the {name} header")))
}

#[async_trait::async_trait]
impl StorageBackend for GlacierBackend {
    fn limits(&self) -> BackendLimits {
        LIMITS
    }

    /// Power-of-two sizes keep every part boundary aligned with the
    /// 1 MiB leaf grid of the tree hash.
    async fn ideal_part_size(&self, file_size: u64) -> Result<u64, UploadError> {
        Ok((file_size / LIMITS.max_parts).next_power_of_two())
    }

    async fn initiate(&self, file_name: &str, part_size: u64) -> Result<String, UploadError> {
        let resp = self
            .send(
                Method::POST,
                &self.uploads_path(),
                &[
                    ("x-amz-archive-description", file_name.to_string()),
                    ("x-amz-part-size", part_size.to_string()),
                ],
                EMPTY_PAYLOAD_SHA256,
                None,
                None,
            )
            .await?;
        header_str(&resp, "x-amz-multipart-upload-id")
    }

    async fn upload_part(
        &self,
        upload_id: &str,
        slice: &FileSlice,
    ) -> Result<Vec<u8>, UploadError> {
        let part = slice.part();
        let digest = treehash::hash_range(slice.path(), &part).await?;
        let tree_hex = hex::encode(digest.tree);
        let linear_hex = hex::encode(digest.linear);

        let path = format!("{}/{}", self.uploads_path(), upload_id);
        let resp = self
            .send(
                Method::PUT,
                &path,
                &[
                    ("content-range", format!("bytes {}-{}/*", part.start, part.end)),
                    ("x-amz-sha256-tree-hash", tree_hex.clone()),
                ],
                &linear_hex,
                Some(slice.body().await?),
                Some(part.len()),
            )
            .await?;

        // The service echoes the tree hash it computed over the received
        // bytes; a mismatch means corruption in flight.
        let echoed = header_str(&resp, "x-amz-sha256-tree-hash")?;
        if !echoed.eq_ignore_ascii_case(&tree_hex) {
            return Err(UploadError::ChecksumMismatch {
                sent: tree_hex,
                received: echoed,
            });
        }
        debug!(part = part.index, "part accepted");
        Ok(digest.tree.to_vec())
    }

    async fn complete(
        &self,
        upload_id: &str,
        file_size: u64,
        part_hashes: &[Vec<u8>],
    ) -> Result<(), UploadError> {
        let mut tree_hashes = Vec::with_capacity(part_hashes.len());
        for (n, hash) in part_hashes.iter().enumerate() {
            let digest: Digest32 = hash.as_slice().try_into().map_err(|_| {
                UploadError::Protocol(format!("stored hash for part {n} has unexpected length"))
            })?;
            tree_hashes.push(digest);
        }
        let root_hex = hex::encode(treehash::root_of(&tree_hashes));

        let path = format!("{}/{}", self.uploads_path(), upload_id);
        let resp = self
            .send(
                Method::POST,
                &path,
                &[
                    ("x-amz-archive-size", file_size.to_string()),
                    ("x-amz-sha256-tree-hash", root_hex.clone()),
                ],
                EMPTY_PAYLOAD_SHA256,
                None,
                None,
            )
            .await?;

        if let Some(archive_id) = resp
            .headers()
            .get("x-amz-archive-id")
            .and_then(|v| v.to_str().ok())
        {
            info!(archive_id, checksum = %root_hex, "archive assembled");
        }
        Ok(())
    }
}
