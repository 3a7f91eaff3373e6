//! AWS Signature Version 4 request signing, as Glacier requires it.

use std::collections::BTreeMap;

use hmac::{Hmac, Mac};
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use sha2::{Digest, Sha256};
use time::macros::format_description;
use time::OffsetDateTime;

type HmacSha256 = Hmac<Sha256>;

/// SHA-256 of an empty payload, hex-encoded.
pub const EMPTY_PAYLOAD_SHA256: &str =
    "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855";

// Unreserved set: A-Z a-z 0-9 _ - ~ . ; everything else is %HH.
const SIGV4_ENCODE: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'_')
    .remove(b'-')
    .remove(b'~')
    .remove(b'.');
// Path variant keeps `/` verbatim.
const SIGV4_ENCODE_PATH: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'_')
    .remove(b'-')
    .remove(b'~')
    .remove(b'.')
    .remove(b'/');

#[derive(Debug, Clone)]
pub struct Credentials {
    pub access_key: String,
    pub secret_key: String,
}

/// Everything the signature covers for one request. Header names must be
/// lowercase; values trimmed.
pub struct SignParams<'a> {
    pub method: &'a str,
    pub path: &'a str,
    pub query: &'a [(String, String)],
    pub headers: &'a BTreeMap<String, String>,
    pub payload_sha256: &'a str,
    pub region: &'a str,
    pub service: &'a str,
    pub timestamp: OffsetDateTime,
}

pub fn uri_encode(input: &str, encode_slash: bool) -> String {
    let set = if encode_slash {
        SIGV4_ENCODE
    } else {
        SIGV4_ENCODE_PATH
    };
    utf8_percent_encode(input, set).to_string()
}

/// `yyyymmddThhmmssZ`
pub fn amz_datetime(t: OffsetDateTime) -> String {
    let fmt = format_description!("[year][month][day]T[hour][minute][second]Z");
    t.format(&fmt).expect("static datetime format")
}

/// `yyyymmdd`
pub fn amz_date(t: OffsetDateTime) -> String {
    let fmt = format_description!("[year][month][day]");
    t.format(&fmt).expect("static date format")
}

pub fn canonical_request(p: &SignParams) -> String {
    let mut query: Vec<(String, String)> = p
        .query
        .iter()
        .map(|(k, v)| (uri_encode(k, true), uri_encode(v, true)))
        .collect();
    query.sort();
    let canonical_query = query
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join("&");

    let canonical_headers = p
        .headers
        .iter()
        .map(|(k, v)| format!("{k}:{}\n", v.trim()))
        .collect::<String>();

    format!(
        "{}\n{}\n{}\n{}\n{}\n{}",
        p.method,
        uri_encode(p.path, false),
        canonical_query,
        canonical_headers,
        signed_header_names(p.headers),
        p.payload_sha256
    )
}

pub fn signed_header_names(headers: &BTreeMap<String, String>) -> String {
    headers.keys().cloned().collect::<Vec<_>>().join(";")
}

fn credential_scope(p: &SignParams) -> String {
    format!(
        "{}/{}/{}/aws4_request",
        amz_date(p.timestamp),
        p.region,
        p.service
    )
}

pub fn string_to_sign(p: &SignParams, canonical: &str) -> String {
    format!(
        "AWS4-HMAC-SHA256\n{}\n{}\n{}",
        amz_datetime(p.timestamp),
        credential_scope(p),
        hex::encode(Sha256::digest(canonical.as_bytes()))
    )
}

fn hmac_sha256(key: &[u8], data: &[u8]) -> Vec<u8> {
    let mut mac = HmacSha256::new_from_slice(key).expect("hmac accepts any key length");
    mac.update(data);
    mac.finalize().into_bytes().to_vec()
}

/// HMAC chain over ("AWS4" + secret) against date, region, service, and
/// the literal `aws4_request`.
pub fn signing_key(secret: &str, date: &str, region: &str, service: &str) -> Vec<u8> {
    let k_date = hmac_sha256(format!("AWS4{secret}").as_bytes(), date.as_bytes());
    let k_region = hmac_sha256(&k_date, region.as_bytes());
    let k_service = hmac_sha256(&k_region, service.as_bytes());
    hmac_sha256(&k_service, b"aws4_request")
}

/// The complete `Authorization` header value for one request.
pub fn authorization_header(creds: &Credentials, p: &SignParams) -> String {
    let canonical = canonical_request(p);
    let to_sign = string_to_sign(p, &canonical);
    let key = signing_key(
        &creds.secret_key,
        &amz_date(p.timestamp),
        p.region,
        p.service,
    );
    let signature = hex::encode(hmac_sha256(&key, to_sign.as_bytes()));
    format!(
        "AWS4-HMAC-SHA256 Credential={}/{}, SignedHeaders={}, Signature={}",
        creds.access_key,
        credential_scope(p),
        signed_header_names(p.headers),
        signature
    )
}
