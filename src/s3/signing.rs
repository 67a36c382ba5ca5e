//! AWS Signature Version 4 request signing.
//!
//! The proxy never forwards a caller's signature: every backend request is
//! signed again with the proxy's own credentials. The canonical request is
//!
//! ```text
//! HTTPRequestMethod\n
//! CanonicalURI\n
//! CanonicalQueryString\n
//! CanonicalHeaders\n\n
//! SignedHeaders\n
//! HashedPayload
//! ```
//!
//! Path segments and query parameters are decoded and re-encoded with the
//! SigV4 unreserved set so the result matches what the backend recomputes,
//! whatever encoding the original client used.

use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

use crate::config::BackendConfig;
use crate::constants::S3_SERVICE;

type HmacSha256 = Hmac<Sha256>;

fn hmac_sha256(key: &[u8], data: &[u8]) -> Vec<u8> {
    let mut mac = HmacSha256::new_from_slice(key).expect("HMAC can take key of any size");
    mac.update(data);
    mac.finalize().into_bytes().to_vec()
}

pub fn sha256_hex(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

/// Static credentials the proxy signs backend requests with
#[derive(Clone)]
pub struct BackendCredentials {
    pub access_key: String,
    pub secret_key: String,
    pub region: String,
}

impl BackendCredentials {
    pub fn from_backend_config(config: &BackendConfig) -> Self {
        Self {
            access_key: config.access_key.clone(),
            secret_key: config.secret_key.clone(),
            region: config.region.clone(),
        }
    }
}

impl std::fmt::Debug for BackendCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackendCredentials")
            .field("access_key", &self.access_key)
            .field("region", &self.region)
            .finish_non_exhaustive()
    }
}

/// `x-amz-date` (YYYYMMDDTHHMMSSZ) and credential-scope date (YYYYMMDD)
pub fn amz_timestamps(now: DateTime<Utc>) -> (String, String) {
    (
        now.format("%Y%m%dT%H%M%SZ").to_string(),
        now.format("%Y%m%d").to_string(),
    )
}

pub struct SigningParams<'a> {
    pub method: &'a str,
    /// Request path as sent on the wire (may be percent-encoded)
    pub uri: &'a str,
    /// Raw query string without the leading `?`
    pub query_string: &'a str,
    /// Headers to sign, keyed by lowercase name
    pub headers: &'a BTreeMap<String, String>,
    pub payload_hash: &'a str,
    pub access_key: &'a str,
    pub secret_key: &'a str,
    pub region: &'a str,
    pub service: &'a str,
    pub date: &'a str,     // Format: YYYYMMDD
    pub datetime: &'a str, // Format: YYYYMMDDTHHMMSSZ
}

fn decode_component(value: &str) -> String {
    urlencoding::decode(value)
        .map(|decoded| decoded.into_owned())
        .unwrap_or_else(|_| value.to_string())
}

/// Canonical URI: every segment decoded, then encoded with the unreserved set.
/// Slashes are preserved; an empty path becomes `/`.
pub fn canonical_uri(path: &str) -> String {
    if path.is_empty() {
        return "/".to_string();
    }

    path.split('/')
        .map(|segment| urlencoding::encode(&decode_component(segment)).into_owned())
        .collect::<Vec<_>>()
        .join("/")
}

/// Canonical query string: names and values decoded (`+` is a space),
/// re-encoded, then sorted by name and value.
pub fn canonical_query_string(query: &str) -> String {
    let mut params: Vec<(String, String)> = crate::s3::query_pairs(query)
        .map(|(name, value)| {
            let name = crate::s3::decode_query_component(name);
            let value = crate::s3::decode_query_component(value);
            (
                urlencoding::encode(&name).into_owned(),
                urlencoding::encode(&value).into_owned(),
            )
        })
        .collect();

    params.sort();

    params
        .iter()
        .map(|(name, value)| format!("{}={}", name, value))
        .collect::<Vec<_>>()
        .join("&")
}

fn collapse_whitespace(value: &str) -> String {
    value.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn signed_headers_list(params: &SigningParams) -> String {
    params
        .headers
        .keys()
        .map(|k| k.to_lowercase())
        .collect::<Vec<_>>()
        .join(";")
}

pub fn create_canonical_request(params: &SigningParams) -> String {
    let canonical_headers = params
        .headers
        .iter()
        .map(|(k, v)| format!("{}:{}", k.to_lowercase(), collapse_whitespace(v)))
        .collect::<Vec<_>>()
        .join("\n");

    format!(
        "{}\n{}\n{}\n{}\n\n{}\n{}",
        params.method,
        canonical_uri(params.uri),
        canonical_query_string(params.query_string),
        canonical_headers,
        signed_headers_list(params),
        params.payload_hash
    )
}

pub fn create_string_to_sign(params: &SigningParams) -> String {
    let canonical_request = create_canonical_request(params);
    let canonical_request_hash = sha256_hex(canonical_request.as_bytes());

    let credential_scope = format!(
        "{}/{}/{}/aws4_request",
        params.date, params.region, params.service
    );

    format!(
        "AWS4-HMAC-SHA256\n{}\n{}\n{}",
        params.datetime, credential_scope, canonical_request_hash
    )
}

pub fn derive_signing_key(secret_key: &str, date: &str, region: &str, service: &str) -> Vec<u8> {
    let k_date = hmac_sha256(format!("AWS4{}", secret_key).as_bytes(), date.as_bytes());
    let k_region = hmac_sha256(&k_date, region.as_bytes());
    let k_service = hmac_sha256(&k_region, service.as_bytes());
    hmac_sha256(&k_service, b"aws4_request")
}

/// Compute the `Authorization` header value for a request
pub fn sign_request(params: &SigningParams) -> String {
    let string_to_sign = create_string_to_sign(params);

    let credential_scope = format!(
        "{}/{}/{}/aws4_request",
        params.date, params.region, params.service
    );

    let k_signing = derive_signing_key(
        params.secret_key,
        params.date,
        params.region,
        params.service,
    );
    let signature = hex::encode(hmac_sha256(&k_signing, string_to_sign.as_bytes()));

    format!(
        "AWS4-HMAC-SHA256 Credential={}/{}, SignedHeaders={}, Signature={}",
        params.access_key,
        credential_scope,
        signed_headers_list(params),
        signature
    )
}

/// Whether a header takes part in the backend signature
///
/// `host`, every `x-amz-*` header, `content-md5` and `content-type` are
/// signed; transport headers that intermediaries may rewrite are not.
pub fn is_signed_header(name: &str) -> bool {
    let name = name.to_ascii_lowercase();
    name == "host" || name == "content-md5" || name == "content-type" || name.starts_with("x-amz-")
}

/// Sign a request with the backend credentials.
///
/// `headers` must already contain `host`, `x-amz-date` and
/// `x-amz-content-sha256`; only headers accepted by [`is_signed_header`] are
/// used. Returns the `Authorization` header value.
#[allow(clippy::too_many_arguments)]
pub fn authorization_for(
    credentials: &BackendCredentials,
    method: &str,
    path: &str,
    query: &str,
    headers: &BTreeMap<String, String>,
    payload_hash: &str,
    date: &str,
    datetime: &str,
) -> String {
    let signed: BTreeMap<String, String> = headers
        .iter()
        .filter(|(name, _)| is_signed_header(name))
        .map(|(name, value)| (name.to_ascii_lowercase(), value.clone()))
        .collect();

    let params = SigningParams {
        method,
        uri: path,
        query_string: query,
        headers: &signed,
        payload_hash,
        access_key: &credentials.access_key,
        secret_key: &credentials.secret_key,
        region: &credentials.region,
        service: S3_SERVICE,
        date,
        datetime,
    };

    sign_request(&params)
}
