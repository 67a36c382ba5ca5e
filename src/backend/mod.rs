// Backend metadata lookups
//
// Completion events carry the size and entity tag the backend reports for
// the finished object, never values supplied by the caller.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::time::Duration;

use crate::config::BackendConfig;
use crate::constants::UNSIGNED_PAYLOAD;
use crate::error::ProxyError;
use crate::proxy::upstream::BackendEndpoint;
use crate::s3::listing::{list_objects_v2_query, parse_list_objects_v2};
use crate::s3::signing::{amz_timestamps, authorization_for, BackendCredentials};

/// Authoritative facts about a stored object
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectMetadata {
    pub size: u64,
    /// Entity tag without quotes
    pub etag: String,
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ObjectMetadataSource: Send + Sync {
    /// Metadata for the object stored under `key` in the shared bucket
    async fn object_metadata(&self, key: &str) -> Result<ObjectMetadata, ProxyError>;
}

/// A fully signed backend GET, ready to send
#[derive(Debug, Clone)]
pub struct SignedListRequest {
    pub url: String,
    pub headers: BTreeMap<String, String>,
}

/// Looks objects up with a one-key ListObjectsV2 on the shared bucket
pub struct S3MetadataClient {
    client: reqwest::Client,
    endpoint: BackendEndpoint,
    bucket: String,
    credentials: BackendCredentials,
}

impl S3MetadataClient {
    pub fn new(config: &BackendConfig) -> Result<Self, ProxyError> {
        let endpoint = BackendEndpoint::parse(&config.url)?;

        let mut builder = reqwest::Client::builder().timeout(Duration::from_secs(config.timeout));
        if let Some(ca_path) = &config.ca_cert {
            let pem = std::fs::read(ca_path).map_err(|e| {
                ProxyError::Config(format!("Failed to read CA bundle '{}': {}", ca_path, e))
            })?;
            let cert = reqwest::Certificate::from_pem(&pem).map_err(|e| {
                ProxyError::Config(format!("Invalid CA bundle '{}': {}", ca_path, e))
            })?;
            builder = builder.add_root_certificate(cert);
        }
        let client = builder
            .build()
            .map_err(|e| ProxyError::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            endpoint,
            bucket: config.bucket.clone(),
            credentials: BackendCredentials::from_backend_config(config),
        })
    }

    /// Build the signed listing request for `key`
    pub fn signed_list_request(&self, key: &str, now: DateTime<Utc>) -> SignedListRequest {
        let path = format!("/{}", self.bucket);
        let query = list_objects_v2_query(key, 1);
        let (datetime, date) = amz_timestamps(now);

        let mut headers = BTreeMap::new();
        headers.insert("host".to_string(), self.endpoint.authority());
        headers.insert(
            "x-amz-content-sha256".to_string(),
            UNSIGNED_PAYLOAD.to_string(),
        );
        headers.insert("x-amz-date".to_string(), datetime.clone());

        let authorization = authorization_for(
            &self.credentials,
            "GET",
            &path,
            &query,
            &headers,
            UNSIGNED_PAYLOAD,
            &date,
            &datetime,
        );
        headers.insert("authorization".to_string(), authorization);

        SignedListRequest {
            url: format!("{}{}?{}", self.endpoint.base_url(), path, query),
            headers,
        }
    }
}

#[async_trait]
impl ObjectMetadataSource for S3MetadataClient {
    async fn object_metadata(&self, key: &str) -> Result<ObjectMetadata, ProxyError> {
        let signed = self.signed_list_request(key, Utc::now());

        let mut request = self.client.get(&signed.url);
        for (name, value) in &signed.headers {
            // reqwest derives Host from the URL
            if name != "host" {
                request = request.header(name.as_str(), value.as_str());
            }
        }

        let response = request
            .send()
            .await
            .map_err(|e| ProxyError::MetadataLookup(format!("listing request failed: {}", e)))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| ProxyError::MetadataLookup(format!("reading listing failed: {}", e)))?;

        if !status.is_success() {
            return Err(ProxyError::MetadataLookup(format!(
                "backend answered listing with {}",
                status
            )));
        }

        let objects = parse_list_objects_v2(&body)?;
        let first = objects.into_iter().next().ok_or_else(|| {
            ProxyError::MetadataLookup(format!("object '{}' not found", key))
        })?;

        if first.key != key {
            return Err(ProxyError::MetadataLookup(format!(
                "listing returned '{}' instead of '{}'",
                first.key, key
            )));
        }

        tracing::debug!(key = %key, size = first.size, etag = %first.etag, "Resolved object metadata");

        Ok(ObjectMetadata {
            size: first.size,
            etag: first.etag,
        })
    }
}
