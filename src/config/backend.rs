//! Backend (S3-compatible storage) configuration.

use serde::{Deserialize, Serialize};

use crate::constants::{DEFAULT_BACKEND_REGION, DEFAULT_BACKEND_TIMEOUT_SECS};

fn default_region() -> String {
    DEFAULT_BACKEND_REGION.to_string()
}

fn default_timeout() -> u64 {
    DEFAULT_BACKEND_TIMEOUT_SECS
}

/// Connection and credential settings for the shared backend bucket.
///
/// Loaded once at startup; the proxy and the metadata client share it
/// read-only through an `Arc`.
#[derive(Clone, Serialize, Deserialize)]
pub struct BackendConfig {
    /// Base URL of the backend, e.g. `https://s3.example.org:9000`
    pub url: String,
    pub access_key: String,
    pub secret_key: String,
    /// Shared bucket holding every user's prefix
    pub bucket: String,
    #[serde(default = "default_region")]
    pub region: String,
    /// PEM bundle trusted for the backend's TLS certificate
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ca_cert: Option<String>,
    /// Connect/read/write timeout in seconds
    #[serde(default = "default_timeout")]
    pub timeout: u64,
}

// Credentials stay out of logs
impl std::fmt::Debug for BackendConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackendConfig")
            .field("url", &self.url)
            .field("access_key", &self.access_key)
            .field("secret_key", &"<redacted>")
            .field("bucket", &self.bucket)
            .field("region", &self.region)
            .field("ca_cert", &self.ca_cert)
            .field("timeout", &self.timeout)
            .finish()
    }
}
