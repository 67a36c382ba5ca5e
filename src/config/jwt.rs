//! JWT configuration types for edge authentication.
//!
//! Callers present a JWT either as their S3 session token
//! (`X-Amz-Security-Token`) or as an `Authorization: Bearer` header. The
//! token's `sub` claim must name the user whose namespace the request path
//! addresses.
//!
//! # Key material
//!
//! - `HS256` / `HS384` / `HS512`: shared `secret`
//! - `RS256` / `RS384` / `RS512` / `ES256` / `ES384`: PEM public key at
//!   `public_key_path`
//!
//! # Validation Requirements
//!
//! When `enabled: true`, [`Config::validate()`] rejects an unknown algorithm,
//! an HMAC algorithm with an empty secret, and an asymmetric algorithm
//! without a key path.
//!
//! [`Config::validate()`]: super::Config::validate

use serde::{Deserialize, Serialize};

fn default_enabled() -> bool {
    true
}

fn default_algorithm() -> String {
    "RS256".to_string()
}

/// JWT authentication configuration.
#[derive(Clone, Serialize, Deserialize)]
pub struct JwtConfig {
    /// Whether requests must carry a valid token. Defaults to `true`.
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Signing algorithm expected in tokens (default: RS256)
    #[serde(default = "default_algorithm")]
    pub algorithm: String,
    /// Secret for HS256/HS384/HS512 algorithms
    #[serde(default)]
    pub secret: String,
    /// Path to the RSA or ECDSA public key PEM file
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub public_key_path: Option<String>,
    /// Allowed clock skew in seconds for `exp`/`nbf`
    #[serde(default)]
    pub leeway: u64,
}

impl Default for JwtConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            algorithm: default_algorithm(),
            secret: String::new(),
            public_key_path: None,
            leeway: 0,
        }
    }
}

impl JwtConfig {
    /// True for the HMAC family, which verifies with a shared secret
    pub fn is_hmac(&self) -> bool {
        matches!(self.algorithm.as_str(), "HS256" | "HS384" | "HS512")
    }
}

impl std::fmt::Debug for JwtConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JwtConfig")
            .field("enabled", &self.enabled)
            .field("algorithm", &self.algorithm)
            .field("public_key_path", &self.public_key_path)
            .field("leeway", &self.leeway)
            .finish()
    }
}
