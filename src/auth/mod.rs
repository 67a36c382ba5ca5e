// Authentication module

use async_trait::async_trait;
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use pingora_http::RequestHeader;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;

use crate::config::JwtConfig;
use crate::constants::SECURITY_TOKEN_HEADER;
use crate::error::ProxyError;
use crate::router::extract_username;

#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub exp: u64,
    pub iat: Option<u64>,
    pub iss: Option<String>,
    #[serde(flatten)]
    pub custom: serde_json::Map<String, serde_json::Value>,
}

/// Decides whether a request may proceed to the backend.
///
/// Called only for requests the policy gate already allowed.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Authenticator: Send + Sync {
    async fn authenticate(&self, request: &RequestHeader) -> Result<(), ProxyError>;
}

/// Accepts every request. Used when `auth.enabled` is false.
pub struct AllowAll;

#[async_trait]
impl Authenticator for AllowAll {
    async fn authenticate(&self, _request: &RequestHeader) -> Result<(), ProxyError> {
        Ok(())
    }
}

// Helper function to get header value with case-insensitive matching
fn get_header_case_insensitive(
    headers: &HashMap<String, String>,
    header_name: &str,
) -> Option<String> {
    headers
        .iter()
        .find(|(key, _)| key.eq_ignore_ascii_case(header_name))
        .map(|(_, value)| value.to_string())
}

/// Collect the request headers into a map; non-UTF-8 values are skipped
pub fn headers_to_map(request: &RequestHeader) -> HashMap<String, String> {
    request
        .headers
        .iter()
        .filter_map(|(name, value)| {
            value
                .to_str()
                .ok()
                .map(|v| (name.as_str().to_string(), v.to_string()))
        })
        .collect()
}

pub fn extract_bearer_token(headers: &HashMap<String, String>) -> Option<String> {
    get_header_case_insensitive(headers, "Authorization")
        .and_then(|value| value.strip_prefix("Bearer ").map(|s| s.to_string()))
        .map(|token| token.trim().to_string())
        .filter(|token| !token.is_empty())
}

pub fn extract_header_token(
    headers: &HashMap<String, String>,
    header_name: &str,
) -> Option<String> {
    get_header_case_insensitive(headers, header_name)
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

/// The caller's token: the S3 session token first, then a bearer token
pub fn extract_token(headers: &HashMap<String, String>) -> Option<String> {
    extract_header_token(headers, SECURITY_TOKEN_HEADER).or_else(|| extract_bearer_token(headers))
}

/// Verifies a JWT and requires its `sub` to own the addressed namespace
pub struct JwtAuthenticator {
    key: DecodingKey,
    validation: Validation,
}

impl JwtAuthenticator {
    pub fn new(config: &JwtConfig) -> Result<Self, ProxyError> {
        let algorithm = Algorithm::from_str(&config.algorithm).map_err(|_| {
            ProxyError::Config(format!("unsupported JWT algorithm '{}'", config.algorithm))
        })?;

        let key = if config.is_hmac() {
            DecodingKey::from_secret(config.secret.as_bytes())
        } else {
            let path = config.public_key_path.as_deref().ok_or_else(|| {
                ProxyError::Config("auth.public_key_path is required".to_string())
            })?;
            let pem = std::fs::read(path).map_err(|e| {
                ProxyError::Config(format!("Failed to read JWT public key '{}': {}", path, e))
            })?;
            let parsed = if config.algorithm.starts_with("ES") {
                DecodingKey::from_ec_pem(&pem)
            } else {
                DecodingKey::from_rsa_pem(&pem)
            };
            parsed.map_err(|e| {
                ProxyError::Config(format!("Invalid JWT public key '{}': {}", path, e))
            })?
        };

        let mut validation = Validation::new(algorithm);
        validation.leeway = config.leeway;
        validation.set_required_spec_claims(&["exp", "sub"]);

        Ok(Self { key, validation })
    }

    pub fn validate_jwt(&self, token: &str) -> Result<Claims, jsonwebtoken::errors::Error> {
        let token_data = decode::<Claims>(token, &self.key, &self.validation)?;
        Ok(token_data.claims)
    }
}

#[async_trait]
impl Authenticator for JwtAuthenticator {
    async fn authenticate(&self, request: &RequestHeader) -> Result<(), ProxyError> {
        let username = extract_username(request.uri.path())?;
        let headers = headers_to_map(request);

        let token = extract_token(&headers)
            .ok_or_else(|| ProxyError::AuthenticationFailed("missing token".to_string()))?;

        let claims = self
            .validate_jwt(&token)
            .map_err(|e| ProxyError::AuthenticationFailed(format!("invalid token: {}", e)))?;

        if claims.sub != username {
            return Err(ProxyError::AuthenticationFailed(format!(
                "token subject '{}' does not own namespace '{}'",
                claims.sub, username
            )));
        }

        Ok(())
    }
}

/// Build the authenticator selected by the `auth` section
pub fn build_authenticator(config: &JwtConfig) -> Result<Arc<dyn Authenticator>, ProxyError> {
    if config.enabled {
        tracing::info!(algorithm = %config.algorithm, "JWT authentication enabled");
        Ok(Arc::new(JwtAuthenticator::new(config)?))
    } else {
        tracing::warn!("Authentication is disabled: every allowed request is forwarded");
        Ok(Arc::new(AllowAll))
    }
}
