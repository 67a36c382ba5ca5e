// Configuration module

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::ProxyError;

pub mod backend;
pub mod broker;
pub mod jwt;
pub mod server;

pub use backend::BackendConfig;
pub use broker::BrokerConfig;
pub use jwt::JwtConfig;
pub use server::{ListenerTlsConfig, ServerConfig};

const SUPPORTED_JWT_ALGORITHMS: &[&str] = &[
    "HS256", "HS384", "HS512", "RS256", "RS384", "RS512", "ES256", "ES384",
];

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    pub backend: BackendConfig,
    pub broker: BrokerConfig,
    #[serde(default)]
    pub auth: JwtConfig,
}

impl Config {
    pub fn from_yaml_with_env(yaml: &str) -> Result<Self, ProxyError> {
        // Replace ${VAR_NAME} with environment variable values
        let re = Regex::new(r"\$\{([A-Z_][A-Z0-9_]*)\}")
            .map_err(|e| ProxyError::Config(e.to_string()))?;

        // First, check that all referenced environment variables exist
        for caps in re.captures_iter(yaml) {
            let var_name = &caps[1];
            std::env::var(var_name).map_err(|_| {
                ProxyError::Config(format!(
                    "Environment variable '{}' is referenced but not set",
                    var_name
                ))
            })?;
        }

        let substituted = re.replace_all(yaml, |caps: &regex::Captures| {
            std::env::var(&caps[1]).unwrap_or_default()
        });

        let config: Config = serde_yaml::from_str(&substituted)?;
        Ok(config)
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ProxyError> {
        let yaml = std::fs::read_to_string(path)
            .map_err(|e| ProxyError::Config(format!("Failed to read config file: {}", e)))?;
        Self::from_yaml_with_env(&yaml)
    }

    /// Load a configuration file and validate it
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ProxyError> {
        let config = Self::from_file(path)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ProxyError> {
        let invalid = |msg: String| Err(ProxyError::Config(msg));

        if self.server.port == 0 {
            return invalid("server.port must be > 0".to_string());
        }
        if self.server.threads == 0 {
            return invalid("server.threads must be > 0".to_string());
        }

        let backend = &self.backend;
        if !backend.url.starts_with("http://") && !backend.url.starts_with("https://") {
            return invalid(format!(
                "backend.url '{}' must start with http:// or https://",
                backend.url
            ));
        }
        if backend.access_key.is_empty() {
            return invalid("backend.access_key cannot be empty".to_string());
        }
        if backend.secret_key.is_empty() {
            return invalid("backend.secret_key cannot be empty".to_string());
        }
        if backend.bucket.is_empty() || backend.bucket.contains('/') {
            return invalid(format!(
                "backend.bucket '{}' must be a non-empty bucket name",
                backend.bucket
            ));
        }
        if backend.region.is_empty() {
            return invalid("backend.region cannot be empty".to_string());
        }
        if backend.timeout == 0 {
            return invalid("backend.timeout must be > 0 seconds".to_string());
        }

        let broker = &self.broker;
        if broker.host.is_empty() {
            return invalid("broker.host cannot be empty".to_string());
        }
        if broker.port == 0 {
            return invalid("broker.port must be > 0".to_string());
        }
        if broker.exchange.is_empty() {
            return invalid("broker.exchange cannot be empty".to_string());
        }
        if broker.routing_key.is_empty() {
            return invalid("broker.routing_key cannot be empty".to_string());
        }
        if broker.confirm_timeout == 0 {
            return invalid("broker.confirm_timeout must be > 0 seconds".to_string());
        }

        let auth = &self.auth;
        if auth.enabled {
            if !SUPPORTED_JWT_ALGORITHMS.contains(&auth.algorithm.as_str()) {
                return invalid(format!(
                    "auth.algorithm '{}' is not supported. Supported algorithms: {}",
                    auth.algorithm,
                    SUPPORTED_JWT_ALGORITHMS.join(", ")
                ));
            }
            if auth.is_hmac() && auth.secret.is_empty() {
                return invalid(format!(
                    "auth.secret cannot be empty when auth.algorithm is {}",
                    auth.algorithm
                ));
            }
            if !auth.is_hmac() && auth.public_key_path.is_none() {
                return invalid(format!(
                    "auth.public_key_path is required when auth.algorithm is {}",
                    auth.algorithm
                ));
            }
        }

        Ok(())
    }
}
