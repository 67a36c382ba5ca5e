//! Server configuration types.
//!
//! This module defines the listener configuration:
//! - Address and port bindings
//! - Optional TLS certificate and key for the public listener
//! - Worker thread count
//!
//! Default values are sourced from `crate::constants`.

use serde::{Deserialize, Serialize};

use crate::constants::{DEFAULT_LISTEN_ADDRESS, DEFAULT_LISTEN_PORT, DEFAULT_THREADS};

fn default_address() -> String {
    DEFAULT_LISTEN_ADDRESS.to_string()
}

fn default_port() -> u16 {
    DEFAULT_LISTEN_PORT
}

// Default worker thread count
fn default_threads() -> usize {
    DEFAULT_THREADS
}

/// TLS material for the public listener
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ListenerTlsConfig {
    /// Path to the PEM certificate chain
    pub cert_path: String,
    /// Path to the PEM private key
    pub key_path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_address")]
    pub address: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Number of worker threads (default: 4)
    #[serde(default = "default_threads")]
    pub threads: usize,
    /// Serve HTTPS when present, plain HTTP otherwise
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tls: Option<ListenerTlsConfig>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            address: default_address(),
            port: default_port(),
            threads: default_threads(),
            tls: None,
        }
    }
}

impl ServerConfig {
    /// Socket address string for the listener
    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.address, self.port)
    }
}
