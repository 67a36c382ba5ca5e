//! Message broker (AMQP) configuration.

use serde::{Deserialize, Serialize};

use crate::constants::{DEFAULT_BROKER_PORT, DEFAULT_BROKER_VHOST, DEFAULT_CONFIRM_TIMEOUT_SECS};

fn default_port() -> u16 {
    DEFAULT_BROKER_PORT
}

fn default_vhost() -> String {
    DEFAULT_BROKER_VHOST.to_string()
}

fn default_confirm_timeout() -> u64 {
    DEFAULT_CONFIRM_TIMEOUT_SECS
}

/// Settings for the broker that receives upload completion events.
#[derive(Clone, Serialize, Deserialize)]
pub struct BrokerConfig {
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    pub user: String,
    pub password: String,
    #[serde(default = "default_vhost")]
    pub vhost: String,
    /// Topic exchange events are published to
    pub exchange: String,
    pub routing_key: String,
    /// Connect with `amqps://`
    #[serde(default)]
    pub ssl: bool,
    /// PEM bundle trusted for the broker's TLS certificate
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ca_cert: Option<String>,
    /// Seconds to wait for the broker to confirm a publish
    #[serde(default = "default_confirm_timeout")]
    pub confirm_timeout: u64,
}

impl BrokerConfig {
    /// Build the AMQP URI for this broker
    ///
    /// User, password and vhost are percent-encoded, so a vhost of `/`
    /// becomes the `%2F` path segment AMQP expects.
    pub fn amqp_uri(&self) -> String {
        let scheme = if self.ssl { "amqps" } else { "amqp" };
        format!(
            "{}://{}:{}@{}:{}/{}",
            scheme,
            urlencoding::encode(&self.user),
            urlencoding::encode(&self.password),
            self.host,
            self.port,
            urlencoding::encode(&self.vhost)
        )
    }

    /// Same URI with the password masked, for logging
    pub fn redacted_uri(&self) -> String {
        let scheme = if self.ssl { "amqps" } else { "amqp" };
        format!(
            "{}://{}:***@{}:{}/{}",
            scheme,
            urlencoding::encode(&self.user),
            self.host,
            self.port,
            urlencoding::encode(&self.vhost)
        )
    }
}

impl std::fmt::Debug for BrokerConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BrokerConfig")
            .field("uri", &self.redacted_uri())
            .field("exchange", &self.exchange)
            .field("routing_key", &self.routing_key)
            .field("ca_cert", &self.ca_cert)
            .field("confirm_timeout", &self.confirm_timeout)
            .finish()
    }
}
