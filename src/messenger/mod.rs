//! Upload completion events and their delivery to the message broker.
//!
//! Each finished upload produces one [`UploadEvent`], published as JSON to a
//! topic exchange. Publishing waits for the broker's confirmation so a lost
//! event surfaces as an error instead of disappearing silently.

use async_trait::async_trait;
use lapin::options::{BasicPublishOptions, ConfirmSelectOptions, ExchangeDeclareOptions};
use lapin::publisher_confirm::Confirmation;
use lapin::tcp::OwnedTLSConfig;
use lapin::types::FieldTable;
use lapin::{BasicProperties, Channel, Connection, ConnectionProperties, ExchangeKind};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::config::BrokerConfig;
use crate::constants::{DELIVERY_MODE_TRANSIENT, ETAG_CHECKSUM_TYPE, UPLOAD_OPERATION};
use crate::error::ProxyError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Checksum {
    #[serde(rename = "type")]
    pub kind: String,
    pub value: String,
}

/// A finished upload, as announced to downstream consumers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadEvent {
    pub operation: String,
    #[serde(rename = "user")]
    pub username: String,
    pub filepath: String,
    pub filesize: u64,
    #[serde(rename = "encoded_checksum")]
    pub checksum: Checksum,
}

impl UploadEvent {
    /// Event for a completed upload whose backend entity tag is `etag`
    pub fn upload(username: &str, filepath: &str, filesize: u64, etag: &str) -> Self {
        Self {
            operation: UPLOAD_OPERATION.to_string(),
            username: username.to_string(),
            filepath: filepath.to_string(),
            filesize,
            checksum: Checksum {
                kind: ETAG_CHECKSUM_TYPE.to_string(),
                value: etag.to_string(),
            },
        }
    }
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait EventPublisher: Send + Sync {
    /// Publish one event and wait until the broker confirms it
    async fn publish(&self, event: &UploadEvent) -> Result<(), ProxyError>;
}

/// Map a publisher confirmation to a result
pub fn confirmation_result(confirmation: Confirmation) -> Result<(), ProxyError> {
    match confirmation {
        Confirmation::Ack(_) => Ok(()),
        Confirmation::Nack(_) => Err(ProxyError::Publish(
            "broker negatively acknowledged the event".to_string(),
        )),
        Confirmation::NotRequested => Err(ProxyError::Publish(
            "channel is not in confirm mode".to_string(),
        )),
    }
}

/// Wait for one publisher confirmation, bounded by `timeout`
pub async fn await_confirmation<F>(confirm: F, timeout: Duration) -> Result<(), ProxyError>
where
    F: Future<Output = lapin::Result<Confirmation>>,
{
    let confirmation = tokio::time::timeout(timeout, confirm)
        .await
        .map_err(|_| ProxyError::Publish(format!("no confirmation within {:?}", timeout)))?
        .map_err(|e| ProxyError::Publish(format!("confirmation failed: {}", e)))?;

    confirmation_result(confirmation)
}

/// What a publish has to do before it can use the broker link
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkAction {
    Reuse,
    ReopenChannel,
    Reconnect,
}

impl LinkAction {
    /// `link` is `(connection open, channel open)`, `None` before the first connect
    pub fn for_link(link: Option<(bool, bool)>) -> Self {
        match link {
            Some((true, true)) => LinkAction::Reuse,
            Some((true, false)) => LinkAction::ReopenChannel,
            Some((false, _)) | None => LinkAction::Reconnect,
        }
    }
}

struct BrokerLink {
    connection: Connection,
    channel: Channel,
}

/// Publishes events over AMQP 0-9-1 with publisher confirms
///
/// One connection and one confirm-mode channel are shared by every request.
/// The link lock is held from publish until the confirmation arrives, so
/// each confirmation is matched to its own publish.
///
/// A publisher built with [`AmqpPublisher::new`] connects on its first
/// publish. Pingora forks when daemonizing and the broker's I/O threads do
/// not survive a fork, so daemon mode must not connect before `run_forever`.
pub struct AmqpPublisher {
    config: BrokerConfig,
    link: Mutex<Option<BrokerLink>>,
    confirm_timeout: Duration,
}

impl AmqpPublisher {
    /// Publisher that connects lazily
    pub fn new(config: &BrokerConfig) -> Self {
        Self {
            config: config.clone(),
            link: Mutex::new(None),
            confirm_timeout: Duration::from_secs(config.confirm_timeout),
        }
    }

    /// Publisher with its connection already open
    pub async fn connect(config: &BrokerConfig) -> Result<Self, ProxyError> {
        let publisher = Self::new(config);
        let link = Self::open_link(config).await?;
        *publisher.link.lock().await = Some(link);
        Ok(publisher)
    }

    async fn open_link(config: &BrokerConfig) -> Result<BrokerLink, ProxyError> {
        let uri = config.amqp_uri();
        tracing::info!(broker = %config.redacted_uri(), "Connecting to message broker");

        let connection = if config.ssl {
            let cert_chain = match &config.ca_cert {
                Some(path) => Some(std::fs::read_to_string(path).map_err(|e| {
                    ProxyError::Config(format!("Failed to read broker CA '{}': {}", path, e))
                })?),
                None => None,
            };
            Connection::connect_with_config(
                &uri,
                ConnectionProperties::default(),
                OwnedTLSConfig {
                    identity: None,
                    cert_chain,
                },
            )
            .await
        } else {
            Connection::connect(&uri, ConnectionProperties::default()).await
        }
        .map_err(|e| ProxyError::Publish(format!("broker connection failed: {}", e)))?;

        let channel = Self::open_channel(&connection, &config.exchange).await?;

        tracing::info!(
            exchange = %config.exchange,
            routing_key = %config.routing_key,
            "Publisher confirms enabled"
        );

        Ok(BrokerLink {
            connection,
            channel,
        })
    }

    async fn open_channel(connection: &Connection, exchange: &str) -> Result<Channel, ProxyError> {
        let channel = connection
            .create_channel()
            .await
            .map_err(|e| ProxyError::Publish(format!("failed to open channel: {}", e)))?;

        channel
            .confirm_select(ConfirmSelectOptions::default())
            .await
            .map_err(|e| ProxyError::Publish(format!("failed to enable confirms: {}", e)))?;

        channel
            .exchange_declare(
                exchange,
                ExchangeKind::Topic,
                ExchangeDeclareOptions {
                    durable: true,
                    ..Default::default()
                },
                FieldTable::default(),
            )
            .await
            .map_err(|e| {
                ProxyError::Publish(format!("failed to declare exchange '{}': {}", exchange, e))
            })?;

        Ok(channel)
    }

    /// Make the link usable, reopening the channel or the whole connection
    async fn ready_channel<'a>(
        &self,
        link: &'a mut Option<BrokerLink>,
    ) -> Result<&'a Channel, ProxyError> {
        let state = link.as_ref().map(|l| {
            (
                l.connection.status().connected(),
                l.channel.status().connected(),
            )
        });

        match LinkAction::for_link(state) {
            LinkAction::Reuse => {}
            LinkAction::ReopenChannel => {
                if let Some(l) = link.as_mut() {
                    tracing::warn!("Broker channel closed, reopening");
                    l.channel = Self::open_channel(&l.connection, &self.config.exchange).await?;
                }
            }
            LinkAction::Reconnect => {
                if link.is_some() {
                    tracing::warn!("Broker connection closed, reconnecting");
                }
                *link = None;
                *link = Some(Self::open_link(&self.config).await?);
            }
        }

        link.as_ref()
            .map(|l| &l.channel)
            .ok_or_else(|| ProxyError::Publish("broker link unavailable".to_string()))
    }
}

#[async_trait]
impl EventPublisher for AmqpPublisher {
    async fn publish(&self, event: &UploadEvent) -> Result<(), ProxyError> {
        let payload = serde_json::to_vec(event)
            .map_err(|e| ProxyError::Publish(format!("failed to serialize event: {}", e)))?;
        let correlation_id = Uuid::new_v4().to_string();

        let mut link = self.link.lock().await;
        let channel = self.ready_channel(&mut *link).await?;

        let properties = BasicProperties::default()
            .with_content_type("application/json".into())
            .with_content_encoding("UTF-8".into())
            .with_delivery_mode(DELIVERY_MODE_TRANSIENT)
            .with_correlation_id(correlation_id.clone().into());

        let confirm = channel
            .basic_publish(
                &self.config.exchange,
                &self.config.routing_key,
                BasicPublishOptions::default(),
                &payload,
                properties,
            )
            .await
            .map_err(|e| ProxyError::Publish(format!("publish failed: {}", e)))?;

        await_confirmation(confirm, self.confirm_timeout).await?;

        tracing::info!(
            correlation_id = %correlation_id,
            user = %event.username,
            filepath = %event.filepath,
            "Upload event confirmed by broker"
        );

        Ok(())
    }
}
