//! Upload completion detection and notification.
//!
//! A request finishes an upload when the backend accepted either a
//! single-shot PUT or the POST that completes a multipart upload. Part
//! uploads and multipart initiation do not count.

use http::Method;
use std::sync::Arc;

use crate::backend::ObjectMetadataSource;
use crate::error::ProxyError;
use crate::messenger::{EventPublisher, UploadEvent};
use crate::router::{extract_username, object_key};
use crate::s3::has_query_param;

/// Whether the backend's answer to this request means an object is now
/// fully stored.
pub fn is_upload_complete(method: &Method, query: Option<&str>, status: u16) -> bool {
    if !(200..300).contains(&status) {
        return false;
    }

    match *method {
        Method::PUT => !has_query_param(query, "partNumber"),
        Method::POST => has_query_param(query, "uploadId"),
        _ => false,
    }
}

/// Looks up a finished object and publishes its completion event
pub struct UploadNotifier {
    metadata: Arc<dyn ObjectMetadataSource>,
    publisher: Arc<dyn EventPublisher>,
}

impl UploadNotifier {
    pub fn new(metadata: Arc<dyn ObjectMetadataSource>, publisher: Arc<dyn EventPublisher>) -> Self {
        Self {
            metadata,
            publisher,
        }
    }

    /// Publish the completion event for the object at caller path `path`.
    ///
    /// Size and checksum come from the backend listing for the object's key.
    /// Returns the event that was confirmed by the broker.
    pub async fn notify(&self, path: &str) -> Result<UploadEvent, ProxyError> {
        let username = extract_username(path)?;
        let key = object_key(path)?;

        let metadata = self.metadata.object_metadata(&key).await?;

        let filepath = format!("/{}", key);
        let event = UploadEvent::upload(&username, &filepath, metadata.size, &metadata.etag);

        self.publisher.publish(&event).await?;

        Ok(event)
    }
}
