// Request pipeline module - per-request state carried through the proxy hooks

use std::time::Instant;
use uuid::Uuid;

use crate::router::UpstreamTarget;
use crate::s3::S3Operation;

/// Request context that holds everything learned about a request as it
/// moves from admission to the backend and back.
#[derive(Debug, Clone)]
pub struct RequestContext {
    request_id: String,
    method: String,
    path: String,
    query: Option<String>,
    operation: Option<S3Operation>,
    username: Option<String>,
    target: Option<UpstreamTarget>,
    backend_status: Option<u16>,
    started: Instant,
}

impl RequestContext {
    /// Create a new RequestContext from HTTP request information
    /// Automatically generates a unique request ID (UUID v4) and captures the start time
    pub fn new(method: String, path: String) -> Self {
        Self {
            request_id: Uuid::new_v4().to_string(),
            method,
            path,
            query: None,
            operation: None,
            username: None,
            target: None,
            backend_status: None,
            started: Instant::now(),
        }
    }

    /// Get the unique request ID
    pub fn request_id(&self) -> &str {
        &self.request_id
    }

    pub fn method(&self) -> &str {
        &self.method
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn query(&self) -> Option<&str> {
        self.query.as_deref()
    }

    /// Record the request line as received from the caller
    pub fn set_request(&mut self, method: String, path: String, query: Option<String>) {
        self.method = method;
        self.path = path;
        self.query = query.filter(|q| !q.is_empty());
    }

    pub fn operation(&self) -> Option<S3Operation> {
        self.operation
    }

    pub fn set_operation(&mut self, operation: S3Operation) {
        self.operation = Some(operation);
    }

    pub fn username(&self) -> Option<&str> {
        self.username.as_deref()
    }

    pub fn set_username(&mut self, username: String) {
        self.username = Some(username);
    }

    /// Where the request is sent on the backend (set once admitted)
    pub fn target(&self) -> Option<&UpstreamTarget> {
        self.target.as_ref()
    }

    pub fn set_target(&mut self, target: UpstreamTarget) {
        self.target = Some(target);
    }

    pub fn backend_status(&self) -> Option<u16> {
        self.backend_status
    }

    pub fn set_backend_status(&mut self, status: u16) {
        self.backend_status = Some(status);
    }

    /// Milliseconds since the context was created
    pub fn elapsed_ms(&self) -> u128 {
        self.started.elapsed().as_millis()
    }
}
