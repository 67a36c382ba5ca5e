// Constants module - centralized default values and protocol literals
//
// This module defines the default values used throughout the codebase
// together with the header names and query parameters the pipeline keys on.

// =============================================================================
// Server defaults
// =============================================================================

/// Default listen address
pub const DEFAULT_LISTEN_ADDRESS: &str = "0.0.0.0";

/// Default listen port
pub const DEFAULT_LISTEN_PORT: u16 = 8000;

/// Default number of worker threads
pub const DEFAULT_THREADS: usize = 4;

// =============================================================================
// Backend defaults
// =============================================================================

/// Default backend operation timeout in seconds (connect, read and write)
pub const DEFAULT_BACKEND_TIMEOUT_SECS: u64 = 30;

/// Default backend region used for request signing
pub const DEFAULT_BACKEND_REGION: &str = "us-east-1";

/// Service name in the SigV4 credential scope
pub const S3_SERVICE: &str = "s3";

/// Payload hash used when the caller did not declare one
pub const UNSIGNED_PAYLOAD: &str = "UNSIGNED-PAYLOAD";

// =============================================================================
// Broker defaults
// =============================================================================

/// Default AMQP port
pub const DEFAULT_BROKER_PORT: u16 = 5672;

/// Default AMQP virtual host
pub const DEFAULT_BROKER_VHOST: &str = "/";

/// Default time to wait for a publisher confirmation, in seconds
pub const DEFAULT_CONFIRM_TIMEOUT_SECS: u64 = 30;

/// AMQP delivery mode 1: transient (non-persistent) message
pub const DELIVERY_MODE_TRANSIENT: u8 = 1;

// =============================================================================
// Upload events
// =============================================================================

/// Operation tag carried by completion events
pub const UPLOAD_OPERATION: &str = "upload";

/// Checksum type reported for backend entity tags
pub const ETAG_CHECKSUM_TYPE: &str = "md5";

// =============================================================================
// Headers
// =============================================================================

/// Headers injected by the edge (ingress, load balancer) or carrying caller
/// credentials; removed before a request is re-signed for the backend.
pub const EDGE_HEADERS: &[&str] = &[
    "x-amz-security-token",
    "x-forwarded-port",
    "x-forwarded-proto",
    "x-forwarded-host",
    "x-forwarded-for",
    "x-original-uri",
    "x-real-ip",
    "x-request-id",
    "x-scheme",
];

/// Server-side copy source header; copies are never proxied
pub const COPY_SOURCE_HEADER: &str = "x-amz-copy-source";

/// Header carrying the caller's session token
pub const SECURITY_TOKEN_HEADER: &str = "x-amz-security-token";

/// Environment variable selecting the log output format (json or text)
pub const LOG_FORMAT_ENV: &str = "S3INBOX_LOG_FORMAT";
