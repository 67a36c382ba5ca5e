// Error types module

use thiserror::Error;

/// Centralized error type for the inbox proxy
///
/// Each variant corresponds to one failure category of the request pipeline
/// and maps to exactly one client-facing outcome (see [`ProxyError::status_code`]).
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ProxyError {
    /// Configuration errors (invalid YAML, missing env vars, bad key material)
    #[error("Configuration error: {0}")]
    Config(String),

    /// The classified operation is in the deny set
    #[error("Operation not permitted: {0}")]
    PolicyDenied(String),

    /// The request path carries no username segment
    #[error("Request path '{0}' does not name a user namespace")]
    MissingIdentity(String),

    /// An upload that does not name an object below the user namespace
    #[error("Upload path '{0}' does not name an object key")]
    MissingObjectKey(String),

    /// The authenticator rejected the request
    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    /// Building or sending the backend request failed
    #[error("Backend forward error: {0}")]
    BackendForward(String),

    /// Looking up authoritative object metadata failed
    #[error("Metadata lookup failed: {0}")]
    MetadataLookup(String),

    /// The broker rejected or never confirmed a completion event
    #[error("Publish failed: {0}")]
    Publish(String),
}

impl ProxyError {
    /// HTTP status code returned to the client when this error ends a request
    ///
    /// `MetadataLookup` and `Publish` happen after the backend already answered,
    /// so they never replace the backend status; 500 is reported only for logging.
    pub fn status_code(&self) -> u16 {
        match self {
            ProxyError::PolicyDenied(_)
            | ProxyError::MissingIdentity(_)
            | ProxyError::MissingObjectKey(_) => 403,
            ProxyError::AuthenticationFailed(_) => 401,
            ProxyError::Config(_)
            | ProxyError::BackendForward(_)
            | ProxyError::MetadataLookup(_)
            | ProxyError::Publish(_) => 500,
        }
    }

    /// S3 error code used in the XML error body
    pub fn s3_error_code(&self) -> &'static str {
        match self.status_code() {
            403 => "AccessDenied",
            401 => "InvalidToken",
            _ => "InternalError",
        }
    }

    /// Render an S3-style XML error document for this error
    pub fn to_s3_xml(&self, resource: &str, request_id: &str) -> String {
        format!(
            "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<Error><Code>{}</Code><Message>{}</Message><Resource>{}</Resource><RequestId>{}</RequestId></Error>",
            self.s3_error_code(),
            xml_escape(&self.to_string()),
            xml_escape(resource),
            xml_escape(request_id)
        )
    }
}

fn xml_escape(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}

impl From<serde_yaml::Error> for ProxyError {
    fn from(err: serde_yaml::Error) -> Self {
        ProxyError::Config(err.to_string())
    }
}
