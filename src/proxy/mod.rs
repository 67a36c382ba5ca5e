// Proxy module - Pingora ProxyHttp implementation
// Implements the upload inbox on top of an S3-compatible backend

use async_trait::async_trait;
use bytes::Bytes;
use chrono::Utc;
use pingora_core::upstreams::peer::HttpPeer;
use pingora_core::Result;
use pingora_http::{RequestHeader, ResponseHeader};
use pingora_proxy::{FailToProxy, ProxyHttp, Session};
use std::sync::Arc;

use crate::auth::Authenticator;
use crate::backend::ObjectMetadataSource;
use crate::config::BackendConfig;
use crate::constants::COPY_SOURCE_HEADER;
use crate::error::ProxyError;
use crate::messenger::{EventPublisher, UploadEvent};
use crate::pipeline::RequestContext;
use crate::policy::is_allowed;
use crate::router::{extract_username, rewrite};
use crate::s3::classify;
use crate::s3::signing::BackendCredentials;

pub mod completion;
pub mod upstream;

use completion::{is_upload_complete, UploadNotifier};
use upstream::{
    build_upstream_peer_config, forwarded_content_length, load_ca_bundle,
    resign_upstream_request, BackendEndpoint, CaBundle,
};

/// Status for a request Pingora gave up on.
///
/// Backend failures of any kind (connect, timeout, reset) are 500. A client
/// that went away gets nothing.
pub fn failure_status(e: &pingora_core::Error) -> u16 {
    use pingora_core::{ErrorSource, ErrorType};

    match e.etype() {
        ErrorType::HTTPStatus(code) => *code,
        etype => match e.esource() {
            ErrorSource::Downstream => match etype {
                ErrorType::WriteError | ErrorType::ReadError | ErrorType::ConnectionClosed => 0,
                _ => 400,
            },
            ErrorSource::Upstream | ErrorSource::Internal | ErrorSource::Unset => 500,
        },
    }
}

/// InboxProxy implements the Pingora ProxyHttp trait
/// Handles classification, policy, authentication, re-signing and
/// completion events
pub struct InboxProxy {
    backend: Arc<BackendConfig>,
    endpoint: BackendEndpoint,
    credentials: BackendCredentials,
    ca: Option<CaBundle>,
    authenticator: Arc<dyn Authenticator>,
    notifier: UploadNotifier,
}

impl InboxProxy {
    pub fn new(
        backend: Arc<BackendConfig>,
        authenticator: Arc<dyn Authenticator>,
        metadata: Arc<dyn ObjectMetadataSource>,
        publisher: Arc<dyn EventPublisher>,
    ) -> std::result::Result<Self, ProxyError> {
        let endpoint = BackendEndpoint::parse(&backend.url)?;
        let ca = backend.ca_cert.as_deref().map(load_ca_bundle).transpose()?;

        Ok(Self {
            credentials: BackendCredentials::from_backend_config(&backend),
            endpoint,
            ca,
            backend,
            authenticator,
            notifier: UploadNotifier::new(metadata, publisher),
        })
    }

    /// Decide whether a request reaches the backend.
    ///
    /// Classifies the request, applies the policy, authenticates the caller
    /// and computes the backend target. On success the context carries the
    /// operation, username and target; on error nothing was sent anywhere.
    pub async fn admit(
        &self,
        request: &RequestHeader,
        ctx: &mut RequestContext,
    ) -> std::result::Result<(), ProxyError> {
        ctx.set_request(
            request.method.to_string(),
            request.uri.path().to_string(),
            request.uri.query().map(str::to_string),
        );

        let operation = classify(&request.method, ctx.path(), ctx.query());
        ctx.set_operation(operation);

        if !is_allowed(operation) {
            return Err(ProxyError::PolicyDenied(operation.to_string()));
        }
        if request.headers.contains_key(COPY_SOURCE_HEADER) {
            return Err(ProxyError::PolicyDenied("server-side copy".to_string()));
        }

        let username = extract_username(ctx.path())?;
        ctx.set_username(username.clone());

        self.authenticator.authenticate(request).await?;

        forwarded_content_length(request)?;

        let target = rewrite(
            &request.method,
            ctx.path(),
            ctx.query(),
            &self.backend.bucket,
            &username,
        )?;

        tracing::debug!(
            request_id = %ctx.request_id(),
            user = %username,
            operation = %operation,
            upstream = %target.path_and_query(),
            "Request admitted"
        );

        ctx.set_target(target);
        Ok(())
    }

    /// Point an admitted request at the backend and sign it
    pub fn prepare_upstream(
        &self,
        upstream_request: &mut RequestHeader,
        ctx: &RequestContext,
    ) -> std::result::Result<(), ProxyError> {
        let target = ctx.target().ok_or_else(|| {
            ProxyError::BackendForward("request reached upstream without a target".to_string())
        })?;

        resign_upstream_request(
            upstream_request,
            target,
            &self.endpoint,
            &self.credentials,
            Utc::now(),
        )
    }

    /// React to the backend's status for an admitted request.
    ///
    /// Publishes a completion event when the request finished an upload.
    /// Failures are logged and never change what the caller receives.
    pub async fn on_backend_response(&self, status: u16, ctx: &mut RequestContext) -> Option<UploadEvent> {
        ctx.set_backend_status(status);

        let method = http::Method::from_bytes(ctx.method().as_bytes()).ok()?;
        if !is_upload_complete(&method, ctx.query(), status) {
            return None;
        }

        match self.notifier.notify(ctx.path()).await {
            Ok(event) => {
                tracing::info!(
                    request_id = %ctx.request_id(),
                    user = %event.username,
                    filepath = %event.filepath,
                    filesize = event.filesize,
                    checksum = %event.checksum.value,
                    "Upload completed"
                );
                Some(event)
            }
            Err(e @ ProxyError::Publish(_)) => {
                tracing::warn!(
                    request_id = %ctx.request_id(),
                    path = %ctx.path(),
                    error = %e,
                    "Upload event was not delivered"
                );
                None
            }
            Err(e) => {
                tracing::error!(
                    request_id = %ctx.request_id(),
                    path = %ctx.path(),
                    error = %e,
                    "Skipping upload event"
                );
                None
            }
        }
    }

    async fn respond_error(
        &self,
        session: &mut Session,
        error: &ProxyError,
        ctx: &RequestContext,
    ) -> Result<bool> {
        let error_body = error.to_s3_xml(ctx.path(), ctx.request_id());

        let mut header = ResponseHeader::build(error.status_code(), None)?;
        header.insert_header("Content-Type", "application/xml")?;
        header.insert_header("Content-Length", error_body.len().to_string())?;
        header.insert_header("x-amz-request-id", ctx.request_id())?;

        session
            .write_response_header(Box::new(header), false)
            .await?;
        session
            .write_response_body(Some(Bytes::from(error_body)), true)
            .await?;

        Ok(true)
    }
}

#[async_trait]
impl ProxyHttp for InboxProxy {
    type CTX = RequestContext;

    /// Create a new request context for each incoming request
    fn new_ctx(&self) -> Self::CTX {
        RequestContext::new("GET".to_string(), "/".to_string())
    }

    /// Every admitted request goes to the single configured backend
    async fn upstream_peer(
        &self,
        _session: &mut Session,
        ctx: &mut Self::CTX,
    ) -> Result<Box<HttpPeer>> {
        let peer = build_upstream_peer_config(&self.endpoint, self.backend.timeout)
            .build_peer(self.ca.as_ref());

        tracing::debug!(
            request_id = %ctx.request_id(),
            endpoint = %self.endpoint.authority(),
            timeout_seconds = self.backend.timeout,
            "Configured backend peer"
        );

        Ok(peer)
    }

    /// Admission: classification, policy and authentication
    async fn request_filter(&self, session: &mut Session, ctx: &mut Self::CTX) -> Result<bool> {
        let admitted = self.admit(session.req_header(), ctx).await;

        match admitted {
            Ok(()) => Ok(false), // Continue to upstream
            Err(e) => {
                tracing::warn!(
                    request_id = %ctx.request_id(),
                    method = %ctx.method(),
                    path = %ctx.path(),
                    operation = ctx.operation().map(|op| op.as_str()).unwrap_or("unknown"),
                    status_code = e.status_code(),
                    error = %e,
                    "Request rejected"
                );
                self.respond_error(session, &e, ctx).await
            }
        }
    }

    /// Rewrite the path and replace caller credentials with a backend signature
    async fn upstream_request_filter(
        &self,
        _session: &mut Session,
        upstream_request: &mut RequestHeader,
        ctx: &mut Self::CTX,
    ) -> Result<()> {
        self.prepare_upstream(upstream_request, ctx).map_err(|e| {
            tracing::error!(request_id = %ctx.request_id(), error = %e, "Failed to prepare backend request");
            pingora_core::Error::explain(pingora_core::ErrorType::InternalError, e.to_string())
        })
    }

    /// Runs once the backend has answered, before the response goes back
    async fn response_filter(
        &self,
        _session: &mut Session,
        upstream_response: &mut ResponseHeader,
        ctx: &mut Self::CTX,
    ) -> Result<()> {
        let status = upstream_response.status.as_u16();
        self.on_backend_response(status, ctx).await;
        Ok(())
    }

    /// Backend connection failures are never retried
    fn fail_to_connect(
        &self,
        _session: &mut Session,
        peer: &HttpPeer,
        ctx: &mut Self::CTX,
        mut e: Box<pingora_core::Error>,
    ) -> Box<pingora_core::Error> {
        tracing::error!(
            request_id = %ctx.request_id(),
            peer = %peer,
            error = %e,
            "Failed to connect to backend"
        );
        e.set_retry(false);
        e
    }

    /// Answer fatal errors with an S3 XML body; backend failures are 500
    async fn fail_to_proxy(
        &self,
        session: &mut Session,
        e: &pingora_core::Error,
        ctx: &mut Self::CTX,
    ) -> FailToProxy
    where
        Self::CTX: Send + Sync,
    {
        let code = failure_status(e);

        if code > 0 && session.response_written().is_none() {
            let written = if code == 500 {
                let error = ProxyError::BackendForward("backend request failed".to_string());
                self.respond_error(session, &error, ctx).await.map(|_| ())
            } else {
                session.respond_error(code).await
            };
            if let Err(write_err) = written {
                tracing::error!(
                    request_id = %ctx.request_id(),
                    error = %write_err,
                    "Failed to send error response"
                );
            }
        }

        FailToProxy {
            error_code: code,
            can_reuse_downstream: false,
        }
    }

    /// Log request completion
    async fn logging(
        &self,
        session: &mut Session,
        e: Option<&pingora_core::Error>,
        ctx: &mut Self::CTX,
    ) {
        let status_code = session
            .response_written()
            .map(|resp| resp.status.as_u16())
            .unwrap_or(500);

        if let Some(error) = e {
            tracing::warn!(
                request_id = %ctx.request_id(),
                method = %ctx.method(),
                path = %ctx.path(),
                error = %error,
                "Request ended with proxy error"
            );
        }

        tracing::info!(
            request_id = %ctx.request_id(),
            method = %ctx.method(),
            path = %ctx.path(),
            user = ctx.username().unwrap_or("-"),
            operation = ctx.operation().map(|op| op.as_str()).unwrap_or("-"),
            status_code = status_code,
            duration_ms = ctx.elapsed_ms() as u64,
            "Request completed"
        );
    }
}
