//! Upstream request handling for the proxy.
//!
//! Everything that turns an admitted caller request into a request the
//! backend will accept: endpoint parsing, peer construction, header hygiene
//! and re-signing with the proxy's own credentials.
//!
//! # Design
//!
//! The functions here work on a plain `RequestHeader` rather than a Pingora
//! `Session`, so the whole rewrite can be exercised without a live server.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use http::Method;
use pingora_core::tls::x509::X509;
use pingora_core::upstreams::peer::HttpPeer;
use pingora_http::RequestHeader;

use crate::constants::{EDGE_HEADERS, UNSIGNED_PAYLOAD};
use crate::error::ProxyError;
use crate::router::UpstreamTarget;
use crate::s3::signing::{amz_timestamps, authorization_for, BackendCredentials};

/// Trusted CA certificates for a TLS backend
pub type CaBundle = Arc<Box<[X509]>>;

// ============================================================================
// Endpoint
// ============================================================================

/// The backend location parsed from `backend.url`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendEndpoint {
    /// Hostname or IP.
    pub host: String,
    /// Port number.
    pub port: u16,
    /// Whether to use TLS.
    pub use_tls: bool,
}

impl BackendEndpoint {
    /// Parse a backend URL into host, port, and TLS flag.
    ///
    /// Any path after the authority is ignored. A missing port falls back to
    /// the scheme default.
    pub fn parse(url: &str) -> Result<Self, ProxyError> {
        let (use_tls, rest) = if let Some(rest) = url.strip_prefix("https://") {
            (true, rest)
        } else if let Some(rest) = url.strip_prefix("http://") {
            (false, rest)
        } else {
            return Err(ProxyError::Config(format!(
                "backend url '{}' must start with http:// or https://",
                url
            )));
        };

        // Extract just the host:port part (strip any path after the first /)
        let host_port_part = rest.split('/').next().unwrap_or(rest);
        let default_port = if use_tls { 443 } else { 80 };

        let (host, port) = match host_port_part.rsplit_once(':') {
            Some((h, p)) => {
                let port = p.parse::<u16>().map_err(|_| {
                    ProxyError::Config(format!("backend url '{}' has an invalid port", url))
                })?;
                (h, port)
            }
            None => (host_port_part, default_port),
        };

        if host.is_empty() {
            return Err(ProxyError::Config(format!(
                "backend url '{}' has no host",
                url
            )));
        }

        Ok(Self {
            host: host.to_string(),
            port,
            use_tls,
        })
    }

    fn is_default_port(&self) -> bool {
        (self.use_tls && self.port == 443) || (!self.use_tls && self.port == 80)
    }

    /// Value for the `Host` header: host, plus the port when it is not the
    /// scheme default. This is also the host the signature covers.
    pub fn authority(&self) -> String {
        if self.is_default_port() {
            self.host.clone()
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }

    /// `scheme://authority`, without a trailing slash
    pub fn base_url(&self) -> String {
        let scheme = if self.use_tls { "https" } else { "http" };
        format!("{}://{}", scheme, self.authority())
    }
}

// ============================================================================
// Upstream Peer Building
// ============================================================================

/// Upstream peer configuration ready to create HttpPeer.
#[derive(Debug, Clone)]
pub struct UpstreamPeerConfig {
    pub endpoint: BackendEndpoint,
    pub connection_timeout: Duration,
    pub read_timeout: Duration,
    pub write_timeout: Duration,
}

impl UpstreamPeerConfig {
    /// Build an HttpPeer from this configuration.
    pub fn build_peer(self, ca: Option<&CaBundle>) -> Box<HttpPeer> {
        let mut peer = Box::new(HttpPeer::new(
            (self.endpoint.host.clone(), self.endpoint.port),
            self.endpoint.use_tls,
            self.endpoint.host,
        ));

        peer.options.connection_timeout = Some(self.connection_timeout);
        peer.options.read_timeout = Some(self.read_timeout);
        peer.options.write_timeout = Some(self.write_timeout);
        if let Some(ca) = ca {
            peer.options.ca = Some(ca.clone());
        }

        peer
    }
}

/// Build upstream peer configuration with one timeout for every phase.
pub fn build_upstream_peer_config(endpoint: &BackendEndpoint, timeout_secs: u64) -> UpstreamPeerConfig {
    let timeout = Duration::from_secs(timeout_secs);

    UpstreamPeerConfig {
        endpoint: endpoint.clone(),
        connection_timeout: timeout,
        read_timeout: timeout,
        write_timeout: timeout,
    }
}

/// Load a PEM bundle of CA certificates for backend TLS
pub fn load_ca_bundle(path: &str) -> Result<CaBundle, ProxyError> {
    let pem = std::fs::read(path)
        .map_err(|e| ProxyError::Config(format!("Failed to read CA bundle '{}': {}", path, e)))?;
    let certs = X509::stack_from_pem(&pem)
        .map_err(|e| ProxyError::Config(format!("Invalid CA bundle '{}': {}", path, e)))?;
    if certs.is_empty() {
        return Err(ProxyError::Config(format!(
            "CA bundle '{}' contains no certificates",
            path
        )));
    }
    Ok(Arc::new(certs.into_boxed_slice()))
}

// ============================================================================
// Request Rewriting
// ============================================================================

/// Remove headers added by the edge, plus the caller's own signature
pub fn strip_edge_headers(request: &mut RequestHeader) {
    for name in EDGE_HEADERS {
        request.remove_header(*name);
    }
    request.remove_header(&http::header::AUTHORIZATION);
}

/// The Content-Length to forward.
///
/// Uploads must declare their length; bodyless requests may omit it.
pub fn forwarded_content_length(request: &RequestHeader) -> Result<Option<u64>, ProxyError> {
    let declared = request.headers.get(http::header::CONTENT_LENGTH);

    match declared {
        Some(value) => {
            let length = value
                .to_str()
                .ok()
                .and_then(|v| v.trim().parse::<u64>().ok())
                .ok_or_else(|| {
                    ProxyError::BackendForward(format!("unparseable Content-Length {:?}", value))
                })?;
            Ok(Some(length))
        }
        None if request.method == Method::PUT || request.method == Method::POST => Err(
            ProxyError::BackendForward(format!("{} without Content-Length", request.method)),
        ),
        None => Ok(None),
    }
}

fn set_header(request: &mut RequestHeader, name: &'static str, value: String) -> Result<(), ProxyError> {
    request
        .insert_header(name, value)
        .map_err(|e| ProxyError::BackendForward(format!("Failed to set {} header: {}", name, e)))
}

/// Rewrite a caller request in place so the backend accepts it.
///
/// Points the request at `target`, replaces edge and caller authentication
/// headers with the backend `Host`, the payload hash, `x-amz-date` and a
/// fresh SigV4 `Authorization` computed with `credentials`.
pub fn resign_upstream_request(
    request: &mut RequestHeader,
    target: &UpstreamTarget,
    endpoint: &BackendEndpoint,
    credentials: &BackendCredentials,
    now: DateTime<Utc>,
) -> Result<(), ProxyError> {
    let content_length = forwarded_content_length(request)?;

    strip_edge_headers(request);

    let uri = target
        .path_and_query()
        .parse::<http::Uri>()
        .map_err(|e| ProxyError::BackendForward(format!("Invalid upstream URI: {}", e)))?;
    request.set_uri(uri);

    set_header(request, "host", endpoint.authority())?;
    if let Some(length) = content_length {
        set_header(request, "content-length", length.to_string())?;
    }

    let payload_hash = request
        .headers
        .get("x-amz-content-sha256")
        .and_then(|v| v.to_str().ok())
        .map(|v| v.to_string())
        .unwrap_or_else(|| UNSIGNED_PAYLOAD.to_string());
    set_header(request, "x-amz-content-sha256", payload_hash.clone())?;

    let (datetime, date) = amz_timestamps(now);
    set_header(request, "x-amz-date", datetime.clone())?;

    let mut headers: BTreeMap<String, String> = BTreeMap::new();
    for (name, value) in request.headers.iter() {
        let Ok(value) = value.to_str() else {
            continue;
        };
        headers
            .entry(name.as_str().to_ascii_lowercase())
            .and_modify(|existing| {
                existing.push(',');
                existing.push_str(value);
            })
            .or_insert_with(|| value.to_string());
    }

    let authorization = authorization_for(
        credentials,
        request.method.as_str(),
        &target.path,
        target.query.as_deref().unwrap_or(""),
        &headers,
        &payload_hash,
        &date,
        &datetime,
    );
    set_header(request, "authorization", authorization)?;

    Ok(())
}

// ============================================================================
// Tests
// ============================================================================
