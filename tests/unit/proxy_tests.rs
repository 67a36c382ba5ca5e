// End-to-end request pipeline tests
//
// Drive InboxProxy through admission, upstream preparation and the backend
// response hook with in-memory stand-ins for the backend listing and broker.

use async_trait::async_trait;
use pingora_http::RequestHeader;
use s3inbox::auth::{AllowAll, Authenticator};
use s3inbox::backend::{ObjectMetadata, ObjectMetadataSource};
use s3inbox::config::BackendConfig;
use s3inbox::error::ProxyError;
use s3inbox::messenger::{EventPublisher, UploadEvent};
use s3inbox::pipeline::RequestContext;
use s3inbox::proxy::InboxProxy;
use s3inbox::s3::S3Operation;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// Backend listing with fixed contents
struct FakeListing {
    objects: HashMap<String, ObjectMetadata>,
    lookups: AtomicUsize,
}

impl FakeListing {
    fn with(key: &str, size: u64, etag: &str) -> Self {
        let mut objects = HashMap::new();
        objects.insert(
            key.to_string(),
            ObjectMetadata {
                size,
                etag: etag.to_string(),
            },
        );
        Self {
            objects,
            lookups: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl ObjectMetadataSource for FakeListing {
    async fn object_metadata(&self, key: &str) -> Result<ObjectMetadata, ProxyError> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        self.objects
            .get(key)
            .cloned()
            .ok_or_else(|| ProxyError::MetadataLookup(format!("{} not found", key)))
    }
}

/// Broker that records events and answers with a fixed confirmation
struct RecordingBroker {
    ack: bool,
    events: Mutex<Vec<UploadEvent>>,
}

impl RecordingBroker {
    fn acking() -> Self {
        Self {
            ack: true,
            events: Mutex::new(Vec::new()),
        }
    }

    fn nacking() -> Self {
        Self {
            ack: false,
            events: Mutex::new(Vec::new()),
        }
    }

    fn events(&self) -> Vec<UploadEvent> {
        self.events.lock().unwrap().clone()
    }
}

#[async_trait]
impl EventPublisher for RecordingBroker {
    async fn publish(&self, event: &UploadEvent) -> Result<(), ProxyError> {
        self.events.lock().unwrap().push(event.clone());
        if self.ack {
            Ok(())
        } else {
            Err(ProxyError::Publish("nack".to_string()))
        }
    }
}

/// Authenticator that remembers whether it was asked
#[derive(Default)]
struct CountingAuth {
    calls: AtomicUsize,
}

#[async_trait]
impl Authenticator for CountingAuth {
    async fn authenticate(&self, _request: &RequestHeader) -> Result<(), ProxyError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

fn backend() -> Arc<BackendConfig> {
    Arc::new(BackendConfig {
        url: "http://localhost:9000".to_string(),
        access_key: "minioadmin".to_string(),
        secret_key: "minioadmin".to_string(),
        bucket: "inbox".to_string(),
        region: "us-east-1".to_string(),
        ca_cert: None,
        timeout: 5,
    })
}

fn proxy(
    auth: Arc<dyn Authenticator>,
    listing: Arc<FakeListing>,
    broker: Arc<RecordingBroker>,
) -> InboxProxy {
    InboxProxy::new(backend(), auth, listing, broker).expect("proxy should build")
}

fn header(request: &RequestHeader, name: &str) -> Option<String> {
    request
        .headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

#[tokio::test]
async fn test_authenticated_put_publishes_backend_metadata() {
    let listing = Arc::new(FakeListing::with("alice/data.bam", 1234, "5d41402abc4b2a76"));
    let broker = Arc::new(RecordingBroker::acking());
    let proxy = proxy(Arc::new(AllowAll), listing.clone(), broker.clone());

    // Client headers disagree with what the backend stored
    let mut request = RequestHeader::build("PUT", b"/alice/data.bam", None).unwrap();
    request.insert_header("content-length", "5").unwrap();
    request
        .insert_header("x-amz-content-sha256", "UNSIGNED-PAYLOAD")
        .unwrap();
    request.insert_header("x-amz-security-token", "jwt").unwrap();
    let mut ctx = RequestContext::new("GET".to_string(), "/".to_string());

    proxy.admit(&request, &mut ctx).await.expect("PUT should be admitted");
    assert_eq!(ctx.operation(), Some(S3Operation::Put));
    assert_eq!(ctx.username(), Some("alice"));

    let mut upstream = request.clone();
    proxy.prepare_upstream(&mut upstream, &ctx).unwrap();
    assert_eq!(upstream.uri.path(), "/inbox/alice/data.bam");
    assert_eq!(header(&upstream, "host").as_deref(), Some("localhost:9000"));
    assert!(header(&upstream, "x-amz-security-token").is_none());
    assert!(header(&upstream, "authorization")
        .unwrap()
        .starts_with("AWS4-HMAC-SHA256 Credential=minioadmin/"));

    let event = proxy.on_backend_response(200, &mut ctx).await;

    let expected = UploadEvent::upload("alice", "/alice/data.bam", 1234, "5d41402abc4b2a76");
    assert_eq!(event, Some(expected.clone()));
    assert_eq!(broker.events(), vec![expected]);
    assert_eq!(ctx.backend_status(), Some(200));
}

#[tokio::test]
async fn test_user_root_listing_is_forwarded_without_event() {
    let listing = Arc::new(FakeListing::with("alice/data.bam", 1, "e"));
    let broker = Arc::new(RecordingBroker::acking());
    let proxy = proxy(Arc::new(AllowAll), listing.clone(), broker.clone());

    let request = RequestHeader::build("GET", b"/alice/?list-type=2", None).unwrap();
    let mut ctx = RequestContext::new("GET".to_string(), "/".to_string());

    proxy.admit(&request, &mut ctx).await.expect("listing should be admitted");
    assert_eq!(ctx.operation(), Some(S3Operation::List));

    let mut upstream = request.clone();
    proxy.prepare_upstream(&mut upstream, &ctx).unwrap();
    assert_eq!(upstream.uri.path(), "/inbox/");
    assert_eq!(upstream.uri.query(), Some("list-type=2&prefix=alice%2F"));

    for status in [200, 404, 500] {
        assert!(proxy.on_backend_response(status, &mut ctx).await.is_none());
    }
    assert!(broker.events().is_empty());
    assert_eq!(listing.lookups.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_delete_is_denied_before_anything_else() {
    let auth = Arc::new(CountingAuth::default());
    let listing = Arc::new(FakeListing::with("alice/data.bam", 1, "e"));
    let broker = Arc::new(RecordingBroker::acking());
    let proxy = proxy(auth.clone(), listing, broker.clone());

    let request = RequestHeader::build("DELETE", b"/alice/data.bam", None).unwrap();
    let mut ctx = RequestContext::new("GET".to_string(), "/".to_string());

    let err = proxy.admit(&request, &mut ctx).await.unwrap_err();

    assert!(matches!(err, ProxyError::PolicyDenied(_)));
    assert_eq!(err.status_code(), 403);
    assert_eq!(ctx.operation(), Some(S3Operation::Delete));
    assert!(ctx.target().is_none());
    assert_eq!(auth.calls.load(Ordering::SeqCst), 0);
    assert!(broker.events().is_empty());
}

#[tokio::test]
async fn test_nacked_event_does_not_change_outcome() {
    let listing = Arc::new(FakeListing::with("alice/data.bam", 10, "abc"));
    let broker = Arc::new(RecordingBroker::nacking());
    let proxy = proxy(Arc::new(AllowAll), listing, broker.clone());

    let mut request = RequestHeader::build("PUT", b"/alice/data.bam", None).unwrap();
    request.insert_header("content-length", "10").unwrap();
    let mut ctx = RequestContext::new("GET".to_string(), "/".to_string());

    proxy.admit(&request, &mut ctx).await.unwrap();
    let event = proxy.on_backend_response(200, &mut ctx).await;

    // The publish was attempted once and its failure only logged
    assert!(event.is_none());
    assert_eq!(broker.events().len(), 1);
    assert_eq!(ctx.backend_status(), Some(200));
}

#[tokio::test]
async fn test_part_upload_does_not_publish() {
    let listing = Arc::new(FakeListing::with("alice/data.bam", 10, "abc"));
    let broker = Arc::new(RecordingBroker::acking());
    let proxy = proxy(Arc::new(AllowAll), listing.clone(), broker.clone());

    let mut request =
        RequestHeader::build("PUT", b"/alice/data.bam?partNumber=1&uploadId=u1", None).unwrap();
    request.insert_header("content-length", "10").unwrap();
    let mut ctx = RequestContext::new("GET".to_string(), "/".to_string());

    proxy.admit(&request, &mut ctx).await.unwrap();
    assert!(proxy.on_backend_response(200, &mut ctx).await.is_none());
    assert_eq!(listing.lookups.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_multipart_completion_publishes() {
    let listing = Arc::new(FakeListing::with("alice/big.bam", 10_485_760, "9b2cf535f27731c9-2"));
    let broker = Arc::new(RecordingBroker::acking());
    let proxy = proxy(Arc::new(AllowAll), listing, broker.clone());

    let mut request =
        RequestHeader::build("POST", b"/alice/big.bam?uploadId=u1", None).unwrap();
    request.insert_header("content-length", "212").unwrap();
    let mut ctx = RequestContext::new("GET".to_string(), "/".to_string());

    proxy.admit(&request, &mut ctx).await.unwrap();
    let event = proxy.on_backend_response(200, &mut ctx).await.unwrap();

    assert_eq!(event.filesize, 10_485_760);
    assert_eq!(event.checksum.value, "9b2cf535f27731c9-2");
    assert_eq!(broker.events().len(), 1);
}

#[tokio::test]
async fn test_missing_listing_entry_skips_event() {
    let listing = Arc::new(FakeListing::with("alice/other.bam", 10, "abc"));
    let broker = Arc::new(RecordingBroker::acking());
    let proxy = proxy(Arc::new(AllowAll), listing, broker.clone());

    let mut request = RequestHeader::build("PUT", b"/alice/data.bam", None).unwrap();
    request.insert_header("content-length", "10").unwrap();
    let mut ctx = RequestContext::new("GET".to_string(), "/".to_string());

    proxy.admit(&request, &mut ctx).await.unwrap();

    assert!(proxy.on_backend_response(200, &mut ctx).await.is_none());
    assert!(broker.events().is_empty());
}

#[tokio::test]
async fn test_path_without_user_is_403() {
    let proxy = proxy(
        Arc::new(AllowAll),
        Arc::new(FakeListing::with("a/b", 1, "e")),
        Arc::new(RecordingBroker::acking()),
    );

    let request = RequestHeader::build("POST", b"/", None).unwrap();
    let mut ctx = RequestContext::new("GET".to_string(), "/".to_string());

    let err = proxy.admit(&request, &mut ctx).await.unwrap_err();
    assert!(matches!(err, ProxyError::MissingIdentity(_)));
    assert_eq!(err.status_code(), 403);
}
