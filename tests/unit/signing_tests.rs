// SigV4 signing unit tests

use s3inbox::s3::signing::*;
use std::collections::BTreeMap;

const EMPTY_SHA256: &str = "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855";

#[test]
fn test_canonical_request_for_scoped_listing() {
    let mut headers = BTreeMap::new();
    headers.insert("host".to_string(), "localhost:9000".to_string());
    headers.insert("x-amz-content-sha256".to_string(), "UNSIGNED-PAYLOAD".to_string());
    headers.insert("x-amz-date".to_string(), "20240307T090501Z".to_string());

    let params = SigningParams {
        method: "GET",
        uri: "/inbox/",
        query_string: "list-type=2&delimiter=/&prefix=alice%2Fsub/",
        headers: &headers,
        payload_hash: "UNSIGNED-PAYLOAD",
        access_key: "minioadmin",
        secret_key: "minioadmin",
        region: "us-east-1",
        service: "s3",
        date: "20240307",
        datetime: "20240307T090501Z",
    };

    assert_eq!(
        create_canonical_request(&params),
        "GET\n/inbox/\ndelimiter=%2F&list-type=2&prefix=alice%2Fsub%2F\nhost:localhost:9000\nx-amz-content-sha256:UNSIGNED-PAYLOAD\nx-amz-date:20240307T090501Z\n\nhost;x-amz-content-sha256;x-amz-date\nUNSIGNED-PAYLOAD"
    );
}

#[test]
fn test_signing_key_depends_on_region() {
    let a = derive_signing_key("secret", "20240307", "us-east-1", "s3");
    let b = derive_signing_key("secret", "20240307", "eu-north-1", "s3");

    assert_eq!(a.len(), 32);
    assert_ne!(a, b);
}

#[test]
fn test_sha256_of_empty_payload() {
    assert_eq!(sha256_hex(b""), EMPTY_SHA256);
}

#[test]
fn test_signed_header_selection() {
    assert!(is_signed_header("Host"));
    assert!(is_signed_header("x-amz-meta-sample"));
    assert!(is_signed_header("Content-MD5"));
    assert!(is_signed_header("content-type"));
    assert!(!is_signed_header("content-length"));
    assert!(!is_signed_header("user-agent"));
    assert!(!is_signed_header("expect"));
}
