// Namespace rewriting unit tests

use http::Method;
use s3inbox::error::ProxyError;
use s3inbox::router::{extract_username, rewrite, scope_listing_query, UpstreamTarget};
use s3inbox::s3::signing::canonical_query_string;

const BUCKET: &str = "inbox";

fn target(path: &str, query: Option<&str>) -> UpstreamTarget {
    UpstreamTarget {
        path: path.to_string(),
        query: query.map(str::to_string),
    }
}

#[test]
fn test_put_is_prefixed_with_bucket() {
    let rewritten = rewrite(&Method::PUT, "/alice/file.txt", None, BUCKET, "alice").unwrap();

    assert_eq!(rewritten, target("/inbox/alice/file.txt", None));
}

#[test]
fn test_part_upload_keeps_query() {
    let rewritten = rewrite(
        &Method::PUT,
        "/alice/data.bam",
        Some("partNumber=2&uploadId=abc"),
        BUCKET,
        "alice",
    )
    .unwrap();

    assert_eq!(
        rewritten,
        target("/inbox/alice/data.bam", Some("partNumber=2&uploadId=abc"))
    );
}

#[test]
fn test_multipart_completion_post() {
    let rewritten = rewrite(
        &Method::POST,
        "/alice/data.bam",
        Some("uploadId=abc"),
        BUCKET,
        "alice",
    )
    .unwrap();

    assert_eq!(rewritten.path_and_query(), "/inbox/alice/data.bam?uploadId=abc");
}

#[test]
fn test_listing_with_delimiter_and_prefix() {
    let rewritten = rewrite(
        &Method::GET,
        "/alice",
        Some("delimiter=/&prefix=sub/"),
        BUCKET,
        "alice",
    )
    .unwrap();

    assert_eq!(rewritten.path, "/inbox/");
    assert_eq!(
        rewritten.query.as_deref(),
        Some("delimiter=/&prefix=alice%2Fsub/")
    );
}

#[test]
fn test_listing_with_delimiter_without_prefix() {
    let rewritten = rewrite(&Method::GET, "/alice", Some("delimiter=/"), BUCKET, "alice").unwrap();

    assert_eq!(rewritten.path, "/inbox/");
    assert_eq!(rewritten.query.as_deref(), Some("delimiter=/&prefix=alice%2F"));
}

#[test]
fn test_user_root_listing_is_scoped() {
    let rewritten = rewrite(&Method::GET, "/alice/", Some("list-type=2"), BUCKET, "alice").unwrap();

    assert_eq!(rewritten, target("/inbox/", Some("list-type=2&prefix=alice%2F")));
}

#[test]
fn test_scope_listing_without_query() {
    assert_eq!(scope_listing_query(None, "alice"), "prefix=alice%2F");
    assert_eq!(scope_listing_query(Some(""), "alice"), "prefix=alice%2F");
}

#[test]
fn test_location_query_goes_to_bucket_root() {
    let rewritten = rewrite(&Method::GET, "/alice/x", Some("location"), BUCKET, "alice").unwrap();

    assert_eq!(rewritten, target("/inbox/", Some("location")));
}

#[test]
fn test_abort_reaches_the_named_upload() {
    let rewritten = rewrite(
        &Method::DELETE,
        "/alice/data.bam",
        Some("uploadId=abc"),
        BUCKET,
        "alice",
    )
    .unwrap();

    assert_eq!(rewritten, target("/inbox/alice/data.bam", Some("uploadId=abc")));
}

#[test]
fn test_upload_without_key_is_rejected() {
    let result = rewrite(&Method::POST, "/alice/", Some("uploads"), BUCKET, "alice");

    assert!(matches!(result, Err(ProxyError::MissingObjectKey(_))));
    assert_eq!(result.unwrap_err().status_code(), 403);
}

#[test]
fn test_other_requests_pass_through() {
    let rewritten = rewrite(&Method::HEAD, "/alice/data.bam", None, BUCKET, "alice").unwrap();

    assert_eq!(rewritten, target("/alice/data.bam", None));
}

#[test]
fn test_username_is_first_segment() {
    assert_eq!(extract_username("/alice/a/b/c").unwrap(), "alice");
    assert!(matches!(
        extract_username("///"),
        Err(ProxyError::MissingIdentity(_))
    ));
}

#[test]
fn test_encoded_prefix_name_cannot_list_another_namespace() {
    let rewritten = rewrite(
        &Method::GET,
        "/alice",
        Some("pre%66ix=bob%2F&delimiter=%2F"),
        BUCKET,
        "alice",
    )
    .unwrap();

    assert_eq!(rewritten.path, "/inbox/");
    assert_eq!(
        rewritten.query.as_deref(),
        Some("prefix=alice%2Fbob%2F&delimiter=%2F")
    );

    // What the backend verifies carries exactly one prefix, inside alice/
    let canonical = canonical_query_string(rewritten.query.as_deref().unwrap());
    assert_eq!(canonical, "delimiter=%2F&prefix=alice%2Fbob%2F");
}

#[test]
fn test_location_on_user_root_goes_to_bucket_root_unscoped() {
    let rewritten = rewrite(&Method::GET, "/alice", Some("location"), BUCKET, "alice").unwrap();

    assert_eq!(rewritten, target("/inbox/", Some("location")));
}

#[test]
fn test_user_root_sub_resources_are_not_sent_to_shared_bucket() {
    for query in ["policy", "lifecycle", "cors", "versioning", "notification"] {
        let rewritten = rewrite(&Method::GET, "/alice", Some(query), BUCKET, "alice").unwrap();
        assert_eq!(rewritten, target("/alice", Some(query)), "query {}", query);
    }

    let rewritten = rewrite(
        &Method::GET,
        "/alice",
        Some("delimiter=/&lifecycle"),
        BUCKET,
        "alice",
    )
    .unwrap();
    assert_eq!(rewritten, target("/alice", Some("delimiter=/&lifecycle")));
}

#[test]
fn test_bare_user_root_get_is_scoped_listing() {
    let rewritten = rewrite(&Method::GET, "/alice", None, BUCKET, "alice").unwrap();

    assert_eq!(rewritten, target("/inbox/", Some("prefix=alice%2F")));
}
