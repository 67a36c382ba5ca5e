// Upload event unit tests

use s3inbox::messenger::UploadEvent;

#[test]
fn test_event_round_trips_through_wire_json() {
    let wire = r#"{
        "operation": "upload",
        "user": "alice",
        "filepath": "/alice/data.bam",
        "filesize": 1234,
        "encoded_checksum": {"type": "md5", "value": "5d41402a"}
    }"#;

    let event: UploadEvent = serde_json::from_str(wire).expect("wire JSON should parse");

    assert_eq!(
        event,
        UploadEvent::upload("alice", "/alice/data.bam", 1234, "5d41402a")
    );
}

#[test]
fn test_event_field_names() {
    let event = UploadEvent::upload("bob", "/bob/x", 0, "d41d8cd9");
    let json = serde_json::to_string(&event).unwrap();

    assert!(json.contains("\"user\":\"bob\""));
    assert!(json.contains("\"encoded_checksum\""));
    assert!(json.contains("\"type\":\"md5\""));
    assert!(json.contains("\"filesize\":0"));
}
