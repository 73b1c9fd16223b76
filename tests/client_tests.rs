use mockito::{Matcher, Server};
use serde_json::json;
use std::fs;
use tempfile::tempdir;

use vault_to_notion::blocks::{Block, RichText};
use vault_to_notion::notion::{ApiError, NotionClient, RetryPolicy, WorkspaceApi};
use vault_to_notion::AppConfig;

fn client_for(server: &Server) -> NotionClient {
    let config = AppConfig {
        api_base_url: server.url(),
        ..AppConfig::default()
    };
    NotionClient::new("secret", &config)
        .unwrap()
        .with_retry_policy(RetryPolicy::immediate(3))
}

#[test]
fn test_create_page_sends_title_icon_and_headers() {
    let mut server = Server::new();
    let mock = server
        .mock("POST", "/pages")
        .match_header("authorization", "Bearer secret")
        .match_header("notion-version", "2022-06-28")
        .match_body(Matcher::PartialJson(json!({
            "parent": { "page_id": "parent-1" },
            "properties": { "title": { "title": [{ "text": { "content": "Projects" } }] } },
            "icon": { "type": "emoji", "emoji": "📂" }
        })))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"object":"page","id":"page-42"}"#)
        .expect(1)
        .create();

    let client = client_for(&server);
    let id = client.create_page("parent-1", "Projects", Some("📂")).unwrap();

    assert_eq!(id, "page-42");
    mock.assert();
}

#[test]
fn test_client_error_is_not_retried() {
    let mut server = Server::new();
    let mock = server
        .mock("POST", "/pages")
        .with_status(400)
        .with_body(r#"{"code":"validation_error"}"#)
        .expect(1)
        .create();

    let client = client_for(&server);
    let err = client.create_page("parent-1", "Bad", None).unwrap_err();

    assert!(matches!(err, ApiError::Status { status: 400, .. }));
    assert!(!err.is_transient());
    mock.assert();
}

#[test]
fn test_transient_error_retries_up_to_cap() {
    let mut server = Server::new();
    let mock = server
        .mock("PATCH", "/blocks/page-1/children")
        .with_status(503)
        .expect(3)
        .create();

    let client = client_for(&server);
    let blocks = vec![Block::paragraph(vec![RichText::plain("hello")])];
    let err = client.append_blocks("page-1", &blocks).unwrap_err();

    assert!(matches!(err, ApiError::Status { status: 503, .. }));
    assert!(err.is_transient());
    mock.assert();
}

#[test]
fn test_append_blocks_body() {
    let mut server = Server::new();
    let mock = server
        .mock("PATCH", "/blocks/page-1/children")
        .match_body(Matcher::PartialJson(json!({
            "children": [{ "type": "divider", "divider": {} }]
        })))
        .with_status(200)
        .with_body("{}")
        .create();

    let client = client_for(&server);
    client.append_blocks("page-1", &[Block::divider()]).unwrap();
    mock.assert();
}

#[test]
fn test_upload_starts_then_sends() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("diagram.png");
    fs::write(&path, b"not really a png").unwrap();

    let mut server = Server::new();
    let start = server
        .mock("POST", "/file_uploads")
        .match_body(Matcher::PartialJson(json!({
            "filename": "diagram.png",
            "content_type": "image/png"
        })))
        .with_status(200)
        .with_body(r#"{"id":"upload-7","status":"pending"}"#)
        .create();
    let send = server
        .mock("POST", "/file_uploads/upload-7/send")
        .match_header("content-type", Matcher::Regex("multipart/form-data".to_string()))
        .with_status(200)
        .with_body(r#"{"id":"upload-7","status":"uploaded"}"#)
        .create();

    let client = client_for(&server);
    let id = client.upload_file(&path).unwrap();

    assert_eq!(id, "upload-7");
    start.assert();
    send.assert();
}

#[test]
fn test_oversized_upload_is_rejected_locally() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("big.bin");
    fs::write(&path, vec![0u8; 64]).unwrap();

    let server = Server::new();
    let config = AppConfig {
        api_base_url: server.url(),
        max_upload_bytes: 16,
        ..AppConfig::default()
    };
    let client = NotionClient::new("secret", &config).unwrap();

    let err = client.upload_file(&path).unwrap_err();
    assert!(matches!(err, ApiError::TooLarge { size: 64, limit: 16 }));
}
