use gdrive_core::{ChangeListQuery, DriveClient, DriveError, FOLDER_MIME};
use serde_json::json;
use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[tokio::test]
async fn get_file_sends_bearer_token() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/files/root"))
        .and(header("authorization", "Bearer test-token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "0Ar",
            "title": "My Drive",
            "mimeType": FOLDER_MIME,
            "modifiedDate": "2024-01-01T00:00:00.000Z",
            "etag": "\"e0\""
        })))
        .mount(&server)
        .await;

    let client = DriveClient::with_base_url(&server.uri(), "test-token").unwrap();
    let file = client.get_file("root").await.unwrap();

    assert_eq!(file.id, "0Ar");
    assert_eq!(file.title, "My Drive");
    assert_eq!(file.mime_type, FOLDER_MIME);
    assert!(file.parents.is_empty());
    assert!(!file.labels.trashed);
}

#[tokio::test]
async fn list_changes_uses_start_change_id_when_no_page_token() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/changes"))
        .and(query_param("includeSubscribed", "false"))
        .and(query_param("startChangeId", "42"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "nextPageToken": "",
            "items": []
        })))
        .mount(&server)
        .await;

    let client = DriveClient::with_base_url(&server.uri(), "test-token").unwrap();
    let changes = client
        .list_changes(&ChangeListQuery {
            page_token: String::new(),
            start_change_id: 42,
            include_deleted: true,
        })
        .await
        .unwrap();

    assert!(changes.items.is_empty());
    assert!(changes.next_page_token.is_empty());
}

#[tokio::test]
async fn list_changes_prefers_page_token_over_start_change_id() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/changes"))
        .and(query_param("pageToken", "tok-2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "nextPageToken": "",
            "items": [
                {
                    "id": 7,
                    "fileId": "F1",
                    "deleted": true
                }
            ]
        })))
        .mount(&server)
        .await;

    let client = DriveClient::with_base_url(&server.uri(), "test-token").unwrap();
    let changes = client
        .list_changes(&ChangeListQuery {
            page_token: "tok-2".into(),
            start_change_id: 42,
            include_deleted: true,
        })
        .await
        .unwrap();

    assert_eq!(changes.items.len(), 1);
    assert_eq!(changes.items[0].id, 7);
    assert!(changes.items[0].deleted);
    assert!(changes.items[0].file.is_none());
}

#[tokio::test]
async fn list_changes_omits_deleted_on_initial_sync() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/changes"))
        .and(query_param("includeDeleted", "false"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "nextPageToken": "",
            "items": []
        })))
        .mount(&server)
        .await;

    let client = DriveClient::with_base_url(&server.uri(), "test-token").unwrap();
    client
        .list_changes(&ChangeListQuery::default())
        .await
        .unwrap();
}

#[tokio::test]
async fn change_items_deserialize_file_metadata() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/changes"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "nextPageToken": "tok-next",
            "items": [
                {
                    "id": 3,
                    "fileId": "F1",
                    "deleted": false,
                    "file": {
                        "id": "F1",
                        "title": "a.txt",
                        "mimeType": "text/plain",
                        "modifiedDate": "2024-01-02T03:04:05.000Z",
                        "fileSize": 5,
                        "md5Checksum": "abc",
                        "etag": "\"e1\"",
                        "parents": [{"id": "0Ar"}],
                        "downloadUrl": "https://example.invalid/F1",
                        "labels": {"trashed": false}
                    }
                }
            ]
        })))
        .mount(&server)
        .await;

    let client = DriveClient::with_base_url(&server.uri(), "test-token").unwrap();
    let changes = client
        .list_changes(&ChangeListQuery::default())
        .await
        .unwrap();

    assert_eq!(changes.next_page_token, "tok-next");
    let file = changes.items[0].file.as_ref().unwrap();
    assert_eq!(file.title, "a.txt");
    assert_eq!(file.file_size, 5);
    assert_eq!(file.md5_checksum, "abc");
    assert_eq!(file.parents[0].id, "0Ar");
}

#[tokio::test]
async fn non_success_status_maps_to_api_error() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/files/missing"))
        .respond_with(ResponseTemplate::new(404).set_body_string("not found"))
        .mount(&server)
        .await;

    let client = DriveClient::with_base_url(&server.uri(), "test-token").unwrap();
    let err = client.get_file("missing").await.expect_err("expected 404");

    match err {
        DriveError::Api { status, body } => {
            assert_eq!(status.as_u16(), 404);
            assert_eq!(body, "not found");
        }
        other => panic!("unexpected error: {other}"),
    }
    let retryable = DriveError::Api {
        status: reqwest::StatusCode::INTERNAL_SERVER_ERROR,
        body: String::new(),
    };
    assert!(retryable.is_retryable());
}
