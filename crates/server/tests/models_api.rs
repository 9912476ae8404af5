//! Model record API integration tests.
//!
//! Drive the full upload → convert → poll → download flow through the router
//! with `MockGateway` standing in for the translation service.

mod common;

use axum::http::StatusCode;
use serde_json::json;

use common::{fixtures, multipart_body, TestFixture};
use modelbridge_core::gateway::{GatewayError, GatewayOperation};
use modelbridge_core::ManifestStatus;

// ============================================================================
// Health / Config / Metrics
// ============================================================================

#[tokio::test]
async fn test_health() {
    let fixture = TestFixture::new().await;

    let response = fixture.get("/api/v1/health").await;

    assert_status!(response, StatusCode::OK);
    assert_json_path!(response.body, "status", json!("ok"));
}

#[tokio::test]
async fn test_config_redacts_client_secret() {
    let fixture = TestFixture::new().await;

    let response = fixture.get("/api/v1/config").await;

    assert_status!(response, StatusCode::OK);
    assert_eq!(response.body["gateway"]["client_id"], "test-client");
    assert_eq!(response.body["gateway"]["client_secret_configured"], true);
    assert!(response.body["gateway"].get("client_secret").is_none());
    assert!(!response.body.to_string().contains("test-secret"));
}

#[tokio::test]
async fn test_viewer_token() {
    let fixture = TestFixture::new().await;

    let response = fixture.get("/api/v1/viewer-token").await;

    assert_status!(response, StatusCode::OK);
    assert_json_path!(response.body, "access_token", json!("mock-viewer-token-1"));
    assert_json_path!(response.body, "expires_in", json!(3599));
    assert_eq!(fixture.gateway.viewer_tokens_issued().await, 1);
}

#[tokio::test]
async fn test_viewer_token_failure_is_bad_gateway() {
    let fixture = TestFixture::new().await;
    fixture
        .gateway
        .fail_next(
            GatewayOperation::ViewerToken,
            GatewayError::AuthenticationFailed("invalid client".to_string()),
        )
        .await;

    let response = fixture.get("/api/v1/viewer-token").await;

    assert_status!(response, StatusCode::BAD_GATEWAY);
    assert_json_path!(response.body, "kind", json!("viewer_token_failed"));
    assert!(response.body.get("record_id").is_none());
}

#[tokio::test]
async fn test_metrics_endpoint_reports_records_by_status() {
    let fixture = TestFixture::new().await;
    fixture.ingest("bracket.step").await;

    let (status, text) = fixture.get_text("/metrics").await;

    assert_eq!(status, StatusCode::OK);
    assert!(text.contains("modelbridge_records_by_status"));
    assert!(text.contains("modelbridge_http_requests_total"));
}

// ============================================================================
// Ingest
// ============================================================================

#[tokio::test]
async fn test_ingest_creates_need_convert_record() {
    let fixture = TestFixture::new().await;

    let response = fixture
        .upload(
            "bracket.step",
            b"ISO-10303-21;",
            &[
                ("displayName", "Mounting bracket"),
                ("category", "fixtures"),
                ("description", "rev B"),
            ],
        )
        .await;

    assert_status!(response, StatusCode::CREATED);
    assert_json_path!(response.body, "status", json!("needConvert"));
    assert_json_path!(response.body, "displayName", json!("Mounting bracket"));
    assert_json_path!(response.body, "category", json!("fixtures"));
    assert_json_path!(response.body, "description", json!("rev B"));
    assert!(response.body["translationHandle"].is_null());
    assert!(response.body["localArtifactPath"].is_null());

    let source_id = response.body["sourceObjectId"].as_str().unwrap();
    assert!(source_id.starts_with("urn:adsk.objects:os.object:modelbridge-models/"));

    let uploads = fixture.gateway.uploads().await;
    assert_eq!(uploads.len(), 1);
    assert_eq!(uploads[0].data, b"ISO-10303-21;");
}

#[tokio::test]
async fn test_ingest_defaults_display_name_to_file_name() {
    let fixture = TestFixture::new().await;

    let response = fixture.upload("housing.ipt", b"data", &[]).await;

    assert_status!(response, StatusCode::CREATED);
    assert_json_path!(response.body, "displayName", json!("housing.ipt"));
    assert_json_path!(response.body, "category", json!("uncategorized"));
}

#[tokio::test]
async fn test_ingest_without_file_is_bad_request() {
    let fixture = TestFixture::new().await;

    let body = multipart_body(None, &[("displayName", "orphan")]);
    let response = fixture.post_multipart(body).await;

    assert_status!(response, StatusCode::BAD_REQUEST);
    assert_json_path!(response.body, "kind", json!("invalid_request"));
    assert!(fixture.gateway.uploads().await.is_empty());
}

#[tokio::test]
async fn test_ingest_empty_file_is_bad_request() {
    let fixture = TestFixture::new().await;

    let response = fixture.upload("empty.step", b"", &[]).await;

    assert_status!(response, StatusCode::BAD_REQUEST);
    assert!(fixture.gateway.uploads().await.is_empty());
}

#[tokio::test]
async fn test_ingest_gateway_failure_is_bad_gateway_and_creates_nothing() {
    let fixture = TestFixture::new().await;
    fixture
        .gateway
        .fail_next(
            GatewayOperation::Upload,
            GatewayError::ConnectionFailed("refused".to_string()),
        )
        .await;

    let response = fixture.upload("bracket.step", b"ISO-10303-21;", &[]).await;

    assert_status!(response, StatusCode::BAD_GATEWAY);
    assert_json_path!(response.body, "kind", json!("upload_failed"));

    let list = fixture.get("/api/v1/models").await;
    assert_eq!(list.body["total"], 0);

    // Spooled upload is cleaned up
    let leftovers = std::fs::read_dir(&fixture.upload_dir).unwrap().count();
    assert_eq!(leftovers, 0);
}

#[tokio::test]
async fn test_ingest_over_body_limit_is_rejected() {
    let fixture = TestFixture::with_max_upload_bytes(64).await;

    let response = fixture.upload("big.step", &[b'x'; 4096], &[]).await;

    assert!(response.status.is_client_error(), "got {}", response.status);
    assert!(fixture.gateway.uploads().await.is_empty());
}

// ============================================================================
// Get / List
// ============================================================================

#[tokio::test]
async fn test_get_model() {
    let fixture = TestFixture::new().await;
    let id = fixture.ingest("bracket.step").await;

    let response = fixture.get(&format!("/api/v1/models/{}", id)).await;

    assert_status!(response, StatusCode::OK);
    assert_json_path!(response.body, "id", json!(id));
    assert_json_path!(response.body, "status", json!("needConvert"));
}

#[tokio::test]
async fn test_get_unknown_model_is_not_found() {
    let fixture = TestFixture::new().await;

    let response = fixture.get("/api/v1/models/does-not-exist").await;

    assert_status!(response, StatusCode::NOT_FOUND);
    assert_json_path!(response.body, "kind", json!("record_not_found"));
    assert_json_path!(response.body, "record_id", json!("does-not-exist"));
}

#[tokio::test]
async fn test_list_newest_first_with_pagination() {
    let fixture = TestFixture::new().await;
    let first = fixture.ingest("a.step").await;
    let second = fixture.ingest("b.step").await;
    let third = fixture.ingest("c.step").await;

    let response = fixture.get("/api/v1/models?limit=2").await;

    assert_status!(response, StatusCode::OK);
    assert_eq!(response.body["total"], 3);
    assert_eq!(response.body["limit"], 2);
    let models = response.body["models"].as_array().unwrap();
    assert_eq!(models.len(), 2);
    assert_eq!(models[0]["id"], json!(third));
    assert_eq!(models[1]["id"], json!(second));

    let page = fixture.get("/api/v1/models?limit=2&offset=2").await;
    let models = page.body["models"].as_array().unwrap();
    assert_eq!(models.len(), 1);
    assert_eq!(models[0]["id"], json!(first));
}

#[tokio::test]
async fn test_list_filters_by_status_and_category() {
    let fixture = TestFixture::new().await;
    let converted = fixture.ingest("a.step").await;
    fixture.ingest("b.step").await;
    fixture
        .upload("c.step", b"data", &[("category", "castings")])
        .await;
    fixture
        .post_empty(&format!("/api/v1/models/{}/convert", converted))
        .await;

    let in_progress = fixture.get("/api/v1/models?status=inprogress").await;
    assert_status!(in_progress, StatusCode::OK);
    assert_eq!(in_progress.body["total"], 1);
    assert_eq!(in_progress.body["models"][0]["id"], json!(converted));

    let castings = fixture.get("/api/v1/models?category=castings").await;
    assert_eq!(castings.body["total"], 1);
    assert_eq!(castings.body["models"][0]["category"], "castings");
}

#[tokio::test]
async fn test_list_unknown_status_is_bad_request() {
    let fixture = TestFixture::new().await;

    let response = fixture.get("/api/v1/models?status=exploded").await;

    assert_status!(response, StatusCode::BAD_REQUEST);
    assert_json_path!(response.body, "kind", json!("invalid_request"));
}

// ============================================================================
// Convert
// ============================================================================

#[tokio::test]
async fn test_convert_sets_handle_and_in_progress() {
    let fixture = TestFixture::new().await;
    let created = fixture.upload("bracket.step", b"data", &[]).await;
    let id = created.body["id"].as_str().unwrap().to_string();
    let source_id = created.body["sourceObjectId"].as_str().unwrap().to_string();

    let response = fixture
        .post_empty(&format!("/api/v1/models/{}/convert", id))
        .await;

    assert_status!(response, StatusCode::OK);
    assert_json_path!(response.body, "status", json!("inprogress"));
    assert_json_path!(
        response.body,
        "translationHandle",
        json!(TestFixture::handle_for(&source_id))
    );

    let submissions = fixture.gateway.submissions().await;
    assert_eq!(submissions.len(), 1);
    assert_eq!(submissions[0].urn, TestFixture::handle_for(&source_id));
}

#[tokio::test]
async fn test_convert_twice_is_conflict() {
    let fixture = TestFixture::new().await;
    let (id, _) = fixture.ingest_and_convert("bracket.step").await;

    let response = fixture
        .post_empty(&format!("/api/v1/models/{}/convert", id))
        .await;

    assert_status!(response, StatusCode::CONFLICT);
    assert_json_path!(response.body, "kind", json!("invalid_state_transition"));
    assert_json_path!(response.body, "record_id", json!(id));
    assert_eq!(fixture.gateway.submissions().await.len(), 1);
}

#[tokio::test]
async fn test_convert_failure_keeps_need_convert() {
    let fixture = TestFixture::new().await;
    let id = fixture.ingest("bracket.step").await;
    fixture
        .gateway
        .fail_next(
            GatewayOperation::SubmitJob,
            GatewayError::ApiError {
                status: 400,
                message: "unsupported format".to_string(),
            },
        )
        .await;

    let response = fixture
        .post_empty(&format!("/api/v1/models/{}/convert", id))
        .await;

    assert_status!(response, StatusCode::BAD_GATEWAY);
    assert_json_path!(response.body, "kind", json!("translation_submit_failed"));

    let record = fixture.get(&format!("/api/v1/models/{}", id)).await;
    assert_json_path!(record.body, "status", json!("needConvert"));
    assert!(record.body["translationHandle"].is_null());
}

#[tokio::test]
async fn test_convert_unknown_model_is_not_found() {
    let fixture = TestFixture::new().await;

    let response = fixture.post_empty("/api/v1/models/nope/convert").await;

    assert_status!(response, StatusCode::NOT_FOUND);
    assert!(fixture.gateway.submissions().await.is_empty());
}

// ============================================================================
// Poll
// ============================================================================

#[tokio::test]
async fn test_poll_before_convert_is_conflict() {
    let fixture = TestFixture::new().await;
    let id = fixture.ingest("bracket.step").await;

    let response = fixture
        .post_empty(&format!("/api/v1/models/{}/poll", id))
        .await;

    assert_status!(response, StatusCode::CONFLICT);
    assert_json_path!(response.body, "kind", json!("no_translation_handle"));
}

#[tokio::test]
async fn test_poll_tracks_progress_then_success() {
    let fixture = TestFixture::new().await;
    let (id, handle) = fixture.ingest_and_convert("bracket.step").await;
    let path = format!("/api/v1/models/{}/poll", id);

    fixture
        .gateway
        .set_manifest(&handle, fixtures::in_progress_manifest(40))
        .await;
    let response = fixture.post_empty(&path).await;
    assert_status!(response, StatusCode::OK);
    assert_json_path!(response.body, "status", json!("inprogress"));
    assert_json_path!(response.body, "progress", json!("40% complete"));

    fixture
        .gateway
        .set_manifest(&handle, fixtures::manifest(ManifestStatus::Success))
        .await;
    let response = fixture.post_empty(&path).await;
    assert_status!(response, StatusCode::OK);
    assert_json_path!(response.body, "status", json!("success"));
}

#[tokio::test]
async fn test_poll_failed_manifest_records_error_message() {
    let fixture = TestFixture::new().await;
    let (id, handle) = fixture.ingest_and_convert("bracket.step").await;
    fixture
        .gateway
        .set_manifest(&handle, fixtures::failed_manifest("Unrecoverable geometry"))
        .await;

    let response = fixture
        .post_empty(&format!("/api/v1/models/{}/poll", id))
        .await;

    assert_status!(response, StatusCode::OK);
    assert_json_path!(response.body, "status", json!("failed"));
    assert_json_path!(response.body, "errorMessage", json!("Unrecoverable geometry"));
}

#[tokio::test]
async fn test_poll_gateway_failure_leaves_record_unchanged() {
    let fixture = TestFixture::new().await;
    let (id, _) = fixture.ingest_and_convert("bracket.step").await;
    fixture
        .gateway
        .fail_next(GatewayOperation::GetManifest, GatewayError::Timeout)
        .await;

    let response = fixture
        .post_empty(&format!("/api/v1/models/{}/poll", id))
        .await;

    assert_status!(response, StatusCode::BAD_GATEWAY);
    assert_json_path!(response.body, "kind", json!("manifest_fetch_failed"));

    let record = fixture.get(&format!("/api/v1/models/{}", id)).await;
    assert_json_path!(record.body, "status", json!("inprogress"));
    assert!(record.body["errorMessage"].is_null());
}

// ============================================================================
// Download
// ============================================================================

#[tokio::test]
async fn test_download_writes_artifact() {
    let fixture = TestFixture::new().await;
    let (id, handle) = fixture.ingest_and_convert("bracket.step").await;
    fixture
        .gateway
        .set_manifest(&handle, fixtures::obj_manifest("urn:obj:bracket"))
        .await;
    fixture
        .gateway
        .set_payload("urn:obj:bracket", b"v 0 0 0\nv 1 0 0\nv 0 1 0\nf 1 2 3\n".to_vec())
        .await;
    assert_eq!(fixture.poll(&id).await, "success");

    let response = fixture
        .post_empty(&format!("/api/v1/models/{}/download", id))
        .await;

    assert_status!(response, StatusCode::OK);
    assert_json_path!(response.body, "status", json!("downloaded"));

    let artifact = fixture.artifact_dir.join(format!("{}.obj", id));
    assert_json_path!(
        response.body,
        "localArtifactPath",
        json!(artifact.to_string_lossy())
    );
    let contents = std::fs::read(&artifact).unwrap();
    assert_eq!(contents, b"v 0 0 0\nv 1 0 0\nv 0 1 0\nf 1 2 3\n");

    let requests = fixture.gateway.credential_requests().await;
    assert_eq!(requests, vec![(handle, "urn:obj:bracket".to_string())]);
}

#[tokio::test]
async fn test_download_without_derivative_is_not_found() {
    let fixture = TestFixture::new().await;
    let (id, handle) = fixture.ingest_and_convert("bracket.step").await;
    fixture
        .gateway
        .set_manifest(&handle, fixtures::manifest(ManifestStatus::Success))
        .await;
    assert_eq!(fixture.poll(&id).await, "success");

    let response = fixture
        .post_empty(&format!("/api/v1/models/{}/download", id))
        .await;

    assert_status!(response, StatusCode::NOT_FOUND);
    assert_json_path!(response.body, "kind", json!("derivative_not_found"));

    let record = fixture.get(&format!("/api/v1/models/{}", id)).await;
    assert_json_path!(record.body, "status", json!("success"));
    assert!(record.body["localArtifactPath"].is_null());
}

#[tokio::test]
async fn test_download_broken_stream_leaves_no_artifact() {
    let fixture = TestFixture::new().await;
    let (id, handle) = fixture.ingest_and_convert("bracket.step").await;
    fixture
        .gateway
        .set_manifest(&handle, fixtures::obj_manifest("urn:obj:broken"))
        .await;
    fixture
        .gateway
        .set_payload("urn:obj:broken", b"v 0 0 0\nv 1 0 0\n".to_vec())
        .await;
    fixture.gateway.break_stream("urn:obj:broken").await;
    assert_eq!(fixture.poll(&id).await, "success");

    let response = fixture
        .post_empty(&format!("/api/v1/models/{}/download", id))
        .await;

    assert_status!(response, StatusCode::BAD_GATEWAY);
    assert_json_path!(response.body, "kind", json!("download_failed"));
    assert!(!fixture.artifact_dir.join(format!("{}.obj", id)).exists());

    let record = fixture.get(&format!("/api/v1/models/{}", id)).await;
    assert!(record.body["localArtifactPath"].is_null());
    assert_json_path!(record.body, "status", json!("success"));
}

#[tokio::test]
async fn test_download_before_success_is_conflict() {
    let fixture = TestFixture::new().await;
    let (id, handle) = fixture.ingest_and_convert("bracket.step").await;
    fixture
        .gateway
        .set_manifest(&handle, fixtures::obj_manifest("urn:obj:early"))
        .await;
    fixture
        .gateway
        .set_payload("urn:obj:early", b"v 0 0 0\n".to_vec())
        .await;

    let response = fixture
        .post_empty(&format!("/api/v1/models/{}/download", id))
        .await;

    assert_status!(response, StatusCode::CONFLICT);
    assert_json_path!(response.body, "kind", json!("invalid_state_transition"));
    assert_json_path!(response.body, "record_id", json!(id));
    assert!(fixture.gateway.credential_requests().await.is_empty());
    assert!(!fixture.artifact_dir.join(format!("{}.obj", id)).exists());

    let record = fixture.get(&format!("/api/v1/models/{}", id)).await;
    assert_json_path!(record.body, "status", json!("inprogress"));
}

#[tokio::test]
async fn test_download_after_failure_is_conflict() {
    let fixture = TestFixture::new().await;
    let (id, handle) = fixture.ingest_and_convert("bracket.step").await;
    fixture
        .gateway
        .set_manifest(&handle, fixtures::failed_manifest("Unsupported file format"))
        .await;
    assert_eq!(fixture.poll(&id).await, "failed");

    let response = fixture
        .post_empty(&format!("/api/v1/models/{}/download", id))
        .await;

    assert_status!(response, StatusCode::CONFLICT);
    assert_json_path!(response.body, "kind", json!("invalid_state_transition"));
    assert!(fixture.gateway.credential_requests().await.is_empty());
}

// ============================================================================
// Update metadata
// ============================================================================

#[tokio::test]
async fn test_update_metadata_keeps_status() {
    let fixture = TestFixture::new().await;
    let (id, _) = fixture.ingest_and_convert("bracket.step").await;

    let response = fixture
        .put(
            &format!("/api/v1/models/{}", id),
            json!({ "displayName": "Bracket v2", "category": "fixtures" }),
        )
        .await;

    assert_status!(response, StatusCode::OK);
    assert_json_path!(response.body, "displayName", json!("Bracket v2"));
    assert_json_path!(response.body, "category", json!("fixtures"));
    assert_json_path!(response.body, "status", json!("inprogress"));
}

#[tokio::test]
async fn test_update_metadata_partial_keeps_other_fields() {
    let fixture = TestFixture::new().await;
    let created = fixture
        .upload("bracket.step", b"data", &[("description", "original")])
        .await;
    let id = created.body["id"].as_str().unwrap();

    let response = fixture
        .put(
            &format!("/api/v1/models/{}", id),
            json!({ "displayName": "Renamed" }),
        )
        .await;

    assert_status!(response, StatusCode::OK);
    assert_json_path!(response.body, "displayName", json!("Renamed"));
    assert_json_path!(response.body, "description", json!("original"));
}

#[tokio::test]
async fn test_update_metadata_malformed_json_is_bad_request() {
    let fixture = TestFixture::new().await;
    let id = fixture.ingest("bracket.step").await;

    let response = fixture
        .put_raw(&format!("/api/v1/models/{}", id), "{ not json")
        .await;

    assert_status!(response, StatusCode::BAD_REQUEST);
    assert_json_path!(response.body, "kind", json!("invalid_request"));
}

#[tokio::test]
async fn test_update_metadata_unknown_model_is_not_found() {
    let fixture = TestFixture::new().await;

    let response = fixture
        .put("/api/v1/models/ghost", json!({ "displayName": "x" }))
        .await;

    assert_status!(response, StatusCode::NOT_FOUND);
    assert_json_path!(response.body, "kind", json!("record_not_found"));
}
