//! Common test utilities for in-process API testing with a mock gateway.
//!
//! The fixture builds the real router over a temporary SQLite database and
//! temporary upload/artifact directories, with `MockGateway` standing in for
//! the translation service.

#![allow(dead_code)]

use std::path::PathBuf;
use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::Value;
use tempfile::TempDir;
use tower::ServiceExt;

use modelbridge_core::config::{DatabaseConfig, GatewayConfig, ServerConfig};
use modelbridge_core::lifecycle::encode_translation_handle;
use modelbridge_core::testing::MockGateway;
use modelbridge_core::{
    Config, LifecycleConfig, LifecycleController, RecordStore, SqliteRecordStore,
    TranslationGateway,
};
use modelbridge_server::{create_router, AppState};

/// Re-export fixtures for test convenience
pub use modelbridge_core::testing::fixtures;

const BOUNDARY: &str = "modelbridge-test-boundary";

/// Test fixture for API testing with a mock gateway.
///
/// # Example
///
/// ```rust,ignore
/// #[tokio::test]
/// async fn test_upload() {
///     let fixture = TestFixture::new().await;
///
///     let response = fixture.upload("part.step", b"ISO-10303-21;", &[]).await;
///
///     assert_eq!(response.status, 201);
/// }
/// ```
pub struct TestFixture {
    /// The Axum router for testing
    pub router: Router,
    /// Mock gateway - configure manifests and payloads
    pub gateway: Arc<MockGateway>,
    /// Temporary directory for the database, uploads and artifacts
    pub temp_dir: TempDir,
    pub upload_dir: PathBuf,
    pub artifact_dir: PathBuf,
}

/// Response from a test request
#[derive(Debug)]
pub struct TestResponse {
    pub status: StatusCode,
    pub body: Value,
}

impl TestFixture {
    /// Create a new test fixture with default settings.
    pub async fn new() -> Self {
        Self::with_max_upload_bytes(1024 * 1024).await
    }

    /// Create a test fixture with a custom upload size limit.
    pub async fn with_max_upload_bytes(max_upload_bytes: usize) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let db_path = temp_dir.path().join("test.db");
        let upload_dir = temp_dir.path().join("uploads");
        let artifact_dir = temp_dir.path().join("artifacts");

        let config = Config {
            gateway: GatewayConfig {
                base_url: "http://127.0.0.1:1".to_string(),
                client_id: "test-client".to_string(),
                client_secret: "test-secret".to_string(),
                region: "US".to_string(),
                scope: "data:read".to_string(),
                viewer_scope: "viewables:read".to_string(),
                timeout_secs: 5,
                signed_url_minutes: 10,
                bucket_policy: "transient".to_string(),
            },
            server: ServerConfig {
                host: std::net::IpAddr::V4(std::net::Ipv4Addr::LOCALHOST),
                port: 0, // Not used for in-process testing
                max_upload_bytes,
            },
            database: DatabaseConfig {
                path: db_path.clone(),
            },
            lifecycle: LifecycleConfig::default().with_dirs(&upload_dir, &artifact_dir),
        };

        let gateway = Arc::new(MockGateway::new());
        let store: Arc<dyn RecordStore> =
            Arc::new(SqliteRecordStore::new(&db_path).expect("Failed to create record store"));

        let lifecycle = Arc::new(LifecycleController::new(
            config.lifecycle.clone(),
            store,
            Arc::clone(&gateway) as Arc<dyn TranslationGateway>,
        ));
        lifecycle
            .prepare_storage()
            .await
            .expect("Failed to create storage dirs");

        let state = Arc::new(AppState::new(config, lifecycle));
        let router = create_router(state);

        Self {
            router,
            gateway,
            temp_dir,
            upload_dir,
            artifact_dir,
        }
    }

    /// Translation handle the controller derives for `source_object_id`.
    pub fn handle_for(source_object_id: &str) -> String {
        encode_translation_handle(source_object_id)
    }

    /// Send a GET request to the test server.
    pub async fn get(&self, path: &str) -> TestResponse {
        self.request("GET", path, None).await
    }

    /// Send a POST request without a body.
    pub async fn post_empty(&self, path: &str) -> TestResponse {
        self.request("POST", path, None).await
    }

    /// Send a PUT request with JSON body.
    pub async fn put(&self, path: &str, body: Value) -> TestResponse {
        self.request("PUT", path, Some(body)).await
    }

    /// Send a PUT request with raw string body (for testing malformed JSON).
    pub async fn put_raw(&self, path: &str, body: &str) -> TestResponse {
        self.request_raw("PUT", path, body.as_bytes().to_vec(), "application/json")
            .await
    }

    /// Upload a file to `/api/v1/models` with extra text fields.
    pub async fn upload(&self, file_name: &str, data: &[u8], fields: &[(&str, &str)]) -> TestResponse {
        let body = multipart_body(Some((file_name, data)), fields);
        self.post_multipart(body).await
    }

    /// Post a multipart body built by [`multipart_body`].
    pub async fn post_multipart(&self, body: Vec<u8>) -> TestResponse {
        let content_type = format!("multipart/form-data; boundary={}", BOUNDARY);
        self.request_raw("POST", "/api/v1/models", body, &content_type)
            .await
    }

    /// Upload a file and return the created record's id.
    pub async fn ingest(&self, file_name: &str) -> String {
        let response = self.upload(file_name, b"ISO-10303-21;\nEND;\n", &[]).await;
        assert_eq!(response.status, StatusCode::CREATED, "{}", response.body);
        response.body["id"]
            .as_str()
            .expect("record id")
            .to_string()
    }

    /// Upload and submit a file, returning `(id, translation handle)`.
    pub async fn ingest_and_convert(&self, file_name: &str) -> (String, String) {
        let id = self.ingest(file_name).await;
        let response = self.post_empty(&format!("/api/v1/models/{}/convert", id)).await;
        assert_eq!(response.status, StatusCode::OK, "{}", response.body);
        let handle = response.body["translationHandle"]
            .as_str()
            .expect("translation handle")
            .to_string();
        (id, handle)
    }

    /// Poll a record and return its refreshed status.
    pub async fn poll(&self, id: &str) -> String {
        let response = self.post_empty(&format!("/api/v1/models/{}/poll", id)).await;
        assert_eq!(response.status, StatusCode::OK, "{}", response.body);
        response.body["status"]
            .as_str()
            .expect("record status")
            .to_string()
    }

    /// Fetch the raw text of a non-JSON endpoint.
    pub async fn get_text(&self, path: &str) -> (StatusCode, String) {
        let request = Request::builder()
            .method("GET")
            .uri(path)
            .body(Body::empty())
            .unwrap();
        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("Failed to send request");
        let status = response.status();
        let bytes = response
            .into_body()
            .collect()
            .await
            .expect("Failed to collect body")
            .to_bytes();
        (status, String::from_utf8_lossy(&bytes).into_owned())
    }

    /// Send a request with raw body and custom content type.
    async fn request_raw(
        &self,
        method: &str,
        path: &str,
        body: Vec<u8>,
        content_type: &str,
    ) -> TestResponse {
        let request = Request::builder()
            .method(method)
            .uri(path)
            .header("Content-Type", content_type)
            .body(Body::from(body))
            .unwrap();

        self.send(request).await
    }

    /// Send a request to the test server.
    async fn request(&self, method: &str, path: &str, body: Option<Value>) -> TestResponse {
        let mut request_builder = Request::builder().method(method).uri(path);

        let body = if let Some(json_body) = body {
            request_builder = request_builder.header("Content-Type", "application/json");
            Body::from(serde_json::to_vec(&json_body).unwrap())
        } else {
            Body::empty()
        };

        self.send(request_builder.body(body).unwrap()).await
    }

    async fn send(&self, request: Request<Body>) -> TestResponse {
        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("Failed to send request");

        let status = response.status();
        let body_bytes = response
            .into_body()
            .collect()
            .await
            .expect("Failed to collect body")
            .to_bytes();

        let body: Value = if body_bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&body_bytes).unwrap_or(Value::Null)
        };

        TestResponse { status, body }
    }
}

/// Build a `multipart/form-data` body with an optional file part.
pub fn multipart_body(file: Option<(&str, &[u8])>, fields: &[(&str, &str)]) -> Vec<u8> {
    let mut body = Vec::new();
    for (name, value) in fields {
        body.extend_from_slice(format!("--{}\r\n", BOUNDARY).as_bytes());
        body.extend_from_slice(
            format!("Content-Disposition: form-data; name=\"{}\"\r\n\r\n", name).as_bytes(),
        );
        body.extend_from_slice(value.as_bytes());
        body.extend_from_slice(b"\r\n");
    }
    if let Some((file_name, data)) = file {
        body.extend_from_slice(format!("--{}\r\n", BOUNDARY).as_bytes());
        body.extend_from_slice(
            format!(
                "Content-Disposition: form-data; name=\"file\"; filename=\"{}\"\r\n",
                file_name
            )
            .as_bytes(),
        );
        body.extend_from_slice(b"Content-Type: application/octet-stream\r\n\r\n");
        body.extend_from_slice(data);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{}--\r\n", BOUNDARY).as_bytes());
    body
}

/// Helper to assert a response has expected status.
#[macro_export]
macro_rules! assert_status {
    ($response:expr, $status:expr) => {
        assert_eq!(
            $response.status, $status,
            "Expected status {:?}, got {:?}. Body: {}",
            $status,
            $response.status,
            serde_json::to_string_pretty(&$response.body).unwrap_or_default()
        );
    };
}

/// Helper to assert a JSON path equals expected value.
#[macro_export]
macro_rules! assert_json_path {
    ($json:expr, $path:expr, $expected:expr) => {
        let actual = &$json[$path];
        assert_eq!(
            actual, &$expected,
            "Path '{}' expected {:?}, got {:?}",
            $path, $expected, actual
        );
    };
}
