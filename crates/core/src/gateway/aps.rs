//! Autodesk Platform Services gateway implementation.

use std::collections::HashSet;
use std::path::Path;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::header::{CONTENT_LENGTH, COOKIE, SET_COOKIE};
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use serde_json::json;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::config::GatewayConfig;

use super::{
    ByteStream, DownloadCredential, GatewayError, JobAck, Manifest, OutputFormat,
    TranslationGateway, UploadedObject, ViewerToken,
};

/// Tokens are refreshed this long before the service says they expire.
const TOKEN_EXPIRY_MARGIN: Duration = Duration::from_secs(60);

const REGION_HEADER: &str = "x-ads-region";

#[derive(Debug, Clone)]
struct CachedToken {
    value: String,
    expires_at: Instant,
}

impl CachedToken {
    fn is_fresh(&self, now: Instant) -> bool {
        now + TOKEN_EXPIRY_MARGIN < self.expires_at
    }
}

/// APS client for bucket storage and model derivative calls.
///
/// `timeout_secs` bounds connection setup and every JSON API call. The S3
/// upload and the derivative download carry no total deadline.
pub struct ApsGateway {
    client: Client,
    config: GatewayConfig,
    /// Two-legged access token, refreshed lazily.
    token: RwLock<Option<CachedToken>>,
    /// Separate read-only token handed to viewers.
    viewer: RwLock<Option<CachedToken>>,
    /// Buckets confirmed to exist during this process lifetime.
    ensured_buckets: RwLock<HashSet<String>>,
}

impl ApsGateway {
    /// Create a new APS gateway.
    pub fn new(config: GatewayConfig) -> Result<Self, GatewayError> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(config.timeout_secs as u64))
            .build()
            .map_err(|e| GatewayError::ConnectionFailed(e.to_string()))?;

        Ok(Self {
            client,
            config,
            token: RwLock::new(None),
            viewer: RwLock::new(None),
            ensured_buckets: RwLock::new(HashSet::new()),
        })
    }

    /// Deadline for a single JSON API round trip.
    fn api_timeout(&self) -> Duration {
        Duration::from_secs(self.config.timeout_secs as u64)
    }

    /// Get the base URL without trailing slash.
    fn base_url(&self) -> &str {
        self.config.base_url.trim_end_matches('/')
    }

    fn object_url(&self, bucket_key: &str, object_key: &str) -> String {
        format!(
            "{}/oss/v2/buckets/{}/objects/{}",
            self.base_url(),
            urlencoding::encode(bucket_key),
            urlencoding::encode(object_key)
        )
    }

    fn manifest_url(&self, urn: &str) -> String {
        format!(
            "{}/modelderivative/v2/designdata/{}/manifest",
            self.base_url(),
            urlencoding::encode(urn)
        )
    }

    async fn access_token(&self) -> Result<String, GatewayError> {
        let token = self.cached_token(&self.token, &self.config.scope).await?;
        Ok(token.value)
    }

    /// Return the token held in `slot`, requesting a new one for `scope` if it
    /// is missing or about to expire.
    async fn cached_token(
        &self,
        slot: &RwLock<Option<CachedToken>>,
        scope: &str,
    ) -> Result<CachedToken, GatewayError> {
        {
            let token = slot.read().await;
            if let Some(cached) = token.as_ref().filter(|t| t.is_fresh(Instant::now())) {
                return Ok(cached.clone());
            }
        }

        let mut token = slot.write().await;
        // Another task may have refreshed while we waited for the write lock
        if let Some(cached) = token.as_ref().filter(|t| t.is_fresh(Instant::now())) {
            return Ok(cached.clone());
        }

        let fresh = self.request_token(scope).await?;
        *token = Some(fresh.clone());
        Ok(fresh)
    }

    fn token_request(&self, scope: &str) -> RequestBuilder {
        let url = format!("{}/authentication/v2/token", self.base_url());
        self.client
            .post(url)
            .basic_auth(&self.config.client_id, Some(&self.config.client_secret))
            .form(&[("grant_type", "client_credentials"), ("scope", scope)])
            .timeout(self.api_timeout())
    }

    async fn request_token(&self, scope: &str) -> Result<CachedToken, GatewayError> {
        let requested_at = Instant::now();
        let response = self
            .token_request(scope)
            .send()
            .await
            .map_err(map_request_error)?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            let body = response.text().await.unwrap_or_default();
            return Err(GatewayError::AuthenticationFailed(truncate(&body)));
        }
        let response = check_status(response).await?;

        let token: TokenResponse = parse_json(response).await?;
        debug!(scope, expires_in = token.expires_in, "Obtained APS access token");

        Ok(CachedToken {
            value: token.access_token,
            expires_at: requested_at + Duration::from_secs(token.expires_in),
        })
    }

    async fn invalidate_token(&self) {
        let mut token = self.token.write().await;
        *token = None;
    }

    /// Send a bearer-authenticated request, refreshing the token once if it is rejected.
    async fn send_authorized<F>(&self, build: F) -> Result<Response, GatewayError>
    where
        F: Fn(&str) -> RequestBuilder,
    {
        let token = self.access_token().await?;
        let response = build(&token)
            .timeout(self.api_timeout())
            .send()
            .await
            .map_err(map_request_error)?;

        if response.status() != StatusCode::UNAUTHORIZED {
            return Ok(response);
        }

        warn!("APS rejected access token, re-authenticating");
        self.invalidate_token().await;
        let token = self.access_token().await?;
        let response = build(&token)
            .timeout(self.api_timeout())
            .send()
            .await
            .map_err(map_request_error)?;

        if response.status() == StatusCode::UNAUTHORIZED {
            return Err(GatewayError::AuthenticationFailed(
                "access token rejected after refresh".to_string(),
            ));
        }
        Ok(response)
    }

    /// Make sure `bucket_key` exists, creating it with the configured policy on first use.
    async fn ensure_bucket(&self, bucket_key: &str) -> Result<(), GatewayError> {
        if self.ensured_buckets.read().await.contains(bucket_key) {
            return Ok(());
        }

        let details_url = format!(
            "{}/oss/v2/buckets/{}/details",
            self.base_url(),
            urlencoding::encode(bucket_key)
        );
        let response = self
            .send_authorized(|token| {
                self.client
                    .get(&details_url)
                    .bearer_auth(token)
                    .header(REGION_HEADER, &self.config.region)
            })
            .await?;

        if response.status() == StatusCode::NOT_FOUND {
            info!(bucket = %bucket_key, policy = %self.config.bucket_policy, "Creating bucket");
            let create_url = format!("{}/oss/v2/buckets", self.base_url());
            let body = json!({
                "bucketKey": bucket_key,
                "access": "full",
                "policyKey": self.config.bucket_policy,
            });
            let response = self
                .send_authorized(|token| {
                    self.client
                        .post(&create_url)
                        .bearer_auth(token)
                        .header(REGION_HEADER, &self.config.region)
                        .json(&body)
                })
                .await?;

            // 409 means someone else created it first
            if response.status() != StatusCode::CONFLICT {
                check_status(response).await?;
            }
        } else {
            check_status(response).await?;
        }

        self.ensured_buckets
            .write()
            .await
            .insert(bucket_key.to_string());
        Ok(())
    }

    fn signed_upload_request(&self, url: &str, token: &str) -> RequestBuilder {
        self.client
            .get(url)
            .bearer_auth(token)
            .header(REGION_HEADER, &self.config.region)
    }

    /// Plain GET against the signed derivative URL, without a total deadline.
    fn download_request(&self, credential: &DownloadCredential) -> RequestBuilder {
        let request = self.client.get(&credential.url);
        if credential.cookies.is_empty() {
            request
        } else {
            request.header(COOKIE, credential.cookie_header())
        }
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: u64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SignedUpload {
    upload_key: String,
    urls: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FinalizedObject {
    bucket_key: String,
    object_key: String,
    object_id: String,
    #[serde(default)]
    size: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct SignedCookiesBody {
    url: String,
}

#[async_trait]
impl TranslationGateway for ApsGateway {
    fn name(&self) -> &str {
        "aps"
    }

    async fn upload(
        &self,
        source: &Path,
        bucket_key: &str,
        object_key: &str,
    ) -> Result<UploadedObject, GatewayError> {
        self.ensure_bucket(bucket_key).await?;

        let signed_url = format!(
            "{}/signeds3upload?minutesExpiration={}",
            self.object_url(bucket_key, object_key),
            self.config.signed_url_minutes
        );
        let response = self
            .send_authorized(|token| self.signed_upload_request(&signed_url, token))
            .await?;
        let signed: SignedUpload = parse_json(check_status(response).await?).await?;

        let target = signed
            .urls
            .first()
            .ok_or_else(|| GatewayError::ParseError("signed upload returned no URLs".into()))?;

        let file = tokio::fs::File::open(source).await?;
        let length = file.metadata().await?.len();
        debug!(object = %object_key, bytes = length, "Uploading to signed URL");

        let response = self
            .client
            .put(target)
            .header(CONTENT_LENGTH, length)
            .body(file)
            .send()
            .await
            .map_err(map_request_error)?;
        check_status(response).await?;

        let finalize_url = format!("{}/signeds3upload", self.object_url(bucket_key, object_key));
        let body = json!({ "uploadKey": signed.upload_key });
        let response = self
            .send_authorized(|token| {
                self.client
                    .post(&finalize_url)
                    .bearer_auth(token)
                    .header(REGION_HEADER, &self.config.region)
                    .json(&body)
            })
            .await?;
        let finalized: FinalizedObject = parse_json(check_status(response).await?).await?;

        info!(object_id = %finalized.object_id, "Upload finalized");

        Ok(UploadedObject {
            object_id: finalized.object_id,
            bucket_key: finalized.bucket_key,
            object_key: finalized.object_key,
            size: finalized.size.or(Some(length)),
        })
    }

    async fn submit_job(
        &self,
        urn: &str,
        formats: &[OutputFormat],
    ) -> Result<JobAck, GatewayError> {
        let url = format!("{}/modelderivative/v2/designdata/job", self.base_url());
        let body = json!({
            "input": { "urn": urn },
            "output": {
                "destination": { "region": self.config.region.to_lowercase() },
                "formats": formats,
            },
        });

        let response = self
            .send_authorized(|token| self.client.post(&url).bearer_auth(token).json(&body))
            .await?;

        parse_json(check_status(response).await?).await
    }

    async fn get_manifest(&self, urn: &str) -> Result<Manifest, GatewayError> {
        let url = self.manifest_url(urn);
        let response = self
            .send_authorized(|token| self.client.get(&url).bearer_auth(token))
            .await?;

        parse_json(check_status(response).await?).await
    }

    async fn get_download_credential(
        &self,
        urn: &str,
        derivative_urn: &str,
    ) -> Result<DownloadCredential, GatewayError> {
        let url = format!(
            "{}/{}/signedcookies",
            self.manifest_url(urn),
            urlencoding::encode(derivative_urn)
        );
        let response = self
            .send_authorized(|token| self.client.get(&url).bearer_auth(token))
            .await?;
        let response = check_status(response).await?;

        let cookies: Vec<String> = response
            .headers()
            .get_all(SET_COOKIE)
            .iter()
            .filter_map(|value| value.to_str().ok())
            .filter_map(cookie_pair)
            .collect();

        let body: SignedCookiesBody = parse_json(response).await?;

        Ok(DownloadCredential {
            url: body.url,
            cookies,
        })
    }

    async fn fetch_bytes(
        &self,
        credential: &DownloadCredential,
    ) -> Result<ByteStream, GatewayError> {
        let response = self
            .download_request(credential)
            .send()
            .await
            .map_err(map_request_error)?;
        let response = check_status(response).await?;

        Ok(response
            .bytes_stream()
            .map(|chunk| chunk.map_err(map_request_error))
            .boxed())
    }

    async fn viewer_token(&self) -> Result<ViewerToken, GatewayError> {
        let token = self
            .cached_token(&self.viewer, &self.config.viewer_scope)
            .await?;
        Ok(ViewerToken {
            expires_in: token
                .expires_at
                .saturating_duration_since(Instant::now())
                .as_secs(),
            access_token: token.value,
        })
    }
}

fn map_request_error(e: reqwest::Error) -> GatewayError {
    if e.is_timeout() {
        GatewayError::Timeout
    } else if e.is_connect() {
        GatewayError::ConnectionFailed(e.to_string())
    } else {
        GatewayError::ApiError {
            status: e.status().map(|s| s.as_u16()).unwrap_or(0),
            message: e.to_string(),
        }
    }
}

/// Turn a non-success response into the matching error.
async fn check_status(response: Response) -> Result<Response, GatewayError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let url = response.url().path().to_string();
    let body = response.text().await.unwrap_or_default();

    Err(match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            GatewayError::AuthenticationFailed(format!("HTTP {} for {}", status, url))
        }
        StatusCode::NOT_FOUND => GatewayError::NotFound(url),
        _ => GatewayError::ApiError {
            status: status.as_u16(),
            message: truncate(&body),
        },
    })
}

async fn parse_json<T: serde::de::DeserializeOwned>(response: Response) -> Result<T, GatewayError> {
    let body = response.text().await.map_err(map_request_error)?;
    serde_json::from_str(&body).map_err(|e| GatewayError::ParseError(e.to_string()))
}

/// Extract the `name=value` part of a `Set-Cookie` header.
fn cookie_pair(header: &str) -> Option<String> {
    let pair = header.split(';').next()?.trim();
    pair.contains('=').then(|| pair.to_string())
}

fn truncate(body: &str) -> String {
    body.chars().take(200).collect()
}
