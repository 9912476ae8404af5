use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use std::path::PathBuf;

use crate::lifecycle::LifecycleConfig;

/// Root configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    pub gateway: GatewayConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub lifecycle: LifecycleConfig,
}

/// Server configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: IpAddr,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Largest accepted upload body in bytes.
    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            max_upload_bytes: default_max_upload_bytes(),
        }
    }
}

fn default_host() -> IpAddr {
    IpAddr::from([0, 0, 0, 0])
}

fn default_port() -> u16 {
    3001
}

fn default_max_upload_bytes() -> usize {
    512 * 1024 * 1024
}

/// Database configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: PathBuf,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

fn default_db_path() -> PathBuf {
    PathBuf::from("modelbridge.db")
}

/// Autodesk Platform Services connection settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct GatewayConfig {
    /// API root (default: https://developer.api.autodesk.com).
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// OAuth client id for the two-legged flow.
    pub client_id: String,
    /// OAuth client secret.
    pub client_secret: String,
    /// Storage region sent as `x-ads-region`.
    #[serde(default = "default_region")]
    pub region: String,
    /// Scopes requested for the access token.
    #[serde(default = "default_scope")]
    pub scope: String,
    /// Scope of tokens handed to the browser viewer.
    #[serde(default = "default_viewer_scope")]
    pub viewer_scope: String,
    /// Request timeout in seconds (default: 120).
    #[serde(default = "default_timeout")]
    pub timeout_secs: u32,
    /// Lifetime of signed upload URLs, 1..=60 minutes.
    #[serde(default = "default_signed_url_minutes")]
    pub signed_url_minutes: u32,
    /// Retention policy for buckets created on demand.
    #[serde(default = "default_bucket_policy")]
    pub bucket_policy: String,
}

fn default_base_url() -> String {
    "https://developer.api.autodesk.com".to_string()
}

fn default_region() -> String {
    "US".to_string()
}

fn default_scope() -> String {
    "data:read data:write data:create bucket:create bucket:read".to_string()
}

fn default_viewer_scope() -> String {
    "viewables:read".to_string()
}

fn default_timeout() -> u32 {
    120
}

fn default_signed_url_minutes() -> u32 {
    10
}

fn default_bucket_policy() -> String {
    "transient".to_string()
}

/// Sanitized config for API responses (secrets redacted)
#[derive(Debug, Clone, Serialize)]
pub struct SanitizedConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub gateway: SanitizedGatewayConfig,
    pub lifecycle: LifecycleConfig,
}

/// Gateway settings without the client secret.
#[derive(Debug, Clone, Serialize)]
pub struct SanitizedGatewayConfig {
    pub base_url: String,
    pub client_id: String,
    pub client_secret_configured: bool,
    pub region: String,
    pub timeout_secs: u32,
}

impl From<&Config> for SanitizedConfig {
    fn from(config: &Config) -> Self {
        Self {
            server: config.server.clone(),
            database: config.database.clone(),
            gateway: SanitizedGatewayConfig {
                base_url: config.gateway.base_url.clone(),
                client_id: config.gateway.client_id.clone(),
                client_secret_configured: !config.gateway.client_secret.is_empty(),
                region: config.gateway.region.clone(),
                timeout_secs: config.gateway.timeout_secs,
            },
            lifecycle: config.lifecycle.clone(),
        }
    }
}
