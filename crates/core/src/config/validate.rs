use super::{types::Config, ConfigError};

/// Validate configuration
/// Currently validates:
/// - Gateway section exists (enforced by serde) and carries credentials
/// - Server port is not 0
/// - Bucket key follows the OSS naming rules
/// - At least one output format is requested, each with a view
/// - Signed upload URLs live between 1 and 60 minutes
/// - A derivative role and file extension are configured
pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
    if config.server.port == 0 {
        return Err(ConfigError::ValidationError(
            "server.port cannot be 0".to_string(),
        ));
    }

    if config.gateway.client_id.trim().is_empty() {
        return Err(ConfigError::ValidationError(
            "gateway.client_id must be set".to_string(),
        ));
    }

    if config.gateway.client_secret.trim().is_empty() {
        return Err(ConfigError::ValidationError(
            "gateway.client_secret must be set".to_string(),
        ));
    }

    if !(1..=60).contains(&config.gateway.signed_url_minutes) {
        return Err(ConfigError::ValidationError(format!(
            "gateway.signed_url_minutes must be between 1 and 60, got {}",
            config.gateway.signed_url_minutes
        )));
    }

    if !is_valid_bucket_key(&config.lifecycle.bucket_key) {
        return Err(ConfigError::ValidationError(format!(
            "lifecycle.bucket_key '{}' must be 3-128 characters of [-_.a-z0-9]",
            config.lifecycle.bucket_key
        )));
    }

    if config.lifecycle.output_formats.is_empty() {
        return Err(ConfigError::ValidationError(
            "lifecycle.output_formats must request at least one format".to_string(),
        ));
    }

    if let Some(format) = config
        .lifecycle
        .output_formats
        .iter()
        .find(|f| f.format_type.is_empty() || f.views.is_empty())
    {
        return Err(ConfigError::ValidationError(format!(
            "output format '{}' needs a type and at least one view",
            format.format_type
        )));
    }

    let derivative = &config.lifecycle.derivative;
    if derivative.role.is_empty() || derivative.extension.is_empty() {
        return Err(ConfigError::ValidationError(
            "lifecycle.derivative needs a role and an extension".to_string(),
        ));
    }

    Ok(())
}

fn is_valid_bucket_key(key: &str) -> bool {
    (3..=128).contains(&key.len())
        && key
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || matches!(c, '-' | '_' | '.'))
}
