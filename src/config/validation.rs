use crate::config::types::{ArchiveConfig, ArchiveKind, Config, HarvesterConfig, UserAgentConfig};
use crate::ConfigError;
use std::collections::HashSet;
use url::Url;

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_harvester_config(&config.harvester)?;
    validate_user_agent_config(&config.user_agent)?;

    if config.output.output_dir.is_empty() {
        return Err(ConfigError::Validation(
            "output-dir cannot be empty".to_string(),
        ));
    }

    if config.archives.is_empty() {
        return Err(ConfigError::Validation(
            "at least one [[archive]] must be configured".to_string(),
        ));
    }

    let mut seen = HashSet::new();
    for archive in &config.archives {
        if !seen.insert(archive.name.as_str()) {
            return Err(ConfigError::Validation(format!(
                "duplicate archive name '{}'",
                archive.name
            )));
        }
        validate_archive(archive)?;
    }

    Ok(())
}

/// Validates harvester limits
fn validate_harvester_config(config: &HarvesterConfig) -> Result<(), ConfigError> {
    if config.concurrency_limit < 1 || config.concurrency_limit > 64 {
        return Err(ConfigError::Validation(format!(
            "concurrency-limit must be between 1 and 64, got {}",
            config.concurrency_limit
        )));
    }

    if config.per_host_min_interval < 100 {
        return Err(ConfigError::Validation(format!(
            "per-host-min-interval must be >= 100ms, got {}ms",
            config.per_host_min_interval
        )));
    }

    if config.max_retries > 10 {
        return Err(ConfigError::Validation(format!(
            "max-retries must be <= 10, got {}",
            config.max_retries
        )));
    }

    if config.backoff_base == 0 {
        return Err(ConfigError::Validation(
            "backoff-base must be > 0".to_string(),
        ));
    }

    if config.backoff_cap < config.backoff_base {
        return Err(ConfigError::Validation(format!(
            "backoff-cap ({}ms) must be >= backoff-base ({}ms)",
            config.backoff_cap, config.backoff_base
        )));
    }

    Ok(())
}

/// Validates user agent configuration
fn validate_user_agent_config(config: &UserAgentConfig) -> Result<(), ConfigError> {
    if config.crawler_name.is_empty() {
        return Err(ConfigError::Validation(
            "crawler-name cannot be empty".to_string(),
        ));
    }

    if !config
        .crawler_name
        .chars()
        .all(|c| c.is_alphanumeric() || c == '-')
    {
        return Err(ConfigError::Validation(format!(
            "crawler-name must contain only alphanumeric characters and hyphens, got '{}'",
            config.crawler_name
        )));
    }

    Url::parse(&config.contact_url)
        .map_err(|e| ConfigError::InvalidUrl(format!("Invalid contact-url: {}", e)))?;

    if !config.contact_email.contains('@') {
        return Err(ConfigError::Validation(format!(
            "contact-email does not look like an email address: '{}'",
            config.contact_email
        )));
    }

    Ok(())
}

/// Validates one archive entry, including its kind-specific requirements
fn validate_archive(archive: &ArchiveConfig) -> Result<(), ConfigError> {
    if archive.name.is_empty() {
        return Err(ConfigError::Validation(
            "archive name cannot be empty".to_string(),
        ));
    }

    Url::parse(&archive.base_url).map_err(|e| {
        ConfigError::InvalidUrl(format!("Invalid base-url for '{}': {}", archive.name, e))
    })?;

    if archive.seed.is_empty() {
        return Err(ConfigError::Validation(format!(
            "archive '{}' must have a seed",
            archive.name
        )));
    }

    match archive.kind {
        ArchiveKind::CsvExport => {
            let columns = archive.columns.as_ref().ok_or_else(|| {
                ConfigError::Validation(format!(
                    "csv-export archive '{}' requires [archive.columns]",
                    archive.name
                ))
            })?;
            if columns.id.is_empty() || columns.image.is_empty() {
                return Err(ConfigError::Validation(format!(
                    "csv-export archive '{}' needs non-empty id and image columns",
                    archive.name
                )));
            }
        }
        ArchiveKind::Gallery => {
            require_selector(&archive.name, "item", &archive.selectors.item)?;
            require_selector(&archive.name, "image-link", &archive.selectors.image_link)?;
            require_http_seed(archive)?;
        }
        ArchiveKind::Blog => {
            require_selector(&archive.name, "post-link", &archive.selectors.post_link)?;
            require_selector(&archive.name, "title", &archive.selectors.title)?;
            require_selector(&archive.name, "body", &archive.selectors.body)?;
            require_selector(&archive.name, "image", &archive.selectors.image)?;
            require_http_seed(archive)?;
        }
    }

    Ok(())
}

fn require_selector(
    archive: &str,
    field: &str,
    value: &Option<String>,
) -> Result<(), ConfigError> {
    match value {
        Some(s) if !s.is_empty() => Ok(()),
        _ => Err(ConfigError::Validation(format!(
            "archive '{}' requires selector '{}'",
            archive, field
        ))),
    }
}

fn require_http_seed(archive: &ArchiveConfig) -> Result<(), ConfigError> {
    let url = Url::parse(&archive.seed).map_err(|e| {
        ConfigError::InvalidUrl(format!("Invalid seed for '{}': {}", archive.name, e))
    })?;
    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(ConfigError::Validation(format!(
            "archive '{}' seed must be an http(s) URL, got scheme '{}'",
            archive.name,
            url.scheme()
        )));
    }
    Ok(())
}
