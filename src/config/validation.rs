use crate::config::types::{
    CrawlerConfig, EngineConfig, OriginOverride, PolitenessConfig, UserAgentConfig,
};
use crate::url::{normalize_url, Origin};
use crate::ConfigError;
use url::Url;

const MAX_WORKERS_LIMIT: usize = 512;

/// Validates the entire configuration
pub fn validate(config: &EngineConfig) -> Result<(), ConfigError> {
    validate_seeds(&config.seeds)?;
    validate_crawler_config(&config.crawler)?;
    validate_politeness_config(&config.politeness)?;
    validate_user_agent_config(&config.user_agent)?;
    Ok(())
}

/// Validates the seed list: at least one seed, every seed an http(s) URL
fn validate_seeds(seeds: &[String]) -> Result<(), ConfigError> {
    if seeds.is_empty() {
        return Err(ConfigError::Validation(
            "At least one seed URL is required".to_string(),
        ));
    }

    for seed in seeds {
        normalize_url(seed)
            .map_err(|e| ConfigError::InvalidUrl(format!("Invalid seed URL '{}': {}", seed, e)))?;
    }

    Ok(())
}

/// Validates crawler configuration
fn validate_crawler_config(config: &CrawlerConfig) -> Result<(), ConfigError> {
    // max_depth >= 0 is always true for u32, so no check needed

    if config.max_workers < 1 || config.max_workers > MAX_WORKERS_LIMIT {
        return Err(ConfigError::Validation(format!(
            "max_workers must be between 1 and {}, got {}",
            MAX_WORKERS_LIMIT, config.max_workers
        )));
    }

    if config.request_timeout_ms == 0 {
        return Err(ConfigError::Validation(
            "request_timeout_ms must be > 0".to_string(),
        ));
    }

    if config.follow_redirects && config.max_redirects == 0 {
        return Err(ConfigError::Validation(
            "max_redirects must be >= 1 when follow_redirects is enabled".to_string(),
        ));
    }

    if config.respect_robots && config.robots_ttl_secs == 0 {
        return Err(ConfigError::Validation(
            "robots_ttl_secs must be > 0 when respect_robots is enabled".to_string(),
        ));
    }

    if config.session_deadline_secs == Some(0) {
        return Err(ConfigError::Validation(
            "session_deadline_secs must be > 0 when set".to_string(),
        ));
    }

    Ok(())
}

/// Validates default pacing parameters and every per-origin override
fn validate_politeness_config(config: &PolitenessConfig) -> Result<(), ConfigError> {
    validate_pacing(
        "politeness",
        config.max_requests_per_second,
        config.in_flight_budget,
        config.backoff_base_ms,
        config.backoff_multiplier,
        config.backoff_ceiling_ms,
    )?;

    for entry in &config.overrides {
        validate_override(entry, config)?;
    }

    Ok(())
}

fn validate_override(entry: &OriginOverride, defaults: &PolitenessConfig) -> Result<(), ConfigError> {
    if Origin::parse(&entry.origin).is_none() {
        return Err(ConfigError::InvalidUrl(format!(
            "Invalid origin in politeness override: '{}'",
            entry.origin
        )));
    }

    validate_pacing(
        &entry.origin,
        entry
            .max_requests_per_second
            .unwrap_or(defaults.max_requests_per_second),
        entry.in_flight_budget.unwrap_or(defaults.in_flight_budget),
        entry.backoff_base_ms.unwrap_or(defaults.backoff_base_ms),
        entry.backoff_multiplier.unwrap_or(defaults.backoff_multiplier),
        entry.backoff_ceiling_ms.unwrap_or(defaults.backoff_ceiling_ms),
    )
}

fn validate_pacing(
    scope: &str,
    max_requests_per_second: f64,
    in_flight_budget: u32,
    backoff_base_ms: u64,
    backoff_multiplier: f64,
    backoff_ceiling_ms: u64,
) -> Result<(), ConfigError> {
    if !max_requests_per_second.is_finite() || max_requests_per_second <= 0.0 {
        return Err(ConfigError::Validation(format!(
            "{}: max_requests_per_second must be > 0, got {}",
            scope, max_requests_per_second
        )));
    }

    if in_flight_budget < 1 {
        return Err(ConfigError::Validation(format!(
            "{}: in_flight_budget must be >= 1",
            scope
        )));
    }

    if !backoff_multiplier.is_finite() || backoff_multiplier < 1.0 {
        return Err(ConfigError::Validation(format!(
            "{}: backoff_multiplier must be >= 1.0, got {}",
            scope, backoff_multiplier
        )));
    }

    if backoff_ceiling_ms < backoff_base_ms {
        return Err(ConfigError::Validation(format!(
            "{}: backoff_ceiling_ms ({}) must be >= backoff_base_ms ({})",
            scope, backoff_ceiling_ms, backoff_base_ms
        )));
    }

    Ok(())
}

/// Validates user agent configuration
fn validate_user_agent_config(config: &UserAgentConfig) -> Result<(), ConfigError> {
    // Validate crawler name: non-empty, alphanumeric + hyphens only
    if config.crawler_name.is_empty() {
        return Err(ConfigError::Validation(
            "crawler_name cannot be empty".to_string(),
        ));
    }

    if !config
        .crawler_name
        .chars()
        .all(|c| c.is_alphanumeric() || c == '-')
    {
        return Err(ConfigError::Validation(format!(
            "crawler_name must contain only alphanumeric characters and hyphens, got '{}'",
            config.crawler_name
        )));
    }

    if config.crawler_version.trim().is_empty() {
        return Err(ConfigError::Validation(
            "crawler_version cannot be empty".to_string(),
        ));
    }

    Url::parse(&config.contact_url)
        .map_err(|e| ConfigError::InvalidUrl(format!("Invalid contact_url: {}", e)))?;

    validate_email(&config.contact_email)?;

    Ok(())
}

/// Basic email validation
fn validate_email(email: &str) -> Result<(), ConfigError> {
    if email.is_empty() {
        return Err(ConfigError::Validation(
            "contact_email cannot be empty".to_string(),
        ));
    }

    // Must contain exactly one @ with text on both sides
    let Some((local, domain)) = email.split_once('@') else {
        return Err(ConfigError::Validation(format!(
            "Invalid email format: '{}'",
            email
        )));
    };

    if local.is_empty() || domain.is_empty() || domain.contains('@') {
        return Err(ConfigError::Validation(format!(
            "Invalid email format: '{}'",
            email
        )));
    }

    if !domain.contains('.') {
        return Err(ConfigError::Validation(format!(
            "Invalid email domain: '{}'",
            email
        )));
    }

    Ok(())
}
