use crate::config::types::{Config, CrawlerConfig, OutputConfig, SiteConfig};
use crate::ConfigError;
use url::Url;

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_crawler_config(&config.crawler)?;
    validate_site_config(&config.site)?;
    validate_output_config(&config.output)?;
    Ok(())
}

/// Validates crawl window, politeness and retry settings
fn validate_crawler_config(config: &CrawlerConfig) -> Result<(), ConfigError> {
    if let Some(end) = config.end_date {
        if end < config.start_date {
            return Err(ConfigError::InvalidDate(format!(
                "end-date {} is before start-date {}",
                end, config.start_date
            )));
        }
    }

    if !(config.request_delay_seconds > 0.0) || !config.request_delay_seconds.is_finite() {
        return Err(ConfigError::Validation(format!(
            "request-delay-seconds must be a positive number, got {}",
            config.request_delay_seconds
        )));
    }

    if config.timeout_seconds < 1 {
        return Err(ConfigError::Validation(
            "timeout-seconds must be >= 1".to_string(),
        ));
    }

    if config.max_comment_depth < 1 {
        return Err(ConfigError::Validation(
            "max-comment-depth must be >= 1".to_string(),
        ));
    }

    if config.worker_count < 1 || config.worker_count > 8 {
        return Err(ConfigError::Validation(format!(
            "worker-count must be between 1 and 8, got {}",
            config.worker_count
        )));
    }

    if !config.backoff_cap_seconds.is_finite()
        || config.backoff_cap_seconds < config.request_delay_seconds
    {
        return Err(ConfigError::Validation(format!(
            "backoff-cap-seconds ({}) must be >= request-delay-seconds ({})",
            config.backoff_cap_seconds, config.request_delay_seconds
        )));
    }

    if config.claim_batch_size < 1 {
        return Err(ConfigError::Validation(
            "claim-batch-size must be >= 1".to_string(),
        ));
    }

    if config.max_archive_pages < 1 {
        return Err(ConfigError::Validation(
            "max-archive-pages must be >= 1".to_string(),
        ));
    }

    Ok(())
}

/// Validates the target site settings
fn validate_site_config(config: &SiteConfig) -> Result<(), ConfigError> {
    let url = Url::parse(&config.base_url)
        .map_err(|e| ConfigError::InvalidUrl(format!("Invalid base-url: {}", e)))?;

    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(ConfigError::InvalidUrl(format!(
            "base-url must use http or https, got '{}'",
            url.scheme()
        )));
    }

    if url.host_str().is_none() {
        return Err(ConfigError::InvalidUrl(format!(
            "base-url '{}' has no host",
            config.base_url
        )));
    }

    if config.user_agent.trim().is_empty() {
        return Err(ConfigError::Validation(
            "user-agent cannot be empty".to_string(),
        ));
    }

    Ok(())
}

/// Validates output configuration
fn validate_output_config(config: &OutputConfig) -> Result<(), ConfigError> {
    if config.database_path.is_empty() {
        return Err(ConfigError::Validation(
            "database-path cannot be empty".to_string(),
        ));
    }

    if config.corpus_dir.is_empty() {
        return Err(ConfigError::Validation(
            "corpus-dir cannot be empty".to_string(),
        ));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn crawler_config() -> CrawlerConfig {
        CrawlerConfig {
            start_date: NaiveDate::from_ymd_opt(2017, 1, 20).unwrap(),
            end_date: Some(NaiveDate::from_ymd_opt(2017, 2, 28).unwrap()),
            request_delay_seconds: 2.0,
            max_retries: 5,
            timeout_seconds: 30,
            max_comment_depth: 32,
            worker_count: 1,
            backoff_cap_seconds: 60.0,
            claim_batch_size: 50,
            max_archive_pages: 50,
        }
    }

    #[test]
    fn test_valid_crawler_config() {
        assert!(validate_crawler_config(&crawler_config()).is_ok());
    }

    #[test]
    fn test_end_before_start_rejected() {
        let mut config = crawler_config();
        config.end_date = Some(NaiveDate::from_ymd_opt(2016, 12, 31).unwrap());
        assert!(matches!(
            validate_crawler_config(&config),
            Err(ConfigError::InvalidDate(_))
        ));
    }

    #[test]
    fn test_zero_delay_rejected() {
        let mut config = crawler_config();
        config.request_delay_seconds = 0.0;
        assert!(validate_crawler_config(&config).is_err());
    }

    #[test]
    fn test_backoff_cap_below_delay_rejected() {
        let mut config = crawler_config();
        config.backoff_cap_seconds = 1.0;
        assert!(validate_crawler_config(&config).is_err());
    }

    #[test]
    fn test_site_config() {
        let ok = SiteConfig {
            base_url: "https://wattsupwiththat.com".to_string(),
            user_agent: "bot".to_string(),
        };
        assert!(validate_site_config(&ok).is_ok());

        let bad_scheme = SiteConfig {
            base_url: "ftp://example.com".to_string(),
            user_agent: "bot".to_string(),
        };
        assert!(validate_site_config(&bad_scheme).is_err());

        let no_agent = SiteConfig {
            base_url: "https://example.com".to_string(),
            user_agent: "  ".to_string(),
        };
        assert!(validate_site_config(&no_agent).is_err());
    }
}
