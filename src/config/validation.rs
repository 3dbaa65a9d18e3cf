use crate::config::types::{ApiConfig, Config, CrawlerConfig, OutputConfig, RateLimitWindow};
use crate::ConfigError;
use url::Url;

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_api_config(&config.api)?;
    validate_rate_limits(&config.rate_limits)?;
    validate_crawler_config(&config.crawler)?;
    validate_output_config(&config.output)?;
    Ok(())
}

/// Validates remote API settings
fn validate_api_config(config: &ApiConfig) -> Result<(), ConfigError> {
    let url = Url::parse(&config.base_url)
        .map_err(|e| ConfigError::InvalidUrl(format!("Invalid base-url: {}", e)))?;

    if url.scheme() != "https" && url.scheme() != "http" {
        return Err(ConfigError::InvalidUrl(format!(
            "base-url must use http or https, got '{}'",
            url.scheme()
        )));
    }

    if config.api_key.trim().is_empty() {
        return Err(ConfigError::Validation(
            "api-key cannot be empty (set it in the file or via MATCH_SPIDER_API_KEY)"
                .to_string(),
        ));
    }

    if config.request_timeout_secs == 0 {
        return Err(ConfigError::Validation(
            "request-timeout-secs must be >= 1".to_string(),
        ));
    }

    Ok(())
}

/// Validates the rate-limit windows
fn validate_rate_limits(windows: &[RateLimitWindow]) -> Result<(), ConfigError> {
    if windows.is_empty() {
        return Err(ConfigError::Validation(
            "at least one [[rate-limit]] window is required".to_string(),
        ));
    }

    for window in windows {
        if window.max_calls < 1 {
            return Err(ConfigError::Validation(format!(
                "rate-limit max-calls must be >= 1, got {}",
                window.max_calls
            )));
        }
        if window.window_secs < 1 {
            return Err(ConfigError::Validation(format!(
                "rate-limit window-secs must be >= 1, got {}",
                window.window_secs
            )));
        }
    }

    Ok(())
}

/// Validates crawler configuration
fn validate_crawler_config(config: &CrawlerConfig) -> Result<(), ConfigError> {
    if config.degree < 1 {
        return Err(ConfigError::Validation(format!(
            "degree must be >= 1, got {}",
            config.degree
        )));
    }

    if config.workers > 256 {
        return Err(ConfigError::Validation(format!(
            "workers must be between 0 and 256, got {}",
            config.workers
        )));
    }

    if config.max_pages < 1 {
        return Err(ConfigError::Validation(format!(
            "max-pages must be >= 1, got {}",
            config.max_pages
        )));
    }

    if config.max_retry_delay_ms < config.retry_delay_ms {
        return Err(ConfigError::Validation(format!(
            "max-retry-delay-ms ({}) must be >= retry-delay-ms ({})",
            config.max_retry_delay_ms, config.retry_delay_ms
        )));
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

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn api_config() -> ApiConfig {
        ApiConfig {
            base_url: "https://na1.api.riotgames.com".to_string(),
            api_key: "RGAPI-test".to_string(),
            queue: None,
            season: None,
            request_timeout_secs: 30,
        }
    }

    #[test]
    fn test_validate_api_config() {
        assert!(validate_api_config(&api_config()).is_ok());

        let mut bad_url = api_config();
        bad_url.base_url = "not a url".to_string();
        assert!(matches!(
            validate_api_config(&bad_url),
            Err(ConfigError::InvalidUrl(_))
        ));

        let mut ftp = api_config();
        ftp.base_url = "ftp://example.com".to_string();
        assert!(validate_api_config(&ftp).is_err());

        let mut no_key = api_config();
        no_key.api_key = "  ".to_string();
        assert!(matches!(
            validate_api_config(&no_key),
            Err(ConfigError::Validation(_))
        ));
    }

    #[test]
    fn test_validate_rate_limits() {
        assert!(validate_rate_limits(&[]).is_err());
        assert!(validate_rate_limits(&[RateLimitWindow {
            max_calls: 100,
            window_secs: 120
        }])
        .is_ok());
        assert!(validate_rate_limits(&[RateLimitWindow {
            max_calls: 0,
            window_secs: 120
        }])
        .is_err());
        assert!(validate_rate_limits(&[RateLimitWindow {
            max_calls: 10,
            window_secs: 0
        }])
        .is_err());
    }

    #[test]
    fn test_validate_crawler_config() {
        assert!(validate_crawler_config(&CrawlerConfig::default()).is_ok());

        let zero_degree = CrawlerConfig {
            degree: 0,
            ..CrawlerConfig::default()
        };
        assert!(validate_crawler_config(&zero_degree).is_err());

        let too_many_workers = CrawlerConfig {
            workers: 1000,
            ..CrawlerConfig::default()
        };
        assert!(validate_crawler_config(&too_many_workers).is_err());

        let inverted_delays = CrawlerConfig {
            retry_delay_ms: 5000,
            max_retry_delay_ms: 1000,
            ..CrawlerConfig::default()
        };
        assert!(validate_crawler_config(&inverted_delays).is_err());
    }
}
