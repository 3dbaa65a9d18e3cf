use crate::config::types::Config;
use crate::config::validation::validate;
use crate::ConfigError;
use sha2::{Digest, Sha256};
use std::path::Path;

/// Environment variable that overrides `api.api-key`
pub const API_KEY_ENV: &str = "MATCH_SPIDER_API_KEY";

/// Loads and parses a configuration file from the given path
///
/// The API key may be left out of the file and supplied through
/// [`API_KEY_ENV`] instead; the environment wins when both are set.
///
/// # Arguments
///
/// * `path` - Path to the TOML configuration file
///
/// # Returns
///
/// * `Ok(Config)` - Successfully loaded and validated configuration
/// * `Err(ConfigError)` - Failed to load, parse, or validate the configuration
pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    let mut config = parse_config(&content)?;

    if let Ok(key) = std::env::var(API_KEY_ENV) {
        if !key.is_empty() {
            config.api.api_key = key;
        }
    }

    validate(&config)?;

    Ok(config)
}

fn parse_config(content: &str) -> Result<Config, ConfigError> {
    Ok(toml::from_str(content)?)
}

/// Computes a SHA-256 hash of the configuration file content
///
/// Logged at startup so runs can be matched to the configuration they used.
pub fn compute_config_hash(path: &Path) -> Result<String, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    Ok(hex::encode(hasher.finalize()))
}

/// Loads a configuration and returns both the config and its hash
pub fn load_config_with_hash(path: &Path) -> Result<(Config, String), ConfigError> {
    let config = load_config(path)?;
    let hash = compute_config_hash(path)?;
    Ok((config, hash))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn create_temp_config(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file.flush().unwrap();
        file
    }

    const VALID_CONFIG: &str = r#"
[api]
base-url = "https://na1.api.riotgames.com"
api-key = "RGAPI-test"
queue = 420
season = 9

[[rate-limit]]
max-calls = 20
window-secs = 1

[[rate-limit]]
max-calls = 100
window-secs = 120

[crawler]
degree = 2
workers = 4

[output]
database-path = "./spider.db"

[seeds]
accounts = [39016347, 39137330]
summoners = ["HushRaze"]
"#;

    #[test]
    fn test_load_valid_config() {
        let file = create_temp_config(VALID_CONFIG);
        let config = parse_config(VALID_CONFIG).unwrap();
        validate(&config).unwrap();

        assert_eq!(config.api.queue, Some(420));
        assert_eq!(config.api.season, Some(9));
        assert_eq!(config.api.request_timeout_secs, 30);
        assert_eq!(config.rate_limits.len(), 2);
        assert_eq!(config.rate_limits[1].max_calls, 100);
        assert_eq!(config.crawler.degree, 2);
        assert_eq!(config.crawler.workers, 4);
        assert_eq!(config.crawler.max_retries, 3);
        assert_eq!(config.crawler.max_pages, 100);
        assert_eq!(config.seeds.accounts, vec![39016347, 39137330]);
        assert_eq!(config.seeds.summoners, vec!["HushRaze".to_string()]);
        assert!(config.seeds.seed_files.is_empty());

        // Loading from disk goes through the same path
        assert!(compute_config_hash(file.path()).is_ok());
    }

    #[test]
    fn test_load_config_with_invalid_path() {
        let result = load_config(Path::new("/nonexistent/spider.toml"));
        assert!(matches!(result, Err(ConfigError::Io(_))));
    }

    #[test]
    fn test_load_config_with_invalid_toml() {
        let file = create_temp_config("this is not valid TOML {{{");
        let result = load_config(file.path());
        assert!(matches!(result, Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_zero_degree_rejected() {
        let content = VALID_CONFIG.replace("degree = 2", "degree = 0");
        let config = parse_config(&content).unwrap();
        let result = validate(&config);
        assert!(matches!(result, Err(ConfigError::Validation(_))));
    }

    #[test]
    fn test_compute_config_hash() {
        let file = create_temp_config("test content");

        let hash1 = compute_config_hash(file.path()).unwrap();
        let hash2 = compute_config_hash(file.path()).unwrap();

        assert_eq!(hash1, hash2);
        assert_eq!(hash1.len(), 64);
    }

    #[test]
    fn test_different_content_different_hash() {
        let file1 = create_temp_config("content 1");
        let file2 = create_temp_config("content 2");

        let hash1 = compute_config_hash(file1.path()).unwrap();
        let hash2 = compute_config_hash(file2.path()).unwrap();

        assert_ne!(hash1, hash2);
    }
}
