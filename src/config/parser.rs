use crate::config::types::Config;
use crate::config::validation::{normalize, validate};
use crate::ConfigError;
use sha2::{Digest, Sha256};
use std::path::Path;

/// Loads and parses a configuration file from the given path
///
/// The file is normalised and validated before it is returned.
///
/// # Example
///
/// ```no_run
/// use std::path::Path;
/// use booru_harvester::config::load_config;
///
/// let config = load_config(Path::new("harvester.toml")).unwrap();
/// println!("Workers: {}", config.download.workers);
/// ```
pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    parse_config(&content)
}

/// Parses, normalises and validates configuration from TOML text
pub fn parse_config(content: &str) -> Result<Config, ConfigError> {
    let mut config: Config = toml::from_str(content)?;
    finalize(&mut config)?;
    Ok(config)
}

/// Normalises and validates a configuration assembled in code
///
/// Used after command-line overrides have been applied on top of a file or
/// default configuration.
pub fn finalize(config: &mut Config) -> Result<(), ConfigError> {
    normalize(config);
    validate(config)
}

/// Computes a SHA-256 hash of the configuration file content
///
/// Logged at start-up so a run can be matched to the configuration it used.
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
