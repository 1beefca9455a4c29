//! Configuration validation rules.

use super::schema::Config;

const MAX_TOKEN_DELAY_MS: u64 = 10_000;
const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// Validate configuration and return aggregated validation errors.
pub fn validate_config(config: &Config) -> crate::Result<()> {
    let mut errors = Vec::new();

    if config.storage.dir.trim().is_empty() {
        errors.push("storage.dir must not be empty".to_string());
    }
    if config.storage.key.trim().is_empty() {
        errors.push("storage.key must not be empty".to_string());
    }

    if config.producer.token_delay_ms > MAX_TOKEN_DELAY_MS {
        errors.push(format!(
            "producer.token_delay_ms must be <= {}",
            MAX_TOKEN_DELAY_MS
        ));
    }

    let level = config.logging.level.to_ascii_lowercase();
    if !LOG_LEVELS.contains(&level.as_str()) {
        errors.push(format!(
            "logging.level must be one of {}",
            LOG_LEVELS.join(", ")
        ));
    }
    let format = config.logging.format.to_ascii_lowercase();
    if format != "text" && format != "json" {
        errors.push("logging.format must be text or json".to_string());
    }
    if config.logging.dir.trim().is_empty() {
        errors.push("logging.dir must not be empty".to_string());
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(crate::Error::Validation(errors.join("; ")))
    }
}
