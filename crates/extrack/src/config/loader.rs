use std::path::Path;
use std::str::FromStr;

use crate::config::schema::TrackerConfig;
use crate::error::ConfigError;

const SCHEMA_JSON: &str = include_str!("../../schema/tracker-config-v1.json");

/// Upper bound for any retention window: one year.
pub const MAX_TTL_SECS: u64 = 365 * 24 * 60 * 60;
/// Upper bound for runner delays and timeouts: one day.
pub const MAX_RUNNER_WAIT_SECS: u64 = 24 * 60 * 60;
/// Upper bound for chunk size and overlap.
pub const MAX_CHUNK_PAGES: i32 = 10_000;

pub fn load_config<P: AsRef<Path>>(path: P) -> Result<TrackerConfig, ConfigError> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadFile {
        path: path.to_path_buf(),
        source: e,
    })?;

    load_config_from_str(&content)
}

pub fn load_config_from_str(content: &str) -> Result<TrackerConfig, ConfigError> {
    let json_value: serde_json::Value = serde_json::from_str(content)?;

    validate_schema(&json_value)?;

    let config: TrackerConfig = serde_json::from_value(json_value)?;

    validate_config(&config)?;

    Ok(config)
}

fn validate_schema(json_value: &serde_json::Value) -> Result<(), ConfigError> {
    let schema: serde_json::Value =
        serde_json::from_str(SCHEMA_JSON).map_err(|e| ConfigError::Validation {
            message: format!("Invalid embedded schema JSON: {}", e),
        })?;

    let validator = jsonschema::validator_for(&schema).map_err(|e| ConfigError::Validation {
        message: format!("Failed to compile JSON schema: {}", e),
    })?;

    let error_messages: Vec<String> = validator
        .iter_errors(json_value)
        .map(|e| e.to_string())
        .collect();
    if !error_messages.is_empty() {
        return Err(ConfigError::SchemaValidation {
            errors: error_messages.join("; "),
        });
    }

    Ok(())
}

pub(crate) fn validate_config(config: &TrackerConfig) -> Result<(), ConfigError> {
    if config.version != "1.0" {
        return Err(ConfigError::Validation {
            message: format!("Unsupported config version: {}", config.version),
        });
    }

    let ttl = &config.ttl;
    if ttl.success_secs == 0 || ttl.failure_secs == 0 || ttl.pending_secs == 0 {
        return Err(ConfigError::Validation {
            message: "Job TTLs must be positive".to_string(),
        });
    }
    if ttl.cancel_flag_secs == 0 {
        return Err(ConfigError::Validation {
            message: "Cancellation flag TTL must be positive".to_string(),
        });
    }
    let longest = ttl
        .success_secs
        .max(ttl.failure_secs)
        .max(ttl.pending_secs)
        .max(ttl.cancel_flag_secs);
    if longest > MAX_TTL_SECS {
        return Err(ConfigError::Validation {
            message: format!("TTLs must not exceed {MAX_TTL_SECS}s, got {longest}s"),
        });
    }

    let chunking = &config.chunking;
    if chunking.pages_per_chunk > MAX_CHUNK_PAGES || chunking.overlap_pages > MAX_CHUNK_PAGES {
        return Err(ConfigError::Validation {
            message: format!("chunking values must not exceed {MAX_CHUNK_PAGES} pages"),
        });
    }

    let runner = &config.runner;
    if runner.max_concurrent == 0 {
        return Err(ConfigError::Validation {
            message: "runner.max_concurrent must be at least 1".to_string(),
        });
    }
    if runner.max_retries == 0 {
        return Err(ConfigError::Validation {
            message: "runner.max_retries must be at least 1".to_string(),
        });
    }
    if !(runner.backoff_multiplier >= 1.0) {
        return Err(ConfigError::Validation {
            message: format!(
                "runner.backoff_multiplier must be >= 1.0, got {}",
                runner.backoff_multiplier
            ),
        });
    }
    let longest_wait = runner
        .retry_delay_secs
        .max(runner.max_backoff_secs)
        .max(runner.chunk_timeout_secs);
    if longest_wait > MAX_RUNNER_WAIT_SECS {
        return Err(ConfigError::Validation {
            message: format!(
                "runner delays and timeouts must not exceed {MAX_RUNNER_WAIT_SECS}s, got {longest_wait}s"
            ),
        });
    }
    if !(0.0..=1.0).contains(&runner.max_failure_ratio) {
        return Err(ConfigError::Validation {
            message: format!(
                "runner.max_failure_ratio must be within 0..=1, got {}",
                runner.max_failure_ratio
            ),
        });
    }

    Ok(())
}

impl TrackerConfig {
    /// Applies `EXTRACTION_*` environment overrides, then re-validates.
    pub fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Some(v) = env_value::<u32>("EXTRACTION_MAX_RETRIES")? {
            self.runner.max_retries = v;
        }
        if let Some(v) = env_value::<u64>("EXTRACTION_RETRY_DELAY_SECONDS")? {
            self.runner.retry_delay_secs = v;
        }
        if let Some(v) = env_value::<f64>("EXTRACTION_RETRY_BACKOFF_MULTIPLIER")? {
            self.runner.backoff_multiplier = v;
        }
        if let Some(v) = env_value::<u64>("EXTRACTION_MAX_BACKOFF_SECONDS")? {
            self.runner.max_backoff_secs = v;
        }
        if let Some(v) = env_value::<u64>("EXTRACTION_CHUNK_TIMEOUT_SECONDS")? {
            self.runner.chunk_timeout_secs = v;
        }
        if let Some(v) = env_value::<u64>("EXTRACTION_JOB_TTL_SUCCESS_HOURS")? {
            self.ttl.success_secs = v.saturating_mul(3600);
        }
        if let Some(v) = env_value::<u64>("EXTRACTION_JOB_TTL_FAILURE_HOURS")? {
            self.ttl.failure_secs = v.saturating_mul(3600);
        }

        validate_config(self)
    }
}

/// Reads and parses an environment variable. Unset or blank means `None`.
fn env_value<T: FromStr>(name: &str) -> Result<Option<T>, ConfigError> {
    let raw = match std::env::var(name) {
        Ok(raw) if !raw.trim().is_empty() => raw,
        _ => return Ok(None),
    };

    raw.trim()
        .parse::<T>()
        .map(Some)
        .map_err(|_| ConfigError::InvalidEnv {
            name: name.to_string(),
            value: raw,
        })
}
