use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::chunking::ChunkConfig;
use crate::tracker::JobStatus;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackerConfig {
    pub version: String,
    #[serde(default)]
    pub ttl: TtlConfig,
    #[serde(default)]
    pub chunking: ChunkConfig,
    #[serde(default)]
    pub runner: RunnerConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            version: "1.0".to_string(),
            ttl: TtlConfig::default(),
            chunking: ChunkConfig::default(),
            runner: RunnerConfig::default(),
            store: StoreConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

/// Retention windows, in seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TtlConfig {
    #[serde(default = "default_success_secs")]
    pub success_secs: u64,
    #[serde(default = "default_failure_secs")]
    pub failure_secs: u64,
    #[serde(default = "default_pending_secs")]
    pub pending_secs: u64,
    #[serde(default = "default_cancel_flag_secs")]
    pub cancel_flag_secs: u64,
}

fn default_success_secs() -> u64 {
    60 * 60
}

fn default_failure_secs() -> u64 {
    24 * 60 * 60
}

fn default_pending_secs() -> u64 {
    24 * 60 * 60
}

fn default_cancel_flag_secs() -> u64 {
    5 * 60
}

impl Default for TtlConfig {
    fn default() -> Self {
        Self {
            success_secs: default_success_secs(),
            failure_secs: default_failure_secs(),
            pending_secs: default_pending_secs(),
            cancel_flag_secs: default_cancel_flag_secs(),
        }
    }
}

impl TtlConfig {
    pub fn success(&self) -> Duration {
        Duration::from_secs(self.success_secs)
    }

    pub fn failure(&self) -> Duration {
        Duration::from_secs(self.failure_secs)
    }

    pub fn pending(&self) -> Duration {
        Duration::from_secs(self.pending_secs)
    }

    pub fn cancel_flag(&self) -> Duration {
        Duration::from_secs(self.cancel_flag_secs)
    }

    /// The active-job pointer lives as long as a pending job would.
    pub fn active_pointer(&self) -> Duration {
        self.pending()
    }

    /// TTL applied to a job record written with the given status.
    pub fn for_status(&self, status: JobStatus) -> Duration {
        match status {
            JobStatus::Completed => self.success(),
            JobStatus::Failed | JobStatus::Cancelled => self.failure(),
            JobStatus::Pending | JobStatus::Processing => self.pending(),
        }
    }
}

/// Settings for the chunked extraction runner.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunnerConfig {
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent: usize,
    /// Attempts per chunk, including the first.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_retry_delay_secs")]
    pub retry_delay_secs: u64,
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,
    #[serde(default = "default_max_backoff_secs")]
    pub max_backoff_secs: u64,
    #[serde(default = "default_chunk_timeout_secs")]
    pub chunk_timeout_secs: u64,
    /// Fraction of failed chunks above which the job fails.
    #[serde(default = "default_max_failure_ratio")]
    pub max_failure_ratio: f64,
}

fn default_max_concurrent() -> usize {
    num_cpus::get().clamp(1, 4)
}

fn default_max_retries() -> u32 {
    3
}

fn default_retry_delay_secs() -> u64 {
    5
}

fn default_backoff_multiplier() -> f64 {
    1.5
}

fn default_max_backoff_secs() -> u64 {
    30
}

fn default_chunk_timeout_secs() -> u64 {
    180
}

fn default_max_failure_ratio() -> f64 {
    0.5
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            max_concurrent: default_max_concurrent(),
            max_retries: default_max_retries(),
            retry_delay_secs: default_retry_delay_secs(),
            backoff_multiplier: default_backoff_multiplier(),
            max_backoff_secs: default_max_backoff_secs(),
            chunk_timeout_secs: default_chunk_timeout_secs(),
            max_failure_ratio: default_max_failure_ratio(),
        }
    }
}

impl RunnerConfig {
    pub fn chunk_timeout(&self) -> Duration {
        Duration::from_secs(self.chunk_timeout_secs)
    }

    /// Delay before retry number `attempt` (1-based):
    /// `retry_delay * multiplier^(attempt - 1)`, capped at `max_backoff`.
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(64) as i32;
        let secs = self.retry_delay_secs as f64 * self.backoff_multiplier.powi(exponent);
        let capped = secs.min(self.max_backoff_secs as f64).max(0.0);
        Duration::try_from_secs_f64(capped)
            .unwrap_or_else(|_| Duration::from_secs(self.max_backoff_secs))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "backend", rename_all = "lowercase")]
pub enum StoreConfig {
    #[default]
    Memory,
    Sqlite {
        /// Defaults to `~/.extrack/data/jobs.db`.
        #[serde(default)]
        path: Option<PathBuf>,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// `EnvFilter` directive used when `RUST_LOG` is unset.
    #[serde(default = "default_log_filter")]
    pub filter: String,
    #[serde(default)]
    pub json: bool,
}

fn default_log_filter() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: default_log_filter(),
            json: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ttl_policy_by_status() {
        let ttl = TtlConfig::default();
        assert_eq!(ttl.for_status(JobStatus::Completed), Duration::from_secs(3600));
        assert_eq!(ttl.for_status(JobStatus::Failed), Duration::from_secs(86400));
        assert_eq!(ttl.for_status(JobStatus::Cancelled), Duration::from_secs(86400));
        assert_eq!(ttl.for_status(JobStatus::Pending), Duration::from_secs(86400));
        assert_eq!(ttl.for_status(JobStatus::Processing), Duration::from_secs(86400));
        assert_eq!(ttl.cancel_flag(), Duration::from_secs(300));
        assert_eq!(ttl.active_pointer(), ttl.pending());
    }

    #[test]
    fn test_backoff_grows_and_caps() {
        let runner = RunnerConfig {
            retry_delay_secs: 4,
            backoff_multiplier: 2.0,
            max_backoff_secs: 10,
            ..RunnerConfig::default()
        };
        assert_eq!(runner.backoff_for(1), Duration::from_secs(4));
        assert_eq!(runner.backoff_for(2), Duration::from_secs(8));
        assert_eq!(runner.backoff_for(3), Duration::from_secs(10));
        assert_eq!(runner.backoff_for(30), Duration::from_secs(10));
    }

    #[test]
    fn test_backoff_with_unbounded_cap() {
        let runner = RunnerConfig {
            retry_delay_secs: u64::MAX,
            backoff_multiplier: 1.0e300,
            max_backoff_secs: u64::MAX,
            ..RunnerConfig::default()
        };
        assert_eq!(runner.backoff_for(5), Duration::from_secs(u64::MAX));
    }

    #[test]
    fn test_default_concurrency_bounds() {
        let runner = RunnerConfig::default();
        assert!(runner.max_concurrent >= 1 && runner.max_concurrent <= 4);
    }

    #[test]
    fn test_store_config_tagging() {
        let memory: StoreConfig = serde_json::from_str(r#"{"backend": "memory"}"#).unwrap();
        assert_eq!(memory, StoreConfig::Memory);

        let sqlite: StoreConfig =
            serde_json::from_str(r#"{"backend": "sqlite", "path": "/tmp/jobs.db"}"#).unwrap();
        assert_eq!(
            sqlite,
            StoreConfig::Sqlite {
                path: Some(PathBuf::from("/tmp/jobs.db"))
            }
        );
    }
}
