use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ExtrackError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Tracker error: {0}")]
    Tracker(#[from] TrackerError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Pipeline error: {0}")]
    Pipeline(#[from] crate::pipeline::PipelineError),

    #[error("Database error: {0}")]
    Database(#[from] crate::db::DatabaseError),

    #[error("Logging setup failed: {0}")]
    Logging(#[from] crate::logging::LoggingError),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config JSON: {0}")]
    ParseJson(#[from] serde_json::Error),

    #[error("Config validation failed: {message}")]
    Validation { message: String },

    #[error("Schema validation failed: {errors}")]
    SchemaValidation { errors: String },

    #[error("Invalid value '{value}' for environment variable {name}")]
    InvalidEnv { name: String, value: String },
}

/// Failure of an underlying key-value operation.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Failed to serialize record: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Database failure: {0}")]
    Database(#[from] crate::db::DatabaseError),

    #[error("Store backend failure: {0}")]
    Backend(String),
}

#[derive(Error, Debug)]
pub enum TrackerError {
    /// The job id is unknown or its record expired.
    #[error("Job not found or expired: {0}")]
    NotFound(String),

    /// The owner already has a non-terminal job.
    #[error("Owner already has an active extraction job: {0}")]
    AlreadyActive(String),

    #[error("Job store failure: {0}")]
    Store(#[from] StoreError),
}

pub type Result<T> = std::result::Result<T, ExtrackError>;
