//! Application error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Detector error: {0}")]
    Detector(#[from] svp_detector::DetectorError),

    #[error("Gate error: {0}")]
    Gate(#[from] svp_gate::GateError),

    #[error("Feed error: {0}")]
    Feed(#[from] svp_feed::FeedError),

    #[error("Notify error: {0}")]
    Notify(#[from] svp_notify::NotifyError),

    #[error("Telemetry error: {0}")]
    Telemetry(#[from] svp_telemetry::TelemetryError),

    #[error("Persistence error: {0}")]
    Persistence(#[from] svp_persistence::PersistenceError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type AppResult<T> = Result<T, AppError>;
