//! Error types for the support agent orchestrator

use thiserror::Error;

/// Result type alias for orchestrator operations
pub type Result<T> = std::result::Result<T, OrchestrationError>;

#[derive(Error, Debug)]
pub enum OrchestrationError {

    // =============================
    // Input Validation
    // =============================

    #[error("Invalid message: {0}")]
    InvalidMessage(String),

    // =============================
    // Core Pipeline Errors
    // =============================

    #[error("Taxonomy error: {0}")]
    TaxonomyError(String),

    #[error("Detection error: {0}")]
    DetectionError(String),

    #[error("Session store error: {0}")]
    StoreError(String),

    #[error("Session not found: {0}")]
    SessionNotFound(String),

    #[error("Invalid session data: {0}")]
    InvalidSessionData(String),

    // =============================
    // External Library Conversions
    // =============================

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("Pattern error: {0}")]
    PatternError(#[from] regex::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}
