//! Error types shared by the Lote crates

use thiserror::Error;

/// Result type alias for Lote operations
pub type Result<T> = std::result::Result<T, LoteError>;

/// Main error type for shared Lote types
#[derive(Error, Debug)]
pub enum LoteError {
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid date '{0}'. Use YYYY-MM-DD")]
    InvalidDate(String),

    #[error("Invalid status '{0}'. Expected 'aprovado' or 'reprovado'")]
    InvalidStatus(String),
}
