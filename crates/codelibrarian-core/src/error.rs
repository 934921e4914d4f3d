/// Unified error type for codelibrarian.
#[derive(Debug, thiserror::Error)]
pub enum LibrarianError {
    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Embedding error: {0}")]
    Embedding(String),

    #[error("Query rewrite error: {0}")]
    Rewrite(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid symbol kind: {0}")]
    InvalidSymbolKind(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
