use thiserror::Error;

#[derive(Debug, Error)]
pub enum StagehandError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Event dispatch error: {0}")]
    Dispatch(String),

    #[error("Graph error: {0}")]
    Graph(String),

    #[error("Endpoint error ({factory}): {reason}")]
    Endpoint { factory: String, reason: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl StagehandError {
    /// Short error code string used in logs and diagnostics.
    pub fn code(&self) -> &'static str {
        match self {
            StagehandError::Config(_) => "CONFIG_ERROR",
            StagehandError::Dispatch(_) => "DISPATCH_ERROR",
            StagehandError::Graph(_) => "GRAPH_ERROR",
            StagehandError::Endpoint { .. } => "ENDPOINT_ERROR",
            StagehandError::Io(_) => "IO_ERROR",
            StagehandError::Internal(_) => "INTERNAL_ERROR",
        }
    }
}

pub type Result<T> = std::result::Result<T, StagehandError>;
