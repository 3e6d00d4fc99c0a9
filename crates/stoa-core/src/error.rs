use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoaError {
    #[error("gateway error {status}: {body}")]
    Gateway { status: u16, body: String },

    #[error("transport error: {0}")]
    Transport(String),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("config error: {0}")]
    Config(String),
}

pub type StoaResult<T> = Result<T, StoaError>;
