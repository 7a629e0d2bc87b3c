use thiserror::Error;

/// Errors raised while constructing or validating a model type.
#[derive(Debug, Error)]
pub enum ModelError {
    #[error("missing required field `{0}`")]
    MissingField(&'static str),

    #[error("invalid channel name `{0}`")]
    InvalidChannel(String),

    #[error("quality score {0} outside [0, 1]")]
    ScoreOutOfRange(f64),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}
