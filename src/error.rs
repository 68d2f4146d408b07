use thiserror::Error;

#[derive(Error, Debug)]
pub enum TranslateError {
    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("API error: {0}")]
    Api(String),

    #[error("Malformed response line {line:?}: {reason}")]
    MalformedLine { line: String, reason: String },

    #[error("Malformed stream frame: {0}")]
    MalformedFrame(String),

    #[error("Document error: {0}")]
    Document(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML error: {0}")]
    Toml(String),
}

impl TranslateError {
    pub(crate) fn malformed_line(line: &str, reason: impl Into<String>) -> Self {
        TranslateError::MalformedLine {
            line: line.to_string(),
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, TranslateError>;
