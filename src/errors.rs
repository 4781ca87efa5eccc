use thiserror::Error;

pub type Result<T> = std::result::Result<T, AppError>;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("URL parse error: {0}")]
    UrlParse(#[from] url::ParseError),

    #[error("Display target not found: #{0}")]
    TargetNotFound(String),

    #[error("WebSocket error: {0}")]
    Connection(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("Malformed payload: {0}")]
    MalformedPayload(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
