use thiserror::Error;

#[derive(Error, Debug)]
pub enum MarkError {
    #[error("Failed to parse PDF: {0}")]
    ParseError(String),

    #[error("PDF operation failed: {0}")]
    OperationError(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to rasterize mark: {0}")]
    Raster(String),

    #[error("Invalid image data: {0}")]
    Image(String),

    #[error("Invalid configuration: {0}")]
    Config(String),
}

impl From<lopdf::Error> for MarkError {
    fn from(e: lopdf::Error) -> Self {
        MarkError::OperationError(e.to_string())
    }
}

impl From<serde_json::Error> for MarkError {
    fn from(e: serde_json::Error) -> Self {
        MarkError::SerializationError(e.to_string())
    }
}
