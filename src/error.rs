use thiserror::Error;

/// Error type for stamping and extraction operations
#[derive(Error, Debug)]
pub enum StampError {
    #[error("Quality must be between 1 and 100")]
    InvalidQuality,

    #[error("Failed to load PDF: {0}")]
    Load(String),

    #[error("Failed to save PDF: {0}")]
    Save(String),

    #[error("Unsupported or corrupt image: {0}")]
    Image(String),

    #[error("Invalid overlay layout: {0}")]
    Layout(String),

    #[error("Invalid page selection: {0}")]
    InvalidSelection(String),

    #[error("Processing error: {0}")]
    Processing(String),
}
