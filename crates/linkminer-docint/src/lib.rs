use thiserror::Error;

pub mod client;
pub mod convert;
pub mod enrich;
pub mod search;

// Re-export for convenience
pub use client::{ApiProfile, DocIntClient};
pub use convert::{
    ConversionSettings, ConvertEvent, ConvertSummary, convert_directory, convert_files,
};
pub use enrich::{DEFAULT_MODEL, NlpEnricher};
pub use search::{
    DownloadSummary, SearchEvent, SearchQuery, count_documents, search_and_download,
};

#[derive(Error, Debug)]
pub enum DocIntError {
    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },
    #[error("unexpected response shape: {0}")]
    Shape(String),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("archive error: {0}")]
    Zip(#[from] zip::result::ZipError),
    #[error("missing credentials: {0}")]
    Credentials(String),
    #[error("conversion failed: {0}")]
    Conversion(String),
}
