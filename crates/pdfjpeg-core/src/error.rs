//! Error types for the pdfjpeg-core library.

use thiserror::Error;

/// Main error type for the pdfjpeg library.
#[derive(Error, Debug)]
pub enum PdfJpegError {
    /// PDF processing error.
    #[error("PDF error: {0}")]
    Pdf(#[from] PdfError),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors related to PDF processing.
#[derive(Error, Debug)]
pub enum PdfError {
    /// Failed to read the input stream.
    #[error("failed to read PDF input: {0}")]
    Io(#[from] std::io::Error),

    /// Failed to open/parse the PDF file.
    #[error("failed to parse PDF: {0}")]
    Parse(String),

    /// A document or page protocol is not supported by this document.
    #[error("unsupported by this document: {0}")]
    Incompatible(String),

    /// The PDF is empty or has no pages.
    #[error("PDF has no pages")]
    NoPages,

    /// Invalid page number requested.
    #[error("invalid page number: {0}")]
    InvalidPage(u32),

    /// The content interpreter failed on a page.
    #[error("failed to interpret page {page}: {reason}")]
    Interpret { page: u32, reason: String },
}

/// Outcome of a failed document load attempt.
///
/// `Incompatible` tells the caller that another loader may still succeed;
/// `Pdf` is final.
#[derive(Error, Debug)]
pub enum LoadError {
    /// The loader's protocol does not apply to this document.
    #[error("loader incompatible: {0}")]
    Incompatible(String),

    /// The document could not be loaded.
    #[error(transparent)]
    Pdf(#[from] PdfError),
}

/// Failure of the decoding tier of an image payload.
#[derive(Error, Debug)]
#[error("failed to decode image stream {name}: {reason}")]
pub struct ImageDecodeError {
    /// Resource name of the image.
    pub name: String,
    /// Decoder message.
    pub reason: String,
}

/// Errors related to configuration files.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Failed to read or write the file.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The file is not valid configuration JSON.
    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type for the pdfjpeg library.
pub type Result<T> = std::result::Result<T, PdfJpegError>;
