//! Core library for extracting embedded JPEG images from PDF documents.
//!
//! This crate provides:
//! - Document loading and page enumeration with fallback strategies
//! - A content interpreter that builds a per-page layout tree of figures and images
//! - A lazy iterator over embedded JPEG payloads
//! - Configuration models shared with the CLI

pub mod error;
pub mod models;
pub mod pdf;

pub use error::{ConfigError, ImageDecodeError, LoadError, PdfError, PdfJpegError, Result};
pub use models::config::{OutputConfig, PdfConfig, PdfJpegConfig};
pub use pdf::{
    extract_first_jpeg, extract_first_jpeg_with, extract_jpegs, is_jpeg, JpegExtractor,
    JPEG_SIGNATURE,
};
