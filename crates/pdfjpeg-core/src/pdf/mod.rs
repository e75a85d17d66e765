//! PDF processing module.
//!
//! Documents are parsed with lopdf. Each page runs through a
//! [`PageInterpreter`] that reports figures and images to a
//! [`PageAggregator`]; [`JpegExtractor`] walks the resulting layout trees.

mod document;
mod extractor;
mod inline;
mod interpreter;
mod layout;
mod pages;
mod resources;

pub use document::{open_document, open_document_with, DirectLoader, DocumentLoader, InitializingLoader};
pub use extractor::{
    extract_first_jpeg, extract_first_jpeg_with, extract_jpegs, is_jpeg, JpegExtractor,
    JPEG_SIGNATURE,
};
pub use interpreter::{PageInterpreter, DEFAULT_MAX_FORM_DEPTH};
pub use layout::{
    LayoutDevice, LayoutFigure, LayoutImage, LayoutItem, LayoutPage, PageAggregator,
};
pub use pages::{
    enumerate_pages, enumerate_pages_with, CatalogPages, PageEnumerator, PageRef, PageTreeWalker,
};
pub use resources::{ResourceManager, XObject};

use crate::error::PdfError;

/// Result type for PDF operations.
pub type Result<T> = std::result::Result<T, PdfError>;
