//! Lazy extraction of embedded JPEG images.

use std::collections::VecDeque;
use std::fs::File;
use std::io::{BufReader, Read};
use std::iter::FusedIterator;
use std::path::Path;

use lopdf::Document;
use tracing::{debug, trace};

use super::document::{open_document_with, DirectLoader, DocumentLoader, InitializingLoader};
use super::interpreter::PageInterpreter;
use super::layout::{LayoutItem, LayoutPage, PageAggregator};
use super::pages::{enumerate_pages_with, CatalogPages, PageEnumerator, PageRef, PageTreeWalker};
use super::resources::ResourceManager;
use super::Result;
use crate::models::config::PdfConfig;

/// JPEG start-of-image marker followed by the start of an APP0 (JFIF) marker.
pub const JPEG_SIGNATURE: [u8; 4] = [0xFF, 0xD8, 0xFF, 0xE0];

/// Whether `data` starts with [`JPEG_SIGNATURE`].
pub fn is_jpeg(data: &[u8]) -> bool {
    data.starts_with(&JPEG_SIGNATURE)
}

/// Iterator over the JPEG payloads of a PDF, in page order.
///
/// Pages are interpreted only when the iterator is advanced past the
/// payloads already found. After an error the iterator is exhausted.
pub struct JpegExtractor {
    document: Document,
    resources: ResourceManager,
    device: PageAggregator,
    pages: std::vec::IntoIter<PageRef>,
    pending: VecDeque<Vec<u8>>,
    max_form_depth: usize,
    page_count: usize,
    pages_interpreted: usize,
    done: bool,
}

impl JpegExtractor {
    /// Read a PDF from `reader` and prepare extraction.
    pub fn from_reader<R: Read>(mut reader: R, config: &PdfConfig) -> Result<Self> {
        let mut data = Vec::new();
        reader.read_to_end(&mut data)?;
        Self::from_bytes(&data, config)
    }

    /// Open a PDF file and prepare extraction.
    pub fn open(path: &Path, config: &PdfConfig) -> crate::Result<Self> {
        let file = File::open(path)?;
        Ok(Self::from_reader(BufReader::new(file), config)?)
    }

    /// Prepare extraction from PDF bytes.
    pub fn from_bytes(data: &[u8], config: &PdfConfig) -> Result<Self> {
        let initializing = InitializingLoader::new(config.password.as_str());
        Self::with_strategies(
            data,
            &[&initializing, &DirectLoader],
            &[&CatalogPages, &PageTreeWalker],
            config,
        )
    }

    /// Prepare extraction with explicit document loaders and page enumerators,
    /// each tried in order.
    pub fn with_strategies(
        data: &[u8],
        loaders: &[&dyn DocumentLoader],
        enumerators: &[&dyn PageEnumerator],
        config: &PdfConfig,
    ) -> Result<Self> {
        let document = open_document_with(data, loaders)?;
        let mut pages = enumerate_pages_with(&document, enumerators)?;

        if config.max_pages > 0 && pages.len() > config.max_pages {
            debug!("Limiting scan to {} of {} pages", config.max_pages, pages.len());
            pages.truncate(config.max_pages);
        }

        debug!("Scanning {} pages for JPEG images", pages.len());

        Ok(Self {
            document,
            resources: ResourceManager::new(),
            device: PageAggregator::new(),
            page_count: pages.len(),
            pages: pages.into_iter(),
            pending: VecDeque::new(),
            max_form_depth: config.max_form_depth,
            pages_interpreted: 0,
            done: false,
        })
    }

    /// Number of pages that will be scanned.
    pub fn page_count(&self) -> usize {
        self.page_count
    }

    /// Number of pages handed to the interpreter so far.
    pub fn pages_interpreted(&self) -> usize {
        self.pages_interpreted
    }

    fn process_page(&mut self, page: PageRef) -> Result<()> {
        self.pages_interpreted += 1;

        PageInterpreter::new(&self.document, &mut self.resources, &mut self.device)
            .with_max_form_depth(self.max_form_depth)
            .process_page(page)?;

        if let Some(layout) = self.device.take_result() {
            let found = jpegs_in_layout(&layout);
            debug!("Page {}: {} JPEG images", page.number, found.len());
            self.pending.extend(found);
        }
        Ok(())
    }
}

/// Payloads of images directly inside top-level figures that carry the JPEG signature.
fn jpegs_in_layout(layout: &LayoutPage) -> Vec<Vec<u8>> {
    let mut found = Vec::new();

    for figure in layout.iter().filter_map(LayoutItem::as_figure) {
        for image in figure.iter().filter_map(LayoutItem::as_image) {
            let payload = image.payload();
            if is_jpeg(&payload) {
                found.push(payload.into_owned());
            } else {
                trace!(
                    "Page {}: image {} is not a JPEG ({} bytes)",
                    layout.number,
                    image.name,
                    payload.len()
                );
            }
        }
    }
    found
}

impl Iterator for JpegExtractor {
    type Item = Result<Vec<u8>>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(jpeg) = self.pending.pop_front() {
                return Some(Ok(jpeg));
            }
            if self.done {
                return None;
            }

            let Some(page) = self.pages.next() else {
                self.done = true;
                return None;
            };

            if let Err(e) = self.process_page(page) {
                self.done = true;
                return Some(Err(e));
            }
        }
    }
}

impl FusedIterator for JpegExtractor {}

/// Extract all JPEG images from a PDF with default settings.
pub fn extract_jpegs<R: Read>(reader: R) -> Result<JpegExtractor> {
    JpegExtractor::from_reader(reader, &PdfConfig::default())
}

/// Extract the first JPEG image from a PDF with default settings.
pub fn extract_first_jpeg<R: Read>(reader: R) -> Result<Option<Vec<u8>>> {
    extract_first_jpeg_with(reader, &PdfConfig::default())
}

/// Extract the first JPEG image from a PDF. Pages after the one holding the
/// match are never interpreted.
pub fn extract_first_jpeg_with<R: Read>(reader: R, config: &PdfConfig) -> Result<Option<Vec<u8>>> {
    JpegExtractor::from_reader(reader, config)?.next().transpose()
}
