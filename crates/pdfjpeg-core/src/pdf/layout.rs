//! Layout tree produced by the content interpreter, and the aggregator that builds it.

use std::borrow::Cow;
use std::rc::Rc;

use lopdf::{Dictionary, Object, Stream};
use tracing::trace;

use crate::error::ImageDecodeError;

/// Filters whose output is pixel data rather than another byte stream.
/// Data behind these filters is passed through untouched.
const IMAGE_CODEC_FILTERS: &[&[u8]] = &[
    b"DCTDecode",
    b"DCT",
    b"JPXDecode",
    b"JBIG2Decode",
    b"CCITTFaxDecode",
    b"CCF",
];

/// Receives layout events from a [`PageInterpreter`](super::PageInterpreter).
pub trait LayoutDevice {
    /// Start a new page.
    fn begin_page(&mut self, number: u32);

    /// Finish the current page.
    fn end_page(&mut self, number: u32);

    /// Open a figure container.
    fn begin_figure(&mut self, name: &str);

    /// Close the innermost open figure.
    fn end_figure(&mut self, name: &str);

    /// Place an image in the innermost open figure.
    fn render_image(&mut self, image: LayoutImage);
}

/// The layout tree of one page.
#[derive(Debug, Clone, Default)]
pub struct LayoutPage {
    /// Page number (1-indexed).
    pub number: u32,
    /// Top-level layout elements in content order.
    pub items: Vec<LayoutItem>,
}

impl LayoutPage {
    /// Create an empty page.
    pub fn new(number: u32) -> Self {
        Self {
            number,
            items: Vec::new(),
        }
    }

    /// Iterate over the top-level elements.
    pub fn iter(&self) -> std::slice::Iter<'_, LayoutItem> {
        self.items.iter()
    }
}

impl<'a> IntoIterator for &'a LayoutPage {
    type Item = &'a LayoutItem;
    type IntoIter = std::slice::Iter<'a, LayoutItem>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.iter()
    }
}

/// A positioned layout element.
#[derive(Debug, Clone)]
pub enum LayoutItem {
    /// A container that may hold images and nested figures.
    Figure(LayoutFigure),
    /// An image leaf.
    Image(LayoutImage),
}

impl LayoutItem {
    /// The figure, if this item is one.
    pub fn as_figure(&self) -> Option<&LayoutFigure> {
        match self {
            LayoutItem::Figure(figure) => Some(figure),
            LayoutItem::Image(_) => None,
        }
    }

    /// The image, if this item is one.
    pub fn as_image(&self) -> Option<&LayoutImage> {
        match self {
            LayoutItem::Image(image) => Some(image),
            LayoutItem::Figure(_) => None,
        }
    }
}

/// A figure container, created for every XObject and inline image drawn on a page.
#[derive(Debug, Clone, Default)]
pub struct LayoutFigure {
    /// Resource name of the XObject that opened the figure.
    pub name: String,
    /// Child elements in content order.
    pub children: Vec<LayoutItem>,
}

impl LayoutFigure {
    /// Create an empty figure.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            children: Vec::new(),
        }
    }

    /// Iterate over the direct children.
    pub fn iter(&self) -> std::slice::Iter<'_, LayoutItem> {
        self.children.iter()
    }
}

impl<'a> IntoIterator for &'a LayoutFigure {
    type Item = &'a LayoutItem;
    type IntoIter = std::slice::Iter<'a, LayoutItem>;

    fn into_iter(self) -> Self::IntoIter {
        self.children.iter()
    }
}

/// An image element backed by a PDF image stream.
#[derive(Debug, Clone)]
pub struct LayoutImage {
    /// Resource name of the image.
    pub name: String,
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
    /// Bits per color component, if declared.
    pub bits_per_component: Option<u8>,
    stream: Rc<Stream>,
}

impl LayoutImage {
    /// Wrap an image stream. Dimensions are read from `/Width` and `/Height`
    /// or the inline-image abbreviations `/W` and `/H`.
    pub fn new(name: impl Into<String>, stream: Rc<Stream>) -> Self {
        let dict = &stream.dict;
        let width = dict_int(dict, b"Width", b"W").unwrap_or(0).max(0) as u32;
        let height = dict_int(dict, b"Height", b"H").unwrap_or(0).max(0) as u32;
        let bits_per_component = dict_int(dict, b"BitsPerComponent", b"BPC").map(|b| b as u8);

        Self {
            name: name.into(),
            width,
            height,
            bits_per_component,
            stream,
        }
    }

    /// The underlying stream object.
    pub fn stream(&self) -> &Stream {
        &self.stream
    }

    /// Filter names in decoding order.
    pub fn filters(&self) -> Vec<&[u8]> {
        let dict = &self.stream.dict;
        match dict.get(b"Filter").or_else(|_| dict.get(b"F")) {
            Ok(Object::Name(name)) => vec![name.as_slice()],
            Ok(Object::Array(arr)) => arr.iter().filter_map(|o| o.as_name().ok()).collect(),
            _ => Vec::new(),
        }
    }

    /// Stream bytes as stored in the document.
    pub fn raw_data(&self) -> &[u8] {
        &self.stream.content
    }

    /// Stream bytes with general-purpose filters undone.
    ///
    /// Filters up to the first image codec filter are applied; codec data
    /// (JPEG, JPEG 2000, JBIG2, CCITT) is returned as found behind them.
    pub fn data(&self) -> Result<Vec<u8>, ImageDecodeError> {
        let filters = self.filters();
        let general: Vec<&[u8]> = filters
            .iter()
            .take_while(|f| !IMAGE_CODEC_FILTERS.contains(*f))
            .copied()
            .collect();

        if general.is_empty() {
            return Ok(self.stream.content.clone());
        }

        let mut dict = self.stream.dict.clone();
        dict.remove(b"F");
        dict.remove(b"Subtype");
        dict.set(
            "Filter",
            Object::Array(
                general
                    .iter()
                    .map(|f| Object::Name(filter_name(f).to_vec()))
                    .collect(),
            ),
        );

        Stream::new(dict, self.stream.content.clone())
            .decompressed_content()
            .map_err(|e| ImageDecodeError {
                name: self.name.clone(),
                reason: e.to_string(),
            })
    }

    /// Decoded bytes, or the stored bytes when decoding fails.
    pub fn payload(&self) -> Cow<'_, [u8]> {
        match self.data() {
            Ok(data) => Cow::Owned(data),
            Err(e) => {
                trace!("{}, using raw stream data", e);
                Cow::Borrowed(self.raw_data())
            }
        }
    }
}

/// Full name of an inline-image filter abbreviation.
fn filter_name(name: &[u8]) -> &[u8] {
    match name {
        b"Fl" => b"FlateDecode",
        b"LZW" => b"LZWDecode",
        b"A85" => b"ASCII85Decode",
        b"AHx" => b"ASCIIHexDecode",
        b"RL" => b"RunLengthDecode",
        other => other,
    }
}

fn dict_int(dict: &Dictionary, key: &[u8], abbreviation: &[u8]) -> Option<i64> {
    dict.get(key)
        .or_else(|_| dict.get(abbreviation))
        .and_then(Object::as_i64)
        .ok()
}

/// Collects layout events into a [`LayoutPage`] per page.
#[derive(Debug, Default)]
pub struct PageAggregator {
    stack: Vec<LayoutFigure>,
    current: Option<LayoutPage>,
    result: Option<LayoutPage>,
}

impl PageAggregator {
    /// Create an aggregator with no result.
    pub fn new() -> Self {
        Self::default()
    }

    /// The layout of the most recently finished page.
    pub fn result(&self) -> Option<&LayoutPage> {
        self.result.as_ref()
    }

    /// Take the layout of the most recently finished page.
    pub fn take_result(&mut self) -> Option<LayoutPage> {
        self.result.take()
    }

    fn push_item(&mut self, item: LayoutItem) {
        if let Some(figure) = self.stack.last_mut() {
            figure.children.push(item);
        } else if let Some(page) = self.current.as_mut() {
            page.items.push(item);
        } else {
            trace!("Dropping layout item rendered outside a page");
        }
    }
}

impl LayoutDevice for PageAggregator {
    fn begin_page(&mut self, number: u32) {
        self.stack.clear();
        self.result = None;
        self.current = Some(LayoutPage::new(number));
    }

    fn end_page(&mut self, _number: u32) {
        while let Some(figure) = self.stack.pop() {
            self.push_item(LayoutItem::Figure(figure));
        }
        self.result = self.current.take();
    }

    fn begin_figure(&mut self, name: &str) {
        self.stack.push(LayoutFigure::new(name));
    }

    fn end_figure(&mut self, _name: &str) {
        if let Some(figure) = self.stack.pop() {
            self.push_item(LayoutItem::Figure(figure));
        }
    }

    fn render_image(&mut self, image: LayoutImage) {
        self.push_item(LayoutItem::Image(image));
    }
}
