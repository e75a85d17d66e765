//! Content stream interpreter that reports figures and images to a [`LayoutDevice`].
//!
//! Only the operators that place images on a page are interpreted: `Do` for
//! XObjects and `BI ... ID ... EI` for inline images. Form XObjects are entered recursively
//! and show up as nested figures.

use std::rc::Rc;

use lopdf::content::Content;
use lopdf::{Dictionary, Document, Object, Stream};
use tracing::{debug, trace, warn};

use super::inline::{split_inline_images, ContentSegment};
use super::layout::{LayoutDevice, LayoutImage};
use super::pages::PageRef;
use super::resources::{ResourceManager, XObject};
use super::Result;
use crate::error::PdfError;

/// Default limit on nested form XObjects.
pub const DEFAULT_MAX_FORM_DEPTH: usize = 16;

/// Runs page content through a [`LayoutDevice`].
pub struct PageInterpreter<'a, D: LayoutDevice> {
    doc: &'a Document,
    resources: &'a mut ResourceManager,
    device: &'a mut D,
    max_form_depth: usize,
    active_forms: Vec<*const Stream>,
    inline_images: usize,
}

impl<'a, D: LayoutDevice> PageInterpreter<'a, D> {
    /// Create an interpreter bound to a resource manager and a device.
    pub fn new(doc: &'a Document, resources: &'a mut ResourceManager, device: &'a mut D) -> Self {
        Self {
            doc,
            resources,
            device,
            max_form_depth: DEFAULT_MAX_FORM_DEPTH,
            active_forms: Vec::new(),
            inline_images: 0,
        }
    }

    /// Limit how deep nested form XObjects are followed.
    pub fn with_max_form_depth(mut self, depth: usize) -> Self {
        self.max_form_depth = depth;
        self
    }

    /// Interpret one page, bracketing the device events with
    /// `begin_page`/`end_page`.
    pub fn process_page(&mut self, page: PageRef) -> Result<()> {
        if self.doc.get_object(page.id).and_then(Object::as_dict).is_err() {
            return Err(PdfError::InvalidPage(page.number));
        }

        let resources = self
            .resources
            .page_resources(self.doc, page.id)
            .unwrap_or_default();
        let content = self
            .doc
            .get_page_content(page.id)
            .map_err(|e| interpret_error(page.number, e))?;

        trace!("Page {}: {} bytes of content", page.number, content.len());

        self.inline_images = 0;
        self.device.begin_page(page.number);
        let result = self.render_contents(page.number, &resources, &content, 0);
        self.device.end_page(page.number);
        result
    }

    fn render_contents(
        &mut self,
        page: u32,
        resources: &Dictionary,
        data: &[u8],
        depth: usize,
    ) -> Result<()> {
        for segment in split_inline_images(data) {
            match segment {
                ContentSegment::Operators(ops) => {
                    let content = Content::decode(ops).map_err(|e| interpret_error(page, e))?;
                    for op in &content.operations {
                        if op.operator == "Do" {
                            if let Some(Object::Name(name)) = op.operands.first() {
                                self.do_xobject(page, resources, name, depth)?;
                            }
                        }
                    }
                }
                ContentSegment::InlineImage(stream) => self.do_inline_image(page, stream),
            }
        }
        Ok(())
    }

    fn do_xobject(
        &mut self,
        page: u32,
        resources: &Dictionary,
        name: &[u8],
        depth: usize,
    ) -> Result<()> {
        let xobj_name = String::from_utf8_lossy(name).into_owned();

        match self.resources.xobject(self.doc, resources, name) {
            Some(XObject::Image(stream)) => {
                trace!("Page {}: image XObject {}", page, xobj_name);
                self.device.begin_figure(&xobj_name);
                self.device.render_image(LayoutImage::new(xobj_name.as_str(), stream));
                self.device.end_figure(&xobj_name);
            }
            Some(XObject::Form(stream)) => {
                if depth >= self.max_form_depth {
                    warn!(
                        "Page {}: form {} nested deeper than {}, skipping",
                        page, xobj_name, self.max_form_depth
                    );
                    return Ok(());
                }
                let key = Rc::as_ptr(&stream);
                if self.active_forms.contains(&key) {
                    warn!("Page {}: form {} draws itself, skipping", page, xobj_name);
                    return Ok(());
                }

                let form_resources = match stream.dict.get(b"Resources") {
                    Ok(obj) => match self.doc.dereference(obj) {
                        Ok((_, Object::Dictionary(dict))) => dict.clone(),
                        _ => resources.clone(),
                    },
                    Err(_) => resources.clone(),
                };
                let data = form_content(&stream).map_err(|e| interpret_error(page, e))?;

                trace!("Page {}: entering form {}", page, xobj_name);
                self.device.begin_figure(&xobj_name);
                self.active_forms.push(key);
                let result = self.render_contents(page, &form_resources, &data, depth + 1);
                self.active_forms.pop();
                self.device.end_figure(&xobj_name);
                result?;
            }
            Some(XObject::Other(subtype)) => {
                debug!(
                    "Page {}: unsupported XObject {} ({:?})",
                    page,
                    xobj_name,
                    subtype.as_deref().map(String::from_utf8_lossy)
                );
            }
            None => debug!("Page {}: undefined XObject {}", page, xobj_name),
        }
        Ok(())
    }

    fn do_inline_image(&mut self, page: u32, stream: Stream) {
        let dict = &stream.dict;
        let sized =
            (dict.has(b"W") || dict.has(b"Width")) && (dict.has(b"H") || dict.has(b"Height"));
        if !sized {
            debug!("Page {}: inline image without dimensions", page);
            return;
        }

        self.inline_images += 1;
        let name = format!("InlineImage{}", self.inline_images);
        trace!("Page {}: {} ({} bytes)", page, name, stream.content.len());
        self.device.begin_figure(&name);
        self.device
            .render_image(LayoutImage::new(name.as_str(), Rc::new(stream)));
        self.device.end_figure(&name);
    }
}

fn form_content(stream: &Stream) -> lopdf::Result<Vec<u8>> {
    if stream.dict.has(b"Filter") {
        stream.decompressed_content()
    } else {
        Ok(stream.content.clone())
    }
}

fn interpret_error(page: u32, err: impl std::fmt::Display) -> PdfError {
    PdfError::Interpret {
        page,
        reason: err.to_string(),
    }
}
