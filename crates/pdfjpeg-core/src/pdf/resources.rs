//! Resource lookup for pages and form XObjects.

use std::collections::HashMap;
use std::rc::Rc;

use lopdf::{Dictionary, Document, Object, ObjectId, Stream};
use tracing::trace;

/// Page tree nodes visited before giving up on `/Parent` inheritance.
const MAX_INHERITANCE_DEPTH: usize = 64;

/// An XObject resolved from a resource dictionary.
#[derive(Debug, Clone)]
pub enum XObject {
    /// An image XObject with `/Width` and `/Height`.
    Image(Rc<Stream>),
    /// A form XObject with a `/BBox`.
    Form(Rc<Stream>),
    /// Anything else, with its subtype if one was declared.
    Other(Option<Vec<u8>>),
}

/// Resolves page resources and caches XObjects by object id.
#[derive(Debug, Default)]
pub struct ResourceManager {
    xobjects: HashMap<ObjectId, XObject>,
}

impl ResourceManager {
    /// Create a resource manager with an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of cached XObjects.
    pub fn cached(&self) -> usize {
        self.xobjects.len()
    }

    /// Get the resources dictionary for a page, handling inheritance.
    pub fn page_resources(&self, doc: &Document, page_id: ObjectId) -> Option<Dictionary> {
        self.inherited_resources(doc, page_id, 0)
    }

    fn inherited_resources(
        &self,
        doc: &Document,
        node_id: ObjectId,
        depth: usize,
    ) -> Option<Dictionary> {
        if depth >= MAX_INHERITANCE_DEPTH {
            trace!("Resource inheritance deeper than {} levels", MAX_INHERITANCE_DEPTH);
            return None;
        }

        let dict = doc.get_object(node_id).and_then(Object::as_dict).ok()?;

        if let Ok(resources) = dict.get(b"Resources") {
            if let Ok((_, Object::Dictionary(res_dict))) = doc.dereference(resources) {
                return Some(res_dict.clone());
            }
        }

        // Continue up the tree
        if let Ok(Object::Reference(parent_id)) = dict.get(b"Parent") {
            return self.inherited_resources(doc, *parent_id, depth + 1);
        }
        None
    }

    /// Look up `/XObject /<name>` in a resources dictionary.
    pub fn xobject(
        &mut self,
        doc: &Document,
        resources: &Dictionary,
        name: &[u8],
    ) -> Option<XObject> {
        let xobjects = resources.get(b"XObject").ok()?;
        let xobj_dict = match doc.dereference(xobjects) {
            Ok((_, Object::Dictionary(dict))) => dict,
            _ => return None,
        };

        match xobj_dict.get(name).ok()? {
            Object::Reference(id) => {
                if let Some(xobj) = self.xobjects.get(id) {
                    return Some(xobj.clone());
                }
                let stream = doc.get_object(*id).and_then(Object::as_stream).ok()?;
                let xobj = classify(stream);
                self.xobjects.insert(*id, xobj.clone());
                Some(xobj)
            }
            Object::Stream(stream) => Some(classify(stream)),
            _ => None,
        }
    }
}

fn classify(stream: &Stream) -> XObject {
    let dict = &stream.dict;
    let subtype = dict.get(b"Subtype").and_then(Object::as_name).ok();

    match subtype {
        Some(b"Image") if dict.has(b"Width") && dict.has(b"Height") => {
            XObject::Image(Rc::new(stream.clone()))
        }
        Some(b"Form") if dict.has(b"BBox") => XObject::Form(Rc::new(stream.clone())),
        other => XObject::Other(other.map(<[u8]>::to_vec)),
    }
}
