//! Page enumeration with a fallback page tree walker.

use std::collections::HashSet;

use lopdf::{Dictionary, Document, Object, ObjectId};
use tracing::{debug, warn};

use super::Result;
use crate::error::PdfError;

/// A page in document order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRef {
    /// Page number (1-indexed).
    pub number: u32,
    /// Object id of the page dictionary.
    pub id: ObjectId,
}

/// A strategy for listing the pages of a document.
pub trait PageEnumerator {
    /// Short name used in log messages.
    fn name(&self) -> &'static str;

    /// List the pages in document order.
    fn enumerate(&self, doc: &Document) -> Result<Vec<PageRef>>;
}

/// Uses the document's own page listing.
#[derive(Debug, Clone, Copy, Default)]
pub struct CatalogPages;

impl PageEnumerator for CatalogPages {
    fn name(&self) -> &'static str {
        "catalog pages"
    }

    fn enumerate(&self, doc: &Document) -> Result<Vec<PageRef>> {
        let pages = doc.get_pages();
        if pages.is_empty() {
            return Err(PdfError::NoPages);
        }
        Ok(pages
            .into_iter()
            .map(|(number, id)| PageRef { number, id })
            .collect())
    }
}

/// Walks `/Root /Pages` by hand, tolerating missing `/Type` entries and
/// cycles. When the walk finds nothing, every `/Type /Page` object in the
/// document is taken in object-id order.
#[derive(Debug, Clone, Copy, Default)]
pub struct PageTreeWalker;

impl PageEnumerator for PageTreeWalker {
    fn name(&self) -> &'static str {
        "page tree walker"
    }

    fn enumerate(&self, doc: &Document) -> Result<Vec<PageRef>> {
        let mut ids = Vec::new();
        if let Some(root) = pages_root(doc) {
            let mut visited = HashSet::new();
            walk(doc, root, &mut visited, &mut ids);
        }

        if ids.is_empty() {
            debug!("Page tree yielded no pages, scanning all objects");
            ids = doc
                .objects
                .iter()
                .filter(|(_, obj)| {
                    obj.as_dict()
                        .map(|dict| node_type(dict) == Some(b"Page".as_slice()))
                        .unwrap_or(false)
                })
                .map(|(id, _)| *id)
                .collect();
        }

        Ok(ids
            .into_iter()
            .zip(1u32..)
            .map(|(id, number)| PageRef { number, id })
            .collect())
    }
}

/// List pages with [`CatalogPages`], falling back to [`PageTreeWalker`].
pub fn enumerate_pages(doc: &Document) -> Result<Vec<PageRef>> {
    enumerate_pages_with(doc, &[&CatalogPages, &PageTreeWalker])
}

/// List pages with the first enumerator that succeeds.
///
/// Any error moves on to the next enumerator; the last error is returned
/// when none succeeds.
pub fn enumerate_pages_with(
    doc: &Document,
    enumerators: &[&dyn PageEnumerator],
) -> Result<Vec<PageRef>> {
    let mut last_error = PdfError::NoPages;

    for enumerator in enumerators {
        match enumerator.enumerate(doc) {
            Ok(pages) => {
                debug!("Enumerated {} pages via {}", pages.len(), enumerator.name());
                return Ok(pages);
            }
            Err(e) => {
                warn!("Page enumeration via {} failed: {}", enumerator.name(), e);
                last_error = e;
            }
        }
    }

    Err(last_error)
}

fn pages_root(doc: &Document) -> Option<ObjectId> {
    let root = doc.trailer.get(b"Root").and_then(Object::as_reference).ok()?;
    let catalog = doc.get_object(root).and_then(Object::as_dict).ok()?;
    catalog.get(b"Pages").and_then(Object::as_reference).ok()
}

fn node_type(dict: &Dictionary) -> Option<&[u8]> {
    dict.get(b"Type").and_then(Object::as_name).ok()
}

fn walk(doc: &Document, node_id: ObjectId, visited: &mut HashSet<ObjectId>, out: &mut Vec<ObjectId>) {
    if !visited.insert(node_id) {
        return;
    }
    let Ok(dict) = doc.get_object(node_id).and_then(Object::as_dict) else {
        return;
    };

    if let Ok(kids) = dict.get(b"Kids").and_then(Object::as_array) {
        for kid in kids {
            if let Ok(kid_id) = kid.as_reference() {
                walk(doc, kid_id, visited, out);
            }
        }
        return;
    }

    let is_page = match node_type(dict) {
        Some(b"Page") => true,
        Some(b"Pages") => false,
        _ => dict.has(b"Contents") || dict.has(b"MediaBox"),
    };
    if is_page {
        out.push(node_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lopdf::dictionary;
    use pretty_assertions::assert_eq;
    use std::cell::Cell;

    /// Document with one `/Pages` node over `kids`, each built from a dictionary.
    fn doc_with_kids(kids: Vec<Dictionary>) -> (Document, Vec<ObjectId>) {
        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        let ids: Vec<ObjectId> = kids
            .into_iter()
            .map(|mut kid| {
                kid.set("Parent", pages_id);
                doc.add_object(kid)
            })
            .collect();
        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => ids.iter().map(|id| Object::from(*id)).collect::<Vec<_>>(),
                "Count" => ids.len() as i64,
            }),
        );
        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        doc.trailer.set("Root", catalog_id);
        (doc, ids)
    }

    struct Failing<'a>(&'a Cell<usize>);

    impl PageEnumerator for Failing<'_> {
        fn name(&self) -> &'static str {
            "failing"
        }

        fn enumerate(&self, _doc: &Document) -> Result<Vec<PageRef>> {
            self.0.set(self.0.get() + 1);
            Err(PdfError::Parse("broken page tree".to_string()))
        }
    }

    #[test]
    fn test_catalog_pages() {
        let (doc, ids) = doc_with_kids(vec![
            dictionary! { "Type" => "Page" },
            dictionary! { "Type" => "Page" },
        ]);
        let pages = CatalogPages.enumerate(&doc).unwrap();
        assert_eq!(
            pages,
            vec![
                PageRef { number: 1, id: ids[0] },
                PageRef { number: 2, id: ids[1] },
            ]
        );
    }

    #[test]
    fn test_catalog_pages_empty_is_error() {
        let doc = Document::with_version("1.5");
        assert!(matches!(CatalogPages.enumerate(&doc), Err(PdfError::NoPages)));
    }

    #[test]
    fn test_walker_accepts_untyped_leaves() {
        let media_box = || vec![Object::from(0), 0.into(), 612.into(), 792.into()];
        let (doc, ids) = doc_with_kids(vec![
            dictionary! { "MediaBox" => media_box() },
            dictionary! { "Type" => "Page" },
            dictionary! { "Type" => "Pages" },
        ]);
        let pages = PageTreeWalker.enumerate(&doc).unwrap();
        let found: Vec<ObjectId> = pages.iter().map(|p| p.id).collect();
        assert_eq!(found, vec![ids[0], ids[1]]);
        assert_eq!(pages[1].number, 2);
    }

    #[test]
    fn test_walker_survives_cycles() {
        let (mut doc, ids) = doc_with_kids(vec![dictionary! { "Type" => "Page" }]);
        let pages_id = pages_root(&doc).unwrap();
        let looping = doc.add_object(dictionary! {
            "Type" => "Pages",
            "Kids" => vec![Object::from(pages_id), Object::from(ids[0])],
        });
        if let Ok(Object::Dictionary(root)) = doc.get_object_mut(pages_id) {
            root.set("Kids", vec![Object::from(ids[0]), Object::from(looping)]);
        }

        let pages = PageTreeWalker.enumerate(&doc).unwrap();
        assert_eq!(pages.len(), 1);
        assert_eq!(pages[0].id, ids[0]);
    }

    #[test]
    fn test_walker_scans_objects_without_page_tree() {
        let mut doc = Document::with_version("1.5");
        let first = doc.add_object(dictionary! { "Type" => "Page" });
        doc.add_object(dictionary! { "Type" => "Font" });
        let second = doc.add_object(dictionary! { "Type" => "Page" });

        let pages = PageTreeWalker.enumerate(&doc).unwrap();
        assert_eq!(
            pages,
            vec![
                PageRef { number: 1, id: first },
                PageRef { number: 2, id: second },
            ]
        );
    }

    #[test]
    fn test_fallback_after_error() {
        let calls = Cell::new(0);
        let (doc, ids) = doc_with_kids(vec![dictionary! { "Type" => "Page" }]);

        let pages = enumerate_pages_with(&doc, &[&Failing(&calls), &PageTreeWalker]).unwrap();
        assert_eq!(calls.get(), 1);
        assert_eq!(pages, vec![PageRef { number: 1, id: ids[0] }]);
    }

    #[test]
    fn test_all_enumerators_fail() {
        let calls = Cell::new(0);
        let doc = Document::with_version("1.5");

        let err = enumerate_pages_with(&doc, &[&Failing(&calls), &Failing(&calls)]).unwrap_err();
        assert_eq!(calls.get(), 2);
        assert!(matches!(err, PdfError::Parse(_)));
    }

    #[test]
    fn test_default_enumeration_without_catalog() {
        let mut doc = Document::with_version("1.5");
        let page = doc.add_object(dictionary! { "Type" => "Page" });

        let pages = enumerate_pages(&doc).unwrap();
        assert_eq!(pages, vec![PageRef { number: 1, id: page }]);
    }
}
