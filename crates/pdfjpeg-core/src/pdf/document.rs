//! Document construction with a fallback loader.

use lopdf::encryption::{decrypt_object, get_encryption_key, DecryptionError};
use lopdf::{Document, Object};
use tracing::{debug, warn};

use super::Result;
use crate::error::{LoadError, PdfError};

/// A strategy for building a [`Document`] from PDF bytes.
pub trait DocumentLoader {
    /// Short name used in log messages.
    fn name(&self) -> &'static str;

    /// Build the document.
    ///
    /// Returns [`LoadError::Incompatible`] when this strategy does not apply
    /// to the document and another loader should be tried.
    fn load(&self, data: &[u8]) -> std::result::Result<Document, LoadError>;
}

/// Parses the document, then runs an initialization step with a password.
///
/// Initialization decrypts encrypted documents. A failed initialization is
/// reported as incompatible.
#[derive(Debug, Clone, Default)]
pub struct InitializingLoader {
    password: String,
}

impl InitializingLoader {
    /// Create a loader that initializes with the given password.
    pub fn new(password: impl Into<String>) -> Self {
        Self {
            password: password.into(),
        }
    }

    fn initialize(&self, document: &mut Document) -> std::result::Result<(), LoadError> {
        let version = match document.get_encrypted() {
            Ok(encrypt) => encrypt.get(b"V").and_then(Object::as_i64).unwrap_or(0),
            Err(_) => return Ok(()),
        };

        let outcome = if version < 4 {
            decrypt_rc4(document, self.password.as_bytes()).map_err(|e| e.to_string())
        } else {
            document
                .decrypt(self.password.as_str())
                .map_err(|e| e.to_string())
        };
        outcome.map_err(|e| LoadError::Incompatible(format!("initialization failed: {}", e)))?;

        debug!("Decrypted PDF (V{}) during initialization", version);
        Ok(())
    }
}

/// Decrypt every string and stream object of a V1/V2 (RC4) document.
///
/// These documents have no `/CF` crypt filters, which [`Document::decrypt`]
/// requires.
fn decrypt_rc4(document: &mut Document, password: &[u8]) -> std::result::Result<(), DecryptionError> {
    let encrypt_id = document
        .trailer
        .get(b"Encrypt")
        .and_then(Object::as_reference)
        .map_err(|_| DecryptionError::MissingEncryptDictionary)?;
    let key = get_encryption_key(document, password, true)?;

    for (&id, object) in document.objects.iter_mut() {
        if id == encrypt_id {
            continue;
        }
        let plain = match decrypt_object(&key, id, object, false) {
            Ok(plain) => plain,
            Err(DecryptionError::NotDecryptable) => continue,
            Err(e) => return Err(e),
        };
        match object {
            Object::Stream(stream) => stream.set_content(plain),
            Object::String(content, _) => *content = plain,
            _ => {}
        }
    }

    document.trailer.remove(b"Encrypt");
    Ok(())
}

impl DocumentLoader for InitializingLoader {
    fn name(&self) -> &'static str {
        "initializing loader"
    }

    fn load(&self, data: &[u8]) -> std::result::Result<Document, LoadError> {
        let mut document = Document::load_mem(data).map_err(|e| PdfError::Parse(e.to_string()))?;
        self.initialize(&mut document)?;
        Ok(document)
    }
}

/// Builds the document in a single step, without initialization.
#[derive(Debug, Clone, Copy, Default)]
pub struct DirectLoader;

impl DocumentLoader for DirectLoader {
    fn name(&self) -> &'static str {
        "direct loader"
    }

    fn load(&self, data: &[u8]) -> std::result::Result<Document, LoadError> {
        Ok(Document::load_mem(data).map_err(|e| PdfError::Parse(e.to_string()))?)
    }
}

/// Build a document with [`InitializingLoader`], falling back to [`DirectLoader`].
pub fn open_document(data: &[u8], password: &str) -> Result<Document> {
    open_document_with(data, &[&InitializingLoader::new(password), &DirectLoader])
}

/// Build a document with the first loader that is compatible.
///
/// Only [`LoadError::Incompatible`] moves on to the next loader; any other
/// error is returned immediately.
pub fn open_document_with(data: &[u8], loaders: &[&dyn DocumentLoader]) -> Result<Document> {
    let mut reason = String::from("no document loader configured");

    for loader in loaders {
        match loader.load(data) {
            Ok(document) => {
                debug!("Loaded PDF via {}", loader.name());
                return Ok(document);
            }
            Err(LoadError::Incompatible(msg)) => {
                warn!("{} is incompatible: {}", loader.name(), msg);
                reason = msg;
            }
            Err(LoadError::Pdf(e)) => return Err(e),
        }
    }

    Err(PdfError::Incompatible(reason))
}

#[cfg(test)]
mod tests {
    use super::*;
    use lopdf::{dictionary, Dictionary, Stream, StringFormat};
    use std::cell::Cell;
    use std::io::Cursor;

    fn minimal_pdf() -> Vec<u8> {
        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
        });
        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => vec![Object::from(page_id)],
                "Count" => 1i64,
            }),
        );
        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        doc.trailer.set("Root", catalog_id);

        let mut buf = Vec::new();
        doc.save_to(&mut buf).expect("failed to save test PDF");
        buf
    }

    struct Scripted<'a> {
        calls: &'a Cell<usize>,
        outcome: fn() -> std::result::Result<Document, LoadError>,
    }

    impl DocumentLoader for Scripted<'_> {
        fn name(&self) -> &'static str {
            "scripted"
        }

        fn load(&self, _data: &[u8]) -> std::result::Result<Document, LoadError> {
            self.calls.set(self.calls.get() + 1);
            (self.outcome)()
        }
    }

    fn incompatible() -> std::result::Result<Document, LoadError> {
        Err(LoadError::Incompatible("type mismatch".to_string()))
    }

    fn fatal() -> std::result::Result<Document, LoadError> {
        Err(LoadError::Pdf(PdfError::Parse("truncated xref".to_string())))
    }

    #[test]
    fn test_initializing_loader_plain_pdf() {
        let doc = InitializingLoader::default().load(&minimal_pdf()).unwrap();
        assert_eq!(doc.get_pages().len(), 1);
    }

    #[test]
    fn test_direct_loader_plain_pdf() {
        let doc = DirectLoader.load(&minimal_pdf()).unwrap();
        assert_eq!(doc.get_pages().len(), 1);
    }

    #[test]
    fn test_garbage_is_a_parse_error() {
        let err = DirectLoader.load(b"not a pdf at all").unwrap_err();
        assert!(matches!(err, LoadError::Pdf(PdfError::Parse(_))));
    }

    #[test]
    fn test_incompatible_falls_back() {
        let calls = Cell::new(0);
        let first = Scripted {
            calls: &calls,
            outcome: incompatible,
        };

        let doc = open_document_with(&minimal_pdf(), &[&first, &DirectLoader]).unwrap();
        assert_eq!(calls.get(), 1);
        assert_eq!(doc.get_pages().len(), 1);
    }

    #[test]
    fn test_fatal_error_does_not_fall_back() {
        let first_calls = Cell::new(0);
        let second_calls = Cell::new(0);
        let first = Scripted {
            calls: &first_calls,
            outcome: fatal,
        };
        let second = Scripted {
            calls: &second_calls,
            outcome: incompatible,
        };

        let err = open_document_with(&minimal_pdf(), &[&first, &second]).unwrap_err();
        assert!(matches!(err, PdfError::Parse(_)));
        assert_eq!(first_calls.get(), 1);
        assert_eq!(second_calls.get(), 0);
    }

    #[test]
    fn test_all_incompatible() {
        let calls = Cell::new(0);
        let only = Scripted {
            calls: &calls,
            outcome: incompatible,
        };

        let err = open_document_with(&minimal_pdf(), &[&only]).unwrap_err();
        assert!(matches!(err, PdfError::Incompatible(ref msg) if msg == "type mismatch"));
    }

    #[test]
    fn test_open_document_default_chain() {
        let doc = open_document(&minimal_pdf(), "").unwrap();
        assert_eq!(doc.get_pages().len(), 1);
    }

    const PASSWORD_PAD: [u8; 32] = [
        0x28, 0xBF, 0x4E, 0x5E, 0x4E, 0x75, 0x8A, 0x41, 0x64, 0x00, 0x4E, 0x56, 0xFF, 0xFA, 0x01,
        0x08, 0x2E, 0x2E, 0x00, 0xB6, 0xD0, 0x68, 0x3E, 0x80, 0x2F, 0x0C, 0xA9, 0xFE, 0x64, 0x53,
        0x69, 0x7A,
    ];

    const JPEG: &[u8] = &[0xFF, 0xD8, 0xFF, 0xE0, 0x00, 0x10, b'J', b'F', b'I', b'F', 0x00, 0xFF, 0xD9];

    fn rc4(key: &[u8], data: &[u8]) -> Vec<u8> {
        let mut state: [u8; 256] = std::array::from_fn(|i| i as u8);
        let mut j: u8 = 0;
        for i in 0..256 {
            j = j.wrapping_add(state[i]).wrapping_add(key[i % key.len()]);
            state.swap(i, j as usize);
        }

        let (mut i, mut j) = (0u8, 0u8);
        data.iter()
            .map(|byte| {
                i = i.wrapping_add(1);
                j = j.wrapping_add(state[i as usize]);
                state.swap(i as usize, j as usize);
                byte ^ state[state[i as usize].wrapping_add(state[j as usize]) as usize]
            })
            .collect()
    }

    /// A one-page PDF drawing a JPEG, encrypted with 40-bit RC4 (V1, R2)
    /// under an empty user password.
    fn rc4_encrypted_pdf() -> Vec<u8> {
        let owner_hash = [0x5Au8; 32];
        let permissions: i64 = -44;
        let file_id = b"pdfjpeg-fixture!".to_vec();

        let mut doc = Document::with_version("1.4");
        let pages_id = doc.new_object_id();
        let image_id = doc.add_object(Stream::new(
            dictionary! {
                "Type" => "XObject",
                "Subtype" => "Image",
                "Width" => 1i64,
                "Height" => 1i64,
                "Filter" => "DCTDecode",
            },
            JPEG.to_vec(),
        ));
        let content_id = doc.add_object(Stream::new(Dictionary::new(), b"/Im0 Do".to_vec()));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
            "Resources" => dictionary! { "XObject" => dictionary! { "Im0" => image_id } },
        });
        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => vec![Object::from(page_id)],
                "Count" => 1i64,
            }),
        );
        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });

        let mut context = md5::Context::new();
        context.consume(PASSWORD_PAD);
        context.consume(owner_hash);
        context.consume((permissions as u32).to_le_bytes());
        context.consume(&file_id);
        let key = context.finalize().0[..5].to_vec();

        for (&(number, generation), object) in doc.objects.iter_mut() {
            if let Object::Stream(stream) = object {
                let mut object_key = key.clone();
                object_key.extend_from_slice(&number.to_le_bytes()[..3]);
                object_key.extend_from_slice(&generation.to_le_bytes()[..2]);
                let digest = md5::compute(&object_key);
                let encrypted = rc4(&digest.0[..10], &stream.content);
                stream.set_content(encrypted);
            }
        }

        let encrypt_id = doc.add_object(dictionary! {
            "Filter" => "Standard",
            "V" => 1i64,
            "R" => 2i64,
            "Length" => 40i64,
            "P" => permissions,
            "O" => Object::String(owner_hash.to_vec(), StringFormat::Hexadecimal),
            "U" => Object::String(rc4(&key, &PASSWORD_PAD), StringFormat::Hexadecimal),
        });
        let id = Object::String(file_id, StringFormat::Hexadecimal);
        doc.trailer.set("Root", catalog_id);
        doc.trailer.set("Encrypt", encrypt_id);
        doc.trailer.set("ID", vec![id.clone(), id]);

        let mut buf = Vec::new();
        doc.save_to(&mut buf).expect("failed to save test PDF");
        buf
    }

    fn image_content(doc: &Document) -> Vec<u8> {
        doc.objects
            .values()
            .filter_map(|o| o.as_stream().ok())
            .find(|s| s.dict.has(b"Width"))
            .map(|s| s.content.clone())
            .unwrap()
    }

    #[test]
    fn test_rc4_document_is_decrypted_with_empty_password() {
        let pdf = rc4_encrypted_pdf();

        let raw = DirectLoader.load(&pdf).unwrap();
        assert!(raw.is_encrypted());
        assert_ne!(image_content(&raw), JPEG);

        let doc = InitializingLoader::default().load(&pdf).unwrap();
        assert!(!doc.is_encrypted());
        assert_eq!(image_content(&doc), JPEG);
    }

    #[test]
    fn test_rc4_document_with_wrong_password_is_incompatible() {
        let err = InitializingLoader::new("not the password")
            .load(&rc4_encrypted_pdf())
            .unwrap_err();
        assert!(matches!(err, LoadError::Incompatible(_)));
    }

    #[test]
    fn test_rc4_document_yields_its_jpeg() {
        let jpegs = crate::pdf::extract_jpegs(Cursor::new(rc4_encrypted_pdf()))
            .unwrap()
            .collect::<Result<Vec<_>>>()
            .unwrap();
        assert_eq!(jpegs, vec![JPEG.to_vec()]);
    }
}
