//! Splitting inline images out of content streams.
//!
//! Inline image data sits between `ID` and `EI` as raw bytes. It is taken
//! verbatim here, filters included, so the image accessor decides how far
//! to decode it like it does for XObject images.

use lopdf::content::Content;
use lopdf::{Dictionary, Object, Stream};
use tracing::warn;

/// A run of a content stream.
#[derive(Debug)]
pub(crate) enum ContentSegment<'a> {
    /// Operators with no inline image among them.
    Operators(&'a [u8]),
    /// A `BI ... ID ... EI` inline image with its stored data.
    InlineImage(Stream),
}

/// Cut `data` into operator runs and inline images, in content order.
///
/// An inline image whose `EI` cannot be found ends the stream; a dictionary
/// that does not parse drops only that image.
pub(crate) fn split_inline_images(data: &[u8]) -> Vec<ContentSegment<'_>> {
    let mut segments = Vec::new();
    let mut start = 0;

    while let Some((bi_start, bi_end)) = find_keyword(data, start, b"BI") {
        if bi_start > start {
            segments.push(ContentSegment::Operators(&data[start..bi_start]));
        }

        let Some((id_start, id_end)) = find_keyword(data, bi_end, b"ID") else {
            warn!("Inline image at offset {} has no ID, ignoring the rest", bi_start);
            return segments;
        };
        let Some((image_data, next)) = inline_data(data, id_end) else {
            warn!("Inline image at offset {} has no EI, ignoring the rest", bi_start);
            return segments;
        };

        match inline_dict(&data[bi_end..id_start]) {
            Some(dict) => segments.push(ContentSegment::InlineImage(Stream::new(dict, image_data))),
            None => warn!("Unreadable inline image dictionary at offset {}", bi_start),
        }
        start = next;
    }

    if start < data.len() {
        segments.push(ContentSegment::Operators(&data[start..]));
    }
    segments
}

/// Position of the next `keyword` token at or after `pos`, skipping
/// comments, strings and names.
fn find_keyword(data: &[u8], mut pos: usize, keyword: &[u8]) -> Option<(usize, usize)> {
    while pos < data.len() {
        match data[pos] {
            b'%' => {
                while pos < data.len() && !matches!(data[pos], b'\r' | b'\n') {
                    pos += 1;
                }
            }
            b'(' => pos = skip_literal_string(data, pos),
            b'<' if data.get(pos + 1) == Some(&b'<') => pos += 2,
            b'<' => {
                pos = data[pos..]
                    .iter()
                    .position(|&b| b == b'>')
                    .map_or(data.len(), |i| pos + i + 1);
            }
            b'/' => pos = token_end(data, pos + 1),
            b if is_whitespace(b) || is_delimiter(b) => pos += 1,
            _ => {
                let end = token_end(data, pos);
                if &data[pos..end] == keyword {
                    return Some((pos, end));
                }
                pos = end;
            }
        }
    }
    None
}

fn token_end(data: &[u8], pos: usize) -> usize {
    data[pos..]
        .iter()
        .position(|&b| is_whitespace(b) || is_delimiter(b))
        .map_or(data.len(), |i| pos + i)
}

fn skip_literal_string(data: &[u8], mut pos: usize) -> usize {
    let mut depth = 0usize;
    while pos < data.len() {
        match data[pos] {
            b'\\' => pos += 1,
            b'(' => depth += 1,
            b')' => {
                depth -= 1;
                if depth == 0 {
                    return pos + 1;
                }
            }
            _ => {}
        }
        pos += 1;
    }
    data.len()
}

/// Parse the key/value pairs between `BI` and `ID`.
fn inline_dict(entries: &[u8]) -> Option<Dictionary> {
    let wrapped = [b"<<".as_slice(), entries, b">> ID"].concat();
    let content = Content::decode(&wrapped).ok()?;
    match content.operations.first()?.operands.first()? {
        Object::Dictionary(dict) => Some(dict.clone()),
        _ => None,
    }
}

/// Image bytes after the `ID` keyword ending at `id_end`, and the offset
/// just past the closing `EI`.
///
/// One whitespace byte separates `ID` from the data. The data ends at the
/// first `EI` that stands alone between whitespace and a delimiter.
fn inline_data(data: &[u8], id_end: usize) -> Option<(Vec<u8>, usize)> {
    let start = match data.get(id_end) {
        Some(&b) if is_whitespace(b) => id_end + 1,
        _ => id_end,
    };

    let mut i = start;
    while i + 2 <= data.len() {
        let standalone = &data[i..i + 2] == b"EI"
            && i > start
            && is_whitespace(data[i - 1])
            && data
                .get(i + 2)
                .is_none_or(|&b| is_whitespace(b) || is_delimiter(b));
        if standalone {
            let mut end = i - 1;
            if data[end] == b'\n' && end > start && data[end - 1] == b'\r' {
                end -= 1;
            }
            return Some((data[start..end].to_vec(), i + 2));
        }
        i += 1;
    }
    None
}

fn is_whitespace(b: u8) -> bool {
    matches!(b, b' ' | b'\t' | b'\r' | b'\n' | b'\x0c' | b'\0')
}

fn is_delimiter(b: u8) -> bool {
    matches!(b, b'(' | b')' | b'<' | b'>' | b'[' | b']' | b'{' | b'}' | b'/' | b'%')
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const JPEG: &[u8] = &[0xFF, 0xD8, 0xFF, 0xE0, 0x00, 0x10, b'J', b'F', b'I', b'F', 0x00, 0xFF, 0xD9];

    fn content_with_inline(dict: &str, data: &[u8]) -> Vec<u8> {
        let mut content = format!("q 10 0 0 10 0 0 cm BI {} ID ", dict).into_bytes();
        content.extend_from_slice(data);
        content.extend_from_slice(b"\nEI Q /Im0 Do");
        content
    }

    fn operators<'a>(segment: &'a ContentSegment<'a>) -> &'a [u8] {
        match segment {
            ContentSegment::Operators(ops) => ops,
            ContentSegment::InlineImage(_) => panic!("expected operators"),
        }
    }

    fn image<'a>(segment: &'a ContentSegment<'a>) -> &'a Stream {
        match segment {
            ContentSegment::InlineImage(stream) => stream,
            ContentSegment::Operators(_) => panic!("expected an inline image"),
        }
    }

    #[test]
    fn test_no_inline_images() {
        let segments = split_inline_images(b"q /Im0 Do Q");
        assert_eq!(segments.len(), 1);
        assert_eq!(operators(&segments[0]), b"q /Im0 Do Q");
    }

    #[test]
    fn test_filtered_inline_jpeg() {
        let content = content_with_inline("/W 1 /H 1 /CS /RGB /BPC 8 /F /DCT", JPEG);
        let segments = split_inline_images(&content);

        assert_eq!(segments.len(), 3);
        assert_eq!(operators(&segments[0]), b"q 10 0 0 10 0 0 cm ");
        let stream = image(&segments[1]);
        assert_eq!(stream.content, JPEG);
        assert_eq!(stream.dict.get(b"F").unwrap().as_name().unwrap(), b"DCT");
        assert_eq!(stream.dict.get(b"W").unwrap().as_i64().unwrap(), 1);
        assert_eq!(operators(&segments[2]), b" Q /Im0 Do");
    }

    #[test]
    fn test_stencil_mask_without_colorspace() {
        let content = content_with_inline("/IM true /W 8 /H 1 /D [1 0]", &[0b1010_1010]);
        let segments = split_inline_images(&content);

        let stream = image(&segments[1]);
        assert_eq!(stream.content, vec![0b1010_1010]);
        assert!(stream.dict.get(b"IM").unwrap().as_bool().unwrap());
    }

    #[test]
    fn test_ei_inside_data_needs_whitespace() {
        let data = b"xxEIyy EIz";
        let content = content_with_inline("/W 1 /H 1 /BPC 8 /CS /G", data);
        let segments = split_inline_images(&content);
        assert_eq!(image(&segments[1]).content, data.to_vec());
    }

    #[test]
    fn test_keyword_in_string_and_name_is_not_an_image() {
        let content = b"BT (BI ID EI) Tj ET /BI Do";
        let segments = split_inline_images(content);
        assert_eq!(segments.len(), 1);
        assert_eq!(operators(&segments[0]), content);
    }

    #[test]
    fn test_unterminated_image_drops_the_rest() {
        let segments = split_inline_images(b"q BI /W 1 /H 1 ID \xFF\xD8");
        assert_eq!(segments.len(), 1);
        assert_eq!(operators(&segments[0]), b"q ");
    }

    #[test]
    fn test_two_inline_images() {
        let mut content = content_with_inline("/W 1 /H 1 /F /DCT", JPEG);
        content.extend_from_slice(b" BI /W 2 /H 2 ID \x01\x02 EI");
        let segments = split_inline_images(&content);

        let images: Vec<&Stream> = segments
            .iter()
            .filter_map(|s| match s {
                ContentSegment::InlineImage(stream) => Some(stream),
                ContentSegment::Operators(_) => None,
            })
            .collect();
        assert_eq!(images.len(), 2);
        assert_eq!(images[1].content, vec![0x01, 0x02]);
    }
}
