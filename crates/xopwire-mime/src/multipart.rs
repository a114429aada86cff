//! `multipart/related` parsing and writing (RFC 2046 section 5.1, RFC 2387).
//!
//! Wire layout produced by [`MultipartWriter`]:
//!
//! ```text
//! --boundary CRLF
//! Header: value CRLF
//! CRLF
//! body CRLF
//! --boundary CRLF
//! ...
//! body CRLF
//! --boundary--
//! ```

use crate::attachment::Attachment;
use crate::boundary::{Boundary, ContentId};
use crate::error::{Error, Result};
use crate::header::Headers;
use crate::part::{Part, is_codec_header};
use bytes::Bytes;
use std::io::Write;

const CRLF: &[u8] = b"\r\n";

/// A parsed multipart body.
#[derive(Debug, Clone)]
pub struct Multipart {
    /// The boundary separating the parts.
    pub boundary: Boundary,
    /// The body parts in wire order.
    pub parts: Vec<Part>,
}

impl Multipart {
    /// Parses a multipart body.
    ///
    /// The preamble before the first delimiter and the epilogue after the
    /// closing delimiter are ignored. Part bodies are zero-copy slices of
    /// `body`. Both CRLF and bare LF line endings are accepted.
    ///
    /// # Errors
    ///
    /// Returns an error if no delimiter is found, a part has no header
    /// terminator, or the closing delimiter is missing.
    pub fn parse(body: Bytes, boundary: &Boundary) -> Result<Self> {
        let delimiter = boundary.delimiter().into_bytes();

        let mut pos = find_delimiter(&body, &delimiter, 0).ok_or_else(|| {
            Error::InvalidMultipart(format!("no delimiter for boundary {boundary:?}"))
        })?;
        let mut parts = Vec::new();

        loop {
            let after = pos + delimiter.len();
            if body[after..].starts_with(b"--") {
                break;
            }

            let part_start = skip_line_end(&body, after).ok_or_else(|| {
                Error::InvalidMultipart("delimiter line not terminated".to_string())
            })?;

            // The LF that ends a delimiter line may also start the next one.
            let next = find_delimiter(&body, &delimiter, part_start - 1)
                .ok_or_else(|| Error::InvalidMultipart("missing closing delimiter".to_string()))?;
            let mut end = next;
            if end > part_start && body[end - 1] == b'\n' {
                end -= 1;
                if end > part_start && body[end - 1] == b'\r' {
                    end -= 1;
                }
            }
            let end = end.max(part_start);

            parts.push(parse_part(body.slice(part_start..end))?);
            pos = next;
        }

        tracing::trace!(parts = parts.len(), "Parsed multipart body");
        Ok(Self {
            boundary: boundary.clone(),
            parts,
        })
    }

    /// Removes and returns the root part.
    ///
    /// With a `start` content-ID the part carrying that `Content-Id` is the
    /// root; otherwise it is the first part.
    ///
    /// # Errors
    ///
    /// Returns an error if the package is empty or `start` names no part.
    pub fn take_root(&mut self, start: Option<&str>) -> Result<Part> {
        if self.parts.is_empty() {
            return Err(Error::InvalidMultipart("package has no parts".to_string()));
        }

        let index = match start {
            Some(start) => {
                let wanted = ContentId::new(start);
                self.parts
                    .iter()
                    .position(|p| p.content_id().as_ref() == Some(&wanted))
                    .ok_or_else(|| Error::MissingRootPart(wanted.header_value()))?
            }
            None => 0,
        };

        Ok(self.parts.remove(index))
    }
}

/// Finds a delimiter that starts a line at or after `from`.
///
/// Returns the index of the first `-` of the delimiter.
fn find_delimiter(body: &[u8], delimiter: &[u8], from: usize) -> Option<usize> {
    let mut from = from;
    while let Some(found) = find(body, delimiter, from) {
        let at_line_start = found == 0 || body[found - 1] == b'\n';
        let tail_ok = matches!(
            body.get(found + delimiter.len()),
            None | Some(b'-' | b'\r' | b'\n' | b' ' | b'\t')
        );
        if at_line_start && tail_ok {
            return Some(found);
        }
        from = found + 1;
    }
    None
}

/// Skips transport padding and the line ending after a delimiter.
fn skip_line_end(body: &[u8], mut pos: usize) -> Option<usize> {
    while matches!(body.get(pos), Some(b' ' | b'\t')) {
        pos += 1;
    }
    match body.get(pos..) {
        Some([b'\r', b'\n', ..]) => Some(pos + 2),
        Some([b'\n', ..]) => Some(pos + 1),
        _ => None,
    }
}

fn find(haystack: &[u8], needle: &[u8], from: usize) -> Option<usize> {
    if needle.is_empty() || from >= haystack.len() {
        return None;
    }
    haystack[from..]
        .windows(needle.len())
        .position(|w| w == needle)
        .map(|i| i + from)
}

/// Splits raw part content into headers and body.
fn parse_part(content: Bytes) -> Result<Part> {
    let (header_end, body_start) = if content.starts_with(CRLF) {
        (0, 2)
    } else if content.starts_with(b"\n") {
        (0, 1)
    } else if let Some(i) = find(&content, b"\r\n\r\n", 0) {
        (i, i + 4)
    } else if let Some(i) = find(&content, b"\n\n", 0) {
        (i, i + 2)
    } else {
        return Err(Error::InvalidMultipart(
            "part headers are not terminated by an empty line".to_string(),
        ));
    };

    let headers = Headers::parse(&String::from_utf8_lossy(&content[..header_end]))?;
    Ok(Part::new(headers, content.slice(body_start..)))
}

/// Streams a multipart body to a writer.
#[derive(Debug)]
pub struct MultipartWriter<W: Write> {
    inner: W,
    boundary: Boundary,
    parts_written: usize,
}

impl<W: Write> MultipartWriter<W> {
    /// Creates a writer for the given boundary.
    pub const fn new(inner: W, boundary: Boundary) -> Self {
        Self {
            inner,
            boundary,
            parts_written: 0,
        }
    }

    /// Returns the boundary.
    pub const fn boundary(&self) -> &Boundary {
        &self.boundary
    }

    /// Writes the delimiter and headers of a new part and returns the sink
    /// for its body.
    ///
    /// # Errors
    ///
    /// Returns an error if writing fails.
    pub fn start_part(&mut self, headers: &Headers) -> Result<&mut W> {
        if self.parts_written > 0 {
            self.inner.write_all(CRLF)?;
        }
        self.inner.write_all(self.boundary.delimiter().as_bytes())?;
        self.inner.write_all(CRLF)?;
        self.inner.write_all(headers.to_string().as_bytes())?;
        self.inner.write_all(CRLF)?;
        self.parts_written += 1;
        Ok(&mut self.inner)
    }

    /// Writes a complete part.
    ///
    /// # Errors
    ///
    /// Returns an error if writing fails.
    pub fn write_part(&mut self, headers: &Headers, body: &[u8]) -> Result<()> {
        self.start_part(headers)?.write_all(body)?;
        Ok(())
    }

    /// Writes an attachment part.
    ///
    /// Headers are `Content-Id`, `Content-Type`, the attachment's custom
    /// headers, then `Content-Transfer-Encoding: binary`.
    ///
    /// # Errors
    ///
    /// Returns an error if writing fails.
    pub fn write_attachment(&mut self, attachment: &Attachment) -> Result<()> {
        let mut headers = Headers::new();
        headers.add("Content-Id", attachment.content_id().header_value());
        headers.add("Content-Type", attachment.content_type());
        for (name, value) in attachment.headers().iter() {
            if !is_codec_header(name) {
                headers.add(name, value);
            }
        }
        headers.add("Content-Transfer-Encoding", "binary");

        tracing::trace!(
            content_id = %attachment.content_id(),
            len = attachment.len(),
            "Writing attachment part"
        );
        self.write_part(&headers, attachment.data())
    }

    /// Writes the closing delimiter and returns the inner writer.
    ///
    /// # Errors
    ///
    /// Returns an error if no part was written or writing fails.
    pub fn finish(mut self) -> Result<W> {
        if self.parts_written == 0 {
            return Err(Error::InvalidMultipart(
                "a multipart body needs at least one part".to_string(),
            ));
        }
        self.inner.write_all(CRLF)?;
        self.inner
            .write_all(self.boundary.close_delimiter().as_bytes())?;
        self.inner.flush()?;
        Ok(self.inner)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn headers(pairs: &[(&str, &str)]) -> Headers {
        pairs.iter().copied().collect()
    }

    #[test]
    fn test_writer_layout() {
        let mut writer = MultipartWriter::new(Vec::new(), Boundary::new("B"));
        writer
            .write_part(&headers(&[("Content-Type", "text/xml")]), b"<a/>")
            .unwrap();
        writer
            .write_attachment(
                &Attachment::new("x@y", "image/png", &b"PNG"[..])
                    .with_header("Content-Description", "logo")
                    .with_header("Content-Type", "ignored/type"),
            )
            .unwrap();
        let out = writer.finish().unwrap();

        assert_eq!(
            String::from_utf8(out).unwrap(),
            concat!(
                "--B\r\n",
                "Content-Type: text/xml\r\n",
                "\r\n",
                "<a/>\r\n",
                "--B\r\n",
                "Content-Id: <x@y>\r\n",
                "Content-Type: image/png\r\n",
                "Content-Description: logo\r\n",
                "Content-Transfer-Encoding: binary\r\n",
                "\r\n",
                "PNG\r\n",
                "--B--"
            )
        );
    }

    #[test]
    fn test_finish_without_parts_fails() {
        let writer = MultipartWriter::new(Vec::new(), Boundary::new("B"));
        assert!(writer.finish().is_err());
    }

    #[test]
    fn test_parse_with_preamble_and_epilogue() {
        let body = Bytes::from_static(
            b"preamble\r\n--B\r\nContent-Id: <r>\r\n\r\nroot\r\n--B\r\nContent-Id: <a>\r\n\r\n\x00\x01\r\n--B--\r\nepilogue",
        );
        let multipart = Multipart::parse(body, &Boundary::new("B")).unwrap();
        assert_eq!(multipart.parts.len(), 2);
        assert_eq!(multipart.parts[0].body.as_ref(), b"root");
        assert_eq!(multipart.parts[1].body.as_ref(), b"\x00\x01");
    }

    #[test]
    fn test_parse_lf_only_and_empty_parts() {
        let body = Bytes::from_static(b"--B\n\n\n--B\nContent-Id: <a>\n\nx\n--B--");
        let multipart = Multipart::parse(body, &Boundary::new("B")).unwrap();
        assert_eq!(multipart.parts.len(), 2);
        assert!(multipart.parts[0].body.is_empty());
        assert!(multipart.parts[0].headers.is_empty());
        assert_eq!(multipart.parts[1].body.as_ref(), b"x");
    }

    #[test]
    fn test_parse_ignores_boundary_prefix_inside_content() {
        let body = Bytes::from_static(b"--B\r\n\r\n--Bx is not a delimiter\r\n--B--");
        let multipart = Multipart::parse(body, &Boundary::new("B")).unwrap();
        assert_eq!(multipart.parts.len(), 1);
        assert_eq!(multipart.parts[0].body.as_ref(), b"--Bx is not a delimiter");
    }

    #[test]
    fn test_parse_missing_close_delimiter() {
        let body = Bytes::from_static(b"--B\r\n\r\nroot\r\n");
        assert!(matches!(
            Multipart::parse(body, &Boundary::new("B")),
            Err(Error::InvalidMultipart(_))
        ));
    }

    #[test]
    fn test_parse_no_delimiter() {
        let body = Bytes::from_static(b"just text");
        assert!(Multipart::parse(body, &Boundary::new("B")).is_err());
    }

    #[test]
    fn test_take_root_by_start() {
        let body = Bytes::from_static(
            b"--B\r\nContent-Id: <a>\r\n\r\nattachment\r\n--B\r\nContent-Id: <root>\r\n\r\nroot\r\n--B--",
        );
        let mut multipart = Multipart::parse(body, &Boundary::new("B")).unwrap();
        let root = multipart.take_root(Some("<root>")).unwrap();
        assert_eq!(root.body.as_ref(), b"root");
        assert_eq!(multipart.parts.len(), 1);

        assert!(matches!(
            multipart.take_root(Some("missing")),
            Err(Error::MissingRootPart(_))
        ));
        assert_eq!(multipart.take_root(None).unwrap().body.as_ref(), b"attachment");
    }

    proptest! {
        #[test]
        fn prop_written_bodies_parse_back(bodies in proptest::collection::vec(
            proptest::collection::vec(any::<u8>(), 0..64), 1..5)
        ) {
            let boundary = Boundary::generate();
            let mut writer = MultipartWriter::new(Vec::new(), boundary.clone());
            for (i, body) in bodies.iter().enumerate() {
                writer.write_part(&headers(&[("Content-Id", &format!("<{i}>"))]), body).unwrap();
            }
            let out = writer.finish().unwrap();

            let parsed = Multipart::parse(Bytes::from(out), &boundary).unwrap();
            prop_assert_eq!(parsed.parts.len(), bodies.len());
            for (part, body) in parsed.parts.iter().zip(&bodies) {
                prop_assert_eq!(part.body.as_ref(), body.as_slice());
            }
        }
    }
}
