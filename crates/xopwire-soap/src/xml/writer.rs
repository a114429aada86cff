//! Token sinks.

use crate::error::{Error, Result};
use crate::xml::token::{Attribute, StartTag, Token};
use quick_xml::Writer;
use quick_xml::escape::{escape, partial_escape};
use quick_xml::events::attributes::Attribute as XmlAttribute;
use quick_xml::events::{BytesCData, BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::name::QName;
use std::borrow::Cow;
use std::fmt::Write as _;
use std::io::Write;

/// A destination for XML tokens.
pub trait TokenSink {
    /// Writes one token.
    ///
    /// # Errors
    ///
    /// Returns an error if the token cannot be written.
    fn write_token(&mut self, token: &Token) -> Result<()>;
}

impl TokenSink for Vec<Token> {
    fn write_token(&mut self, token: &Token) -> Result<()> {
        self.push(token.clone());
        Ok(())
    }
}

impl<S: TokenSink + ?Sized> TokenSink for &mut S {
    fn write_token(&mut self, token: &Token) -> Result<()> {
        (**self).write_token(token)
    }
}

/// Serializes tokens as XML text.
///
/// Names and attributes are written exactly as they appear on the tokens.
/// A self-closing start tag directly followed by its end tag is written in
/// `<empty/>` form; binary content is written as base64 text.
///
/// A writer for US-ASCII output writes non-ASCII characters in text and
/// attribute values as character references, and refuses them in names,
/// comments and CDATA sections.
pub struct XmlWriter<W: Write> {
    writer: Writer<W>,
    pending_empty: Option<StartTag>,
    ascii_only: bool,
}

impl<W: Write> XmlWriter<W> {
    /// Creates a writer producing UTF-8.
    pub fn new(inner: W) -> Self {
        Self {
            writer: Writer::new(inner),
            pending_empty: None,
            ascii_only: false,
        }
    }

    /// Creates a writer whose output is valid in `charset`.
    ///
    /// `charset` is a name returned by
    /// [`resolve_charset`](crate::codec::resolve_charset).
    pub fn for_charset(inner: W, charset: &str) -> Self {
        Self {
            ascii_only: charset.eq_ignore_ascii_case("us-ascii"),
            ..Self::new(inner)
        }
    }

    /// Writes `<?xml version="1.0" encoding="..."?>`.
    ///
    /// # Errors
    ///
    /// Returns an error if writing fails.
    pub fn write_declaration(&mut self, encoding: &str) -> Result<()> {
        self.flush_pending()?;
        self.writer
            .write_event(Event::Decl(BytesDecl::new("1.0", Some(encoding), None)))?;
        Ok(())
    }

    /// Writes an element with no content in `<empty/>` form.
    ///
    /// # Errors
    ///
    /// Returns an error if writing fails.
    pub fn write_empty(&mut self, name: &str, attributes: &[Attribute]) -> Result<()> {
        self.flush_pending()?;
        let start = self.bytes_start(name, attributes)?;
        self.writer.write_event(Event::Empty(start))?;
        Ok(())
    }

    /// Flushes pending output and returns the inner writer.
    ///
    /// # Errors
    ///
    /// Returns an error if writing fails.
    pub fn into_inner(mut self) -> Result<W> {
        self.flush_pending()?;
        let mut inner = self.writer.into_inner();
        inner.flush()?;
        Ok(inner)
    }

    fn flush_pending(&mut self) -> Result<()> {
        if let Some(tag) = self.pending_empty.take() {
            let start = self.bytes_start(tag.name(), tag.attributes())?;
            self.writer.write_event(Event::Start(start))?;
        }
        Ok(())
    }

    fn bytes_start(&self, name: &str, attributes: &[Attribute]) -> Result<BytesStart<'static>> {
        self.check_ascii(name, "element name")?;
        let mut start = BytesStart::new(name.to_string());
        for attr in attributes {
            if !self.ascii_only {
                start.push_attribute((attr.name.as_str(), attr.value.as_str()));
                continue;
            }
            self.check_ascii(&attr.name, "attribute name")?;
            let value = ascii_escape(&escape(attr.value.as_str())).into_owned();
            start.push_attribute(XmlAttribute {
                key: QName(attr.name.as_bytes()),
                value: Cow::Owned(value.into_bytes()),
            });
        }
        Ok(start)
    }

    /// Rejects content that cannot be written as a character reference.
    fn check_ascii(&self, text: &str, what: &str) -> Result<()> {
        if self.ascii_only && !text.is_ascii() {
            return Err(Error::unsupported_media(format!(
                "non-ASCII {what} cannot be written as us-ascii"
            )));
        }
        Ok(())
    }

    fn escape_text<'a>(&self, text: &'a str) -> Cow<'a, str> {
        let escaped = partial_escape(text);
        if !self.ascii_only {
            return escaped;
        }
        match escaped {
            Cow::Borrowed(text) => ascii_escape(text),
            Cow::Owned(text) => Cow::Owned(ascii_escape(&text).into_owned()),
        }
    }
}

/// Replaces every non-ASCII character with a hexadecimal character reference.
fn ascii_escape(text: &str) -> Cow<'_, str> {
    if text.is_ascii() {
        return Cow::Borrowed(text);
    }
    let mut out = String::with_capacity(text.len() + 8);
    for c in text.chars() {
        if c.is_ascii() {
            out.push(c);
        } else {
            let _ = write!(out, "&#x{:X};", u32::from(c));
        }
    }
    Cow::Owned(out)
}

impl<W: Write> TokenSink for XmlWriter<W> {
    fn write_token(&mut self, token: &Token) -> Result<()> {
        if let Token::End(end) = token {
            if let Some(tag) = self.pending_empty.take() {
                if tag.name() == end.name() {
                    let start = self.bytes_start(tag.name(), tag.attributes())?;
                    self.writer.write_event(Event::Empty(start))?;
                    return Ok(());
                }
                self.pending_empty = Some(tag);
            }
        }
        self.flush_pending()?;

        match token {
            Token::Start(tag) if tag.is_self_closing() => {
                self.pending_empty = Some(tag.clone());
            }
            Token::Start(tag) => {
                let start = self.bytes_start(tag.name(), tag.attributes())?;
                self.writer.write_event(Event::Start(start))?;
            }
            Token::End(end) => {
                self.writer.write_event(Event::End(BytesEnd::new(end.name())))?;
            }
            Token::Text(text) => {
                let escaped = self.escape_text(text);
                self.writer.write_event(Event::Text(BytesText::from_escaped(escaped)))?;
            }
            Token::CData(text) => {
                self.check_ascii(text, "CDATA section")?;
                self.writer.write_event(Event::CData(BytesCData::new(text.as_str())))?;
            }
            Token::Comment(text) => {
                self.check_ascii(text, "comment")?;
                self.writer
                    .write_event(Event::Comment(BytesText::from_escaped(text.as_str())))?;
            }
            Token::Binary(binary) => {
                self.writer
                    .write_event(Event::Text(BytesText::from_escaped(binary.to_base64())))?;
            }
        }
        Ok(())
    }
}

/// Writes every token of `tokens` to `sink`.
///
/// # Errors
///
/// Returns the first error of the sink.
pub fn write_all<'a>(
    sink: &mut dyn TokenSink,
    tokens: impl IntoIterator<Item = &'a Token>,
) -> Result<()> {
    for token in tokens {
        sink.write_token(token)?;
    }
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::xml::reader::{XmlTokenReader, read_all};
    use crate::xml::token::{BinaryData, EndTag};

    fn rewrite(xml: &str) -> String {
        let tokens = read_all(&mut XmlTokenReader::from_bytes(xml.to_string())).unwrap();
        let mut writer = XmlWriter::new(Vec::new());
        write_all(&mut writer, &tokens).unwrap();
        String::from_utf8(writer.into_inner().unwrap()).unwrap()
    }

    #[test]
    fn test_rewrite_is_byte_stable() {
        let xml = "<S:Envelope xmlns:S=\"urn:s\">\n  <S:Body>  <p:a xmlns:p=\"urn:p\" k=\"v\"/>\t</S:Body>\n</S:Envelope>";
        assert_eq!(rewrite(xml), xml);
    }

    #[test]
    fn test_rewrite_escapes_markup_only() {
        assert_eq!(rewrite("<a>1 &lt; 2 &amp; \"q\"</a>"), "<a>1 &lt; 2 &amp; \"q\"</a>");
        assert_eq!(rewrite("<a><![CDATA[<b>]]><!--c--></a>"), "<a><![CDATA[<b>]]><!--c--></a>");
    }

    #[test]
    fn test_self_closing_with_content_is_expanded() {
        let mut writer = XmlWriter::new(Vec::new());
        let tag = StartTag::new("a", None).self_closing(true);
        writer.write_token(&Token::Start(tag)).unwrap();
        writer.write_token(&Token::Text("x".to_string())).unwrap();
        writer.write_token(&Token::End(EndTag::new("a", None))).unwrap();
        assert_eq!(writer.into_inner().unwrap(), b"<a>x</a>");
    }

    #[test]
    fn test_binary_is_written_as_base64() {
        let mut writer = XmlWriter::new(Vec::new());
        writer
            .write_token(&Token::Binary(BinaryData::new(&b"\x00\x01\x02"[..], None)))
            .unwrap();
        assert_eq!(writer.into_inner().unwrap(), b"AAEC");
    }

    #[test]
    fn test_us_ascii_uses_character_references() {
        let mut writer = XmlWriter::for_charset(Vec::new(), "us-ascii");
        let tag = StartTag::new("m:a", None).with_attribute("title", "caf\u{e9} & co");
        writer.write_token(&Token::Start(tag)).unwrap();
        writer.write_token(&Token::Text("caf\u{e9} \u{1F600} <".to_string())).unwrap();
        writer.write_token(&Token::End(EndTag::new("m:a", None))).unwrap();

        let out = writer.into_inner().unwrap();
        assert!(out.is_ascii());
        assert_eq!(
            String::from_utf8(out).unwrap(),
            "<m:a title=\"caf&#xE9; &amp; co\">caf&#xE9; &#x1F600; &lt;</m:a>"
        );
    }

    #[test]
    fn test_us_ascii_rejects_non_ascii_names() {
        let mut writer = XmlWriter::for_charset(Vec::new(), "us-ascii");
        let err = writer
            .write_token(&Token::Start(StartTag::new("caf\u{e9}", None)))
            .unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::UnsupportedMedia);
        assert!(writer.write_token(&Token::Comment("\u{e9}".to_string())).is_err());

        let mut utf8 = XmlWriter::for_charset(Vec::new(), "utf-8");
        utf8.write_token(&Token::Text("caf\u{e9}".to_string())).unwrap();
        assert_eq!(utf8.into_inner().unwrap(), "caf\u{e9}".as_bytes());
    }

    #[test]
    fn test_declaration() {
        let mut writer = XmlWriter::new(Vec::new());
        writer.write_declaration("utf-8").unwrap();
        writer.write_empty("a", &[Attribute::new("b", "c")]).unwrap();
        assert_eq!(
            writer.into_inner().unwrap(),
            b"<?xml version=\"1.0\" encoding=\"utf-8\"?><a b=\"c\"/>"
        );
    }
}
