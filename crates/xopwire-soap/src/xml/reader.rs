//! Pull-style token readers.

use crate::error::{Error, Result};
use crate::xml::token::{Attribute, EndTag, StartTag, Token};
use bytes::Bytes;
use quick_xml::NsReader;
use quick_xml::events::{BytesStart, Event};
use quick_xml::name::ResolveResult;
use std::collections::VecDeque;
use std::io::{BufRead, Cursor};
use std::sync::Arc;

/// A forward-only source of XML tokens.
pub trait TokenReader {
    /// Returns the next token, or `None` once the input is exhausted.
    ///
    /// # Errors
    ///
    /// Returns an error if the input is not well-formed.
    fn next_token(&mut self) -> Result<Option<Token>>;
}

impl<R: TokenReader + ?Sized> TokenReader for Box<R> {
    fn next_token(&mut self) -> Result<Option<Token>> {
        (**self).next_token()
    }
}

/// Reads tokens from XML text with namespace resolution.
///
/// `<empty/>` elements are reported as a self-closing start tag followed by
/// its end tag, so consumers only ever deal with balanced pairs.
pub struct XmlTokenReader<R: BufRead> {
    reader: NsReader<R>,
    buf: Vec<u8>,
    pending: Option<Token>,
    done: bool,
}

impl XmlTokenReader<Cursor<Bytes>> {
    /// Creates a reader over an in-memory document.
    #[must_use]
    pub fn from_bytes(xml: impl Into<Bytes>) -> Self {
        Self::new(Cursor::new(xml.into()))
    }
}

impl<R: BufRead> XmlTokenReader<R> {
    /// Creates a reader over buffered input.
    pub fn new(input: R) -> Self {
        let mut reader = NsReader::from_reader(input);
        reader.config_mut().trim_text(false);
        Self {
            reader,
            buf: Vec::new(),
            pending: None,
            done: false,
        }
    }

    fn read(&mut self) -> Result<Option<Token>> {
        loop {
            self.buf.clear();
            let (resolved, event) = self.reader.read_resolved_event_into(&mut self.buf)?;
            let token = match event {
                Event::Start(start) => Token::Start(start_tag(&resolved, &start, false)?),
                Event::Empty(start) => {
                    let tag = start_tag(&resolved, &start, true)?;
                    self.pending = Some(Token::End(tag.end()));
                    Token::Start(tag)
                }
                Event::End(end) => Token::End(EndTag::new(
                    utf8(end.name().as_ref())?,
                    namespace(&resolved)?.as_deref(),
                )),
                Event::Text(text) => {
                    if text.is_empty() {
                        continue;
                    }
                    Token::Text(text.unescape()?.into_owned())
                }
                Event::CData(cdata) => Token::CData(utf8(&cdata)?.to_string()),
                Event::Comment(comment) => Token::Comment(utf8(&comment)?.to_string()),
                Event::DocType(_) => {
                    return Err(Error::malformed("document type declarations are not allowed"));
                }
                Event::Eof => return Ok(None),
                _ => continue,
            };
            return Ok(Some(token));
        }
    }
}

impl<R: BufRead> TokenReader for XmlTokenReader<R> {
    fn next_token(&mut self) -> Result<Option<Token>> {
        if let Some(token) = self.pending.take() {
            return Ok(Some(token));
        }
        if self.done {
            return Ok(None);
        }
        let token = self.read()?;
        self.done = token.is_none();
        Ok(token)
    }
}

fn utf8(bytes: &[u8]) -> Result<&str> {
    std::str::from_utf8(bytes).map_err(|e| Error::malformed(format!("invalid UTF-8: {e}")))
}

fn namespace(resolved: &ResolveResult<'_>) -> Result<Option<String>> {
    match resolved {
        ResolveResult::Bound(ns) => Ok(Some(utf8(ns.as_ref())?.to_string())),
        ResolveResult::Unbound => Ok(None),
        ResolveResult::Unknown(prefix) => Err(Error::malformed(format!(
            "undeclared namespace prefix '{}'",
            String::from_utf8_lossy(prefix)
        ))),
    }
}

fn start_tag(resolved: &ResolveResult<'_>, start: &BytesStart<'_>, empty: bool) -> Result<StartTag> {
    let mut attributes = Vec::new();
    for attr in start.attributes() {
        let attr = attr?;
        attributes.push(Attribute::new(
            utf8(attr.key.as_ref())?,
            attr.unescape_value()?.into_owned(),
        ));
    }
    Ok(StartTag::from_parts(
        utf8(start.name().as_ref())?.to_string(),
        namespace(resolved)?,
        attributes,
        empty,
    ))
}

/// Replays a fixed list of tokens.
#[derive(Debug, Clone, Default)]
pub struct VecTokenReader {
    tokens: VecDeque<Token>,
}

impl VecTokenReader {
    /// Creates a reader over `tokens`.
    #[must_use]
    pub fn new(tokens: impl IntoIterator<Item = Token>) -> Self {
        Self {
            tokens: tokens.into_iter().collect(),
        }
    }
}

impl TokenReader for VecTokenReader {
    fn next_token(&mut self) -> Result<Option<Token>> {
        Ok(self.tokens.pop_front())
    }
}

/// An immutable, shareable token sequence.
///
/// Any number of [`BufferCursor`]s can replay it independently.
#[derive(Debug, Clone)]
pub struct TokenBuffer {
    tokens: Arc<[Token]>,
}

impl TokenBuffer {
    /// Captures `tokens`.
    #[must_use]
    pub fn new(tokens: Vec<Token>) -> Self {
        Self {
            tokens: tokens.into(),
        }
    }

    /// Returns a cursor positioned at the first token.
    #[must_use]
    pub fn cursor(&self) -> BufferCursor {
        BufferCursor {
            tokens: Arc::clone(&self.tokens),
            pos: 0,
        }
    }

    /// Returns the captured tokens.
    #[must_use]
    pub fn tokens(&self) -> &[Token] {
        &self.tokens
    }

    /// Returns the number of captured tokens.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    /// Returns true if nothing was captured.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }
}

/// Index-based reader over a [`TokenBuffer`].
#[derive(Debug, Clone)]
pub struct BufferCursor {
    tokens: Arc<[Token]>,
    pos: usize,
}

impl BufferCursor {
    /// Returns the number of tokens not yet read.
    #[must_use]
    pub fn remaining(&self) -> usize {
        self.tokens.len() - self.pos
    }
}

impl TokenReader for BufferCursor {
    fn next_token(&mut self) -> Result<Option<Token>> {
        let token = self.tokens.get(self.pos).cloned();
        if token.is_some() {
            self.pos += 1;
        }
        Ok(token)
    }
}

/// Reads every remaining token.
///
/// # Errors
///
/// Returns the first error of the reader.
pub fn read_all(reader: &mut dyn TokenReader) -> Result<Vec<Token>> {
    let mut tokens = Vec::new();
    while let Some(token) = reader.next_token()? {
        tokens.push(token);
    }
    Ok(tokens)
}
