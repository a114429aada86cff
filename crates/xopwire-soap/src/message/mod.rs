//! Streaming SOAP messages.
//!
//! A [`StreamMessage`] owns a forward-only token reader positioned at the
//! first payload element. The wrapper tags and header blocks are read up
//! front; the payload is handed out exactly once, through
//! [`read_payload`](StreamMessage::read_payload),
//! [`write_payload_to`](StreamMessage::write_payload_to),
//! [`write_to`](StreamMessage::write_to) or [`consume`](StreamMessage::consume).
//! [`copy`](StreamMessage::copy) captures the rest of the stream into a
//! shared buffer so the payload can be read again.

mod headers;
mod infoset;

pub use headers::{HeaderBlock, HeaderBlocks, MessageHeaders};
pub use infoset::{DEFAULT_PREFIX, TagInfoset};

use crate::codec::EncodedContentType;
use crate::error::{Error, Result};
use crate::version::SoapVersion;
use crate::xml::{
    EndTag, StartTag, Token, TokenBuffer, TokenReader, TokenSink, VecTokenReader, XmlTokenReader,
    is_xml_whitespace, read_all,
};
use bytes::Bytes;
use std::collections::VecDeque;
use std::fmt;
use std::panic::Location;
use xopwire_mime::{Attachment, AttachmentSet};

/// Whitespace found between the envelope-level tags.
///
/// `None` means the tags were adjacent. A decoded message reports exactly
/// the text it saw and writes it back unchanged.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnvelopeSpacing {
    /// Between the envelope start tag and the first child.
    pub envelope_prologue: Option<String>,
    /// Between the header end tag and the body start tag.
    pub before_body: Option<String>,
    /// Between the body end tag and the envelope end tag.
    pub envelope_epilogue: Option<String>,
}

/// How a decoded message was packaged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodeInfo {
    /// The content type the message arrived with.
    pub content_type: String,
    /// Character encoding of the root part.
    pub charset: String,
    /// True if the message was MTOM/XOP encoded.
    pub mtom: bool,
}

enum PayloadState {
    Streaming {
        reader: Box<dyn TokenReader>,
        lookahead: VecDeque<Token>,
    },
    EmptyBody,
    Consumed {
        site: &'static Location<'static>,
    },
}

/// A SOAP message whose payload is read from a token stream.
pub struct StreamMessage {
    version: SoapVersion,
    envelope: TagInfoset,
    header: Option<TagInfoset>,
    headers: MessageHeaders,
    body: TagInfoset,
    spacing: EnvelopeSpacing,
    body_prologue: Option<String>,
    body_epilogue: Option<String>,
    payload: Option<StartTag>,
    state: PayloadState,
    attachments: AttachmentSet,
    soap_action: Option<String>,
    decode_info: Option<DecodeInfo>,
    content_type: Option<EncodedContentType>,
}

impl StreamMessage {
    /// Reads a complete envelope from `reader`.
    ///
    /// The envelope, header and body tags must be in the namespace of
    /// `version`. On return the reader is positioned at the first payload
    /// element; a message without payload has already drained and dropped
    /// its reader.
    ///
    /// # Errors
    ///
    /// Returns a malformed-stream error if the token sequence is not a SOAP
    /// envelope of this version.
    pub fn read(version: SoapVersion, mut reader: Box<dyn TokenReader>) -> Result<Self> {
        let namespace = version.namespace();

        let envelope = loop {
            match next_required(&mut *reader, "envelope")? {
                Token::Start(tag) if tag.is(namespace, "Envelope") => break TagInfoset::new(tag),
                Token::Start(tag) if tag.local_name() == "Envelope" => {
                    return Err(Error::malformed(format!(
                        "envelope namespace {:?} does not match {version}",
                        tag.namespace().unwrap_or_default()
                    )));
                }
                Token::Start(tag) => {
                    return Err(Error::malformed(format!(
                        "expected Envelope, found '{}'",
                        tag.name()
                    )));
                }
                token if is_ignorable(&token) => {}
                _ => return Err(Error::malformed("content before the envelope")),
            }
        };

        let mut spacing = EnvelopeSpacing::default();
        let (first, prologue) = next_element(&mut *reader)?;
        spacing.envelope_prologue = prologue;

        let mut header = None;
        let mut headers = MessageHeaders::new();
        let body_tag = if first.is(namespace, "Header") {
            headers = MessageHeaders::from_tokens(read_element_content(&mut *reader, &first)?)?;
            header = Some(TagInfoset::new(first));

            let (next, before_body) = next_element(&mut *reader)?;
            spacing.before_body = before_body;
            next
        } else {
            first
        };
        if !body_tag.is(namespace, "Body") {
            return Err(Error::malformed(format!(
                "expected Body, found '{}'",
                body_tag.name()
            )));
        }

        let mut message = Self::assemble(version, envelope, TagInfoset::new(body_tag));
        message.header = header;
        message.headers = headers;
        message.spacing = spacing;
        message.scan_body(reader)?;

        tracing::debug!(
            %version,
            payload = message.payload_local_name().unwrap_or("-"),
            headers = message.headers.len(),
            "Read SOAP envelope"
        );
        Ok(message)
    }

    /// Builds a fresh message around a payload.
    ///
    /// `payload` yields the body content only: zero or more elements,
    /// optionally surrounded by whitespace. The envelope and body tags use
    /// the `S` prefix.
    ///
    /// # Errors
    ///
    /// Returns an error if the payload starts with something other than an
    /// element or whitespace.
    pub fn new(version: SoapVersion, payload: Box<dyn TokenReader>) -> Result<Self> {
        let envelope = TagInfoset::envelope(version);
        let body = TagInfoset::body(version);
        let reader = Terminated {
            payload,
            tail: VecDeque::from([body.end_token(), envelope.end_token()]),
        };

        let mut message = Self::assemble(version, envelope, body);
        message.scan_body(Box::new(reader))?;
        Ok(message)
    }

    /// Builds a fresh message from payload XML text.
    ///
    /// # Errors
    ///
    /// Returns an error if the payload cannot be read.
    pub fn from_payload_xml(version: SoapVersion, xml: impl Into<Bytes>) -> Result<Self> {
        Self::new(version, Box::new(XmlTokenReader::from_bytes(xml)))
    }

    /// Builds a fresh message from payload tokens.
    ///
    /// # Errors
    ///
    /// Returns an error if the payload does not start with an element.
    pub fn from_tokens(version: SoapVersion, tokens: Vec<Token>) -> Result<Self> {
        Self::new(version, Box::new(VecTokenReader::new(tokens)))
    }

    /// Builds a fresh message with an empty body.
    #[must_use]
    pub fn empty(version: SoapVersion) -> Self {
        Self::assemble(
            version,
            TagInfoset::envelope(version),
            TagInfoset::body(version),
        )
    }

    fn assemble(version: SoapVersion, envelope: TagInfoset, body: TagInfoset) -> Self {
        Self {
            version,
            envelope,
            header: None,
            headers: MessageHeaders::new(),
            body,
            spacing: EnvelopeSpacing::default(),
            body_prologue: None,
            body_epilogue: None,
            payload: None,
            state: PayloadState::EmptyBody,
            attachments: AttachmentSet::new(),
            soap_action: None,
            decode_info: None,
            content_type: None,
        }
    }

    /// Reads past the body start tag up to the first payload element.
    ///
    /// The prologue ends at the first comment; the comment and anything up
    /// to the payload element are kept in front of the payload.
    fn scan_body(&mut self, mut reader: Box<dyn TokenReader>) -> Result<()> {
        let mut prologue: Option<String> = None;
        let mut leading = VecDeque::new();
        loop {
            match next_required(&mut *reader, "body")? {
                Token::Text(text) if is_xml_whitespace(&text) => {
                    if leading.is_empty() {
                        prologue.get_or_insert_with(String::new).push_str(&text);
                    } else {
                        leading.push_back(Token::Text(text));
                    }
                }
                Token::Comment(text) => leading.push_back(Token::Comment(text)),
                Token::Start(tag) => {
                    self.body_prologue = prologue;
                    self.payload = Some(tag.clone());
                    leading.push_back(Token::Start(tag));
                    self.state = PayloadState::Streaming {
                        reader,
                        lookahead: leading,
                    };
                    return Ok(());
                }
                Token::End(end) if !leading.is_empty() => {
                    // Comments without a payload element still stream.
                    self.body_prologue = prologue;
                    leading.push_back(Token::End(end));
                    self.state = PayloadState::Streaming {
                        reader,
                        lookahead: leading,
                    };
                    return Ok(());
                }
                Token::End(end) => {
                    check_body_end(self.version, self.body.local_name(), &end)?;
                    self.body_prologue = prologue;
                    self.spacing.envelope_epilogue =
                        finish_envelope(&mut *reader, self.version, &self.envelope)?;
                    self.state = PayloadState::EmptyBody;
                    return Ok(());
                }
                _ => return Err(Error::malformed("character content in the body")),
            }
        }
    }

    /// Returns the SOAP version.
    #[must_use]
    pub const fn version(&self) -> SoapVersion {
        self.version
    }

    /// Returns the envelope tag.
    #[must_use]
    pub const fn envelope_tag(&self) -> &TagInfoset {
        &self.envelope
    }

    /// Returns the header tag, if the message has a header.
    #[must_use]
    pub const fn header_tag(&self) -> Option<&TagInfoset> {
        self.header.as_ref()
    }

    /// Returns the body tag.
    #[must_use]
    pub const fn body_tag(&self) -> &TagInfoset {
        &self.body
    }

    /// Returns the header blocks.
    #[must_use]
    pub const fn headers(&self) -> &MessageHeaders {
        &self.headers
    }

    /// Appends a header block, adding a `Header` element if needed.
    ///
    /// # Errors
    ///
    /// Returns an error if `block` is not exactly one balanced element.
    pub fn add_header(&mut self, block: Vec<Token>) -> Result<()> {
        self.headers.add(block)?;
        if self.header.is_none() {
            self.header = Some(TagInfoset::header(self.version));
        }
        Ok(())
    }

    /// Returns true if the body has a payload element.
    ///
    /// Stays valid after the payload was consumed.
    #[must_use]
    pub const fn has_payload(&self) -> bool {
        self.payload.is_some()
    }

    /// Returns the local name of the first payload element.
    #[must_use]
    pub fn payload_local_name(&self) -> Option<&str> {
        self.payload.as_ref().map(StartTag::local_name)
    }

    /// Returns the namespace of the first payload element.
    #[must_use]
    pub fn payload_namespace(&self) -> Option<&str> {
        self.payload.as_ref().and_then(StartTag::namespace)
    }

    /// Returns the whitespace between the body start tag and the payload.
    #[must_use]
    pub fn body_prologue(&self) -> Option<&str> {
        self.body_prologue.as_deref()
    }

    /// Returns the whitespace between the payload and the body end tag.
    ///
    /// Known once the payload has been read.
    #[must_use]
    pub fn body_epilogue(&self) -> Option<&str> {
        self.body_epilogue.as_deref()
    }

    /// Returns the whitespace around the header and body tags.
    #[must_use]
    pub const fn spacing(&self) -> &EnvelopeSpacing {
        &self.spacing
    }

    /// Returns the attachments.
    #[must_use]
    pub const fn attachments(&self) -> &AttachmentSet {
        &self.attachments
    }

    /// Returns the attachments for modification.
    ///
    /// Drops a cached single-part content type, which attachments would
    /// turn into a multipart one.
    pub fn attachments_mut(&mut self) -> &mut AttachmentSet {
        self.drop_single_part_content_type();
        &mut self.attachments
    }

    /// Adds an attachment.
    ///
    /// Drops a cached single-part content type, like
    /// [`attachments_mut`](Self::attachments_mut).
    pub fn add_attachment(&mut self, attachment: Attachment) {
        self.drop_single_part_content_type();
        self.attachments.add(attachment);
    }

    fn drop_single_part_content_type(&mut self) {
        if self
            .content_type
            .as_ref()
            .is_some_and(|cached| !cached.is_multipart())
        {
            tracing::trace!("Dropping cached single-part content type");
            self.content_type = None;
        }
    }

    /// Returns the SOAP action.
    #[must_use]
    pub fn soap_action(&self) -> Option<&str> {
        self.soap_action.as_deref()
    }

    /// Sets the SOAP action and drops any cached content type.
    pub fn set_soap_action(&mut self, action: Option<String>) {
        self.soap_action = action;
        self.content_type = None;
    }

    /// Returns how the message was packaged, for decoded messages.
    #[must_use]
    pub const fn decode_info(&self) -> Option<&DecodeInfo> {
        self.decode_info.as_ref()
    }

    pub(crate) fn set_decode_info(&mut self, info: DecodeInfo) {
        self.decode_info = Some(info);
    }

    pub(crate) fn set_attachments(&mut self, attachments: AttachmentSet) {
        self.attachments = attachments;
    }

    /// Returns the content type computed for the next encode, if any.
    #[must_use]
    pub const fn cached_content_type(&self) -> Option<&EncodedContentType> {
        self.content_type.as_ref()
    }

    pub(crate) fn cache_content_type(&mut self, content_type: EncodedContentType) {
        self.content_type = Some(content_type);
    }

    pub(crate) fn take_content_type(&mut self) -> Option<EncodedContentType> {
        self.content_type.take()
    }

    /// Returns true once the payload has been read.
    #[must_use]
    pub const fn is_consumed(&self) -> bool {
        matches!(self.state, PayloadState::Consumed { .. })
    }

    /// Takes the payload stream, marking the message consumed.
    ///
    /// An empty body yields an empty stream and stays readable.
    #[track_caller]
    fn take_payload(&mut self) -> Result<PayloadReader> {
        let site = Location::caller();
        match std::mem::replace(&mut self.state, PayloadState::Consumed { site }) {
            PayloadState::Streaming { reader, lookahead } => Ok(PayloadReader::new(
                reader,
                lookahead,
                self.version,
                self.body.tag().end(),
            )),
            PayloadState::EmptyBody => {
                self.state = PayloadState::EmptyBody;
                Ok(PayloadReader::finished())
            }
            PayloadState::Consumed { site } => {
                self.state = PayloadState::Consumed { site };
                Err(Error::AlreadyConsumed { site })
            }
        }
    }

    /// Hands out the payload as a token stream ending before the body end tag.
    ///
    /// # Errors
    ///
    /// Returns [`Error::AlreadyConsumed`] if the payload was already read.
    #[track_caller]
    pub fn read_payload(&mut self) -> Result<PayloadReader> {
        self.take_payload()
    }

    /// Reads the whole payload into memory.
    ///
    /// # Errors
    ///
    /// Returns [`Error::AlreadyConsumed`] if the payload was already read, or
    /// a malformed-stream error from the reader.
    #[track_caller]
    pub fn read_payload_tokens(&mut self) -> Result<Vec<Token>> {
        let mut payload = self.take_payload()?;
        let tokens = read_all(&mut payload)?;
        self.finish_payload(payload)?;
        Ok(tokens)
    }

    /// Copies every payload element to `sink`.
    ///
    /// Several top-level elements are copied in order, with the whitespace
    /// between them; copying stops at the body end tag.
    ///
    /// # Errors
    ///
    /// Returns [`Error::AlreadyConsumed`] if the payload was already read, or
    /// the first error of the reader or the sink.
    #[track_caller]
    pub fn write_payload_to(&mut self, sink: &mut dyn TokenSink) -> Result<()> {
        let mut payload = self.take_payload()?;
        while let Some(token) = payload.next_token()? {
            sink.write_token(&token)?;
        }
        self.finish_payload(payload)
    }

    /// Writes the whole envelope to `sink`.
    ///
    /// Wrapper tags are written as they were read, and the whitespace
    /// recorded around them is reproduced. A message with an empty body can
    /// be written any number of times; a streamed payload is consumed.
    ///
    /// # Errors
    ///
    /// Returns [`Error::AlreadyConsumed`] if the payload was already read, or
    /// the first error of the reader or the sink.
    #[track_caller]
    pub fn write_to(&mut self, sink: &mut dyn TokenSink) -> Result<()> {
        let mut payload = self.take_payload()?;

        sink.write_token(&self.envelope.start_token())?;
        write_spacing(sink, self.spacing.envelope_prologue.as_deref())?;
        if let Some(header) = &self.header {
            sink.write_token(&header.start_token())?;
            for token in self.headers.tokens() {
                sink.write_token(token)?;
            }
            sink.write_token(&header.end_token())?;
            write_spacing(sink, self.spacing.before_body.as_deref())?;
        }
        sink.write_token(&self.body.start_token())?;
        write_spacing(sink, self.body_prologue.as_deref())?;

        while let Some(token) = payload.next_token()? {
            sink.write_token(&token)?;
        }
        self.finish_payload(payload)?;

        write_spacing(sink, self.body_epilogue.as_deref())?;
        sink.write_token(&self.body.end_token())?;
        write_spacing(sink, self.spacing.envelope_epilogue.as_deref())?;
        sink.write_token(&self.envelope.end_token())?;
        Ok(())
    }

    /// Drains the payload without looking at it.
    ///
    /// # Errors
    ///
    /// Returns [`Error::AlreadyConsumed`] if the payload was already read, or
    /// a malformed-stream error from the reader.
    #[track_caller]
    pub fn consume(&mut self) -> Result<()> {
        let mut payload = self.take_payload()?;
        while payload.next_token()?.is_some() {}
        self.finish_payload(payload)
    }

    /// Records the epilogue of a drained payload and reads the rest of the
    /// envelope.
    fn finish_payload(&mut self, payload: PayloadReader) -> Result<()> {
        if let Some((mut reader, epilogue)) = payload.into_tail() {
            self.body_epilogue = epilogue;
            self.spacing.envelope_epilogue =
                finish_envelope(&mut *reader, self.version, &self.envelope)?;
        }
        Ok(())
    }

    /// Captures the rest of the stream so the payload can be read twice.
    ///
    /// Both `self` and the returned message replay the same buffered
    /// tokens, each with its own cursor.
    ///
    /// # Errors
    ///
    /// Returns [`Error::AlreadyConsumed`] if the payload was already read, or
    /// a malformed-stream error from the reader.
    #[track_caller]
    pub fn copy(&mut self) -> Result<Self> {
        let site = Location::caller();
        match std::mem::replace(&mut self.state, PayloadState::Consumed { site }) {
            PayloadState::Streaming { reader, lookahead } => {
                let mut payload =
                    PayloadReader::new(reader, lookahead, self.version, self.body.tag().end());
                let mut tokens = read_all(&mut payload)?;
                let Some((mut reader, epilogue)) = payload.into_tail() else {
                    return Err(Error::malformed("payload stream ended early"));
                };
                if let Some(epilogue) = &epilogue {
                    tokens.push(Token::Text(epilogue.clone()));
                }
                tokens.push(self.body.end_token());
                tokens.extend(read_all(&mut *reader)?);
                drop(reader);

                let buffer = TokenBuffer::new(tokens);
                tracing::trace!(tokens = buffer.len(), "Buffered message for copy");
                self.body_epilogue = epilogue;
                self.state = PayloadState::Streaming {
                    reader: Box::new(buffer.cursor()),
                    lookahead: VecDeque::new(),
                };
                Ok(self.sibling(PayloadState::Streaming {
                    reader: Box::new(buffer.cursor()),
                    lookahead: VecDeque::new(),
                }))
            }
            PayloadState::EmptyBody => {
                self.state = PayloadState::EmptyBody;
                Ok(self.sibling(PayloadState::EmptyBody))
            }
            PayloadState::Consumed { site } => {
                self.state = PayloadState::Consumed { site };
                Err(Error::AlreadyConsumed { site })
            }
        }
    }

    fn sibling(&self, state: PayloadState) -> Self {
        Self {
            version: self.version,
            envelope: self.envelope.clone(),
            header: self.header.clone(),
            headers: self.headers.clone(),
            body: self.body.clone(),
            spacing: self.spacing.clone(),
            body_prologue: self.body_prologue.clone(),
            body_epilogue: self.body_epilogue.clone(),
            payload: self.payload.clone(),
            state,
            attachments: self.attachments.clone(),
            soap_action: self.soap_action.clone(),
            decode_info: self.decode_info.clone(),
            content_type: None,
        }
    }
}

impl fmt::Debug for StreamMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = match &self.state {
            PayloadState::Streaming { .. } => "streaming",
            PayloadState::EmptyBody => "empty",
            PayloadState::Consumed { .. } => "consumed",
        };
        f.debug_struct("StreamMessage")
            .field("version", &self.version)
            .field("payload", &self.payload_local_name())
            .field("state", &state)
            .field("headers", &self.headers.len())
            .field("attachments", &self.attachments.len())
            .finish_non_exhaustive()
    }
}

/// The payload of a [`StreamMessage`] as a token stream.
///
/// Ends before the body end tag. Whitespace directly in the body is only
/// passed on when another payload element follows it; the run in front of
/// the body end tag is the epilogue, available once the stream is done.
pub struct PayloadReader {
    inner: Option<PayloadInner>,
    queued: Option<Token>,
    depth: usize,
    pending_space: Option<String>,
    epilogue: Option<String>,
    finished: bool,
}

struct PayloadInner {
    reader: Box<dyn TokenReader>,
    lookahead: VecDeque<Token>,
    version: SoapVersion,
    body_end: EndTag,
}

impl PayloadReader {
    fn new(
        reader: Box<dyn TokenReader>,
        lookahead: VecDeque<Token>,
        version: SoapVersion,
        body_end: EndTag,
    ) -> Self {
        Self {
            inner: Some(PayloadInner {
                reader,
                lookahead,
                version,
                body_end,
            }),
            queued: None,
            depth: 0,
            pending_space: None,
            epilogue: None,
            finished: false,
        }
    }

    const fn finished() -> Self {
        Self {
            inner: None,
            queued: None,
            depth: 0,
            pending_space: None,
            epilogue: None,
            finished: true,
        }
    }

    /// Returns the whitespace found before the body end tag.
    ///
    /// `None` until the stream is exhausted, or if there was none.
    #[must_use]
    pub fn epilogue(&self) -> Option<&str> {
        self.epilogue.as_deref()
    }

    /// Returns the reader past the body end tag together with the epilogue.
    fn into_tail(self) -> Option<(Box<dyn TokenReader>, Option<String>)> {
        if !self.finished {
            return None;
        }
        self.inner.map(|inner| (inner.reader, self.epilogue))
    }
}

impl TokenReader for PayloadReader {
    fn next_token(&mut self) -> Result<Option<Token>> {
        if let Some(token) = self.queued.take() {
            return Ok(Some(token));
        }
        if self.finished {
            return Ok(None);
        }
        let Some(inner) = self.inner.as_mut() else {
            return Ok(None);
        };

        loop {
            let token = match inner.lookahead.pop_front() {
                Some(token) => token,
                None => next_required(&mut *inner.reader, "body")?,
            };

            if self.depth == 0 {
                match token {
                    Token::Text(text) if is_xml_whitespace(&text) => {
                        self.pending_space
                            .get_or_insert_with(String::new)
                            .push_str(&text);
                        continue;
                    }
                    Token::End(end) => {
                        check_body_end(inner.version, inner.body_end.local_name(), &end)?;
                        self.finished = true;
                        self.epilogue = self.pending_space.take();
                        return Ok(None);
                    }
                    _ => {}
                }
            }

            match &token {
                Token::Start(_) => self.depth += 1,
                Token::End(_) => self.depth -= 1,
                _ => {}
            }

            if let Some(space) = self.pending_space.take() {
                self.queued = Some(token);
                return Ok(Some(Token::Text(space)));
            }
            return Ok(Some(token));
        }
    }
}

impl fmt::Debug for PayloadReader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PayloadReader")
            .field("depth", &self.depth)
            .field("finished", &self.finished)
            .finish_non_exhaustive()
    }
}

/// A payload reader followed by fixed closing tokens.
struct Terminated {
    payload: Box<dyn TokenReader>,
    tail: VecDeque<Token>,
}

impl TokenReader for Terminated {
    fn next_token(&mut self) -> Result<Option<Token>> {
        match self.payload.next_token()? {
            Some(token) => Ok(Some(token)),
            None => Ok(self.tail.pop_front()),
        }
    }
}

fn next_required(reader: &mut dyn TokenReader, context: &str) -> Result<Token> {
    reader
        .next_token()?
        .ok_or_else(|| Error::malformed(format!("input ended inside the {context}")))
}

fn is_ignorable(token: &Token) -> bool {
    matches!(token, Token::Comment(_)) || token.is_whitespace()
}

/// Reads up to the next start tag, collecting the whitespace in front of it.
fn next_element(reader: &mut dyn TokenReader) -> Result<(StartTag, Option<String>)> {
    let mut space: Option<String> = None;
    loop {
        match next_required(reader, "envelope")? {
            Token::Start(tag) => return Ok((tag, space)),
            Token::Text(text) if is_xml_whitespace(&text) => {
                space.get_or_insert_with(String::new).push_str(&text);
            }
            Token::Comment(_) => {}
            Token::End(end) => {
                return Err(Error::malformed(format!(
                    "expected Body, found end tag '{}'",
                    end.name()
                )));
            }
            _ => return Err(Error::malformed("character content in the envelope")),
        }
    }
}

/// Reads the content of `tag` up to and excluding its end tag.
fn read_element_content(reader: &mut dyn TokenReader, tag: &StartTag) -> Result<Vec<Token>> {
    let mut tokens = Vec::new();
    let mut depth = 0usize;
    loop {
        let token = next_required(reader, tag.local_name())?;
        match &token {
            Token::Start(_) => depth += 1,
            Token::End(_) if depth == 0 => return Ok(tokens),
            Token::End(_) => depth -= 1,
            _ => {}
        }
        tokens.push(token);
    }
}

fn check_body_end(version: SoapVersion, body_local_name: &str, end: &EndTag) -> Result<()> {
    if end.is(version.namespace(), body_local_name) {
        Ok(())
    } else {
        Err(Error::malformed(format!(
            "expected end of {body_local_name}, found end tag '{}'",
            end.name()
        )))
    }
}

/// Reads the envelope end tag and drains the reader.
///
/// Returns the whitespace in front of the envelope end tag.
fn finish_envelope(
    reader: &mut dyn TokenReader,
    version: SoapVersion,
    envelope: &TagInfoset,
) -> Result<Option<String>> {
    let mut space: Option<String> = None;
    loop {
        match next_required(reader, "envelope")? {
            Token::Text(text) if is_xml_whitespace(&text) => {
                space.get_or_insert_with(String::new).push_str(&text);
            }
            Token::Comment(_) => {}
            Token::End(end) if end.is(version.namespace(), envelope.local_name()) => break,
            Token::Start(tag) => {
                return Err(Error::malformed(format!(
                    "unexpected element '{}' after Body",
                    tag.name()
                )));
            }
            _ => return Err(Error::malformed("expected end of Envelope")),
        }
    }

    while let Some(token) = reader.next_token()? {
        if !is_ignorable(&token) {
            return Err(Error::malformed("content after the envelope"));
        }
    }
    Ok(space)
}

fn write_spacing(sink: &mut dyn TokenSink, space: Option<&str>) -> Result<()> {
    match space {
        Some(space) if !space.is_empty() => sink.write_token(&Token::Text(space.to_string())),
        _ => Ok(()),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::version::SOAP11_NAMESPACE;
    use crate::xml::{XmlWriter, write_all};

    fn decode(xml: &str) -> Result<StreamMessage> {
        StreamMessage::read(
            SoapVersion::Soap11,
            Box::new(XmlTokenReader::from_bytes(xml.to_string())),
        )
    }

    fn envelope(inner: &str) -> String {
        format!("<soap:Envelope xmlns:soap=\"{SOAP11_NAMESPACE}\">{inner}</soap:Envelope>")
    }

    fn render(message: &mut StreamMessage) -> String {
        let mut writer = XmlWriter::new(Vec::new());
        message.write_to(&mut writer).unwrap();
        String::from_utf8(writer.into_inner().unwrap()).unwrap()
    }

    #[test]
    fn test_read_payload_metadata() {
        let message = decode(&envelope(
            "<soap:Body><m:Ping xmlns:m=\"urn:m\"><v>1</v></m:Ping></soap:Body>",
        ))
        .unwrap();
        assert!(message.has_payload());
        assert_eq!(message.payload_local_name(), Some("Ping"));
        assert_eq!(message.payload_namespace(), Some("urn:m"));
        assert!(message.header_tag().is_none());
        assert!(!message.is_consumed());
    }

    #[test]
    fn test_rewrite_is_byte_stable() {
        let xml = envelope(
            "\n  <soap:Header>\n    <h:Id xmlns:h=\"urn:h\">7</h:Id>\n  </soap:Header>\n  <soap:Body>  <p/>\n<q/>  </soap:Body>\n",
        );
        let mut message = decode(&xml).unwrap();
        assert_eq!(message.headers().len(), 1);
        assert_eq!(message.body_prologue(), Some("  "));
        assert_eq!(render(&mut message), xml);
        assert_eq!(message.body_epilogue(), Some("  "));
        assert_eq!(message.spacing().envelope_epilogue.as_deref(), Some("\n"));
    }

    #[test]
    fn test_second_read_fails_with_site() {
        let mut message = decode(&envelope("<soap:Body><p/></soap:Body>")).unwrap();
        message.read_payload_tokens().unwrap();

        let err = message.read_payload_tokens().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::StateViolation);
        assert!(err.to_string().contains("mod.rs"));
        assert!(message.write_to(&mut Vec::<Token>::new()).is_err());
        assert!(message.consume().is_err());
        assert!(message.copy().is_err());
    }

    #[test]
    fn test_payload_reader_stops_at_body_end() {
        let mut message =
            decode(&envelope("<soap:Body> <a>x</a> <b/> </soap:Body>")).unwrap();
        let mut payload = message.read_payload().unwrap();
        let tokens = read_all(&mut payload).unwrap();
        assert_eq!(tokens.len(), 6);
        assert_eq!(tokens[3], Token::Text(" ".to_string()));
        assert_eq!(payload.epilogue(), Some(" "));
    }

    #[test]
    fn test_copy_replays_payload() {
        let mut message = decode(&envelope("<soap:Body><p>1</p> </soap:Body>")).unwrap();
        let mut copy = message.copy().unwrap();
        assert_eq!(message.body_epilogue(), Some(" "));

        let original = message.read_payload_tokens().unwrap();
        let copied = copy.read_payload_tokens().unwrap();
        assert_eq!(original, copied);
        assert_eq!(original.len(), 3);
        assert!(message.read_payload_tokens().is_err());
        assert!(copy.read_payload_tokens().is_err());
    }

    #[test]
    fn test_copy_then_write_both() {
        let xml = envelope("<soap:Body><p/></soap:Body>");
        let mut message = decode(&xml).unwrap();
        let mut copy = message.copy().unwrap();
        assert_eq!(render(&mut copy), xml);
        assert_eq!(render(&mut message), xml);
    }

    #[test]
    fn test_empty_body() {
        let xml = envelope("<soap:Body></soap:Body>");
        let mut message = decode(&xml).unwrap();
        assert!(!message.has_payload());
        assert!(message.read_payload_tokens().unwrap().is_empty());
        assert_eq!(render(&mut message), xml);
        assert_eq!(render(&mut message), xml);
        assert!(!message.copy().unwrap().has_payload());
    }

    #[test]
    fn test_wrong_body_end_is_malformed() {
        let tokens = vec![
            Token::Start(StartTag::new("S:Envelope", Some(SOAP11_NAMESPACE))),
            Token::Start(StartTag::new("S:Body", Some(SOAP11_NAMESPACE))),
            Token::End(EndTag::new("S:Header", Some(SOAP11_NAMESPACE))),
        ];
        let err = StreamMessage::read(SoapVersion::Soap11, Box::new(VecTokenReader::new(tokens)))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Malformed);
    }

    #[test]
    fn test_truncated_payload_is_malformed() {
        let tokens = vec![
            Token::Start(StartTag::new("S:Envelope", Some(SOAP11_NAMESPACE))),
            Token::Start(StartTag::new("S:Body", Some(SOAP11_NAMESPACE))),
            Token::Start(StartTag::new("p", None)),
            Token::End(EndTag::new("p", None)),
        ];
        let mut message =
            StreamMessage::read(SoapVersion::Soap11, Box::new(VecTokenReader::new(tokens)))
                .unwrap();
        let err = message.consume().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Malformed);
    }

    #[test]
    fn test_version_mismatch() {
        let err = StreamMessage::read(
            SoapVersion::Soap12,
            Box::new(XmlTokenReader::from_bytes(envelope("<soap:Body/>"))),
        )
        .unwrap_err();
        assert!(err.to_string().contains("SOAP 1.2"));
    }

    #[test]
    fn test_fresh_message() {
        let mut message =
            StreamMessage::from_payload_xml(SoapVersion::Soap11, &b"<p a=\"1\"/><q/>"[..]).unwrap();
        message
            .add_header(vec![
                Token::Start(StartTag::new("h", None)),
                Token::End(EndTag::new("h", None)),
            ])
            .unwrap();
        assert_eq!(message.payload_local_name(), Some("p"));
        assert_eq!(
            render(&mut message),
            format!(
                "<S:Envelope xmlns:S=\"{SOAP11_NAMESPACE}\"><S:Header><h></h></S:Header><S:Body><p a=\"1\"/><q/></S:Body></S:Envelope>"
            )
        );
    }

    #[test]
    fn test_empty_message_wrapper() {
        let mut message = StreamMessage::empty(SoapVersion::Soap11);
        assert_eq!(
            render(&mut message),
            format!("<S:Envelope xmlns:S=\"{SOAP11_NAMESPACE}\"><S:Body></S:Body></S:Envelope>")
        );
    }

    #[test]
    fn test_write_payload_to_collects_elements() {
        let mut message = decode(&envelope("<soap:Body><a/>\n<b>t</b></soap:Body>")).unwrap();
        let mut tokens: Vec<Token> = Vec::new();
        message.write_payload_to(&mut tokens).unwrap();

        let mut writer = XmlWriter::new(Vec::new());
        write_all(&mut writer, &tokens).unwrap();
        assert_eq!(writer.into_inner().unwrap(), b"<a/>\n<b>t</b>");
        assert!(message.is_consumed());
        assert_eq!(message.body_epilogue(), None);
    }

    #[test]
    fn test_comments_before_payload_are_kept() {
        let xml = envelope("<soap:Body>  <!--c--> <p/></soap:Body>");
        let mut message = decode(&xml).unwrap();
        assert_eq!(message.body_prologue(), Some("  "));
        assert_eq!(message.payload_local_name(), Some("p"));
        assert_eq!(render(&mut message), xml);

        let mut message = decode(&xml).unwrap();
        let tokens = message.read_payload_tokens().unwrap();
        assert_eq!(tokens[0], Token::Comment("c".to_string()));
        assert_eq!(tokens[1], Token::Text(" ".to_string()));
        assert!(matches!(&tokens[2], Token::Start(tag) if tag.local_name() == "p"));
    }

    #[test]
    fn test_comment_only_body() {
        let xml = envelope("<soap:Body><!--only--></soap:Body>");
        let mut message = decode(&xml).unwrap();
        assert!(!message.has_payload());
        assert_eq!(render(&mut message), xml);
    }

    #[test]
    fn test_draining_reads_envelope_tail() {
        let xml = envelope("<soap:Body><p/></soap:Body>\n");
        let mut message = decode(&xml).unwrap();
        message.read_payload_tokens().unwrap();
        assert_eq!(message.spacing().envelope_epilogue.as_deref(), Some("\n"));

        let mut message = decode(&envelope("<soap:Body><p/></soap:Body><x/>")).unwrap();
        let err = message.write_payload_to(&mut Vec::<Token>::new()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Malformed);

        let mut message = decode(&envelope("<soap:Body><p/></soap:Body><x/>")).unwrap();
        let err = message.read_payload_tokens().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Malformed);
    }
}
