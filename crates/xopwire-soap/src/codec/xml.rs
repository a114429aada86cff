//! Plain XML envelopes.

use super::{RootCodec, RootDescriptor, RootPart, WrittenRoot, resolve_charset};
use crate::config::CodecConfig;
use crate::error::Result;
use crate::message::{DecodeInfo, StreamMessage};
use crate::version::SoapVersion;
use crate::xml::{Token, TokenSink, XmlTokenReader, XmlWriter};
use std::collections::HashSet;
use std::io::Write;
use xopwire_mime::{ContentId, ContentType};

/// Writes the envelope as XML text with binary content inlined as base64.
///
/// Alone it produces `text/xml` (SOAP 1.1) or `application/soap+xml`
/// (SOAP 1.2) messages; inside [`MimeCodec`](super::MimeCodec) it is the
/// root of SOAP-with-attachments packages.
#[derive(Debug, Clone, Default)]
pub struct XmlCodec {
    config: CodecConfig,
}

impl XmlCodec {
    /// Creates the codec.
    #[must_use]
    pub const fn new(config: CodecConfig) -> Self {
        Self { config }
    }
}

/// Content type of a bare envelope: the version's media type with charset
/// and, for SOAP 1.2, the action.
pub(super) fn envelope_content_type(
    version: SoapVersion,
    charset: &str,
    action: Option<&str>,
) -> ContentType {
    let mut content_type = ContentType::parse(version.media_type())
        .unwrap_or_else(|_| ContentType::new("text", "xml"))
        .with_parameter("charset", charset);
    if let Some(action) = action.filter(|_| version.has_action_parameter()) {
        content_type.set_parameter("action", action);
    }
    content_type
}

/// Passes tokens on, noting which attachments are written inline.
struct InlineTracker<S> {
    inner: S,
    inlined: HashSet<ContentId>,
}

impl<S: TokenSink> TokenSink for InlineTracker<S> {
    fn write_token(&mut self, token: &Token) -> Result<()> {
        if let Token::Binary(binary) = token {
            if let Some(content_id) = binary.content_id() {
                self.inlined.insert(content_id.clone());
            }
        }
        self.inner.write_token(token)
    }
}

impl RootCodec for XmlCodec {
    fn name(&self) -> &'static str {
        "xml"
    }

    fn config(&self) -> &CodecConfig {
        &self.config
    }

    fn requires_multipart(&self) -> bool {
        false
    }

    fn describe(&self, message: &StreamMessage, charset: &str) -> RootDescriptor {
        let version = message.version();
        RootDescriptor {
            content_type: envelope_content_type(version, charset, message.soap_action()).to_string(),
            package_type: version.media_type().to_string(),
            start_info: None,
            identified: false,
        }
    }

    fn write_root(
        &self,
        message: &mut StreamMessage,
        out: &mut dyn Write,
        charset: &str,
    ) -> Result<WrittenRoot> {
        let mut writer = XmlWriter::for_charset(out, charset);
        if self.config.write_xml_declaration {
            writer.write_declaration(charset)?;
        }
        let mut tracker = InlineTracker {
            inner: writer,
            inlined: HashSet::new(),
        };
        message.write_to(&mut tracker)?;
        tracker.inner.into_inner()?;
        Ok(WrittenRoot {
            generated: Vec::new(),
            inlined: tracker.inlined,
        })
    }

    fn read_root(&self, root: RootPart) -> Result<StreamMessage> {
        let charset = resolve_charset(root.content_type.as_ref().and_then(ContentType::charset))?;
        let action = root.soap_action();

        let mut message = StreamMessage::read(
            root.version,
            Box::new(XmlTokenReader::from_bytes(root.body)),
        )?;
        message.set_attachments(root.attachments);
        if action.is_some() {
            message.set_soap_action(action);
        }
        message.set_decode_info(DecodeInfo {
            content_type: root.content_type_header,
            charset: charset.to_string(),
            mtom: false,
        });
        Ok(message)
    }
}
