//! MTOM/XOP packaging.
//!
//! Encode writes the envelope through [`MtomWriter`], which turns binary
//! content of at least `threshold` bytes into an attachment and an
//! `xop:Include` reference. Decode reads the root part through
//! [`XopReader`], which turns the references back into binary content.

use super::xop::{XOP_INCLUDE, XOP_NAMESPACE, XopReader};
use super::{RootCodec, RootDescriptor, RootPart, WrittenRoot, resolve_charset};
use crate::config::CodecConfig;
use crate::error::Result;
use crate::message::{DecodeInfo, StreamMessage};
use crate::xml::{BinaryData, EndTag, StartTag, Token, TokenSink, XmlTokenReader, XmlWriter};
use std::collections::HashSet;
use std::io::Write;
use xopwire_mime::{Attachment, ContentId, ContentType};

/// Media type of an XOP root part.
pub const XOP_MEDIA_TYPE: &str = "application/xop+xml";

/// Root codec for MTOM messages.
#[derive(Debug, Clone, Default)]
pub struct MtomCodec {
    config: CodecConfig,
}

impl MtomCodec {
    /// Creates the codec.
    #[must_use]
    pub const fn new(config: CodecConfig) -> Self {
        Self { config }
    }
}

impl RootCodec for MtomCodec {
    fn name(&self) -> &'static str {
        "mtom"
    }

    fn config(&self) -> &CodecConfig {
        &self.config
    }

    fn requires_multipart(&self) -> bool {
        true
    }

    fn describe(&self, message: &StreamMessage, charset: &str) -> RootDescriptor {
        let start_info = message
            .version()
            .media_type_with_action(message.soap_action());
        let content_type = ContentType::new("application", "xop+xml")
            .with_parameter("charset", charset)
            .with_parameter("type", start_info.as_str());

        RootDescriptor {
            content_type: content_type.to_string(),
            package_type: XOP_MEDIA_TYPE.to_string(),
            start_info: Some(start_info),
            identified: true,
        }
    }

    fn write_root(
        &self,
        message: &mut StreamMessage,
        out: &mut dyn Write,
        charset: &str,
    ) -> Result<WrittenRoot> {
        let mut xml = XmlWriter::for_charset(out, charset);
        if self.config.write_xml_declaration {
            xml.write_declaration(charset)?;
        }
        let mut writer = MtomWriter::new(xml, self.config.threshold);
        message.write_to(&mut writer)?;

        let (xml, written) = writer.into_parts();
        xml.into_inner()?;
        Ok(written)
    }

    fn read_root(&self, root: RootPart) -> Result<StreamMessage> {
        let charset = resolve_charset(root.content_type.as_ref().and_then(ContentType::charset))?;
        let mtom = root
            .content_type
            .as_ref()
            .is_some_and(|ct| ct.is("application", "xop+xml"));
        if !mtom {
            tracing::warn!(
                content_type = ?root.content_type.as_ref().map(ToString::to_string),
                "Root part is not application/xop+xml"
            );
        }
        let action = root.soap_action();

        let reader = XopReader::new(
            XmlTokenReader::from_bytes(root.body),
            root.attachments.clone(),
            self.config.strict_xop_references,
        );
        let mut message = StreamMessage::read(root.version, Box::new(reader))?;
        message.set_attachments(root.attachments);
        if action.is_some() {
            message.set_soap_action(action);
        }
        message.set_decode_info(DecodeInfo {
            content_type: root.content_type_header,
            charset: charset.to_string(),
            mtom,
        });
        Ok(message)
    }
}

/// A token sink that moves large binary content into attachments.
///
/// Binary content shorter than the threshold is passed on and written as
/// base64 text. Anything longer is registered as an attachment and replaced
/// by `<xop:Include xmlns:xop="..." href="cid:..."/>`. Content read from an
/// attachment keeps that attachment's content-ID, and is remembered as
/// inlined when it falls below the threshold.
pub struct MtomWriter<S> {
    inner: S,
    threshold: usize,
    generated: Vec<Attachment>,
    inlined: HashSet<ContentId>,
}

impl<S: TokenSink> MtomWriter<S> {
    /// Wraps `inner`.
    pub fn new(inner: S, threshold: usize) -> Self {
        Self {
            inner,
            threshold,
            generated: Vec::new(),
            inlined: HashSet::new(),
        }
    }

    /// Returns the attachments registered so far.
    pub fn attachments(&self) -> &[Attachment] {
        &self.generated
    }

    /// Returns the content-IDs of attachments written inline so far.
    pub const fn inlined(&self) -> &HashSet<ContentId> {
        &self.inlined
    }

    /// Returns the inner sink and what was written.
    pub fn into_parts(self) -> (S, WrittenRoot) {
        let written = WrittenRoot {
            generated: self.generated,
            inlined: self.inlined,
        };
        (self.inner, written)
    }

    fn hoist(&mut self, binary: &BinaryData) -> Result<()> {
        let content_id = binary
            .content_id()
            .cloned()
            .unwrap_or_else(ContentId::generate);

        if !self.generated.iter().any(|a| a.content_id() == &content_id) {
            tracing::trace!(%content_id, len = binary.len(), "Hoisting binary content");
            self.generated.push(Attachment::new(
                content_id.clone(),
                binary.content_type().unwrap_or("application/octet-stream"),
                binary.data().clone(),
            ));
        }

        let name = format!("xop:{XOP_INCLUDE}");
        let include = StartTag::new(name.as_str(), Some(XOP_NAMESPACE))
            .with_attribute("xmlns:xop", XOP_NAMESPACE)
            .with_attribute("href", content_id.href())
            .self_closing(true);
        self.inner.write_token(&Token::Start(include))?;
        self.inner
            .write_token(&Token::End(EndTag::new(name, Some(XOP_NAMESPACE))))
    }
}

impl<S: TokenSink> TokenSink for MtomWriter<S> {
    fn write_token(&mut self, token: &Token) -> Result<()> {
        match token {
            Token::Binary(binary) if binary.len() >= self.threshold => self.hoist(binary),
            Token::Binary(binary) => {
                tracing::trace!(len = binary.len(), "Inlining binary content");
                if let Some(content_id) = binary.content_id() {
                    self.inlined.insert(content_id.clone());
                }
                self.inner.write_token(token)
            }
            _ => self.inner.write_token(token),
        }
    }
}
