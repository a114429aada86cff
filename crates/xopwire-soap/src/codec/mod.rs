//! Wire codecs.
//!
//! [`MimeCodec`] frames a root part and its attachments as
//! `multipart/related`. What goes into the root part is decided by a
//! [`RootCodec`]: [`XmlCodec`] writes the envelope as plain XML with binary
//! content inlined, [`MtomCodec`] hoists binary content into attachments
//! referenced through `xop:Include`. [`SoapCodec`] picks between them.

mod mime;
mod mtom;
mod xml;
mod xop;

pub use mime::MimeCodec;
pub use mtom::{MtomCodec, MtomWriter, XOP_MEDIA_TYPE};
pub use xml::XmlCodec;
pub use xop::{XOP_INCLUDE, XOP_NAMESPACE, XopReader};

use crate::config::CodecConfig;
use crate::error::{Error, Result};
use crate::message::StreamMessage;
use crate::sniff::{ContentClass, RootKind, classify};
use crate::version::SoapVersion;
use bytes::Bytes;
use std::collections::HashSet;
use std::io::{Read, Write};
use xopwire_mime::{Attachment, AttachmentSet, Boundary, ContentId, ContentType};

/// Produces and interprets the root part of a package.
pub trait RootCodec {
    /// Short name used in logs.
    fn name(&self) -> &'static str;

    /// Returns the configuration.
    fn config(&self) -> &CodecConfig;

    /// Returns true if messages are always framed as multipart, even
    /// without attachments.
    fn requires_multipart(&self) -> bool;

    /// Describes the root part of `message` for the given charset.
    fn describe(&self, message: &StreamMessage, charset: &str) -> RootDescriptor;

    /// Writes the envelope of `message` as the root part.
    ///
    /// Returns the attachments generated while writing and the attachments
    /// whose bytes went into the root part.
    ///
    /// # Errors
    ///
    /// Returns an error if the message cannot be read or the sink fails.
    fn write_root(
        &self,
        message: &mut StreamMessage,
        out: &mut dyn Write,
        charset: &str,
    ) -> Result<WrittenRoot>;

    /// Builds a message from a received root part.
    ///
    /// # Errors
    ///
    /// Returns an error if the root part is not a SOAP envelope or its
    /// charset is unsupported.
    fn read_root(&self, root: RootPart) -> Result<StreamMessage>;
}

/// How a root codec labels its root part.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RootDescriptor {
    /// Content type of the root part, or of the whole message when it is
    /// sent without multipart framing.
    pub content_type: String,
    /// Value of the package `type` parameter.
    pub package_type: String,
    /// Value of the package `start-info` parameter.
    pub start_info: Option<String>,
    /// True if the root part carries a `Content-Id` named by `start`.
    pub identified: bool,
}

/// What [`RootCodec::write_root`] did with binary content.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WrittenRoot {
    /// Attachments generated while writing, in the order they were referenced.
    pub generated: Vec<Attachment>,
    /// Content-IDs of message attachments whose bytes were written inline.
    pub inlined: HashSet<ContentId>,
}

impl WrittenRoot {
    /// Returns true if the attachment with `content_id` is already part of
    /// the output.
    #[must_use]
    pub fn covers(&self, content_id: &ContentId) -> bool {
        self.inlined.contains(content_id)
            || self.generated.iter().any(|a| a.content_id() == content_id)
    }
}

/// A received root part, handed to [`RootCodec::read_root`].
#[derive(Debug)]
pub struct RootPart {
    /// Root part bytes, transfer encoding removed.
    pub body: Bytes,
    /// Content type of the root part itself.
    pub content_type: Option<ContentType>,
    /// Content type of the enclosing package, for multipart messages.
    pub package: Option<ContentType>,
    /// The content type header the message arrived with.
    pub content_type_header: String,
    /// Every other part of the package.
    pub attachments: AttachmentSet,
    /// SOAP version to read the envelope as.
    pub version: SoapVersion,
}

impl RootPart {
    /// Returns the SOAP action carried by the content type, if any.
    ///
    /// SOAP 1.2 carries it as the `action` parameter of the envelope media
    /// type, which under XOP is nested in `start-info` or the root part's
    /// `type` parameter.
    #[must_use]
    pub fn soap_action(&self) -> Option<String> {
        if !self.version.has_action_parameter() {
            return None;
        }
        let nested = |ct: &ContentType, name: &str| {
            ct.parameter(name)
                .and_then(|value| ContentType::parse(value).ok())
                .and_then(|inner| inner.parameter("action").map(str::to_string))
        };
        let root = self.content_type.as_ref();
        root.and_then(|ct| ct.parameter("action").map(str::to_string))
            .or_else(|| root.and_then(|ct| nested(ct, "type")))
            .or_else(|| self.package.as_ref().and_then(|ct| nested(ct, "start-info")))
    }
}

/// The content type computed for one encode call.
///
/// Cached on the message by [`MimeCodec::static_content_type`] so that the
/// value sent in a transport header matches the boundary and root part
/// identifier used in the body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedContentType {
    /// The message content type.
    pub content_type: String,
    /// The boundary, for multipart messages.
    pub boundary: Option<Boundary>,
    /// The root part content-ID, when the root part is identified.
    pub root_id: Option<ContentId>,
    /// The content type of the root part.
    pub root_content_type: String,
}

impl EncodedContentType {
    /// Returns true if the message is framed as multipart.
    #[must_use]
    pub const fn is_multipart(&self) -> bool {
        self.boundary.is_some()
    }
}

/// Normalizes a charset name, defaulting to UTF-8.
///
/// # Errors
///
/// Returns an unsupported-media error for anything but UTF-8 and US-ASCII.
pub fn resolve_charset(charset: Option<&str>) -> Result<&'static str> {
    let Some(charset) = charset else {
        return Ok("utf-8");
    };
    match charset.trim().to_ascii_lowercase().as_str() {
        "utf-8" | "utf8" => Ok("utf-8"),
        "us-ascii" | "ascii" => Ok("us-ascii"),
        other => Err(Error::unsupported_media(format!("charset '{other}'"))),
    }
}

/// Finds the SOAP version named by a message content type.
///
/// Multipart packages name it through `start-info` or `type`.
#[must_use]
pub fn detect_version(content_type: &ContentType) -> Option<SoapVersion> {
    if !content_type.is_multipart() {
        return SoapVersion::from_content_type(content_type);
    }
    ["start-info", "type"]
        .iter()
        .filter_map(|name| content_type.parameter(name))
        .filter_map(|value| ContentType::parse(value).ok())
        .find_map(|inner| SoapVersion::from_content_type(&inner))
}

/// Encodes and decodes SOAP messages, choosing the packaging per message.
///
/// Outgoing messages use MTOM when the configuration enables it or when the
/// message was itself received as MTOM; everything else is plain XML, with
/// multipart framing only if the message has attachments. Incoming messages
/// are routed by their content type.
#[derive(Debug, Clone)]
pub struct SoapCodec {
    mtom: MimeCodec<MtomCodec>,
    xml: MimeCodec<XmlCodec>,
}

impl SoapCodec {
    /// Creates a codec.
    #[must_use]
    pub fn new(config: CodecConfig) -> Self {
        Self {
            mtom: MimeCodec::new(MtomCodec::new(config.clone())),
            xml: MimeCodec::new(XmlCodec::new(config)),
        }
    }

    /// Returns the configuration.
    #[must_use]
    pub fn config(&self) -> &CodecConfig {
        self.xml.config()
    }

    fn uses_mtom(&self, message: &StreamMessage) -> bool {
        self.config().mtom_enabled || message.decode_info().is_some_and(|info| info.mtom)
    }

    /// Computes and caches the content type of the next encode.
    ///
    /// # Errors
    ///
    /// Returns an error if the charset is unsupported.
    pub fn static_content_type(&self, message: &mut StreamMessage) -> Result<EncodedContentType> {
        if self.uses_mtom(message) {
            self.mtom.static_content_type(message)
        } else {
            self.xml.static_content_type(message)
        }
    }

    /// Encodes `message` into `sink` and returns its content type.
    ///
    /// # Errors
    ///
    /// Returns an error if the message was already consumed, is malformed,
    /// or the sink fails.
    pub fn encode<W: Write>(&self, message: &mut StreamMessage, sink: W) -> Result<String> {
        if self.uses_mtom(message) {
            self.mtom.encode(message, sink)
        } else {
            self.xml.encode(message, sink)
        }
    }

    /// Decodes a message, detecting the SOAP version from the content type
    /// and falling back to the configured one.
    ///
    /// # Errors
    ///
    /// Returns an unsupported-media error for content types other than XML
    /// and `multipart/related`, and a malformed-stream error for bad input.
    pub fn decode(&self, source: impl Into<Bytes>, content_type: &str) -> Result<StreamMessage> {
        let version = ContentType::parse(content_type)
            .ok()
            .and_then(|ct| detect_version(&ct))
            .unwrap_or(self.config().soap_version);

        match classify(content_type) {
            ContentClass::Xml | ContentClass::Multipart(RootKind::Xml) => {
                tracing::debug!(codec = "xml", %version, "Decoding message");
                self.xml.decode(source, content_type, version)
            }
            ContentClass::Multipart(RootKind::Xop | RootKind::Unspecified) => {
                tracing::debug!(codec = "mtom", %version, "Decoding message");
                self.mtom.decode(source, content_type, version)
            }
            ContentClass::FastInfoset | ContentClass::Multipart(RootKind::FastInfoset) => Err(
                Error::unsupported_media(format!("Fast Infoset is not supported: {content_type}")),
            ),
            ContentClass::Unknown => Err(Error::unsupported_media(format!(
                "not a SOAP content type: {content_type}"
            ))),
        }
    }

    /// Reads `source` to the end and decodes it.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if reading fails, otherwise as [`decode`](Self::decode).
    pub fn decode_from<R: Read>(&self, mut source: R, content_type: &str) -> Result<StreamMessage> {
        let mut buf = Vec::new();
        source.read_to_end(&mut buf)?;
        self.decode(buf, content_type)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_charset() {
        assert_eq!(resolve_charset(None).unwrap(), "utf-8");
        assert_eq!(resolve_charset(Some("UTF8")).unwrap(), "utf-8");
        assert_eq!(resolve_charset(Some("US-ASCII")).unwrap(), "us-ascii");
        let err = resolve_charset(Some("iso-8859-1")).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::UnsupportedMedia);
    }

    #[test]
    fn test_detect_version() {
        let ct = |s: &str| ContentType::parse(s).unwrap();
        assert_eq!(
            detect_version(&ct("application/soap+xml; charset=utf-8")),
            Some(SoapVersion::Soap12)
        );
        assert_eq!(
            detect_version(&ct(
                "multipart/related; type=\"application/xop+xml\"; boundary=b; start-info=\"text/xml\""
            )),
            Some(SoapVersion::Soap11)
        );
        assert_eq!(
            detect_version(&ct("multipart/related; type=\"application/soap+xml\"; boundary=b")),
            Some(SoapVersion::Soap12)
        );
        assert_eq!(detect_version(&ct("multipart/related; boundary=b")), None);
    }

    #[test]
    fn test_root_part_action() {
        let root = RootPart {
            body: Bytes::new(),
            content_type: Some(
                ContentType::parse(
                    "application/xop+xml; charset=utf-8; type=\"application/soap+xml;action=\\\"urn:a\\\"\"",
                )
                .unwrap(),
            ),
            package: None,
            content_type_header: String::new(),
            attachments: AttachmentSet::new(),
            version: SoapVersion::Soap12,
        };
        assert_eq!(root.soap_action().as_deref(), Some("urn:a"));

        let soap11 = RootPart {
            version: SoapVersion::Soap11,
            ..root
        };
        assert_eq!(soap11.soap_action(), None);
    }
}
