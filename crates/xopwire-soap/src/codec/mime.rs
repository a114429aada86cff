//! `multipart/related` framing around a root codec.

use super::{EncodedContentType, RootCodec, RootPart, resolve_charset};
use crate::config::CodecConfig;
use crate::error::Result;
use crate::message::StreamMessage;
use crate::version::SoapVersion;
use bytes::Bytes;
use std::io::{Read, Write};
use xopwire_mime::{AttachmentSet, Boundary, ContentId, ContentType, Headers, Multipart, MultipartWriter};

/// Packages a root part and attachments as `multipart/related`.
///
/// Messages whose root codec does not require framing and that carry no
/// attachments are written as the bare root part.
#[derive(Debug, Clone)]
pub struct MimeCodec<C> {
    root: C,
}

impl<C: RootCodec> MimeCodec<C> {
    /// Wraps a root codec.
    pub const fn new(root: C) -> Self {
        Self { root }
    }

    /// Returns the root codec.
    pub const fn root_codec(&self) -> &C {
        &self.root
    }

    /// Returns the configuration.
    pub fn config(&self) -> &CodecConfig {
        self.root.config()
    }

    fn charset(&self, message: &StreamMessage) -> Result<&'static str> {
        let requested = message
            .decode_info()
            .map_or(self.config().preferred_encoding.as_str(), |info| {
                info.charset.as_str()
            });
        resolve_charset(Some(requested))
    }

    fn compute(&self, message: &StreamMessage, charset: &str) -> EncodedContentType {
        let root = self.root.describe(message, charset);
        if !self.root.requires_multipart() && message.attachments().is_empty() {
            return EncodedContentType {
                content_type: root.content_type.clone(),
                boundary: None,
                root_id: None,
                root_content_type: root.content_type,
            };
        }

        let boundary = Boundary::generate();
        let root_id = root.identified.then(ContentId::generate_root);

        let mut content_type =
            ContentType::new("multipart", "related").with_parameter("type", root.package_type);
        if let Some(id) = &root_id {
            content_type.set_parameter("start", id.header_value());
        }
        content_type.set_parameter("boundary", boundary.as_str());
        if let Some(start_info) = root.start_info {
            content_type.set_parameter("start-info", start_info);
        }

        EncodedContentType {
            content_type: content_type.to_string(),
            boundary: Some(boundary),
            root_id,
            root_content_type: root.content_type,
        }
    }

    /// Computes the content type of the next encode and caches it on the
    /// message.
    ///
    /// Repeated calls return the same boundary and root content-ID until
    /// the message is encoded.
    ///
    /// # Errors
    ///
    /// Returns an error if the charset is unsupported.
    pub fn static_content_type(&self, message: &mut StreamMessage) -> Result<EncodedContentType> {
        if let Some(cached) = message.cached_content_type() {
            return Ok(cached.clone());
        }
        let charset = self.charset(message)?;
        let computed = self.compute(message, charset);
        message.cache_content_type(computed.clone());
        Ok(computed)
    }

    /// Writes `message` to `sink` and returns its content type.
    ///
    /// Uses the cached content type if there is one and clears it, so the
    /// next encode generates fresh identifiers.
    ///
    /// # Errors
    ///
    /// Returns an error if the message was already consumed, is malformed,
    /// or the sink fails.
    pub fn encode<W: Write>(&self, message: &mut StreamMessage, sink: W) -> Result<String> {
        let charset = self.charset(message)?;
        // A single-part type cached before attachments were added is stale.
        let encoded = match message
            .take_content_type()
            .filter(|cached| cached.is_multipart() || message.attachments().is_empty())
        {
            Some(cached) => cached,
            None => self.compute(message, charset),
        };

        let Some(boundary) = &encoded.boundary else {
            let mut sink = sink;
            self.root.write_root(message, &mut sink, charset)?;
            sink.flush()?;
            tracing::debug!(codec = self.root.name(), "Encoded single-part message");
            return Ok(encoded.content_type);
        };

        let mut root_headers = Headers::new();
        if let Some(id) = &encoded.root_id {
            root_headers.add("Content-Id", id.header_value());
        }
        root_headers.add("Content-Type", encoded.root_content_type.as_str());
        if encoded.root_id.is_some() {
            root_headers.add("Content-Transfer-Encoding", "binary");
        }

        let mut writer = MultipartWriter::new(sink, boundary.clone());
        let written = {
            let body = writer.start_part(&root_headers)?;
            self.root.write_root(message, body, charset)?
        };

        for attachment in &written.generated {
            writer.write_attachment(attachment)?;
        }
        let mut own = 0usize;
        for attachment in message.attachments() {
            if !written.covers(attachment.content_id()) {
                writer.write_attachment(attachment)?;
                own += 1;
            }
        }
        writer.finish()?;

        tracing::debug!(
            codec = self.root.name(),
            generated = written.generated.len(),
            inlined = written.inlined.len(),
            attachments = own,
            "Encoded multipart message"
        );
        Ok(encoded.content_type)
    }

    /// Decodes a message received with `content_type`.
    ///
    /// A `multipart/related` body is split into parts; the root is the part
    /// named by the `start` parameter, or the first part. Every other part
    /// becomes an attachment. Any other content type is handed to the root
    /// codec as a bare root part.
    ///
    /// # Errors
    ///
    /// Returns a malformed-stream error if the framing is broken or the
    /// `start` part is missing, and an unsupported-media error for an
    /// unparseable content type or charset.
    pub fn decode(
        &self,
        source: impl Into<Bytes>,
        content_type: &str,
        version: SoapVersion,
    ) -> Result<StreamMessage> {
        let source = source.into();
        let package = ContentType::parse(content_type)?;

        let root = if package.is_multipart() {
            let boundary = Boundary::new(
                package
                    .boundary()
                    .ok_or(xopwire_mime::Error::MissingBoundary)?,
            );
            let mut multipart = Multipart::parse(source, &boundary)?;
            let root = multipart.take_root(package.parameter("start"))?;
            let attachments = multipart
                .parts
                .into_iter()
                .map(|part| part.into_attachment(ContentId::generate))
                .collect::<xopwire_mime::Result<AttachmentSet>>()?;

            tracing::debug!(
                codec = self.root.name(),
                attachments = attachments.len(),
                "Split multipart message"
            );
            RootPart {
                body: root.decode_body()?,
                content_type: root.content_type()?,
                package: Some(package),
                content_type_header: content_type.to_string(),
                attachments,
                version,
            }
        } else {
            RootPart {
                body: source,
                content_type: Some(package),
                package: None,
                content_type_header: content_type.to_string(),
                attachments: AttachmentSet::new(),
                version,
            }
        };

        self.root.read_root(root)
    }

    /// Reads `source` to the end and decodes it.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if reading fails, otherwise as [`decode`](Self::decode).
    pub fn decode_from<R: Read>(
        &self,
        mut source: R,
        content_type: &str,
        version: SoapVersion,
    ) -> Result<StreamMessage> {
        let mut buf = Vec::new();
        source.read_to_end(&mut buf)?;
        self.decode(buf, content_type, version)
    }
}
