//! A single body part of a multipart package.

use crate::attachment::Attachment;
use crate::boundary::ContentId;
use crate::content_type::ContentType;
use crate::encoding::{decode_base64_lenient, decode_quoted_printable};
use crate::error::Result;
use crate::header::Headers;
use bytes::Bytes;
use std::fmt;

/// Transfer encoding types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferEncoding {
    /// 7-bit ASCII.
    SevenBit,
    /// 8-bit binary.
    EightBit,
    /// Base64 encoding.
    Base64,
    /// Quoted-Printable encoding.
    QuotedPrintable,
    /// Binary (no encoding).
    Binary,
}

impl TransferEncoding {
    /// Parses transfer encoding from string.
    #[must_use]
    pub fn parse(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "8bit" => Self::EightBit,
            "base64" => Self::Base64,
            "quoted-printable" => Self::QuotedPrintable,
            "binary" => Self::Binary,
            "7bit" => Self::SevenBit,
            other => {
                tracing::warn!(encoding = other, "Unknown transfer encoding, treating as 7bit");
                Self::SevenBit
            }
        }
    }
}

impl fmt::Display for TransferEncoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SevenBit => write!(f, "7bit"),
            Self::EightBit => write!(f, "8bit"),
            Self::Base64 => write!(f, "base64"),
            Self::QuotedPrintable => write!(f, "quoted-printable"),
            Self::Binary => write!(f, "binary"),
        }
    }
}

/// MIME body part.
#[derive(Debug, Clone)]
pub struct Part {
    /// Part headers.
    pub headers: Headers,
    /// Part body as found on the wire (still transfer-encoded).
    pub body: Bytes,
}

impl Part {
    /// Creates a new part.
    #[must_use]
    pub const fn new(headers: Headers, body: Bytes) -> Self {
        Self { headers, body }
    }

    /// Gets the content type, if the part declares one.
    ///
    /// # Errors
    ///
    /// Returns an error if content type header is invalid.
    pub fn content_type(&self) -> Result<Option<ContentType>> {
        self.headers
            .get("content-type")
            .map(ContentType::parse)
            .transpose()
    }

    /// Gets the content-ID, if the part declares one.
    #[must_use]
    pub fn content_id(&self) -> Option<ContentId> {
        self.headers.get("content-id").map(ContentId::new)
    }

    /// Gets the transfer encoding.
    #[must_use]
    pub fn transfer_encoding(&self) -> TransferEncoding {
        self.headers
            .get("content-transfer-encoding")
            .map_or(TransferEncoding::SevenBit, TransferEncoding::parse)
    }

    /// Decodes the body according to the transfer encoding.
    ///
    /// Identity encodings return the body without copying.
    ///
    /// # Errors
    ///
    /// Returns an error if decoding fails.
    pub fn decode_body(&self) -> Result<Bytes> {
        match self.transfer_encoding() {
            TransferEncoding::Base64 => Ok(decode_base64_lenient(&self.body)?.into()),
            TransferEncoding::QuotedPrintable => Ok(decode_quoted_printable(&self.body)?.into()),
            TransferEncoding::SevenBit | TransferEncoding::EightBit | TransferEncoding::Binary => {
                Ok(self.body.clone())
            }
        }
    }

    /// Converts this part into an attachment.
    ///
    /// Parts without a `Content-Id` get the generated id passed as
    /// `fallback_id`. Headers other than the codec-owned ones are kept.
    ///
    /// # Errors
    ///
    /// Returns an error if the body cannot be decoded.
    pub fn into_attachment(self, fallback_id: impl FnOnce() -> ContentId) -> Result<Attachment> {
        let data = self.decode_body()?;
        let content_id = self.content_id().unwrap_or_else(fallback_id);
        let content_type = self
            .headers
            .get("content-type")
            .unwrap_or("application/octet-stream")
            .to_string();

        let mut attachment = Attachment::new(content_id, content_type, data);
        for (name, value) in self.headers.iter() {
            if !is_codec_header(name) {
                attachment = attachment.with_header(name, value);
            }
        }
        Ok(attachment)
    }
}

/// Returns `true` for headers whose value the codec always computes itself.
#[must_use]
pub fn is_codec_header(name: &str) -> bool {
    ["content-type", "content-id", "content-transfer-encoding"]
        .iter()
        .any(|h| name.eq_ignore_ascii_case(h))
}
