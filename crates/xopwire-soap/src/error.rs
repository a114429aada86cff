//! Error types for SOAP message encoding and decoding.

use std::io;
use std::panic::Location;

/// Result type alias for codec and message operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Broad category of an [`Error`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The input is not a well-formed message package.
    Malformed,
    /// The content type or character set cannot be handled.
    UnsupportedMedia,
    /// The caller used a message in a state that does not allow the call.
    StateViolation,
    /// The underlying source or sink failed.
    Io,
}

/// Codec and message error types.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The XML or MIME structure does not match what a SOAP message requires.
    #[error("Malformed message: {0}")]
    Malformed(String),

    /// The declared content type or charset is not supported.
    #[error("Unsupported media: {0}")]
    UnsupportedMedia(String),

    /// The payload was already consumed.
    #[error("Message payload already consumed at {site}")]
    AlreadyConsumed {
        /// Call site that consumed the payload.
        site: &'static Location<'static>,
    },

    /// XML parsing or writing error.
    #[error("XML error: {0}")]
    Xml(#[from] quick_xml::Error),

    /// XML attribute error.
    #[error("XML attribute error: {0}")]
    XmlAttribute(#[from] quick_xml::events::attributes::AttrError),

    /// MIME framing error.
    #[error("MIME error: {0}")]
    Mime(#[from] xopwire_mime::Error),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl Error {
    /// Creates a malformed-stream error.
    #[must_use]
    pub fn malformed(message: impl Into<String>) -> Self {
        Self::Malformed(message.into())
    }

    /// Creates an unsupported-media error.
    #[must_use]
    pub fn unsupported_media(message: impl Into<String>) -> Self {
        Self::UnsupportedMedia(message.into())
    }

    /// Returns the category of this error.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::Malformed(_) | Self::Xml(_) | Self::XmlAttribute(_) => ErrorKind::Malformed,
            Self::UnsupportedMedia(_) => ErrorKind::UnsupportedMedia,
            Self::AlreadyConsumed { .. } => ErrorKind::StateViolation,
            Self::Io(_) | Self::Mime(xopwire_mime::Error::Io(_)) => ErrorKind::Io,
            Self::Mime(xopwire_mime::Error::InvalidContentType(_)) => ErrorKind::UnsupportedMedia,
            Self::Mime(_) => ErrorKind::Malformed,
        }
    }

    /// Returns true if the caller misused a message.
    #[must_use]
    pub const fn is_state_violation(&self) -> bool {
        matches!(self, Self::AlreadyConsumed { .. })
    }
}
