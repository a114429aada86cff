//! SOAP protocol versions.

use std::fmt;
use xopwire_mime::ContentType;

/// Envelope namespace of SOAP 1.1.
pub const SOAP11_NAMESPACE: &str = "http://schemas.xmlsoap.org/soap/envelope/";

/// Envelope namespace of SOAP 1.2.
pub const SOAP12_NAMESPACE: &str = "http://www.w3.org/2003/05/soap-envelope";

/// SOAP protocol version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum SoapVersion {
    /// SOAP 1.1 (`text/xml`).
    #[default]
    Soap11,
    /// SOAP 1.2 (`application/soap+xml`).
    Soap12,
}

impl SoapVersion {
    /// Returns the envelope namespace URI.
    #[must_use]
    pub const fn namespace(self) -> &'static str {
        match self {
            Self::Soap11 => SOAP11_NAMESPACE,
            Self::Soap12 => SOAP12_NAMESPACE,
        }
    }

    /// Returns the media type of a bare envelope.
    #[must_use]
    pub const fn media_type(self) -> &'static str {
        match self {
            Self::Soap11 => "text/xml",
            Self::Soap12 => "application/soap+xml",
        }
    }

    /// Returns true if the media type carries an `action` parameter.
    ///
    /// SOAP 1.1 transports the action out of band, so it never has one.
    #[must_use]
    pub const fn has_action_parameter(self) -> bool {
        matches!(self, Self::Soap12)
    }

    /// Returns the media type with its `action` parameter, if any:
    /// `application/soap+xml;action="urn:x"`.
    ///
    /// This is the value of the XOP `start-info` parameter.
    #[must_use]
    pub fn media_type_with_action(self, action: Option<&str>) -> String {
        match action {
            Some(action) if self.has_action_parameter() => {
                format!("{};action=\"{action}\"", self.media_type())
            }
            _ => self.media_type().to_string(),
        }
    }

    /// Finds the version whose envelope namespace is `namespace`.
    #[must_use]
    pub fn from_namespace(namespace: &str) -> Option<Self> {
        match namespace {
            SOAP11_NAMESPACE => Some(Self::Soap11),
            SOAP12_NAMESPACE => Some(Self::Soap12),
            _ => None,
        }
    }

    /// Finds the version whose bare media type matches `content_type`.
    #[must_use]
    pub fn from_content_type(content_type: &ContentType) -> Option<Self> {
        if content_type.is("text", "xml") {
            Some(Self::Soap11)
        } else if content_type.is("application", "soap+xml") {
            Some(Self::Soap12)
        } else {
            None
        }
    }
}

impl fmt::Display for SoapVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Soap11 => write!(f, "SOAP 1.1"),
            Self::Soap12 => write!(f, "SOAP 1.2"),
        }
    }
}
