//! Content type classification.

use xopwire_mime::ContentType;

/// What the root part of a `multipart/related` package holds, according to
/// the package `type` parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RootKind {
    /// `application/xop+xml`: an MTOM/XOP package.
    Xop,
    /// An XML media type: SOAP with attachments.
    Xml,
    /// A Fast Infoset document.
    FastInfoset,
    /// No `type` parameter, or one naming something else.
    Unspecified,
}

/// Classification of a message content type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContentClass {
    /// `text/xml`, `application/xml` or `application/*+xml`.
    Xml,
    /// `multipart/related` around the given kind of root part.
    Multipart(RootKind),
    /// A Fast Infoset document.
    FastInfoset,
    /// Anything else.
    Unknown,
}

impl ContentClass {
    /// Returns true for multipart packages.
    #[must_use]
    pub const fn is_multipart(self) -> bool {
        matches!(self, Self::Multipart(_))
    }

    /// Returns true for MTOM/XOP packages.
    #[must_use]
    pub const fn is_mtom(self) -> bool {
        matches!(self, Self::Multipart(RootKind::Xop))
    }
}

fn is_fast_infoset(content_type: &ContentType) -> bool {
    content_type.is("application", "fastinfoset")
        || content_type.is("application", "soap+fastinfoset")
}

/// Classifies a content type string.
///
/// Type and subtype compare case-insensitively; parameters may be quoted.
/// Unparseable input is [`ContentClass::Unknown`].
#[must_use]
pub fn classify(content_type: &str) -> ContentClass {
    let Ok(content_type) = ContentType::parse(content_type) else {
        return ContentClass::Unknown;
    };

    if content_type.is("multipart", "related") {
        let root = content_type
            .parameter("type")
            .and_then(|value| ContentType::parse(value).ok())
            .map_or(RootKind::Unspecified, |root| {
                if root.is("application", "xop+xml") {
                    RootKind::Xop
                } else if is_fast_infoset(&root) {
                    RootKind::FastInfoset
                } else if root.is_xml() {
                    RootKind::Xml
                } else {
                    RootKind::Unspecified
                }
            });
        return ContentClass::Multipart(root);
    }

    if is_fast_infoset(&content_type) {
        ContentClass::FastInfoset
    } else if content_type.is_xml() {
        ContentClass::Xml
    } else {
        ContentClass::Unknown
    }
}
