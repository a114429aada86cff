//! Owned XML tokens.
//!
//! Element names are kept exactly as written (`prefix:local`), next to the
//! namespace they resolved to, and `xmlns` declarations stay in the attribute
//! list. Writing a token back therefore reproduces the original prefixes.

use bytes::Bytes;
use std::borrow::Cow;
use xopwire_mime::ContentId;
use xopwire_mime::encoding::encode_base64;

/// An attribute as written on a start tag, value unescaped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attribute {
    /// Qualified attribute name (`xmlns:S`, `href`, ...).
    pub name: String,
    /// Unescaped value.
    pub value: String,
}

impl Attribute {
    /// Creates an attribute.
    #[must_use]
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }

    /// Returns true for `xmlns` and `xmlns:*` declarations.
    #[must_use]
    pub fn is_namespace_declaration(&self) -> bool {
        self.name == "xmlns" || self.name.starts_with("xmlns:")
    }
}

/// Splits a qualified name into prefix and local part.
fn split_qname(name: &str) -> (Option<&str>, &str) {
    match name.split_once(':') {
        Some((prefix, local)) => (Some(prefix), local),
        None => (None, name),
    }
}

/// A start tag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StartTag {
    name: String,
    namespace: Option<String>,
    attributes: Vec<Attribute>,
    self_closing: bool,
}

impl StartTag {
    /// Creates a start tag with a qualified name and resolved namespace.
    #[must_use]
    pub fn new(name: impl Into<String>, namespace: Option<&str>) -> Self {
        Self {
            name: name.into(),
            namespace: namespace.map(str::to_string),
            attributes: Vec::new(),
            self_closing: false,
        }
    }

    /// Adds an attribute.
    #[must_use]
    pub fn with_attribute(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.push(Attribute::new(name, value));
        self
    }

    /// Marks the tag as written in `<empty/>` form.
    #[must_use]
    pub const fn self_closing(mut self, self_closing: bool) -> Self {
        self.self_closing = self_closing;
        self
    }

    pub(crate) const fn from_parts(
        name: String,
        namespace: Option<String>,
        attributes: Vec<Attribute>,
        self_closing: bool,
    ) -> Self {
        Self {
            name,
            namespace,
            attributes,
            self_closing,
        }
    }

    /// Returns the qualified name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the local part of the name.
    #[must_use]
    pub fn local_name(&self) -> &str {
        split_qname(&self.name).1
    }

    /// Returns the prefix, if any.
    #[must_use]
    pub fn prefix(&self) -> Option<&str> {
        split_qname(&self.name).0
    }

    /// Returns the resolved namespace URI.
    #[must_use]
    pub fn namespace(&self) -> Option<&str> {
        self.namespace.as_deref()
    }

    /// Returns the attributes in document order.
    #[must_use]
    pub fn attributes(&self) -> &[Attribute] {
        &self.attributes
    }

    /// Looks up an attribute value by qualified name.
    #[must_use]
    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|a| a.name == name)
            .map(|a| a.value.as_str())
    }

    /// Returns true if the tag was written in `<empty/>` form.
    #[must_use]
    pub const fn is_self_closing(&self) -> bool {
        self.self_closing
    }

    /// Checks local name and namespace.
    #[must_use]
    pub fn is(&self, namespace: &str, local_name: &str) -> bool {
        self.local_name() == local_name && self.namespace() == Some(namespace)
    }

    /// Returns the matching end tag.
    #[must_use]
    pub fn end(&self) -> EndTag {
        EndTag {
            name: self.name.clone(),
            namespace: self.namespace.clone(),
        }
    }
}

/// An end tag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndTag {
    name: String,
    namespace: Option<String>,
}

impl EndTag {
    /// Creates an end tag.
    #[must_use]
    pub fn new(name: impl Into<String>, namespace: Option<&str>) -> Self {
        Self {
            name: name.into(),
            namespace: namespace.map(str::to_string),
        }
    }

    /// Returns the qualified name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the local part of the name.
    #[must_use]
    pub fn local_name(&self) -> &str {
        split_qname(&self.name).1
    }

    /// Returns the resolved namespace URI.
    #[must_use]
    pub fn namespace(&self) -> Option<&str> {
        self.namespace.as_deref()
    }

    /// Checks local name and namespace.
    #[must_use]
    pub fn is(&self, namespace: &str, local_name: &str) -> bool {
        self.local_name() == local_name && self.namespace() == Some(namespace)
    }
}

/// Binary character content.
///
/// Produced by XOP resolution or by application code; writers turn it into
/// base64 text or, under MTOM, into an attachment reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BinaryData {
    data: Bytes,
    content_type: Option<String>,
    content_id: Option<ContentId>,
}

impl BinaryData {
    /// Creates binary content.
    #[must_use]
    pub fn new(data: impl Into<Bytes>, content_type: Option<&str>) -> Self {
        Self {
            data: data.into(),
            content_type: content_type.map(str::to_string),
            content_id: None,
        }
    }

    /// Records the attachment this content was read from.
    #[must_use]
    pub fn with_content_id(mut self, content_id: ContentId) -> Self {
        self.content_id = Some(content_id);
        self
    }

    /// Returns the bytes.
    #[must_use]
    pub const fn data(&self) -> &Bytes {
        &self.data
    }

    /// Returns the MIME type, if known.
    #[must_use]
    pub fn content_type(&self) -> Option<&str> {
        self.content_type.as_deref()
    }

    /// Returns the content-ID of the attachment this was read from.
    #[must_use]
    pub const fn content_id(&self) -> Option<&ContentId> {
        self.content_id.as_ref()
    }

    /// Returns the length in bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Returns true if there are no bytes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Returns the base64 text form.
    #[must_use]
    pub fn to_base64(&self) -> String {
        encode_base64(&self.data)
    }
}

/// One XML token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
    /// Start of an element.
    Start(StartTag),
    /// End of an element.
    End(EndTag),
    /// Unescaped character data.
    Text(String),
    /// CDATA section content.
    CData(String),
    /// Comment content.
    Comment(String),
    /// Binary character content.
    Binary(BinaryData),
}

impl Token {
    /// Returns true for character data made of XML whitespace only.
    #[must_use]
    pub fn is_whitespace(&self) -> bool {
        matches!(self, Self::Text(text) if is_xml_whitespace(text))
    }

    /// Returns the character content of text-like tokens.
    ///
    /// Binary content is presented as base64.
    #[must_use]
    pub fn text(&self) -> Option<Cow<'_, str>> {
        match self {
            Self::Text(text) | Self::CData(text) => Some(Cow::Borrowed(text)),
            Self::Binary(binary) => Some(Cow::Owned(binary.to_base64())),
            Self::Start(_) | Self::End(_) | Self::Comment(_) => None,
        }
    }
}

/// Returns true if `text` only holds spaces, tabs, carriage returns and newlines.
#[must_use]
pub fn is_xml_whitespace(text: &str) -> bool {
    text.bytes().all(|b| matches!(b, b' ' | b'\t' | b'\r' | b'\n'))
}
