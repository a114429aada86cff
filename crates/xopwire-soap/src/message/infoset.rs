//! Exact spelling of the envelope wrapper tags.

use crate::version::SoapVersion;
use crate::xml::{Attribute, StartTag, Token};

/// Prefix bound to the envelope namespace on freshly built messages.
pub const DEFAULT_PREFIX: &str = "S";

/// A wrapper tag as it was read, or as it will be written.
///
/// Holds the qualified name, the resolved namespace and every attribute
/// including `xmlns` declarations, so a decoded envelope is written back
/// with its original prefixes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagInfoset {
    tag: StartTag,
}

impl TagInfoset {
    /// Captures a start tag.
    #[must_use]
    pub const fn new(tag: StartTag) -> Self {
        Self { tag }
    }

    /// `<S:Envelope xmlns:S="...">` for `version`.
    #[must_use]
    pub fn envelope(version: SoapVersion) -> Self {
        let namespace = version.namespace();
        Self::new(
            StartTag::new(format!("{DEFAULT_PREFIX}:Envelope"), Some(namespace))
                .with_attribute(format!("xmlns:{DEFAULT_PREFIX}"), namespace),
        )
    }

    /// `<S:Header>` for `version`.
    #[must_use]
    pub fn header(version: SoapVersion) -> Self {
        Self::new(StartTag::new(
            format!("{DEFAULT_PREFIX}:Header"),
            Some(version.namespace()),
        ))
    }

    /// `<S:Body>` for `version`.
    #[must_use]
    pub fn body(version: SoapVersion) -> Self {
        Self::new(StartTag::new(
            format!("{DEFAULT_PREFIX}:Body"),
            Some(version.namespace()),
        ))
    }

    /// Returns the qualified name.
    #[must_use]
    pub fn name(&self) -> &str {
        self.tag.name()
    }

    /// Returns the local name.
    #[must_use]
    pub fn local_name(&self) -> &str {
        self.tag.local_name()
    }

    /// Returns the prefix, if any.
    #[must_use]
    pub fn prefix(&self) -> Option<&str> {
        self.tag.prefix()
    }

    /// Returns the namespace URI.
    #[must_use]
    pub fn namespace(&self) -> Option<&str> {
        self.tag.namespace()
    }

    /// Returns every attribute, namespace declarations included.
    #[must_use]
    pub fn attributes(&self) -> &[Attribute] {
        self.tag.attributes()
    }

    /// Returns the namespace declarations made on this tag as
    /// `(prefix, uri)` pairs; the default namespace has an empty prefix.
    pub fn namespace_declarations(&self) -> impl Iterator<Item = (&str, &str)> {
        self.tag
            .attributes()
            .iter()
            .filter(|a| a.is_namespace_declaration())
            .map(|a| {
                let prefix = a.name.strip_prefix("xmlns").unwrap_or_default();
                (prefix.trim_start_matches(':'), a.value.as_str())
            })
    }

    /// Returns the underlying start tag.
    #[must_use]
    pub const fn tag(&self) -> &StartTag {
        &self.tag
    }

    pub(crate) fn start_token(&self) -> Token {
        Token::Start(self.tag.clone())
    }

    pub(crate) fn end_token(&self) -> Token {
        Token::End(self.tag.end())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::version::SOAP12_NAMESPACE;

    #[test]
    fn test_default_envelope() {
        let envelope = TagInfoset::envelope(SoapVersion::Soap12);
        assert_eq!(envelope.name(), "S:Envelope");
        assert_eq!(envelope.prefix(), Some("S"));
        assert_eq!(envelope.namespace(), Some(SOAP12_NAMESPACE));
        let declarations: Vec<_> = envelope.namespace_declarations().collect();
        assert_eq!(declarations, [("S", SOAP12_NAMESPACE)]);
    }

    #[test]
    fn test_declarations_keep_default_namespace() {
        let tag = StartTag::new("Envelope", Some("urn:e"))
            .with_attribute("xmlns", "urn:e")
            .with_attribute("xmlns:x", "urn:x")
            .with_attribute("id", "e1");
        let infoset = TagInfoset::new(tag);
        let declarations: Vec<_> = infoset.namespace_declarations().collect();
        assert_eq!(declarations, [("", "urn:e"), ("x", "urn:x")]);
        assert_eq!(infoset.attributes().len(), 3);
    }
}
