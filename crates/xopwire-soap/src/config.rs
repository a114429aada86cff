//! Codec configuration.

use crate::version::SoapVersion;

/// Default inlining threshold: every binary value is sent as an attachment.
pub const DEFAULT_THRESHOLD: usize = 0;

/// Default character encoding of the root part.
pub const DEFAULT_ENCODING: &str = "utf-8";

/// Options recognized by the codecs.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct CodecConfig {
    /// Encode outgoing messages with MTOM/XOP.
    pub mtom_enabled: bool,
    /// Binary values shorter than this many bytes are inlined as base64.
    pub threshold: usize,
    /// Character encoding written into the root part.
    pub preferred_encoding: String,
    /// SOAP version of the envelopes handled by this codec.
    pub soap_version: SoapVersion,
    /// Fail decoding when an `xop:Include` names a part that is not present.
    pub strict_xop_references: bool,
    /// Write an XML declaration before the envelope.
    pub write_xml_declaration: bool,
}

impl Default for CodecConfig {
    fn default() -> Self {
        Self {
            mtom_enabled: false,
            threshold: DEFAULT_THRESHOLD,
            preferred_encoding: DEFAULT_ENCODING.to_string(),
            soap_version: SoapVersion::Soap11,
            strict_xop_references: false,
            write_xml_declaration: true,
        }
    }
}

impl CodecConfig {
    /// Creates the default configuration (plain XML, SOAP 1.1, UTF-8).
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a configuration builder.
    #[must_use]
    pub fn builder() -> CodecConfigBuilder {
        CodecConfigBuilder::new()
    }
}

/// Builder for codec configuration.
#[derive(Debug, Clone, Default)]
pub struct CodecConfigBuilder {
    config: CodecConfig,
}

impl CodecConfigBuilder {
    /// Creates a builder starting from the defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Enables or disables MTOM.
    #[must_use]
    pub const fn mtom(mut self, enabled: bool) -> Self {
        self.config.mtom_enabled = enabled;
        self
    }

    /// Sets the inlining threshold in bytes.
    #[must_use]
    pub const fn threshold(mut self, threshold: usize) -> Self {
        self.config.threshold = threshold;
        self
    }

    /// Sets the preferred character encoding.
    #[must_use]
    pub fn preferred_encoding(mut self, encoding: impl Into<String>) -> Self {
        self.config.preferred_encoding = encoding.into();
        self
    }

    /// Sets the SOAP version.
    #[must_use]
    pub const fn soap_version(mut self, version: SoapVersion) -> Self {
        self.config.soap_version = version;
        self
    }

    /// Makes unresolvable `xop:Include` references a decode error.
    #[must_use]
    pub const fn strict_xop_references(mut self, strict: bool) -> Self {
        self.config.strict_xop_references = strict;
        self
    }

    /// Enables or disables the XML declaration.
    #[must_use]
    pub const fn write_xml_declaration(mut self, write: bool) -> Self {
        self.config.write_xml_declaration = write;
        self
    }

    /// Builds the configuration.
    #[must_use]
    pub fn build(self) -> CodecConfig {
        self.config
    }
}
