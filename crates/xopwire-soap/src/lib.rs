//! # xopwire-soap
//!
//! Streaming SOAP messages and the wire codecs that carry them: plain XML,
//! SOAP with attachments, and MTOM/XOP.
//!
//! ## Features
//!
//! - **Messages**: envelope, header and body tags kept as written, with a
//!   payload that is read exactly once (or [`copied`](StreamMessage::copy))
//! - **MTOM/XOP**: binary content at or above a size threshold is moved
//!   into `multipart/related` parts and referenced through `xop:Include`
//! - **Whitespace fidelity**: spacing around the payload and envelope
//!   children survives a decode and re-encode
//! - **Sniffing**: content types are classified to pick a decoder
//!
//! ## Quick Start
//!
//! ### Encoding
//!
//! ```ignore
//! use xopwire_soap::{CodecConfig, SoapCodec, SoapVersion, StreamMessage};
//!
//! let codec = SoapCodec::new(CodecConfig::builder().mtom(true).threshold(1024).build());
//! let mut message = StreamMessage::from_payload_xml(SoapVersion::Soap12, payload_xml)?;
//!
//! // The header value must match the boundary used in the body.
//! let content_type = codec.static_content_type(&mut message)?;
//! let mut body = Vec::new();
//! codec.encode(&mut message, &mut body)?;
//! ```
//!
//! ### Decoding
//!
//! ```ignore
//! use xopwire_soap::{CodecConfig, SoapCodec};
//!
//! let codec = SoapCodec::new(CodecConfig::default());
//! let mut message = codec.decode(body, content_type_header)?;
//! for token in message.read_payload_tokens()? {
//!     // Attachments referenced with xop:Include arrive as Token::Binary.
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

pub mod codec;
mod config;
mod error;
pub mod message;
pub mod sniff;
mod version;
pub mod xml;

pub use codec::{
    EncodedContentType, MimeCodec, MtomCodec, MtomWriter, RootCodec, SoapCodec, WrittenRoot,
    XOP_INCLUDE, XOP_MEDIA_TYPE, XOP_NAMESPACE, XmlCodec, XopReader,
};
pub use config::{CodecConfig, CodecConfigBuilder, DEFAULT_ENCODING, DEFAULT_THRESHOLD};
pub use error::{Error, ErrorKind, Result};
pub use message::{
    DecodeInfo, EnvelopeSpacing, HeaderBlock, MessageHeaders, PayloadReader, StreamMessage,
    TagInfoset,
};
pub use sniff::{ContentClass, RootKind, classify};
pub use version::{SOAP11_NAMESPACE, SOAP12_NAMESPACE, SoapVersion};
pub use xml::{BinaryData, Token, TokenReader, TokenSink};

// Re-export the MIME layer
pub use xopwire_mime;
