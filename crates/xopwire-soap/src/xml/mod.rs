//! XML token model, readers and writers.
//!
//! Messages are processed as a stream of owned [`Token`]s pulled from a
//! [`TokenReader`] and pushed into a [`TokenSink`]. Readers and sinks are
//! composed as decorators, which is how XOP references are resolved on
//! decode and binary content is hoisted on encode.

mod reader;
mod token;
mod writer;

pub use reader::{BufferCursor, TokenBuffer, TokenReader, VecTokenReader, XmlTokenReader, read_all};
pub use token::{Attribute, BinaryData, EndTag, StartTag, Token, is_xml_whitespace};
pub use writer::{TokenSink, XmlWriter, write_all};
