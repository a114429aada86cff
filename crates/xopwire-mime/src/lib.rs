//! # xopwire-mime
//!
//! MIME building blocks for packaging an XML root part with binary
//! attachments as `multipart/related` (RFC 2387).
//!
//! ## Features
//!
//! - **Content types**: parsing and rendering with ordered, quoted parameters
//! - **Multipart**: zero-copy parsing and streaming writing of packages
//! - **Attachments**: content-ID keyed, insertion-ordered attachment sets
//! - **Identifiers**: boundary and content-ID generation
//! - **Encoding/Decoding**: Base64, Quoted-Printable, `cid:` URL decoding
//!
//! ## Quick Start
//!
//! ### Writing a package
//!
//! ```ignore
//! use xopwire_mime::{Attachment, Boundary, Headers, MultipartWriter};
//!
//! let mut writer = MultipartWriter::new(Vec::new(), Boundary::generate());
//! let mut root = Headers::new();
//! root.add("Content-Type", "text/xml; charset=utf-8");
//! writer.write_part(&root, b"<doc/>")?;
//! writer.write_attachment(&Attachment::new("logo@example", "image/png", png_bytes))?;
//! let bytes = writer.finish()?;
//! ```
//!
//! ### Reading a package
//!
//! ```ignore
//! use xopwire_mime::{Boundary, ContentType, Multipart};
//!
//! let ct = ContentType::parse(content_type_header)?;
//! let boundary = Boundary::new(ct.boundary().ok_or(xopwire_mime::Error::MissingBoundary)?);
//! let mut package = Multipart::parse(body, &boundary)?;
//! let root = package.take_root(ct.parameter("start"))?;
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

mod attachment;
mod boundary;
mod content_type;
mod error;
mod header;
mod multipart;
mod part;

pub mod encoding;

pub use attachment::{Attachment, AttachmentSet};
pub use boundary::{Boundary, ContentId, ID_DOMAIN};
pub use content_type::ContentType;
pub use error::{Error, Result};
pub use header::Headers;
pub use multipart::{Multipart, MultipartWriter};
pub use part::{Part, TransferEncoding, is_codec_header};

/// Re-exported so callers can build attachments without a direct dependency.
pub use bytes::Bytes;
