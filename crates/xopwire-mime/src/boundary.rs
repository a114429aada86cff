//! Boundary and content-ID primitives.
//!
//! Both are generated from random UUIDs so they do not collide with part
//! content or with identifiers minted by other encode calls.

use std::fmt;
use uuid::Uuid;

/// Domain suffix of generated content-IDs (`<uuid>@xopwire`).
pub const ID_DOMAIN: &str = "xopwire";

/// A multipart boundary token.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Boundary(String);

impl Boundary {
    /// Wraps an existing boundary string (e.g. one read from a content type).
    #[must_use]
    pub fn new(boundary: impl Into<String>) -> Self {
        Self(boundary.into())
    }

    /// Generates a fresh `uuid:<uuid>` boundary.
    #[must_use]
    pub fn generate() -> Self {
        Self(format!("uuid:{}", Uuid::new_v4()))
    }

    /// Returns the boundary token.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns the delimiter line that opens a part: `--<boundary>`.
    #[must_use]
    pub fn delimiter(&self) -> String {
        format!("--{}", self.0)
    }

    /// Returns the delimiter that closes the package: `--<boundary>--`.
    #[must_use]
    pub fn close_delimiter(&self) -> String {
        format!("--{}--", self.0)
    }
}

impl fmt::Display for Boundary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A MIME content-ID, stored without its angle brackets.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ContentId(String);

impl ContentId {
    /// Creates a content-ID, dropping surrounding angle brackets if present.
    #[must_use]
    pub fn new(id: impl AsRef<str>) -> Self {
        let id = id.as_ref().trim();
        let bare = id
            .strip_prefix('<')
            .and_then(|rest| rest.strip_suffix('>'))
            .unwrap_or(id);
        Self(bare.to_string())
    }

    /// Generates a fresh attachment content-ID: `<uuid>@xopwire`.
    #[must_use]
    pub fn generate() -> Self {
        Self(format!("{}@{ID_DOMAIN}", Uuid::new_v4()))
    }

    /// Generates a fresh root part content-ID: `rootpart*<uuid>@xopwire`.
    #[must_use]
    pub fn generate_root() -> Self {
        Self(format!("rootpart*{}@{ID_DOMAIN}", Uuid::new_v4()))
    }

    /// Returns the bare identifier.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns the identifier in angle brackets, as used in `Content-Id`
    /// headers and the `start` parameter.
    #[must_use]
    pub fn header_value(&self) -> String {
        format!("<{}>", self.0)
    }

    /// Returns the `cid:` URL referencing this part.
    #[must_use]
    pub fn href(&self) -> String {
        format!("cid:{}", self.0)
    }
}

impl fmt::Display for ContentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ContentId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for ContentId {
    fn from(id: String) -> Self {
        Self::new(id)
    }
}
