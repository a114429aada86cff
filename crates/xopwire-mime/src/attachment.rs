//! Attachments carried next to the root part of a `multipart/related` package.

use crate::boundary::ContentId;
use crate::header::Headers;
use bytes::Bytes;
use std::collections::HashMap;

/// A binary MIME part identified by its content-ID.
///
/// The payload is held as [`Bytes`], so handing it to several readers only
/// bumps a reference count.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    content_id: ContentId,
    content_type: String,
    data: Bytes,
    headers: Headers,
}

impl Attachment {
    /// Creates an attachment.
    #[must_use]
    pub fn new(
        content_id: impl Into<ContentId>,
        content_type: impl Into<String>,
        data: impl Into<Bytes>,
    ) -> Self {
        Self {
            content_id: content_id.into(),
            content_type: content_type.into(),
            data: data.into(),
            headers: Headers::new(),
        }
    }

    /// Adds a custom MIME header written with the part.
    ///
    /// `Content-Id`, `Content-Type` and `Content-Transfer-Encoding` are
    /// owned by the codec and are never written from this list.
    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.add(name, value);
        self
    }

    /// Returns the content-ID.
    #[must_use]
    pub const fn content_id(&self) -> &ContentId {
        &self.content_id
    }

    /// Returns the content type.
    #[must_use]
    pub fn content_type(&self) -> &str {
        &self.content_type
    }

    /// Returns the payload.
    #[must_use]
    pub const fn data(&self) -> &Bytes {
        &self.data
    }

    /// Returns the custom headers.
    #[must_use]
    pub const fn headers(&self) -> &Headers {
        &self.headers
    }

    /// Returns the payload length in bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Returns `true` if the payload is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// Ordered set of attachments with lookup by content-ID.
///
/// Iteration yields attachments in the order they were added; adding an
/// attachment whose content-ID is already present replaces it in place.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AttachmentSet {
    attachments: Vec<Attachment>,
    index: HashMap<ContentId, usize>,
}

impl AttachmentSet {
    /// Creates an empty set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an attachment.
    pub fn add(&mut self, attachment: Attachment) {
        if let Some(&slot) = self.index.get(attachment.content_id()) {
            self.attachments[slot] = attachment;
        } else {
            self.index
                .insert(attachment.content_id().clone(), self.attachments.len());
            self.attachments.push(attachment);
        }
    }

    /// Looks up an attachment by content-ID (angle brackets optional).
    #[must_use]
    pub fn get(&self, content_id: &str) -> Option<&Attachment> {
        self.index
            .get(&ContentId::new(content_id))
            .map(|&slot| &self.attachments[slot])
    }

    /// Returns `true` if an attachment with this content-ID exists.
    #[must_use]
    pub fn contains(&self, content_id: &str) -> bool {
        self.get(content_id).is_some()
    }

    /// Iterates in insertion order.
    pub fn iter(&self) -> std::slice::Iter<'_, Attachment> {
        self.attachments.iter()
    }

    /// Returns the number of attachments.
    #[must_use]
    pub fn len(&self) -> usize {
        self.attachments.len()
    }

    /// Returns `true` if the set is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.attachments.is_empty()
    }
}

impl<'a> IntoIterator for &'a AttachmentSet {
    type Item = &'a Attachment;
    type IntoIter = std::slice::Iter<'a, Attachment>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

impl FromIterator<Attachment> for AttachmentSet {
    fn from_iter<I: IntoIterator<Item = Attachment>>(iter: I) -> Self {
        let mut set = Self::new();
        for attachment in iter {
            set.add(attachment);
        }
        set
    }
}
