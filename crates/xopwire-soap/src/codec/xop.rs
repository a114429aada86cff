//! XOP reference resolution.

use crate::error::{Error, Result};
use crate::xml::{BinaryData, StartTag, Token, TokenReader};
use bytes::Bytes;
use xopwire_mime::AttachmentSet;
use xopwire_mime::encoding::content_id_from_href;

/// Namespace of the XOP `Include` element.
pub const XOP_NAMESPACE: &str = "http://www.w3.org/2004/08/xop/include";

/// Local name of the XOP indirection element.
pub const XOP_INCLUDE: &str = "Include";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum XopState {
    Normal,
    /// Inside an `xop:Include` whose content was already replaced.
    Substituting { depth: usize },
}

/// Replaces `xop:Include` elements with the attachment they reference.
///
/// Each include element, including its end tag and anything inside it,
/// becomes a single [`Token::Binary`] carrying the attachment bytes.
/// References to missing parts resolve to empty content with a warning, or
/// fail when the reader is strict.
pub struct XopReader<R> {
    inner: R,
    attachments: AttachmentSet,
    strict: bool,
    state: XopState,
}

impl<R: TokenReader> XopReader<R> {
    /// Wraps `inner`, resolving references against `attachments`.
    pub const fn new(inner: R, attachments: AttachmentSet, strict: bool) -> Self {
        Self {
            inner,
            attachments,
            strict,
            state: XopState::Normal,
        }
    }

    fn resolve(&self, include: &StartTag) -> Result<BinaryData> {
        let href = include
            .attribute("href")
            .ok_or_else(|| Error::malformed("xop:Include without href"))?;
        let content_id = content_id_from_href(href)?;

        if let Some(attachment) = self.attachments.get(&content_id) {
            tracing::trace!(%content_id, len = attachment.len(), "Resolved xop:Include");
            return Ok(
                BinaryData::new(attachment.data().clone(), Some(attachment.content_type()))
                    .with_content_id(attachment.content_id().clone()),
            );
        }

        if self.strict {
            return Err(Error::malformed(format!(
                "xop:Include references missing part <{content_id}>"
            )));
        }
        tracing::warn!(%content_id, "xop:Include references a missing part, using empty content");
        Ok(BinaryData::new(Bytes::new(), None))
    }
}

impl<R: TokenReader> TokenReader for XopReader<R> {
    fn next_token(&mut self) -> Result<Option<Token>> {
        loop {
            let Some(token) = self.inner.next_token()? else {
                if self.state != XopState::Normal {
                    return Err(Error::malformed("input ended inside xop:Include"));
                }
                return Ok(None);
            };

            if let XopState::Substituting { depth } = self.state {
                self.state = match token {
                    Token::Start(_) => XopState::Substituting { depth: depth + 1 },
                    Token::End(_) if depth == 0 => XopState::Normal,
                    Token::End(_) => XopState::Substituting { depth: depth - 1 },
                    _ => self.state,
                };
                continue;
            }

            return match token {
                Token::Start(tag) if tag.is(XOP_NAMESPACE, XOP_INCLUDE) => {
                    let binary = self.resolve(&tag)?;
                    self.state = XopState::Substituting { depth: 0 };
                    Ok(Some(Token::Binary(binary)))
                }
                other => Ok(Some(other)),
            };
        }
    }
}
