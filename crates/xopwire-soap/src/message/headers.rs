//! SOAP header blocks.

use crate::error::{Error, Result};
use crate::xml::{StartTag, Token};

/// The content of the `Header` element.
///
/// Kept as the raw token run between the header tags, so whitespace and
/// comments between blocks survive a round trip.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MessageHeaders {
    tokens: Vec<Token>,
}

impl MessageHeaders {
    /// Creates an empty header list.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Wraps the tokens found between the header start and end tags.
    ///
    /// # Errors
    ///
    /// Returns an error if the tokens do not form balanced elements.
    pub fn from_tokens(tokens: Vec<Token>) -> Result<Self> {
        check_balanced(&tokens)?;
        Ok(Self { tokens })
    }

    /// Appends one header block (a complete element).
    ///
    /// # Errors
    ///
    /// Returns an error if `block` is not a single balanced element.
    pub fn add(&mut self, block: Vec<Token>) -> Result<()> {
        check_balanced(&block)?;
        if HeaderBlocks::new(&block).count() != 1 {
            return Err(Error::malformed("a header block must be exactly one element"));
        }
        self.tokens.extend(block);
        Ok(())
    }

    /// Iterates over the header blocks in document order.
    #[must_use]
    pub fn iter(&self) -> HeaderBlocks<'_> {
        HeaderBlocks::new(&self.tokens)
    }

    /// Finds the first block with the given namespace and local name.
    #[must_use]
    pub fn find(&self, namespace: &str, local_name: &str) -> Option<HeaderBlock<'_>> {
        self.iter().find(|b| b.tag().is(namespace, local_name))
    }

    /// Returns the number of blocks.
    #[must_use]
    pub fn len(&self) -> usize {
        self.iter().count()
    }

    /// Returns true if there are no blocks.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.iter().next().is_none()
    }

    /// Returns the raw tokens.
    #[must_use]
    pub fn tokens(&self) -> &[Token] {
        &self.tokens
    }
}

impl<'a> IntoIterator for &'a MessageHeaders {
    type Item = HeaderBlock<'a>;
    type IntoIter = HeaderBlocks<'a>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// A view of one header element and its content.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeaderBlock<'a> {
    tag: &'a StartTag,
    tokens: &'a [Token],
}

impl<'a> HeaderBlock<'a> {
    /// Returns the block's start tag.
    #[must_use]
    pub const fn tag(&self) -> &'a StartTag {
        self.tag
    }

    /// Returns the tokens from the start tag to the end tag, inclusive.
    #[must_use]
    pub const fn tokens(&self) -> &'a [Token] {
        self.tokens
    }

    /// Returns the concatenated character content of the block.
    #[must_use]
    pub fn text(&self) -> String {
        self.tokens
            .iter()
            .filter_map(Token::text)
            .collect()
    }
}

/// Iterator over [`HeaderBlock`]s.
#[derive(Debug, Clone)]
pub struct HeaderBlocks<'a> {
    tokens: &'a [Token],
    pos: usize,
}

impl<'a> HeaderBlocks<'a> {
    const fn new(tokens: &'a [Token]) -> Self {
        Self { tokens, pos: 0 }
    }
}

impl<'a> Iterator for HeaderBlocks<'a> {
    type Item = HeaderBlock<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        let tokens = self.tokens;
        while self.pos < tokens.len() {
            let start = self.pos;
            self.pos += 1;
            let Token::Start(tag) = &tokens[start] else {
                continue;
            };

            let mut depth = 1usize;
            while self.pos < tokens.len() && depth > 0 {
                match &tokens[self.pos] {
                    Token::Start(_) => depth += 1,
                    Token::End(_) => depth -= 1,
                    _ => {}
                }
                self.pos += 1;
            }
            return Some(HeaderBlock {
                tag,
                tokens: &tokens[start..self.pos],
            });
        }
        None
    }
}

/// Checks that start and end tags pair up.
fn check_balanced(tokens: &[Token]) -> Result<()> {
    let mut open: Vec<&str> = Vec::new();
    for token in tokens {
        match token {
            Token::Start(tag) => open.push(tag.name()),
            Token::End(end) => {
                if open.pop() != Some(end.name()) {
                    return Err(Error::malformed(format!(
                        "unexpected end tag '{}' in header",
                        end.name()
                    )));
                }
            }
            _ => {}
        }
    }
    if let Some(name) = open.last() {
        return Err(Error::malformed(format!("header element '{name}' is not closed")));
    }
    Ok(())
}
