//! MIME header handling.

use crate::error::{Error, Result};
use std::fmt;

/// Ordered collection of MIME part headers.
///
/// Names are matched case-insensitively but written back with the spelling
/// they were added with, in insertion order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Headers {
    headers: Vec<(String, String)>,
}

impl Headers {
    /// Creates a new empty header collection.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a header value.
    pub fn add(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.headers.push((name.into(), value.into()));
    }

    /// Gets the first value for a header.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Returns `true` if no headers are present.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.headers.is_empty()
    }

    /// Returns the number of header lines.
    #[must_use]
    pub fn len(&self) -> usize {
        self.headers.len()
    }

    /// Returns an iterator over all headers in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.headers.iter().map(|(n, v)| (n.as_str(), v.as_str()))
    }

    /// Parses a header block.
    ///
    /// Headers are in the format:
    /// ```text
    /// Header-Name: value
    ///   folded continuation
    /// ```
    ///
    /// Parsing stops at the first empty line. Both CRLF and bare LF line
    /// endings are accepted.
    ///
    /// # Errors
    ///
    /// Returns an error if a line is neither a header nor a continuation.
    pub fn parse(text: &str) -> Result<Self> {
        let mut headers = Self::new();
        let mut current: Option<(String, String)> = None;

        for line in text.lines() {
            if line.is_empty() {
                break;
            }

            // Continuation line (starts with space or tab)
            if line.starts_with(' ') || line.starts_with('\t') {
                match current.as_mut() {
                    Some((_, value)) => {
                        value.push(' ');
                        value.push_str(line.trim());
                    }
                    None => {
                        return Err(Error::InvalidHeader(format!(
                            "Continuation without header: {line:?}"
                        )));
                    }
                }
                continue;
            }

            if let Some((name, value)) = current.take() {
                headers.add(name, value);
            }

            let (name, value) = line
                .split_once(':')
                .ok_or_else(|| Error::InvalidHeader(format!("Missing colon: {line:?}")))?;
            let name = name.trim();
            if name.is_empty() {
                return Err(Error::InvalidHeader(format!("Empty header name: {line:?}")));
            }
            current = Some((name.to_string(), value.trim().to_string()));
        }

        if let Some((name, value)) = current {
            headers.add(name, value);
        }

        Ok(headers)
    }
}

impl fmt::Display for Headers {
    /// Writes each header as `Name: value` followed by CRLF.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (name, value) in &self.headers {
            write!(f, "{name}: {value}\r\n")?;
        }
        Ok(())
    }
}

impl<N: Into<String>, V: Into<String>> FromIterator<(N, V)> for Headers {
    fn from_iter<I: IntoIterator<Item = (N, V)>>(iter: I) -> Self {
        let mut headers = Self::new();
        for (name, value) in iter {
            headers.add(name, value);
        }
        headers
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_headers_new() {
        let headers = Headers::new();
        assert!(headers.is_empty());
    }

    #[test]
    fn test_headers_add_get() {
        let mut headers = Headers::new();
        headers.add("Content-Type", "text/xml");
        assert_eq!(headers.get("Content-Type"), Some("text/xml"));
        assert_eq!(headers.get("content-type"), Some("text/xml")); // Case insensitive
    }

    #[test]
    fn test_headers_parse() {
        let text = concat!(
            "Content-Id: <rootpart@x>\r\n",
            "Content-Type: application/xop+xml;\r\n",
            " charset=utf-8\r\n",
            "Content-Transfer-Encoding: binary\r\n",
            "\r\n",
            "ignored: body"
        );

        let headers = Headers::parse(text).unwrap();
        assert_eq!(headers.len(), 3);
        assert_eq!(headers.get("content-id"), Some("<rootpart@x>"));
        assert_eq!(
            headers.get("Content-Type"),
            Some("application/xop+xml; charset=utf-8")
        );
        assert_eq!(headers.get("ignored"), None);
    }

    #[test]
    fn test_headers_parse_rejects_garbage() {
        assert!(Headers::parse("no colon here\r\n").is_err());
        assert!(Headers::parse(" leading continuation\r\n").is_err());
    }

    #[test]
    fn test_headers_display_keeps_order_and_spelling() {
        let headers: Headers = [("Content-Id", "<a>"), ("Content-Type", "image/png")]
            .into_iter()
            .collect();
        assert_eq!(
            headers.to_string(),
            "Content-Id: <a>\r\nContent-Type: image/png\r\n"
        );
    }
}
