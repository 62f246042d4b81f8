//! Request path normalization.
//!
//! # Responsibilities
//! - Percent-decode each segment
//! - Collapse duplicate slashes, drop `.` and resolve `..`
//! - Reject paths that climb above the root or smuggle separators
//!
//! The normalized form is the only path representation the resolver sees.

use std::fmt;

use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("invalid request path {path:?}: {reason}")]
pub struct InvalidPath {
    pub path: String,
    pub reason: &'static str,
}

/// A path split into clean segments.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct NormalizedPath {
    segments: Vec<String>,
    trailing_slash: bool,
}

impl NormalizedPath {
    /// Normalize a raw request path (without query string).
    pub fn parse(raw: &str) -> Result<Self, InvalidPath> {
        let invalid = |reason| InvalidPath { path: raw.to_string(), reason };

        let raw = raw.split(['?', '#']).next().unwrap_or_default();
        let mut segments: Vec<String> = Vec::new();
        let mut trailing_slash = raw.ends_with('/');

        for piece in raw.split('/') {
            if piece.is_empty() {
                continue;
            }
            let segment = percent_decode(piece).ok_or_else(|| invalid("malformed percent-encoding"))?;
            if segment.contains(['/', '\\', '\0']) {
                return Err(invalid("segment contains a forbidden character"));
            }
            match segment.as_str() {
                "." => trailing_slash = true,
                ".." => {
                    if segments.pop().is_none() {
                        return Err(invalid("path escapes the root"));
                    }
                    trailing_slash = true;
                }
                _ => {
                    segments.push(segment);
                    trailing_slash = false;
                }
            }
        }
        // The loop above resets the flag per segment; a literal trailing '/' wins.
        if raw.ends_with('/') {
            trailing_slash = true;
        }

        Ok(Self { segments, trailing_slash })
    }

    /// Build from a relative path such as a manifest route target.
    pub fn parse_relative(raw: &str) -> Result<Self, InvalidPath> {
        Self::parse(&format!("/{}", raw.trim_start_matches('/')))
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    pub fn has_trailing_slash(&self) -> bool {
        self.trailing_slash
    }

    pub fn is_root(&self) -> bool {
        self.segments.is_empty()
    }

    /// Segment-wise prefix test: `/app/` is a prefix of `/app` and `/app/x`,
    /// never of `/application`.
    pub fn starts_with(&self, prefix: &[String]) -> bool {
        self.segments.len() >= prefix.len() && self.segments[..prefix.len()] == *prefix
    }

    /// Segments left after removing the first `count`.
    pub fn strip(&self, count: usize) -> &[String] {
        &self.segments[count.min(self.segments.len())..]
    }

    /// Relative form, `a/b/c` without leading slash.
    pub fn relative(&self) -> String {
        self.segments.join("/")
    }
}

impl fmt::Display for NormalizedPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "/{}", self.segments.join("/"))?;
        if self.trailing_slash && !self.segments.is_empty() {
            f.write_str("/")?;
        }
        Ok(())
    }
}

fn percent_decode(input: &str) -> Option<String> {
    if !input.contains('%') {
        return Some(input.to_string());
    }
    let bytes = input.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' {
            let hi = bytes.get(i + 1).and_then(|b| (*b as char).to_digit(16))?;
            let lo = bytes.get(i + 2).and_then(|b| (*b as char).to_digit(16))?;
            out.push((hi * 16 + lo) as u8);
            i += 3;
        } else {
            out.push(bytes[i]);
            i += 1;
        }
    }
    String::from_utf8(out).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn norm(raw: &str) -> String {
        NormalizedPath::parse(raw).unwrap().to_string()
    }

    #[test]
    fn test_collapses_and_resolves_dots() {
        assert_eq!(norm("/"), "/");
        assert_eq!(norm("//app///x"), "/app/x");
        assert_eq!(norm("/app/./x/../y"), "/app/y");
        assert_eq!(norm("/app/sub/"), "/app/sub/");
        assert_eq!(norm("/app/sub/.."), "/app/");
        assert_eq!(norm("/a/b?query=1"), "/a/b");
    }

    #[test]
    fn test_rejects_escape() {
        assert!(NormalizedPath::parse("/..").is_err());
        assert!(NormalizedPath::parse("/app/../../etc/passwd").is_err());
        assert!(NormalizedPath::parse("/%2e%2e/etc").is_err());
    }

    #[test]
    fn test_rejects_encoded_separators() {
        assert!(NormalizedPath::parse("/app/a%2fb").is_err());
        assert!(NormalizedPath::parse("/app/a%5cb").is_err());
        assert!(NormalizedPath::parse("/app/a%00").is_err());
        assert!(NormalizedPath::parse("/app/%zz").is_err());
    }

    #[test]
    fn test_percent_decoding() {
        let path = NormalizedPath::parse("/docs/my%20file.html").unwrap();
        assert_eq!(path.relative(), "docs/my file.html");
    }

    #[test]
    fn test_segment_prefix() {
        let path = NormalizedPath::parse("/application/x").unwrap();
        assert!(!path.starts_with(&["app".to_string()]));
        let path = NormalizedPath::parse("/app").unwrap();
        assert!(path.starts_with(&["app".to_string()]));
        assert!(path.strip(1).is_empty());
    }
}
