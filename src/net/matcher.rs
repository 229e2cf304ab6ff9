//! Protocol matchers for listener multiplexing.
//!
//! # Responsibilities
//! - Inspect the first bytes of a connection
//! - Decide whether they belong to a protocol, or that more bytes are needed
//!
//! # Design Decisions
//! - Byte-prefix checks only; no parsing past the request line
//! - HTTP/1 method set is configurable so health probes with
//!   non-standard verbs still route to the HTTP server

use std::fmt;

/// Result of probing a connection preface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchOutcome {
    /// The preface belongs to this protocol.
    Matched,
    /// The preface cannot belong to this protocol.
    Rejected,
    /// Not enough bytes to decide.
    NeedMore,
}

/// Trait for matching connection prefaces.
pub trait Matcher: Send + Sync + fmt::Debug {
    fn probe(&self, preface: &[u8]) -> MatchOutcome;
}

/// Match `preface` against a fixed byte prefix.
fn probe_prefix(preface: &[u8], expected: &[u8]) -> MatchOutcome {
    let n = preface.len().min(expected.len());
    if preface[..n] != expected[..n] {
        MatchOutcome::Rejected
    } else if n < expected.len() {
        MatchOutcome::NeedMore
    } else {
        MatchOutcome::Matched
    }
}

/// Matches every connection.
#[derive(Debug, Clone, Copy, Default)]
pub struct AnyMatcher;

impl Matcher for AnyMatcher {
    fn probe(&self, _preface: &[u8]) -> MatchOutcome {
        MatchOutcome::Matched
    }
}

/// Matches a fixed byte prefix.
#[derive(Debug, Clone)]
pub struct PrefixMatcher {
    prefix: Vec<u8>,
}

impl PrefixMatcher {
    pub fn new(prefix: impl Into<Vec<u8>>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }
}

impl Matcher for PrefixMatcher {
    fn probe(&self, preface: &[u8]) -> MatchOutcome {
        probe_prefix(preface, &self.prefix)
    }
}

/// Matches an HTTP/1.x request line by its method token.
///
/// A connection matches once it starts with `METHOD ` for a known method.
#[derive(Debug, Clone)]
pub struct Http1Matcher {
    prefaces: Vec<Vec<u8>>,
}

impl Http1Matcher {
    /// Methods recognized by default.
    pub const DEFAULT_METHODS: [&'static str; 9] = [
        "GET", "HEAD", "POST", "PUT", "DELETE", "OPTIONS", "CONNECT", "TRACE", "PATCH",
    ];

    /// Recognize exactly `methods`.
    pub fn with_methods<I, M>(methods: I) -> Self
    where
        I: IntoIterator<Item = M>,
        M: AsRef<str>,
    {
        Self {
            prefaces: methods
                .into_iter()
                .map(|m| format!("{} ", m.as_ref()).into_bytes())
                .collect(),
        }
    }

    /// Recognize the default methods plus `extra`.
    pub fn with_extra_methods<I, M>(extra: I) -> Self
    where
        I: IntoIterator<Item = M>,
        M: AsRef<str>,
    {
        let mut matcher = Self::default();
        matcher.prefaces.extend(
            extra
                .into_iter()
                .map(|m| format!("{} ", m.as_ref()).into_bytes()),
        );
        matcher
    }
}

impl Default for Http1Matcher {
    fn default() -> Self {
        Self::with_methods(Self::DEFAULT_METHODS)
    }
}

impl Matcher for Http1Matcher {
    fn probe(&self, preface: &[u8]) -> MatchOutcome {
        let mut outcome = MatchOutcome::Rejected;
        for expected in &self.prefaces {
            match probe_prefix(preface, expected) {
                MatchOutcome::Matched => return MatchOutcome::Matched,
                MatchOutcome::NeedMore => outcome = MatchOutcome::NeedMore,
                MatchOutcome::Rejected => {}
            }
        }
        outcome
    }
}

/// Matches the HTTP/2 client connection preface (gRPC, h2c).
#[derive(Debug, Clone, Copy, Default)]
pub struct Http2Matcher;

impl Http2Matcher {
    pub const PREFACE: &'static [u8] = b"PRI * HTTP/2.0\r\n\r\nSM\r\n\r\n";
}

impl Matcher for Http2Matcher {
    fn probe(&self, preface: &[u8]) -> MatchOutcome {
        probe_prefix(preface, Self::PREFACE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn http1_matches_request_lines() {
        let matcher = Http1Matcher::default();
        assert_eq!(matcher.probe(b"GET / HTTP/1.1\r\n"), MatchOutcome::Matched);
        assert_eq!(matcher.probe(b"PATCH /users/1 HTTP/1.1\r\n"), MatchOutcome::Matched);
        assert_eq!(matcher.probe(b"OPTIONS * HTTP/1.1\r\n"), MatchOutcome::Matched);
    }

    #[test]
    fn http1_waits_for_partial_methods() {
        let matcher = Http1Matcher::default();
        assert_eq!(matcher.probe(b""), MatchOutcome::NeedMore);
        assert_eq!(matcher.probe(b"PO"), MatchOutcome::NeedMore);
        assert_eq!(matcher.probe(b"POST"), MatchOutcome::NeedMore);
    }

    #[test]
    fn http1_rejects_other_protocols() {
        let matcher = Http1Matcher::default();
        assert_eq!(matcher.probe(Http2Matcher::PREFACE), MatchOutcome::Rejected);
        assert_eq!(matcher.probe(b"\x16\x03\x01"), MatchOutcome::Rejected);
        assert_eq!(matcher.probe(b"GETX / HTTP/1.1"), MatchOutcome::Rejected);
        assert_eq!(matcher.probe(b"HEALTH / HTTP/1.1"), MatchOutcome::Rejected);
    }

    #[test]
    fn health_probe_verbs_can_be_added() {
        let matcher = Http1Matcher::with_extra_methods(["HEALTH"]);
        assert_eq!(matcher.probe(b"HEALTH / HTTP/1.1\r\n"), MatchOutcome::Matched);
        assert_eq!(matcher.probe(b"GET / HTTP/1.1\r\n"), MatchOutcome::Matched);
    }

    #[test]
    fn http2_preface() {
        assert_eq!(Http2Matcher.probe(Http2Matcher::PREFACE), MatchOutcome::Matched);
        assert_eq!(Http2Matcher.probe(b"PRI * HTTP"), MatchOutcome::NeedMore);
        assert_eq!(Http2Matcher.probe(b"PRIX"), MatchOutcome::Rejected);
    }

    #[test]
    fn prefix_and_any() {
        let matcher = PrefixMatcher::new(b"RPC1".to_vec());
        assert_eq!(matcher.probe(b"RPC1 call"), MatchOutcome::Matched);
        assert_eq!(matcher.probe(b"RP"), MatchOutcome::NeedMore);
        assert_eq!(matcher.probe(b"GET "), MatchOutcome::Rejected);
        assert_eq!(AnyMatcher.probe(b""), MatchOutcome::Matched);
    }
}
