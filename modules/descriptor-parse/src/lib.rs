//! Decode vmess, vless, shadowsocks and trojan share links into [`Descriptor`]s.
//!
//! Parsing is total: every input yields either a complete descriptor or a
//! [`ParseFailure`] explaining why not.

mod b64;
mod shadowsocks;
mod uri;
mod vmess;

pub use nodescore_core::{Descriptor, ParseFailure, ParseFailureKind, Protocol};

use percent_encoding::percent_decode_str;
use tracing::debug;

/// Parse one raw share link.
pub fn parse(raw: &str) -> Result<Descriptor, ParseFailure> {
    let raw = raw.trim();
    let Some((scheme, body)) = raw.split_once("://") else {
        return Err(ParseFailure::unsupported_scheme(raw));
    };
    let parsed = match scheme.to_ascii_lowercase().as_str() {
        "vmess" => vmess::parse(body),
        "vless" => uri::parse(raw, Protocol::Vless),
        "trojan" => uri::parse(raw, Protocol::Trojan),
        "ss" => shadowsocks::parse(body),
        _ => Err(ParseFailure::unsupported_scheme(raw)),
    };
    match parsed {
        Ok(d) => Ok(d.with_source(raw)),
        Err(e) => {
            debug!(scheme, error = %e, "descriptor rejected");
            Err(e)
        }
    }
}

/// Percent-decode a URL component (labels, credentials), replacing invalid UTF-8.
pub(crate) fn decode_component(s: &str) -> String {
    percent_decode_str(s).decode_utf8_lossy().trim().to_string()
}

pub(crate) fn non_empty(s: impl AsRef<str>) -> Option<String> {
    let s = s.as_ref().trim();
    if s.is_empty() { None } else { Some(s.to_string()) }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn unknown_scheme_is_reported() {
        let e = parse("http://example.com:80").unwrap_err();
        assert_eq!(e.kind, ParseFailureKind::UnsupportedScheme);
        let e = parse("not a link").unwrap_err();
        assert_eq!(e.kind, ParseFailureKind::UnsupportedScheme);
    }

    #[test]
    fn scheme_match_ignores_case_and_whitespace() {
        let d = parse("  TROJAN://pw@example.com:443#n \n").unwrap();
        assert_eq!(d.protocol(), Protocol::Trojan);
        assert_eq!(d.source(), "TROJAN://pw@example.com:443#n");
    }

    proptest! {
        #[test]
        fn parse_is_total(s in ".*") {
            if let Ok(d) = parse(&s) {
                prop_assert!(!d.address().is_empty());
                prop_assert!(d.port() != 0);
            }
        }

        #[test]
        fn parse_is_total_per_scheme(
            scheme in prop::sample::select(vec!["vmess://", "vless://", "ss://", "trojan://"]),
            body in "[A-Za-z0-9+/=@:#?&%._\\[\\]-]{0,64}",
        ) {
            let raw = format!("{}{}", scheme, body);
            match parse(&raw) {
                Ok(d) => {
                    prop_assert!(!d.address().is_empty());
                    prop_assert!(d.port() != 0);
                }
                Err(e) => prop_assert!(!e.detail.is_empty()),
            }
        }
    }
}
