//! `ss://` links in their three common shapes:
//!
//! * `ss://method:password@host:port#label` (plain userinfo)
//! * `ss://base64(method:password)@host:port/?plugin=...#label` (SIP002)
//! * `ss://base64(method:password@host:port)#label` (legacy)
//!
//! The base64 alphabet has no `@`, so an `@` before the label selects one of
//! the delimited shapes and its absence selects the legacy one.

use crate::{b64, decode_component, non_empty};
use nodescore_core::{Descriptor, ParseFailure, ProtocolSettings};

pub(crate) fn parse(body: &str) -> Result<Descriptor, ParseFailure> {
    let (body, label) = match body.split_once('#') {
        Some((b, fragment)) => (b, decode_component(fragment)),
        None => (body, String::new()),
    };
    let (body, plugin) = split_query(body);

    let (method, secret, host_port) = match body.split_once('@') {
        Some((userinfo, host_port)) => {
            let (method, secret) = split_userinfo(userinfo)?;
            (method, secret, host_port.to_string())
        }
        None => parse_legacy(body)?,
    };
    let (address, port) = split_host_port(&host_port)?;
    let cipher_method = non_empty(&method).ok_or_else(|| ParseFailure::missing("method"))?;

    let settings = ProtocolSettings::Shadowsocks { cipher_method, secret, plugin };
    Ok(Descriptor::new(address, port, settings)?.with_label(label))
}

/// Strip a SIP002 query (`/?plugin=...`), looking only past the last `@` so a
/// `?` inside a plain password is left alone.
fn split_query(body: &str) -> (&str, Option<String>) {
    let start = body.rfind('@').map(|i| i + 1).unwrap_or(0);
    match body[start..].find('?') {
        Some(i) => {
            let (head, query) = (&body[..start + i], &body[start + i + 1..]);
            let plugin = url::form_urlencoded::parse(query.as_bytes())
                .find(|(k, _)| k == "plugin")
                .and_then(|(_, v)| non_empty(&v));
            (head.trim_end_matches('/'), plugin)
        }
        None => (body.trim_end_matches('/'), None),
    }
}

fn split_userinfo(userinfo: &str) -> Result<(String, String), ParseFailure> {
    let plain = if userinfo.contains(':') {
        decode_component(userinfo)
    } else {
        b64::decode_text(&decode_component(userinfo), "shadowsocks userinfo")?
    };
    plain
        .split_once(':')
        .map(|(m, p)| (m.to_string(), p.to_string()))
        .ok_or_else(|| ParseFailure::malformed("shadowsocks userinfo has no 'method:password' separator"))
}

fn parse_legacy(body: &str) -> Result<(String, String, String), ParseFailure> {
    let decoded = b64::decode_text(body, "shadowsocks body")?;
    let decoded = decoded.trim();
    // the host cannot contain '@', the password can
    let (userinfo, host_port) = decoded
        .rsplit_once('@')
        .ok_or_else(|| ParseFailure::malformed("decoded shadowsocks body has no '@'"))?;
    let (method, secret) = userinfo
        .split_once(':')
        .ok_or_else(|| ParseFailure::malformed("decoded shadowsocks body has no 'method:password' separator"))?;
    Ok((method.to_string(), secret.to_string(), host_port.to_string()))
}

fn split_host_port(s: &str) -> Result<(String, u16), ParseFailure> {
    let s = s.trim().trim_end_matches('/');
    let (host, port) = if let Some(rest) = s.strip_prefix('[') {
        let (host, after) = rest
            .split_once(']')
            .ok_or_else(|| ParseFailure::malformed("unterminated IPv6 literal"))?;
        let port = after.strip_prefix(':').ok_or_else(|| ParseFailure::missing("port"))?;
        (host, port)
    } else {
        s.rsplit_once(':').ok_or_else(|| ParseFailure::missing("port"))?
    };
    if host.trim().is_empty() {
        return Err(ParseFailure::missing("address"));
    }
    let port: u16 = port
        .trim()
        .parse()
        .map_err(|_| ParseFailure::invalid("port", format!("'{}' is not a number in 1-65535", port)))?;
    Ok((host.trim().to_string(), port))
}
