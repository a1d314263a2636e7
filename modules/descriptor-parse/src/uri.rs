//! `vless://` and `trojan://` links: `scheme://credential@host:port?query#label`.

use crate::{decode_component, non_empty};
use nodescore_core::{Descriptor, ParseFailure, Protocol, ProtocolSettings, StreamSettings};
use url::{Host, Url};

pub(crate) fn parse(raw: &str, protocol: Protocol) -> Result<Descriptor, ParseFailure> {
    let url = Url::parse(raw).map_err(|e| match e {
        url::ParseError::InvalidPort => ParseFailure::invalid("port", "not a number in 1-65535"),
        url::ParseError::EmptyHost => ParseFailure::missing("host"),
        other => ParseFailure::malformed(format!("{} link: {}", protocol, other)),
    })?;

    let address = match url.host() {
        Some(Host::Domain(d)) => decode_component(d),
        Some(Host::Ipv4(ip)) => ip.to_string(),
        Some(Host::Ipv6(ip)) => ip.to_string(),
        None => String::new(),
    };
    if address.is_empty() {
        return Err(ParseFailure::missing("host"));
    }
    let port = url.port().ok_or_else(|| ParseFailure::missing("port"))?;

    // a ':' inside the credential makes the url crate split it into user and password
    let mut credential = decode_component(url.username());
    if let Some(rest) = url.password() {
        credential = format!("{}:{}", credential, decode_component(rest));
    }

    let mut stream = StreamSettings::default();
    let mut flow_control = None;
    let mut peer = None;
    for (key, value) in url.query_pairs() {
        let value = non_empty(&value);
        match key.as_ref() {
            "security" => stream.security_mode = value,
            "type" => stream.transport = value,
            "host" => stream.host_header = value,
            "path" => stream.path = value,
            "sni" => stream.server_name_indication = value,
            "peer" => peer = value,
            "flow" => flow_control = value,
            _ => {}
        }
    }
    if stream.server_name_indication.is_none() {
        stream.server_name_indication = peer;
    }

    let settings = match protocol {
        Protocol::Vless => ProtocolSettings::Vless { identifier: credential, flow_control, stream },
        _ => ProtocolSettings::Trojan { secret: credential, stream },
    };
    let label = url.fragment().map(decode_component).unwrap_or_default();
    Ok(Descriptor::new(address, port, settings)?.with_label(label))
}
