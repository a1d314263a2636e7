//! `vmess://` links: base64 of a JSON object (the v2rayN share format).

use crate::{b64, non_empty};
use nodescore_core::{Descriptor, ParseFailure, ProtocolSettings, StreamSettings};
use serde_json::{Map, Value};

pub(crate) fn parse(body: &str) -> Result<Descriptor, ParseFailure> {
    let text = b64::decode_text(body, "vmess payload")?;
    let value: Value = serde_json::from_str(text.trim())
        .map_err(|e| ParseFailure::malformed(format!("vmess payload is not JSON: {}", e)))?;
    let obj = value
        .as_object()
        .ok_or_else(|| ParseFailure::malformed("vmess payload is not a JSON object"))?;

    let address = text_field(obj, "add").ok_or_else(|| ParseFailure::missing("add"))?;
    let port = match obj.get("port") {
        None | Some(Value::Null) => return Err(ParseFailure::missing("port")),
        Some(Value::String(s)) if s.trim().is_empty() => return Err(ParseFailure::missing("port")),
        Some(v) => coerce_int(v)
            .and_then(|n| u16::try_from(n).ok())
            .ok_or_else(|| ParseFailure::invalid("port", format!("{} is not a port number", v)))?,
    };
    let legacy_alter_id = match obj.get("aid") {
        None | Some(Value::Null) => 0,
        Some(Value::String(s)) if s.trim().is_empty() => 0,
        Some(v) => coerce_int(v)
            .and_then(|n| u32::try_from(n).ok())
            .ok_or_else(|| ParseFailure::invalid("aid", format!("{} is not a non-negative integer", v)))?,
    };

    let settings = ProtocolSettings::Vmess {
        identifier: text_field(obj, "id").unwrap_or_default(),
        legacy_alter_id,
        cipher_method: text_field(obj, "scy"),
        stream: StreamSettings {
            security_mode: text_field(obj, "tls"),
            transport: text_field(obj, "net"),
            host_header: text_field(obj, "host"),
            path: text_field(obj, "path"),
            server_name_indication: text_field(obj, "sni"),
        },
    };
    let label = text_field(obj, "ps").unwrap_or_default();
    Ok(Descriptor::new(address, port, settings)?.with_label(label))
}

/// Numbers arrive either as JSON numbers or as numeric strings.
fn coerce_int(v: &Value) -> Option<i64> {
    match v {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().filter(|f| f.fract() == 0.0).map(|f| f as i64)),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn text_field(obj: &Map<String, Value>, key: &str) -> Option<String> {
    match obj.get(key)? {
        Value::String(s) => non_empty(s),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}
