//! Canonical node descriptor produced by the parser.

use serde::Serialize;
use std::fmt;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    Vmess,
    Vless,
    Shadowsocks,
    Trojan,
}

impl Protocol {
    /// URL scheme used by share links of this protocol.
    pub const fn scheme(self) -> &'static str {
        match self {
            Protocol::Vmess => "vmess",
            Protocol::Vless => "vless",
            Protocol::Shadowsocks => "ss",
            Protocol::Trojan => "trojan",
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Protocol::Vmess => "vmess",
            Protocol::Vless => "vless",
            Protocol::Shadowsocks => "shadowsocks",
            Protocol::Trojan => "trojan",
        }
    }

    /// Protocols that are normally deployed behind TLS.
    pub const fn conventionally_tls(self) -> bool {
        matches!(self, Protocol::Vless | Protocol::Trojan)
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Transport and TLS options shared by the v2ray-family protocols and trojan.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StreamSettings {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub security_mode: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transport: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub host_header: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub server_name_indication: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "protocol", rename_all = "lowercase")]
pub enum ProtocolSettings {
    Vmess {
        identifier: String,
        legacy_alter_id: u32,
        #[serde(skip_serializing_if = "Option::is_none")]
        cipher_method: Option<String>,
        #[serde(flatten)]
        stream: StreamSettings,
    },
    Vless {
        identifier: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        flow_control: Option<String>,
        #[serde(flatten)]
        stream: StreamSettings,
    },
    Shadowsocks {
        cipher_method: String,
        secret: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        plugin: Option<String>,
    },
    Trojan {
        secret: String,
        #[serde(flatten)]
        stream: StreamSettings,
    },
}

impl ProtocolSettings {
    pub const fn protocol(&self) -> Protocol {
        match self {
            ProtocolSettings::Vmess { .. } => Protocol::Vmess,
            ProtocolSettings::Vless { .. } => Protocol::Vless,
            ProtocolSettings::Shadowsocks { .. } => Protocol::Shadowsocks,
            ProtocolSettings::Trojan { .. } => Protocol::Trojan,
        }
    }

    fn stream(&self) -> Option<&StreamSettings> {
        match self {
            ProtocolSettings::Vmess { stream, .. }
            | ProtocolSettings::Vless { stream, .. }
            | ProtocolSettings::Trojan { stream, .. } => Some(stream),
            ProtocolSettings::Shadowsocks { .. } => None,
        }
    }
}

/// A parsed proxy node. Only constructed through [`Descriptor::new`], so the
/// address is never empty and the port is never zero.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Descriptor {
    source: String,
    address: String,
    port: u16,
    label: String,
    #[serde(flatten)]
    settings: ProtocolSettings,
}

impl Descriptor {
    pub fn new(
        address: impl Into<String>,
        port: u16,
        settings: ProtocolSettings,
    ) -> Result<Self, ParseFailure> {
        let address: String = address.into();
        let address = address.trim();
        if address.is_empty() {
            return Err(ParseFailure::missing("address"));
        }
        if port == 0 {
            return Err(ParseFailure::invalid("port", "port 0 is not connectable"));
        }
        Ok(Descriptor {
            source: String::new(),
            address: address.to_string(),
            port,
            label: String::new(),
            settings,
        })
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = source.into();
        self
    }

    pub fn protocol(&self) -> Protocol {
        self.settings.protocol()
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    /// The raw share link this descriptor was parsed from (empty when built by hand).
    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn settings(&self) -> &ProtocolSettings {
        &self.settings
    }

    pub fn identifier(&self) -> Option<&str> {
        match &self.settings {
            ProtocolSettings::Vmess { identifier, .. } | ProtocolSettings::Vless { identifier, .. } => {
                Some(identifier)
            }
            _ => None,
        }
    }

    pub fn secret(&self) -> Option<&str> {
        match &self.settings {
            ProtocolSettings::Shadowsocks { secret, .. } | ProtocolSettings::Trojan { secret, .. } => {
                Some(secret)
            }
            _ => None,
        }
    }

    pub fn cipher_method(&self) -> Option<&str> {
        match &self.settings {
            ProtocolSettings::Shadowsocks { cipher_method, .. } => Some(cipher_method),
            ProtocolSettings::Vmess { cipher_method, .. } => cipher_method.as_deref(),
            _ => None,
        }
    }

    pub fn legacy_alter_id(&self) -> Option<u32> {
        match &self.settings {
            ProtocolSettings::Vmess { legacy_alter_id, .. } => Some(*legacy_alter_id),
            _ => None,
        }
    }

    pub fn flow_control(&self) -> Option<&str> {
        match &self.settings {
            ProtocolSettings::Vless { flow_control, .. } => flow_control.as_deref(),
            _ => None,
        }
    }

    pub fn security_mode(&self) -> Option<&str> {
        self.settings.stream().and_then(|s| s.security_mode.as_deref())
    }

    pub fn transport(&self) -> Option<&str> {
        self.settings.stream().and_then(|s| s.transport.as_deref())
    }

    pub fn host_header(&self) -> Option<&str> {
        self.settings.stream().and_then(|s| s.host_header.as_deref())
    }

    pub fn path(&self) -> Option<&str> {
        self.settings.stream().and_then(|s| s.path.as_deref())
    }

    pub fn server_name_indication(&self) -> Option<&str> {
        self.settings.stream().and_then(|s| s.server_name_indication.as_deref())
    }

    /// True when the descriptor asks for TLS on the outer connection.
    pub fn uses_tls(&self) -> bool {
        self.security_mode().is_some_and(|m| m.eq_ignore_ascii_case("tls"))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ParseFailureKind {
    UnsupportedScheme,
    MalformedEncoding,
    MissingField,
    InvalidField,
}

impl fmt::Display for ParseFailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ParseFailureKind::UnsupportedScheme => "unsupported scheme",
            ParseFailureKind::MalformedEncoding => "malformed encoding",
            ParseFailureKind::MissingField => "missing field",
            ParseFailureKind::InvalidField => "invalid field",
        };
        f.write_str(s)
    }
}

/// Why a raw share link could not be turned into a [`Descriptor`].
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[error("{kind}: {detail}")]
pub struct ParseFailure {
    pub kind: ParseFailureKind,
    pub detail: String,
}

impl ParseFailure {
    pub fn new(kind: ParseFailureKind, detail: impl Into<String>) -> Self {
        ParseFailure { kind, detail: detail.into() }
    }

    pub fn unsupported_scheme(raw: &str) -> Self {
        let scheme = raw.split_once("://").map(|(s, _)| s).unwrap_or("");
        let detail = if scheme.is_empty() {
            "no scheme prefix".to_string()
        } else {
            format!("scheme '{}' is not one of vmess, vless, ss, trojan", scheme)
        };
        Self::new(ParseFailureKind::UnsupportedScheme, detail)
    }

    pub fn malformed(detail: impl Into<String>) -> Self {
        Self::new(ParseFailureKind::MalformedEncoding, detail)
    }

    pub fn missing(field: &str) -> Self {
        Self::new(ParseFailureKind::MissingField, format!("'{}' is required", field))
    }

    pub fn invalid(field: &str, why: impl fmt::Display) -> Self {
        Self::new(ParseFailureKind::InvalidField, format!("'{}': {}", field, why))
    }
}
