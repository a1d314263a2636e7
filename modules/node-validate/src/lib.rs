//! Offline consistency checks on a parsed descriptor. Never touches the network.

use nodescore_core::{Descriptor, ProtocolSettings, ValidationOutcome};
use std::net::IpAddr;
use uuid::Uuid;

/// Modern AEAD ciphers accepted for shadowsocks.
pub const AEAD_CIPHERS: &[&str] = &["aes-256-gcm", "aes-128-gcm", "chacha20-poly1305"];
/// Legacy stream ciphers still accepted for shadowsocks.
pub const STREAM_CIPHERS: &[&str] = &["aes-256-cfb", "aes-128-cfb"];

pub fn validate(descriptor: &Descriptor) -> ValidationOutcome {
    let mut notes: Vec<String> = Vec::new();
    let result = match descriptor.settings() {
        ProtocolSettings::Vmess { identifier, legacy_alter_id, .. } => {
            check_identifier(identifier, &mut notes).map(|_| {
                if *legacy_alter_id == 0 {
                    notes.push("aead mode (alterId 0)".into());
                } else {
                    notes.push(format!("legacy alterId {}", legacy_alter_id));
                }
            })
        }
        ProtocolSettings::Vless { identifier, .. } => check_identifier(identifier, &mut notes).map(|_| {
            if descriptor.uses_tls() {
                match descriptor.server_name_indication() {
                    Some(_) => notes.push("tls with sni".into()),
                    None => notes.push("tls without sni".into()),
                }
            }
        }),
        ProtocolSettings::Trojan { secret, .. } => {
            if secret.trim().is_empty() { Err("trojan password is empty".to_string()) } else { Ok(()) }
        }
        ProtocolSettings::Shadowsocks { cipher_method, secret, .. } => {
            check_shadowsocks(cipher_method, secret, &mut notes)
        }
    };

    if descriptor.uses_tls() {
        if let Some(sni) = descriptor.server_name_indication() {
            if sni.parse::<IpAddr>().is_ok() {
                notes.push("sni is an ip literal".into());
            }
        }
    }

    match result {
        Ok(()) => ValidationOutcome::valid(join(descriptor, "ok", &notes)),
        Err(why) => ValidationOutcome::invalid(join(descriptor, &why, &notes)),
    }
}

fn check_identifier(identifier: &str, notes: &mut Vec<String>) -> Result<(), String> {
    let id = identifier.trim();
    if id.is_empty() {
        return Err("user id is empty".into());
    }
    if Uuid::parse_str(id).is_err() {
        notes.push("user id is not a uuid".into());
    }
    Ok(())
}

fn check_shadowsocks(cipher: &str, secret: &str, notes: &mut Vec<String>) -> Result<(), String> {
    if secret.trim().is_empty() {
        return Err("password is empty".into());
    }
    let cipher = cipher.trim().to_ascii_lowercase();
    if AEAD_CIPHERS.contains(&cipher.as_str()) {
        Ok(())
    } else if STREAM_CIPHERS.contains(&cipher.as_str()) {
        notes.push(format!("legacy stream cipher {}", cipher));
        Ok(())
    } else {
        Err(format!("unsupported cipher '{}'", cipher))
    }
}

fn join(descriptor: &Descriptor, head: &str, notes: &[String]) -> String {
    let mut s = format!("{}: {}", descriptor.protocol(), head);
    for n in notes {
        s.push_str("; ");
        s.push_str(n);
    }
    s
}
