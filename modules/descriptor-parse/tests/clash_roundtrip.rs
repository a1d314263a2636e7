//! Clash proxy entries encoded back to share links must re-parse to the same node.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use descriptor_parse::{parse, Protocol};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
struct ClashProxy {
    name: String,
    #[serde(rename = "type")]
    kind: String,
    server: String,
    port: u16,
    uuid: Option<String>,
    password: Option<String>,
    cipher: Option<String>,
    #[serde(rename = "alterId", default)]
    alter_id: u32,
    #[serde(default)]
    tls: bool,
    sni: Option<String>,
    servername: Option<String>,
    network: Option<String>,
}

const PROXIES: &str = r#"
- name: "vmess hk"
  type: vmess
  server: hk.example.com
  port: 443
  uuid: b831381d-6324-4d53-ad4f-8cda48b30811
  alterId: 0
  cipher: auto
  tls: true
  network: ws
- name: "vless sg"
  type: vless
  server: 203.0.113.10
  port: 8443
  uuid: 2d5e9c2a-2b8f-4c1e-9a57-3f0b7d2c1e44
  tls: true
  servername: sg.example.com
  network: tcp
- name: "trojan jp"
  type: trojan
  server: jp.example.com
  port: 443
  password: "p@ss word"
  sni: jp.example.com
- name: "ss us"
  type: ss
  server: 198.51.100.20
  port: 8388
  cipher: chacha20-poly1305
  password: s3cret
"#;

fn enc(s: &str) -> String {
    percent_encoding::utf8_percent_encode(s, percent_encoding::NON_ALPHANUMERIC).to_string()
}

/// Mirrors the share-link encoder used by the config generator.
fn to_link(p: &ClashProxy) -> String {
    match p.kind.as_str() {
        "vmess" => {
            let json = serde_json::json!({
                "v": "2",
                "ps": p.name,
                "add": p.server,
                "port": p.port.to_string(),
                "id": p.uuid,
                "aid": p.alter_id.to_string(),
                "scy": p.cipher,
                "net": p.network,
                "tls": if p.tls { "tls" } else { "" },
            });
            format!("vmess://{}", STANDARD.encode(json.to_string()))
        }
        "vless" => format!(
            "vless://{}@{}:{}?security={}&type={}&sni={}#{}",
            p.uuid.as_deref().unwrap_or_default(),
            p.server,
            p.port,
            if p.tls { "tls" } else { "none" },
            p.network.as_deref().unwrap_or("tcp"),
            p.servername.as_deref().unwrap_or_default(),
            enc(&p.name),
        ),
        "trojan" => format!(
            "trojan://{}@{}:{}?sni={}#{}",
            enc(p.password.as_deref().unwrap_or_default()),
            p.server,
            p.port,
            p.sni.as_deref().unwrap_or_default(),
            enc(&p.name),
        ),
        "ss" => {
            let userinfo = format!(
                "{}:{}",
                p.cipher.as_deref().unwrap_or_default(),
                p.password.as_deref().unwrap_or_default()
            );
            format!("ss://{}@{}:{}#{}", STANDARD.encode(userinfo), p.server, p.port, enc(&p.name))
        }
        other => panic!("no encoder for {}", other),
    }
}

#[test]
fn clash_entries_survive_a_round_trip() {
    let proxies: Vec<ClashProxy> = serde_yaml::from_str(PROXIES).unwrap();
    assert_eq!(proxies.len(), 4);
    for p in &proxies {
        let link = to_link(p);
        let d = parse(&link).unwrap_or_else(|e| panic!("{} failed to parse: {}", link, e));
        let expected = match p.kind.as_str() {
            "vmess" => Protocol::Vmess,
            "vless" => Protocol::Vless,
            "trojan" => Protocol::Trojan,
            _ => Protocol::Shadowsocks,
        };
        assert_eq!(d.protocol(), expected, "{}", link);
        assert_eq!(d.address(), p.server);
        assert_eq!(d.port(), p.port);
        assert_eq!(d.label(), p.name);
        match expected {
            Protocol::Vmess | Protocol::Vless => assert_eq!(d.identifier(), p.uuid.as_deref()),
            _ => assert_eq!(d.secret(), p.password.as_deref()),
        }
        if expected == Protocol::Shadowsocks {
            assert_eq!(d.cipher_method(), p.cipher.as_deref());
        }
        if expected == Protocol::Vmess {
            assert_eq!(d.legacy_alter_id(), Some(p.alter_id));
        }
    }
}
