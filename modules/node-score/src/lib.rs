//! Combine probe, validation and static descriptor properties into a 0-100 score.

use nodescore_core::{
    Descriptor, ProbeFailure, ProbeOutcome, Protocol, Recommendation, ScoreBreakdown, ScoreRecord,
    ValidationOutcome,
};

pub const CONNECTIVITY_POINTS: u8 = 30;
pub const TLS_POINTS: u8 = 20;
pub const VALIDITY_POINTS: u8 = 15;
pub const PORT_POINTS: u8 = 10;
pub const PROTOCOL_BONUS_POINTS: u8 = 5;
pub const USABLE_THRESHOLD: u8 = 40;

/// Ports that blend in with ordinary web and CDN traffic.
pub const COMMON_PORTS: &[u16] = &[80, 443, 8080, 8443, 2053, 2083, 2087, 2096, 8388, 8389];

/// Latency points; tiers are upper-exclusive.
pub fn latency_points(latency_ms: f64) -> u8 {
    match latency_ms {
        l if l < 100.0 => 25,
        l if l < 200.0 => 20,
        l if l < 500.0 => 15,
        l if l < 1000.0 => 10,
        _ => 5,
    }
}

pub fn protocol_bonus(descriptor: &Descriptor) -> u8 {
    let applies = match descriptor.protocol() {
        Protocol::Vmess => descriptor.legacy_alter_id() == Some(0),
        Protocol::Vless => descriptor.uses_tls(),
        Protocol::Trojan => true,
        Protocol::Shadowsocks => false,
    };
    if applies { PROTOCOL_BONUS_POINTS } else { 0 }
}

pub fn score(descriptor: &Descriptor, probe: &ProbeOutcome, validation: &ValidationOutcome) -> ScoreRecord {
    // unreachable nodes earn nothing, whatever else is true about them
    let breakdown = if probe.reachable {
        ScoreBreakdown {
            connectivity: CONNECTIVITY_POINTS,
            latency: latency_points(probe.latency_ms),
            tls: if probe.tls_negotiated { TLS_POINTS } else { 0 },
            validity: if validation.valid { VALIDITY_POINTS } else { 0 },
            port: if COMMON_PORTS.contains(&descriptor.port()) { PORT_POINTS } else { 0 },
            protocol_bonus: protocol_bonus(descriptor),
        }
    } else {
        ScoreBreakdown::default()
    };
    let total = breakdown.total().min(100) as u8;
    let error = if probe.reachable { None } else { probe.failure_message() };
    ScoreRecord {
        descriptor: descriptor.clone(),
        probe: probe.clone(),
        validation: validation.clone(),
        score: total,
        usable: total >= USABLE_THRESHOLD,
        recommendation: Recommendation::from_score(total),
        breakdown,
        error,
    }
}

/// Record for a node whose pipeline failed internally; never usable.
pub fn score_internal_failure(descriptor: &Descriptor, message: impl Into<String>) -> ScoreRecord {
    let message = message.into();
    let probe = ProbeOutcome::unreachable(ProbeFailure::Internal, message.clone());
    let validation = ValidationOutcome::invalid("not evaluated");
    let mut record = score(descriptor, &probe, &validation);
    record.error = Some(format!("internal error: {}", message));
    record
}

#[cfg(test)]
mod tests {
    use super::*;
    use nodescore_core::{ProtocolSettings, StreamSettings};
    use proptest::prelude::*;

    fn ss(port: u16) -> Descriptor {
        Descriptor::new("example.com", port, ProtocolSettings::Shadowsocks {
            cipher_method: "aes-256-gcm".into(),
            secret: "pw".into(),
            plugin: None,
        })
        .unwrap()
    }

    fn trojan(port: u16) -> Descriptor {
        Descriptor::new("example.com", port, ProtocolSettings::Trojan {
            secret: "pw".into(),
            stream: StreamSettings { security_mode: Some("tls".into()), ..Default::default() },
        })
        .unwrap()
    }

    fn vmess(aid: u32) -> Descriptor {
        Descriptor::new("example.com", 12345, ProtocolSettings::Vmess {
            identifier: "id".into(),
            legacy_alter_id: aid,
            cipher_method: None,
            stream: StreamSettings::default(),
        })
        .unwrap()
    }

    fn vless(security: Option<&str>) -> Descriptor {
        Descriptor::new("example.com", 12345, ProtocolSettings::Vless {
            identifier: "id".into(),
            flow_control: None,
            stream: StreamSettings { security_mode: security.map(String::from), ..Default::default() },
        })
        .unwrap()
    }

    fn ok() -> ValidationOutcome {
        ValidationOutcome::valid("ok")
    }

    #[test]
    fn fully_healthy_shadowsocks_scores_100() {
        let probe = ProbeOutcome::reachable(50.0).with_tls("TLSv1_3");
        let r = score(&ss(443), &probe, &ok());
        assert_eq!(r.score, 100);
        assert!(r.usable);
        assert_eq!(r.recommendation, Recommendation::Excellent);
        assert_eq!(r.breakdown.total(), 100);
        assert_eq!(r.error, None);
    }

    #[test]
    fn every_bonus_at_once_is_clamped() {
        let probe = ProbeOutcome::reachable(1.0).with_tls("TLSv1_3");
        let r = score(&trojan(443), &probe, &ok());
        assert_eq!(r.breakdown.total(), 105);
        assert_eq!(r.score, 100);
    }

    #[test]
    fn unreachable_scores_zero() {
        let probe = ProbeOutcome::unreachable(ProbeFailure::ConnectTimeout, "no answer");
        let r = score(&trojan(443), &probe, &ok());
        assert_eq!(r.score, 0);
        assert!(!r.usable);
        assert_eq!(r.recommendation.as_str(), "not recommended");
        assert_eq!(r.breakdown, ScoreBreakdown::default());
        assert_eq!(r.error.as_deref(), Some("connect timed out: no answer"));
    }

    #[test]
    fn latency_tiers() {
        assert_eq!(latency_points(0.0), 25);
        assert_eq!(latency_points(99.9), 25);
        assert_eq!(latency_points(100.0), 20);
        assert_eq!(latency_points(199.0), 20);
        assert_eq!(latency_points(200.0), 15);
        assert_eq!(latency_points(500.0), 10);
        assert_eq!(latency_points(999.0), 10);
        assert_eq!(latency_points(1000.0), 5);
        assert_eq!(latency_points(60_000.0), 5);
    }

    #[test]
    fn protocol_bonus_rules() {
        assert_eq!(protocol_bonus(&vmess(0)), 5);
        assert_eq!(protocol_bonus(&vmess(2)), 0);
        assert_eq!(protocol_bonus(&vless(Some("tls"))), 5);
        assert_eq!(protocol_bonus(&vless(Some("reality"))), 0);
        assert_eq!(protocol_bonus(&vless(None)), 0);
        assert_eq!(protocol_bonus(&trojan(12345)), 5);
        assert_eq!(protocol_bonus(&ss(443)), 0);
    }

    #[test]
    fn marginal_node_is_still_usable() {
        // 30 connectivity + 10 latency, nothing else
        let probe = ProbeOutcome::reachable(700.0);
        let r = score(&ss(12345), &probe, &ValidationOutcome::invalid("bad cipher"));
        assert_eq!(r.score, 40);
        assert!(r.usable);
        assert_eq!(r.recommendation, Recommendation::Marginal);
    }

    #[test]
    fn internal_failure_is_never_usable() {
        let r = score_internal_failure(&trojan(443), "probe task panicked");
        assert_eq!(r.score, 0);
        assert!(!r.usable);
        assert_eq!(r.error.as_deref(), Some("internal error: probe task panicked"));
    }

    fn any_descriptor() -> impl Strategy<Value = Descriptor> {
        (1u16.., 0u32..4, 0usize..5).prop_map(|(port, aid, which)| match which {
            0 => ss(port),
            1 => trojan(port),
            2 => vmess(aid),
            3 => vless(Some("tls")),
            _ => vless(None),
        })
    }

    proptest! {
        #[test]
        fn score_is_bounded_and_idempotent(
            d in any_descriptor(),
            reachable in any::<bool>(),
            latency in 0.0f64..5000.0,
            tls in any::<bool>(),
            valid in any::<bool>(),
        ) {
            let mut probe = if reachable {
                ProbeOutcome::reachable(latency)
            } else {
                ProbeOutcome::unreachable(ProbeFailure::ConnectRefused, "refused")
            };
            if reachable && tls {
                probe = probe.with_tls("TLSv1_3");
            }
            let validation = if valid { ValidationOutcome::valid("ok") } else { ValidationOutcome::invalid("no") };
            let a = score(&d, &probe, &validation);
            let b = score(&d, &probe, &validation);
            prop_assert_eq!(&a, &b);
            prop_assert!(a.score <= 100);
            prop_assert_eq!(a.usable, a.score >= USABLE_THRESHOLD);
            if !reachable {
                prop_assert!(!a.usable);
                prop_assert_eq!(a.score, 0);
            }
        }

        #[test]
        fn lower_latency_never_scores_less(a in 0.0f64..5000.0, b in 0.0f64..5000.0) {
            let (fast, slow) = if a <= b { (a, b) } else { (b, a) };
            prop_assert!(latency_points(fast) >= latency_points(slow));
            let d = ss(443);
            let fast_rec = score(&d, &ProbeOutcome::reachable(fast), &ok());
            let slow_rec = score(&d, &ProbeOutcome::reachable(slow), &ok());
            prop_assert!(fast_rec.score >= slow_rec.score);
        }
    }
}
