//! Results produced by the probe, validator and scorer.

use crate::descriptor::Descriptor;
use serde::Serialize;
use std::fmt;

/// Classified cause of a failed probe stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ProbeFailure {
    DnsResolution,
    ConnectTimeout,
    ConnectRefused,
    Socket,
    TlsHandshake,
    /// The node's pipeline failed inside the prober itself.
    Internal,
}

impl fmt::Display for ProbeFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ProbeFailure::DnsResolution => "dns resolution failed",
            ProbeFailure::ConnectTimeout => "connect timed out",
            ProbeFailure::ConnectRefused => "connection refused",
            ProbeFailure::Socket => "socket error",
            ProbeFailure::TlsHandshake => "tls handshake failed",
            ProbeFailure::Internal => "internal error",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProbeOutcome {
    pub reachable: bool,
    pub latency_ms: f64,
    pub tls_attempted: bool,
    pub tls_negotiated: bool,
    pub tls_summary: String,
    pub failure: Option<ProbeFailure>,
    /// Underlying error text for `failure`, empty on success.
    pub detail: String,
}

impl ProbeOutcome {
    pub fn reachable(latency_ms: f64) -> Self {
        ProbeOutcome {
            reachable: true,
            latency_ms,
            tls_attempted: false,
            tls_negotiated: false,
            tls_summary: String::new(),
            failure: None,
            detail: String::new(),
        }
    }

    pub fn unreachable(failure: ProbeFailure, detail: impl Into<String>) -> Self {
        ProbeOutcome {
            reachable: false,
            latency_ms: 0.0,
            tls_attempted: false,
            tls_negotiated: false,
            tls_summary: String::new(),
            failure: Some(failure),
            detail: detail.into(),
        }
    }

    pub fn with_tls(mut self, summary: impl Into<String>) -> Self {
        self.tls_attempted = true;
        self.tls_negotiated = true;
        self.tls_summary = summary.into();
        self
    }

    /// TLS was attempted on a reachable target and failed; reachability is kept.
    pub fn with_tls_failure(mut self, detail: impl Into<String>) -> Self {
        self.tls_attempted = true;
        self.tls_negotiated = false;
        self.failure = Some(ProbeFailure::TlsHandshake);
        self.detail = detail.into();
        self
    }

    /// Human-readable failure message, if any stage failed.
    pub fn failure_message(&self) -> Option<String> {
        self.failure.map(|f| {
            if self.detail.is_empty() {
                f.to_string()
            } else {
                format!("{}: {}", f, self.detail)
            }
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidationOutcome {
    pub valid: bool,
    pub detail: String,
}

impl ValidationOutcome {
    pub fn valid(detail: impl Into<String>) -> Self {
        ValidationOutcome { valid: true, detail: detail.into() }
    }

    pub fn invalid(detail: impl Into<String>) -> Self {
        ValidationOutcome { valid: false, detail: detail.into() }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum Recommendation {
    #[serde(rename = "not recommended")]
    NotRecommended,
    #[serde(rename = "marginal")]
    Marginal,
    #[serde(rename = "good")]
    Good,
    #[serde(rename = "excellent")]
    Excellent,
}

impl Recommendation {
    /// Tiers are inclusive on their lower bound.
    pub const fn from_score(score: u8) -> Self {
        match score {
            80.. => Recommendation::Excellent,
            60..=79 => Recommendation::Good,
            40..=59 => Recommendation::Marginal,
            _ => Recommendation::NotRecommended,
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Recommendation::Excellent => "excellent",
            Recommendation::Good => "good",
            Recommendation::Marginal => "marginal",
            Recommendation::NotRecommended => "not recommended",
        }
    }
}

impl fmt::Display for Recommendation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Points awarded per signal before clamping.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ScoreBreakdown {
    pub connectivity: u8,
    pub latency: u8,
    pub tls: u8,
    pub validity: u8,
    pub port: u8,
    pub protocol_bonus: u8,
}

impl ScoreBreakdown {
    pub fn total(&self) -> u32 {
        [self.connectivity, self.latency, self.tls, self.validity, self.port, self.protocol_bonus]
            .iter()
            .map(|&p| u32::from(p))
            .sum()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoreRecord {
    pub descriptor: Descriptor,
    pub probe: ProbeOutcome,
    pub validation: ValidationOutcome,
    pub score: u8,
    pub usable: bool,
    pub recommendation: Recommendation,
    pub breakdown: ScoreBreakdown,
    pub error: Option<String>,
}
