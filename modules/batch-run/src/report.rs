use nodescore_core::{ParseFailure, Protocol, ScoreRecord};
use serde::Serialize;

/// Exactly one entry is produced per input line.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum BatchEntry {
    Scored(ScoreRecord),
    Rejected { raw: String, failure: ParseFailure },
}

impl BatchEntry {
    pub fn score(&self) -> Option<u8> {
        match self {
            BatchEntry::Scored(r) => Some(r.score),
            BatchEntry::Rejected { .. } => None,
        }
    }

    pub fn usable(&self) -> bool {
        matches!(self, BatchEntry::Scored(r) if r.usable)
    }

    /// Flatten into the row consumed by list writers and config generators.
    pub fn row(&self) -> ReportRow {
        match self {
            BatchEntry::Scored(r) => ReportRow {
                url: r.descriptor.source().to_string(),
                protocol: Some(r.descriptor.protocol()),
                address: Some(r.descriptor.address().to_string()),
                port: Some(r.descriptor.port()),
                label: r.descriptor.label().to_string(),
                score: r.score,
                usable: r.usable,
                recommendation: r.recommendation.to_string(),
                latency_ms: r.probe.reachable.then_some(r.probe.latency_ms),
                tls: r.probe.tls_negotiated,
                error: r.error.clone(),
            },
            BatchEntry::Rejected { raw, failure } => ReportRow {
                url: raw.clone(),
                protocol: None,
                address: None,
                port: None,
                label: String::new(),
                score: 0,
                usable: false,
                recommendation: nodescore_core::Recommendation::NotRecommended.to_string(),
                latency_ms: None,
                tls: false,
                error: Some(failure.to_string()),
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReportRow {
    pub url: String,
    pub protocol: Option<Protocol>,
    pub address: Option<String>,
    pub port: Option<u16>,
    pub label: String,
    pub score: u8,
    pub usable: bool,
    pub recommendation: String,
    pub latency_ms: Option<f64>,
    pub tls: bool,
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BatchSummary {
    pub total: usize,
    pub scored: usize,
    pub rejected: usize,
    pub usable: usize,
    pub average_score: f64,
}

/// Entries sorted by descending score; rejected inputs come last.
#[derive(Debug, Clone, Default, Serialize)]
pub struct BatchReport {
    pub entries: Vec<BatchEntry>,
}

impl BatchReport {
    /// Stable sort, so equal scores keep their completion order.
    pub(crate) fn from_completed(mut entries: Vec<BatchEntry>) -> Self {
        entries.sort_by(|a, b| b.score().cmp(&a.score()));
        BatchReport { entries }
    }

    pub fn scored(&self) -> impl Iterator<Item = &ScoreRecord> {
        self.entries.iter().filter_map(|e| match e {
            BatchEntry::Scored(r) => Some(r),
            BatchEntry::Rejected { .. } => None,
        })
    }

    pub fn rejected(&self) -> impl Iterator<Item = (&str, &ParseFailure)> {
        self.entries.iter().filter_map(|e| match e {
            BatchEntry::Rejected { raw, failure } => Some((raw.as_str(), failure)),
            BatchEntry::Scored(_) => None,
        })
    }

    pub fn rows(&self) -> Vec<ReportRow> {
        self.entries.iter().map(BatchEntry::row).collect()
    }

    pub fn summary(&self) -> BatchSummary {
        let scores: Vec<u32> = self.scored().map(|r| u32::from(r.score)).collect();
        let average_score = if scores.is_empty() {
            0.0
        } else {
            f64::from(scores.iter().sum::<u32>()) / scores.len() as f64
        };
        BatchSummary {
            total: self.entries.len(),
            scored: scores.len(),
            rejected: self.entries.len() - scores.len(),
            usable: self.entries.iter().filter(|e| e.usable()).count(),
            average_score,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nodescore_core::{
        Descriptor, ParseFailureKind, ProbeOutcome, ProtocolSettings, StreamSettings, ValidationOutcome,
    };

    fn scored(label: &str, latency: Option<f64>) -> BatchEntry {
        let d = Descriptor::new("example.com", 443, ProtocolSettings::Trojan {
            secret: "pw".into(),
            stream: StreamSettings::default(),
        })
        .unwrap()
        .with_label(label)
        .with_source(format!("trojan://pw@example.com:443#{}", label));
        let probe = match latency {
            Some(l) => ProbeOutcome::reachable(l),
            None => ProbeOutcome::unreachable(nodescore_core::ProbeFailure::ConnectRefused, "rst"),
        };
        BatchEntry::Scored(node_score::score(&d, &probe, &ValidationOutcome::valid("ok")))
    }

    fn rejected(raw: &str) -> BatchEntry {
        BatchEntry::Rejected {
            raw: raw.into(),
            failure: ParseFailure::new(ParseFailureKind::UnsupportedScheme, "nope"),
        }
    }

    #[test]
    fn sorts_descending_with_rejections_last_and_stable_ties() {
        let report = BatchReport::from_completed(vec![
            rejected("http://a"),
            scored("slow", Some(800.0)),
            scored("dead", None),
            scored("fast-1", Some(10.0)),
            scored("fast-2", Some(20.0)),
        ]);
        let labels: Vec<String> = report.rows().into_iter().map(|r| r.label).collect();
        assert_eq!(labels, ["fast-1", "fast-2", "slow", "dead", ""]);
        assert_eq!(report.rejected().count(), 1);
    }

    #[test]
    fn rows_carry_the_output_contract() {
        let row = scored("n1", Some(10.0)).row();
        assert_eq!(row.url, "trojan://pw@example.com:443#n1");
        assert_eq!(row.protocol, Some(Protocol::Trojan));
        assert_eq!(row.port, Some(443));
        assert_eq!(row.latency_ms, Some(10.0));
        assert!(row.usable);

        let row = rejected("bogus://x").row();
        assert_eq!(row.url, "bogus://x");
        assert!(!row.usable);
        assert_eq!(row.recommendation, "not recommended");
        assert_eq!(row.error.as_deref(), Some("unsupported scheme: nope"));
    }

    #[test]
    fn summary_counts() {
        let report = BatchReport::from_completed(vec![
            scored("a", Some(10.0)),
            scored("b", None),
            rejected("x"),
        ]);
        let s = report.summary();
        assert_eq!(s.total, 3);
        assert_eq!(s.scored, 2);
        assert_eq!(s.rejected, 1);
        assert_eq!(s.usable, 1);
        // trojan on 443, valid, 10ms, no tls: 30+25+15+10+5 = 85
        assert!((s.average_score - 42.5).abs() < f64::EPSILON);
    }
}
