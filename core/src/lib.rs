//! Core data model shared by the parser, probe, validator, scorer and batch runner.

pub mod descriptor;
pub mod outcome;
pub mod ratelimiter;

pub use descriptor::{
    Descriptor, ParseFailure, ParseFailureKind, Protocol, ProtocolSettings, StreamSettings,
};
pub use outcome::{
    ProbeFailure, ProbeOutcome, Recommendation, ScoreBreakdown, ScoreRecord, ValidationOutcome,
};

pub const fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
