//! Fan raw share links out over a bounded pool of probe tasks and collect a
//! score-ordered report.

mod report;

pub use report::{BatchEntry, BatchReport, BatchSummary, ReportRow};

use conn_probe::{Prober, TcpTlsProber};
use futures::FutureExt;
use nodescore_core::ratelimiter::RateLimiter;
use nodescore_core::{Descriptor, ParseFailure, ProbeOutcome};
use rand::{thread_rng, Rng};
use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchConfig {
    /// Maximum number of nodes evaluated at once.
    pub concurrency: usize,
    /// Bound on each of DNS, TCP connect and TLS handshake.
    pub timeout: Duration,
    /// Extra probe attempts for an unreachable node.
    pub retries: u32,
    /// Base delay before a retry; doubles per attempt, plus jitter.
    pub retry_delay: Duration,
    /// Global cap on probe launches per second.
    pub qps: Option<u32>,
    /// Log progress every this many completed nodes.
    pub progress_every: usize,
}

impl Default for BatchConfig {
    fn default() -> Self {
        BatchConfig {
            concurrency: 32,
            timeout: Duration::from_secs(5),
            retries: 0,
            retry_delay: Duration::from_millis(200),
            qps: None,
            progress_every: 50,
        }
    }
}

impl BatchConfig {
    pub fn new(timeout: Duration, concurrency: usize) -> Self {
        BatchConfig { timeout, concurrency, ..Default::default() }
    }

    fn check(&self) -> Result<(), BatchError> {
        if self.concurrency == 0 {
            return Err(BatchError::InvalidConfig("concurrency must be at least 1".into()));
        }
        if self.timeout.is_zero() {
            return Err(BatchError::InvalidConfig("timeout must be greater than zero".into()));
        }
        if self.progress_every == 0 {
            return Err(BatchError::InvalidConfig("progress interval must be at least 1".into()));
        }
        Ok(())
    }
}

#[derive(Debug, Error)]
pub enum BatchError {
    #[error("invalid batch configuration: {0}")]
    InvalidConfig(String),
    #[error("tls client setup failed: {0}")]
    TlsSetup(String),
    #[error("batch cancelled after {completed} of {total} nodes")]
    Cancelled { completed: usize, total: usize },
}

/// Score every raw descriptor with the real TCP/TLS prober.
pub async fn run_batch(raws: Vec<String>, config: &BatchConfig) -> Result<BatchReport, BatchError> {
    run_batch_until(raws, config, std::future::pending()).await
}

/// Like [`run_batch`], abandoning the batch once `shutdown` resolves.
pub async fn run_batch_until<F>(raws: Vec<String>, config: &BatchConfig, shutdown: F) -> Result<BatchReport, BatchError>
where
    F: Future<Output = ()>,
{
    let prober = TcpTlsProber::new().map_err(|e| BatchError::TlsSetup(e.to_string()))?;
    run_batch_with(Arc::new(prober), raws, config, shutdown).await
}

/// Score every raw descriptor with `prober`. When `shutdown` resolves first,
/// in-flight probes are aborted and [`BatchError::Cancelled`] is returned.
pub async fn run_batch_with<P, F>(
    prober: Arc<P>,
    raws: Vec<String>,
    config: &BatchConfig,
    shutdown: F,
) -> Result<BatchReport, BatchError>
where
    P: Prober,
    F: Future<Output = ()>,
{
    config.check()?;
    let total = raws.len();
    let completed = Arc::new(AtomicUsize::new(0));
    info!(total, concurrency = config.concurrency, timeout_ms = config.timeout.as_millis() as u64, "batch started");

    tokio::select! {
        entries = drive(prober, raws, *config, completed.clone()) => {
            let report = BatchReport::from_completed(entries);
            let s = report.summary();
            info!(total = s.total, usable = s.usable, rejected = s.rejected, "batch finished");
            Ok(report)
        }
        _ = shutdown => {
            // dropping the drive future drops its JoinSet, which aborts every task
            let completed = completed.load(Ordering::Relaxed);
            warn!(completed, total, "batch cancelled");
            Err(BatchError::Cancelled { completed, total })
        }
    }
}

async fn drive<P: Prober>(
    prober: Arc<P>,
    raws: Vec<String>,
    config: BatchConfig,
    completed: Arc<AtomicUsize>,
) -> Vec<BatchEntry> {
    let total = raws.len();
    let sem = Arc::new(Semaphore::new(config.concurrency));
    let limiter = config.qps.filter(|q| *q > 0).map(RateLimiter::new);
    let (tx, mut rx) = mpsc::channel::<BatchEntry>(total.max(1));

    let spawner = async move {
        let mut tasks = JoinSet::new();
        for raw in raws {
            let Ok(permit) = sem.clone().acquire_owned().await else { break };
            let tx = tx.clone();
            let prober = prober.clone();
            let limiter = limiter.clone();
            tasks.spawn(async move {
                let entry = evaluate(prober.as_ref(), raw, &config, limiter.as_ref()).await;
                drop(permit);
                let _ = tx.send(entry).await;
            });
        }
        tasks
    };

    let collector = async {
        let mut entries = Vec::with_capacity(total);
        while let Some(entry) = rx.recv().await {
            entries.push(entry);
            let done = completed.fetch_add(1, Ordering::Relaxed) + 1;
            if done % config.progress_every == 0 || done == total {
                info!(done, total, "progress");
            }
        }
        entries
    };

    let (mut tasks, entries) = tokio::join!(spawner, collector);
    while let Some(res) = tasks.join_next().await {
        if let Err(e) = res {
            warn!(error = %e, "probe task ended abnormally");
        }
    }
    entries
}

/// Run one node through parse, probe, validate and score. Any panic along the
/// way is caught here and reported as an unusable node.
pub async fn evaluate<P: Prober>(
    prober: &P,
    raw: String,
    config: &BatchConfig,
    limiter: Option<&RateLimiter>,
) -> BatchEntry {
    let parsed = std::panic::catch_unwind(|| descriptor_parse::parse(&raw))
        .unwrap_or_else(|p| Err(ParseFailure::malformed(format!("parser failed: {}", panic_message(&*p)))));
    let descriptor = match parsed {
        Ok(d) => d,
        Err(failure) => return BatchEntry::Rejected { raw, failure },
    };

    let pipeline = AssertUnwindSafe(async {
        let probe = probe_with_retries(prober, &descriptor, config, limiter).await;
        let validation = node_validate::validate(&descriptor);
        node_score::score(&descriptor, &probe, &validation)
    });
    match pipeline.catch_unwind().await {
        Ok(record) => {
            debug!(node = %descriptor.address(), port = descriptor.port(), score = record.score, "scored");
            BatchEntry::Scored(record)
        }
        Err(p) => {
            let message = panic_message(&*p);
            warn!(node = %descriptor.address(), error = %message, "node pipeline panicked");
            BatchEntry::Scored(node_score::score_internal_failure(&descriptor, message))
        }
    }
}

async fn probe_with_retries<P: Prober>(
    prober: &P,
    descriptor: &Descriptor,
    config: &BatchConfig,
    limiter: Option<&RateLimiter>,
) -> ProbeOutcome {
    let mut attempts = 0u32;
    loop {
        if let Some(l) = limiter {
            l.acquire().await;
        }
        let outcome = prober.probe(descriptor, config.timeout).await;
        if outcome.reachable || attempts >= config.retries {
            return outcome;
        }
        attempts += 1;
        let base = config.retry_delay.as_millis() as u64;
        let exp = base.saturating_mul(1u64 << attempts.min(6)); // cap growth
        let jitter = thread_rng().gen_range(0..(exp / 4 + 1));
        debug!(node = %descriptor.address(), attempts, delay_ms = exp + jitter, "retrying probe");
        tokio::time::sleep(Duration::from_millis(exp + jitter)).await;
    }
}

fn panic_message(p: &(dyn Any + Send)) -> String {
    if let Some(s) = p.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = p.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
