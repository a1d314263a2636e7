//! Bounded-time reachability probe: DNS, TCP connect, then an optional TLS handshake.

mod tls;

use nodescore_core::{Descriptor, ProbeFailure, ProbeOutcome};
use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::sync::OnceLock;
use std::time::{Duration, Instant};
use tokio::net::{lookup_host, TcpStream};
use tokio::time::timeout;
use tokio_rustls::TlsConnector;
use tracing::debug;

/// Something that can measure a node. The batch runner is generic over this so
/// tests can substitute canned outcomes for real sockets.
pub trait Prober: Send + Sync + 'static {
    /// One bounded attempt, no retries. Failures are reported in the outcome.
    fn probe(&self, descriptor: &Descriptor, timeout: Duration) -> impl Future<Output = ProbeOutcome> + Send;
}

/// The real prober: resolves, connects over TCP and, where TLS is expected,
/// performs a handshake without certificate verification.
#[derive(Clone)]
pub struct TcpTlsProber {
    connector: TlsConnector,
}

impl TcpTlsProber {
    pub fn new() -> Result<Self, rustls::Error> {
        Ok(TcpTlsProber { connector: tls::connector()? })
    }

    pub async fn probe(&self, descriptor: &Descriptor, limit: Duration) -> ProbeOutcome {
        let host = descriptor.address();
        let port = descriptor.port();

        let addrs = match resolve(host, port, limit).await {
            Ok(a) => a,
            Err(outcome) => return outcome,
        };

        let (stream, addr, latency_ms) = match timeout(limit, connect_any(&addrs)).await {
            Err(_) => {
                return ProbeOutcome::unreachable(
                    ProbeFailure::ConnectTimeout,
                    format!("no answer from {}:{} within {} ms", host, port, limit.as_millis()),
                )
            }
            Ok(Err((addr, e))) => return classify_connect_error(addr, e),
            Ok(Ok(connected)) => connected,
        };
        let outcome = ProbeOutcome::reachable(latency_ms);

        if !wants_tls(descriptor) {
            debug!(%addr, latency_ms, "tcp reachable");
            return outcome;
        }
        let sni = descriptor
            .server_name_indication()
            .or(descriptor.host_header())
            .unwrap_or(host);
        match tls::handshake(&self.connector, stream, sni, limit).await {
            Ok(summary) => {
                debug!(%addr, latency_ms, tls = %summary, "tls negotiated");
                outcome.with_tls(summary)
            }
            Err(e) => {
                debug!(%addr, latency_ms, error = %e, "tls handshake failed");
                outcome.with_tls_failure(format!("{:#}", e))
            }
        }
    }
}

impl Prober for TcpTlsProber {
    fn probe(&self, descriptor: &Descriptor, timeout: Duration) -> impl Future<Output = ProbeOutcome> + Send {
        TcpTlsProber::probe(self, descriptor, timeout)
    }
}

/// Probe with a process-wide default prober.
pub async fn probe(descriptor: &Descriptor, timeout: Duration) -> ProbeOutcome {
    static DEFAULT: OnceLock<Result<TcpTlsProber, String>> = OnceLock::new();
    match DEFAULT.get_or_init(|| TcpTlsProber::new().map_err(|e| e.to_string())) {
        Ok(prober) => prober.probe(descriptor, timeout).await,
        Err(e) => ProbeOutcome::unreachable(ProbeFailure::Internal, format!("tls setup failed: {}", e)),
    }
}

/// TLS is attempted on port 443 and for protocols that normally run over it.
pub fn wants_tls(descriptor: &Descriptor) -> bool {
    descriptor.port() == 443 || descriptor.protocol().conventionally_tls()
}

async fn resolve(host: &str, port: u16, limit: Duration) -> Result<Vec<SocketAddr>, ProbeOutcome> {
    match timeout(limit, lookup_host((host, port))).await {
        Err(_) => Err(ProbeOutcome::unreachable(
            ProbeFailure::DnsResolution,
            format!("lookup of {} timed out after {} ms", host, limit.as_millis()),
        )),
        Ok(Err(e)) => Err(ProbeOutcome::unreachable(ProbeFailure::DnsResolution, format!("{}: {}", host, e))),
        Ok(Ok(addrs)) => {
            let addrs: Vec<SocketAddr> = addrs.collect();
            if addrs.is_empty() {
                Err(ProbeOutcome::unreachable(ProbeFailure::DnsResolution, format!("{} has no addresses", host)))
            } else {
                Ok(addrs)
            }
        }
    }
}

/// Try each resolved address in order. Latency covers the winning attempt.
async fn connect_any(addrs: &[SocketAddr]) -> Result<(TcpStream, SocketAddr, f64), (SocketAddr, io::Error)> {
    let mut last_err = None;
    for &addr in addrs {
        let started = Instant::now();
        match TcpStream::connect(addr).await {
            Ok(s) => return Ok((s, addr, started.elapsed().as_secs_f64() * 1000.0)),
            Err(e) => {
                debug!(%addr, error = %e, "connect attempt failed");
                last_err = Some((addr, e));
            }
        }
    }
    Err(last_err.unwrap_or_else(|| {
        (SocketAddr::from(([0, 0, 0, 0], 0)), io::Error::new(io::ErrorKind::InvalidInput, "no addresses"))
    }))
}

fn classify_connect_error(addr: SocketAddr, e: io::Error) -> ProbeOutcome {
    let failure = match e.kind() {
        io::ErrorKind::ConnectionRefused => ProbeFailure::ConnectRefused,
        io::ErrorKind::TimedOut => ProbeFailure::ConnectTimeout,
        _ => ProbeFailure::Socket,
    };
    ProbeOutcome::unreachable(failure, format!("{}: {}", addr, e))
}
