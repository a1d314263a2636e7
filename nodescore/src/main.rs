use anyhow::{anyhow, Result};
use batch_run::{BatchConfig, BatchEntry, BatchReport, ReportRow};
use clap::{ArgAction, Args, Parser, Subcommand, ValueEnum};
use std::fmt::Write as _;
use std::fs::OpenOptions;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;
use tracing::info;

mod config;
mod input;
mod logging;

fn now_rfc3339() -> String {
    OffsetDateTime::now_utc().format(&Rfc3339).unwrap_or_else(|_| String::new())
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum OutputFormat { Text, Json, Jsonl }

impl OutputFormat {
    fn from_config(s: &str) -> Self {
        match s {
            "json" => OutputFormat::Json,
            "jsonl" => OutputFormat::Jsonl,
            _ => OutputFormat::Text,
        }
    }
}

#[derive(Debug, Parser)]
#[command(name = "nodescore", version, about = "Parse, probe and score proxy share links")]
struct Cli {
    /// Optional config file (YAML). If omitted, loads ./nodescore.yaml if present.
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Increase log verbosity (-v info, -vv debug). RUST_LOG overrides.
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Print version information
    Version,
    /// Probe and score every link in a subscription (file or stdin)
    Score(ScoreArgs),
    /// Parse and validate links without touching the network
    Check {
        /// File with one link per line, or a base64 subscription. Stdin if omitted or "-".
        input: Option<PathBuf>,
        /// Output format
        #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,
    },
}

#[derive(Debug, Args)]
struct ScoreArgs {
    /// File with one link per line, or a base64 subscription. Stdin if omitted or "-".
    input: Option<PathBuf>,
    /// Bound on each probe stage (DNS, connect, TLS) in milliseconds [default: 5000]
    #[arg(long)]
    timeout_ms: Option<u64>,
    /// Max nodes probed at once [default: 32]
    #[arg(long)]
    concurrency: Option<usize>,
    /// QPS cap for probe launches; 0 disables pacing
    #[arg(long)]
    qps: Option<u32>,
    /// Extra probe attempts for unreachable nodes
    #[arg(long)]
    retries: Option<u32>,
    /// Base delay between retries in milliseconds
    #[arg(long)]
    retry_delay_ms: Option<u64>,
    /// Output format: text, json, or jsonl
    #[arg(long, value_enum)]
    format: Option<OutputFormat>,
    /// Output file (overwrites)
    #[arg(long, value_name = "FILE")]
    out: Option<PathBuf>,
    /// Write CSV instead of text/json (requires --out)
    #[arg(long, default_value_t = false)]
    csv: bool,
    /// Only report nodes that scored as usable
    #[arg(long, default_value_t = false)]
    usable_only: bool,
}

impl ScoreArgs {
    /// Explicit flags win, then the config file, then built-in defaults.
    fn resolve(&self, cfg: Option<&config::ScoreConfig>) -> (BatchConfig, OutputFormat) {
        let cfg = cfg.cloned().unwrap_or_default();
        let mut batch = BatchConfig::default();
        if let Some(ms) = self.timeout_ms.or(cfg.timeout_ms) {
            batch.timeout = Duration::from_millis(ms);
        }
        if let Some(c) = self.concurrency.or(cfg.concurrency) {
            batch.concurrency = c;
        }
        batch.qps = self.qps.or(cfg.qps).filter(|q| *q > 0);
        if let Some(r) = self.retries.or(cfg.retries) {
            batch.retries = r;
        }
        if let Some(ms) = self.retry_delay_ms.or(cfg.retry_delay_ms) {
            batch.retry_delay = Duration::from_millis(ms);
        }
        if let Some(p) = cfg.progress_every {
            batch.progress_every = p;
        }
        let format = self
            .format
            .or_else(|| cfg.format.as_deref().map(OutputFormat::from_config))
            .unwrap_or(OutputFormat::Text);
        (batch, format)
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init(logging::level_from_verbosity(cli.verbose))?;
    let loaded_cfg = config::load_config(cli.config.as_deref());
    match cli.command {
        Commands::Version => {
            println!("nodescore {} (core {})", env!("CARGO_PKG_VERSION"), nodescore_core::version());
        }
        Commands::Check { input, format } => {
            let raws = input::raw_lines(&input::read_source(input.as_deref())?);
            let lines = check_lines(&raws, format)?;
            for line in lines {
                println!("{}", line);
            }
        }
        Commands::Score(args) => {
            let score_cfg = loaded_cfg.as_ref().and_then(|c| c.score.as_ref());
            let (batch, format) = args.resolve(score_cfg);
            if args.csv && args.out.is_none() {
                return Err(anyhow!("--csv requires --out <file>"));
            }
            let raws = input::raw_lines(&input::read_source(args.input.as_deref())?);
            if raws.is_empty() {
                return Err(anyhow!("no links found in input"));
            }
            info!(nodes = raws.len(), "loaded input");

            let rt = tokio::runtime::Runtime::new()?;
            let start = Instant::now();
            let started_at = now_rfc3339();
            let report = rt.block_on(async move {
                let shutdown = async {
                    // if the handler cannot be installed, never cancel
                    if tokio::signal::ctrl_c().await.is_err() {
                        std::future::pending::<()>().await;
                    }
                };
                batch_run::run_batch_until(raws, &batch, shutdown).await
            })?;
            let duration_ms = start.elapsed().as_millis();
            let ended_at = now_rfc3339();

            let rows: Vec<ReportRow> = report
                .entries
                .iter()
                .filter(|e| !args.usable_only || e.usable())
                .map(BatchEntry::row)
                .collect();

            if args.csv {
                if let Some(path) = &args.out {
                    write_csv(path, &rows)?;
                    return Ok(());
                }
            }
            let lines = match format {
                OutputFormat::Text => {
                    let mut lines: Vec<String> = rows.iter().map(text_line).collect();
                    lines.push(summary_line(&report, duration_ms));
                    lines
                }
                OutputFormat::Json => {
                    let obj = serde_json::json!({
                        "started_at": started_at,
                        "ended_at": ended_at,
                        "duration_ms": duration_ms,
                        "timeout_ms": batch.timeout.as_millis() as u64,
                        "concurrency": batch.concurrency,
                        "summary": report.summary(),
                        "results": rows,
                    });
                    vec![serde_json::to_string(&obj)?]
                }
                OutputFormat::Jsonl => rows
                    .iter()
                    .map(serde_json::to_string)
                    .collect::<Result<Vec<_>, _>>()?,
            };
            if let Some(path) = args.out {
                let file = OpenOptions::new().create(true).truncate(true).write(true).open(&path)?;
                let mut w = BufWriter::new(file);
                for line in lines {
                    writeln!(w, "{}", line)?;
                }
                w.flush()?;
            } else {
                for line in lines {
                    println!("{}", line);
                }
            }
        }
    }
    Ok(())
}

fn write_csv(path: &Path, rows: &[ReportRow]) -> Result<()> {
    let mut wtr = csv::Writer::from_writer(std::fs::File::create(path)?);
    wtr.write_record(["url","protocol","address","port","label","score","usable","recommendation","latency_ms","tls","error"])?;
    for r in rows {
        wtr.write_record([
            r.url.clone(),
            r.protocol.map(|p| p.to_string()).unwrap_or_default(),
            r.address.clone().unwrap_or_default(),
            r.port.map(|v| v.to_string()).unwrap_or_default(),
            r.label.clone(),
            r.score.to_string(),
            r.usable.to_string(),
            r.recommendation.clone(),
            r.latency_ms.map(|v| format!("{:.1}", v)).unwrap_or_default(),
            r.tls.to_string(),
            r.error.clone().unwrap_or_default(),
        ])?;
    }
    wtr.flush()?;
    Ok(())
}

fn text_line(row: &ReportRow) -> String {
    let (Some(protocol), Some(address), Some(port)) = (row.protocol, &row.address, row.port) else {
        return format!("  - rejected        {} ({})", row.url, row.error.as_deref().unwrap_or("unparseable"));
    };
    let mut s = format!("{:>3} {:<15} {} {}:{}", row.score, row.recommendation, protocol, address, port);
    if !row.label.is_empty() {
        let _ = write!(s, " [{}]", row.label);
    }
    match (row.latency_ms, &row.error) {
        (Some(ms), _) => {
            let _ = write!(s, " {:.0} ms", ms);
            if row.tls {
                s.push_str(" tls");
            }
        }
        (None, Some(e)) => {
            let _ = write!(s, " ({})", e);
        }
        (None, None) => {}
    }
    s
}

fn summary_line(report: &BatchReport, duration_ms: u128) -> String {
    let s = report.summary();
    format!(
        "{} nodes: {} usable, {} rejected, average score {:.1} ({} ms)",
        s.total, s.usable, s.rejected, s.average_score, duration_ms
    )
}

fn check_lines(raws: &[String], format: OutputFormat) -> Result<Vec<String>> {
    let mut objs = Vec::with_capacity(raws.len());
    let mut lines = Vec::with_capacity(raws.len());
    for raw in raws {
        match descriptor_parse::parse(raw) {
            Ok(d) => {
                let v = node_validate::validate(&d);
                let status = if v.valid { "valid" } else { "invalid" };
                lines.push(format!("{:<8} {} {}:{} {}", status, d.protocol(), d.address(), d.port(), v.detail));
                objs.push(serde_json::json!({
                    "url": raw,
                    "status": status,
                    "protocol": d.protocol(),
                    "address": d.address(),
                    "port": d.port(),
                    "label": d.label(),
                    "detail": v.detail,
                }));
            }
            Err(e) => {
                lines.push(format!("{:<8} {} ({})", "rejected", raw, e));
                objs.push(serde_json::json!({ "url": raw, "status": "rejected", "detail": e.to_string() }));
            }
        }
    }
    Ok(match format {
        OutputFormat::Text => lines,
        OutputFormat::Json => vec![serde_json::to_string(&objs)?],
        OutputFormat::Jsonl => objs.iter().map(serde_json::to_string).collect::<Result<Vec<_>, _>>()?,
    })
}
