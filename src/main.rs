use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use portprobe::config::{ScanConfig, DEFAULT_CONCURRENCY};
use portprobe::output::{print_report, write_report_json};
use portprobe::{ports, scanner, targets};

/// portprobe — bounded, cancellable async TCP connect port scanner.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "portprobe",
    version,
    about = "Bounded, cancellable async TCP connect port scanner.",
    long_about = None
)]
struct Cli {
    /// Address, CIDR (e.g. 192.168.1.0/24), hostname, or a comma-separated list.
    /// If omitted (and no --targets-file), auto-detect local /24 networks.
    target: Option<String>,

    /// Path to a targets file (one address, CIDR or hostname per line).
    #[arg(long = "targets-file", conflicts_with = "target")]
    targets_file: Option<PathBuf>,

    /// Ports to scan, e.g. `22`, `1-1024` or `1-100,443,8080`. Defaults to common ports.
    #[arg(short, long)]
    ports: Option<String>,

    /// Path to a ports file (one port or range per line).
    #[arg(long = "ports-file", conflicts_with_all = ["ports", "all"])]
    ports_file: Option<PathBuf>,

    /// Scan all 65535 ports.
    #[arg(short = 'A', long, conflicts_with = "ports")]
    all: bool,

    /// Connect timeout per probe in milliseconds.
    #[arg(long = "timeout-ms", default_value_t = 1000)]
    timeout_ms: u64,

    /// Max concurrent TCP connect attempts.
    #[arg(short, long, default_value_t = DEFAULT_CONCURRENCY)]
    concurrency: usize,

    /// Show every probe outcome and log at debug level.
    #[arg(short, long, default_value_t = false)]
    verbose: bool,

    /// Ping each host and report a TTL based OS guess.
    #[arg(long = "os-detect", default_value_t = false)]
    os_detect: bool,

    /// Look up each host's reverse DNS name.
    #[arg(short = 'r', long = "reverse-dns", default_value_t = false)]
    reverse_dns: bool,

    /// Write the full report as pretty JSON to this path.
    #[arg(short, long)]
    output: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let config = build_config(&cli)?;
    info!(
        spec = %config.target,
        ports = %config.ports,
        concurrency = config.concurrency,
        timeout_ms = cli.timeout_ms,
        "portprobe configuration"
    );

    // Ctrl-C stops admitting probes and drops pending host lookups; in-flight
    // probes finish and are reported.
    let cancel = CancellationToken::new();
    let cancel_ctrlc = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received, finishing in-flight probes");
            cancel_ctrlc.cancel();
        }
    });

    let report = scanner::scan(&config, cancel).await?;
    print_report(&report, config.verbose);

    if let Some(path) = cli.output.as_deref() {
        write_report_json(path, &report)?;
        println!("Wrote JSON results to {}", path.display());
    }

    Ok(())
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "portprobe=debug" } else { "portprobe=info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn build_config(cli: &Cli) -> Result<ScanConfig> {
    let target = match (&cli.target, &cli.targets_file) {
        (Some(t), _) => t.clone(),
        (None, Some(path)) => targets::load_target_spec_file(path)?,
        (None, None) => {
            let cidrs = targets::detect_local_cidrs().context("failed to detect local networks")?;
            if cidrs.is_empty() {
                bail!("no target given and no local IPv4 network detected");
            }
            for cidr in &cidrs {
                info!(%cidr, "auto-detected local network");
            }
            cidrs.iter().map(ToString::to_string).collect::<Vec<_>>().join(",")
        }
    };

    let ports = if cli.all {
        ports::ALL_PORTS.to_string()
    } else if let Some(p) = &cli.ports {
        p.clone()
    } else if let Some(path) = &cli.ports_file {
        ports::load_port_spec_file(path)?
    } else {
        ports::default_port_spec()
    };

    Ok(ScanConfig {
        target,
        ports,
        timeout: Duration::from_millis(cli.timeout_ms),
        concurrency: cli.concurrency,
        verbose: cli.verbose,
        os_detect: cli.os_detect,
        reverse_dns: cli.reverse_dns,
    })
}
