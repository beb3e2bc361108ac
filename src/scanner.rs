use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;

use futures::stream::{self, StreamExt};
use time::OffsetDateTime;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tokio_util::task::AbortOnDropHandle;
use tracing::{debug, info, warn};

use crate::aggregate::{aggregate, ScanWindow};
use crate::config::ScanConfig;
use crate::error::Result;
use crate::expand::ProbePlan;
use crate::oshint::{detect_os, CommandRunner, SystemCommandRunner};
use crate::pool::{self, SharedProgress};
use crate::ports::parse_port_spec;
use crate::probe::probe;
use crate::rdns::{DnsResolver, ReverseResolver};
use crate::targets::{expand_hosts, parse_target_spec, resolve_hostnames};
use crate::types::{HostHint, ProbeState, ScanReport};

const PROGRESS_INTERVAL: Duration = Duration::from_secs(2);
const MAX_PARALLEL_HOST_LOOKUPS: usize = 32;

/// Per-host lookups run after the port probes. `None` skips that lookup.
#[derive(Clone, Default)]
pub struct HostLookups {
    pub os: Option<Arc<dyn CommandRunner>>,
    pub names: Option<Arc<dyn ReverseResolver>>,
}

impl HostLookups {
    /// System ping and DNS, enabled by the config's `os_detect` and `reverse_dns`.
    pub fn from_config(config: &ScanConfig) -> Self {
        Self {
            os: config
                .os_detect
                .then(|| Arc::new(SystemCommandRunner) as Arc<dyn CommandRunner>),
            names: config
                .reverse_dns
                .then(|| Arc::new(DnsResolver::from_system_conf()) as Arc<dyn ReverseResolver>),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.os.is_none() && self.names.is_none()
    }
}

/// Parse and resolve the config's target and port specs into a plan.
///
/// Port errors are reported before any name resolution happens.
pub async fn build_plan(config: &ScanConfig) -> Result<ProbePlan> {
    let items = parse_target_spec(&config.target)?;
    let ports = parse_port_spec(&config.ports)?;
    let items = resolve_hostnames(&config.target, items).await?;
    let hosts = expand_hosts(&config.target, &items)?;
    Ok(ProbePlan::new(hosts, ports))
}

/// Run a complete scan: validate, expand, probe every task, aggregate.
///
/// Input errors abort before probing. Cancelling `cancel` stops admission of new
/// probes and any per-host lookups; the returned report then holds what finished
/// and has `cancelled` set.
pub async fn scan(config: &ScanConfig, cancel: CancellationToken) -> Result<ScanReport> {
    scan_with(config, cancel, HostLookups::from_config(config)).await
}

/// Variant of [`scan`] that takes the per-host lookups explicitly.
pub async fn scan_with(
    config: &ScanConfig,
    cancel: CancellationToken,
    lookups: HostLookups,
) -> Result<ScanReport> {
    config.validate()?;
    let plan = build_plan(config).await?;
    info!(
        spec = %config.target,
        hosts = plan.hosts().len(),
        ports = plan.ports().len(),
        tasks = plan.len(),
        concurrency = config.concurrency,
        timeout_ms = config.timeout.as_millis() as u64,
        "starting scan"
    );

    let start_time = OffsetDateTime::now_utc();
    let progress = SharedProgress::new();
    let reporter = spawn_progress_reporter(progress.clone(), plan.len());

    let timeout = config.timeout;
    let run = pool::run_shared(
        plan.tasks(),
        config.concurrency,
        move |task| async move {
            let outcome = probe(task, timeout).await;
            match outcome.state {
                ProbeState::Open => info!(
                    %task,
                    latency_ms = outcome.latency_ms(),
                    service = outcome.service_hint.as_deref().unwrap_or("-"),
                    "open"
                ),
                ProbeState::Error => {
                    debug!(%task, detail = outcome.detail.as_deref().unwrap_or(""), "probe error")
                }
                state => debug!(%task, %state, latency_ms = outcome.latency_ms(), "probe done"),
            }
            outcome
        },
        cancel.clone(),
        progress,
    )
    .await;
    drop(reporter);
    let end_time = OffsetDateTime::now_utc();

    if run.cancelled {
        warn!(
            completed = run.outcomes.len(),
            requested = plan.len(),
            "scan cancelled, reporting partial results"
        );
    }

    let mut report = aggregate(
        run.outcomes,
        &plan,
        ScanWindow {
            target: config.target.clone(),
            start_time,
            end_time,
            cancelled: run.cancelled,
        },
    );

    if !lookups.is_empty() && !report.cancelled {
        report.host_hints = describe_hosts(lookups, plan.hosts(), &cancel).await;
        if cancel.is_cancelled() {
            warn!(
                described = report.host_hints.len(),
                hosts = plan.hosts().len(),
                "host lookups cancelled"
            );
            report.cancelled = true;
        }
    }

    info!(
        open = report.open_count,
        scanned = report.total_tasks,
        elapsed_ms = report.duration().as_millis() as u64,
        "scan finished"
    );
    Ok(report)
}

/// Run the per-host lookups with bounded parallelism, returning hints in host order.
///
/// Stops pulling hosts once `cancel` fires; lookups still running are dropped.
async fn describe_hosts(
    lookups: HostLookups,
    hosts: &[IpAddr],
    cancel: &CancellationToken,
) -> Vec<HostHint> {
    stream::iter(hosts.iter().copied())
        .map(|host| describe_host(lookups.clone(), host))
        .buffered(MAX_PARALLEL_HOST_LOOKUPS)
        .take_until(cancel.cancelled())
        .collect()
        .await
}

async fn describe_host(lookups: HostLookups, host: IpAddr) -> HostHint {
    let name = async {
        match &lookups.names {
            Some(resolver) => resolver.reverse(host).await,
            None => None,
        }
    };
    let os = async {
        match &lookups.os {
            Some(runner) => Some(detect_os(runner.as_ref(), host).await),
            None => None,
        }
    };
    let (hostname, os) = tokio::join!(name, os);
    HostHint { host, hostname, os }
}

/// Log progress every [`PROGRESS_INTERVAL`] until the returned handle is dropped.
fn spawn_progress_reporter(progress: SharedProgress, total: u64) -> AbortOnDropHandle<()> {
    let handle: JoinHandle<()> = tokio::spawn(async move {
        let mut tick = tokio::time::interval(PROGRESS_INTERVAL);
        tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tick.tick().await;
        loop {
            tick.tick().await;
            info!(
                done = progress.completed(),
                total,
                open = progress.open(),
                "progress"
            );
        }
    });
    AbortOnDropHandle::new(handle)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ScanError;
    use crate::oshint::CommandOutput;
    use async_trait::async_trait;
    use std::io;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::net::TcpListener;

    struct FixedTtl;

    #[async_trait]
    impl CommandRunner for FixedTtl {
        async fn run(&self, _program: &str, _args: &[String]) -> io::Result<CommandOutput> {
            Ok(CommandOutput {
                exit_code: Some(0),
                stdout: "64 bytes from 127.0.0.1: icmp_seq=1 ttl=64 time=0.05 ms".into(),
                stderr: String::new(),
            })
        }
    }

    #[tokio::test]
    async fn invalid_ports_fail_before_probing() {
        let cfg = ScanConfig::new("127.0.0.1", "22,70000");
        let err = scan(&cfg, CancellationToken::new()).await.unwrap_err();
        assert!(matches!(err, ScanError::InvalidPortSpec { .. }));
    }

    #[tokio::test]
    async fn invalid_target_fails_before_probing() {
        let cfg = ScanConfig::new("10.0.0.0/40", "22");
        let err = scan(&cfg, CancellationToken::new()).await.unwrap_err();
        assert!(matches!(err, ScanError::InvalidTarget { .. }));
    }

    #[tokio::test]
    async fn build_plan_resolves_hostnames() {
        let cfg = ScanConfig::new("localhost", "80");
        let plan = build_plan(&cfg).await.unwrap();
        assert_eq!(plan.hosts().len(), 1);
        assert!(plan.hosts()[0].is_loopback());
    }

    #[tokio::test]
    async fn os_hints_attached_when_enabled() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let cfg = ScanConfig::new("127.0.0.1", port.to_string());
        let lookups = HostLookups {
            os: Some(Arc::new(FixedTtl)),
            names: None,
        };
        let report = scan_with(&cfg, CancellationToken::new(), lookups).await.unwrap();
        assert_eq!(report.host_hints.len(), 1);
        let os = report.host_hints[0].os.as_ref().unwrap();
        assert_eq!(os.os_guess.as_deref(), Some("Linux/Unix"));
        assert_eq!(report.host_hints[0].hostname, None);
        assert_eq!(report.outcomes[0].state, ProbeState::Closed);
        assert!(!report.cancelled);
    }

    struct LoopbackNames;

    #[async_trait]
    impl ReverseResolver for LoopbackNames {
        async fn reverse(&self, ip: IpAddr) -> Option<String> {
            ip.is_loopback().then(|| "localhost".to_string())
        }
    }

    #[tokio::test]
    async fn reverse_names_attached_for_each_host() {
        let mut cfg = ScanConfig::new("127.0.0.1,10.0.0.1", "1");
        cfg.timeout = Duration::from_millis(100);
        let lookups = HostLookups {
            os: None,
            names: Some(Arc::new(LoopbackNames)),
        };
        let report = scan_with(&cfg, CancellationToken::new(), lookups).await.unwrap();
        let names: Vec<(IpAddr, Option<&str>)> = report
            .host_hints
            .iter()
            .map(|h| (h.host, h.hostname.as_deref()))
            .collect();
        assert_eq!(
            names,
            [
                ("127.0.0.1".parse().unwrap(), Some("localhost")),
                ("10.0.0.1".parse().unwrap(), None),
            ]
        );
        assert!(report.host_hints.iter().all(|h| h.os.is_none()));
    }

    /// Cancels the scan on its first ping, then takes a while to answer.
    struct CancelsOnFirstPing {
        cancel: CancellationToken,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl CommandRunner for CancelsOnFirstPing {
        async fn run(&self, _program: &str, _args: &[String]) -> io::Result<CommandOutput> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.cancel.cancel();
            tokio::time::sleep(Duration::from_millis(300)).await;
            Ok(CommandOutput::default())
        }
    }

    #[tokio::test]
    async fn cancellation_during_host_lookups_stops_them() {
        let cancel = CancellationToken::new();
        let runner = Arc::new(CancelsOnFirstPing {
            cancel: cancel.clone(),
            calls: AtomicUsize::new(0),
        });
        let mut cfg = ScanConfig::new("127.0.0.0/24", "1");
        cfg.timeout = Duration::from_millis(200);
        let lookups = HostLookups {
            os: Some(runner.clone()),
            names: None,
        };

        let start = std::time::Instant::now();
        let report = scan_with(&cfg, cancel, lookups).await.unwrap();

        assert!(report.cancelled);
        assert!(report.is_partial());
        assert_eq!(report.total_tasks, 254);
        assert!(report.host_hints.len() < 254);
        // only the first bounded batch was ever started
        assert!(runner.calls.load(Ordering::SeqCst) <= MAX_PARALLEL_HOST_LOOKUPS);
        assert!(start.elapsed() < Duration::from_secs(2), "{:?}", start.elapsed());
    }

    #[tokio::test]
    async fn cancelled_port_scan_skips_host_lookups() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let cfg = ScanConfig::new("127.0.0.1", "1");
        let lookups = HostLookups {
            os: Some(Arc::new(FixedTtl)),
            names: Some(Arc::new(LoopbackNames)),
        };
        let report = scan_with(&cfg, cancel, lookups).await.unwrap();
        assert!(report.cancelled);
        assert!(report.host_hints.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn progress_reporter_stops_when_dropped() {
        let progress = SharedProgress::new();
        let reporter = spawn_progress_reporter(progress.clone(), 10);
        tokio::time::sleep(PROGRESS_INTERVAL * 2).await;
        assert_eq!(Arc::strong_count(&progress.completed), 2);

        drop(reporter);
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
        assert_eq!(Arc::strong_count(&progress.completed), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn dropping_a_scan_midway_stops_progress_logging() {
        let progress = SharedProgress::new();
        let scan = async {
            let _reporter = spawn_progress_reporter(progress.clone(), 10);
            std::future::pending::<()>().await;
        };
        assert!(tokio::time::timeout(Duration::from_secs(5), scan).await.is_err());
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
        assert_eq!(Arc::strong_count(&progress.completed), 1);
    }
}
