use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

/// One (host, port) pair to probe.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ProbeTask {
    pub host: IpAddr,
    pub port: u16,
}

impl ProbeTask {
    pub fn new(host: IpAddr, port: u16) -> Self {
        Self { host, port }
    }

    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }
}

impl fmt::Display for ProbeTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.socket_addr())
    }
}

/// Classification of a single probe.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum ProbeState {
    Open,
    Closed,
    Filtered,
    Error,
}

impl ProbeState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProbeState::Open => "open",
            ProbeState::Closed => "closed",
            ProbeState::Filtered => "filtered",
            ProbeState::Error => "error",
        }
    }
}

impl fmt::Display for ProbeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of probing one task.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct ProbeOutcome {
    pub task: ProbeTask,
    pub state: ProbeState,
    pub latency: Duration,
    pub service_hint: Option<String>,
    /// Error or panic text, only set for `Error` outcomes.
    #[serde(default)]
    pub detail: Option<String>,
}

impl ProbeOutcome {
    pub fn new(task: ProbeTask, state: ProbeState, latency: Duration) -> Self {
        Self {
            task,
            state,
            latency,
            service_hint: None,
            detail: None,
        }
    }

    pub fn error(task: ProbeTask, latency: Duration, detail: impl Into<String>) -> Self {
        Self::new(task, ProbeState::Error, latency).with_detail(detail)
    }

    pub fn with_service_hint(mut self, hint: Option<String>) -> Self {
        self.service_hint = hint;
        self
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }

    pub fn is_open(&self) -> bool {
        self.state == ProbeState::Open
    }

    pub fn latency_ms(&self) -> u64 {
        self.latency.as_millis() as u64
    }
}

/// Ping based operating system hint for one host.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct OsHint {
    pub reachable: bool,
    pub ttl: Option<u8>,
    pub os_guess: Option<String>,
}

/// What the optional per-host lookups learned about one scanned host.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct HostHint {
    pub host: IpAddr,
    /// Reverse DNS name, without the trailing dot.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hostname: Option<String>,
    /// Present only when OS detection ran for this host.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub os: Option<OsHint>,
}

/// Final, ordered result of a scan.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct ScanReport {
    pub target: String,
    #[serde(with = "time::serde::rfc3339")]
    pub start_time: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub end_time: OffsetDateTime,
    /// Number of outcomes actually collected.
    pub total_tasks: u64,
    /// Number of tasks the plan contained.
    pub requested_tasks: u64,
    pub cancelled: bool,
    pub open_count: u64,
    pub outcomes: Vec<ProbeOutcome>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub host_hints: Vec<HostHint>,
}

impl ScanReport {
    pub fn open(&self) -> impl Iterator<Item = &ProbeOutcome> {
        self.outcomes.iter().filter(|o| o.is_open())
    }

    pub fn is_partial(&self) -> bool {
        self.cancelled || self.total_tasks < self.requested_tasks
    }

    pub fn duration(&self) -> Duration {
        let d = self.end_time - self.start_time;
        Duration::try_from(d).unwrap_or_default()
    }
}
