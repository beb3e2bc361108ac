//! Ping based host reachability and operating system hints.
//!
//! External commands go through the [`CommandRunner`] trait so callers and
//! tests can swap the real process runner for a scripted one.

use std::io;
use std::net::IpAddr;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;
use tokio::time;
use tracing::{debug, warn};

use crate::types::OsHint;

/// Structured result of running an external command.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CommandOutput {
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }
}

#[async_trait]
pub trait CommandRunner: Send + Sync {
    async fn run(&self, program: &str, args: &[String]) -> io::Result<CommandOutput>;
}

/// Runs commands as child processes.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemCommandRunner;

#[async_trait]
impl CommandRunner for SystemCommandRunner {
    async fn run(&self, program: &str, args: &[String]) -> io::Result<CommandOutput> {
        let out = Command::new(program).args(args).kill_on_drop(true).output().await?;
        Ok(CommandOutput {
            exit_code: out.status.code(),
            stdout: String::from_utf8_lossy(&out.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&out.stderr).into_owned(),
        })
    }
}

/// Initial TTL values and the systems that typically use them.
const TTL_SIGNATURES: &[(u8, &str)] = &[
    (64, "Linux/Unix"),
    (128, "Windows"),
    (254, "Cisco/Network Device"),
    (255, "Unix/FreeBSD"),
];

/// Upper bound on one ping, in case the platform's ping ignores its own wait flag.
pub const PING_DEADLINE: Duration = Duration::from_secs(3);

/// Ping binary for `host`. Older macOS releases only speak IPv6 through `ping6`.
pub fn ping_program(host: IpAddr) -> &'static str {
    if host.is_ipv6() && cfg!(target_os = "macos") {
        "ping6"
    } else {
        "ping"
    }
}

/// Single-echo ping arguments for the current platform.
pub fn ping_args(host: IpAddr) -> Vec<String> {
    let mut args: Vec<String> = if cfg!(windows) {
        vec!["-n".into(), "1".into(), "-w".into(), "1000".into()]
    } else if cfg!(target_os = "macos") {
        if host.is_ipv6() {
            // ping6 has no -W
            vec!["-c".into(), "1".into()]
        } else {
            vec!["-c".into(), "1".into(), "-W".into(), "1000".into()]
        }
    } else {
        vec!["-c".into(), "1".into(), "-W".into(), "1".into()]
    };
    if host.is_ipv6() && !cfg!(windows) && !cfg!(target_os = "macos") {
        args.insert(0, "-6".into());
    }
    args.push(host.to_string());
    args
}

/// Extract the `ttl=` value from ping output, ignoring case.
pub fn parse_ttl(output: &str) -> Option<u8> {
    let lower = output.to_ascii_lowercase();
    let idx = lower.find("ttl=")?;
    let digits: String = lower[idx + 4..]
        .chars()
        .take_while(|c| c.is_ascii_digit())
        .collect();
    digits.parse().ok()
}

pub fn guess_os(ttl: u8) -> Option<&'static str> {
    TTL_SIGNATURES
        .iter()
        .find(|(t, _)| *t == ttl)
        .map(|(_, name)| *name)
}

/// Ping `host` once and derive reachability plus an OS guess from the reply TTL.
///
/// Runner failures (ping missing, no permission) and pings that outlive
/// [`PING_DEADLINE`] yield an unreachable hint rather than an error.
pub async fn detect_os(runner: &dyn CommandRunner, host: IpAddr) -> OsHint {
    let program = ping_program(host);
    let reply = time::timeout(PING_DEADLINE, runner.run(program, &ping_args(host))).await;
    match reply {
        Ok(Ok(out)) => {
            let ttl = parse_ttl(&out.stdout);
            let os_guess = ttl.and_then(guess_os).map(str::to_string);
            debug!(%host, exit = ?out.exit_code, ?ttl, ?os_guess, "ping finished");
            OsHint {
                reachable: out.success(),
                ttl,
                os_guess,
            }
        }
        Ok(Err(e)) => {
            warn!(%host, %program, error = %e, "ping failed; skipping OS hint");
            OsHint::unreachable()
        }
        Err(_) => {
            debug!(%host, deadline_ms = PING_DEADLINE.as_millis() as u64, "ping timed out");
            OsHint::unreachable()
        }
    }
}

impl OsHint {
    fn unreachable() -> Self {
        Self {
            reachable: false,
            ttl: None,
            os_guess: None,
        }
    }
}
