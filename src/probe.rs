use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::net::TcpStream;
use tokio::time::{self, Instant};

use crate::services::service_hint;
use crate::types::{ProbeOutcome, ProbeState, ProbeTask};

/// Longest we wait for a service to volunteer a banner.
pub const MAX_BANNER_WAIT: Duration = Duration::from_secs(1);

const BANNER_BUF: usize = 1024;

/// Probe one task with a TCP connect bounded by `timeout`.
///
/// - connect succeeds: `Open`, followed by a short passive banner read
/// - connection refused: `Closed`
/// - no answer within `timeout`: `Filtered`
/// - anything else: `Error`
///
/// `latency` covers the connect attempt only. The socket is dropped before returning.
pub async fn probe(task: ProbeTask, timeout: Duration) -> ProbeOutcome {
    probe_with(task, timeout, |addr| TcpStream::connect(addr)).await
}

pub(crate) async fn probe_with<C, Fut, S>(task: ProbeTask, timeout: Duration, connect: C) -> ProbeOutcome
where
    C: FnOnce(SocketAddr) -> Fut,
    Fut: Future<Output = io::Result<S>>,
    S: AsyncRead + Unpin,
{
    let start = Instant::now();
    match time::timeout(timeout, connect(task.socket_addr())).await {
        Ok(Ok(mut stream)) => {
            let latency = start.elapsed();
            let banner = read_banner(&mut stream, timeout.min(MAX_BANNER_WAIT)).await;
            drop(stream);
            ProbeOutcome::new(task, ProbeState::Open, latency)
                .with_service_hint(service_hint(task.port, banner.as_deref()))
        }
        Ok(Err(e)) => {
            let latency = start.elapsed();
            match classify_connect_error(&e) {
                ProbeState::Error => ProbeOutcome::error(task, latency, e.to_string()),
                state => ProbeOutcome::new(task, state, latency),
            }
        }
        Err(_) => ProbeOutcome::new(task, ProbeState::Filtered, start.elapsed()),
    }
}

fn classify_connect_error(e: &io::Error) -> ProbeState {
    match e.kind() {
        io::ErrorKind::ConnectionRefused => ProbeState::Closed,
        // The OS gave up before we did; still nothing answered.
        io::ErrorKind::TimedOut => ProbeState::Filtered,
        _ => ProbeState::Error,
    }
}

/// Read up to 1 KiB within `wait` and convert it to a single trimmed line of lossy UTF-8.
async fn read_banner<S: AsyncRead + Unpin>(stream: &mut S, wait: Duration) -> Option<String> {
    let mut buf = vec![0u8; BANNER_BUF];
    match time::timeout(wait, stream.read(&mut buf)).await {
        Ok(Ok(n)) if n > 0 => {
            buf.truncate(n);
            let s = String::from_utf8_lossy(&buf);
            let s = s.trim().replace('\n', "\\n").replace('\r', "\\r");
            if s.is_empty() {
                None
            } else {
                Some(s)
            }
        }
        _ => None,
    }
}
