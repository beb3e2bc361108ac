use std::time::Duration;

use portprobe::{scan, ProbeState, ScanConfig};
use tokio::io::AsyncWriteExt;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

async fn closed_port() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);
    port
}

#[tokio::test]
async fn localhost_scan_reports_open_and_closed_in_port_order() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let open = listener.local_addr().unwrap().port();
    tokio::spawn(async move {
        while let Ok((mut sock, _)) = listener.accept().await {
            let _ = sock.write_all(b"hello from test\r\n").await;
        }
    });
    let closed = closed_port().await;

    let mut cfg = ScanConfig::new("127.0.0.1", format!("{open},{closed}"));
    cfg.timeout = Duration::from_millis(500);
    cfg.concurrency = 4;

    let report = scan(&cfg, CancellationToken::new()).await.unwrap();

    assert!(!report.cancelled);
    assert_eq!(report.total_tasks, 2);
    assert_eq!(report.requested_tasks, 2);
    assert_eq!(report.open_count, 1);

    let ports: Vec<u16> = report.outcomes.iter().map(|o| o.task.port).collect();
    let mut sorted = ports.clone();
    sorted.sort_unstable();
    assert_eq!(ports, sorted);

    let open_outcome = report.open().next().unwrap();
    assert_eq!(open_outcome.task.port, open);
    assert_eq!(open_outcome.service_hint.as_deref(), Some("hello from test"));
    let closed_outcome = report.outcomes.iter().find(|o| o.task.port == closed).unwrap();
    assert_eq!(closed_outcome.state, ProbeState::Closed);
}

#[tokio::test]
async fn cancelled_before_start_returns_empty_partial_report() {
    let cancel = CancellationToken::new();
    cancel.cancel();
    let cfg = ScanConfig::new("127.0.0.1", "1-50");
    let report = scan(&cfg, cancel).await.unwrap();
    assert!(report.cancelled);
    assert!(report.is_partial());
    assert_eq!(report.total_tasks, 0);
    assert_eq!(report.requested_tasks, 50);
}

#[tokio::test]
async fn total_tasks_matches_plan_when_not_cancelled() {
    let cfg = ScanConfig::new("127.0.0.1", format!("{}", closed_port().await));
    let report = scan(&cfg, CancellationToken::new()).await.unwrap();
    assert_eq!(report.total_tasks, report.requested_tasks);
    assert_eq!(report.outcomes.len() as u64, report.total_tasks);
}

#[tokio::test]
async fn validation_errors_name_the_bad_input() {
    let err = scan(&ScanConfig::new("", "80"), CancellationToken::new())
        .await
        .unwrap_err();
    assert!(err.to_string().starts_with("invalid target"));

    let err = scan(&ScanConfig::new("127.0.0.1", "99999"), CancellationToken::new())
        .await
        .unwrap_err();
    assert!(err.to_string().starts_with("invalid port spec"));
}
