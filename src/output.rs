use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use anyhow::{Context, Result};

use crate::types::{HostHint, ProbeOutcome, ScanReport};

const SERVICE_MAX: usize = 60;

/// Print the report as an aligned table. Only open ports unless `show_all`.
pub fn print_report(report: &ScanReport, show_all: bool) {
    let rows: Vec<&ProbeOutcome> = if show_all {
        report.outcomes.iter().collect()
    } else {
        report.open().collect()
    };

    let mut host_w = "host".len();
    let mut service_w = "service".len();
    for o in &rows {
        host_w = host_w.max(o.task.host.to_string().len());
        service_w = service_w.max(service_text(o).chars().count());
    }
    let port_w = 5usize;
    let state_w = "filtered".len();
    let lat_w = "latency_ms".len();

    println!(
        "\nTarget: {}  open: {}  scanned: {}/{}  elapsed: {:.2}s{}",
        report.target,
        report.open_count,
        report.total_tasks,
        report.requested_tasks,
        report.duration().as_secs_f64(),
        if report.is_partial() { "  (partial: scan cancelled)" } else { "" }
    );
    for hint in &report.host_hints {
        println!("  {}", host_line(hint));
    }
    if rows.is_empty() {
        println!("No open ports found.");
        return;
    }

    println!(
        "{:<host_w$}  {:>port_w$}  {:<state_w$}  {:>lat_w$}  {:<service_w$}",
        "host", "port", "state", "latency_ms", "service",
    );
    println!(
        "{:-<host_w$}  {:-<port_w$}  {:-<state_w$}  {:-<lat_w$}  {:-<service_w$}",
        "", "", "", "", "",
    );
    for o in rows {
        println!(
            "{:<host_w$}  {:>port_w$}  {:<state_w$}  {:>lat_w$}  {:<service_w$}",
            o.task.host.to_string(),
            o.task.port,
            o.state.as_str(),
            o.latency_ms(),
            service_text(o),
        );
    }
}

/// Write the full report as pretty JSON.
pub fn write_report_json(path: &Path, report: &ScanReport) -> Result<()> {
    let file = File::create(path).with_context(|| format!("failed to create {}", path.display()))?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer_pretty(&mut writer, report)
        .with_context(|| format!("failed to write JSON to {}", path.display()))?;
    writer.flush()?;
    Ok(())
}

fn host_line(hint: &HostHint) -> String {
    let mut line = hint.host.to_string();
    if let Some(name) = &hint.hostname {
        line.push_str(&format!(" ({name})"));
    }
    if let Some(os) = &hint.os {
        let guess = os
            .os_guess
            .as_deref()
            .unwrap_or(if os.reachable { "unknown OS" } else { "no ping reply" });
        let ttl = os.ttl.map(|t| t.to_string()).unwrap_or_else(|| "-".into());
        line.push_str(&format!(": {guess} (ttl {ttl})"));
    }
    line
}

fn service_text(o: &ProbeOutcome) -> String {
    let text = o
        .service_hint
        .as_deref()
        .or(o.detail.as_deref())
        .unwrap_or("");
    text.chars().take(SERVICE_MAX).collect()
}
