use std::collections::HashMap;
use std::net::IpAddr;

use time::OffsetDateTime;

use crate::expand::ProbePlan;
use crate::types::{ProbeOutcome, ScanReport};

/// Scan metadata that the aggregator stamps onto the report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanWindow {
    pub target: String,
    pub start_time: OffsetDateTime,
    pub end_time: OffsetDateTime,
    pub cancelled: bool,
}

/// Order outcomes canonically and build the report.
///
/// Outcomes may arrive in any order. They are grouped by host in plan order
/// and sorted by ascending port within a host; hosts the plan does not know
/// about go last, by address. Nothing is filtered out.
pub fn aggregate<I>(outcomes: I, plan: &ProbePlan, window: ScanWindow) -> ScanReport
where
    I: IntoIterator<Item = ProbeOutcome>,
{
    let rank: HashMap<IpAddr, usize> = plan
        .hosts()
        .iter()
        .enumerate()
        .map(|(i, ip)| (*ip, i))
        .collect();

    let mut outcomes: Vec<ProbeOutcome> = outcomes.into_iter().collect();
    // Stable sort keeps arrival order between duplicate tasks.
    outcomes.sort_by_key(|o| {
        let host_rank = rank.get(&o.task.host).copied().unwrap_or(usize::MAX);
        (host_rank, o.task.host, o.task.port)
    });

    let open_count = outcomes.iter().filter(|o| o.is_open()).count() as u64;

    ScanReport {
        target: window.target,
        start_time: window.start_time,
        end_time: window.end_time,
        total_tasks: outcomes.len() as u64,
        requested_tasks: plan.len(),
        cancelled: window.cancelled,
        open_count,
        outcomes,
        host_hints: Vec::new(),
    }
}
