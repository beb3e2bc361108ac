//! Target expansion: turns a target spec and a port spec into a [`ProbePlan`].

use std::net::IpAddr;

use crate::error::Result;
use crate::ports::parse_port_spec;
use crate::targets::{expand_hosts, parse_target_spec};
use crate::types::ProbeTask;

/// The cross product of hosts and ports to probe.
///
/// Tasks are produced lazily, host-major, so a plan over a /16 and all ports
/// never materializes the full task list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbePlan {
    hosts: Vec<IpAddr>,
    ports: Vec<u16>,
}

impl ProbePlan {
    pub fn new(hosts: Vec<IpAddr>, ports: Vec<u16>) -> Self {
        Self { hosts, ports }
    }

    pub fn hosts(&self) -> &[IpAddr] {
        &self.hosts
    }

    pub fn ports(&self) -> &[u16] {
        &self.ports
    }

    /// Total number of tasks in the plan.
    pub fn len(&self) -> u64 {
        self.hosts.len() as u64 * self.ports.len() as u64
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Iterate the tasks from the start. Can be called any number of times.
    pub fn tasks(&self) -> Tasks<'_> {
        Tasks {
            plan: self,
            host_idx: 0,
            port_idx: 0,
        }
    }
}

/// Host-major iterator over a [`ProbePlan`].
#[derive(Debug, Clone)]
pub struct Tasks<'a> {
    plan: &'a ProbePlan,
    host_idx: usize,
    port_idx: usize,
}

impl Iterator for Tasks<'_> {
    type Item = ProbeTask;

    fn next(&mut self) -> Option<ProbeTask> {
        if self.plan.ports.is_empty() {
            return None;
        }
        let host = *self.plan.hosts.get(self.host_idx)?;
        let port = self.plan.ports[self.port_idx];
        self.port_idx += 1;
        if self.port_idx == self.plan.ports.len() {
            self.port_idx = 0;
            self.host_idx += 1;
        }
        Some(ProbeTask::new(host, port))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let ports = self.plan.ports.len();
        let remaining_hosts = self.plan.hosts.len().saturating_sub(self.host_idx);
        let remaining = remaining_hosts
            .checked_mul(ports)
            .map(|n| n.saturating_sub(self.port_idx));
        (remaining.unwrap_or(usize::MAX), remaining)
    }
}

/// Expand a target spec and a port spec into a plan.
///
/// Pure: no name resolution happens here, so a hostname in `target_spec` is an
/// `InvalidTarget` error. Use [`crate::scanner::build_plan`] to resolve names first.
pub fn expand(target_spec: &str, port_spec: &str) -> Result<ProbePlan> {
    let items = parse_target_spec(target_spec)?;
    let ports = parse_port_spec(port_spec)?;
    let hosts = expand_hosts(target_spec, &items)?;
    Ok(ProbePlan::new(hosts, ports))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ScanError;
    use std::collections::HashSet;
    use std::net::Ipv4Addr;

    fn v4(a: u8, b: u8, c: u8, d: u8) -> IpAddr {
        IpAddr::V4(Ipv4Addr::new(a, b, c, d))
    }

    #[test]
    fn port_specs_expand_to_expected_sets() {
        let cases: &[(&str, Vec<u16>)] = &[
            ("80", vec![80]),
            ("80,443", vec![80, 443]),
            ("1-10", (1..=10).collect()),
            ("1-10,80,443", (1..=10).chain([80, 443]).collect()),
        ];
        for (spec, expected) in cases {
            let plan = expand("127.0.0.1", spec).unwrap();
            let ports: Vec<u16> = plan.tasks().map(|t| t.port).collect();
            assert_eq!(&ports, expected, "spec {spec}");
            let unique: HashSet<_> = ports.iter().collect();
            assert_eq!(unique.len(), ports.len(), "duplicates in {spec}");
        }
    }

    #[test]
    fn slash_30_probes_two_hosts_on_port_22() {
        let plan = expand("192.168.1.0/30", "22").unwrap();
        let tasks: Vec<ProbeTask> = plan.tasks().collect();
        assert_eq!(
            tasks,
            vec![
                ProbeTask::new(v4(192, 168, 1, 1), 22),
                ProbeTask::new(v4(192, 168, 1, 2), 22),
            ]
        );
        assert_eq!(plan.len(), 2);
    }

    #[test]
    fn slash_24_excludes_network_and_broadcast() {
        let plan = expand("10.9.8.0/24", "80").unwrap();
        assert_eq!(plan.hosts().len(), 254);
        assert!(!plan.hosts().contains(&v4(10, 9, 8, 0)));
        assert!(!plan.hosts().contains(&v4(10, 9, 8, 255)));
    }

    #[test]
    fn tasks_are_host_major_in_spec_order() {
        let plan = expand("10.0.0.1,10.0.0.2", "443,22").unwrap();
        let tasks: Vec<(IpAddr, u16)> = plan.tasks().map(|t| (t.host, t.port)).collect();
        assert_eq!(
            tasks,
            vec![
                (v4(10, 0, 0, 1), 443),
                (v4(10, 0, 0, 1), 22),
                (v4(10, 0, 0, 2), 443),
                (v4(10, 0, 0, 2), 22),
            ]
        );
    }

    #[test]
    fn tasks_iterator_is_restartable() {
        let plan = expand("10.0.0.0/29", "1-3").unwrap();
        let first: Vec<_> = plan.tasks().collect();
        let second: Vec<_> = plan.tasks().collect();
        assert_eq!(first, second);
        assert_eq!(first.len() as u64, plan.len());
        assert_eq!(plan.tasks().size_hint(), (18, Some(18)));
    }

    #[test]
    fn errors_distinguish_target_from_ports() {
        assert!(matches!(expand("", "80"), Err(ScanError::InvalidTarget { .. })));
        assert!(matches!(expand("10.0.0.1", "0"), Err(ScanError::InvalidPortSpec { .. })));
        assert!(matches!(expand("nope!", "80"), Err(ScanError::InvalidTarget { .. })));
    }
}
