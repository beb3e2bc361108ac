use std::time::Duration;

use crate::error::{Result, ScanError};
use crate::ports::default_port_spec;

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(1);
pub const DEFAULT_CONCURRENCY: usize = 100;

/// Options for one scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanConfig {
    /// Address, CIDR, hostname or a comma-separated list of them.
    pub target: String,
    /// Port, range or comma-separated list of ports and ranges.
    pub ports: String,
    /// Connect timeout per probe.
    pub timeout: Duration,
    /// Max probes in flight at once.
    pub concurrency: usize,
    /// Report every outcome, not just open ports.
    pub verbose: bool,
    /// Ping each host and attach a TTL based OS hint.
    pub os_detect: bool,
    /// Look up each host's reverse DNS name.
    pub reverse_dns: bool,
}

impl ScanConfig {
    pub fn new(target: impl Into<String>, ports: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            ports: ports.into(),
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.concurrency == 0 {
            return Err(ScanError::InvalidConcurrency {
                value: self.concurrency,
            });
        }
        if self.timeout.is_zero() {
            return Err(ScanError::InvalidTimeout);
        }
        Ok(())
    }
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            target: String::new(),
            ports: default_port_spec(),
            timeout: DEFAULT_TIMEOUT,
            concurrency: DEFAULT_CONCURRENCY,
            verbose: false,
            os_detect: false,
            reverse_dns: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let cfg = ScanConfig::new("127.0.0.1", "22");
        assert_eq!(cfg.timeout, Duration::from_secs(1));
        assert_eq!(cfg.concurrency, 100);
        assert!(!cfg.verbose);
        assert!(!cfg.os_detect && !cfg.reverse_dns);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn zero_concurrency_and_timeout_rejected() {
        let mut cfg = ScanConfig::new("127.0.0.1", "22");
        cfg.concurrency = 0;
        assert!(matches!(cfg.validate(), Err(ScanError::InvalidConcurrency { value: 0 })));
        cfg.concurrency = 1;
        cfg.timeout = Duration::ZERO;
        assert!(matches!(cfg.validate(), Err(ScanError::InvalidTimeout)));
    }
}
