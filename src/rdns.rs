//! Reverse DNS names for scanned hosts.

use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

use async_trait::async_trait;
use hickory_resolver::config::{NameServerConfigGroup, ResolverConfig, ResolverOpts};
use hickory_resolver::system_conf::read_system_conf;
use hickory_resolver::TokioAsyncResolver;
use tracing::{debug, warn};

/// Per-query wait for a PTR answer.
pub const LOOKUP_TIMEOUT: Duration = Duration::from_secs(2);

#[async_trait]
pub trait ReverseResolver: Send + Sync {
    /// First PTR name for `ip`, or `None` when there is none or the lookup fails.
    async fn reverse(&self, ip: IpAddr) -> Option<String>;
}

/// Resolver backed by `hickory-resolver`.
pub struct DnsResolver {
    inner: TokioAsyncResolver,
}

impl DnsResolver {
    /// Use the system resolver configuration, falling back to the library defaults
    /// when it cannot be read.
    pub fn from_system_conf() -> Self {
        let (config, opts) = read_system_conf().unwrap_or_else(|e| {
            warn!(error = %e, "could not read system resolver config; using defaults");
            (ResolverConfig::default(), ResolverOpts::default())
        });
        Self::new(config, tuned(opts, LOOKUP_TIMEOUT))
    }

    /// Ask a single plain-DNS server, ignoring the hosts file.
    pub fn with_nameserver(addr: SocketAddr, timeout: Duration) -> Self {
        let group = NameServerConfigGroup::from_ips_clear(&[addr.ip()], addr.port(), true);
        let config = ResolverConfig::from_parts(None, vec![], group);
        let mut opts = tuned(ResolverOpts::default(), timeout);
        opts.use_hosts_file = false;
        Self::new(config, opts)
    }

    fn new(config: ResolverConfig, opts: ResolverOpts) -> Self {
        Self {
            inner: TokioAsyncResolver::tokio(config, opts),
        }
    }
}

fn tuned(mut opts: ResolverOpts, timeout: Duration) -> ResolverOpts {
    opts.timeout = timeout;
    opts.attempts = 1;
    opts
}

#[async_trait]
impl ReverseResolver for DnsResolver {
    async fn reverse(&self, ip: IpAddr) -> Option<String> {
        match self.inner.reverse_lookup(ip).await {
            Ok(lookup) => {
                let name = lookup.iter().next().map(|n| trim_root(&n.to_string()))?;
                debug!(%ip, %name, "reverse lookup");
                Some(name)
            }
            Err(e) => {
                debug!(%ip, error = %e, "no reverse name");
                None
            }
        }
    }
}

fn trim_root(name: &str) -> String {
    name.strip_suffix('.').unwrap_or(name).to_string()
}
