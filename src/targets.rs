use std::collections::HashSet;
use std::fs;
use std::net::{IpAddr, Ipv4Addr};
use std::path::Path;

use if_addrs::{get_if_addrs, IfAddr};
use ipnet::{IpNet, Ipv4Net, Ipv6Net};
use tokio::net::lookup_host;
use tracing::{debug, warn};

use crate::error::{Result, ScanError};
use crate::ports::join_spec_lines;

/// Largest network block (in addresses) a single target entry may expand to.
pub const MAX_BLOCK_ADDRESSES: u128 = 1 << 16;

/// One comma-separated entry of a target spec.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TargetItem {
    Addr(IpAddr),
    Network(IpNet),
    Hostname(String),
}

/// Split a target spec into addresses, CIDR blocks and hostnames.
///
/// Host bits in a CIDR are masked off (`10.0.0.7/24` is `10.0.0.0/24`).
pub fn parse_target_spec(spec: &str) -> Result<Vec<TargetItem>> {
    let trimmed = spec.trim();
    if trimmed.is_empty() {
        return Err(ScanError::target(spec, "empty target"));
    }

    let mut items = Vec::new();
    for raw in trimmed.split(',') {
        let item = raw.trim();
        if item.is_empty() {
            return Err(ScanError::target(spec, "empty item in list"));
        }
        if item.contains('/') {
            let net = item
                .parse::<IpNet>()
                .map_err(|e| ScanError::target(spec, format!("invalid CIDR '{item}': {e}")))?;
            check_block_size(spec, &net)?;
            items.push(TargetItem::Network(net.trunc()));
        } else if let Ok(ip) = item.parse::<IpAddr>() {
            items.push(TargetItem::Addr(ip));
        } else if is_valid_hostname(item) {
            items.push(TargetItem::Hostname(item.to_ascii_lowercase()));
        } else {
            return Err(ScanError::target(spec, format!("not an address, CIDR or hostname: '{item}'")));
        }
    }
    Ok(items)
}

/// Expand parsed items into a deduplicated host list, keeping first appearance.
///
/// Hostnames must have been resolved beforehand (see [`resolve_hostnames`]).
pub fn expand_hosts(spec: &str, items: &[TargetItem]) -> Result<Vec<IpAddr>> {
    let mut seen = HashSet::new();
    let mut hosts = Vec::new();
    for item in items {
        let expanded = match item {
            TargetItem::Addr(ip) => vec![*ip],
            TargetItem::Network(net) => expand_cidr_to_ips(*net),
            TargetItem::Hostname(name) => {
                return Err(ScanError::target(spec, format!("unresolved hostname '{name}'")))
            }
        };
        for ip in expanded {
            if seen.insert(ip) {
                hosts.push(ip);
            }
        }
    }
    if hosts.is_empty() {
        return Err(ScanError::target(spec, "no usable host addresses"));
    }
    Ok(hosts)
}

/// Replace every hostname item with its first resolved address, preferring IPv4.
pub async fn resolve_hostnames(spec: &str, items: Vec<TargetItem>) -> Result<Vec<TargetItem>> {
    let mut out = Vec::with_capacity(items.len());
    for item in items {
        match item {
            TargetItem::Hostname(name) => {
                let addrs: Vec<IpAddr> = lookup_host((name.as_str(), 0))
                    .await
                    .map_err(|e| ScanError::target(spec, format!("could not resolve '{name}': {e}")))?
                    .map(|sa| sa.ip())
                    .collect();
                let ip = addrs
                    .iter()
                    .find(|ip| ip.is_ipv4())
                    .or_else(|| addrs.first())
                    .copied()
                    .ok_or_else(|| ScanError::target(spec, format!("'{name}' resolved to no addresses")))?;
                debug!(%name, %ip, "resolved hostname");
                out.push(TargetItem::Addr(ip));
            }
            other => out.push(other),
        }
    }
    Ok(out)
}

/// Read a targets file (one address, CIDR or hostname per line, `#` comments allowed)
/// and turn it into a comma-separated target spec.
pub fn load_target_spec_file(path: impl AsRef<Path>) -> Result<String> {
    let path = path.as_ref();
    let content = fs::read_to_string(path).map_err(|source| ScanError::SpecFile {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(join_spec_lines(&content))
}

/// Detect local non-loopback IPv4 addresses and convert each to a default /24 CIDR network.
///
/// For example, an interface IP `192.168.1.42` becomes `192.168.1.0/24`.
/// Duplicates are removed.
pub fn detect_local_cidrs() -> std::io::Result<Vec<IpNet>> {
    let mut set = HashSet::<Ipv4Net>::new();
    for iface in get_if_addrs()? {
        if let IfAddr::V4(v4) = iface.addr {
            let ip = v4.ip;
            if ip.is_loopback() {
                continue;
            }
            set.insert(ipv4_to_default_cidr(ip));
        }
    }
    let mut cidrs: Vec<Ipv4Net> = set.into_iter().collect();
    // Sort for stable output
    cidrs.sort_by_key(|n| (u32::from(n.network()), n.prefix_len()));
    if cidrs.is_empty() {
        warn!("no non-loopback IPv4 interfaces found");
    }
    Ok(cidrs.into_iter().map(IpNet::V4).collect())
}

/// Expand a CIDR into the usable host addresses of the block.
///
/// IPv4 drops the network and broadcast addresses unless the block is a /31 or /32.
/// IPv6 drops the subnet-router anycast address unless the block is a /127 or /128.
pub fn expand_cidr_to_ips(cidr: IpNet) -> Vec<IpAddr> {
    match cidr {
        IpNet::V4(n4) => expand_ipv4net_hosts(n4).into_iter().map(IpAddr::V4).collect(),
        IpNet::V6(n6) => expand_ipv6net_hosts(n6).into_iter().map(IpAddr::V6).collect(),
    }
}

/// Helper: convert an IPv4 address into its default /24 network.
pub fn ipv4_to_default_cidr(ip: Ipv4Addr) -> Ipv4Net {
    let o = ip.octets();
    Ipv4Net::new(Ipv4Addr::new(o[0], o[1], o[2], 0), 24).expect("/24 is always valid")
}

fn expand_ipv4net_hosts(net: Ipv4Net) -> Vec<Ipv4Addr> {
    let start = u32::from(net.network());
    let end = u32::from(net.broadcast());
    if net.prefix_len() >= 31 {
        return (start..=end).map(Ipv4Addr::from).collect();
    }
    (start + 1..end).map(Ipv4Addr::from).collect()
}

fn expand_ipv6net_hosts(net: Ipv6Net) -> Vec<std::net::Ipv6Addr> {
    let skip = usize::from(net.prefix_len() < 127);
    net.hosts().skip(skip).collect()
}

fn check_block_size(spec: &str, net: &IpNet) -> Result<()> {
    let host_bits = u32::from(net.max_prefix_len() - net.prefix_len());
    let size = 1u128.checked_shl(host_bits).unwrap_or(u128::MAX);
    if size > MAX_BLOCK_ADDRESSES {
        return Err(ScanError::target(
            spec,
            format!("block {net} has {size} addresses (limit {MAX_BLOCK_ADDRESSES})"),
        ));
    }
    Ok(())
}

fn is_valid_hostname(s: &str) -> bool {
    if s.len() > 253 {
        return false;
    }
    let name = s.strip_suffix('.').unwrap_or(s);
    !name.is_empty()
        && name.split('.').all(|label| {
            !label.is_empty()
                && label.len() <= 63
                && !label.starts_with('-')
                && !label.ends_with('-')
                && label.chars().all(|c| c.is_ascii_alphanumeric() || c == '-')
        })
        // an all-numeric dotted name is a malformed address, not a hostname
        && !name.split('.').all(|label| label.chars().all(|c| c.is_ascii_digit()))
}
