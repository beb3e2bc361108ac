use std::collections::HashSet;
use std::fs;
use std::path::Path;

use crate::error::{Result, ScanError};

/// Ports probed when no port spec is given.
pub const DEFAULT_PORTS: &[u16] = &[
    21, 22, 23, 25, 53, 80, 110, 111, 135, 139, 143, 443, 445, 993, 995, 1723, 3306, 3389, 5900,
    8080,
];

/// Spec covering every TCP port.
pub const ALL_PORTS: &str = "1-65535";

/// Parse a port spec into a deduplicated list of TCP ports (1..=65535).
///
/// Supported items, separated by commas:
/// - single port number: `80`
/// - inclusive range: `8000-8010`
///
/// Ports keep the order they are listed in; ranges expand ascending and a port
/// seen earlier is not repeated.
pub fn parse_port_spec(spec: &str) -> Result<Vec<u16>> {
    let trimmed = spec.trim();
    if trimmed.is_empty() {
        return Err(ScanError::ports(spec, "empty port spec"));
    }

    let mut out: Vec<u16> = Vec::new();
    let mut seen = HashSet::new();

    for raw_item in trimmed.split(',') {
        let item = raw_item.trim();
        if item.is_empty() {
            return Err(ScanError::ports(spec, "empty item in list"));
        }

        // Range `start-end`
        if let Some((a, b)) = item.split_once('-') {
            let start = parse_port_str(spec, a.trim())?;
            let end = parse_port_str(spec, b.trim())?;
            if start > end {
                return Err(ScanError::ports(
                    spec,
                    format!("invalid range {start}-{end} (start > end)"),
                ));
            }
            for p in start..=end {
                if seen.insert(p) {
                    out.push(p);
                }
            }
            continue;
        }

        let p = parse_port_str(spec, item)?;
        if seen.insert(p) {
            out.push(p);
        }
    }

    Ok(out)
}

/// Read a ports file and turn it into a comma-separated port spec.
///
/// One port or range per line; everything after `#` is ignored, as are blank lines.
pub fn load_port_spec_file(path: impl AsRef<Path>) -> Result<String> {
    let path = path.as_ref();
    let content = fs::read_to_string(path).map_err(|source| ScanError::SpecFile {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(join_spec_lines(&content))
}

/// The default port list rendered as a spec string.
pub fn default_port_spec() -> String {
    DEFAULT_PORTS
        .iter()
        .map(u16::to_string)
        .collect::<Vec<_>>()
        .join(",")
}

/// Strip comments and blank lines, then join the remaining entries with commas.
pub(crate) fn join_spec_lines(content: &str) -> String {
    content
        .lines()
        .map(|line| line.split('#').next().map(str::trim).unwrap_or(""))
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join(",")
}

fn parse_port_str(spec: &str, s: &str) -> Result<u16> {
    let val: u32 = s
        .parse::<u32>()
        .map_err(|_| ScanError::ports(spec, format!("not a port number: '{s}'")))?;
    if val == 0 || val > 65535 {
        return Err(ScanError::ports(spec, format!("port out of range: {val}")));
    }
    Ok(val as u16)
}
