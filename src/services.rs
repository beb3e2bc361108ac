/// Well-known TCP ports and the service usually found behind them.
const SERVICES: &[(u16, &str)] = &[
    (21, "FTP"),
    (22, "SSH"),
    (23, "Telnet"),
    (25, "SMTP"),
    (53, "DNS"),
    (80, "HTTP"),
    (110, "POP3"),
    (111, "RPC"),
    (135, "MSRPC"),
    (139, "NetBIOS"),
    (143, "IMAP"),
    (443, "HTTPS"),
    (445, "SMB"),
    (465, "SMTPS"),
    (587, "Submission"),
    (993, "IMAPS"),
    (995, "POP3S"),
    (1433, "MSSQL"),
    (1521, "Oracle"),
    (1723, "PPTP"),
    (1883, "MQTT"),
    (2049, "NFS"),
    (3306, "MySQL"),
    (3389, "RDP"),
    (5432, "PostgreSQL"),
    (5672, "AMQP"),
    (5900, "VNC"),
    (6379, "Redis"),
    (8080, "HTTP-Proxy"),
    (8443, "HTTPS-Alt"),
    (9200, "Elasticsearch"),
    (11211, "Memcached"),
    (27017, "MongoDB"),
];

pub fn lookup(port: u16) -> Option<&'static str> {
    SERVICES
        .binary_search_by_key(&port, |&(p, _)| p)
        .ok()
        .map(|i| SERVICES[i].1)
}

/// Combine the table entry for `port` with an optional raw banner.
pub fn service_hint(port: u16, banner: Option<&str>) -> Option<String> {
    match (lookup(port), banner) {
        (Some(name), Some(b)) => Some(format!("{name} ({b})")),
        (Some(name), None) => Some(name.to_string()),
        (None, Some(b)) => Some(b.to_string()),
        (None, None) => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_is_sorted_for_binary_search() {
        assert!(SERVICES.windows(2).all(|w| w[0].0 < w[1].0));
    }

    #[test]
    fn hints_combine_table_and_banner() {
        assert_eq!(service_hint(22, Some("SSH-2.0-OpenSSH_9.6")).as_deref(), Some("SSH (SSH-2.0-OpenSSH_9.6)"));
        assert_eq!(service_hint(80, None).as_deref(), Some("HTTP"));
        assert_eq!(service_hint(31337, Some("hello")).as_deref(), Some("hello"));
        assert_eq!(service_hint(31337, None), None);
    }
}
