//! Access-log line parser.
//!
//! Parses the node agent's access-log grammar: timestamp, source IP
//! (optionally prefixed `tcp:`/`udp:`), `accepted proto:dest:port`, a verdict
//! inside brackets after `>>` or `->`, and a trailing `email: <id>` field.
//! Lines that don't match are dropped rather than surfaced as an error — a
//! single malformed line must never take down ingestion.

use std::sync::LazyLock;

use chrono::{NaiveDateTime, TimeZone, Utc};
use domain::{Email, LogEntry, Protocol, SourceIp};
use regex::Regex;

static PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?x)
        ^(\d{4}/\d{2}/\d{2}\ \d{2}:\d{2}:\d{2}\.\d+)\s+   # timestamp
        from\s+(?:tcp:|udp:)?(\d+\.\d+\.\d+\.\d+):\d+\s+ # source IP
        accepted\s+
        (tcp|udp):([^:]+):(\d+)\s+                        # protocol:destination:port
        \[.*?(?:>>|->)\s*(\w+(?:-\w+)?)\]\s+               # action
        email:\s*(\S+)                                     # email
        ",
    )
    .expect("access-log pattern is a fixed, valid regex")
});

const TIMESTAMP_FORMAT: &str = "%Y/%m/%d %H:%M:%S%.f";

/// Parse one access-log line into a [`LogEntry`].
///
/// Returns `None` for blank lines, lines that don't match the grammar, or
/// lines whose fields fail to convert to their typed form (invalid IP,
/// non-numeric port, empty email). Never panics.
#[must_use]
pub fn parse_line(line: &str) -> Option<LogEntry> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }

    let captures = PATTERN.captures(line)?;

    let timestamp = NaiveDateTime::parse_from_str(&captures[1], TIMESTAMP_FORMAT).ok()?;
    let timestamp = Utc.from_utc_datetime(&timestamp);

    let source_ip = SourceIp::parse(&captures[2]).ok()?;
    let protocol: Protocol = captures[3].parse().ok()?;
    let destination = captures[4].to_string();
    let destination_port: u16 = captures[5].parse().ok()?;
    let action = captures[6].to_string();
    let email = Email::new(&captures[7]).ok()?;

    Some(LogEntry {
        timestamp,
        source_ip,
        protocol,
        destination,
        destination_port,
        action,
        email,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_well_formed_direct_line() {
        let line = "2026/07/26 10:15:30.123456 from tcp:203.0.113.5:51000 accepted tcp:example.com:443 [socks >> DIRECT] email: alice@panel";
        let entry = parse_line(line).unwrap();
        assert_eq!(entry.source_ip.to_string(), "203.0.113.5");
        assert_eq!(entry.protocol, Protocol::Tcp);
        assert_eq!(entry.destination, "example.com");
        assert_eq!(entry.destination_port, 443);
        assert_eq!(entry.action, "DIRECT");
        assert_eq!(entry.email.as_str(), "alice@panel");
    }

    #[test]
    fn parses_udp_without_source_prefix() {
        let line = "2026/07/26 10:15:30.000001 from 198.51.100.9:6000 accepted udp:1.1.1.1:53 [socks -> shadow-out] email: bob";
        let entry = parse_line(line).unwrap();
        assert_eq!(entry.protocol, Protocol::Udp);
        assert_eq!(entry.action, "shadow-out");
    }

    #[test]
    fn parses_block_verdict_after_arrow() {
        let line = "2026/07/26 10:15:30.000001 from tcp:10.0.0.1:1234 accepted tcp:blocked.example:80 [block -> BLOCK] email: carol@panel";
        let entry = parse_line(line).unwrap();
        assert!(entry.is_blocked());
    }

    #[test]
    fn rejects_blank_line() {
        assert!(parse_line("").is_none());
        assert!(parse_line("   ").is_none());
    }

    #[test]
    fn rejects_malformed_line() {
        assert!(parse_line("not a log line at all").is_none());
    }

    #[test]
    fn rejects_invalid_source_ip() {
        let line = "2026/07/26 10:15:30.000001 from tcp:999.999.999.999:1234 accepted tcp:x:80 [DIRECT] email: a";
        assert!(parse_line(line).is_none());
    }
}
