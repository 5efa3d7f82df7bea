//! Host-range expansion for the Engine config's `sessions[]` list
//! (spec.md §6, supplemented per SPEC_FULL.md §3): lets one acceptor
//! entry describe a block of co-located venue gateways instead of one
//! line per host.
//!
//! Supported syntaxes:
//! - Single: `A.B.C.D:PORT`
//! - Range: `A.B.C.START-END:PORT`
//!
//! NOT supported (explicitly rejected): CIDR (`/`) and wildcard (`*`)
//! notations — any other subnet-crawl syntax is out of scope.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostEndpoint {
    pub ip: String,
    pub port: u16,
}

#[derive(Debug, Error)]
pub enum DiscoveryError {
    #[error("invalid host-range format: {0}")]
    InvalidFormat(String),
    #[error("unsupported syntax: {0}")]
    UnsupportedSyntax(String),
    #[error("invalid range: {0}")]
    InvalidRange(String),
}

/// Expands one `sessions[]` target string into one or more endpoints.
pub fn expand_target(target: &str) -> Result<Vec<HostEndpoint>, DiscoveryError> {
    if target.is_empty() {
        return Err(DiscoveryError::InvalidFormat("empty target string".to_owned()));
    }
    if target.contains('/') {
        return Err(DiscoveryError::UnsupportedSyntax(
            "CIDR notation is not supported (use explicit IP or range)".to_owned(),
        ));
    }
    if target.contains('*') {
        return Err(DiscoveryError::UnsupportedSyntax(
            "wildcard notation is not supported (use explicit IP or range)".to_owned(),
        ));
    }

    let colon_pos = target
        .rfind(':')
        .ok_or_else(|| DiscoveryError::InvalidFormat("missing port (expected HOST:PORT)".to_owned()))?;
    let host_part = &target[..colon_pos];
    let port_str = &target[colon_pos + 1..];
    if host_part.is_empty() {
        return Err(DiscoveryError::InvalidFormat("empty host part".to_owned()));
    }
    let port: u16 = port_str
        .parse()
        .map_err(|_| DiscoveryError::InvalidFormat(format!("invalid port: '{port_str}'")))?;

    let parts: Vec<&str> = host_part.splitn(4, '.').collect();
    if parts.len() != 4 {
        return Err(DiscoveryError::InvalidFormat(format!(
            "expected 4 octets, got {} in '{host_part}'",
            parts.len()
        )));
    }
    let prefix = format!(
        "{}.{}.{}",
        parse_octet(parts[0], "first octet")?,
        parse_octet(parts[1], "second octet")?,
        parse_octet(parts[2], "third octet")?,
    );
    let last_field = parts[3];

    if let Some(dash_pos) = last_field.find('-') {
        let start: u8 = parse_octet(&last_field[..dash_pos], "range start")?;
        let end: u8 = parse_octet(&last_field[dash_pos + 1..], "range end")?;
        if start > end {
            return Err(DiscoveryError::InvalidRange(format!(
                "range start {start} > end {end} in '{target}'"
            )));
        }
        Ok((start..=end)
            .map(|octet| HostEndpoint {
                ip: format!("{prefix}.{octet}"),
                port,
            })
            .collect())
    } else {
        let octet = parse_octet(last_field, "fourth octet")?;
        Ok(vec![HostEndpoint {
            ip: format!("{prefix}.{octet}"),
            port,
        }])
    }
}

fn parse_octet(s: &str, field: &str) -> Result<u8, DiscoveryError> {
    s.parse()
        .map_err(|_| DiscoveryError::InvalidFormat(format!("invalid {field}: '{s}'")))
}
