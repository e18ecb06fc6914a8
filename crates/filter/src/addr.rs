//! Address parsing and normalization
//!
//! Connection metadata and forwarding headers carry addresses in several
//! textual forms: dotted-quad IPv4, bare or bracketed IPv6, any of them
//! with a `:port` suffix, and the IPv4-mapped IPv6 form proxies like to
//! emit. Everything is normalized here into a plain [`IpAddr`] so the
//! matchers only ever compare numeric values within one family.

use crate::error::ParseError;
use std::net::{IpAddr, Ipv6Addr};

/// Parse a textual address as it appears in connection metadata or
/// forwarding headers.
///
/// A trailing `:port` is stripped from IPv4 and bracketed IPv6 forms. A
/// bare IPv6 address contains colons that are not port separators, so a
/// port is only stripped when the text does not already parse as an
/// address and the remainder does. IPv4-mapped IPv6 addresses
/// (`::ffff:a.b.c.d`) are normalized to their embedded IPv4 value so
/// they compare equal to plain IPv4 policy entries.
pub fn parse_addr(text: &str) -> Result<IpAddr, ParseError> {
    let text = text.trim();

    // Bracketed IPv6: "[::1]" or "[::1]:8080"
    if let Some(rest) = text.strip_prefix('[') {
        if let Some((inner, suffix)) = rest.split_once(']') {
            if suffix.is_empty() || suffix.starts_with(':') {
                if let Ok(ip) = inner.parse::<Ipv6Addr>() {
                    return Ok(normalize_mapped(IpAddr::V6(ip)));
                }
            }
        }
        return Err(ParseError::InvalidAddress(text.to_string()));
    }

    if let Ok(ip) = text.parse::<IpAddr>() {
        return Ok(normalize_mapped(ip));
    }

    // "1.2.3.4:8080", or a mapped form with a port tacked on by a proxy
    // ("::ffff:1.2.3.4:8080").
    if let Some((host, port)) = text.rsplit_once(':') {
        if !port.is_empty() && port.bytes().all(|b| b.is_ascii_digit()) {
            if let Ok(ip) = host.parse::<IpAddr>() {
                return Ok(normalize_mapped(ip));
            }
        }
    }

    Err(ParseError::InvalidAddress(text.to_string()))
}

fn normalize_mapped(ip: IpAddr) -> IpAddr {
    match ip {
        IpAddr::V6(v6) => match v6.to_ipv4_mapped() {
            Some(v4) => IpAddr::V4(v4),
            None => IpAddr::V6(v6),
        },
        v4 => v4,
    }
}
