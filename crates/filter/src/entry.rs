//! Policy entries and matching
//!
//! A policy entry is classified once, at configuration time, into one of
//! three shapes: an exact address, a CIDR block, or an inclusive
//! low..=high range. Matching is a pure numeric comparison; candidates
//! from the other address family never match.

use crate::addr::parse_addr;
use crate::error::ParseError;
use config::EntrySpec;
use std::fmt;
use std::net::IpAddr;

/// One compiled policy entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PolicyEntry {
    /// Matches a single address
    Exact(IpAddr),
    /// Matches every address whose first `prefix_len` bits equal the
    /// network's
    Cidr { network: IpAddr, prefix_len: u8 },
    /// Matches every address in the inclusive numeric range
    Range { low: IpAddr, high: IpAddr },
}

impl PolicyEntry {
    /// Classify one configured entry.
    pub fn parse(spec: &EntrySpec) -> Result<Self, ParseError> {
        match spec {
            EntrySpec::Single(text) => Self::parse_text(text),
            EntrySpec::Range(bounds) => Self::parse_range(bounds),
        }
    }

    /// Classify free-text: a `/` makes it a CIDR block, anything else is
    /// an exact address.
    pub fn parse_text(text: &str) -> Result<Self, ParseError> {
        let text = text.trim();

        if let Some((network_text, prefix_text)) = text.split_once('/') {
            let network = parse_addr(network_text)?;
            let max_prefix: u8 = match network {
                IpAddr::V4(_) => 32,
                IpAddr::V6(_) => 128,
            };

            let prefix_len = prefix_text
                .parse::<u8>()
                .ok()
                .filter(|len| *len <= max_prefix)
                .ok_or_else(|| ParseError::InvalidPrefix {
                    network,
                    prefix: prefix_text.to_string(),
                })?;

            return Ok(Self::Cidr {
                network,
                prefix_len,
            });
        }

        Ok(Self::Exact(parse_addr(text)?))
    }

    /// A one-element list degenerates to an exact address; a two-element
    /// list is an inclusive range.
    fn parse_range(bounds: &[String]) -> Result<Self, ParseError> {
        match bounds {
            [single] => Ok(Self::Exact(parse_addr(single)?)),
            [low_text, high_text] => {
                let low = parse_addr(low_text)?;
                let high = parse_addr(high_text)?;

                let ordered = match (low, high) {
                    (IpAddr::V4(lo), IpAddr::V4(hi)) => u32::from(lo) <= u32::from(hi),
                    (IpAddr::V6(lo), IpAddr::V6(hi)) => u128::from(lo) <= u128::from(hi),
                    _ => {
                        return Err(ParseError::InvalidRange(format!(
                            "{} and {} are in different address families",
                            low, high
                        )))
                    }
                };

                if !ordered {
                    return Err(ParseError::InvalidRange(format!(
                        "{} is above {}",
                        low, high
                    )));
                }

                Ok(Self::Range { low, high })
            }
            _ => Err(ParseError::InvalidRange(format!(
                "expected one or two addresses, got {}",
                bounds.len()
            ))),
        }
    }

    /// Whether the candidate is contained in this entry.
    pub fn matches(&self, ip: &IpAddr) -> bool {
        match self {
            Self::Exact(addr) => addr == ip,
            Self::Cidr {
                network,
                prefix_len,
            } => cidr_contains(network, *prefix_len, ip),
            Self::Range { low, high } => range_contains(low, high, ip),
        }
    }
}

impl fmt::Display for PolicyEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Exact(addr) => write!(f, "{}", addr),
            Self::Cidr {
                network,
                prefix_len,
            } => write!(f, "{}/{}", network, prefix_len),
            Self::Range { low, high } => write!(f, "{}-{}", low, high),
        }
    }
}

/// Compile a whole configured entry list, failing on the first bad entry.
pub fn parse_entries(specs: &[EntrySpec]) -> Result<Vec<PolicyEntry>, ParseError> {
    specs.iter().map(PolicyEntry::parse).collect()
}

fn cidr_contains(network: &IpAddr, prefix_len: u8, ip: &IpAddr) -> bool {
    match (network, ip) {
        (IpAddr::V4(net), IpAddr::V4(check)) => {
            let mask = if prefix_len == 0 {
                0
            } else {
                !0u32 << (32 - prefix_len)
            };
            (u32::from(*net) & mask) == (u32::from(*check) & mask)
        }
        (IpAddr::V6(net), IpAddr::V6(check)) => {
            let mask = if prefix_len == 0 {
                0
            } else {
                !0u128 << (128 - prefix_len)
            };
            (u128::from(*net) & mask) == (u128::from(*check) & mask)
        }
        _ => false, // IPv4 vs IPv6 mismatch
    }
}

fn range_contains(low: &IpAddr, high: &IpAddr, ip: &IpAddr) -> bool {
    match (low, high, ip) {
        (IpAddr::V4(lo), IpAddr::V4(hi), IpAddr::V4(check)) => {
            (u32::from(*lo)..=u32::from(*hi)).contains(&u32::from(*check))
        }
        (IpAddr::V6(lo), IpAddr::V6(hi), IpAddr::V6(check)) => {
            (u128::from(*lo)..=u128::from(*hi)).contains(&u128::from(*check))
        }
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ip(s: &str) -> IpAddr {
        s.parse().unwrap()
    }

    #[test]
    fn test_classify_exact() {
        let entry = PolicyEntry::parse_text("127.0.0.1").unwrap();
        assert_eq!(entry, PolicyEntry::Exact(ip("127.0.0.1")));

        let entry = PolicyEntry::parse_text("2001:4860:8006::62").unwrap();
        assert!(matches!(entry, PolicyEntry::Exact(IpAddr::V6(_))));
    }

    #[test]
    fn test_classify_cidr() {
        let entry = PolicyEntry::parse_text("192.168.1.0/24").unwrap();
        assert_eq!(
            entry,
            PolicyEntry::Cidr {
                network: ip("192.168.1.0"),
                prefix_len: 24
            }
        );

        let entry = PolicyEntry::parse_text("2001:db8::/32").unwrap();
        assert!(matches!(entry, PolicyEntry::Cidr { prefix_len: 32, .. }));
    }

    #[test]
    fn test_classify_range() {
        let bounds = vec!["127.0.0.1".to_string(), "127.0.0.3".to_string()];
        let entry = PolicyEntry::parse(&EntrySpec::Range(bounds)).unwrap();
        assert_eq!(
            entry,
            PolicyEntry::Range {
                low: ip("127.0.0.1"),
                high: ip("127.0.0.3")
            }
        );
    }

    #[test]
    fn test_one_element_range_is_exact() {
        let entry = PolicyEntry::parse(&EntrySpec::Range(vec!["127.0.0.1".to_string()])).unwrap();
        assert_eq!(entry, PolicyEntry::Exact(ip("127.0.0.1")));
    }

    #[test]
    fn test_prefix_out_of_range() {
        assert!(matches!(
            PolicyEntry::parse_text("127.0.0.1/33"),
            Err(ParseError::InvalidPrefix { .. })
        ));
        assert!(matches!(
            PolicyEntry::parse_text("2001:db8::/129"),
            Err(ParseError::InvalidPrefix { .. })
        ));
        assert!(matches!(
            PolicyEntry::parse_text("127.0.0.1/abc"),
            Err(ParseError::InvalidPrefix { .. })
        ));

        // Full-width prefixes are legal
        assert!(PolicyEntry::parse_text("127.0.0.1/32").is_ok());
        assert!(PolicyEntry::parse_text("2001:db8::/128").is_ok());
    }

    #[test]
    fn test_range_validation() {
        let reversed = EntrySpec::Range(vec!["127.0.0.3".to_string(), "127.0.0.1".to_string()]);
        assert!(matches!(
            PolicyEntry::parse(&reversed),
            Err(ParseError::InvalidRange(_))
        ));

        let mixed = EntrySpec::Range(vec!["127.0.0.1".to_string(), "::1".to_string()]);
        assert!(matches!(
            PolicyEntry::parse(&mixed),
            Err(ParseError::InvalidRange(_))
        ));

        let three = EntrySpec::Range(vec![
            "127.0.0.1".to_string(),
            "127.0.0.2".to_string(),
            "127.0.0.3".to_string(),
        ]);
        assert!(PolicyEntry::parse(&three).is_err());
    }

    #[test]
    fn test_exact_match() {
        let entry = PolicyEntry::Exact(ip("127.0.0.1"));
        assert!(entry.matches(&ip("127.0.0.1")));
        assert!(!entry.matches(&ip("127.0.0.2")));
    }

    #[test]
    fn test_mapped_candidate_matches_exact_entry() {
        let entry = PolicyEntry::parse_text("127.0.0.1").unwrap();
        let candidate = parse_addr("::ffff:127.0.0.1").unwrap();
        assert!(entry.matches(&candidate));
    }

    #[test]
    fn test_cidr_contains_ipv4() {
        // 127.0.0.1/28 covers 127.0.0.0 - 127.0.0.15
        let entry = PolicyEntry::parse_text("127.0.0.1/28").unwrap();

        assert!(entry.matches(&ip("127.0.0.1")));
        assert!(entry.matches(&ip("127.0.0.14")));
        assert!(!entry.matches(&ip("127.0.0.17")));
        assert!(!entry.matches(&ip("10.0.0.1")));
    }

    #[test]
    fn test_cidr_contains_ipv6() {
        let entry = PolicyEntry::parse_text("2001:4860:8007::62/64").unwrap();

        assert!(entry.matches(&ip("2001:4860:8007:0::62")));
        assert!(entry.matches(&ip("2001:4860:8007::1")));
        assert!(!entry.matches(&ip("2001:4860:8008::62")));
    }

    #[test]
    fn test_cidr_zero_prefix_matches_family() {
        let entry = PolicyEntry::parse_text("0.0.0.0/0").unwrap();
        assert!(entry.matches(&ip("192.168.1.1")));
        assert!(entry.matches(&ip("10.0.0.1")));
        // Family mismatch still loses
        assert!(!entry.matches(&ip("::1")));
    }

    #[test]
    fn test_range_bounds_inclusive() {
        let entry = PolicyEntry::Range {
            low: ip("127.0.0.1"),
            high: ip("127.0.0.3"),
        };

        assert!(entry.matches(&ip("127.0.0.1")));
        assert!(entry.matches(&ip("127.0.0.2")));
        assert!(entry.matches(&ip("127.0.0.3")));
        assert!(!entry.matches(&ip("127.0.0.4")));
        assert!(!entry.matches(&ip("127.0.0.0")));
    }

    #[test]
    fn test_cross_family_never_matches() {
        let v4_range = PolicyEntry::Range {
            low: ip("0.0.0.0"),
            high: ip("255.255.255.255"),
        };
        assert!(!v4_range.matches(&ip("::1")));

        let v6_cidr = PolicyEntry::parse_text("::/0").unwrap();
        assert!(!v6_cidr.matches(&ip("127.0.0.1")));

        let v4_exact = PolicyEntry::Exact(ip("0.0.0.1"));
        assert!(!v4_exact.matches(&ip("::1")));
    }

    #[test]
    fn test_parse_entries_fails_on_bad_entry() {
        let specs = vec![
            EntrySpec::Single("127.0.0.1".to_string()),
            EntrySpec::Single("not-an-ip".to_string()),
        ];
        assert!(parse_entries(&specs).is_err());
    }

    #[test]
    fn test_display() {
        assert_eq!(
            PolicyEntry::parse_text("127.0.0.1").unwrap().to_string(),
            "127.0.0.1"
        );
        assert_eq!(
            PolicyEntry::parse_text("10.0.0.0/8").unwrap().to_string(),
            "10.0.0.0/8"
        );
        let range = PolicyEntry::Range {
            low: ip("127.0.0.1"),
            high: ip("127.0.0.3"),
        };
        assert_eq!(range.to_string(), "127.0.0.1-127.0.0.3");
    }
}
