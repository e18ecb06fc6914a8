//! Proxy trust policies
//!
//! The configuration accepts several spellings for proxy trust (boolean,
//! hop count, comma-separated string, address list). All of them are
//! normalized once, at construction, into a single canonical policy that
//! is then evaluated uniformly per hop.

use crate::entry::PolicyEntry;
use crate::error::ParseError;
use config::TrustProxySpec;
use std::fmt;
use std::net::IpAddr;
use std::sync::Arc;

/// Caller-supplied trust predicate over (address, hop index).
pub type TrustPredicate = Arc<dyn Fn(&IpAddr, usize) -> bool + Send + Sync>;

/// Decides whether a hop in the proxy chain is a trusted proxy.
///
/// Hop indices count from the server side: the direct connection is hop
/// 0, the nearest forwarded address hop 1, and so on outward.
#[derive(Clone)]
pub enum TrustPolicy {
    /// Trust every hop
    All,
    /// Trust no hop
    None,
    /// Trust the nearest `n` hops
    Hops(usize),
    /// Trust hops whose address matches one of the entries (exact
    /// addresses or CIDR blocks)
    Proxies(Vec<PolicyEntry>),
    /// Caller-supplied predicate
    Custom(TrustPredicate),
}

impl TrustPolicy {
    /// Normalize a configured trust value into a canonical policy.
    ///
    /// Fails when a listed proxy address does not parse; a bad trust
    /// list must not silently widen or narrow the trusted set.
    pub fn compile(spec: &TrustProxySpec) -> Result<Self, ParseError> {
        match spec {
            TrustProxySpec::Flag(true) => Ok(Self::All),
            TrustProxySpec::Flag(false) => Ok(Self::None),
            TrustProxySpec::Hops(n) => Ok(Self::Hops(*n as usize)),
            TrustProxySpec::Csv(text) => Self::from_proxies(text.split(',')),
            TrustProxySpec::List(items) => Self::from_proxies(items.iter().map(String::as_str)),
        }
    }

    fn from_proxies<'a>(items: impl Iterator<Item = &'a str>) -> Result<Self, ParseError> {
        let entries = items
            .map(str::trim)
            .filter(|text| !text.is_empty())
            .map(PolicyEntry::parse_text)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self::Proxies(entries))
    }

    /// Whether the hop at `index` (0 = socket-adjacent) is trusted.
    pub fn trusts(&self, addr: &IpAddr, index: usize) -> bool {
        match self {
            Self::All => true,
            Self::None => false,
            Self::Hops(n) => index < *n,
            Self::Proxies(entries) => entries.iter().any(|entry| entry.matches(addr)),
            Self::Custom(predicate) => predicate(addr, index),
        }
    }
}

impl fmt::Debug for TrustPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::All => write!(f, "All"),
            Self::None => write!(f, "None"),
            Self::Hops(n) => f.debug_tuple("Hops").field(n).finish(),
            Self::Proxies(entries) => f.debug_tuple("Proxies").field(entries).finish(),
            Self::Custom(_) => write!(f, "Custom(..)"),
        }
    }
}
