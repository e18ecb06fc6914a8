//! Client address resolution across proxy hops
//!
//! A request reaches the server through zero or more proxies. Each
//! forwarding header carries a chain of declared addresses, outermost
//! (client-declared) first; the direct connection is the innermost hop.
//! Resolution walks the chain from the socket-adjacent end outward,
//! skipping hops the trust policy vouches for; the first untrusted hop
//! is the candidate the policy gets evaluated against.

use crate::addr::parse_addr;
use crate::trust::TrustPolicy;
use std::net::IpAddr;
use tracing::debug;

/// Resolve the client address for a request.
///
/// `remote_addr` is the direct connection address; `forwarded` holds the
/// values of the enabled forwarding headers in priority order, each
/// possibly carrying a comma- or space-separated address chain.
///
/// When every hop is trusted the outermost declared address is used.
/// Returns `None` when no candidate can be produced — an unparsable hop
/// is never trusted, so a garbled chain resolves to unknown rather than
/// to whatever a proxy declared beyond it.
pub fn resolve_client_ip(
    remote_addr: Option<&str>,
    forwarded: &[&str],
    trust: &TrustPolicy,
) -> Option<IpAddr> {
    // Outermost first, direct connection last
    let mut chain: Vec<&str> = Vec::new();
    for value in forwarded {
        chain.extend(split_chain(value));
    }
    match remote_addr {
        Some(remote) if !remote.trim().is_empty() => chain.push(remote),
        _ => {}
    }

    if chain.is_empty() {
        debug!("No candidate address in request");
        return None;
    }

    // Walk from the socket-adjacent end toward the client
    for (index, text) in chain.iter().rev().enumerate() {
        match parse_addr(text) {
            Ok(addr) => {
                if !trust.trusts(&addr, index) {
                    return Some(addr);
                }
            }
            Err(error) => {
                debug!(hop = %text, error = %error, "Unparsable hop in proxy chain");
                return None;
            }
        }
    }

    // Every hop is trusted: fall back to the outermost declared address
    chain.first().and_then(|text| parse_addr(text).ok())
}

/// Split one forwarding-header value into declared addresses.
///
/// Both comma- and space-separated chains occur in the wild.
fn split_chain(value: &str) -> impl Iterator<Item = &str> {
    value
        .split([',', ' '])
        .map(str::trim)
        .filter(|part| !part.is_empty())
}
