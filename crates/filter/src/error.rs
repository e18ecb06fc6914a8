//! Error types for rampart-filter

use std::net::IpAddr;
use thiserror::Error;

/// Failure to interpret textual address data.
///
/// Local and recoverable: a bad per-request candidate degrades to the
/// unknown-address sentinel, while a bad policy or trust entry fails
/// filter construction.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("Invalid IP address: '{0}'")]
    InvalidAddress(String),

    #[error("Invalid prefix length '{prefix}' for network {network}")]
    InvalidPrefix { network: IpAddr, prefix: String },

    #[error("Invalid address range: {0}")]
    InvalidRange(String),
}

/// Construction-time failure: the filter must not be built from a policy
/// it cannot fully interpret.
#[derive(Debug, Error)]
pub enum FilterError {
    #[error("Invalid policy entry: {0}")]
    Policy(#[from] ParseError),

    #[error("Invalid exclusion pattern: {0}")]
    Pattern(#[from] regex::Error),
}

pub type Result<T> = std::result::Result<T, FilterError>;

/// A policy rejection, carrying the address that was turned away.
///
/// This is a decision, not a fault: callers surface it as a structured
/// denial (typically a 403) rather than an unexpected failure.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub struct IpDeniedError {
    addr: Option<String>,
}

impl std::fmt::Display for IpDeniedError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.addr {
            Some(addr) => write!(f, "Access denied to IP address: {}", addr),
            None => write!(f, "The requesting IP was denied"),
        }
    }
}

impl IpDeniedError {
    pub fn new(addr: impl Into<String>) -> Self {
        Self {
            addr: Some(addr.into()),
        }
    }

    /// Rejection of a request whose address could not be resolved.
    pub fn unknown() -> Self {
        Self { addr: None }
    }

    /// The rejected address, when one was resolved.
    pub fn addr(&self) -> Option<&str> {
        self.addr.as_deref()
    }

    /// Suggested HTTP status for surfacing this rejection.
    pub fn status(&self) -> u16 {
        403
    }
}
