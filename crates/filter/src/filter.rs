//! The compiled IP filter
//!
//! Construction compiles the configuration once — policy entries, trust
//! policy, exclusion patterns — and fails loudly on anything it cannot
//! interpret. Each request is then a pure evaluation over immutable
//! state: route exclusion, address resolution, policy match, one
//! decision, at most one log line.

use crate::addr::parse_addr;
use crate::entry::{parse_entries, PolicyEntry};
use crate::error::{IpDeniedError, Result};
use crate::resolve::resolve_client_ip;
use crate::source::{PolicySource, StaticSource};
use crate::trust::TrustPolicy;
use config::{FilterConfig, LogLevel, Mode};
use regex::Regex;
use std::net::IpAddr;
use std::sync::Arc;
use tracing::{debug, info};

/// Request metadata consumed by the filter.
///
/// This is the whole boundary to the surrounding request pipeline: the
/// direct connection address as reported by the socket, the request path
/// for exclusion matching, and the raw header pairs.
#[derive(Debug, Clone, Default)]
pub struct RequestMeta {
    /// Direct connection address, possibly carrying a port suffix
    pub remote_addr: Option<String>,
    /// Request path, matched against exclusion patterns
    pub path: Option<String>,
    /// Header name/value pairs; names compare case-insensitively
    pub headers: Vec<(String, String)>,
}

impl RequestMeta {
    /// Look up a header value by case-insensitive name.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(header, _)| header.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}

/// Outcome of one filtering decision.
#[derive(Debug, Clone)]
pub struct Decision {
    /// Whether the request may proceed
    pub admit: bool,
    /// Candidate address the policy was evaluated against, when one
    /// could be resolved
    pub resolved: Option<IpAddr>,
    /// A policy entry containing the candidate, if any matched
    pub matched: Option<PolicyEntry>,
    /// Exclusion pattern that bypassed filtering, if any
    pub excluded: Option<String>,
}

/// Caller-supplied address detection override.
///
/// Bypasses header-based resolution entirely; the returned text is still
/// parsed and normalized like any other candidate.
pub type DetectIp = Arc<dyn Fn(&RequestMeta) -> Option<String> + Send + Sync>;

/// Destination for decision log lines.
pub type LogSink = Arc<dyn Fn(&str) + Send + Sync>;

/// Compiled IP filter, safe to share across concurrent requests.
#[derive(Clone)]
pub struct IpFilter {
    mode: Mode,
    source: Arc<dyn PolicySource>,
    trust: TrustPolicy,
    allowed_headers: Vec<String>,
    excluding: Vec<Regex>,
    detect_ip: Option<DetectIp>,
    log: bool,
    log_level: LogLevel,
    sink: LogSink,
}

impl IpFilter {
    /// Compile a filter from configuration.
    ///
    /// Fails when a policy entry, trust value, or exclusion pattern does
    /// not parse; a bad policy must never silently become "never
    /// matches".
    pub fn from_config(config: &FilterConfig) -> Result<Self> {
        let entries = parse_entries(&config.entries)?;
        let trust = TrustPolicy::compile(&config.trust_proxy)?;
        let excluding = config
            .excluding
            .iter()
            .map(|pattern| Regex::new(pattern))
            .collect::<std::result::Result<Vec<_>, _>>()?;

        debug!(
            entries = entries.len(),
            excluding = excluding.len(),
            mode = ?config.mode,
            "Compiled IP filter"
        );

        Ok(Self {
            mode: config.mode,
            source: Arc::new(StaticSource::new(entries)),
            trust,
            allowed_headers: config.allowed_headers.clone(),
            excluding,
            detect_ip: None,
            log: config.log,
            log_level: config.log_level,
            sink: default_sink(),
        })
    }

    /// Replace the policy source, e.g. with a late-bound entry list.
    pub fn with_source(mut self, source: impl PolicySource + 'static) -> Self {
        self.source = Arc::new(source);
        self
    }

    /// Replace the trust policy, e.g. with a custom predicate.
    pub fn with_trust(mut self, trust: TrustPolicy) -> Self {
        self.trust = trust;
        self
    }

    /// Install a custom address detector.
    pub fn with_detector(
        mut self,
        detect: impl Fn(&RequestMeta) -> Option<String> + Send + Sync + 'static,
    ) -> Self {
        self.detect_ip = Some(Arc::new(detect));
        self
    }

    /// Redirect decision log lines away from the default tracing sink.
    pub fn with_sink(mut self, sink: impl Fn(&str) + Send + Sync + 'static) -> Self {
        self.sink = Arc::new(sink);
        self
    }

    /// Decide whether a request may proceed.
    pub fn check(&self, req: &RequestMeta) -> Decision {
        if let Some(pattern) = self.excluded_pattern(req) {
            self.emit_allow(&format!("Access granted for excluded path: {}", pattern));
            return Decision {
                admit: true,
                resolved: None,
                matched: None,
                excluded: Some(pattern.to_string()),
            };
        }

        let ip = match self.detect(req) {
            Some(ip) => ip,
            None => {
                // No resolvable candidate: the safe answer is a denial,
                // whatever the mode
                self.emit_deny("Access denied to IP address: unknown");
                return Decision {
                    admit: false,
                    resolved: None,
                    matched: None,
                    excluded: None,
                };
            }
        };

        let matched = self.source.entries().into_iter().find(|e| e.matches(&ip));
        let admit = match self.mode {
            Mode::Allow => matched.is_some(),
            Mode::Deny => matched.is_none(),
        };

        if admit {
            self.emit_allow(&format!("Access granted to IP address: {}", ip));
        } else {
            self.emit_deny(&format!("Access denied to IP address: {}", ip));
        }

        Decision {
            admit,
            resolved: Some(ip),
            matched,
            excluded: None,
        }
    }

    /// Like [`check`](Self::check), but maps a rejection to an
    /// [`IpDeniedError`].
    pub fn enforce(&self, req: &RequestMeta) -> std::result::Result<Decision, IpDeniedError> {
        let decision = self.check(req);
        if decision.admit {
            Ok(decision)
        } else {
            Err(match decision.resolved {
                Some(ip) => IpDeniedError::new(ip.to_string()),
                None => IpDeniedError::unknown(),
            })
        }
    }

    fn detect(&self, req: &RequestMeta) -> Option<IpAddr> {
        if let Some(detect) = &self.detect_ip {
            let text = detect(req)?;
            return match parse_addr(&text) {
                Ok(ip) => Some(ip),
                Err(error) => {
                    debug!(error = %error, "Custom detector produced an unparsable address");
                    None
                }
            };
        }

        let forwarded: Vec<&str> = self
            .allowed_headers
            .iter()
            .filter_map(|name| req.header(name))
            .collect();

        resolve_client_ip(req.remote_addr.as_deref(), &forwarded, &self.trust)
    }

    fn excluded_pattern(&self, req: &RequestMeta) -> Option<&str> {
        let path = req.path.as_deref()?;
        self.excluding
            .iter()
            .find(|pattern| pattern.is_match(path))
            .map(|pattern| pattern.as_str())
    }

    fn emit_allow(&self, message: &str) {
        if self.log && self.log_level != LogLevel::Deny {
            (self.sink)(message);
        }
    }

    fn emit_deny(&self, message: &str) {
        if self.log && self.log_level != LogLevel::Allow {
            (self.sink)(message);
        }
    }
}

fn default_sink() -> LogSink {
    Arc::new(|message: &str| info!("{}", message))
}
