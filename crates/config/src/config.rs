//! Configuration structures and parsing for rampart

use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

/// Configuration error
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),
}

/// Root configuration structure for one filter instance
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FilterConfig {
    /// Whether the entries form a whitelist or a blacklist
    #[serde(default)]
    pub mode: Mode,

    /// Policy entries: single addresses, CIDR blocks, or [low, high] ranges
    #[serde(default)]
    pub entries: Vec<EntrySpec>,

    /// Emit one log line per decision
    #[serde(default = "default_log")]
    pub log: bool,

    /// Which decisions get logged
    #[serde(default)]
    pub log_level: LogLevel,

    /// Regex patterns for request paths that bypass filtering entirely
    #[serde(default)]
    pub excluding: Vec<String>,

    /// Which proxy hops to trust when resolving the client address
    #[serde(default)]
    pub trust_proxy: TrustProxySpec,

    /// Forwarding headers consulted during resolution, in priority order.
    /// An empty list disables header-based resolution.
    #[serde(default = "default_allowed_headers")]
    pub allowed_headers: Vec<String>,
}

impl FilterConfig {
    /// Load configuration from a file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: FilterConfig = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    ///
    /// Shape-level checks only; address syntax is checked when the filter
    /// is compiled.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for entry in &self.entries {
            if let EntrySpec::Range(bounds) = entry {
                if bounds.is_empty() || bounds.len() > 2 {
                    return Err(ConfigError::Validation(format!(
                        "Range entries take one or two addresses, got {}",
                        bounds.len()
                    )));
                }
            }
        }

        for pattern in &self.excluding {
            if pattern.is_empty() {
                return Err(ConfigError::Validation(
                    "Exclusion patterns must not be empty".to_string(),
                ));
            }
        }

        if let TrustProxySpec::Hops(hops) = &self.trust_proxy {
            // A chain longer than this is not a plausible proxy topology
            if *hops > 255 {
                return Err(ConfigError::Validation(format!(
                    "Trusted hop count {} is out of range",
                    hops
                )));
            }
        }

        Ok(())
    }
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            mode: Mode::default(),
            entries: Vec::new(),
            log: default_log(),
            log_level: LogLevel::default(),
            excluding: Vec::new(),
            trust_proxy: TrustProxySpec::default(),
            allowed_headers: default_allowed_headers(),
        }
    }
}

fn default_log() -> bool {
    true
}

fn default_allowed_headers() -> Vec<String> {
    vec!["x-forwarded-for".to_string()]
}

/// Filtering mode: admit only matches, or admit only non-matches
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    /// Entries form a whitelist
    Allow,
    /// Entries form a blacklist
    #[default]
    Deny,
}

/// Which decisions produce a log line
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogLevel {
    /// Log granted and denied decisions
    #[default]
    All,
    /// Log granted decisions only
    Allow,
    /// Log denied decisions only
    Deny,
}

/// One policy entry as written in the configuration.
///
/// A string is a single address or a CIDR block; an array of one or two
/// addresses is an exact address or an inclusive range. Classification
/// into the matcher's three shapes happens once, at compile time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EntrySpec {
    /// "10.1.2.3" or "10.0.0.0/8"
    Single(String),
    /// ["10.1.2.3"] or ["10.1.2.0", "10.1.2.63"]
    Range(Vec<String>),
}

/// Proxy trust as written in the configuration.
///
/// Accepts the same spellings as the original express-style setting:
/// a boolean, a trusted hop count, a comma-separated address string, or
/// an address list. Addresses may be exact or CIDR blocks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TrustProxySpec {
    /// Trust every hop (true) or none (false)
    Flag(bool),
    /// Trust the nearest n hops counting from the server side
    Hops(u32),
    /// "10.0.0.1,10.0.0.2" or "10.0.0.0/8"
    Csv(String),
    /// ["10.0.0.1", "192.168.0.0/16"]
    List(Vec<String>),
}

impl Default for TrustProxySpec {
    fn default() -> Self {
        Self::Flag(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config: FilterConfig = toml::from_str("").unwrap();

        assert_eq!(config.mode, Mode::Deny);
        assert!(config.entries.is_empty());
        assert!(config.log);
        assert_eq!(config.log_level, LogLevel::All);
        assert!(config.excluding.is_empty());
        assert_eq!(config.trust_proxy, TrustProxySpec::Flag(false));
        assert_eq!(config.allowed_headers, vec!["x-forwarded-for".to_string()]);
    }

    #[test]
    fn test_parse_full_config() {
        let toml_str = r#"
            mode = "allow"
            entries = ["127.0.0.1", "10.0.0.0/8", ["192.168.1.1", "192.168.1.20"]]
            log = false
            log_level = "deny"
            excluding = ["/health.*"]
            trust_proxy = 2
            allowed_headers = ["x-forwarded-for", "cf-connecting-ip"]
        "#;

        let config: FilterConfig = toml::from_str(toml_str).unwrap();

        assert_eq!(config.mode, Mode::Allow);
        assert_eq!(config.entries.len(), 3);
        assert_eq!(
            config.entries[0],
            EntrySpec::Single("127.0.0.1".to_string())
        );
        assert_eq!(
            config.entries[1],
            EntrySpec::Single("10.0.0.0/8".to_string())
        );
        assert_eq!(
            config.entries[2],
            EntrySpec::Range(vec![
                "192.168.1.1".to_string(),
                "192.168.1.20".to_string()
            ])
        );
        assert!(!config.log);
        assert_eq!(config.log_level, LogLevel::Deny);
        assert_eq!(config.trust_proxy, TrustProxySpec::Hops(2));
        assert_eq!(config.allowed_headers.len(), 2);
    }

    #[test]
    fn test_trust_proxy_spellings() {
        let config: FilterConfig = toml::from_str("trust_proxy = true").unwrap();
        assert_eq!(config.trust_proxy, TrustProxySpec::Flag(true));

        let config: FilterConfig = toml::from_str("trust_proxy = 5").unwrap();
        assert_eq!(config.trust_proxy, TrustProxySpec::Hops(5));

        let config: FilterConfig =
            toml::from_str(r#"trust_proxy = "10.0.0.1,10.0.0.2""#).unwrap();
        assert_eq!(
            config.trust_proxy,
            TrustProxySpec::Csv("10.0.0.1,10.0.0.2".to_string())
        );

        let config: FilterConfig =
            toml::from_str(r#"trust_proxy = ["10.0.0.1", "192.168.0.0/16"]"#).unwrap();
        assert_eq!(
            config.trust_proxy,
            TrustProxySpec::List(vec![
                "10.0.0.1".to_string(),
                "192.168.0.0/16".to_string()
            ])
        );
    }

    #[test]
    fn test_entry_spec_from_json() {
        // Policies migrated from the JavaScript middleware arrive as JSON
        let entries: Vec<EntrySpec> = serde_json::from_str(
            r#"["127.0.0.1", "192.168.1.3/28", ["127.0.0.3", "127.0.0.35"]]"#,
        )
        .unwrap();

        assert_eq!(entries.len(), 3);
        assert!(matches!(entries[0], EntrySpec::Single(_)));
        assert!(matches!(entries[2], EntrySpec::Range(ref v) if v.len() == 2));
    }

    #[test]
    fn test_validate_range_arity() {
        let config = FilterConfig {
            entries: vec![EntrySpec::Range(vec![
                "127.0.0.1".to_string(),
                "127.0.0.2".to_string(),
                "127.0.0.3".to_string(),
            ])],
            ..Default::default()
        };

        assert!(matches!(
            config.validate(),
            Err(ConfigError::Validation(_))
        ));

        let config = FilterConfig {
            entries: vec![EntrySpec::Range(Vec::new())],
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_empty_exclusion() {
        let config = FilterConfig {
            excluding: vec![String::new()],
            ..Default::default()
        };

        assert!(matches!(
            config.validate(),
            Err(ConfigError::Validation(_))
        ));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
            mode = "allow"
            entries = ["127.0.0.1/28"]
            "#
        )
        .unwrap();

        let config = FilterConfig::load(file.path()).unwrap();
        assert_eq!(config.mode, Mode::Allow);
        assert_eq!(config.entries.len(), 1);
    }

    #[test]
    fn test_load_missing_file() {
        let err = FilterConfig::load("/nonexistent/rampart.toml").unwrap_err();
        assert!(matches!(err, ConfigError::Io(_)));
    }

    #[test]
    fn test_load_bad_toml() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "mode = ").unwrap();

        let err = FilterConfig::load(file.path()).unwrap_err();
        assert!(matches!(err, ConfigError::TomlParse(_)));
    }
}
