//! Shared configuration for the Easel bridge
//!
//! This crate provides the single source of truth for the relay bind
//! address, frontend asset location, pipeline host URL, and feature
//! toggles, shared by the relay server and the pipeline node adapters.
//!
//! Every knob reads an `EASEL_*` environment variable first and falls
//! back to the older `CANVAS_*` name where one existed; when both are
//! set the `EASEL_*` value wins.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Default relay bind host
pub const DEFAULT_BIND_HOST: &str = "127.0.0.1";

/// Default relay port
pub const DEFAULT_PORT: u16 = 8765;

/// Default pipeline host base URL
pub const DEFAULT_PIPELINE_URL: &str = "http://127.0.0.1:8188";

/// Default frontend asset directory, relative to the working directory
pub const DEFAULT_FRONTEND_DIR: &str = "frontend";

/// Bridge configuration shared by the relay and the node adapters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BridgeConfig {
    /// Host the relay binds to (and the nodes connect to)
    pub bind_host: String,
    /// Port the relay binds to
    pub port: u16,
    /// Directory holding the browser UI bundle
    pub frontend_dir: PathBuf,
    /// Base URL of the pipeline host's own HTTP API
    pub pipeline_url: String,
    /// Verbose event logging toggle
    pub debug: bool,
    /// Fire the stored trigger payload after each successful input push
    pub auto_forward: bool,
    /// When set, every pushed output image is also written to this directory
    pub dump_dir: Option<PathBuf>,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            bind_host: DEFAULT_BIND_HOST.to_string(),
            port: DEFAULT_PORT,
            frontend_dir: PathBuf::from(DEFAULT_FRONTEND_DIR),
            pipeline_url: DEFAULT_PIPELINE_URL.to_string(),
            debug: true,
            auto_forward: true,
            dump_dir: None,
        }
    }
}

impl BridgeConfig {
    /// Build the configuration from process environment variables.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the configuration from an arbitrary variable source.
    ///
    /// The relay constructs this once at startup with the process
    /// environment; tests supply a closure over a map instead.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let port = match pair(&lookup, "EASEL_PORT", Some("CANVAS_BRIDGE_PORT")) {
            Some(raw) => match raw.trim().parse::<u16>() {
                Ok(port) => port,
                Err(_) => {
                    tracing::warn!("Invalid port {raw:?}, using default {DEFAULT_PORT}");
                    DEFAULT_PORT
                }
            },
            None => DEFAULT_PORT,
        };

        Self {
            bind_host: pair(&lookup, "EASEL_BIND_HOST", Some("CANVAS_BRIDGE_HOST"))
                .unwrap_or(defaults.bind_host),
            port,
            frontend_dir: pair(&lookup, "EASEL_FRONTEND_DIR", Some("CANVAS_FRONTEND_DIR"))
                .map(PathBuf::from)
                .unwrap_or(defaults.frontend_dir),
            pipeline_url: pair(&lookup, "EASEL_PIPELINE_URL", Some("CANVAS_PIPELINE_URL"))
                .map(|url| url.trim_end_matches('/').to_string())
                .unwrap_or(defaults.pipeline_url),
            debug: pair(&lookup, "EASEL_DEBUG", Some("CANVAS_DEBUG"))
                .map(|raw| parse_flag(&raw))
                .unwrap_or(defaults.debug),
            auto_forward: pair(&lookup, "EASEL_AUTORUN", None)
                .map(|raw| parse_flag(&raw))
                .unwrap_or(defaults.auto_forward),
            dump_dir: pair(&lookup, "EASEL_DUMP_DIR", None).map(PathBuf::from),
        }
    }

    /// Socket address string the relay listens on
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.bind_host, self.port)
    }

    /// Browser-facing URL of the relay
    pub fn url(&self) -> String {
        format!("http://{}:{}/", self.bind_host, self.port)
    }

    /// Base URL node adapters use to reach the relay
    pub fn bridge_url(&self) -> String {
        format!("http://{}:{}", self.bind_host, self.port)
    }
}

/// Read the new-style variable, falling back to the legacy name.
fn pair<F>(lookup: &F, new: &str, legacy: Option<&str>) -> Option<String>
where
    F: Fn(&str) -> Option<String>,
{
    lookup(new)
        .or_else(|| legacy.and_then(|key| lookup(key)))
        .filter(|value| !value.trim().is_empty())
}

/// Toggle parsing: `0`, `false`, and `False` disable, anything else enables.
fn parse_flag(raw: &str) -> bool {
    !matches!(raw.trim(), "0" | "false" | "False" | "FALSE")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from<'a>(vars: &'a [(&'a str, &'a str)]) -> impl Fn(&str) -> Option<String> + 'a {
        let map: HashMap<&str, &str> = vars.iter().copied().collect();
        move |key: &str| map.get(key).map(|value| value.to_string())
    }

    #[test]
    fn test_default_config() {
        let config = BridgeConfig::from_lookup(|_| None);
        assert_eq!(config.bind_host, DEFAULT_BIND_HOST);
        assert_eq!(config.port, DEFAULT_PORT);
        assert_eq!(config.pipeline_url, DEFAULT_PIPELINE_URL);
        assert!(config.debug);
        assert!(config.auto_forward);
        assert!(config.dump_dir.is_none());
    }

    #[test]
    fn test_new_style_wins_over_legacy() {
        let vars = [
            ("EASEL_PORT", "9100"),
            ("CANVAS_BRIDGE_PORT", "9200"),
            ("EASEL_BIND_HOST", "0.0.0.0"),
            ("CANVAS_BRIDGE_HOST", "10.0.0.1"),
        ];
        let config = BridgeConfig::from_lookup(lookup_from(&vars));
        assert_eq!(config.port, 9100);
        assert_eq!(config.bind_host, "0.0.0.0");
    }

    #[test]
    fn test_legacy_fallback() {
        let vars = [("CANVAS_BRIDGE_PORT", "9200")];
        let config = BridgeConfig::from_lookup(lookup_from(&vars));
        assert_eq!(config.port, 9200);
    }

    #[test]
    fn test_invalid_port_uses_default() {
        let vars = [("EASEL_PORT", "not-a-port")];
        let config = BridgeConfig::from_lookup(lookup_from(&vars));
        assert_eq!(config.port, DEFAULT_PORT);
    }

    #[test]
    fn test_flag_parsing() {
        for raw in ["0", "false", "False"] {
            let vars = [("EASEL_DEBUG", raw), ("EASEL_AUTORUN", raw)];
            let config = BridgeConfig::from_lookup(lookup_from(&vars));
            assert!(!config.debug, "{raw} should disable debug");
            assert!(!config.auto_forward, "{raw} should disable auto-forward");
        }
        let vars = [("EASEL_DEBUG", "1"), ("EASEL_AUTORUN", "yes")];
        let config = BridgeConfig::from_lookup(lookup_from(&vars));
        assert!(config.debug);
        assert!(config.auto_forward);
    }

    #[test]
    fn test_pipeline_url_trailing_slash_trimmed() {
        let vars = [("EASEL_PIPELINE_URL", "http://10.0.0.5:8188/")];
        let config = BridgeConfig::from_lookup(lookup_from(&vars));
        assert_eq!(config.pipeline_url, "http://10.0.0.5:8188");
    }

    #[test]
    fn test_addr_formatting() {
        let config = BridgeConfig::default();
        assert_eq!(config.bind_addr(), "127.0.0.1:8765");
        assert_eq!(config.url(), "http://127.0.0.1:8765/");
        assert_eq!(config.bridge_url(), "http://127.0.0.1:8765");
    }
}
