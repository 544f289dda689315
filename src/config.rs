//! Service configuration.
//!
//! Every section has working defaults, so an empty document is a valid
//! configuration. Unknown keys are rejected to catch typos early.
//!
//! ```yaml
//! latency:
//!   windows: 5
//!   rotation_period_secs: 60
//!   highest_trackable_ms: 3600000
//!   significant_figures: 3
//! access_log:
//!   enabled: true
//!   buffer: 1024
//! debug:
//!   enabled: true
//!   dump_on_signal: false
//! ```

use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::error::{Error, Result};

/// Top-level configuration consumed by [`service::wrap`](crate::service::wrap).
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServiceConfig {
    pub latency: TrackerConfig,
    pub access_log: AccessLogConfig,
    pub debug: DebugConfig,
}

impl ServiceConfig {
    /// Parses and validates a YAML document.
    pub fn from_yaml_str(raw: &str) -> Result<Self> {
        let cfg: Self = serde_yaml::from_str(raw)?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Reads, parses and validates a YAML file.
    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&raw)
    }

    pub fn validate(&self) -> Result<()> {
        self.latency.validate()?;
        self.access_log.validate()
    }
}

/// Parameters of the windowed latency tracker.
///
/// The reported quantiles cover roughly `windows × rotation_period` of
/// trailing traffic.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TrackerConfig {
    /// Number of retained windows, current one included.
    pub windows: usize,
    /// Seconds between two rotations.
    pub rotation_period_secs: u64,
    /// Largest latency the digest resolves; slower samples saturate to it.
    pub highest_trackable_ms: u64,
    /// Decimal digits of precision kept by each digest (0..=5).
    pub significant_figures: u8,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            windows: 5,
            rotation_period_secs: 60,
            highest_trackable_ms: 60 * 60 * 1_000,
            significant_figures: 3,
        }
    }
}

impl TrackerConfig {
    pub fn rotation_period(&self) -> Duration {
        Duration::from_secs(self.rotation_period_secs)
    }

    /// Highest trackable value in the digest's unit (microseconds).
    pub(crate) fn highest_trackable_micros(&self) -> u64 {
        self.highest_trackable_ms.saturating_mul(1_000)
    }

    pub fn validate(&self) -> Result<()> {
        if self.windows == 0 {
            return Err(Error::Config("latency.windows must be at least 1".into()));
        }
        if self.rotation_period_secs == 0 {
            return Err(Error::Config("latency.rotation_period_secs must be at least 1".into()));
        }
        if self.highest_trackable_ms == 0 {
            return Err(Error::Config("latency.highest_trackable_ms must be at least 1".into()));
        }
        if self.significant_figures > 5 {
            return Err(Error::Config("latency.significant_figures must be between 0 and 5".into()));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AccessLogConfig {
    pub enabled: bool,
    /// Lines queued for the writer before new ones are dropped.
    pub buffer: usize,
}

impl Default for AccessLogConfig {
    fn default() -> Self {
        Self { enabled: true, buffer: 1024 }
    }
}

impl AccessLogConfig {
    pub fn validate(&self) -> Result<()> {
        if self.buffer == 0 {
            return Err(Error::Config("access_log.buffer must be at least 1".into()));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DebugConfig {
    /// Serve `/debug/vars`, `/debug/stats` and `/debug/cmdline`.
    pub enabled: bool,
    /// Log every exported var when the process receives `SIGUSR1`.
    pub dump_on_signal: bool,
}

impl Default for DebugConfig {
    fn default() -> Self {
        Self { enabled: true, dump_on_signal: false }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_yields_defaults() {
        let cfg = ServiceConfig::from_yaml_str("{}").unwrap();
        assert_eq!(cfg, ServiceConfig::default());
        assert_eq!(cfg.latency.windows, 5);
        assert_eq!(cfg.latency.rotation_period(), Duration::from_secs(60));
        assert_eq!(cfg.latency.highest_trackable_micros(), 3_600_000_000);
        assert!(cfg.access_log.enabled);
        assert!(!cfg.debug.dump_on_signal);
    }

    #[test]
    fn partial_sections_keep_remaining_defaults() {
        let cfg = ServiceConfig::from_yaml_str(
            "latency:\n  windows: 3\naccess_log:\n  enabled: false\n",
        )
        .unwrap();
        assert_eq!(cfg.latency.windows, 3);
        assert_eq!(cfg.latency.rotation_period_secs, 60);
        assert!(!cfg.access_log.enabled);
        assert_eq!(cfg.access_log.buffer, 1024);
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let err = ServiceConfig::from_yaml_str("latency:\n  window: 3\n").unwrap_err();
        assert!(matches!(err, Error::Yaml(_)), "got {err:?}");
    }

    #[test]
    fn invalid_values_are_rejected() {
        for raw in [
            "latency:\n  windows: 0\n",
            "latency:\n  rotation_period_secs: 0\n",
            "latency:\n  significant_figures: 6\n",
            "access_log:\n  buffer: 0\n",
        ] {
            let err = ServiceConfig::from_yaml_str(raw).unwrap_err();
            assert!(matches!(err, Error::Config(_)), "{raw:?} gave {err:?}");
        }
    }

    #[test]
    fn missing_file_is_an_io_error() {
        let err = ServiceConfig::load_from_file("/nonexistent/vigil.yaml").unwrap_err();
        assert!(matches!(err, Error::Io(_)));
    }
}
