//! Pipeline configuration.
//!
//! Everything has a default; overrides come from the environment
//! (dotenv-loaded). Configuration is read-only for the duration of a run.

use serde::{Deserialize, Serialize};

/// Top-level configuration for one pipeline run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Inactivity gap that closes a session (seconds).
    pub session_gap_seconds: i64,
    /// Trailing attribution lookback window (days).
    pub lookback_days: i64,
    /// Drift monitor thresholds.
    pub monitor: MonitorThresholds,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            session_gap_seconds: 1800, // 30 minutes
            lookback_days: 7,
            monitor: MonitorThresholds::default(),
        }
    }
}

/// Alert thresholds for the drift monitor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorThresholds {
    /// Days of prior history averaged into the revenue baseline.
    pub baseline_days: usize,
    /// Null-identity rate above which a WARN is raised.
    pub max_null_identity_rate: f64,
    /// Duplicate rate above which a WARN is raised.
    pub max_duplicate_rate: f64,
    /// Payload parse failure rate above which a WARN is raised.
    pub max_payload_error_rate: f64,
    /// Direct-channel revenue share above which a WARN is raised.
    pub max_direct_share: f64,
    /// Relative revenue drop against baseline above which a CRITICAL is raised.
    pub max_revenue_drop: f64,
}

impl Default for MonitorThresholds {
    fn default() -> Self {
        Self {
            baseline_days: 7,
            max_null_identity_rate: 0.20,
            max_duplicate_rate: 0.001,
            max_payload_error_rate: 0.01,
            max_direct_share: 0.80,
            max_revenue_drop: 0.40,
        }
    }
}

impl PipelineConfig {
    /// Load configuration from the environment, falling back to defaults
    /// for anything unset.
    pub fn from_env() -> Self {
        dotenv::dotenv().ok();
        let defaults = Self::default();

        Self {
            session_gap_seconds: env_parse("SESSION_GAP_SECONDS", defaults.session_gap_seconds),
            lookback_days: env_parse("ATTRIBUTION_LOOKBACK_DAYS", defaults.lookback_days),
            monitor: MonitorThresholds {
                baseline_days: env_parse("BASELINE_DAYS", defaults.monitor.baseline_days),
                max_null_identity_rate: env_parse(
                    "MAX_NULL_CLIENT_RATE",
                    defaults.monitor.max_null_identity_rate,
                ),
                max_duplicate_rate: env_parse("MAX_DUP_RATE", defaults.monitor.max_duplicate_rate),
                max_payload_error_rate: env_parse(
                    "MAX_JSON_ERROR_RATE",
                    defaults.monitor.max_payload_error_rate,
                ),
                max_direct_share: env_parse("MAX_DIRECT_SHARE", defaults.monitor.max_direct_share),
                max_revenue_drop: env_parse("MAX_REV_DROP", defaults.monitor.max_revenue_drop),
            },
        }
    }
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
