//! Global configuration types for Loanflow.
//!
//! `GlobalConfig` represents the top-level `config.toml` that controls the
//! engine's polling cadence and the loan review policy.

use serde::{Deserialize, Serialize};

/// Top-level configuration for a Loanflow process.
///
/// Loaded from `~/.loanflow/config.toml`. All fields have sensible defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GlobalConfig {
    /// Name this process reports in logs and the health endpoint.
    #[serde(default = "default_application_name")]
    pub application_name: String,

    #[serde(default)]
    pub engine: EngineSettings,

    #[serde(default)]
    pub loan: LoanPolicy,
}

fn default_application_name() -> String {
    "loanflow".to_string()
}

impl Default for GlobalConfig {
    fn default() -> Self {
        Self {
            application_name: default_application_name(),
            engine: EngineSettings::default(),
            loan: LoanPolicy::default(),
        }
    }
}

/// Engine polling settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineSettings {
    /// How often a suspended receive re-checks the store for messages sent
    /// by other processes.
    #[serde(default = "default_recv_poll_interval_ms")]
    pub recv_poll_interval_ms: u64,

    /// How often a result handle re-checks the store for a terminal status.
    #[serde(default = "default_result_poll_interval_ms")]
    pub result_poll_interval_ms: u64,
}

fn default_recv_poll_interval_ms() -> u64 {
    500
}

fn default_result_poll_interval_ms() -> u64 {
    250
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            recv_poll_interval_ms: default_recv_poll_interval_ms(),
            result_poll_interval_ms: default_result_poll_interval_ms(),
        }
    }
}

/// Loan approval policy knobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoanPolicy {
    /// Loans strictly above this amount wait for a manual review.
    #[serde(default = "default_review_threshold")]
    pub review_threshold: f64,

    /// How long a manual review may take before the loan is rejected.
    #[serde(default = "default_review_timeout_secs")]
    pub review_timeout_secs: u64,

    /// Credit scores strictly above this value pass the credit check.
    #[serde(default = "default_min_credit_score")]
    pub min_credit_score: u32,
}

fn default_review_threshold() -> f64 {
    3000.0
}

fn default_review_timeout_secs() -> u64 {
    60
}

fn default_min_credit_score() -> u32 {
    60
}

impl Default for LoanPolicy {
    fn default() -> Self {
        Self {
            review_threshold: default_review_threshold(),
            review_timeout_secs: default_review_timeout_secs(),
            min_credit_score: default_min_credit_score(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_global_config_default_values() {
        let config = GlobalConfig::default();
        assert_eq!(config.application_name, "loanflow");
        assert_eq!(config.engine.recv_poll_interval_ms, 500);
        assert_eq!(config.loan.review_threshold, 3000.0);
        assert_eq!(config.loan.review_timeout_secs, 60);
        assert_eq!(config.loan.min_credit_score, 60);
    }

    #[test]
    fn test_global_config_deserialize_with_defaults() {
        let config: GlobalConfig = toml::from_str("").unwrap();
        assert_eq!(config.application_name, "loanflow");
        assert_eq!(config.engine.result_poll_interval_ms, 250);
    }

    #[test]
    fn test_global_config_deserialize_with_values() {
        let toml_str = r#"
application_name = "loan-desk"

[engine]
recv_poll_interval_ms = 100

[loan]
review_threshold = 10000.0
review_timeout_secs = 300
"#;
        let config: GlobalConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.application_name, "loan-desk");
        assert_eq!(config.engine.recv_poll_interval_ms, 100);
        assert_eq!(config.engine.result_poll_interval_ms, 250);
        assert_eq!(config.loan.review_threshold, 10000.0);
        assert_eq!(config.loan.review_timeout_secs, 300);
        assert_eq!(config.loan.min_credit_score, 60);
    }
}
