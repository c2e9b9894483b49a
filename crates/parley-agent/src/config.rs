//! Engine configuration.
//!
//! Every threshold the negotiation engine uses lives here so deployments can
//! tune them from a TOML file:
//!
//! ```toml
//! max_rounds = 12
//! acceptance_threshold = 0.75
//!
//! [participation]
//! min_trust = 0.4
//! ```

use std::path::Path;
use std::time::Duration;

use parley_core::ConstraintThresholds;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Default round budget per session.
pub const DEFAULT_MAX_ROUNDS: u32 = 10;

/// Default session lifetime: 30 seconds.
pub const DEFAULT_SESSION_TIMEOUT_MS: u64 = 30_000;

/// Default buffer for agent inbox channels.
pub const DEFAULT_CHANNEL_BUFFER: usize = 256;

/// Errors raised while loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file could not be read.
    #[error("failed to read config file '{path}': {source}")]
    Read {
        /// Path that was read.
        path: String,
        /// Underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// The TOML could not be parsed.
    #[error("invalid TOML: {0}")]
    Parse(#[from] toml::de::Error),

    /// A value is out of range.
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Receiver-side thresholds checked before any counter-offer is formed.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ParticipationThresholds {
    /// Minimum trust in the sender.
    pub min_trust: f64,
    /// Minimum fraction of each requested resource that must be available.
    pub min_resource_coverage: f64,
    /// Maximum workload at which new negotiations are entertained.
    pub max_workload: f64,
    /// Minimum estimated benefit.
    pub min_benefit: f64,
}

impl Default for ParticipationThresholds {
    fn default() -> Self {
        Self {
            min_trust: 0.3,
            min_resource_coverage: 0.5,
            max_workload: 0.8,
            min_benefit: 0.3,
        }
    }
}

/// Rates used by the trust learner.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LearningConfig {
    /// Weight of a new outcome in the collaboration moving average.
    pub learning_rate: f64,
    /// Trust gained per executed agreement.
    pub success_trust_delta: f64,
    /// Trust lost when a peer fails to honor an agreement.
    pub failure_trust_delta: f64,
    /// Trust lost when a session with the peer expires.
    pub trust_decay_rate: f64,
    /// `max_rounds_exceeded` rejections from one peer before switching to cooperative.
    pub stalemate_limit: u32,
}

impl Default for LearningConfig {
    fn default() -> Self {
        Self {
            learning_rate: 0.1,
            success_trust_delta: 0.05,
            failure_trust_delta: 0.05,
            trust_decay_rate: 0.02,
            stalemate_limit: 2,
        }
    }
}

/// How long each kind of offer stays valid, in milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OfferLifetimes {
    /// Initial offer sent with a negotiation request.
    pub initial_ms: u64,
    /// Responder's first counter-offer.
    pub counter_ms: u64,
    /// Refined offers in later rounds.
    pub refined_ms: u64,
}

impl Default for OfferLifetimes {
    fn default() -> Self {
        Self {
            initial_ms: 5 * 60 * 1000,
            counter_ms: 3 * 60 * 1000,
            refined_ms: 2 * 60 * 1000,
        }
    }
}

/// Settings for the agent task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Inbox channel capacity.
    pub channel_buffer: usize,
    /// Interval between sweeps for expired sessions, in milliseconds.
    pub sweep_interval_ms: u64,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            channel_buffer: DEFAULT_CHANNEL_BUFFER,
            sweep_interval_ms: 1000,
        }
    }
}

/// Configuration for a negotiation engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Round budget per session.
    pub max_rounds: u32,
    /// Session lifetime for negotiations we initiate, in milliseconds.
    pub session_timeout_ms: u64,
    /// Offers scoring strictly above this are accepted.
    pub acceptance_threshold: f64,
    /// Collaboration invites with benefit strictly above this are accepted.
    pub cooperation_threshold: f64,
    /// Fraction of the remaining score gap conceded per refinement.
    pub concession_rate: f64,
    /// Participation gate.
    pub participation: ParticipationThresholds,
    /// Offer constraint triggers.
    pub constraints: ConstraintThresholds,
    /// Trust learner rates.
    pub learning: LearningConfig,
    /// Offer validity windows.
    pub offer_lifetimes: OfferLifetimes,
    /// Agent task settings.
    pub runtime: RuntimeConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_rounds: DEFAULT_MAX_ROUNDS,
            session_timeout_ms: DEFAULT_SESSION_TIMEOUT_MS,
            acceptance_threshold: 0.8,
            cooperation_threshold: 0.6,
            concession_rate: 0.3,
            participation: ParticipationThresholds::default(),
            constraints: ConstraintThresholds::default(),
            learning: LearningConfig::default(),
            offer_lifetimes: OfferLifetimes::default(),
            runtime: RuntimeConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Set the round budget.
    #[must_use]
    pub const fn with_max_rounds(mut self, max_rounds: u32) -> Self {
        self.max_rounds = max_rounds;
        self
    }

    /// Set the session lifetime.
    #[must_use]
    pub const fn with_session_timeout(mut self, timeout: Duration) -> Self {
        self.session_timeout_ms = timeout.as_millis() as u64;
        self
    }

    /// Set the acceptance threshold.
    #[must_use]
    pub const fn with_acceptance_threshold(mut self, threshold: f64) -> Self {
        self.acceptance_threshold = threshold;
        self
    }

    /// Set the participation gate.
    #[must_use]
    pub const fn with_participation(mut self, participation: ParticipationThresholds) -> Self {
        self.participation = participation;
        self
    }

    /// Set the sweep interval.
    #[must_use]
    pub const fn with_sweep_interval(mut self, interval: Duration) -> Self {
        self.runtime.sweep_interval_ms = interval.as_millis() as u64;
        self
    }

    /// Session lifetime as a chrono duration.
    #[must_use]
    pub fn session_timeout(&self) -> chrono::Duration {
        chrono::Duration::milliseconds(self.session_timeout_ms as i64)
    }

    /// Sweep interval as a std duration.
    #[must_use]
    pub const fn sweep_interval(&self) -> Duration {
        Duration::from_millis(self.runtime.sweep_interval_ms)
    }

    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, parsed or validated.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(|source| ConfigError::Read {
            path: path.as_ref().display().to_string(),
            source,
        })?;
        Self::from_toml(&content)
    }

    /// Parse configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns an error if the TOML is invalid or a value is out of range.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if any value is out of range.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_rounds == 0 {
            return Err(ConfigError::Invalid("max_rounds must be at least 1".into()));
        }
        if self.session_timeout_ms == 0 {
            return Err(ConfigError::Invalid("session_timeout_ms must be positive".into()));
        }
        if self.runtime.channel_buffer == 0 {
            return Err(ConfigError::Invalid("runtime.channel_buffer must be positive".into()));
        }
        if self.runtime.sweep_interval_ms == 0 {
            return Err(ConfigError::Invalid("runtime.sweep_interval_ms must be positive".into()));
        }

        let unit_values = [
            ("acceptance_threshold", self.acceptance_threshold),
            ("cooperation_threshold", self.cooperation_threshold),
            ("concession_rate", self.concession_rate),
            ("participation.min_trust", self.participation.min_trust),
            ("participation.min_resource_coverage", self.participation.min_resource_coverage),
            ("participation.max_workload", self.participation.max_workload),
            ("participation.min_benefit", self.participation.min_benefit),
            ("constraints.high_workload", self.constraints.high_workload),
            ("learning.learning_rate", self.learning.learning_rate),
            ("learning.success_trust_delta", self.learning.success_trust_delta),
            ("learning.failure_trust_delta", self.learning.failure_trust_delta),
            ("learning.trust_decay_rate", self.learning.trust_decay_rate),
        ];
        for (name, value) in unit_values {
            if !(0.0..=1.0).contains(&value) {
                return Err(ConfigError::Invalid(format!(
                    "{name} must be between 0.0 and 1.0, got {value}"
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_protocol_constants() {
        let config = EngineConfig::default();
        assert_eq!(config.max_rounds, 10);
        assert_eq!(config.session_timeout_ms, 30_000);
        assert!((config.acceptance_threshold - 0.8).abs() < f64::EPSILON);
        assert!((config.cooperation_threshold - 0.6).abs() < f64::EPSILON);
        assert!((config.participation.min_trust - 0.3).abs() < f64::EPSILON);
        assert!((config.participation.max_workload - 0.8).abs() < f64::EPSILON);
        assert_eq!(config.constraints.max_concurrent_negotiations, 3);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let config = EngineConfig::from_toml(
            r"
            max_rounds = 4

            [participation]
            min_trust = 0.5
            ",
        )
        .unwrap();

        assert_eq!(config.max_rounds, 4);
        assert!((config.participation.min_trust - 0.5).abs() < f64::EPSILON);
        assert!((config.participation.max_workload - 0.8).abs() < f64::EPSILON);
        assert_eq!(config.offer_lifetimes, OfferLifetimes::default());
    }

    #[test]
    fn zero_rounds_is_invalid() {
        let err = EngineConfig::from_toml("max_rounds = 0").unwrap_err();
        assert!(err.to_string().contains("max_rounds"));
    }

    #[test]
    fn out_of_range_threshold_is_invalid() {
        let err = EngineConfig::from_toml("acceptance_threshold = 1.5").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn malformed_toml_is_parse_error() {
        let err = EngineConfig::from_toml("max_rounds = \"many\"").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn builders_override_fields() {
        let config = EngineConfig::default()
            .with_max_rounds(3)
            .with_session_timeout(Duration::from_secs(5))
            .with_acceptance_threshold(0.7);
        assert_eq!(config.max_rounds, 3);
        assert_eq!(config.session_timeout(), chrono::Duration::seconds(5));
        assert!((config.acceptance_threshold - 0.7).abs() < f64::EPSILON);
    }

    #[test]
    fn missing_file_reports_path() {
        let err = EngineConfig::from_file("/nonexistent/parley.toml").unwrap_err();
        assert!(err.to_string().contains("/nonexistent/parley.toml"));
    }
}
