//! Harness configuration (run limits and orchestration settings).

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{BenchError, BenchResult, ValidationError};

/// Limits applied by the environment to a single run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EnvironmentLimits {
    /// Agent actions accepted before the run is truncated.
    pub max_steps: usize,
    /// Tool errors accepted before the run is terminated as a failure.
    pub max_errors: usize,
}

impl Default for EnvironmentLimits {
    fn default() -> Self {
        Self {
            max_steps: 100,
            max_errors: 10,
        }
    }
}

impl EnvironmentLimits {
    /// Validate limits.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.max_steps == 0 {
            return Err(invalid("environment.max_steps must be > 0"));
        }
        if self.max_errors == 0 {
            return Err(invalid("environment.max_errors must be > 0"));
        }
        Ok(())
    }
}

/// Settings for the agent exchange loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OrchestratorConfig {
    /// Deadline for one agent reply.
    pub reply_timeout_ms: u64,
    /// Runs evaluated in parallel by a batch.
    pub max_concurrency: usize,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            reply_timeout_ms: 120_000,
            max_concurrency: 4,
        }
    }
}

impl OrchestratorConfig {
    /// Validate settings.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.reply_timeout_ms == 0 {
            return Err(invalid("orchestrator.reply_timeout_ms must be > 0"));
        }
        if self.max_concurrency == 0 {
            return Err(invalid("orchestrator.max_concurrency must be > 0"));
        }
        Ok(())
    }
}

/// Complete harness configuration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HarnessConfig {
    /// Per-run limits.
    pub environment: EnvironmentLimits,
    /// Exchange loop settings.
    pub orchestrator: OrchestratorConfig,
}

impl HarnessConfig {
    /// Validate the whole configuration.
    ///
    /// This must be called before constructing an `Orchestrator`.
    pub fn validate(&self) -> Result<(), ValidationError> {
        self.environment.validate()?;
        self.orchestrator.validate()
    }

    /// Parses and validates a JSON document. Missing keys take defaults.
    pub fn from_json_str(json: &str) -> BenchResult<Self> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| invalid(format!("config is not valid JSON: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Reads, parses and validates a JSON config file.
    pub fn from_path(path: impl AsRef<Path>) -> BenchResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| BenchError::io(format!("read config {}: {e}", path.display())))?;
        Self::from_json_str(&text)
    }
}

fn invalid(reason: impl Into<String>) -> ValidationError {
    ValidationError::InvalidConfig {
        reason: reason.into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn default_is_valid() {
        let config = HarnessConfig::default();
        config.validate().unwrap();
        assert_eq!(config.environment.max_steps, 100);
        assert_eq!(config.orchestrator.reply_timeout_ms, 120_000);
    }

    #[test]
    fn rejects_zero_limits() {
        let mut c = HarnessConfig::default();
        c.environment.max_steps = 0;
        assert!(c.validate().is_err());

        let mut c = HarnessConfig::default();
        c.environment.max_errors = 0;
        assert!(c.validate().is_err());

        let mut c = HarnessConfig::default();
        c.orchestrator.reply_timeout_ms = 0;
        assert!(c.validate().is_err());

        let mut c = HarnessConfig::default();
        c.orchestrator.max_concurrency = 0;
        assert!(c.validate().is_err());
    }

    #[test]
    fn partial_json_fills_defaults() {
        let config = HarnessConfig::from_json_str(r#"{"environment": {"max_steps": 12}}"#).unwrap();
        assert_eq!(config.environment.max_steps, 12);
        assert_eq!(config.environment.max_errors, 10);
        assert_eq!(config.orchestrator, OrchestratorConfig::default());

        let err = HarnessConfig::from_json_str(r#"{"orchestrator": {"max_concurrency": 0}}"#)
            .unwrap_err();
        assert!(err.is_validation());
    }

    #[test]
    fn loads_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"orchestrator": {{"reply_timeout_ms": 500}}}}"#).unwrap();
        let config = HarnessConfig::from_path(file.path()).unwrap();
        assert_eq!(config.orchestrator.reply_timeout_ms, 500);
    }
}
