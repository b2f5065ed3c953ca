use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use harvester_core::BackoffPolicy;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read settings {path:?}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse settings {path:?}: {message}")]
    Parse { path: PathBuf, message: String },
    #[error("invalid setting `{field}`: {reason}")]
    Invalid { field: &'static str, reason: String },
}

/// Everything one harvesting domain needs besides its collaborators.
///
/// Durations are stored in seconds so RON files stay readable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HarvestSettings {
    /// Domain name used in log lines.
    pub name: String,
    /// Directory holding the ledgers and error listings.
    pub base_dir: PathBuf,
    /// Record field that carries the work item label.
    pub label_key: String,
    pub metrics_filename: String,
    pub pending_filename: String,
    pub batch_size: usize,
    pub request_delay_secs: f64,
    pub search_delay_secs: f64,
    pub jitter_max_secs: f64,
    pub persist_batch_size: usize,
    pub persist_flush_interval_secs: f64,
    pub writer_poll_secs: f64,
    pub graceful_wait_secs: f64,
    pub backoff_base_secs: f64,
    pub backoff_cap_secs: f64,
}

impl Default for HarvestSettings {
    fn default() -> Self {
        Self {
            name: "harvest".to_string(),
            base_dir: PathBuf::from("."),
            label_key: "label".to_string(),
            metrics_filename: "batch_metrics.csv".to_string(),
            pending_filename: "pending.json".to_string(),
            batch_size: 1000,
            request_delay_secs: 0.0,
            search_delay_secs: 0.0,
            jitter_max_secs: 0.8,
            persist_batch_size: 50,
            persist_flush_interval_secs: 3.0,
            writer_poll_secs: 0.5,
            graceful_wait_secs: 3.0,
            backoff_base_secs: 300.0,
            backoff_cap_secs: 3600.0,
        }
    }
}

impl HarvestSettings {
    /// Reads a RON settings file; absent fields take their defaults.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let settings: Self = ron::from_str(&text).map_err(|err| ConfigError::Parse {
            path: path.to_path_buf(),
            message: err.to_string(),
        })?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.batch_size == 0 {
            return Err(invalid("batch_size", "must be at least 1"));
        }
        if self.persist_batch_size == 0 {
            return Err(invalid("persist_batch_size", "must be at least 1"));
        }
        if self.label_key.trim().is_empty() {
            return Err(invalid("label_key", "must not be empty"));
        }
        let durations = [
            ("request_delay_secs", self.request_delay_secs),
            ("search_delay_secs", self.search_delay_secs),
            ("jitter_max_secs", self.jitter_max_secs),
            ("persist_flush_interval_secs", self.persist_flush_interval_secs),
            ("writer_poll_secs", self.writer_poll_secs),
            ("graceful_wait_secs", self.graceful_wait_secs),
            ("backoff_base_secs", self.backoff_base_secs),
            ("backoff_cap_secs", self.backoff_cap_secs),
        ];
        for (field, value) in durations {
            if Duration::try_from_secs_f64(value).is_err() {
                return Err(invalid(field, format!("{value} is not a valid duration")));
            }
        }
        if self.backoff_cap_secs < self.backoff_base_secs {
            return Err(invalid("backoff_cap_secs", "must not be below backoff_base_secs"));
        }
        Ok(())
    }

    pub fn metrics_path(&self) -> PathBuf {
        self.base_dir.join(&self.metrics_filename)
    }

    pub fn pending_path(&self) -> PathBuf {
        self.base_dir.join(&self.pending_filename)
    }

    pub fn error_listing_path(&self, batch_idx: usize) -> PathBuf {
        self.base_dir.join(format!("batch_{batch_idx}_errors.csv"))
    }

    pub fn retry_results_path(&self) -> PathBuf {
        self.base_dir.join("retry_results.csv")
    }

    pub fn request_delay(&self) -> Duration {
        secs(self.request_delay_secs)
    }

    pub fn search_delay(&self) -> Duration {
        secs(self.search_delay_secs)
    }

    pub fn jitter_max(&self) -> Duration {
        secs(self.jitter_max_secs)
    }

    pub fn persist_flush_interval(&self) -> Duration {
        secs(self.persist_flush_interval_secs)
    }

    pub fn writer_poll(&self) -> Duration {
        secs(self.writer_poll_secs)
    }

    pub fn graceful_wait(&self) -> Duration {
        secs(self.graceful_wait_secs)
    }

    pub fn backoff(&self) -> BackoffPolicy {
        BackoffPolicy::new(secs(self.backoff_base_secs), secs(self.backoff_cap_secs))
    }
}

fn invalid(field: &'static str, reason: impl Into<String>) -> ConfigError {
    ConfigError::Invalid {
        field,
        reason: reason.into(),
    }
}

fn secs(value: f64) -> Duration {
    Duration::try_from_secs_f64(value).unwrap_or(Duration::ZERO)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let settings = HarvestSettings::default();
        settings.validate().unwrap();
        assert_eq!(settings.backoff().base, Duration::from_secs(300));
        assert_eq!(settings.writer_poll(), Duration::from_millis(500));
    }

    #[test]
    fn partial_ron_keeps_defaults() {
        let settings: HarvestSettings =
            ron::from_str(r#"(name: "ciyu", label_key: "ciyu", batch_size: 25)"#).unwrap();
        assert_eq!(settings.name, "ciyu");
        assert_eq!(settings.batch_size, 25);
        assert_eq!(settings.pending_filename, "pending.json");
    }

    #[test]
    fn rejects_cap_below_base() {
        let settings = HarvestSettings {
            backoff_base_secs: 10.0,
            backoff_cap_secs: 5.0,
            ..HarvestSettings::default()
        };
        assert!(matches!(
            settings.validate(),
            Err(ConfigError::Invalid {
                field: "backoff_cap_secs",
                ..
            })
        ));
    }

    #[test]
    fn rejects_negative_delay() {
        let settings = HarvestSettings {
            jitter_max_secs: -1.0,
            ..HarvestSettings::default()
        };
        assert!(settings.validate().is_err());
    }

    #[test]
    fn rejects_durations_too_large_to_represent() {
        let settings = HarvestSettings {
            backoff_cap_secs: 1e30,
            ..HarvestSettings::default()
        };
        assert!(matches!(
            settings.validate(),
            Err(ConfigError::Invalid {
                field: "backoff_cap_secs",
                ..
            })
        ));
    }
}
