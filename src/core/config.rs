use crate::core::{MetricsError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Name of the file where cached atoms are saved.
pub const ATOMS_FILE_NAME: &str = "persist_atoms.pb";

/// Maximum number of records kept per category between pulls.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CategoryCapacities {
    pub voice_call_sessions: usize,
    pub voice_call_rat_usages: usize,
    /// Incoming and outgoing messages are counted separately.
    pub sms: usize,
    pub data_call_sessions: usize,
    pub cellular_service_states: usize,
    pub cellular_data_service_switches: usize,
    pub ims_registration_stats: usize,
    pub ims_registration_terminations: usize,
    pub network_requests: usize,
    pub carrier_id_mismatches: usize,
}

impl Default for CategoryCapacities {
    fn default() -> Self {
        Self {
            voice_call_sessions: 50,
            voice_call_rat_usages: 256,
            sms: 25,
            data_call_sessions: 15,
            cellular_service_states: 50,
            cellular_data_service_switches: 50,
            ims_registration_stats: 10,
            ims_registration_terminations: 10,
            network_requests: 20,
            carrier_id_mismatches: 40,
        }
    }
}

impl CategoryCapacities {
    fn named(&self) -> [(&'static str, usize); 10] {
        [
            ("voice_call_sessions", self.voice_call_sessions),
            ("voice_call_rat_usages", self.voice_call_rat_usages),
            ("sms", self.sms),
            ("data_call_sessions", self.data_call_sessions),
            ("cellular_service_states", self.cellular_service_states),
            ("cellular_data_service_switches", self.cellular_data_service_switches),
            ("ims_registration_stats", self.ims_registration_stats),
            ("ims_registration_terminations", self.ims_registration_terminations),
            ("network_requests", self.network_requests),
            ("carrier_id_mismatches", self.carrier_id_mismatches),
        ]
    }
}

/// Configuration of the persisted atoms storage.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Location of the atoms file.
    pub path: PathBuf,

    /// Fingerprint of the running build; a stored image from another build is discarded.
    pub build_fingerprint: String,

    /// Delay before saving after an update, so bursts of updates share one write.
    pub update_flush_delay: Duration,

    /// Delay before saving after a pull.
    ///
    /// Kept short so a crash or power loss does not lose the pull timestamp and report the
    /// same atoms twice.
    pub pull_flush_delay: Duration,

    /// Save synchronously on every change, skipping the delays.
    pub save_immediately: bool,

    pub capacities: CategoryCapacities,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from(ATOMS_FILE_NAME),
            build_fingerprint: String::new(),
            update_flush_delay: Duration::from_millis(30_000),
            pull_flush_delay: Duration::from_millis(500),
            save_immediately: false,
            capacities: CategoryCapacities::default(),
        }
    }
}

impl StorageConfig {
    /// Create a configuration storing `persist_atoms.pb` inside `data_dir`
    pub fn new<P: AsRef<Path>>(data_dir: P, build_fingerprint: &str) -> Self {
        Self {
            path: data_dir.as_ref().join(ATOMS_FILE_NAME),
            build_fingerprint: build_fingerprint.to_string(),
            ..Self::default()
        }
    }

    /// Set the atoms file path
    pub fn path<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.path = path.as_ref().to_path_buf();
        self
    }

    /// Set the delay applied after updates
    pub fn update_flush_delay(mut self, delay: Duration) -> Self {
        self.update_flush_delay = delay;
        self
    }

    /// Set the delay applied after pulls
    pub fn pull_flush_delay(mut self, delay: Duration) -> Self {
        self.pull_flush_delay = delay;
        self
    }

    /// Save synchronously on every change
    pub fn save_immediately(mut self, enabled: bool) -> Self {
        self.save_immediately = enabled;
        self
    }

    /// Set per-category capacities
    pub fn capacities(mut self, capacities: CategoryCapacities) -> Self {
        self.capacities = capacities;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.path.as_os_str().is_empty() {
            return Err(MetricsError::InvalidConfig(
                "atoms file path must not be empty".to_string(),
            ));
        }
        if let Some((name, _)) = self
            .capacities
            .named()
            .into_iter()
            .find(|(_, capacity)| *capacity == 0)
        {
            return Err(MetricsError::InvalidConfig(format!(
                "capacity of {} must be positive",
                name
            )));
        }
        Ok(())
    }
}

/// Configuration of the pull coordinator.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CollectorConfig {
    /// Minimum time between two successful pulls of the same category.
    ///
    /// 23 hours leaves some margin for pulls scheduled once a day.
    pub min_cooldown: Duration,

    /// Voice RAT usage buckets with fewer calls are dropped.
    pub min_calls_per_bucket: u64,

    /// Durations are rounded to this bucket before being reported.
    pub duration_bucket: Duration,
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            min_cooldown: Duration::from_secs(23 * 60 * 60),
            min_calls_per_bucket: 5,
            duration_bucket: Duration::from_secs(5 * 60),
        }
    }
}

impl CollectorConfig {
    /// Relaxed limits for development builds.
    pub fn debug() -> Self {
        Self {
            min_cooldown: Duration::from_secs(10),
            min_calls_per_bucket: 0,
            duration_bucket: Duration::from_secs(2),
        }
    }

    /// Set the pull cooldown
    pub fn min_cooldown(mut self, cooldown: Duration) -> Self {
        self.min_cooldown = cooldown;
        self
    }

    /// Set the minimum call count per RAT usage bucket
    pub fn min_calls_per_bucket(mut self, calls: u64) -> Self {
        self.min_calls_per_bucket = calls;
        self
    }

    /// Set the duration rounding bucket
    pub fn duration_bucket(mut self, bucket: Duration) -> Self {
        self.duration_bucket = bucket;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_storage_config_is_valid() {
        let config = StorageConfig::new("/tmp/atoms", "build-1");
        assert!(config.validate().is_ok());
        assert!(config.path.ends_with(ATOMS_FILE_NAME));
        assert_eq!(config.update_flush_delay, Duration::from_secs(30));
        assert_eq!(config.pull_flush_delay, Duration::from_millis(500));
    }

    #[test]
    fn test_zero_capacity_is_rejected() {
        let capacities = CategoryCapacities {
            ims_registration_stats: 0,
            ..CategoryCapacities::default()
        };
        let config = StorageConfig::new("/tmp/atoms", "build-1").capacities(capacities);
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("ims_registration_stats"));
    }

    #[test]
    fn test_empty_path_is_rejected() {
        let config = StorageConfig::default().path("");
        assert!(matches!(
            config.validate(),
            Err(MetricsError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_collector_debug_config() {
        let config = CollectorConfig::debug();
        assert_eq!(config.min_calls_per_bucket, 0);
        assert_eq!(config.min_cooldown, Duration::from_secs(10));
    }
}
