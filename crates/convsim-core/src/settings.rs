//! Batch configuration.
//!
//! Settings come from an optional TOML file, then environment overrides:
//!
//! - `CONVSIM_COMPOSE_FILE`: compose file for isolated deployments
//! - `CONVSIM_RESULTS_DIR`: where batch result files are written
//! - `CONVSIM_PORT_START`: first port probed for allocation
//! - `CONVSIM_COOLDOWN_MS`: pause between simulations
//!
//! Every field has a default, so an empty file is a valid configuration.

use isolated_env::{ComposeConfig, PortAllocator, ReadinessPolicy, Secrets, DEFAULT_START_PORT};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::batch::CooldownPolicy;
use crate::dialogue::DialoguePolicy;
use crate::domain::{Result, SimError};

/// Port search parameters.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PortSettings {
    pub start: u16,
    pub max_attempts: u16,
}

impl Default for PortSettings {
    fn default() -> Self {
        Self {
            start: DEFAULT_START_PORT,
            max_attempts: isolated_env::DEFAULT_MAX_ATTEMPTS,
        }
    }
}

/// Readiness polling plus the per-probe HTTP timeout.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ReadinessSettings {
    pub max_retries: u32,
    pub poll_interval_ms: u64,
    pub probe_timeout_ms: u64,
}

impl Default for ReadinessSettings {
    fn default() -> Self {
        let policy = ReadinessPolicy::default();
        Self {
            max_retries: policy.max_retries,
            poll_interval_ms: policy.poll_interval_ms,
            probe_timeout_ms: 5_000,
        }
    }
}

/// Dialogue policy plus the chat request timeout.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DialogueSettings {
    #[serde(flatten)]
    pub policy: DialoguePolicy,
    pub request_timeout_secs: u64,
}

impl Default for DialogueSettings {
    fn default() -> Self {
        Self {
            policy: DialoguePolicy::default(),
            request_timeout_secs: 45,
        }
    }
}

/// Everything a batch needs besides the persona/goal selection.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct BatchSettings {
    pub compose: ComposeConfig,
    pub ports: PortSettings,
    pub readiness: ReadinessSettings,
    pub dialogue: DialogueSettings,
    /// Host used in derived endpoint URLs.
    pub host: String,
    pub seed_timeout_ms: u64,
    /// Upper bound for one simulation, start through dialogue (0 = none).
    pub run_deadline_secs: u64,
    pub cooldown_ms: u64,
    pub results_dir: PathBuf,
    /// Catalog file; the built-in catalog is used when absent.
    pub catalog_path: Option<PathBuf>,
    /// Process environment variables forwarded to deployments.
    pub secret_env_keys: Vec<String>,
}

impl Default for BatchSettings {
    fn default() -> Self {
        Self {
            compose: ComposeConfig::default(),
            ports: PortSettings::default(),
            readiness: ReadinessSettings::default(),
            dialogue: DialogueSettings::default(),
            host: isolated_env::handle::DEFAULT_HOST.to_string(),
            seed_timeout_ms: 30_000,
            run_deadline_secs: 900,
            cooldown_ms: 5_000,
            results_dir: PathBuf::from("results"),
            catalog_path: None,
            secret_env_keys: vec!["OPENAI_API_KEY".to_string()],
        }
    }
}

impl BatchSettings {
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let settings: BatchSettings = toml::from_str(raw)?;
        settings.validate()?;
        Ok(settings)
    }

    /// Read `path` (defaults when `None`) and apply process environment
    /// overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut settings = match path {
            Some(path) => Self::from_toml_str(&std::fs::read_to_string(path)?)?,
            None => Self::default(),
        };
        settings.apply_overrides(|key| std::env::var(key).ok())?;
        Ok(settings)
    }

    /// Apply `CONVSIM_*` overrides resolved through `lookup`.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(file) = lookup("CONVSIM_COMPOSE_FILE") {
            self.compose.compose_file = PathBuf::from(file);
        }
        if let Some(dir) = lookup("CONVSIM_RESULTS_DIR") {
            self.results_dir = PathBuf::from(dir);
        }
        if let Some(raw) = lookup("CONVSIM_PORT_START") {
            self.ports.start = raw
                .trim()
                .parse()
                .ok()
                .filter(|&port: &u16| port > 0)
                .ok_or_else(|| {
                    SimError::InvalidSettings(format!("CONVSIM_PORT_START is not a port: {raw}"))
                })?;
        }
        if let Some(raw) = lookup("CONVSIM_COOLDOWN_MS") {
            self.cooldown_ms = raw.trim().parse().map_err(|_| {
                SimError::InvalidSettings(format!("CONVSIM_COOLDOWN_MS is not a number: {raw}"))
            })?;
        }
        self.validate()
    }

    fn validate(&self) -> Result<()> {
        if self.ports.start == 0 {
            return Err(SimError::InvalidSettings("ports.start must be > 0".to_string()));
        }
        if self.ports.max_attempts == 0 {
            return Err(SimError::InvalidSettings(
                "ports.max_attempts must be > 0".to_string(),
            ));
        }
        if self.readiness.max_retries == 0 {
            return Err(SimError::InvalidSettings(
                "readiness.max_retries must be > 0".to_string(),
            ));
        }
        Ok(())
    }

    pub fn readiness_policy(&self) -> ReadinessPolicy {
        ReadinessPolicy {
            max_retries: self.readiness.max_retries,
            poll_interval_ms: self.readiness.poll_interval_ms,
        }
    }

    pub fn port_allocator(&self) -> PortAllocator {
        PortAllocator::new(self.ports.max_attempts)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.readiness.probe_timeout_ms)
    }

    pub fn seed_timeout(&self) -> Duration {
        Duration::from_millis(self.seed_timeout_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.dialogue.request_timeout_secs)
    }

    pub fn run_deadline(&self) -> Option<Duration> {
        (self.run_deadline_secs > 0).then(|| Duration::from_secs(self.run_deadline_secs))
    }

    pub fn cooldown_policy(&self) -> CooldownPolicy {
        CooldownPolicy::fixed(Duration::from_millis(self.cooldown_ms))
    }

    /// Secrets named by `secret_env_keys` that are set in the process env.
    pub fn secrets(&self) -> Secrets {
        Secrets::from_env(&self.secret_env_keys)
    }
}
