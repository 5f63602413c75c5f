//! Environment handle, namespace naming, and secrets.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

/// Host used in derived endpoint URLs.
pub const DEFAULT_HOST: &str = "127.0.0.1";

/// Prefix for orchestration project names.
pub const PROJECT_PREFIX: &str = "eval-";

const MAX_PROJECT_NAME_LEN: usize = 63;

/// Identity and addresses of one isolated deployment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvironmentHandle {
    /// Unique run identifier.
    pub run_id: String,
    /// Orchestration namespace derived from `run_id`.
    pub project_name: String,
    /// Host port the application is published on.
    pub app_port: u16,
    /// Host port the database is published on.
    pub db_port: u16,
    /// Base URL of the application (readiness probe target).
    pub app_url: String,
    /// Chat endpoint exercised by the dialogue.
    pub chat_endpoint: String,
    /// Fixture seeding endpoint.
    pub seed_endpoint: String,
}

impl EnvironmentHandle {
    /// Build a handle for `run_id` on the loopback host.
    pub fn new(run_id: &str, app_port: u16, db_port: u16) -> Self {
        Self::with_host(run_id, app_port, db_port, DEFAULT_HOST)
    }

    /// Build a handle whose URLs point at `host`.
    pub fn with_host(run_id: &str, app_port: u16, db_port: u16, host: &str) -> Self {
        let app_url = format!("http://{host}:{app_port}");
        Self {
            run_id: run_id.to_string(),
            project_name: project_name_for(run_id),
            app_port,
            db_port,
            chat_endpoint: format!("{app_url}/api/chat"),
            seed_endpoint: format!("{app_url}/api/eval/seed"),
            app_url,
        }
    }
}

/// Derive a compose-safe project name from a run id.
///
/// Lowercases, maps anything outside `[a-z0-9_-]` to `-`, and when the result
/// is too long truncates it and appends a short SHA-256 of the original id so
/// distinct run ids never collapse to the same namespace.
pub fn project_name_for(run_id: &str) -> String {
    let sanitized: String = run_id
        .chars()
        .map(|c| {
            let c = c.to_ascii_lowercase();
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '-'
            }
        })
        .collect();

    let name = format!("{PROJECT_PREFIX}{sanitized}");
    if name.len() <= MAX_PROJECT_NAME_LEN {
        return name;
    }

    let digest = hex::encode(Sha256::digest(run_id.as_bytes()));
    let keep = MAX_PROJECT_NAME_LEN - 13;
    format!("{}-{}", &name[..keep], &digest[..12])
}

/// Environment variables forwarded into the deployment.
///
/// `Debug` prints keys only.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Secrets(BTreeMap<String, String>);

impl Secrets {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a secret.
    pub fn with(mut self, key: &str, value: &str) -> Self {
        self.0.insert(key.to_string(), value.to_string());
        self
    }

    /// Collect whichever of `keys` are set in the process environment.
    pub fn from_env<S: AsRef<str>>(keys: &[S]) -> Self {
        let mut secrets = Self::new();
        for key in keys {
            if let Ok(value) = std::env::var(key.as_ref()) {
                secrets.0.insert(key.as_ref().to_string(), value);
            }
        }
        secrets
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &String)> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl std::fmt::Debug for Secrets {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_set().entries(self.0.keys()).finish()
    }
}
