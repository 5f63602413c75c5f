//! Container orchestration backend.
//!
//! The default backend shells out to `docker compose`, using the environment
//! handle's project name as the namespace so containers, networks, and
//! volumes of different runs never overlap.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::error::EnvError;
use crate::handle::{EnvironmentHandle, Secrets};
use crate::Result;

/// Brings a namespaced deployment up or down.
#[async_trait]
pub trait Orchestrator: Send + Sync {
    /// Launch everything for `handle`. Returns once the launch command exits.
    async fn up(&self, handle: &EnvironmentHandle, secrets: &Secrets) -> Result<()>;

    /// Remove everything scoped to `handle`, including persisted volumes.
    async fn down(&self, handle: &EnvironmentHandle) -> Result<()>;
}

/// Compose action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComposeAction {
    Up,
    Down,
}

impl ComposeAction {
    fn args(self) -> &'static [&'static str] {
        match self {
            ComposeAction::Up => &["up", "-d"],
            ComposeAction::Down => &["down", "-v", "--remove-orphans"],
        }
    }
}

/// `docker compose` invocation settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ComposeConfig {
    /// Executable to run (`docker`).
    pub program: String,
    /// Compose file passed with `-f`.
    pub compose_file: PathBuf,
    /// Directory the command runs in.
    pub working_dir: PathBuf,
    /// Upper bound for a single `up`/`down` invocation (0 = unbounded).
    pub command_timeout_secs: u64,
}

impl Default for ComposeConfig {
    fn default() -> Self {
        Self {
            program: "docker".to_string(),
            compose_file: PathBuf::from("docker-compose.eval.yml"),
            working_dir: PathBuf::from("."),
            command_timeout_secs: 300,
        }
    }
}

/// Orchestrator backed by `docker compose -p <project>`.
#[derive(Debug, Clone)]
pub struct ComposeOrchestrator {
    config: ComposeConfig,
}

impl ComposeOrchestrator {
    pub fn new(config: ComposeConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ComposeConfig {
        &self.config
    }

    /// Arguments passed to `program` for `action` on `handle`.
    pub fn compose_args(&self, handle: &EnvironmentHandle, action: ComposeAction) -> Vec<String> {
        let mut args = vec![
            "compose".to_string(),
            "-f".to_string(),
            self.config.compose_file.to_string_lossy().to_string(),
            "-p".to_string(),
            handle.project_name.clone(),
        ];
        args.extend(action.args().iter().map(|a| a.to_string()));
        args
    }

    /// Variables the compose file interpolates for this run.
    pub fn run_env(handle: &EnvironmentHandle) -> Vec<(String, String)> {
        vec![
            ("EVAL_RUN_ID".to_string(), handle.run_id.clone()),
            ("EVAL_APP_PORT".to_string(), handle.app_port.to_string()),
            ("EVAL_DB_PORT".to_string(), handle.db_port.to_string()),
        ]
    }

    async fn exec(
        &self,
        handle: &EnvironmentHandle,
        action: ComposeAction,
        secrets: Option<&Secrets>,
    ) -> std::result::Result<(), String> {
        let args = self.compose_args(handle, action);
        debug!(program = %self.config.program, args = ?args, "running compose command");

        let mut cmd = Command::new(&self.config.program);
        cmd.args(&args)
            .current_dir(&self.config.working_dir)
            .envs(Self::run_env(handle))
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(secrets) = secrets {
            cmd.envs(secrets.iter());
        }

        let child = cmd.spawn().map_err(|e| format!("spawn {}: {e}", self.config.program))?;

        let waited = if self.config.command_timeout_secs > 0 {
            tokio::time::timeout(
                Duration::from_secs(self.config.command_timeout_secs),
                child.wait_with_output(),
            )
            .await
            .map_err(|_| {
                format!(
                    "compose {:?} timed out after {} seconds",
                    action, self.config.command_timeout_secs
                )
            })?
        } else {
            child.wait_with_output().await
        };
        let output = waited.map_err(|e| e.to_string())?;

        if output.status.success() {
            Ok(())
        } else {
            let stderr = String::from_utf8_lossy(&output.stderr);
            Err(format!(
                "exit code {}: {}",
                output.status.code().unwrap_or(-1),
                stderr.trim()
            ))
        }
    }
}

#[async_trait]
impl Orchestrator for ComposeOrchestrator {
    async fn up(&self, handle: &EnvironmentHandle, secrets: &Secrets) -> Result<()> {
        info!(
            project = %handle.project_name,
            app_port = handle.app_port,
            db_port = handle.db_port,
            "starting isolated environment"
        );
        self.exec(handle, ComposeAction::Up, Some(secrets))
            .await
            .map_err(|reason| EnvError::StartFailure {
                run_id: handle.run_id.clone(),
                reason,
            })
    }

    async fn down(&self, handle: &EnvironmentHandle) -> Result<()> {
        info!(project = %handle.project_name, "tearing down isolated environment");
        self.exec(handle, ComposeAction::Down, None)
            .await
            .map_err(|reason| {
                warn!(project = %handle.project_name, %reason, "compose down failed");
                EnvError::TeardownFailure {
                    run_id: handle.run_id.clone(),
                    reason,
                }
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn orchestrator(program: &str) -> ComposeOrchestrator {
        ComposeOrchestrator::new(ComposeConfig {
            program: program.to_string(),
            compose_file: PathBuf::from("docker-compose.eval.yml"),
            working_dir: std::env::temp_dir(),
            command_timeout_secs: 10,
        })
    }

    #[test]
    fn test_up_args_are_namespaced() {
        let handle = EnvironmentHandle::new("run-7", 4001, 4002);
        let args = orchestrator("docker").compose_args(&handle, ComposeAction::Up);
        assert_eq!(
            args,
            vec![
                "compose",
                "-f",
                "docker-compose.eval.yml",
                "-p",
                "eval-run-7",
                "up",
                "-d"
            ]
        );
    }

    #[test]
    fn test_down_removes_volumes() {
        let handle = EnvironmentHandle::new("run-7", 4001, 4002);
        let args = orchestrator("docker").compose_args(&handle, ComposeAction::Down);
        assert!(args.contains(&"down".to_string()));
        assert!(args.contains(&"-v".to_string()));
    }

    #[test]
    fn test_run_env_carries_ports() {
        let handle = EnvironmentHandle::new("run-7", 4001, 4002);
        let env = ComposeOrchestrator::run_env(&handle);
        assert!(env.contains(&("EVAL_RUN_ID".to_string(), "run-7".to_string())));
        assert!(env.contains(&("EVAL_APP_PORT".to_string(), "4001".to_string())));
        assert!(env.contains(&("EVAL_DB_PORT".to_string(), "4002".to_string())));
    }

    #[tokio::test]
    async fn test_zero_exit_is_success() {
        let handle = EnvironmentHandle::new("run-ok", 4001, 4002);
        orchestrator("true")
            .up(&handle, &Secrets::new())
            .await
            .expect("`true` exits 0");
    }

    #[tokio::test]
    async fn test_nonzero_exit_is_start_failure() {
        let handle = EnvironmentHandle::new("run-bad", 4001, 4002);
        let err = orchestrator("false")
            .up(&handle, &Secrets::new())
            .await
            .unwrap_err();
        assert!(matches!(err, EnvError::StartFailure { ref run_id, .. } if run_id == "run-bad"));
    }

    #[tokio::test]
    async fn test_missing_program_is_start_failure() {
        let handle = EnvironmentHandle::new("run-missing", 4001, 4002);
        let err = orchestrator("definitely-not-a-real-binary-convsim")
            .up(&handle, &Secrets::new())
            .await
            .unwrap_err();
        assert!(matches!(err, EnvError::StartFailure { .. }));
    }

    #[tokio::test]
    async fn test_failed_down_is_teardown_failure() {
        let handle = EnvironmentHandle::new("run-down", 4001, 4002);
        let err = orchestrator("false").down(&handle).await.unwrap_err();
        assert!(matches!(err, EnvError::TeardownFailure { .. }));
    }
}
