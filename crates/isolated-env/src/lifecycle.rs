//! Environment lifecycle: start, readiness polling, seeding, teardown.
//!
//! [`Environment`] is the capability the run coordinator depends on.
//! [`ManagedEnvironment`] implements it over any [`Orchestrator`] and
//! [`Probe`], and [`IsolatedEnvironmentProvider`] hands out one per run with
//! freshly allocated ports.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::error::EnvError;
use crate::handle::{EnvironmentHandle, Secrets};
use crate::orchestrator::Orchestrator;
use crate::ports::{PortAllocator, DEFAULT_START_PORT};
use crate::probe::Probe;
use crate::state::EnvironmentState;
use crate::Result;

/// Bounded readiness polling.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ReadinessPolicy {
    /// Number of probes before giving up.
    pub max_retries: u32,
    /// Fixed delay between probes (milliseconds).
    pub poll_interval_ms: u64,
}

impl Default for ReadinessPolicy {
    fn default() -> Self {
        Self {
            max_retries: 30,
            poll_interval_ms: 2_000,
        }
    }
}

impl ReadinessPolicy {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

/// One isolated deployment, driven through its lifecycle by the caller.
#[async_trait]
pub trait Environment: Send {
    fn handle(&self) -> &EnvironmentHandle;

    fn state(&self) -> EnvironmentState;

    /// Launch the deployment. Does not imply readiness.
    async fn start(&mut self, secrets: &Secrets) -> Result<()>;

    /// Poll until the application answers or the policy is exhausted.
    async fn await_ready(&mut self, policy: &ReadinessPolicy) -> Result<()>;

    /// Load fixture data. Called once, never retried.
    async fn seed(&mut self) -> Result<()>;

    /// Tear down whatever exists. Idempotent.
    async fn stop(&mut self) -> Result<()>;
}

/// Creates a fresh [`Environment`] per run.
pub trait EnvironmentProvider: Send + Sync {
    fn provision(&self, run_id: &str) -> Result<Box<dyn Environment>>;
}

/// [`Environment`] backed by an [`Orchestrator`] and a [`Probe`].
pub struct ManagedEnvironment {
    handle: EnvironmentHandle,
    state: EnvironmentState,
    launch_attempted: bool,
    orchestrator: Arc<dyn Orchestrator>,
    probe: Arc<dyn Probe>,
}

impl ManagedEnvironment {
    pub fn new(
        handle: EnvironmentHandle,
        orchestrator: Arc<dyn Orchestrator>,
        probe: Arc<dyn Probe>,
    ) -> Self {
        Self {
            handle,
            state: EnvironmentState::Unstarted,
            launch_attempted: false,
            orchestrator,
            probe,
        }
    }

    fn transition(&mut self, next: EnvironmentState) -> Result<()> {
        if !self.state.can_transition_to(next) {
            return Err(EnvError::InvalidTransition {
                run_id: self.handle.run_id.clone(),
                from: self.state,
                to: next,
            });
        }
        debug!(
            event = "env.transition",
            run_id = %self.handle.run_id,
            from = %self.state,
            to = %next,
        );
        self.state = next;
        Ok(())
    }

    fn fail(&mut self) {
        if self.state.can_transition_to(EnvironmentState::Error) {
            debug!(
                event = "env.transition",
                run_id = %self.handle.run_id,
                from = %self.state,
                to = %EnvironmentState::Error,
            );
            self.state = EnvironmentState::Error;
        }
    }
}

#[async_trait]
impl Environment for ManagedEnvironment {
    fn handle(&self) -> &EnvironmentHandle {
        &self.handle
    }

    fn state(&self) -> EnvironmentState {
        self.state
    }

    async fn start(&mut self, secrets: &Secrets) -> Result<()> {
        self.transition(EnvironmentState::Starting)?;
        self.launch_attempted = true;

        if let Err(e) = self.orchestrator.up(&self.handle, secrets).await {
            self.fail();
            return Err(e);
        }
        info!(run_id = %self.handle.run_id, "environment launched");
        Ok(())
    }

    async fn await_ready(&mut self, policy: &ReadinessPolicy) -> Result<()> {
        if self.state != EnvironmentState::Starting {
            return Err(EnvError::InvalidTransition {
                run_id: self.handle.run_id.clone(),
                from: self.state,
                to: EnvironmentState::Ready,
            });
        }

        let attempts = policy.max_retries.max(1);
        for attempt in 1..=attempts {
            if self.probe.is_ready(&self.handle.app_url).await {
                info!(run_id = %self.handle.run_id, attempt, "environment ready");
                return self.transition(EnvironmentState::Ready);
            }
            debug!(
                run_id = %self.handle.run_id,
                attempt,
                max = attempts,
                "environment not ready yet"
            );
            if attempt < attempts {
                tokio::time::sleep(policy.poll_interval()).await;
            }
        }

        self.fail();
        Err(EnvError::Timeout {
            run_id: self.handle.run_id.clone(),
            attempts,
        })
    }

    async fn seed(&mut self) -> Result<()> {
        if self.state != EnvironmentState::Ready {
            return Err(EnvError::InvalidTransition {
                run_id: self.handle.run_id.clone(),
                from: self.state,
                to: EnvironmentState::Seeded,
            });
        }

        match self.probe.seed(&self.handle.seed_endpoint).await {
            Ok(_) => {
                info!(run_id = %self.handle.run_id, "environment seeded");
                self.transition(EnvironmentState::Seeded)
            }
            Err(reason) => {
                self.fail();
                Err(EnvError::SeedFailure {
                    run_id: self.handle.run_id.clone(),
                    reason,
                })
            }
        }
    }

    async fn stop(&mut self) -> Result<()> {
        if self.state == EnvironmentState::Stopped {
            return Ok(());
        }
        self.transition(EnvironmentState::Stopping)?;

        if !self.launch_attempted {
            return self.transition(EnvironmentState::Stopped);
        }

        match self.orchestrator.down(&self.handle).await {
            Ok(()) => self.transition(EnvironmentState::Stopped),
            Err(e) => {
                warn!(run_id = %self.handle.run_id, error = %e, "teardown failed");
                self.fail();
                Err(e)
            }
        }
    }
}

/// Provisions [`ManagedEnvironment`]s on freshly allocated ports.
pub struct IsolatedEnvironmentProvider {
    allocator: PortAllocator,
    start_port: u16,
    host: String,
    orchestrator: Arc<dyn Orchestrator>,
    probe: Arc<dyn Probe>,
}

impl IsolatedEnvironmentProvider {
    pub fn new(orchestrator: Arc<dyn Orchestrator>, probe: Arc<dyn Probe>) -> Self {
        Self {
            allocator: PortAllocator::default(),
            start_port: DEFAULT_START_PORT,
            host: crate::handle::DEFAULT_HOST.to_string(),
            orchestrator,
            probe,
        }
    }

    pub fn with_allocator(mut self, allocator: PortAllocator, start_port: u16) -> Self {
        self.allocator = allocator;
        self.start_port = start_port;
        self
    }

    pub fn with_host(mut self, host: &str) -> Self {
        self.host = host.to_string();
        self
    }
}

impl EnvironmentProvider for IsolatedEnvironmentProvider {
    fn provision(&self, run_id: &str) -> Result<Box<dyn Environment>> {
        let ports = self.allocator.allocate(2, self.start_port)?;
        let handle = EnvironmentHandle::with_host(run_id, ports[0], ports[1], &self.host);
        info!(
            run_id = %run_id,
            app_port = handle.app_port,
            db_port = handle.db_port,
            "assigned ports"
        );
        Ok(Box::new(ManagedEnvironment::new(
            handle,
            Arc::clone(&self.orchestrator),
            Arc::clone(&self.probe),
        )))
    }
}
