//! Isolated run coordinator: one (persona, goal) simulation in its own
//! environment.
//!
//! `run` provisions an environment, then under the run deadline and a panic
//! guard: start, await readiness, seed, rebind the endpoint, drive the
//! dialogue and extract metrics. Teardown happens afterwards in every case
//! and its failure is only logged.

use async_trait::async_trait;
use futures::FutureExt;
use isolated_env::{
    ComposeOrchestrator, Environment, EnvironmentProvider, HttpProbe, IsolatedEnvironmentProvider,
    ReadinessPolicy, Secrets,
};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::Instrument;

use crate::dialogue::{DialogueDriver, HttpChatClient, ScriptedUtteranceGenerator};
use crate::domain::{Result, SimError, SimulationConfig, SimulationResult};
use crate::judge::{MetricsExtractor, RuleBasedJudge};
use crate::metrics::METRICS;
use crate::obs;
use crate::settings::BatchSettings;

/// Runs one simulation to completion.
#[async_trait]
pub trait SimulationRunner: Send + Sync {
    async fn run(&self, config: SimulationConfig) -> Result<SimulationResult>;
}

/// [`SimulationRunner`] that gives every run a fresh isolated environment.
pub struct IsolatedRunner {
    provider: Arc<dyn EnvironmentProvider>,
    driver: DialogueDriver,
    extractor: MetricsExtractor,
    secrets: Secrets,
    readiness: ReadinessPolicy,
    run_deadline: Option<Duration>,
}

impl IsolatedRunner {
    pub fn new(
        provider: Arc<dyn EnvironmentProvider>,
        driver: DialogueDriver,
        extractor: MetricsExtractor,
    ) -> Self {
        Self {
            provider,
            driver,
            extractor,
            secrets: Secrets::new(),
            readiness: ReadinessPolicy::default(),
            run_deadline: None,
        }
    }

    pub fn with_secrets(mut self, secrets: Secrets) -> Self {
        self.secrets = secrets;
        self
    }

    pub fn with_readiness(mut self, readiness: ReadinessPolicy) -> Self {
        self.readiness = readiness;
        self
    }

    pub fn with_run_deadline(mut self, deadline: Option<Duration>) -> Self {
        self.run_deadline = deadline;
        self
    }

    /// Wire the production stack: compose orchestration, HTTP probe and
    /// chat client, scripted utterances, rule-based judge.
    pub fn from_settings(settings: &BatchSettings) -> Result<Self> {
        let orchestrator = Arc::new(ComposeOrchestrator::new(settings.compose.clone()));
        let probe = Arc::new(HttpProbe::new(
            settings.probe_timeout(),
            settings.seed_timeout(),
        )?);
        let provider = IsolatedEnvironmentProvider::new(orchestrator, probe)
            .with_allocator(settings.port_allocator(), settings.ports.start)
            .with_host(&settings.host);

        let transport = Arc::new(HttpChatClient::new(settings.request_timeout())?);
        let driver = DialogueDriver::new(transport, Arc::new(ScriptedUtteranceGenerator::new()))
            .with_policy(settings.dialogue.policy.clone());
        let extractor = MetricsExtractor::new(Arc::new(RuleBasedJudge::new()));

        Ok(Self::new(Arc::new(provider), driver, extractor)
            .with_secrets(settings.secrets())
            .with_readiness(settings.readiness_policy())
            .with_run_deadline(settings.run_deadline()))
    }

    async fn execute(
        &self,
        env: &mut dyn Environment,
        mut config: SimulationConfig,
    ) -> Result<SimulationResult> {
        METRICS.inc_environments_started();
        env.start(&self.secrets).await?;
        env.await_ready(&self.readiness).await?;
        env.seed().await?;

        config.rebind_endpoint(&env.handle().chat_endpoint);
        let outcome = self
            .driver
            .drive(
                &config.api_endpoint,
                &config.persona,
                &config.goal,
                config.max_turns,
                config.effective_seed(),
            )
            .await;

        let (metrics, judge_error) = self
            .extractor
            .extract(&outcome.transcript, &config.goal)
            .await;
        let mut errors = outcome.errors;
        errors.extend(judge_error);

        Ok(SimulationResult {
            config,
            transcript: outcome.transcript,
            metrics,
            errors,
        })
    }

    async fn guarded(
        &self,
        env: &mut dyn Environment,
        config: SimulationConfig,
    ) -> Result<SimulationResult> {
        let simulation_id = config.simulation_id.clone();
        let inner = AssertUnwindSafe(self.execute(env, config)).catch_unwind();

        let caught = match self.run_deadline {
            Some(limit) => match tokio::time::timeout(limit, inner).await {
                Ok(caught) => caught,
                Err(_) => {
                    return Err(SimError::DeadlineExceeded {
                        simulation_id,
                        limit_ms: limit.as_millis() as u64,
                    })
                }
            },
            None => inner.await,
        };

        caught.unwrap_or_else(|payload| {
            Err(SimError::Panicked {
                simulation_id,
                reason: panic_reason(payload.as_ref()),
            })
        })
    }
}

fn panic_reason(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

#[async_trait]
impl SimulationRunner for IsolatedRunner {
    async fn run(&self, config: SimulationConfig) -> Result<SimulationResult> {
        let span = obs::RunSpan::span(&config.simulation_id);
        async move {
            let started = Instant::now();
            let simulation_id = config.simulation_id.clone();
            obs::emit_run_started(&simulation_id, &config.persona.id, &config.goal.id);

            let mut env = self.provider.provision(&simulation_id)?;
            let outcome = self.guarded(env.as_mut(), config).await;

            match env.stop().await {
                Ok(()) => METRICS.inc_environments_stopped(),
                Err(e) => {
                    METRICS.inc_teardown_warnings();
                    obs::emit_teardown_warning(&env.handle().run_id, &e);
                }
            }

            let duration_ms = started.elapsed().as_millis() as u64;
            match &outcome {
                Ok(result) => {
                    obs::emit_run_finished(&simulation_id, duration_ms, result.metrics.total_turns, true)
                }
                Err(e) => {
                    obs::emit_run_failed(&simulation_id, e);
                    obs::emit_run_finished(&simulation_id, duration_ms, 0, false);
                }
            }
            outcome
        }
        .instrument(span)
        .await
    }
}
