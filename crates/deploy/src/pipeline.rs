//! End-to-end deployment run: pre-flight estimate, sequential deployment, verification
//! and report assembly.

use alloy_core::primitives::U256;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{
    ArtifactStore, NetworkProfile,
    estimator::{BufferFactor, CostEstimate, CostEstimator, Verdict},
    executor::{DeploymentExecutor, ExecutorConfig},
    plan::DeploymentPlan,
    provider::NetworkProvider,
    report::{DeploymentReport, ReportError, SummaryReporter},
    verify::{Explorer, VerificationAgent},
};

/// When deployed contracts are submitted for verification.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
)]
#[strum(serialize_all = "kebab-case")]
#[serde(rename_all = "kebab-case")]
pub enum VerifyMode {
    /// Right after each step is confirmed.
    #[default]
    AfterEachStep,
    /// Once every step is confirmed. Nothing is verified if the run aborts.
    AfterAll,
    Skip,
}

#[derive(Debug, Clone, Copy)]
pub struct PipelineOptions {
    pub verify_mode: VerifyMode,
    /// Run the cost estimator before submitting anything.
    pub preflight: bool,
    /// Deploy even when the pre-flight verdict is insufficient.
    pub force: bool,
    pub buffer_factor: BufferFactor,
    pub executor: ExecutorConfig,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            verify_mode: VerifyMode::default(),
            preflight: true,
            force: false,
            buffer_factor: BufferFactor::default(),
            executor: ExecutorConfig::default(),
        }
    }
}

/// Failures that stop a run before any result exists.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PipelineError {
    #[error(
        "insufficient funds: estimated cost with buffer is {required} wei, balance is {available} wei (use --force to deploy anyway)"
    )]
    InsufficientFunds {
        required: U256,
        available: U256,
        estimate: Box<CostEstimate>,
    },

    #[error(transparent)]
    Report(#[from] ReportError),
}

/// Ties the estimator, executor, verification agent and reporter together.
pub struct Pipeline<'a, P, E> {
    provider: &'a P,
    profile: &'a NetworkProfile,
    artifacts: ArtifactStore,
    agent: VerificationAgent<E>,
    options: PipelineOptions,
}

impl<'a, P, E> Pipeline<'a, P, E>
where
    P: NetworkProvider,
    E: Explorer,
{
    pub fn new(
        provider: &'a P,
        profile: &'a NetworkProfile,
        artifacts: ArtifactStore,
        explorer: E,
        options: PipelineOptions,
    ) -> Self {
        Self {
            provider,
            profile,
            artifacts,
            agent: VerificationAgent::new(explorer),
            options,
        }
    }

    /// Deploy `plan` and return the report.
    ///
    /// An aborted deployment is not an error: the report carries the failure and every
    /// result produced before it.
    pub async fn run(&self, plan: &DeploymentPlan) -> Result<DeploymentReport, PipelineError> {
        let reporter = SummaryReporter::new(self.profile, self.provider.signer_address());

        let estimate = if self.options.preflight {
            self.preflight(plan).await?
        } else {
            None
        };

        let executor = DeploymentExecutor::new(self.artifacts.clone(), self.options.executor);
        let profile = self.profile;

        let execution = match self.options.verify_mode {
            VerifyMode::AfterEachStep => {
                executor
                    .run_with(self.provider, plan, profile, |result| {
                        self.agent.verify(result, profile)
                    })
                    .await
            }
            VerifyMode::AfterAll | VerifyMode::Skip => {
                executor.run(self.provider, plan, profile).await
            }
        };

        let results = if self.options.verify_mode == VerifyMode::AfterAll && execution.is_success()
        {
            self.agent.verify_all(execution.results, profile).await
        } else {
            execution.results
        };

        let report = reporter.summarize(results, estimate)?;
        Ok(match &execution.failure {
            Some(failure) => report.with_failure(failure),
            None => report,
        })
    }

    /// Estimate the plan's cost. Estimation problems are warnings; only an insufficient
    /// verdict stops the run, and only without `force`.
    async fn preflight(
        &self,
        plan: &DeploymentPlan,
    ) -> Result<Option<CostEstimate>, PipelineError> {
        let signer = self.provider.signer_address();
        let balance = match self.provider.balance(signer).await {
            Ok(balance) => balance,
            Err(e) => {
                tracing::warn!(error = %format!("{e:#}"), "Failed to query balance, skipping pre-flight estimate");
                return Ok(None);
            }
        };

        let estimator = CostEstimator::new(self.artifacts.clone())
            .with_buffer_factor(self.options.buffer_factor);

        let estimate = match estimator.estimate(self.provider, plan, self.profile, balance).await {
            Ok(estimate) => estimate,
            Err(e) => {
                tracing::warn!(error = %e, "Cost estimation failed, continuing without estimate");
                return Ok(None);
            }
        };

        tracing::info!(
            verdict = %estimate.verdict,
            total_cost = %estimate.total_cost,
            cost_with_buffer = %estimate.cost_with_buffer,
            balance = %estimate.funded_balance,
            "Pre-flight estimate"
        );

        match estimate.verdict {
            Verdict::Insufficient if !self.options.force => {
                Err(PipelineError::InsufficientFunds {
                    required: estimate.cost_with_buffer,
                    available: estimate.funded_balance,
                    estimate: Box::new(estimate),
                })
            }
            Verdict::Insufficient => {
                tracing::warn!("Balance is insufficient, deploying anyway (--force)");
                Ok(Some(estimate))
            }
            Verdict::Tight => {
                tracing::warn!("Balance covers the estimate but not the safety buffer");
                Ok(Some(estimate))
            }
            Verdict::Sufficient => Ok(Some(estimate)),
        }
    }
}
