//! Sequential deployment of a plan.
//!
//! Steps are submitted one at a time under a single signer with strictly increasing
//! nonces. A step is only considered done once its receipt is buried under the profile's
//! confirmation depth, and only then may later steps consume its address.

use std::future::Future;
use std::time::Duration;

use alloy_core::primitives::{Address, B256, U256};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{
    ArtifactStore, NetworkProfile,
    artifacts::ArgumentError,
    plan::{ArtifactKind, ConstructorArg, DeploymentStep, StepRef},
    provider::{NetworkProvider, TransactionReceipt, TransactionRequest},
    rpc,
};

/// Default interval between receipt polls.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(3);

/// Default upper bound on a single confirmation wait.
pub const DEFAULT_CONFIRMATION_TIMEOUT_SECS: u64 = 600;

/// Outcome of one confirmed deployment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentResult {
    pub index: StepRef,
    pub step: DeploymentStep,
    /// Constructor arguments as submitted, placeholders replaced by addresses.
    pub resolved_args: Vec<ConstructorArg>,
    pub address: Address,
    pub transaction_id: B256,
    pub block_number: u64,
    pub gas_used: u64,
    pub confirmations_observed: u64,
    pub verified: bool,
    pub verification_error: Option<String>,
}

impl DeploymentResult {
    pub fn kind(&self) -> ArtifactKind {
        self.step.kind
    }
}

/// Fatal deployment failures. Each one aborts the remaining steps.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DeployError {
    #[error("step {step} depends on step {depends_on}, which has not produced a confirmed result")]
    DependencyUnresolved { step: StepRef, depends_on: StepRef },

    #[error("failed to load {kind} artifact: {message}")]
    Artifact { kind: ArtifactKind, message: String },

    #[error(transparent)]
    Argument(#[from] ArgumentError),

    #[error("failed to query {what}: {message}")]
    Query { what: &'static str, message: String },

    #[error("failed to submit {kind} deployment: {message}")]
    Submission { kind: ArtifactKind, message: String },

    #[error("{kind} deployment transaction {tx} reverted")]
    Reverted { kind: ArtifactKind, tx: B256 },

    #[error(
        "timed out after {waited:?} waiting for {depth} confirmations of {kind} deployment {tx}{}",
        rpc::format_last_error(.last_error)
    )]
    ConfirmationTimeout {
        kind: ArtifactKind,
        tx: B256,
        depth: u64,
        waited: Duration,
        /// The RPC error behind the last failed poll, when the node was unreachable.
        last_error: Option<String>,
    },

    #[error("receipt of {kind} deployment {tx} has no contract address")]
    MissingContractAddress { kind: ArtifactKind, tx: B256 },
}

/// Results of a run. On abort, `failure` is set and `results` holds every step that
/// completed before it, unmodified.
#[derive(Debug, Clone, Default)]
pub struct Execution {
    pub results: Vec<DeploymentResult>,
    pub failure: Option<DeployError>,
}

impl Execution {
    pub fn is_success(&self) -> bool {
        self.failure.is_none()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExecutorConfig {
    pub poll_interval: Duration,
    /// `None` waits for confirmations indefinitely.
    pub confirmation_timeout: Option<Duration>,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
            confirmation_timeout: Some(Duration::from_secs(DEFAULT_CONFIRMATION_TIMEOUT_SECS)),
        }
    }
}

/// Submits plan steps in order and waits for each to reach the confirmation depth.
#[derive(Debug, Clone)]
pub struct DeploymentExecutor {
    artifacts: ArtifactStore,
    config: ExecutorConfig,
}

impl DeploymentExecutor {
    pub fn new(artifacts: ArtifactStore, config: ExecutorConfig) -> Self {
        Self { artifacts, config }
    }

    /// Deploy every step in order.
    pub async fn run<P: NetworkProvider>(
        &self,
        provider: &P,
        steps: &[DeploymentStep],
        profile: &NetworkProfile,
    ) -> Execution {
        self.run_with(provider, steps, profile, std::future::ready)
            .await
    }

    /// Deploy every step in order, handing each confirmed result to `after_step` before
    /// moving on.
    ///
    /// Only the verification fields of the value returned by `after_step` are kept; the
    /// deployment outcome itself cannot be altered.
    pub async fn run_with<P, F, Fut>(
        &self,
        provider: &P,
        steps: &[DeploymentStep],
        profile: &NetworkProfile,
        mut after_step: F,
    ) -> Execution
    where
        P: NetworkProvider,
        F: FnMut(DeploymentResult) -> Fut,
        Fut: Future<Output = DeploymentResult>,
    {
        let mut execution = Execution::default();

        let signer = provider.signer_address();
        let mut nonce = match provider.nonce(signer).await {
            Ok(nonce) => nonce,
            Err(e) => {
                execution.failure = Some(DeployError::Query {
                    what: "signer nonce",
                    message: format!("{e:#}"),
                });
                return execution;
            }
        };

        tracing::info!(
            network = %profile.name,
            signer = %signer,
            steps = steps.len(),
            confirmation_depth = profile.confirmation_depth,
            "Starting deployment"
        );

        for (index, step) in steps.iter().enumerate() {
            let step_ref = StepRef(index);

            match self
                .deploy_step(provider, profile, step_ref, step, &execution.results, nonce)
                .await
            {
                Ok(mut result) => {
                    nonce += 1;
                    let checked = after_step(result.clone()).await;
                    result.verified = checked.verified;
                    result.verification_error = checked.verification_error;
                    execution.results.push(result);
                }
                Err(e) => {
                    tracing::error!(step = %step_ref, kind = %step.kind, error = %e, "Deployment aborted");
                    execution.failure = Some(e);
                    break;
                }
            }
        }

        execution
    }

    async fn deploy_step<P: NetworkProvider>(
        &self,
        provider: &P,
        profile: &NetworkProfile,
        step_ref: StepRef,
        step: &DeploymentStep,
        completed: &[DeploymentResult],
        nonce: u64,
    ) -> Result<DeploymentResult, DeployError> {
        let resolved_args =
            resolve_arguments(step_ref, step, completed, profile.confirmation_depth)?;

        let artifact = self
            .artifacts
            .load(step.kind)
            .map_err(|e| DeployError::Artifact {
                kind: step.kind,
                message: format!("{e:#}"),
            })?;
        let data = artifact.deploy_data(&resolved_args)?;

        let submission_error = |e: anyhow::Error| DeployError::Submission {
            kind: step.kind,
            message: format!("{e:#}"),
        };

        let signer = provider.signer_address();
        let mut tx = TransactionRequest::deployment(signer, data);
        let gas = provider.estimate_gas(&tx).await.map_err(submission_error)?;
        let gas_price: U256 = provider.gas_price().await.map_err(|e| DeployError::Query {
            what: "gas price",
            message: format!("{e:#}"),
        })?;

        tx.gas = Some(gas);
        tx.gas_price = Some(gas_price);
        tx.nonce = Some(nonce);

        let tx_hash = provider.send_transaction(tx).await.map_err(submission_error)?;

        tracing::info!(
            step = %step_ref,
            kind = %step.kind,
            tx = %tx_hash,
            nonce,
            gas,
            "Deployment submitted, waiting for confirmations..."
        );

        let (receipt, confirmations) = self
            .wait_for_confirmations(provider, tx_hash, profile.confirmation_depth)
            .await
            .map_err(|timeout| DeployError::ConfirmationTimeout {
                kind: step.kind,
                tx: tx_hash,
                depth: profile.confirmation_depth,
                waited: timeout.waited,
                last_error: timeout.last_error,
            })?;

        if !receipt.status {
            return Err(DeployError::Reverted {
                kind: step.kind,
                tx: tx_hash,
            });
        }

        let address = receipt
            .contract_address
            .ok_or(DeployError::MissingContractAddress {
                kind: step.kind,
                tx: tx_hash,
            })?;

        tracing::info!(
            step = %step_ref,
            kind = %step.kind,
            address = %address,
            block = receipt.block_number,
            confirmations,
            "Deployment confirmed"
        );

        Ok(DeploymentResult {
            index: step_ref,
            step: step.clone(),
            resolved_args,
            address,
            transaction_id: tx_hash,
            block_number: receipt.block_number,
            gas_used: receipt.gas_used,
            confirmations_observed: confirmations,
            verified: false,
            verification_error: None,
        })
    }

    /// Poll until the receipt is at least `depth` blocks deep. A reverted receipt is
    /// returned as soon as it is seen.
    async fn wait_for_confirmations<P: NetworkProvider>(
        &self,
        provider: &P,
        tx_hash: B256,
        depth: u64,
    ) -> Result<(TransactionReceipt, u64), rpc::PollTimeout> {
        rpc::poll_until(
            "deployment confirmations",
            self.config.poll_interval,
            self.config.confirmation_timeout,
            || async move {
                let Some(receipt) = provider.transaction_receipt(tx_hash).await? else {
                    return Ok(None);
                };

                if !receipt.status {
                    return Ok(Some((receipt, 0)));
                }

                let head = provider.block_number().await?;
                let confirmations = confirmations_at(head, receipt.block_number);
                tracing::debug!(tx = %tx_hash, confirmations, depth, "Waiting for confirmations");

                Ok((confirmations >= depth).then_some((receipt, confirmations)))
            },
        )
        .await
    }
}

/// Confirmations of a transaction included at `inclusion` when the chain head is `head`.
/// The inclusion block itself counts as the first confirmation.
pub fn confirmations_at(head: u64, inclusion: u64) -> u64 {
    if head < inclusion {
        0
    } else {
        head - inclusion + 1
    }
}

/// Replace placeholders with the addresses of earlier, confirmed results.
fn resolve_arguments(
    step_ref: StepRef,
    step: &DeploymentStep,
    completed: &[DeploymentResult],
    depth: u64,
) -> Result<Vec<ConstructorArg>, DeployError> {
    let confirmed = |dep: StepRef| {
        completed
            .iter()
            .find(|result| result.index == dep)
            .filter(|result| result.confirmations_observed >= depth)
            .map(|result| result.address)
    };

    let unresolved = |dep: StepRef| DeployError::DependencyUnresolved {
        step: step_ref,
        depends_on: dep,
    };

    if let Some(dep) = step.depends_on.filter(|dep| confirmed(*dep).is_none()) {
        return Err(unresolved(dep));
    }

    step.constructor_args
        .iter()
        .map(|arg| match arg {
            ConstructorArg::StepAddress(dep) => confirmed(*dep)
                .map(ConstructorArg::Address)
                .ok_or_else(|| unresolved(*dep)),
            other => Ok(other.clone()),
        })
        .collect()
}
