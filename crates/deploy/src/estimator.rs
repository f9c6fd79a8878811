//! Pre-flight cost estimation.
//!
//! The estimator simulates every planned deployment against a single unit-price
//! snapshot and compares the resulting cost with a funded balance. It never submits
//! anything and never consumes a nonce.

use std::fmt;

use alloy_core::primitives::{Address, U256};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{
    ArtifactStore, NetworkProfile,
    plan::{ArtifactKind, DeploymentStep, StepRef},
    provider::{NetworkProvider, TransactionRequest},
};

/// Basis points in 1.00x.
const BPS_DENOMINATOR: u64 = 10_000;

/// Default safety buffer: 1.20x.
pub const DEFAULT_BUFFER_BPS: u64 = 12_000;

/// Safety multiplier applied to the estimated cost, stored in basis points.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "u64", into = "u64")]
pub struct BufferFactor(u64);

impl BufferFactor {
    /// Create a buffer factor. Must be strictly greater than 1.00x.
    pub fn from_bps(bps: u64) -> Result<Self, EstimateError> {
        if bps <= BPS_DENOMINATOR {
            return Err(EstimateError::InvalidBuffer(bps));
        }
        Ok(Self(bps))
    }

    pub fn bps(&self) -> u64 {
        self.0
    }

    /// `cost × factor`, rounded down to the smallest unit.
    pub fn apply(&self, cost: U256) -> U256 {
        cost * U256::from(self.0) / U256::from(BPS_DENOMINATOR)
    }
}

impl Default for BufferFactor {
    fn default() -> Self {
        Self(DEFAULT_BUFFER_BPS)
    }
}

impl TryFrom<u64> for BufferFactor {
    type Error = EstimateError;

    fn try_from(bps: u64) -> Result<Self, Self::Error> {
        Self::from_bps(bps)
    }
}

impl From<BufferFactor> for u64 {
    fn from(factor: BufferFactor) -> Self {
        factor.0
    }
}

impl fmt::Display for BufferFactor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}.{:02}x",
            self.0 / BPS_DENOMINATOR,
            (self.0 % BPS_DENOMINATOR) / 100
        )
    }
}

/// Whether a balance covers the estimated cost.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, strum::Display)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    /// The balance covers the cost including the safety buffer.
    Sufficient,
    /// The balance covers the raw cost but not the buffer.
    Tight,
    /// The balance does not cover the raw cost.
    Insufficient,
}

impl Verdict {
    pub fn evaluate(funded_balance: U256, total_cost: U256, cost_with_buffer: U256) -> Self {
        if funded_balance >= cost_with_buffer {
            Verdict::Sufficient
        } else if funded_balance >= total_cost {
            Verdict::Tight
        } else {
            Verdict::Insufficient
        }
    }
}

/// Simulated gas for one step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepGas {
    pub step: StepRef,
    pub kind: ArtifactKind,
    pub gas: u64,
    /// `gas × unit_price`.
    pub cost: U256,
}

/// A cost estimate for a whole plan. Immutable once computed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CostEstimate {
    pub per_step_gas: Vec<StepGas>,
    pub unit_price: U256,
    pub buffer_factor: BufferFactor,
    pub total_gas: u64,
    pub total_cost: U256,
    pub cost_with_buffer: U256,
    pub funded_balance: U256,
    pub verdict: Verdict,
}

impl CostEstimate {
    /// Compute totals and the verdict from per-step gas figures and one price snapshot.
    pub fn compute(
        per_step: Vec<(StepRef, ArtifactKind, u64)>,
        unit_price: U256,
        buffer_factor: BufferFactor,
        funded_balance: U256,
    ) -> Self {
        let per_step_gas: Vec<StepGas> = per_step
            .into_iter()
            .map(|(step, kind, gas)| StepGas {
                step,
                kind,
                gas,
                cost: U256::from(gas) * unit_price,
            })
            .collect();

        let total_gas = per_step_gas.iter().map(|s| s.gas).sum();
        let total_cost = per_step_gas
            .iter()
            .fold(U256::ZERO, |acc, s| acc + s.cost);
        let cost_with_buffer = buffer_factor.apply(total_cost);
        let verdict = Verdict::evaluate(funded_balance, total_cost, cost_with_buffer);

        Self {
            per_step_gas,
            unit_price,
            buffer_factor,
            total_gas,
            total_cost,
            cost_with_buffer,
            funded_balance,
            verdict,
        }
    }

    /// Additional funds needed to reach the buffered cost. `None` when sufficient.
    pub fn shortfall(&self) -> Option<U256> {
        match self.verdict {
            Verdict::Sufficient => None,
            Verdict::Tight | Verdict::Insufficient => {
                Some(self.cost_with_buffer - self.funded_balance)
            }
        }
    }
}

/// A step whose simulation failed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepFailure {
    pub step: StepRef,
    pub kind: ArtifactKind,
    pub reason: String,
}

impl fmt::Display for StepFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "step {} ({}): {}", self.step, self.kind, self.reason)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EstimateError {
    #[error("buffer factor must be greater than 1.00x, got {0} bps")]
    InvalidBuffer(u64),

    #[error("failed to query {what}: {message}")]
    Query { what: &'static str, message: String },

    #[error("gas simulation failed for {}", format_failures(.0))]
    Simulation(Vec<StepFailure>),
}

fn format_failures(failures: &[StepFailure]) -> String {
    failures
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Simulates a plan against current network pricing.
#[derive(Debug, Clone)]
pub struct CostEstimator {
    artifacts: ArtifactStore,
    buffer_factor: BufferFactor,
}

impl CostEstimator {
    pub fn new(artifacts: ArtifactStore) -> Self {
        Self {
            artifacts,
            buffer_factor: BufferFactor::default(),
        }
    }

    pub fn with_buffer_factor(mut self, buffer_factor: BufferFactor) -> Self {
        self.buffer_factor = buffer_factor;
        self
    }

    /// Estimate the cost of deploying `steps` and compare it with `funded_balance`.
    ///
    /// Placeholders are resolved to the address each dependency will receive, predicted
    /// from the signer's current nonce. Every step is simulated even if an earlier one
    /// fails so all failures are reported together.
    pub async fn estimate<P: NetworkProvider>(
        &self,
        provider: &P,
        steps: &[DeploymentStep],
        profile: &NetworkProfile,
        funded_balance: U256,
    ) -> Result<CostEstimate, EstimateError> {
        let signer = provider.signer_address();

        let unit_price = provider
            .gas_price()
            .await
            .map_err(|e| EstimateError::Query {
                what: "gas price",
                message: format!("{e:#}"),
            })?;

        let base_nonce = provider.nonce(signer).await.map_err(|e| EstimateError::Query {
            what: "signer nonce",
            message: format!("{e:#}"),
        })?;

        tracing::debug!(
            network = %profile.name,
            unit_price = %unit_price,
            steps = steps.len(),
            "Estimating deployment cost..."
        );

        let mut per_step = Vec::with_capacity(steps.len());
        let mut failures = Vec::new();

        for (index, step) in steps.iter().enumerate() {
            match self.simulate(provider, signer, base_nonce, index, step).await {
                Ok(gas) => {
                    tracing::debug!(step = index, kind = %step.kind, gas, "Simulated deployment");
                    per_step.push((StepRef(index), step.kind, gas));
                }
                Err(reason) => {
                    tracing::warn!(step = index, kind = %step.kind, %reason, "Gas simulation failed");
                    failures.push(StepFailure {
                        step: StepRef(index),
                        kind: step.kind,
                        reason,
                    });
                }
            }
        }

        if !failures.is_empty() {
            return Err(EstimateError::Simulation(failures));
        }

        Ok(CostEstimate::compute(
            per_step,
            unit_price,
            self.buffer_factor,
            funded_balance,
        ))
    }

    async fn simulate<P: NetworkProvider>(
        &self,
        provider: &P,
        signer: Address,
        base_nonce: u64,
        index: usize,
        step: &DeploymentStep,
    ) -> Result<u64, String> {
        let args = step
            .constructor_args
            .iter()
            .map(|arg| {
                arg.resolve_with(|dep| {
                    (dep.0 < index).then(|| signer.create(base_nonce + dep.0 as u64))
                })
                .ok_or_else(|| format!("unresolved dependency in argument {arg}"))
            })
            .collect::<Result<Vec<_>, _>>()?;

        let artifact = self
            .artifacts
            .load(step.kind)
            .map_err(|e| format!("{e:#}"))?;
        let data = artifact.deploy_data(&args).map_err(|e| e.to_string())?;

        provider
            .estimate_gas(&TransactionRequest::deployment(signer, data))
            .await
            .map_err(|e| format!("{e:#}"))
    }
}
