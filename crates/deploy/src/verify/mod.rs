//! Best-effort source verification of deployed contracts.
//!
//! Verification never aborts a deployment. [`VerificationAgent::verify`] folds every
//! explorer failure into the result's `verification_error` and returns an updated copy.

mod etherscan;

use std::future::Future;

use alloy_core::primitives::Address;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use etherscan::EtherscanExplorer;

use crate::{
    NetworkProfile,
    executor::DeploymentResult,
    plan::{ArtifactKind, ConstructorArg},
};

/// What an explorer needs to match deployed bytecode with its source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationRequest {
    pub address: Address,
    pub kind: ArtifactKind,
    /// The exact constructor arguments the contract was deployed with.
    pub constructor_args: Vec<ConstructorArg>,
}

impl From<&DeploymentResult> for VerificationRequest {
    fn from(result: &DeploymentResult) -> Self {
        Self {
            address: result.address,
            kind: result.kind(),
            constructor_args: result.resolved_args.clone(),
        }
    }
}

/// Typed explorer failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VerificationFailure {
    #[error("contract source is already verified")]
    AlreadyVerified,

    #[error("explorer rate limit reached: {0}")]
    RateLimited(String),

    #[error("compiled bytecode does not match: {0}")]
    CompilationMismatch(String),

    #[error("BSCSCAN_API_KEY is not set")]
    MissingApiKey,

    #[error("verification still pending after {attempts} status checks")]
    StillPending { attempts: usize },

    #[error("explorer rejected the request: {0}")]
    Rejected(String),

    #[error("cannot prepare verification input: {0}")]
    Input(String),

    #[error("explorer request failed: {0}")]
    Transport(String),
}

/// An explorer service accepting source verification requests.
pub trait Explorer: Send + Sync {
    fn submit(
        &self,
        request: &VerificationRequest,
        profile: &NetworkProfile,
    ) -> impl Future<Output = Result<(), VerificationFailure>> + Send;
}

/// Submits verification requests and records their outcome on deployment results.
#[derive(Debug, Clone)]
pub struct VerificationAgent<E> {
    explorer: E,
}

impl<E: Explorer> VerificationAgent<E> {
    pub fn new(explorer: E) -> Self {
        Self { explorer }
    }

    /// Verify one deployed contract. Safe to repeat on an already verified result.
    pub async fn verify(
        &self,
        result: DeploymentResult,
        profile: &NetworkProfile,
    ) -> DeploymentResult {
        let request = VerificationRequest::from(&result);
        let outcome = self.submit(&request, profile).await;
        apply_outcome(result, outcome)
    }

    /// Submit a request directly. An already verified contract counts as success.
    pub async fn submit(
        &self,
        request: &VerificationRequest,
        profile: &NetworkProfile,
    ) -> Result<(), VerificationFailure> {
        match self.explorer.submit(request, profile).await {
            Err(VerificationFailure::AlreadyVerified) => {
                tracing::debug!(address = %request.address, "Contract was already verified");
                Ok(())
            }
            other => other,
        }
    }

    /// Verify each result in turn. One failure does not stop the others.
    pub async fn verify_all(
        &self,
        results: Vec<DeploymentResult>,
        profile: &NetworkProfile,
    ) -> Vec<DeploymentResult> {
        let mut verified = Vec::with_capacity(results.len());
        for result in results {
            verified.push(self.verify(result, profile).await);
        }
        verified
    }
}

fn apply_outcome(
    mut result: DeploymentResult,
    outcome: Result<(), VerificationFailure>,
) -> DeploymentResult {
    match outcome {
        Ok(()) => {
            tracing::info!(kind = %result.kind(), address = %result.address, "Contract verified");
            result.verified = true;
            result.verification_error = None;
        }
        Err(e) => {
            tracing::warn!(
                kind = %result.kind(),
                address = %result.address,
                error = %e,
                "Verification failed, continuing"
            );
            result.verified = false;
            result.verification_error = Some(e.to_string());
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use alloy_core::primitives::B256;

    use super::*;
    use crate::plan::{DeploymentStep, StepRef};

    fn result() -> DeploymentResult {
        DeploymentResult {
            index: StepRef(0),
            step: DeploymentStep::new(ArtifactKind::Token, vec![]),
            resolved_args: vec![ConstructorArg::String("Crypticorn".to_string())],
            address: Address::repeat_byte(0x11),
            transaction_id: B256::repeat_byte(0x22),
            block_number: 1,
            gas_used: 1,
            confirmations_observed: 5,
            verified: false,
            verification_error: None,
        }
    }

    #[test]
    fn test_success_marks_verified() {
        let updated = apply_outcome(result(), Ok(()));
        assert!(updated.verified);
        assert!(updated.verification_error.is_none());
    }

    struct AlreadyVerifiedExplorer;

    impl Explorer for AlreadyVerifiedExplorer {
        async fn submit(
            &self,
            _request: &VerificationRequest,
            _profile: &NetworkProfile,
        ) -> Result<(), VerificationFailure> {
            Err(VerificationFailure::AlreadyVerified)
        }
    }

    #[tokio::test]
    async fn test_already_verified_counts_as_verified() {
        let agent = VerificationAgent::new(AlreadyVerifiedExplorer);
        let profile = crate::Network::BscTestnet.to_profile();

        let updated = agent.verify(result(), &profile).await;
        assert!(updated.verified);
        assert!(updated.verification_error.is_none());

        // Repeating the request is harmless.
        let again = agent.verify(updated, &profile).await;
        assert!(again.verified);
    }

    #[test]
    fn test_failure_is_recorded_not_raised() {
        let original = result();
        let updated = apply_outcome(
            original.clone(),
            Err(VerificationFailure::RateLimited("Max rate limit reached".to_string())),
        );

        assert!(!updated.verified);
        assert_eq!(
            updated.verification_error.as_deref(),
            Some("explorer rate limit reached: Max rate limit reached")
        );
        assert_eq!(updated.address, original.address);
        assert_eq!(updated.transaction_id, original.transaction_id);
    }

    #[test]
    fn test_request_carries_resolved_args() {
        let request = VerificationRequest::from(&result());
        assert_eq!(request.kind, ArtifactKind::Token);
        assert_eq!(
            request.constructor_args,
            vec![ConstructorArg::String("Crypticorn".to_string())]
        );
    }
}
