//! crypticorn-deploy - Deployment library for the Crypticorn token and staking contracts.
//!
//! This crate plans, estimates, deploys and verifies the Crypticorn contracts on an
//! EVM network. A run is strictly sequential under a single signer: each contract must
//! reach the network's confirmation depth before contracts depending on its address
//! are submitted.

mod artifacts;
pub use artifacts::{
    ArgumentError, Artifact, ArtifactStore, BuildInfo, DEFAULT_ARTIFACTS_DIR,
};

mod balance;
pub use balance::{BalanceReport, LOW_BALANCE_WEI, ROUGH_DEPLOYMENT_GAS, check_balance};

mod config;
pub use config::{
    ConfigError, DEFAULT_TOKEN_NAME, DEFAULT_TOKEN_SYMBOL, DeployInputs, PlanKind, RawInputs,
    parse_address, parse_apy_bps,
};

mod estimator;
pub use estimator::{
    BufferFactor, CostEstimate, CostEstimator, DEFAULT_BUFFER_BPS, EstimateError, StepFailure,
    StepGas, Verdict,
};

mod executor;
pub use executor::{
    DEFAULT_CONFIRMATION_TIMEOUT_SECS, DEFAULT_POLL_INTERVAL, DeployError, DeploymentExecutor,
    DeploymentResult, Execution, ExecutorConfig, confirmations_at,
};

mod network;
pub use network::{
    DEFAULT_CONFIRMATION_DEPTH, DEFAULT_RPC_TIMEOUT_SECS, ETHERSCAN_V2_API_URL, Network,
    NetworkProfile,
};

mod pipeline;
pub use pipeline::{Pipeline, PipelineError, PipelineOptions, VerifyMode};

mod plan;
pub use plan::{
    ArtifactKind, ConstructorArg, DeploymentPlan, DeploymentStep, PlanError, StepRef, TokenParams,
};

pub mod provider;
pub use provider::{NetworkProvider, RpcProvider, TransactionReceipt, TransactionRequest};

mod report;
pub use report::{DeploymentReport, EstimateSummary, ReportError, SummaryReporter};

/// Shared RPC utilities.
pub mod rpc;

pub mod verify;
pub use verify::{
    EtherscanExplorer, Explorer, VerificationAgent, VerificationFailure, VerificationRequest,
};
