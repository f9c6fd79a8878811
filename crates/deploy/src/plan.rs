//! Deployment plans.
//!
//! A plan is an ordered list of [`DeploymentStep`]s. The order encodes the dependency
//! graph: a step may only reference the produced address of a step that comes before it.
//! [`DeploymentPlan::new`] checks this so the executor never has to guess.

use std::fmt;

use alloy_core::dyn_abi::DynSolValue;
use alloy_core::primitives::{Address, U256};
use derive_more::{Deref, Display};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// The kinds of artifacts this tool knows how to provision.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
)]
#[strum(serialize_all = "kebab-case")]
#[serde(rename_all = "kebab-case")]
pub enum ArtifactKind {
    Token,
    SimpleToken,
    Staking,
    StandardStaking,
}

impl ArtifactKind {
    /// The compiled contract name in the build output.
    pub fn contract_name(&self) -> &'static str {
        match self {
            ArtifactKind::Token => "Crypticorn",
            ArtifactKind::SimpleToken => "CrypticornSimple",
            ArtifactKind::Staking => "CrypticornStaking",
            ArtifactKind::StandardStaking => "CrypticornStandardStaking",
        }
    }
}

/// Reference to an earlier step of the same plan, by position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Display)]
#[display("#{_0}")]
pub struct StepRef(pub usize);

/// A typed constructor argument.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum ConstructorArg {
    Address(Address),
    String(String),
    Uint(U256),
    /// Placeholder for the address produced by an earlier step.
    StepAddress(StepRef),
}

impl ConstructorArg {
    pub fn uint(value: u64) -> Self {
        ConstructorArg::Uint(U256::from(value))
    }

    pub fn is_placeholder(&self) -> bool {
        matches!(self, ConstructorArg::StepAddress(_))
    }

    /// ABI value for a resolved argument. Placeholders have no ABI value.
    pub fn to_sol_value(&self) -> Option<DynSolValue> {
        match self {
            ConstructorArg::Address(address) => Some(DynSolValue::Address(*address)),
            ConstructorArg::String(value) => Some(DynSolValue::String(value.clone())),
            ConstructorArg::Uint(value) => Some(DynSolValue::Uint(*value, 256)),
            ConstructorArg::StepAddress(_) => None,
        }
    }

    /// Replace a placeholder with the given address, leaving other arguments untouched.
    pub fn resolve_with(&self, lookup: impl Fn(StepRef) -> Option<Address>) -> Option<Self> {
        match self {
            ConstructorArg::StepAddress(step) => lookup(*step).map(ConstructorArg::Address),
            other => Some(other.clone()),
        }
    }
}

impl fmt::Display for ConstructorArg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConstructorArg::Address(address) => write!(f, "{address}"),
            ConstructorArg::String(value) => write!(f, "{value:?}"),
            ConstructorArg::Uint(value) => write!(f, "{value}"),
            ConstructorArg::StepAddress(step) => write!(f, "<address of step {step}>"),
        }
    }
}

/// One planned provisioning step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentStep {
    pub kind: ArtifactKind,
    pub constructor_args: Vec<ConstructorArg>,
    /// The step whose produced address this step consumes, if any.
    pub depends_on: Option<StepRef>,
}

impl DeploymentStep {
    /// Create a step, deriving `depends_on` from the first placeholder argument.
    pub fn new(kind: ArtifactKind, constructor_args: Vec<ConstructorArg>) -> Self {
        let depends_on = constructor_args.iter().find_map(|arg| match arg {
            ConstructorArg::StepAddress(step) => Some(*step),
            _ => None,
        });

        Self {
            kind,
            constructor_args,
            depends_on,
        }
    }

    /// Every step referenced by a placeholder argument or by `depends_on`.
    pub fn dependencies(&self) -> Vec<StepRef> {
        let mut deps: Vec<StepRef> = self
            .constructor_args
            .iter()
            .filter_map(|arg| match arg {
                ConstructorArg::StepAddress(step) => Some(*step),
                _ => None,
            })
            .chain(self.depends_on)
            .collect();
        deps.sort();
        deps.dedup();
        deps
    }
}

/// Token constructor parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenParams {
    pub marketing_wallet: Address,
    pub name: String,
    pub symbol: String,
}

impl TokenParams {
    fn to_args(&self) -> Vec<ConstructorArg> {
        vec![
            ConstructorArg::Address(self.marketing_wallet),
            ConstructorArg::String(self.name.clone()),
            ConstructorArg::String(self.symbol.clone()),
        ]
    }
}

/// Errors found while validating a plan.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PlanError {
    #[error("deployment plan has no steps")]
    Empty,

    #[error("step {step} depends on step {depends_on}, which does not come before it")]
    ForwardReference { step: StepRef, depends_on: StepRef },
}

/// A validated, ordered list of deployment steps.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deref)]
pub struct DeploymentPlan {
    steps: Vec<DeploymentStep>,
}

impl DeploymentPlan {
    /// Validate that every dependency points to an earlier step.
    pub fn new(steps: Vec<DeploymentStep>) -> Result<Self, PlanError> {
        if steps.is_empty() {
            return Err(PlanError::Empty);
        }

        for (index, step) in steps.iter().enumerate() {
            if let Some(dep) = step.dependencies().into_iter().find(|dep| dep.0 >= index) {
                return Err(PlanError::ForwardReference {
                    step: StepRef(index),
                    depends_on: dep,
                });
            }
        }

        Ok(Self { steps })
    }

    /// Token, then staking bound to the token. Optionally a standard staking pool as well.
    pub fn full(token: &TokenParams, standard_staking_apy_bps: Option<u64>) -> Self {
        let token_ref = ConstructorArg::StepAddress(StepRef(0));
        let mut steps = vec![
            DeploymentStep::new(ArtifactKind::Token, token.to_args()),
            DeploymentStep::new(ArtifactKind::Staking, vec![token_ref.clone()]),
        ];

        if let Some(apy) = standard_staking_apy_bps {
            steps.push(DeploymentStep::new(
                ArtifactKind::StandardStaking,
                vec![token_ref, ConstructorArg::uint(apy)],
            ));
        }

        Self { steps }
    }

    pub fn token(token: &TokenParams) -> Self {
        Self {
            steps: vec![DeploymentStep::new(ArtifactKind::Token, token.to_args())],
        }
    }

    pub fn simple_token(token: &TokenParams) -> Self {
        Self {
            steps: vec![DeploymentStep::new(ArtifactKind::SimpleToken, token.to_args())],
        }
    }

    pub fn staking(token_address: Address) -> Self {
        Self {
            steps: vec![DeploymentStep::new(
                ArtifactKind::Staking,
                vec![ConstructorArg::Address(token_address)],
            )],
        }
    }

    pub fn standard_staking(token_address: Address, apy_bps: u64) -> Self {
        Self {
            steps: vec![DeploymentStep::new(
                ArtifactKind::StandardStaking,
                vec![ConstructorArg::Address(token_address), ConstructorArg::uint(apy_bps)],
            )],
        }
    }

    pub fn steps(&self) -> &[DeploymentStep] {
        &self.steps
    }
}
