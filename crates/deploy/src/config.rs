//! Deployment inputs.
//!
//! Raw inputs arrive as strings (environment variables or CLI flags). They are validated
//! here, before any network call is made, into typed values.

use std::str::FromStr;

use alloy_core::primitives::Address;
use alloy_signer_local::PrivateKeySigner;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::plan::{ArtifactKind, ConstructorArg, DeploymentPlan, TokenParams};

/// Default token name when `TOKEN_NAME` is not set.
pub const DEFAULT_TOKEN_NAME: &str = "Crypticorn";
/// Default token symbol when `TOKEN_SYMBOL` is not set.
pub const DEFAULT_TOKEN_SYMBOL: &str = "CRYPTO";

/// Missing or invalid configuration. Always fatal.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("{0} is required")]
    Missing(&'static str),

    #[error("{name} is not a valid address: {value}")]
    InvalidAddress { name: &'static str, value: String },

    #[error("PRIVATE_KEY is not a valid secp256k1 private key")]
    InvalidPrivateKey,

    #[error("INITIAL_APY_BPS must be a non-negative integer, got '{0}'")]
    InvalidApy(String),

    #[error("network chain id mismatch: profile expects {expected}, endpoint reports {actual}")]
    ChainIdMismatch { expected: u64, actual: u64 },
}

/// Named plans that can be deployed or estimated.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, strum::Display, strum::EnumString,
)]
#[strum(serialize_all = "kebab-case")]
#[serde(rename_all = "kebab-case")]
pub enum PlanKind {
    /// Token followed by the staking contracts bound to it.
    Full,
    Token,
    SimpleToken,
    /// Staking against an existing token (`TOKEN_ADDRESS`).
    Staking,
    /// Standard staking against an existing token (`TOKEN_ADDRESS`, `INITIAL_APY_BPS`).
    StandardStaking,
}

/// Raw, unvalidated deployment inputs.
#[derive(Debug, Clone, Default)]
pub struct RawInputs {
    pub private_key: Option<String>,
    pub marketing_wallet: Option<String>,
    pub token_name: Option<String>,
    pub token_symbol: Option<String>,
    pub token_address: Option<String>,
    pub initial_apy_bps: Option<String>,
    pub explorer_api_key: Option<String>,
}

impl RawInputs {
    /// Constructor arguments a standalone deployment of `kind` would use, for verifying
    /// contracts deployed by an earlier run.
    ///
    /// `PRIVATE_KEY` is only read for tokens without `MARKETING_WALLET`, whose wallet
    /// defaults to the deployer.
    pub fn constructor_args(&self, kind: ArtifactKind) -> Result<Vec<ConstructorArg>, ConfigError> {
        let plan = match kind {
            ArtifactKind::Token | ArtifactKind::SimpleToken => {
                let marketing_wallet = match self.marketing_wallet()? {
                    Some(address) => address,
                    None => parse_signer(self.private_key.as_deref())?.address(),
                };
                let token = self.token_params(marketing_wallet);
                if kind == ArtifactKind::Token {
                    DeploymentPlan::token(&token)
                } else {
                    DeploymentPlan::simple_token(&token)
                }
            }
            ArtifactKind::Staking => DeploymentPlan::staking(
                self.token_address()?
                    .ok_or(ConfigError::Missing("TOKEN_ADDRESS"))?,
            ),
            ArtifactKind::StandardStaking => DeploymentPlan::standard_staking(
                self.token_address()?
                    .ok_or(ConfigError::Missing("TOKEN_ADDRESS"))?,
                self.initial_apy_bps()?
                    .ok_or(ConfigError::Missing("INITIAL_APY_BPS"))?,
            ),
        };

        Ok(plan
            .steps()
            .first()
            .map(|step| step.constructor_args.clone())
            .unwrap_or_default())
    }

    pub fn explorer_api_key(&self) -> Option<String> {
        non_empty(self.explorer_api_key.clone())
    }

    fn marketing_wallet(&self) -> Result<Option<Address>, ConfigError> {
        non_empty(self.marketing_wallet.clone())
            .map(|value| parse_address("MARKETING_WALLET", &value))
            .transpose()
    }

    fn token_params(&self, marketing_wallet: Address) -> TokenParams {
        TokenParams {
            marketing_wallet,
            name: non_empty(self.token_name.clone())
                .unwrap_or_else(|| DEFAULT_TOKEN_NAME.to_string()),
            symbol: non_empty(self.token_symbol.clone())
                .unwrap_or_else(|| DEFAULT_TOKEN_SYMBOL.to_string()),
        }
    }

    fn token_address(&self) -> Result<Option<Address>, ConfigError> {
        non_empty(self.token_address.clone())
            .map(|value| parse_address("TOKEN_ADDRESS", &value))
            .transpose()
    }

    fn initial_apy_bps(&self) -> Result<Option<u64>, ConfigError> {
        non_empty(self.initial_apy_bps.clone())
            .map(|value| parse_apy_bps(&value))
            .transpose()
    }
}

/// Validated deployment inputs.
#[derive(Debug, Clone)]
pub struct DeployInputs {
    pub signer: PrivateKeySigner,
    pub token: TokenParams,
    pub token_address: Option<Address>,
    pub initial_apy_bps: Option<u64>,
    pub explorer_api_key: Option<String>,
}

impl DeployInputs {
    /// Validate raw inputs. Only `PRIVATE_KEY` is unconditionally required.
    pub fn from_raw(raw: RawInputs) -> Result<Self, ConfigError> {
        let signer = parse_signer(raw.private_key.as_deref())?;

        let marketing_wallet = match raw.marketing_wallet()? {
            Some(address) => address,
            None => signer.address(),
        };

        Ok(Self {
            token: raw.token_params(marketing_wallet),
            token_address: raw.token_address()?,
            initial_apy_bps: raw.initial_apy_bps()?,
            explorer_api_key: raw.explorer_api_key(),
            signer,
        })
    }

    pub fn signer_address(&self) -> Address {
        self.signer.address()
    }

    /// Build the named plan, checking the inputs that plan requires.
    pub fn build_plan(
        &self,
        kind: PlanKind,
        with_standard_staking: bool,
    ) -> Result<DeploymentPlan, ConfigError> {
        let plan = match kind {
            PlanKind::Full => {
                let apy = if with_standard_staking {
                    Some(self.initial_apy_bps.ok_or(ConfigError::Missing("INITIAL_APY_BPS"))?)
                } else {
                    None
                };
                DeploymentPlan::full(&self.token, apy)
            }
            PlanKind::Token => DeploymentPlan::token(&self.token),
            PlanKind::SimpleToken => DeploymentPlan::simple_token(&self.token),
            PlanKind::Staking => DeploymentPlan::staking(self.require_token_address()?),
            PlanKind::StandardStaking => DeploymentPlan::standard_staking(
                self.require_token_address()?,
                self.initial_apy_bps.ok_or(ConfigError::Missing("INITIAL_APY_BPS"))?,
            ),
        };

        Ok(plan)
    }

    fn require_token_address(&self) -> Result<Address, ConfigError> {
        self.token_address.ok_or(ConfigError::Missing("TOKEN_ADDRESS"))
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn parse_signer(private_key: Option<&str>) -> Result<PrivateKeySigner, ConfigError> {
    let key = private_key
        .map(str::trim)
        .filter(|k| !k.is_empty())
        .ok_or(ConfigError::Missing("PRIVATE_KEY"))?;

    PrivateKeySigner::from_str(key).map_err(|_| ConfigError::InvalidPrivateKey)
}

/// Parse a 0x-prefixed, 40 hex character address.
pub fn parse_address(name: &'static str, value: &str) -> Result<Address, ConfigError> {
    let invalid = || ConfigError::InvalidAddress {
        name,
        value: value.to_string(),
    };

    if !value.starts_with("0x") || value.len() != 42 {
        return Err(invalid());
    }

    Address::from_str(value).map_err(|_| invalid())
}

/// Parse an APY in basis points. Must be an integer >= 0.
pub fn parse_apy_bps(value: &str) -> Result<u64, ConfigError> {
    let trimmed = value.trim();
    trimmed
        .parse::<i64>()
        .ok()
        .filter(|apy| *apy >= 0)
        .map(|apy| apy as u64)
        .ok_or_else(|| ConfigError::InvalidApy(trimmed.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    // Anvil's first well-known development key.
    const DEV_KEY: &str = "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";
    const DEV_ADDRESS: &str = "0xf39Fd6e51aad88F6F4ce6aB8827279cffFb92266";

    fn raw() -> RawInputs {
        RawInputs {
            private_key: Some(DEV_KEY.to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn test_defaults() {
        let inputs = DeployInputs::from_raw(raw()).expect("valid inputs");
        let dev_address = Address::from_str(DEV_ADDRESS).unwrap();

        assert_eq!(inputs.signer_address(), dev_address);
        assert_eq!(inputs.token.marketing_wallet, dev_address);
        assert_eq!(inputs.token.name, "Crypticorn");
        assert_eq!(inputs.token.symbol, "CRYPTO");
        assert!(inputs.token_address.is_none());
        assert!(inputs.initial_apy_bps.is_none());
        assert!(inputs.explorer_api_key.is_none());
    }

    #[test]
    fn test_missing_private_key() {
        let err = DeployInputs::from_raw(RawInputs::default()).unwrap_err();
        assert_eq!(err, ConfigError::Missing("PRIVATE_KEY"));

        let err = DeployInputs::from_raw(RawInputs {
            private_key: Some("   ".to_string()),
            ..Default::default()
        })
        .unwrap_err();
        assert_eq!(err, ConfigError::Missing("PRIVATE_KEY"));
    }

    #[test]
    fn test_invalid_private_key() {
        let err = DeployInputs::from_raw(RawInputs {
            private_key: Some("0x1234".to_string()),
            ..Default::default()
        })
        .unwrap_err();
        assert_eq!(err, ConfigError::InvalidPrivateKey);
    }

    #[test]
    fn test_apy_validation() {
        assert_eq!(parse_apy_bps("500"), Ok(500));
        assert_eq!(parse_apy_bps("0"), Ok(0));
        assert_eq!(parse_apy_bps(" 750 "), Ok(750));
        assert_eq!(parse_apy_bps("-1"), Err(ConfigError::InvalidApy("-1".to_string())));
        assert_eq!(parse_apy_bps("5%"), Err(ConfigError::InvalidApy("5%".to_string())));
        assert_eq!(parse_apy_bps("abc"), Err(ConfigError::InvalidApy("abc".to_string())));
    }

    #[test]
    fn test_address_validation() {
        assert!(parse_address("TOKEN_ADDRESS", DEV_ADDRESS).is_ok());
        assert!(parse_address("TOKEN_ADDRESS", "0x1234").is_err());
        assert!(parse_address("TOKEN_ADDRESS", "f39Fd6e51aad88F6F4ce6aB8827279cffFb9226600").is_err());
        assert!(
            parse_address("TOKEN_ADDRESS", "0xGGGGGGGGGGGGGGGGGGGGGGGGGGGGGGGGGGGGGGGG").is_err()
        );
    }

    #[test]
    fn test_invalid_apy_is_config_error_before_plan() {
        let err = DeployInputs::from_raw(RawInputs {
            initial_apy_bps: Some("ten".to_string()),
            ..raw()
        })
        .unwrap_err();
        assert_eq!(err, ConfigError::InvalidApy("ten".to_string()));
    }

    #[test]
    fn test_staking_requires_token_address() {
        let inputs = DeployInputs::from_raw(raw()).unwrap();
        assert_eq!(
            inputs.build_plan(PlanKind::Staking, false).unwrap_err(),
            ConfigError::Missing("TOKEN_ADDRESS")
        );

        let inputs = DeployInputs::from_raw(RawInputs {
            token_address: Some(DEV_ADDRESS.to_string()),
            ..raw()
        })
        .unwrap();
        let plan = inputs.build_plan(PlanKind::Staking, false).unwrap();
        assert_eq!(plan[0].kind, ArtifactKind::Staking);
        assert_eq!(
            plan[0].constructor_args,
            vec![ConstructorArg::Address(Address::from_str(DEV_ADDRESS).unwrap())]
        );
    }

    #[test]
    fn test_standard_staking_requires_apy() {
        let inputs = DeployInputs::from_raw(RawInputs {
            token_address: Some(DEV_ADDRESS.to_string()),
            ..raw()
        })
        .unwrap();
        assert_eq!(
            inputs.build_plan(PlanKind::StandardStaking, false).unwrap_err(),
            ConfigError::Missing("INITIAL_APY_BPS")
        );
        assert_eq!(
            inputs.build_plan(PlanKind::Full, true).unwrap_err(),
            ConfigError::Missing("INITIAL_APY_BPS")
        );
    }

    #[test]
    fn test_full_plan_does_not_need_token_address() {
        let inputs = DeployInputs::from_raw(RawInputs {
            initial_apy_bps: Some("500".to_string()),
            marketing_wallet: Some(DEV_ADDRESS.to_string()),
            token_name: Some("Test".to_string()),
            ..raw()
        })
        .unwrap();

        let plan = inputs.build_plan(PlanKind::Full, true).unwrap();
        assert_eq!(plan.len(), 3);
        assert_eq!(
            plan[0].constructor_args[1],
            ConstructorArg::String("Test".to_string())
        );
    }

    #[test]
    fn test_constructor_args_for_manual_verification() {
        let raw = RawInputs {
            token_address: Some(DEV_ADDRESS.to_string()),
            initial_apy_bps: Some("1200".to_string()),
            ..raw()
        };
        let token = Address::from_str(DEV_ADDRESS).unwrap();

        assert_eq!(
            raw.constructor_args(ArtifactKind::StandardStaking).unwrap(),
            vec![ConstructorArg::Address(token), ConstructorArg::uint(1200)]
        );
        assert_eq!(
            raw.constructor_args(ArtifactKind::Token).unwrap(),
            vec![
                ConstructorArg::Address(token),
                ConstructorArg::String("Crypticorn".to_string()),
                ConstructorArg::String("CRYPTO".to_string()),
            ]
        );
    }

    #[test]
    fn test_staking_verification_needs_no_private_key() {
        let raw = RawInputs {
            token_address: Some(DEV_ADDRESS.to_string()),
            ..Default::default()
        };
        let token = Address::from_str(DEV_ADDRESS).unwrap();

        assert_eq!(
            raw.constructor_args(ArtifactKind::Staking).unwrap(),
            vec![ConstructorArg::Address(token)]
        );
        assert_eq!(
            raw.constructor_args(ArtifactKind::StandardStaking).unwrap_err(),
            ConfigError::Missing("INITIAL_APY_BPS")
        );
    }

    #[test]
    fn test_token_verification_key_only_without_marketing_wallet() {
        let raw = RawInputs {
            token_symbol: Some("CRN".to_string()),
            ..Default::default()
        };
        assert_eq!(
            raw.constructor_args(ArtifactKind::SimpleToken).unwrap_err(),
            ConfigError::Missing("PRIVATE_KEY")
        );

        let wallet = Address::repeat_byte(0x42);
        let raw = RawInputs {
            marketing_wallet: Some(wallet.to_string()),
            ..raw
        };
        assert_eq!(
            raw.constructor_args(ArtifactKind::SimpleToken).unwrap(),
            vec![
                ConstructorArg::Address(wallet),
                ConstructorArg::String("Crypticorn".to_string()),
                ConstructorArg::String("CRN".to_string()),
            ]
        );
    }
}
