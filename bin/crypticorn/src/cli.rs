use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use crypticorn_deploy::{
    ArtifactKind, ArtifactStore, BufferFactor, DEFAULT_ARTIFACTS_DIR, DEFAULT_BUFFER_BPS,
    DEFAULT_CONFIRMATION_TIMEOUT_SECS, ExecutorConfig, Network, NetworkProfile, PlanKind,
    RawInputs, VerifyMode,
};
use tracing::level_filters::LevelFilter;

/// The default target network.
const DEFAULT_NETWORK: Network = Network::BscTestnet;

/// Default interval between confirmation polls, in seconds.
const DEFAULT_POLL_INTERVAL_SECS: u64 = 3;

#[derive(Parser)]
#[command(name = "crypticorn")]
#[command(
    author,
    version,
    about = "Estimate, deploy and verify the Crypticorn token and staking contracts"
)]
pub struct Cli {
    /// The verbosity level.
    #[arg(
        short,
        long,
        env = "CRYPTICORN_VERBOSITY",
        default_value_t = LevelFilter::INFO,
        global = true
    )]
    pub verbosity: LevelFilter,

    #[clap(flatten)]
    pub network: NetworkArgs,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Estimate the cost of a plan against the deployer's balance. Submits nothing.
    Estimate(EstimateArgs),
    /// Deploy a plan, wait for confirmations and verify the contracts.
    Deploy(DeployArgs),
    /// Verify an already deployed contract.
    Verify(VerifyArgs),
    /// Show the deployer's balance and a rough deployment cost.
    Balance(BalanceArgs),
    /// Write the selected network profile to a TOML file for customisation.
    Profile(ProfileArgs),
}

/// Target network selection.
#[derive(Debug, Clone, Args)]
pub struct NetworkArgs {
    /// The built-in network preset.
    #[arg(long, env = "CRYPTICORN_NETWORK", default_value_t = DEFAULT_NETWORK, global = true)]
    pub network: Network,

    /// Path to a network profile TOML file.
    ///
    /// Keys missing from the file are taken from the `--network` preset.
    #[arg(long, alias = "network-conf", env = "CRYPTICORN_NETWORK_CONFIG", global = true)]
    pub network_config: Option<PathBuf>,

    /// The Hardhat artifacts directory.
    #[arg(long, env = "CRYPTICORN_ARTIFACTS", default_value = DEFAULT_ARTIFACTS_DIR, global = true)]
    pub artifacts: PathBuf,
}

impl NetworkArgs {
    pub fn load_profile(&self) -> anyhow::Result<NetworkProfile> {
        match &self.network_config {
            Some(path) => NetworkProfile::load_from_file(path, self.network),
            None => Ok(self.network.to_profile()),
        }
    }

    pub fn artifact_store(&self) -> ArtifactStore {
        ArtifactStore::new(&self.artifacts)
    }
}

/// Deployment inputs, usually provided through the environment.
#[derive(Debug, Clone, Args)]
pub struct InputArgs {
    /// The deployer's private key.
    #[arg(long, env = "PRIVATE_KEY", hide_env_values = true)]
    pub private_key: Option<String>,

    /// The token's marketing wallet. Defaults to the deployer address.
    #[arg(long, env = "MARKETING_WALLET")]
    pub marketing_wallet: Option<String>,

    /// The token name.
    #[arg(long, env = "TOKEN_NAME")]
    pub token_name: Option<String>,

    /// The token symbol.
    #[arg(long, env = "TOKEN_SYMBOL")]
    pub token_symbol: Option<String>,

    /// An already deployed token, for the staking plans.
    #[arg(long, env = "TOKEN_ADDRESS")]
    pub token_address: Option<String>,

    /// The standard staking APY in basis points.
    #[arg(long, env = "INITIAL_APY_BPS")]
    pub initial_apy_bps: Option<String>,

    /// The explorer API key used for verification.
    #[arg(long, env = "BSCSCAN_API_KEY", hide_env_values = true)]
    pub bscscan_api_key: Option<String>,
}

impl InputArgs {
    pub fn to_raw(&self) -> RawInputs {
        RawInputs {
            private_key: self.private_key.clone(),
            marketing_wallet: self.marketing_wallet.clone(),
            token_name: self.token_name.clone(),
            token_symbol: self.token_symbol.clone(),
            token_address: self.token_address.clone(),
            initial_apy_bps: self.initial_apy_bps.clone(),
            explorer_api_key: self.bscscan_api_key.clone(),
        }
    }
}

/// Which contracts to deploy.
#[derive(Debug, Clone, Args)]
pub struct PlanArgs {
    /// The deployment plan.
    #[arg(long, env = "CRYPTICORN_PLAN", default_value_t = PlanKind::Full)]
    pub plan: PlanKind,

    /// Also deploy the standard staking pool in the full plan (requires INITIAL_APY_BPS).
    #[arg(long)]
    pub standard_staking: bool,
}

/// Cost estimate options shared by `estimate` and `deploy`.
#[derive(Debug, Clone, Args)]
pub struct CostArgs {
    /// Safety buffer applied to the estimated cost, in basis points (12000 = 1.20x).
    #[arg(long, default_value_t = DEFAULT_BUFFER_BPS)]
    pub buffer_bps: u64,

    /// Native asset price in USD, to show cost equivalents.
    #[arg(long, env = "CRYPTICORN_USD_PRICE")]
    pub usd_price: Option<f64>,
}

impl CostArgs {
    pub fn buffer_factor(&self) -> anyhow::Result<BufferFactor> {
        Ok(BufferFactor::from_bps(self.buffer_bps)?)
    }
}

#[derive(Debug, Clone, Args)]
pub struct EstimateArgs {
    #[clap(flatten)]
    pub inputs: InputArgs,

    #[clap(flatten)]
    pub plan: PlanArgs,

    #[clap(flatten)]
    pub cost: CostArgs,

    /// Print the estimate as JSON.
    #[arg(long)]
    pub json: bool,
}

#[derive(Debug, Clone, Args)]
pub struct DeployArgs {
    #[clap(flatten)]
    pub inputs: InputArgs,

    #[clap(flatten)]
    pub plan: PlanArgs,

    #[clap(flatten)]
    pub cost: CostArgs,

    /// When to submit contracts for verification.
    #[arg(long, env = "CRYPTICORN_VERIFY_MODE", default_value_t = VerifyMode::AfterEachStep)]
    pub verify_mode: VerifyMode,

    /// Maximum time to wait for a deployment's confirmations, in seconds. 0 waits forever.
    #[arg(long, default_value_t = DEFAULT_CONFIRMATION_TIMEOUT_SECS)]
    pub confirmation_timeout: u64,

    /// Interval between confirmation polls, in seconds.
    #[arg(long, default_value_t = DEFAULT_POLL_INTERVAL_SECS)]
    pub poll_interval: u64,

    /// Skip the pre-flight cost estimate.
    #[arg(long)]
    pub skip_preflight: bool,

    /// Deploy even if the pre-flight estimate reports insufficient funds.
    #[arg(long)]
    pub force: bool,

    /// Print the report as JSON.
    #[arg(long)]
    pub json: bool,
}

impl DeployArgs {
    pub fn executor_config(&self) -> ExecutorConfig {
        ExecutorConfig {
            poll_interval: Duration::from_secs(self.poll_interval),
            confirmation_timeout: (self.confirmation_timeout > 0)
                .then(|| Duration::from_secs(self.confirmation_timeout)),
        }
    }
}

#[derive(Debug, Clone, Args)]
pub struct VerifyArgs {
    #[clap(flatten)]
    pub inputs: InputArgs,

    /// The kind of contract deployed at `address`.
    #[arg(long)]
    pub kind: ArtifactKind,

    /// The deployed contract address.
    #[arg(long)]
    pub address: String,
}

#[derive(Debug, Clone, Args)]
pub struct BalanceArgs {
    #[clap(flatten)]
    pub inputs: InputArgs,

    /// Print the balance as JSON.
    #[arg(long)]
    pub json: bool,
}

#[derive(Debug, Clone, Args)]
pub struct ProfileArgs {
    /// Where to write the profile.
    #[arg(long, short, default_value = "network.toml")]
    pub output: PathBuf,
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_deploy_defaults() {
        let cli = Cli::try_parse_from(["crypticorn", "deploy"]).unwrap();
        let Command::Deploy(args) = cli.command else {
            panic!("expected deploy command");
        };

        assert_eq!(args.plan.plan, PlanKind::Full);
        assert_eq!(args.verify_mode, VerifyMode::AfterEachStep);
        assert_eq!(
            args.executor_config().confirmation_timeout,
            Some(Duration::from_secs(600))
        );
        assert_eq!(cli.network.network, Network::BscTestnet);
    }

    #[test]
    fn test_zero_timeout_waits_forever() {
        let cli = Cli::try_parse_from([
            "crypticorn",
            "--network",
            "bsc-mainnet",
            "deploy",
            "--plan",
            "standard-staking",
            "--verify-mode",
            "after-all",
            "--confirmation-timeout",
            "0",
        ])
        .unwrap();
        let Command::Deploy(args) = cli.command else {
            panic!("expected deploy command");
        };

        assert_eq!(args.executor_config().confirmation_timeout, None);
        assert_eq!(args.plan.plan, PlanKind::StandardStaking);
        assert_eq!(args.verify_mode, VerifyMode::AfterAll);
        assert_eq!(cli.network.network, Network::BscMainnet);
    }

    #[test]
    fn test_verify_requires_kind_and_address() {
        assert!(Cli::try_parse_from(["crypticorn", "verify"]).is_err());
        let cli = Cli::try_parse_from([
            "crypticorn",
            "verify",
            "--kind",
            "staking",
            "--address",
            "0x5FbDB2315678afecb367f032d93F642f64180aa3",
        ])
        .unwrap();
        assert!(matches!(cli.command, Command::Verify(VerifyArgs { kind: ArtifactKind::Staking, .. })));
    }
}
