//! crypticorn is a CLI tool to estimate, deploy and verify the Crypticorn contracts.

mod cli;

use anyhow::{Context, Result};
use clap::Parser;

use cli::{BalanceArgs, Cli, Command, DeployArgs, EstimateArgs, ProfileArgs, VerifyArgs};
use crypticorn_deploy::{
    CostEstimator, DeployInputs, EstimateSummary, EtherscanExplorer, NetworkProfile,
    NetworkProvider, Pipeline, PipelineOptions, RpcProvider, VerificationAgent,
    VerificationRequest, check_balance, parse_address,
};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize the logger.
    tracing_subscriber::fmt()
        .with_max_level(cli.verbosity)
        .init();

    let profile = cli.network.load_profile()?;

    match &cli.command {
        Command::Estimate(args) => estimate(&cli, args, &profile).await,
        Command::Deploy(args) => deploy(&cli, args, &profile).await,
        Command::Verify(args) => verify(&cli, args, &profile).await,
        Command::Balance(args) => balance(args, &profile).await,
        Command::Profile(args) => write_profile(args, &profile),
    }
}

async fn estimate(cli: &Cli, args: &EstimateArgs, profile: &NetworkProfile) -> Result<()> {
    let inputs = DeployInputs::from_raw(args.inputs.to_raw())?;
    let plan = inputs.build_plan(args.plan.plan, args.plan.standard_staking)?;
    let buffer_factor = args.cost.buffer_factor()?;

    let provider = RpcProvider::connect(profile, inputs.signer.clone()).await?;
    let balance = provider
        .balance(provider.signer_address())
        .await
        .context("Failed to query deployer balance")?;

    let estimate = CostEstimator::new(cli.network.artifact_store())
        .with_buffer_factor(buffer_factor)
        .estimate(&provider, &plan, profile, balance)
        .await?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&estimate)?);
    } else {
        println!(
            "{}",
            EstimateSummary {
                estimate: &estimate,
                native_symbol: &profile.native_symbol,
                usd_price: args.cost.usd_price,
            }
        );
    }

    Ok(())
}

async fn deploy(cli: &Cli, args: &DeployArgs, profile: &NetworkProfile) -> Result<()> {
    let inputs = DeployInputs::from_raw(args.inputs.to_raw())?;
    let plan = inputs.build_plan(args.plan.plan, args.plan.standard_staking)?;
    let options = PipelineOptions {
        verify_mode: args.verify_mode,
        preflight: !args.skip_preflight,
        force: args.force,
        buffer_factor: args.cost.buffer_factor()?,
        executor: args.executor_config(),
    };

    let provider = RpcProvider::connect(profile, inputs.signer.clone()).await?;
    let artifacts = cli.network.artifact_store();
    let explorer = EtherscanExplorer::new(inputs.explorer_api_key.clone(), artifacts.clone())?;

    tracing::info!(
        plan = %args.plan.plan,
        network = %profile.name,
        deployer = %inputs.signer_address(),
        steps = plan.len(),
        verify_mode = %args.verify_mode,
        "Deploying..."
    );

    let report = Pipeline::new(&provider, profile, artifacts, explorer, options)
        .run(&plan)
        .await?
        .with_usd_price(args.cost.usd_price);

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("{report}");
    }

    if let Some(failure) = &report.failure {
        anyhow::bail!("Deployment aborted: {failure}");
    }

    Ok(())
}

async fn verify(cli: &Cli, args: &VerifyArgs, profile: &NetworkProfile) -> Result<()> {
    let raw = args.inputs.to_raw();
    let address = parse_address("--address", &args.address)?;
    let request = VerificationRequest {
        address,
        kind: args.kind,
        constructor_args: raw.constructor_args(args.kind)?,
    };

    let explorer = EtherscanExplorer::new(raw.explorer_api_key(), cli.network.artifact_store())?;
    VerificationAgent::new(explorer)
        .submit(&request, profile)
        .await
        .with_context(|| format!("Failed to verify {} at {}", args.kind, address))?;

    println!("Verified: {}", profile.address_url(address));
    Ok(())
}

async fn balance(args: &BalanceArgs, profile: &NetworkProfile) -> Result<()> {
    let inputs = DeployInputs::from_raw(args.inputs.to_raw())?;
    let provider = RpcProvider::connect(profile, inputs.signer).await?;
    let report = check_balance(&provider, profile).await?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("{report}");
    }

    Ok(())
}

fn write_profile(args: &ProfileArgs, profile: &NetworkProfile) -> Result<()> {
    profile.save_to_file(&args.output)?;
    println!("Network profile written to {}", args.output.display());
    Ok(())
}
