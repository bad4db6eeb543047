use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context};
use clap::Parser;
use tag_trainer::adapters::BridgeServer;
use tag_trainer::config::AppConfig;
use tag_trainer::persistence::RunContext;
use tag_trainer::rl::Trainer;
use tracing::info;

mod main_runtime;

/// Online PPO trainer for the seeker/hider game bridge
#[derive(Parser, Debug)]
#[command(name = "tag-trainer", version, about)]
struct Cli {
    /// Directory holding default.toml and <TAG_TRAINER_ENV>.toml
    #[arg(long, env = "TAG_TRAINER_CONFIG_DIR", default_value = "config")]
    config_dir: PathBuf,

    #[arg(long)]
    host: Option<String>,

    #[arg(long)]
    port: Option<u16>,

    /// Start from fresh parameters even if policy files exist
    #[arg(long)]
    no_policy_load: bool,

    #[arg(long)]
    run_id: Option<String>,

    #[arg(long)]
    approach: Option<String>,
}

impl Cli {
    fn apply(&self, config: &mut AppConfig) {
        if let Some(host) = &self.host {
            config.server.host = host.clone();
        }
        if let Some(port) = self.port {
            config.server.port = port;
        }
        if self.no_policy_load {
            config.training.disable_policy_load = true;
        }
        if let Some(run_id) = &self.run_id {
            config.run.run_id = Some(run_id.clone());
        }
        if let Some(approach) = &self.approach {
            config.run.approach = approach.clone();
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = AppConfig::load_from(&cli.config_dir)
        .with_context(|| format!("loading configuration from {}", cli.config_dir.display()))?;
    cli.apply(&mut config);
    if let Err(errors) = config.validate() {
        bail!("invalid configuration: {}", errors.join("; "));
    }

    let _log_guard = main_runtime::init_logging(&config.logging);

    let run = RunContext::open(&config)?;
    info!(
        run_id = %run.run_id,
        approach = %run.approach,
        run_dir = %run.run_dir.display(),
        "run started"
    );

    let trainer = Arc::new(Trainer::for_run(&config, &run)?);
    let server = BridgeServer::bind(&config.server.bind_addr(), trainer).await?;
    server.run_until(main_runtime::shutdown_signal()).await?;

    info!("bridge stopped");
    Ok(())
}
