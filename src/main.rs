use clap::Parser;
use policy_hub::cli::Cli;
use policy_hub::config::{HubConfig, config_path, log_path};

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Only the default location may be absent
    let config = match cli.config.as_deref() {
        Some(path) => HubConfig::load_from(path)?,
        None => HubConfig::load(&config_path())?,
    };
    let _guard = policy_hub::logging::init(&config.log, &log_path())?;

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?
        .block_on(policy_hub::cli::run(cli, config))
}
