use anyhow::Result;
use log::error;

use nilan_modbus::cli::{build_cli, handle_subcommands};

#[tokio::main]
async fn main() -> Result<()> {
    let matches = build_cli().get_matches();

    let level = if matches.get_flag("verbose") { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    if let Err(e) = handle_subcommands(&matches).await {
        error!("❌ {:#}", e);
        return Err(e);
    }
    Ok(())
}
