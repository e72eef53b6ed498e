use anyhow::Result;
use clap::Parser;

use base_colors_pfp::cli::commands::{
    colors::ColorsCommand, connect::ConnectCommand, profile::ProfileCommand, reset::ResetCommand,
    set_pfp::SetPfpCommand, status::StatusCommand,
};
use base_colors_pfp::cli::{Cli, Commands};
use base_colors_pfp::config::{config, ObservabilityConfig};
use base_colors_pfp::telemetry::{init_telemetry, shutdown_telemetry};

fn main() -> Result<()> {
    let cli = Cli::parse();

    let observability = config()
        .map(|c| c.observability.clone())
        .unwrap_or_else(|_| ObservabilityConfig::default());
    init_telemetry(&observability)?;

    let result = match cli.command {
        // No subcommand: explain how to get started
        None => {
            show_getting_started();
            Ok(())
        }
        Some(Commands::Connect { new, no_wait }) => {
            tokio::runtime::Runtime::new()?.block_on(async {
                ConnectCommand::new()
                    .with_fresh(new)
                    .with_wait(!no_wait)
                    .execute()
                    .await
            })
        }
        Some(Commands::Status { refresh }) => {
            tokio::runtime::Runtime::new()?.block_on(async {
                StatusCommand::new().with_refresh(refresh).execute().await
            })
        }
        Some(Commands::Reset) => {
            tokio::runtime::Runtime::new()?.block_on(async { ResetCommand::new().execute().await })
        }
        Some(Commands::Colors { address, json }) => {
            tokio::runtime::Runtime::new()?.block_on(async {
                ColorsCommand::new(address).with_json(json).execute().await
            })
        }
        Some(Commands::SetPfp { fid, color }) => {
            tokio::runtime::Runtime::new()?.block_on(async {
                SetPfpCommand::new(color).with_fid(fid).execute().await
            })
        }
        Some(Commands::Profile { fid }) => {
            tokio::runtime::Runtime::new()?.block_on(async { ProfileCommand::new(fid).execute().await })
        }
    };

    shutdown_telemetry();
    result
}

fn show_getting_started() {
    println!("🎨 colorpfp: Base Colors profile pictures for Farcaster");
    println!();
    println!("   1. colorpfp connect            approve a signer in Warpcast");
    println!("   2. colorpfp colors <address>   list the colors you own");
    println!("   3. colorpfp set-pfp --color <hex>");
    println!();
    println!("Run 'colorpfp --help' for all commands");
}
