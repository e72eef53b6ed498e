use clap::{Parser, Subcommand};

pub mod commands;

#[derive(Parser)]
#[command(name = "colorpfp")]
#[command(version)]
#[command(about = "Set your Farcaster profile picture to a Base Color you own")]
#[command(long_about = "colorpfp connects a Neynar managed signer to your Farcaster account, \
                       lists the Base Colors NFTs you hold and turns one into your profile picture. \
                       Get started with 'colorpfp connect' and approve the signer in Warpcast.")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Connect a signer: resume the saved flow or create a new one, then wait for approval
    Connect {
        /// Discard any saved signer and start over
        #[arg(long, help = "Discard the saved signer and create a new one")]
        new: bool,
        /// Print the approval link and exit without waiting
        #[arg(long, help = "Print the approval link and exit instead of waiting for approval")]
        no_wait: bool,
    },
    /// Show the saved signer and its approval state
    Status {
        /// Ask the provider for the signer's current state
        #[arg(long, help = "Reconcile the saved signer with the provider before printing")]
        refresh: bool,
    },
    /// Delete the saved signer
    Reset,
    /// List the Base Colors owned by an address
    Colors {
        /// Owner address (0x...)
        address: String,
        /// Print JSON instead of a table
        #[arg(long, help = "Output machine-readable JSON")]
        json: bool,
    },
    /// Make a color your profile picture using the approved signer
    SetPfp {
        /// Target FID; defaults to the FID that approved the signer
        #[arg(long, help = "FID to update (defaults to the approving account)")]
        fid: Option<u64>,
        /// Hex color, with or without '#'
        #[arg(long, help = "Color as six hex digits, e.g. #0052FF")]
        color: String,
    },
    /// Show the current profile picture of an FID
    Profile {
        /// Farcaster ID
        fid: u64,
    },
}
