use anyhow::Result;
use std::sync::Arc;

use crate::config::ColorPfpConfig;
use crate::neynar::NeynarClient;
use crate::signer::{CoordinatorConfig, FileSignerStore, Signer, SignerCoordinator, SignerStatus};

pub mod colors;
pub mod connect;
pub mod profile;
pub mod reset;
pub mod set_pfp;
pub mod status;

/// Build a coordinator backed by Neynar and the configured state file
pub fn build_coordinator(config: &ColorPfpConfig) -> Result<(SignerCoordinator, NeynarClient)> {
    let client = NeynarClient::new(&config.neynar)?;
    let store = FileSignerStore::new(config.signer.state_file());
    let coordinator = SignerCoordinator::new(
        Arc::new(client.clone()),
        Arc::new(store),
        CoordinatorConfig::from(&config.signer),
    );
    Ok((coordinator, client))
}

pub fn status_icon(status: SignerStatus) -> &'static str {
    match status {
        SignerStatus::Approved => "✅",
        SignerStatus::PendingApproval => "⏳",
        SignerStatus::Generated => "🆕",
        SignerStatus::Revoked => "🚫",
        SignerStatus::Unknown => "❔",
    }
}

pub fn print_signer(signer: &Signer) {
    println!("{} Signer {}", status_icon(signer.status), signer.id);
    println!("   Status: {}", signer.status);
    if let Some(fid) = signer.owner_fid {
        println!("   FID: {fid}");
    }
    if let Some(url) = signer.approval_url() {
        println!("   Approval link: {url}");
    }
}
