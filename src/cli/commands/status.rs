use anyhow::Result;

use super::print_signer;
use crate::config::config;
use crate::neynar::NeynarClient;
use crate::signer::{FileSignerStore, Signer, SignerProvider, SignerStore};

pub struct StatusCommand {
    pub refresh: bool,
}

impl Default for StatusCommand {
    fn default() -> Self {
        Self::new()
    }
}

impl StatusCommand {
    pub fn new() -> Self {
        Self { refresh: false }
    }

    pub fn with_refresh(mut self, refresh: bool) -> Self {
        self.refresh = refresh;
        self
    }

    pub async fn execute(&self) -> Result<()> {
        let config = config()?;
        let store = FileSignerStore::new(config.signer.state_file());

        let Some(record) = store.load().await? else {
            println!("📭 No saved signer. Run 'colorpfp connect' to create one");
            return Ok(());
        };

        let mut signer = record.signer;
        if self.refresh {
            let client = NeynarClient::new(&config.neynar)?;
            signer = refresh_signer(&client, &store, signer).await?;
        }

        println!("📊 Signer status");
        println!("   Saved: {} on {}", record.saved_at.format("%Y-%m-%d %H:%M:%S UTC"), record.hostname);
        print_signer(&signer);
        if signer.is_approved() {
            println!("🎨 Ready: run 'colorpfp set-pfp --color <hex>'");
        } else {
            println!("⏳ Not approved yet: run 'colorpfp connect' to keep waiting");
        }
        Ok(())
    }
}

/// Merge the provider's current view into `signer` and save it if it changed
pub async fn refresh_signer(
    provider: &dyn SignerProvider,
    store: &dyn SignerStore,
    mut signer: Signer,
) -> Result<Signer> {
    print!("🔄 Checking signer with Neynar... ");
    let _ = std::io::Write::flush(&mut std::io::stdout());
    let update = match provider.fetch_signer(&signer.id).await {
        Ok(update) => update,
        Err(e) => {
            println!("❌");
            return Err(e.into());
        }
    };
    println!("✅");

    if !update.id.is_empty() && update.id != signer.id {
        println!("⚠️  Provider answered for a different signer, keeping the saved one");
        return Ok(signer);
    }

    let before = signer.clone();
    signer.merge(&update);
    if signer != before {
        store.save(&signer).await?;
    }
    Ok(signer)
}
