use anyhow::Result;
use std::sync::Arc;

use crate::config::config;
use crate::neynar::NeynarClient;
use crate::profile::{LocalImageStore, ProfileUpdater};
use crate::signer::{FileSignerStore, SignerStore};

pub struct SetPfpCommand {
    pub fid: Option<u64>,
    pub color: String,
}

impl SetPfpCommand {
    pub fn new(color: impl Into<String>) -> Self {
        Self {
            fid: None,
            color: color.into(),
        }
    }

    pub fn with_fid(mut self, fid: Option<u64>) -> Self {
        self.fid = fid;
        self
    }

    pub async fn execute(&self) -> Result<()> {
        let config = config()?;
        let store = FileSignerStore::new(config.signer.state_file());

        let Some(record) = store.load().await? else {
            println!("❌ No saved signer. Run 'colorpfp connect' first");
            anyhow::bail!("no signer");
        };
        let signer = record.signer;
        if !signer.is_approved() {
            println!(
                "⏳ Signer {} is {}, approve it first with 'colorpfp connect'",
                signer.id, signer.status
            );
            anyhow::bail!("signer not approved");
        }

        let client = Arc::new(NeynarClient::new(&config.neynar)?);
        let images = Arc::new(LocalImageStore::from_config(&config.upload));
        let updater = ProfileUpdater::new(client, images);

        let change = match self.fid {
            Some(fid) => updater.set_color(fid, &self.color, &signer.id).await,
            None => updater.set_color_with_signer(&signer, &self.color).await,
        };

        match change {
            Ok(change) => {
                println!("🎨 Profile picture for FID {} set to {}", change.fid, change.color);
                println!("   {}", change.pfp_url);
                Ok(())
            }
            Err(e) => {
                println!("❌ Could not update profile picture: {e}");
                Err(e.into())
            }
        }
    }
}
