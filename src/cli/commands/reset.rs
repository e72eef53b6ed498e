use anyhow::Result;

use crate::config::config;
use crate::signer::{FileSignerStore, FlowLock, SignerStore, StoreError};

pub struct ResetCommand;

impl Default for ResetCommand {
    fn default() -> Self {
        Self::new()
    }
}

impl ResetCommand {
    pub fn new() -> Self {
        Self
    }

    pub async fn execute(&self) -> Result<()> {
        let config = config()?;
        let state_file = config.signer.state_file();

        let _lock = match FlowLock::try_acquire(&state_file) {
            Ok(lock) => lock,
            Err(StoreError::Locked(path)) => {
                println!("❌ A 'colorpfp connect' is running ({}). Stop it first", path.display());
                return Err(StoreError::Locked(path).into());
            }
            Err(e) => return Err(e.into()),
        };

        let store = FileSignerStore::new(&state_file);
        match store.load().await? {
            Some(record) => {
                store.clear().await?;
                println!("🧹 Removed signer {} ({})", record.signer.id, record.signer.status);
            }
            None => {
                store.clear().await?;
                println!("✅ No saved signer, nothing to reset");
            }
        }
        println!("🔄 Run 'colorpfp connect' to start a new approval flow");
        Ok(())
    }
}
