use anyhow::Result;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::timeout;

use super::{build_coordinator, print_signer};
use crate::config::config;
use crate::shutdown::ShutdownCoordinator;
use crate::signer::{FlowLock, FlowNotice, FlowSnapshot, RetryAction, SignerCoordinator};

const PROFILE_WAIT: Duration = Duration::from_secs(10);

pub struct ConnectCommand {
    pub fresh: bool,
    pub wait: bool,
}

impl Default for ConnectCommand {
    fn default() -> Self {
        Self::new()
    }
}

impl ConnectCommand {
    pub fn new() -> Self {
        Self {
            fresh: false,
            wait: true,
        }
    }

    pub fn with_fresh(mut self, fresh: bool) -> Self {
        self.fresh = fresh;
        self
    }

    pub fn with_wait(mut self, wait: bool) -> Self {
        self.wait = wait;
        self
    }

    pub async fn execute(&self) -> Result<()> {
        let config = config()?;
        let state_file = config.signer.state_file();
        let _lock = match FlowLock::try_acquire(&state_file) {
            Ok(lock) => lock,
            Err(e) => {
                println!("❌ Another colorpfp connect is already running");
                return Err(e.into());
            }
        };

        let (coordinator, _client) = build_coordinator(config)?;
        let mut shutdown = ShutdownCoordinator::new();
        shutdown.register(coordinator.clone());

        let result = self.drive(&coordinator).await;
        shutdown.shutdown_all().await?;
        result
    }

    async fn drive(&self, coordinator: &SignerCoordinator) -> Result<()> {
        if self.fresh {
            println!("🧹 Discarding saved signer");
            coordinator.reset().await?;
        }

        let signer = match coordinator.recover_from_storage().await? {
            Some(signer) => {
                println!("🔄 Resuming saved signer");
                signer
            }
            None => {
                println!("🔑 Creating a new signer...");
                match coordinator.create().await {
                    Ok(signer) => signer,
                    Err(e) => {
                        println!("❌ {e}");
                        return Err(e.into());
                    }
                }
            }
        };

        print_signer(&signer);
        if let Some(notice) = coordinator.snapshot().notice {
            print_notice(&notice);
        }

        if signer.is_approved() {
            println!("🎉 Signer is already approved, you're all set");
            return Ok(());
        }

        if !self.wait {
            println!();
            println!("📱 Open the approval link in Warpcast, then run 'colorpfp status'");
            return Ok(());
        }

        println!();
        println!("📱 Scan or open the approval link in Warpcast. Waiting for approval (Ctrl-C to stop)...");
        self.wait_for_approval(coordinator).await
    }

    async fn wait_for_approval(&self, coordinator: &SignerCoordinator) -> Result<()> {
        let mut updates = coordinator.subscribe();
        let initial = updates.borrow_and_update().clone();
        if is_approved(&initial) {
            let snapshot = wait_for_profile(&mut updates, initial).await;
            print_approved(&snapshot);
            return Ok(());
        }
        let mut last_notice = initial.notice;

        loop {
            tokio::select! {
                changed = updates.changed() => {
                    if changed.is_err() {
                        return Ok(());
                    }
                    let snapshot = updates.borrow_and_update().clone();
                    if snapshot.notice != last_notice {
                        if let Some(notice) = &snapshot.notice {
                            print_notice(notice);
                        }
                        last_notice = snapshot.notice.clone();
                    }
                    if is_approved(&snapshot) {
                        let snapshot = wait_for_profile(&mut updates, snapshot).await;
                        print_approved(&snapshot);
                        return Ok(());
                    }
                }
                signal = ShutdownCoordinator::wait_for_signal() => {
                    signal?;
                    println!();
                    println!("⏸️  Stopped waiting. Run 'colorpfp connect' again to resume");
                    return Ok(());
                }
            }
        }
    }
}

fn is_approved(snapshot: &FlowSnapshot) -> bool {
    snapshot.signer.as_ref().is_some_and(|s| s.is_approved())
}

/// Give the post-approval profile lookup a moment to land
async fn wait_for_profile(
    updates: &mut watch::Receiver<FlowSnapshot>,
    snapshot: FlowSnapshot,
) -> FlowSnapshot {
    let has_fid = snapshot.signer.as_ref().and_then(|s| s.owner_fid).is_some();
    if !has_fid || snapshot.current_pfp_url.is_some() {
        return snapshot;
    }
    match timeout(PROFILE_WAIT, updates.wait_for(|s| s.current_pfp_url.is_some())).await {
        Ok(Ok(latest)) => latest.clone(),
        _ => snapshot,
    }
}

fn print_approved(snapshot: &FlowSnapshot) {
    println!("🎉 Signer approved");
    if let Some(fid) = snapshot.signer.as_ref().and_then(|s| s.owner_fid) {
        println!("   FID: {fid}");
    }
    if let Some(pfp) = &snapshot.current_pfp_url {
        println!("   Current profile picture: {pfp}");
    }
    println!("🎨 Pick a color with 'colorpfp set-pfp --color <hex>'");
}

fn print_notice(notice: &FlowNotice) {
    let icon = if notice.is_error() { "⚠️ " } else { "ℹ️ " };
    println!("{icon} {notice}");
    if let Some(action) = notice.retry_action() {
        let hint = match action {
            RetryAction::CreateSigner => "run 'colorpfp connect --new' to try again",
            RetryAction::RetryRegistration => {
                "run 'colorpfp connect' again to request a new link"
            }
            RetryAction::RescanApproval => "scan the approval link again",
        };
        println!("   👉 {hint}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signer::{Signer, SignerStatus};

    fn approved(fid: Option<u64>) -> Signer {
        Signer {
            status: SignerStatus::Approved,
            owner_fid: fid,
            ..Signer::generated("signer-1", "0xabc")
        }
    }

    #[test]
    fn test_is_approved() {
        let pending = FlowSnapshot {
            signer: Some(Signer::generated("signer-1", "0xabc")),
            ..Default::default()
        };
        assert!(!is_approved(&pending));
        assert!(!is_approved(&FlowSnapshot::default()));

        let done = FlowSnapshot {
            signer: Some(approved(Some(9))),
            ..Default::default()
        };
        assert!(is_approved(&done));
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_for_profile_gives_up_after_timeout() {
        let (_tx, mut rx) = watch::channel(FlowSnapshot::default());
        let snapshot = FlowSnapshot {
            signer: Some(approved(Some(9))),
            ..Default::default()
        };
        let result = wait_for_profile(&mut rx, snapshot.clone()).await;
        assert_eq!(result, snapshot);
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_for_profile_picks_up_late_pfp() {
        let snapshot = FlowSnapshot {
            signer: Some(approved(Some(9))),
            ..Default::default()
        };
        let (tx, mut rx) = watch::channel(snapshot.clone());
        tokio::spawn({
            let with_pfp = FlowSnapshot {
                current_pfp_url: Some("https://i.example/9.png".into()),
                ..snapshot.clone()
            };
            async move {
                tokio::time::sleep(Duration::from_secs(1)).await;
                tx.send_replace(with_pfp);
                tokio::time::sleep(Duration::from_secs(60)).await;
            }
        });

        let result = wait_for_profile(&mut rx, snapshot).await;
        assert_eq!(result.current_pfp_url.as_deref(), Some("https://i.example/9.png"));
    }

    #[test]
    fn test_builder_flags() {
        let command = ConnectCommand::new().with_fresh(true).with_wait(false);
        assert!(command.fresh);
        assert!(!command.wait);
    }
}
