use anyhow::Result;

use crate::config::config;
use crate::neynar::{NeynarClient, NeynarUser};

pub struct ProfileCommand {
    pub fid: u64,
}

impl ProfileCommand {
    pub fn new(fid: u64) -> Self {
        Self { fid }
    }

    pub async fn execute(&self) -> Result<()> {
        let config = config()?;
        let client = NeynarClient::new(&config.neynar)?;

        match client.fetch_user(self.fid).await? {
            Some(user) => {
                print_user(&user);
                Ok(())
            }
            None => {
                println!("❌ User with FID {} not found", self.fid);
                anyhow::bail!("user not found");
            }
        }
    }
}

fn print_user(user: &NeynarUser) {
    match &user.display_name {
        Some(name) if !name.is_empty() => println!("👤 {name} (@{})", user.username),
        _ => println!("👤 @{}", user.username),
    }
    println!("   FID: {}", user.fid);
    match user.pfp_url.as_deref().filter(|url| !url.is_empty()) {
        Some(url) => println!("   Profile picture: {url}"),
        None => println!("   Profile picture: (none)"),
    }
}
