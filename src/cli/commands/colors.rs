use anyhow::Result;

use crate::colors::{is_address, AlchemyClient, BaseColor};
use crate::config::config;

pub struct ColorsCommand {
    pub address: String,
    pub json: bool,
}

impl ColorsCommand {
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            json: false,
        }
    }

    pub fn with_json(mut self, json: bool) -> Self {
        self.json = json;
        self
    }

    pub async fn execute(&self) -> Result<()> {
        let address = self.address.trim();
        if !is_address(address) {
            anyhow::bail!("'{address}' is not an address. Expected 0x followed by 40 hex digits");
        }

        let config = config()?;
        let client = AlchemyClient::new(&config.alchemy)?;
        let colors = client.fetch_owned_colors(address).await;

        if self.json {
            println!("{}", serde_json::to_string_pretty(&colors)?);
            return Ok(());
        }

        if colors.is_empty() {
            println!("🎨 No Base Colors found for {address}");
            return Ok(());
        }

        println!("🎨 {} Base Colors owned by {address}", colors.len());
        println!();
        for color in &colors {
            println!("{}", format_color_row(color));
        }
        Ok(())
    }
}

fn format_color_row(color: &BaseColor) -> String {
    if color.name == color.color_value {
        format!("  #{:<8} {}", color.token_id, color.color_value)
    } else {
        format!("  #{:<8} {}  {}", color.token_id, color.color_value, color.name)
    }
}
