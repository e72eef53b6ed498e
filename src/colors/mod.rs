// Colors Module - Base Colors ownership lookup and color art

pub mod alchemy;
pub mod svg;

use serde::{Deserialize, Serialize};

pub use alchemy::AlchemyClient;
pub use svg::{format_svg_data, generate_color_svg, normalize_hex, ColorError};

/// A Base Colors NFT held by the user
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BaseColor {
    pub token_id: String,
    /// Human color name, or the hex value when the token has none
    pub name: String,
    /// `#RRGGBB`
    pub color_value: String,
    pub image_url: String,
}

/// `0x` followed by 40 hex digits
pub fn is_address(value: &str) -> bool {
    value
        .strip_prefix("0x")
        .is_some_and(|hex| hex.len() == 40 && hex.chars().all(|c| c.is_ascii_hexdigit()))
}
