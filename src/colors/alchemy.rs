use reqwest::Method;
use serde::Deserialize;
use tracing::{debug, info, warn};

use super::svg::is_hex_color;
use super::{is_address, BaseColor};
use crate::config::AlchemyConfig;
use crate::http::{ProviderError, RateLimitedHttpClient, RetryHandler};

const PAGE_SIZE: &str = "100";
const FALLBACK_API_KEY: &str = "demo";

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OwnedNftsResponse {
    #[serde(default)]
    owned_nfts: Vec<AlchemyNft>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AlchemyNft {
    token_id: String,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    image: Option<NftImage>,
    #[serde(default)]
    raw: Option<NftRaw>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct NftImage {
    #[serde(default)]
    original_url: Option<String>,
    #[serde(default)]
    cached_url: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct NftRaw {
    #[serde(default)]
    metadata: Option<NftMetadata>,
}

#[derive(Debug, Default, Deserialize)]
struct NftMetadata {
    #[serde(default)]
    attributes: Vec<NftAttribute>,
}

#[derive(Debug, Deserialize)]
struct NftAttribute {
    #[serde(default)]
    trait_type: String,
    #[serde(default)]
    value: serde_json::Value,
}

impl AlchemyNft {
    /// Human color name from the `Color Name`/`Name` trait, skipping
    /// values that are only a bare hex code
    fn human_name(&self) -> Option<String> {
        self.raw
            .as_ref()?
            .metadata
            .as_ref()?
            .attributes
            .iter()
            .filter(|attr| attr.trait_type == "Color Name" || attr.trait_type == "Name")
            .filter_map(|attr| attr.value.as_str())
            .map(str::trim)
            .find(|value| !value.is_empty() && !(is_hex_color(value) && !value.starts_with('#')))
            .map(str::to_string)
    }

    fn into_base_color(self) -> BaseColor {
        let raw_name = self.name.clone().unwrap_or_default();
        let raw_name = raw_name.trim();
        let color_value = if raw_name.starts_with('#') {
            raw_name.to_string()
        } else {
            format!("#{raw_name}")
        };
        let name = self.human_name().unwrap_or_else(|| color_value.clone());
        let image_url = self
            .image
            .and_then(|image| image.original_url.or(image.cached_url))
            .unwrap_or_default();

        BaseColor {
            token_id: self.token_id,
            name,
            color_value,
            image_url,
        }
    }
}

/// Alchemy NFT API client for Base Colors ownership
#[derive(Debug, Clone)]
pub struct AlchemyClient {
    http: RateLimitedHttpClient,
    retry: RetryHandler,
    base_url: String,
    api_key: String,
    contract_address: String,
}

impl AlchemyClient {
    pub fn new(config: &AlchemyConfig) -> Result<Self, ProviderError> {
        let api_key = match config.api_key.as_deref().map(str::trim) {
            Some(key) if !key.is_empty() => key.to_string(),
            _ => {
                warn!("ALCHEMY_API_KEY is not set, using the rate-limited demo key");
                FALLBACK_API_KEY.to_string()
            }
        };

        Ok(Self {
            http: RateLimitedHttpClient::new("alchemy", config.requests_per_second)?,
            retry: RetryHandler::default(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key,
            contract_address: config.contract_address.clone(),
        })
    }

    pub fn with_retry(mut self, retry: crate::http::RetryConfig) -> Self {
        self.retry = RetryHandler::new(retry);
        self
    }

    /// Base Colors owned by `owner`, failing on transport or decode errors
    pub async fn try_fetch_owned_colors(&self, owner: &str) -> Result<Vec<BaseColor>, ProviderError> {
        if !is_address(owner) {
            return Err(ProviderError::InvalidInput(format!(
                "{owner} is not an Ethereum address"
            )));
        }

        let url = format!("{}/nft/v3/{}/getNFTsForOwner", self.base_url, self.api_key);
        let cache_key = format!("owned:{}", owner.to_lowercase());
        debug!(owner, contract = %self.contract_address, "Fetching Base Colors");

        let response: OwnedNftsResponse = self
            .retry
            .execute("get_nfts_for_owner", || {
                let request = self.http.http().request(Method::GET, &url).query(&[
                    ("owner", owner),
                    ("contractAddresses[]", self.contract_address.as_str()),
                    ("withMetadata", "true"),
                    ("pageSize", PAGE_SIZE),
                ]);
                self.http.send_json(request, Some(cache_key.as_str()))
            })
            .await?;

        let colors: Vec<BaseColor> = response
            .owned_nfts
            .into_iter()
            .map(AlchemyNft::into_base_color)
            .collect();
        info!(owner, count = colors.len(), "Fetched Base Colors");
        Ok(colors)
    }

    /// Base Colors owned by `owner`. Any failure yields an empty list.
    pub async fn fetch_owned_colors(&self, owner: &str) -> Vec<BaseColor> {
        match self.try_fetch_owned_colors(owner).await {
            Ok(colors) => {
                if colors.is_empty() {
                    warn!(owner, "No Base Colors found for owner");
                }
                colors
            }
            Err(e) => {
                warn!(owner, error = %e, "Failed to fetch Base Colors");
                Vec::new()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn nft(json: serde_json::Value) -> AlchemyNft {
        serde_json::from_value(json).unwrap()
    }

    #[test]
    fn test_human_name_from_attributes() {
        let color = nft(serde_json::json!({
            "tokenId": "42",
            "name": "#FF00AA",
            "image": {"originalUrl": "https://img.example/42.svg"},
            "raw": {"metadata": {"attributes": [
                {"trait_type": "Color Name", "value": "FF00AA"},
                {"trait_type": "Name", "value": "Hot Magenta"}
            ]}}
        }))
        .into_base_color();

        assert_eq!(color.token_id, "42");
        assert_eq!(color.name, "Hot Magenta");
        assert_eq!(color.color_value, "#FF00AA");
        assert_eq!(color.image_url, "https://img.example/42.svg");
    }

    #[test]
    fn test_name_falls_back_to_hex_and_prefixes_hash() {
        let color = nft(serde_json::json!({
            "tokenId": "7",
            "name": "00FF00",
            "raw": {"metadata": {"attributes": [
                {"trait_type": "Rarity", "value": "common"}
            ]}}
        }))
        .into_base_color();

        assert_eq!(color.color_value, "#00FF00");
        assert_eq!(color.name, "#00FF00");
        assert_eq!(color.image_url, "");
    }

    #[test]
    fn test_non_string_attribute_values_are_skipped() {
        let color = nft(serde_json::json!({
            "tokenId": "8",
            "name": "#123456",
            "raw": {"metadata": {"attributes": [
                {"trait_type": "Name", "value": 12},
                {"trait_type": "Color Name", "value": "Deep Sea"}
            ]}}
        }))
        .into_base_color();

        assert_eq!(color.name, "Deep Sea");
    }

    #[test]
    fn test_missing_key_uses_demo() {
        let client = AlchemyClient::new(&AlchemyConfig::default()).unwrap();
        assert_eq!(client.api_key, FALLBACK_API_KEY);
    }
}
