use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use regex::Regex;
use std::sync::LazyLock;
use thiserror::Error;

const BASE64_PREFIX: &str = "data:image/svg+xml;base64,";
const URL_PREFIX: &str = "data:image/svg+xml,";

static HEX_COLOR: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"^#?[0-9A-Fa-f]{6}$").ok());

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ColorError {
    #[error("Invalid hex color: {0}")]
    InvalidHex(String),

    #[error("Invalid SVG data URL: {0}")]
    InvalidDataUrl(String),
}

pub fn is_hex_color(value: &str) -> bool {
    HEX_COLOR
        .as_ref()
        .is_some_and(|re| re.is_match(value.trim()))
}

/// `#RRGGBB` form of a six-digit hex color, with or without the leading `#`
pub fn normalize_hex(value: &str) -> Result<String, ColorError> {
    let trimmed = value.trim();
    if !is_hex_color(trimmed) {
        return Err(ColorError::InvalidHex(value.to_string()));
    }
    Ok(format!("#{}", trimmed.trim_start_matches('#').to_ascii_uppercase()))
}

/// Raw markup for a single full-bleed square of `hex`
pub fn color_svg_markup(hex: &str) -> Result<String, ColorError> {
    let color = normalize_hex(hex)?;
    Ok(format!(
        r#"<svg xmlns="http://www.w3.org/2000/svg" viewBox="0 0 100 100"><rect width="100" height="100" fill="{color}"/></svg>"#
    ))
}

/// 100x100 color square as a base64 `data:` URL
pub fn generate_color_svg(hex: &str) -> Result<String, ColorError> {
    let markup = color_svg_markup(hex)?;
    Ok(format!("{BASE64_PREFIX}{}", STANDARD.encode(markup)))
}

/// Turn an uploaded payload into raw SVG markup.
///
/// Accepts a base64 data URL, a percent-encoded data URL, or raw markup.
pub fn format_svg_data(data: &str) -> Result<String, ColorError> {
    if let Some(encoded) = data.strip_prefix(BASE64_PREFIX) {
        let bytes = STANDARD
            .decode(encoded.trim())
            .map_err(|e| ColorError::InvalidDataUrl(e.to_string()))?;
        return String::from_utf8(bytes).map_err(|e| ColorError::InvalidDataUrl(e.to_string()));
    }

    if let Some(encoded) = data.strip_prefix(URL_PREFIX) {
        return percent_decode(encoded);
    }

    Ok(data.to_string())
}

fn percent_decode(input: &str) -> Result<String, ColorError> {
    let bytes = input.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' {
            let escape = input
                .get(i + 1..i + 3)
                .and_then(|hex| u8::from_str_radix(hex, 16).ok())
                .ok_or_else(|| ColorError::InvalidDataUrl(format!("bad escape at byte {i}")))?;
            out.push(escape);
            i += 3;
        } else {
            out.push(bytes[i]);
            i += 1;
        }
    }
    String::from_utf8(out).map_err(|e| ColorError::InvalidDataUrl(e.to_string()))
}
