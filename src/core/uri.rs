use tracing::debug;

use crate::core::{
    codec::decode_base64url,
    error::{Error, Result},
    manifest::LinkManifest,
};

/// Scheme prefix of a Health Link.
pub const SHLINK_PREFIX: &str = "shlink:/";
/// Scheme prefix of a Health Card.
pub const SHC_PREFIX: &str = "shc:/";

/// Offset applied to each two-digit group of the numeric QR encoding.
const NUMERIC_OFFSET: u8 = 45;

/// A recognized health artifact.
#[derive(Debug, Clone)]
pub enum Artifact {
    Link(LinkManifest),
    /// The compact credential string, prefix removed.
    Card(String),
}

impl Artifact {
    /// Recognize either scheme, also when carried in a viewer URL fragment
    /// (`https://viewer.example/#shlink:/...`).
    pub fn parse(input: &str) -> Result<Self> {
        let candidate = match input.rsplit_once('#') {
            Some((_, fragment))
                if fragment.starts_with(SHLINK_PREFIX) || fragment.starts_with(SHC_PREFIX) =>
            {
                fragment
            }
            _ => input,
        };

        if candidate.starts_with(SHLINK_PREFIX) {
            parse_link(candidate).map(Artifact::Link)
        } else if candidate.starts_with(SHC_PREFIX) {
            parse_card_uri(candidate).map(Artifact::Card)
        } else {
            Err(Error::credential(
                "input is neither a 'shlink:/' nor a 'shc:/' artifact",
            ))
        }
    }
}

/// Parse a `shlink:/` URI into its validated manifest.
pub fn parse_link(uri: &str) -> Result<LinkManifest> {
    let encoded = uri
        .strip_prefix(SHLINK_PREFIX)
        .ok_or_else(|| Error::manifest(format!("expected '{SHLINK_PREFIX}' prefix")))?;

    let json = decode_base64url(encoded)
        .map_err(|e| Error::manifest(format!("manifest is not base64url: {e}")))?;

    LinkManifest::from_json(&json)
}

/// Strip the `shc:/` prefix, returning the compact credential string.
///
/// A remainder made only of digits is the numeric QR encoding and is decoded; anything else is
/// returned verbatim and validated later by the credential decoder.
pub fn parse_card_uri(uri: &str) -> Result<String> {
    let payload = uri
        .strip_prefix(SHC_PREFIX)
        .ok_or_else(|| Error::credential(format!("expected '{SHC_PREFIX}' prefix")))?;

    if !payload.is_empty() && payload.bytes().all(|b| b.is_ascii_digit()) {
        debug!("decoding numeric health card payload");
        return decode_numeric(payload);
    }

    Ok(payload.to_owned())
}

fn decode_numeric(digits: &str) -> Result<String> {
    if digits.len() % 2 != 0 {
        return Err(Error::credential(
            "numeric health card payload has an odd number of digits",
        ));
    }

    digits
        .as_bytes()
        .chunks(2)
        .map(|pair| {
            let value = (pair[0] - b'0') * 10 + (pair[1] - b'0');
            // Only 0..=77 maps into the base64url and '.' range.
            if value > 77 {
                return Err(Error::credential(format!(
                    "numeric health card payload contains out of range value {value}"
                )));
            }
            Ok(char::from(value + NUMERIC_OFFSET))
        })
        .collect()
}
