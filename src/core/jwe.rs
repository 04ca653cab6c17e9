use josekit::jwe::{self, Dir};
use serde_json::Value as Json;
use tracing::debug;

use crate::core::{
    codec::decode_utf8,
    error::{Error, Result},
    manifest::DecryptionKey,
};

/// Content encryption used by Health Link payloads.
pub const DEFAULT_ENC: &str = "A256GCM";

/// Decrypt a compact direct-key JWE (`alg: dir`) and return its plaintext.
///
/// `zip: DEF` payloads are inflated.
///
/// # Errors
///
/// [Error::DecryptionFailed] for a malformed JWE, an algorithm other than `dir`, a key of the
/// wrong length, or an authentication tag mismatch.
pub fn decrypt(jwe: &str, key: &DecryptionKey) -> Result<String> {
    let decrypter = Dir
        .decrypter_from_bytes(key.as_bytes())
        .map_err(|e| Error::decryption(format!("unusable content key: {e}")))?;

    let (plaintext, header) =
        jwe::deserialize_compact(jwe, &decrypter).map_err(Error::decryption)?;
    debug!(
        "decrypted health link file (enc: {:?}, zip: {:?})",
        header.content_encryption(),
        header.compression()
    );

    decode_utf8(plaintext).map_err(Error::decryption)
}

/// Extract the credential strings from a decrypted payload's `verifiableCredential` array.
pub fn extract_credentials(plaintext: &str) -> Result<Vec<String>> {
    let json: Json = serde_json::from_str(plaintext)
        .map_err(|e| Error::plaintext(format!("plaintext is not valid JSON: {e}")))?;

    let Some(Json::Array(credentials)) = json.get("verifiableCredential") else {
        return Err(Error::plaintext("'verifiableCredential' is missing or not an array"));
    };

    credentials
        .iter()
        .map(|credential| match credential {
            Json::String(s) => Ok(s.clone()),
            _ => Err(Error::plaintext(
                "'verifiableCredential' contains a non-string entry",
            )),
        })
        .collect()
}
