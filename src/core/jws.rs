use p256::ecdsa::{signature::Verifier, Signature};
use tracing::debug;

use crate::core::{
    card::CompactCard,
    codec::decode_base64url,
    error::{Error, Result},
    jwk::KeySet,
};

/// The only signature algorithm Health Cards use.
pub const ES256: &str = "ES256";

/// Outcome of checking a credential's signature.
#[derive(Debug)]
pub enum Verification {
    /// The signature verified against the key with this `kid`.
    Verified { kid: Option<String> },
    /// The credential is well formed but its signature could not be confirmed.
    Unverified { reason: String },
    /// The credential's header could not be decoded at all.
    Malformed(Error),
}

impl Verification {
    pub fn is_verified(&self) -> bool {
        matches!(self, Verification::Verified { .. })
    }
}

impl From<Result<Option<String>>> for Verification {
    fn from(result: Result<Option<String>>) -> Self {
        match result {
            Ok(kid) => Verification::Verified { kid },
            Err(Error::SignatureVerificationFailed(reason)) => Verification::Unverified { reason },
            Err(e) => Verification::Malformed(e),
        }
    }
}

/// Check the compact signature over `header.payload`.
///
/// Returns the `kid` of the key that verified. Keys are selected by the header's `kid` when it
/// has one, otherwise every ES256 key of the set is tried in document order and the first match
/// wins.
///
/// # Errors
///
/// [Error::SignatureVerificationFailed] when no key verifies the signature, the algorithm is
/// not ES256, or the signature segment is not a 64 byte `r || s` value.
/// [Error::MalformedCredential] when the credential structure or header cannot be decoded.
pub fn check_signature(card: &str, keys: &KeySet) -> Result<Option<String>> {
    let compact = CompactCard::split(card)?;
    let header = compact.header()?;

    if header.alg != ES256 {
        return Err(Error::SignatureVerificationFailed(format!(
            "unsupported algorithm '{}'",
            header.alg
        )));
    }

    let signature = decode_base64url(compact.signature)
        .ok()
        .and_then(|bytes| Signature::from_slice(&bytes).ok())
        .ok_or_else(|| {
            Error::SignatureVerificationFailed("signature segment is not an ES256 signature".into())
        })?;

    let message = compact.signing_input();
    let mut tried = 0usize;
    for jwk in keys.candidates(header.kid.as_deref()) {
        tried += 1;
        let key = match jwk.verifying_key() {
            Ok(key) => key,
            Err(e) => {
                debug!("skipping unusable JWK {:?}: {e:#}", jwk.kid);
                continue;
            }
        };
        if key.verify(message.as_bytes(), &signature).is_ok() {
            return Ok(jwk.kid.clone());
        }
    }

    Err(Error::SignatureVerificationFailed(match (tried, header.kid) {
        (0, Some(kid)) => format!("no ES256 key with kid '{kid}' in issuer key set"),
        (0, None) => "issuer key set has no ES256 key".into(),
        (n, _) => format!("signature did not verify against {n} candidate key(s)"),
    }))
}

/// Check the signature, reporting the outcome as a [Verification] rather than an error.
pub fn verify(card: &str, keys: &KeySet) -> Verification {
    check_signature(card, keys).into()
}
