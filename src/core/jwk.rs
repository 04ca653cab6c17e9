use anyhow::{bail, Context, Result};
use p256::{ecdsa::VerifyingKey, PublicKey};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value as Json};

/// A public JSON Web Key as published by a Health Card issuer.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Jwk {
    pub kty: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kid: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub crv: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alg: Option<String>,
    #[serde(rename = "use", default, skip_serializing_if = "Option::is_none")]
    pub key_use: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub x: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub y: Option<String>,
    #[serde(flatten)]
    pub other: Map<String, Json>,
}

impl Jwk {
    /// Whether the key can in principle verify an ES256 signature.
    pub fn is_es256_candidate(&self) -> bool {
        if self.kty != "EC" || self.crv.as_deref() != Some("P-256") {
            return false;
        }
        if matches!(self.alg.as_deref(), Some(alg) if alg != "ES256") {
            return false;
        }
        !matches!(self.key_use.as_deref(), Some(u) if u != "sig")
    }

    /// The P-256 verifying key described by this JWK.
    pub fn verifying_key(&self) -> Result<VerifyingKey> {
        if !self.is_es256_candidate() {
            bail!("JWK is not an ES256 signing key")
        }
        // Only the public coordinates are handed to the parser.
        let public = json!({
            "kty": self.kty,
            "crv": self.crv,
            "x": self.x.as_deref().context("'x' is missing from JWK")?,
            "y": self.y.as_deref().context("'y' is missing from JWK")?,
        });
        let key = PublicKey::from_jwk_str(&public.to_string())
            .context("JWK does not describe a point on P-256")?;
        Ok(VerifyingKey::from(key))
    }
}

/// A JWK Set document (`/.well-known/jwks`).
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct KeySet {
    pub keys: Vec<Jwk>,
}

impl KeySet {
    pub fn new(keys: Vec<Jwk>) -> Self {
        Self { keys }
    }

    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        serde_json::from_slice(bytes).context("document is not a JWK Set")
    }

    /// Keys eligible for an ES256 signature with the given `kid`.
    ///
    /// With a `kid`, only keys carrying that exact `kid` are returned; without one, every ES256
    /// candidate in document order.
    pub fn candidates<'a>(&'a self, kid: Option<&'a str>) -> impl Iterator<Item = &'a Jwk> + 'a {
        self.keys.iter().filter(move |jwk| {
            jwk.is_es256_candidate()
                && match kid {
                    Some(kid) => jwk.kid.as_deref() == Some(kid),
                    None => true,
                }
        })
    }
}
