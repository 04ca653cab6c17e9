use serde::{Deserialize, Serialize};
use url::Url;

use crate::core::{
    codec::decode_base64url,
    error::{Error, Result},
};

/// Flag selecting direct (GET) retrieval of already embedded files.
pub const FLAG_DIRECT: char = 'U';
/// Flag requiring a passcode for (POST) retrieval.
pub const FLAG_PASSCODE: char = 'P';

/// The manifest as it appears on the wire, every field optional.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
struct ManifestWire {
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    label: Option<String>,
    #[serde(default)]
    flag: Option<String>,
    #[serde(default)]
    key: Option<String>,
    #[serde(default)]
    exp: Option<u64>,
    #[serde(default)]
    v: Option<u32>,
}

/// Single-character capability flags of a Health Link.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LinkFlags(String);

impl LinkFlags {
    pub fn new(flags: impl Into<String>) -> Self {
        Self(flags.into())
    }

    pub fn contains(&self, flag: char) -> bool {
        self.0.contains(flag)
    }

    /// Files are embedded in a GET response; no POST and no passcode.
    pub fn direct(&self) -> bool {
        self.contains(FLAG_DIRECT)
    }

    pub fn passcode_required(&self) -> bool {
        self.contains(FLAG_PASSCODE)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Symmetric key material used to decrypt the link's files.
#[derive(Clone, PartialEq, Eq)]
pub struct DecryptionKey(Vec<u8>);

impl DecryptionKey {
    pub fn from_base64url(encoded: &str) -> Result<Self> {
        decode_base64url(encoded)
            .map(Self)
            .map_err(|e| Error::manifest(format!("'key' is not valid base64url: {e}")))
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl std::fmt::Debug for DecryptionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "DecryptionKey({} bytes)", self.0.len())
    }
}

/// A validated Health Link manifest.
#[derive(Debug, Clone)]
pub struct LinkManifest {
    url: Url,
    label: Option<String>,
    flags: LinkFlags,
    key: DecryptionKey,
    expires_at: Option<u64>,
    version: Option<u32>,
}

impl LinkManifest {
    /// Parse and validate the decoded manifest JSON.
    pub fn from_json(bytes: &[u8]) -> Result<Self> {
        let wire: ManifestWire = serde_json::from_slice(bytes)
            .map_err(|e| Error::manifest(format!("manifest is not valid JSON: {e}")))?;
        Self::try_from(wire)
    }

    /// The retrieval endpoint.
    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn label(&self) -> Option<&str> {
        self.label.as_deref()
    }

    pub fn flags(&self) -> &LinkFlags {
        &self.flags
    }

    pub fn key(&self) -> &DecryptionKey {
        &self.key
    }

    /// Expiration as seconds since the Unix epoch, if the link carries one.
    pub fn expires_at(&self) -> Option<u64> {
        self.expires_at
    }

    pub fn version(&self) -> Option<u32> {
        self.version
    }

    /// Whether the link is expired at `now` (seconds since the Unix epoch).
    ///
    /// Not enforced during resolution; the gateway remains authoritative.
    pub fn is_expired(&self, now: u64) -> bool {
        self.expires_at.is_some_and(|exp| exp <= now)
    }
}

impl TryFrom<ManifestWire> for LinkManifest {
    type Error = Error;

    fn try_from(wire: ManifestWire) -> Result<Self> {
        let url = wire
            .url
            .ok_or_else(|| Error::manifest("'url' is missing"))?
            .parse::<Url>()
            .map_err(|e| Error::manifest(format!("'url' could not be parsed: {e}")))?;

        let key = wire
            .key
            .as_deref()
            .map(DecryptionKey::from_base64url)
            .ok_or_else(|| Error::manifest("'key' is missing"))??;

        Ok(Self {
            url,
            label: wire.label,
            flags: LinkFlags::new(wire.flag.unwrap_or_default()),
            key,
            expires_at: wire.exp,
            version: wire.v,
        })
    }
}
