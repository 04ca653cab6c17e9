use std::time::Duration;

use serde::Deserialize;
use url::Url;

/// Resolver configuration.
#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct ResolverConfig {
    /// Identifies the caller to the link gateway, sent as `recipient`.
    pub recipient: String,
    pub key_cache: KeyCacheConfig,
    pub key_discovery_failure: KeyDiscoveryFailure,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            recipient: "smart-health-artifacts".into(),
            key_cache: KeyCacheConfig::default(),
            key_discovery_failure: KeyDiscoveryFailure::default(),
        }
    }
}

#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct KeyCacheConfig {
    pub enabled: bool,
    /// Entries never expire within the process when absent.
    pub ttl_secs: Option<u64>,
}

impl Default for KeyCacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            ttl_secs: None,
        }
    }
}

impl KeyCacheConfig {
    pub fn ttl(&self) -> Option<Duration> {
        self.ttl_secs.map(Duration::from_secs)
    }
}

/// What a failed key discovery does to a resolution.
#[derive(Deserialize, Debug, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum KeyDiscoveryFailure {
    /// Fail the resolution with `KeyDiscoveryFailed`.
    #[default]
    Abort,
    /// Report the affected credential as unverified.
    Unverified,
}

/// A url that is always a base (can be safely join()'ed with further path elements without
/// mangling).
#[derive(Deserialize, Debug, Clone, Hash, PartialEq, Eq)]
#[serde(try_from = "String")]
pub struct BaseUrl(Url);

impl std::ops::Deref for BaseUrl {
    type Target = Url;

    fn deref(&self) -> &Url {
        &self.0
    }
}

impl TryFrom<String> for BaseUrl {
    type Error = url::ParseError;

    fn try_from(mut url: String) -> Result<Self, Self::Error> {
        // Make URL a base.
        if !url.ends_with('/') {
            url += "/"
        }
        url.parse().map(Self)
    }
}

impl BaseUrl {
    /// The issuer's key-discovery endpoint, `<issuer>/.well-known/jwks`.
    pub fn jwks_url(&self) -> Result<Url, url::ParseError> {
        self.0.join(".well-known/jwks")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn jwks_url_ignores_trailing_slash() {
        for issuer in [
            "https://spec.smarthealth.cards/examples/issuer",
            "https://spec.smarthealth.cards/examples/issuer/",
        ] {
            let base = BaseUrl::try_from(issuer.to_string()).unwrap();
            assert_eq!(
                base.jwks_url().unwrap().as_str(),
                "https://spec.smarthealth.cards/examples/issuer/.well-known/jwks"
            );
        }
    }

    #[test]
    fn config_defaults_and_overrides() {
        let config: ResolverConfig = serde_json::from_value(json!({
            "recipient": "https://viewer.example",
            "key_cache": { "ttl_secs": 300 },
            "key_discovery_failure": "unverified"
        }))
        .unwrap();

        assert_eq!(config.recipient, "https://viewer.example");
        assert!(config.key_cache.enabled);
        assert_eq!(config.key_cache.ttl(), Some(Duration::from_secs(300)));
        assert_eq!(config.key_discovery_failure, KeyDiscoveryFailure::Unverified);

        let default: ResolverConfig = serde_json::from_value(json!({})).unwrap();
        assert_eq!(default, ResolverConfig::default());
    }
}
