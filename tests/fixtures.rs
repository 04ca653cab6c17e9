#![allow(dead_code)]

use std::{
    collections::{HashMap, HashSet},
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Arc, Mutex,
    },
};

use anyhow::{Context, Result};
use async_trait::async_trait;
use http::{Request, Response};
use josekit::jwe::{self, Dir, JweHeader};
use p256::{
    ecdsa::{signature::Signer, Signature, SigningKey},
    PublicKey,
};
use serde_json::{json, Value as Json};
use smart_health_artifacts::{
    config::ResolverConfig,
    core::{
        codec::{deflate_raw, encode_base64url},
        util::AsyncHttpClient,
    },
    resolver::Resolver,
};

pub const ISSUER: &str = "https://issuer.example/fhir";
pub const JWKS_URL: &str = "https://issuer.example/fhir/.well-known/jwks";
pub const MANIFEST_URL: &str = "https://shl.example/api/manifest/abc";
pub const RECIPIENT: &str = "https://viewer.example";
pub const KID: &str = "fixture-key-1";
pub const LINK_KEY: [u8; 32] = [42; 32];

pub fn issuer_key() -> SigningKey {
    SigningKey::from_slice(&[7; 32]).unwrap()
}

pub fn other_key() -> SigningKey {
    SigningKey::from_slice(&[8; 32]).unwrap()
}

pub fn jwks(keys: &[(&SigningKey, &str)]) -> Json {
    let keys: Vec<Json> = keys
        .iter()
        .map(|(key, kid)| {
            let mut jwk: Json =
                serde_json::from_str(&PublicKey::from(key.verifying_key()).to_jwk_string())
                    .unwrap();
            jwk["kid"] = json!(kid);
            jwk["use"] = json!("sig");
            jwk["alg"] = json!("ES256");
            jwk
        })
        .collect();
    json!({ "keys": keys })
}

/// A FHIR collection bundle holding one resource per `(resourceType, id)`.
pub fn fhir_bundle(resources: &[(&str, &str)]) -> Json {
    json!({
        "resourceType": "Bundle",
        "type": "collection",
        "entry": resources
            .iter()
            .enumerate()
            .map(|(i, (resource_type, id))| json!({
                "fullUrl": format!("resource:{i}"),
                "resource": { "resourceType": resource_type, "id": id }
            }))
            .collect::<Vec<_>>()
    })
}

/// A signed Health Card embedding `bundle`.
pub fn health_card(bundle: &Json, key: &SigningKey, kid: &str) -> String {
    let header = encode_base64url(json!({ "alg": "ES256", "zip": "DEF", "kid": kid }).to_string());
    let payload = json!({
        "iss": ISSUER,
        "nbf": 1_700_000_000,
        "vc": {
            "type": ["https://smarthealth.cards#health-card"],
            "credentialSubject": { "fhirVersion": "4.0.1", "fhirBundle": bundle }
        }
    });
    let payload = encode_base64url(deflate_raw(payload.to_string().as_bytes()).unwrap());
    let signature: Signature = key.sign(format!("{header}.{payload}").as_bytes());
    format!("{header}.{payload}.{}", encode_base64url(signature.to_bytes()))
}

/// Flip one bit of the decoded signature segment.
pub fn tamper_signature(card: &str) -> String {
    let (signed, signature) = card.rsplit_once('.').unwrap();
    let mut bytes = smart_health_artifacts::core::codec::decode_base64url(signature).unwrap();
    bytes[0] ^= 0x80;
    format!("{signed}.{}", encode_base64url(bytes))
}

/// A direct-key A256GCM JWE of `{"verifiableCredential": cards}`.
pub fn encrypted_file(cards: &[&str], key: &[u8; 32]) -> String {
    let plaintext = json!({ "verifiableCredential": cards }).to_string();
    let mut header = JweHeader::new();
    header.set_content_encryption("A256GCM");
    header.set_content_type("application/smart-health-card");
    let encrypter = Dir.encrypter_from_bytes(key).unwrap();
    jwe::serialize_compact(plaintext.as_bytes(), &header, &encrypter).unwrap()
}

pub fn health_link(manifest: Json) -> String {
    format!("shlink:/{}", encode_base64url(manifest.to_string()))
}

pub fn manifest(flag: Option<&str>) -> Json {
    let mut manifest = json!({
        "url": MANIFEST_URL,
        "label": "Immunization record",
        "key": encode_base64url(LINK_KEY),
    });
    if let Some(flag) = flag {
        manifest["flag"] = json!(flag);
    }
    manifest
}

pub fn files(embedded: &[String]) -> Json {
    json!({
        "files": embedded
            .iter()
            .map(|e| json!({ "contentType": "application/smart-health-card", "embedded": e }))
            .collect::<Vec<_>>()
    })
}

#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub method: String,
    pub uri: String,
    pub body: Vec<u8>,
}

impl RecordedRequest {
    pub fn json_body(&self) -> Json {
        serde_json::from_slice(&self.body).unwrap()
    }
}

/// Serves canned responses by URL (query ignored) and records every request.
#[derive(Default)]
pub struct MockGateway {
    routes: Mutex<HashMap<String, (u16, Vec<u8>)>>,
    stalled: Mutex<HashSet<String>>,
    requests: Mutex<Vec<RecordedRequest>>,
    yielding: AtomicBool,
    in_flight: AtomicUsize,
}

/// Counts a request as in flight until its future completes or is dropped.
struct InFlight<'a>(&'a AtomicUsize);

impl<'a> InFlight<'a> {
    fn start(counter: &'a AtomicUsize) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(counter)
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl MockGateway {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn route(&self, url: &str, status: u16, body: &Json) {
        self.routes
            .lock()
            .unwrap()
            .insert(url.to_owned(), (status, body.to_string().into_bytes()));
    }

    /// Requests to `url` are recorded but never answered.
    pub fn stall(&self, url: &str) {
        self.stalled.lock().unwrap().insert(url.to_owned());
    }

    /// Yield to the runtime before answering, as a real network client would.
    pub fn yield_before_responding(&self) {
        self.yielding.store(true, Ordering::SeqCst);
    }

    /// Requests that were started but neither answered nor dropped.
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn requests_to(&self, url: &str) -> Vec<RecordedRequest> {
        self.requests()
            .into_iter()
            .filter(|r| r.uri.split('?').next() == Some(url))
            .collect()
    }
}

#[async_trait]
impl AsyncHttpClient for MockGateway {
    async fn execute(&self, request: Request<Vec<u8>>) -> Result<Response<Vec<u8>>> {
        let uri = request.uri().to_string();
        self.requests.lock().unwrap().push(RecordedRequest {
            method: request.method().to_string(),
            uri: uri.clone(),
            body: request.body().clone(),
        });

        let _in_flight = InFlight::start(&self.in_flight);
        if self.yielding.load(Ordering::SeqCst) {
            tokio::task::yield_now().await;
        }

        let path = uri.split('?').next().unwrap_or_default();
        let stalled = self.stalled.lock().unwrap().contains(path);
        if stalled {
            std::future::pending::<()>().await;
        }
        let (status, body) = self
            .routes
            .lock()
            .unwrap()
            .get(path)
            .cloned()
            .context(format!("no route for {path}"))?;

        Response::builder()
            .status(status)
            .body(body)
            .context("failed to build response")
    }
}

pub fn resolver(gateway: &Arc<MockGateway>) -> Resolver {
    resolver_with_config(
        gateway,
        ResolverConfig {
            recipient: RECIPIENT.into(),
            ..Default::default()
        },
    )
}

pub fn resolver_with_config(gateway: &Arc<MockGateway>, config: ResolverConfig) -> Resolver {
    Resolver::builder()
        .with_client(gateway.clone())
        .with_config(config)
        .build()
        .unwrap()
}

/// A gateway that publishes the issuer's key set.
pub fn gateway_with_issuer_keys() -> Arc<MockGateway> {
    let gateway = MockGateway::new();
    gateway.route(JWKS_URL, 200, &jwks(&[(&issuer_key(), KID)]));
    gateway
}
