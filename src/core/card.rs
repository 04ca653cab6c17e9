//! Health Card compact structure: `header.payload.signature`, payload raw-deflated JSON.
//!
//! Decoding happens in two phases. [peek_issuer] reads only the `iss` claim, tolerating any
//! other payload shape, so the key-discovery endpoint can be located before the signature is
//! checked. [decode_card] is the strict decode that yields the clinical bundle.

use serde::{Deserialize, Serialize};
use serde_json::Value as Json;

use crate::core::{
    codec::{decode_base64url, inflate_raw},
    error::{Error, Result},
};

/// The three segments of a compact credential, still base64url encoded.
#[derive(Debug, Clone, Copy)]
pub struct CompactCard<'a> {
    pub header: &'a str,
    pub payload: &'a str,
    pub signature: &'a str,
}

impl<'a> CompactCard<'a> {
    pub fn split(card: &'a str) -> Result<Self> {
        let mut segments = card.split('.');
        match (
            segments.next(),
            segments.next(),
            segments.next(),
            segments.next(),
        ) {
            (Some(header), Some(payload), Some(signature), None) => Ok(Self {
                header,
                payload,
                signature,
            }),
            _ => Err(Error::credential(
                "expected three dot-separated segments",
            )),
        }
    }

    /// The bytes covered by the signature.
    pub fn signing_input(&self) -> String {
        format!("{}.{}", self.header, self.payload)
    }

    /// Decompressed payload JSON text.
    pub fn payload_json(&self) -> Result<String> {
        let compressed = decode_base64url(self.payload)
            .map_err(|e| Error::credential(format!("payload segment: {e}")))?;
        inflate_raw(&compressed).map_err(|e| Error::credential(format!("payload segment: {e}")))
    }

    pub fn header(&self) -> Result<CardHeader> {
        let bytes = decode_base64url(self.header)
            .map_err(|e| Error::credential(format!("header segment: {e}")))?;
        serde_json::from_slice(&bytes)
            .map_err(|e| Error::credential(format!("header segment is not valid JSON: {e}")))
    }
}

/// Protected header of a Health Card.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct CardHeader {
    pub alg: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kid: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub zip: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct HealthCardPayload {
    pub iss: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nbf: Option<f64>,
    pub vc: VerifiableCredential,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct VerifiableCredential {
    #[serde(rename = "type", default, skip_serializing_if = "Vec::is_empty")]
    pub types: Vec<String>,
    #[serde(rename = "credentialSubject")]
    pub credential_subject: CredentialSubject,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct CredentialSubject {
    #[serde(
        rename = "fhirVersion",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub fhir_version: Option<String>,
    #[serde(rename = "fhirBundle")]
    pub fhir_bundle: Json,
}

impl HealthCardPayload {
    pub fn fhir_bundle(&self) -> &Json {
        &self.vc.credential_subject.fhir_bundle
    }

    pub fn into_fhir_bundle(self) -> Json {
        self.vc.credential_subject.fhir_bundle
    }
}

/// Read the unauthenticated `iss` claim without validating the rest of the payload.
pub fn peek_issuer(card: &str) -> Result<String> {
    let json = CompactCard::split(card)?.payload_json()?;

    let payload: Json = serde_json::from_str(&json)
        .map_err(|e| Error::credential(format!("payload is not valid JSON: {e}")))?;

    match payload.get("iss") {
        Some(Json::String(iss)) => Ok(iss.clone()),
        Some(_) => Err(Error::credential("'iss' is not a string")),
        None => Err(Error::credential("'iss' is missing")),
    }
}

/// Strictly decode the payload segment.
pub fn decode_card(card: &str) -> Result<HealthCardPayload> {
    let json = CompactCard::split(card)?.payload_json()?;
    serde_json::from_str(&json)
        .map_err(|e| Error::credential(format!("payload does not describe a health card: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::codec::{deflate_raw, encode_base64url};
    use serde_json::json;

    fn card_with_payload(payload: &Json) -> String {
        let header = encode_base64url(r#"{"alg":"ES256","zip":"DEF","kid":"k1"}"#);
        let body = encode_base64url(deflate_raw(payload.to_string().as_bytes()).unwrap());
        format!("{header}.{body}.c2ln")
    }

    #[test]
    fn peek_issuer_tolerates_missing_vc() {
        let card = card_with_payload(&json!({ "iss": "https://issuer.example/" }));
        assert_eq!(peek_issuer(&card).unwrap(), "https://issuer.example/");
        assert!(matches!(
            decode_card(&card),
            Err(Error::MalformedCredential(_))
        ));
    }

    #[test]
    fn decode_card_extracts_bundle() {
        let bundle = json!({
            "resourceType": "Bundle",
            "type": "collection",
            "entry": [{"fullUrl": "resource:0", "resource": {"resourceType": "Patient"}}]
        });
        let card = card_with_payload(&json!({
            "iss": "https://issuer.example",
            "nbf": 1_600_000_000,
            "vc": {
                "type": ["https://smarthealth.cards#health-card"],
                "credentialSubject": { "fhirVersion": "4.0.1", "fhirBundle": bundle }
            }
        }));

        let payload = decode_card(&card).unwrap();
        assert_eq!(payload.iss, "https://issuer.example");
        assert_eq!(payload.vc.credential_subject.fhir_version.as_deref(), Some("4.0.1"));
        assert_eq!(payload.fhir_bundle(), &bundle);

        let header = CompactCard::split(&card).unwrap().header().unwrap();
        assert_eq!(header.kid.as_deref(), Some("k1"));
        assert_eq!(header.zip.as_deref(), Some("DEF"));
    }

    #[test]
    fn wrong_segment_count_is_malformed() {
        assert!(CompactCard::split("a.b").is_err());
        assert!(CompactCard::split("a.b.c.d").is_err());
    }

    #[test]
    fn uncompressed_payload_is_malformed() {
        let body = encode_base64url(r#"{"iss":"x"}"#);
        let card = format!("e30.{body}.c2ln");
        assert!(matches!(
            peek_issuer(&card),
            Err(Error::MalformedCredential(_))
        ));
    }
}
