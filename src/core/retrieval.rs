use anyhow::Context;
use http::header::CONTENT_TYPE;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::core::{
    error::{Error, Result},
    manifest::LinkManifest,
    util::{base_request, AsyncHttpClient},
};

/// Media type of files that carry Health Cards.
pub const HEALTH_CARD_CONTENT_TYPE: &str = "application/smart-health-card";

/// One file listed by the gateway.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct RetrievedFile {
    #[serde(rename = "contentType", default)]
    pub content_type: Option<String>,
    /// The encrypted file, when inlined.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedded: Option<String>,
    /// A further URL for the file, when not inlined.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
}

impl RetrievedFile {
    /// The embedded payload if this file is an inlined Health Card file.
    pub fn health_card_payload(&self) -> Option<&str> {
        match (self.content_type.as_deref(), self.embedded.as_deref()) {
            (Some(HEALTH_CARD_CONTENT_TYPE), Some(embedded)) => Some(embedded),
            _ => None,
        }
    }
}

/// The gateway's answer to a manifest request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct ManifestResponse {
    #[serde(default)]
    pub files: Vec<RetrievedFile>,
}

impl ManifestResponse {
    /// Embedded Health Card payloads in gateway order.
    ///
    /// # Errors
    ///
    /// [Error::NoPayload] when no file qualifies.
    pub fn health_card_payloads(&self) -> Result<Vec<&str>> {
        let payloads: Vec<&str> = self
            .files
            .iter()
            .filter_map(|file| {
                let payload = file.health_card_payload();
                if payload.is_none() {
                    debug!(
                        "skipping file with content type {:?} (embedded: {}, location: {:?})",
                        file.content_type,
                        file.embedded.is_some(),
                        file.location
                    );
                }
                payload
            })
            .collect();

        if payloads.is_empty() {
            return Err(Error::NoPayload);
        }
        Ok(payloads)
    }
}

#[derive(Debug, Serialize)]
struct ManifestRequest<'a> {
    recipient: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    passcode: Option<&'a str>,
}

/// Retrieve the manifest's file list from the gateway.
///
/// Links flagged `U` are fetched with `GET <url>?recipient=<recipient>`; all others are posted
/// `{recipient, passcode?}`. A link flagged `P` fails with [Error::PasscodeRequired] before any
/// request is made when `passcode` is `None`.
pub async fn retrieve<C>(
    client: &C,
    manifest: &LinkManifest,
    recipient: &str,
    passcode: Option<&str>,
) -> Result<ManifestResponse>
where
    C: AsyncHttpClient + ?Sized,
{
    let request = if manifest.flags().direct() {
        let mut url = manifest.url().clone();
        url.query_pairs_mut().append_pair("recipient", recipient);
        debug!("retrieving health link files directly from {url}");

        base_request()
            .method("GET")
            .uri(url.as_str())
            .body(vec![])
    } else {
        let passcode = if manifest.flags().passcode_required() {
            Some(passcode.ok_or(Error::PasscodeRequired)?)
        } else {
            None
        };
        let body = serde_json::to_vec(&ManifestRequest {
            recipient,
            passcode,
        })
        .map_err(|e| Error::RetrievalFailed(format!("unable to encode manifest request: {e}")))?;
        debug!("requesting health link manifest from {}", manifest.url());

        base_request()
            .method("POST")
            .uri(manifest.url().as_str())
            .header(CONTENT_TYPE, "application/json")
            .body(body)
    }
    .map_err(|e| Error::RetrievalFailed(format!("failed to build manifest request: {e}")))?;

    fetch(client, request)
        .await
        .map_err(|e| Error::RetrievalFailed(format!("{e:#}")))
}

async fn fetch<C>(client: &C, request: http::Request<Vec<u8>>) -> anyhow::Result<ManifestResponse>
where
    C: AsyncHttpClient + ?Sized,
{
    let uri = request.uri().clone();
    let response = client
        .execute(request)
        .await
        .context(format!("failed to make manifest request at {uri}"))?;

    let status = response.status();
    let Ok(body) = String::from_utf8(response.into_body()) else {
        anyhow::bail!("failed to parse manifest response as UTF-8 from {uri} (status: {status})")
    };

    if !status.is_success() {
        anyhow::bail!("manifest request was unsuccessful (status: {status}): {body}")
    }

    serde_json::from_str(&body).context("manifest response is not a file list")
}
