use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value as Json};

use crate::utils::NonEmptyVec;

/// The outcome of one resolution call.
///
/// Owned entirely by the caller, who may persist [ResolvedBundle::shc] to replay the session
/// offline without retrieval or decryption.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ResolvedBundle {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    /// Raw credential strings, in credential order.
    pub shc: NonEmptyVec<String>,
    /// `true` only if every credential's signature verified.
    pub verified: bool,
    /// A FHIR Bundle.
    pub bundle: Json,
}

impl ResolvedBundle {
    /// Every resource of the bundle's entries, in entry order.
    pub fn resources(&self) -> impl Iterator<Item = &Json> {
        entries(&self.bundle)
            .iter()
            .filter_map(|entry| entry.get("resource"))
    }

    /// The first `Patient` resource.
    pub fn patient(&self) -> Option<&Json> {
        self.resources()
            .find(|resource| resource_type(resource) == Some("Patient"))
    }

    /// Resources grouped by `resourceType`, entry order kept within each group.
    pub fn resources_by_type(&self) -> BTreeMap<&str, Vec<&Json>> {
        self.resources()
            .filter_map(|resource| resource_type(resource).map(|t| (t, resource)))
            .fold(BTreeMap::new(), |mut groups, (t, resource)| {
                groups.entry(t).or_insert_with(Vec::new).push(resource);
                groups
            })
    }
}

fn resource_type(resource: &Json) -> Option<&str> {
    resource.get("resourceType").and_then(Json::as_str)
}

/// The `entry` array of a FHIR Bundle, empty when absent.
pub fn entries(bundle: &Json) -> &[Json] {
    bundle
        .get("entry")
        .and_then(Json::as_array)
        .map(Vec::as_slice)
        .unwrap_or_default()
}

/// A document Bundle whose entries are the concatenation of the given bundles' entries.
pub fn document_bundle<'a>(bundles: impl IntoIterator<Item = &'a Json>) -> Json {
    let entry: Vec<Json> = bundles
        .into_iter()
        .flat_map(|bundle| entries(bundle).iter().cloned())
        .collect();

    json!({
        "resourceType": "Bundle",
        "type": "document",
        "entry": entry
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bundle(resources: &[Json]) -> Json {
        json!({
            "resourceType": "Bundle",
            "type": "collection",
            "entry": resources
                .iter()
                .enumerate()
                .map(|(i, r)| json!({ "fullUrl": format!("resource:{i}"), "resource": r }))
                .collect::<Vec<_>>()
        })
    }

    #[test]
    fn document_bundle_concatenates_in_order() {
        let a = bundle(&[json!({"resourceType": "Patient", "id": "a"})]);
        let b = json!({ "resourceType": "Bundle" });
        let c = bundle(&[
            json!({"resourceType": "Immunization", "id": "c1"}),
            json!({"resourceType": "Immunization", "id": "c2"}),
        ]);

        let document = document_bundle([&a, &b, &c]);

        assert_eq!(document["type"], "document");
        let ids: Vec<_> = entries(&document)
            .iter()
            .map(|e| e["resource"]["id"].as_str().unwrap())
            .collect();
        assert_eq!(ids, ["a", "c1", "c2"]);
    }

    #[test]
    fn helpers_find_patient_and_group_resources() {
        let resolved = ResolvedBundle {
            label: None,
            shc: NonEmptyVec::new("a.b.c".to_string()),
            verified: true,
            bundle: bundle(&[
                json!({"resourceType": "Immunization", "id": "i1"}),
                json!({"resourceType": "Patient", "id": "p"}),
                json!({"resourceType": "Immunization", "id": "i2"}),
            ]),
        };

        assert_eq!(resolved.patient().unwrap()["id"], "p");
        let groups = resolved.resources_by_type();
        assert_eq!(groups["Immunization"].len(), 2);
        assert_eq!(groups["Immunization"][1]["id"], "i2");
        assert_eq!(groups["Patient"].len(), 1);
    }
}
