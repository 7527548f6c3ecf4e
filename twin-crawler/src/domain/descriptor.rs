//! Registry descriptors of digital twins.

use serde::{Deserialize, Serialize};

use super::aspect::same_aspect;

/// Descriptor of one digital twin as returned by the registry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShellDescriptor {
    pub id: String,
    #[serde(default)]
    pub global_asset_id: Option<String>,
    #[serde(default)]
    pub id_short: Option<String>,
    #[serde(default)]
    pub submodel_descriptors: Vec<SubmodelDescriptor>,
}

impl ShellDescriptor {
    /// Submodel descriptors whose aspect type matches `aspect`.
    pub fn submodels_of<'a>(
        &'a self,
        aspect: &'a str,
    ) -> impl Iterator<Item = &'a SubmodelDescriptor> + 'a {
        self.submodel_descriptors
            .iter()
            .filter(move |d| d.aspect_type().is_some_and(|t| same_aspect(&t, aspect)))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmodelDescriptor {
    pub id: String,
    #[serde(default)]
    pub id_short: Option<String>,
    #[serde(default)]
    pub semantic_id: Option<Reference>,
    #[serde(default)]
    pub endpoints: Vec<Endpoint>,
}

impl SubmodelDescriptor {
    /// Aspect type taken from the semantic id, falling back to the short id.
    pub fn aspect_type(&self) -> Option<String> {
        let from_semantic = self
            .semantic_id
            .as_ref()
            .and_then(|r| r.keys.last())
            .map(|k| k.value.rsplit('#').next().unwrap_or(&k.value).to_string());
        from_semantic
            .filter(|s| !s.is_empty())
            .or_else(|| self.id_short.clone())
    }

    pub fn endpoint_addresses(&self) -> impl Iterator<Item = &str> {
        self.endpoints
            .iter()
            .map(|e| e.protocol_information.href.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Reference {
    #[serde(default, rename = "type")]
    pub kind: Option<String>,
    #[serde(default)]
    pub keys: Vec<ReferenceKey>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReferenceKey {
    #[serde(default, rename = "type")]
    pub kind: Option<String>,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Endpoint {
    #[serde(default)]
    pub interface: Option<String>,
    pub protocol_information: ProtocolInformation,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProtocolInformation {
    pub href: String,
}

impl SubmodelDescriptor {
    /// Descriptor with one semantic id and one endpoint.
    pub fn new(
        id: impl Into<String>,
        semantic_id: impl Into<String>,
        href: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            id_short: None,
            semantic_id: Some(Reference {
                kind: Some("ExternalReference".to_string()),
                keys: vec![ReferenceKey {
                    kind: Some("GlobalReference".to_string()),
                    value: semantic_id.into(),
                }],
            }),
            endpoints: vec![Endpoint {
                interface: Some("SUBMODEL-3.0".to_string()),
                protocol_information: ProtocolInformation { href: href.into() },
            }],
        }
    }
}
