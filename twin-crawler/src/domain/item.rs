//! Per-item crawl results.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::descriptor::ShellDescriptor;
use crate::{Error, Result};

/// Step of the item crawl in which a failure happened.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    strum::Display,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum ProcessStep {
    DigitalTwinRequest,
    RelationshipRequest,
    SubmodelRequest,
    TransferTimeout,
    /// The transfer task died before producing a result.
    TransferAborted,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessingError {
    pub process_step: ProcessStep,
    pub error_detail: String,
    pub last_attempt: DateTime<Utc>,
    /// Retries already exhausted by the transport layer.
    pub retry_counter: u32,
}

/// Non-fatal failure recorded for one item or endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Tombstone {
    pub catena_x_id: String,
    pub endpoint_url: Option<String>,
    pub processing_error: ProcessingError,
}

impl Tombstone {
    pub fn new(
        catena_x_id: impl Into<String>,
        endpoint_url: Option<String>,
        process_step: ProcessStep,
        error_detail: impl Into<String>,
        retry_counter: u32,
    ) -> Self {
        Self {
            catena_x_id: catena_x_id.into(),
            endpoint_url,
            processing_error: ProcessingError {
                process_step,
                error_detail: error_detail.into(),
                last_attempt: Utc::now(),
                retry_counter,
            },
        }
    }

    /// Tombstone for a failed collaborator call.
    pub fn from_error(
        catena_x_id: impl Into<String>,
        endpoint_url: Option<String>,
        process_step: ProcessStep,
        error: &Error,
    ) -> Self {
        let retries = match error {
            Error::Transport(e) => e.retries,
            _ => 0,
        };
        Self::new(
            catena_x_id,
            endpoint_url,
            process_step,
            error.to_string(),
            retries,
        )
    }

    pub fn key(&self) -> (String, Option<String>, ProcessStep) {
        (
            self.catena_x_id.clone(),
            self.endpoint_url.clone(),
            self.processing_error.process_step,
        )
    }
}

/// Child side of a relationship edge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LinkedItem {
    pub child_catena_x_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quantity: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub business_partner: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_on: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_modified_on: Option<String>,
}

/// Parent -> child edge read from a relationship submodel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Relationship {
    pub catena_x_id: String,
    pub linked_item: LinkedItem,
    pub aspect_type: String,
}

impl Relationship {
    /// Natural identity: source, target and aspect.
    pub fn key(&self) -> (String, String, String) {
        (
            self.catena_x_id.clone(),
            self.linked_item.child_catena_x_id.clone(),
            self.aspect_type.clone(),
        )
    }

    /// Read the edges of a single-level BOM payload.
    ///
    /// Accepts the current `childItems[].catenaXId` layout and the older
    /// `childParts[].childCatenaXId` one.
    pub fn from_payload(payload: &Value, aspect_type: &str) -> Result<Vec<Self>> {
        let bom: BomPayload = serde_json::from_value(payload.clone())
            .map_err(|e| Error::parse(format!("invalid {aspect_type} payload: {e}")))?;

        Ok(bom
            .child_items
            .into_iter()
            .map(|child| Relationship {
                catena_x_id: bom.catena_x_id.clone(),
                linked_item: LinkedItem {
                    child_catena_x_id: child.catena_x_id,
                    quantity: child.quantity,
                    business_partner: child.business_partner,
                    created_on: child.created_on,
                    last_modified_on: child.last_modified_on,
                },
                aspect_type: aspect_type.to_string(),
            })
            .collect())
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BomPayload {
    catena_x_id: String,
    #[serde(default, alias = "childParts")]
    child_items: Vec<BomChild>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BomChild {
    #[serde(alias = "childCatenaXId")]
    catena_x_id: String,
    #[serde(default)]
    quantity: Option<Value>,
    #[serde(default)]
    business_partner: Option<String>,
    #[serde(default, alias = "assembledOn")]
    created_on: Option<String>,
    #[serde(default)]
    last_modified_on: Option<String>,
}

/// Aspect payload collected for an item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Submodel {
    /// Submodel descriptor id.
    pub identification: String,
    pub aspect_type: String,
    pub catena_x_id: String,
    pub payload: Value,
}

impl Submodel {
    pub fn key(&self) -> (String, String, String) {
        (
            self.catena_x_id.clone(),
            self.aspect_type.clone(),
            self.identification.clone(),
        )
    }
}

/// Result container produced for one crawled item, and the shape of the
/// assembled aggregate.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemContainer {
    #[serde(default)]
    pub shells: Vec<ShellDescriptor>,
    #[serde(default)]
    pub relationships: Vec<Relationship>,
    #[serde(default)]
    pub submodels: Vec<Submodel>,
    #[serde(default)]
    pub tombstones: Vec<Tombstone>,
}

impl ItemContainer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.shells.is_empty()
            && self.relationships.is_empty()
            && self.submodels.is_empty()
            && self.tombstones.is_empty()
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(bytes)?)
    }
}
