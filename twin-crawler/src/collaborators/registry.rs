//! Registry lookup: item id -> shell descriptor.

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE;
use serde::Deserialize;
use serde_json::json;
use tracing::debug;
use url::Url;

use super::http::get_json;
use super::retry::RetryPolicy;
use crate::domain::ShellDescriptor;
use crate::{Error, Result, TransportError};

/// Resolves an item identifier to its digital twin descriptor.
#[async_trait]
pub trait DigitalTwinRegistry: Send + Sync {
    async fn resolve(&self, item_id: &str) -> Result<ShellDescriptor>;
}

/// Registry client speaking the AAS registry REST API.
///
/// Resolution is two calls: a lookup of shell ids by `globalAssetId`
/// followed by a fetch of the first matching shell descriptor.
pub struct HttpDigitalTwinRegistry {
    client: reqwest::Client,
    base_url: Url,
    policy: RetryPolicy,
}

#[derive(Debug, Deserialize)]
struct LookupResponse {
    #[serde(default)]
    result: Vec<String>,
}

impl HttpDigitalTwinRegistry {
    pub fn new(client: reqwest::Client, base_url: &str, policy: RetryPolicy) -> Result<Self> {
        let base_url = Url::parse(base_url)
            .map_err(|e| Error::config(format!("invalid registry url '{base_url}': {e}")))?;
        if base_url.cannot_be_a_base() {
            return Err(Error::config(format!(
                "registry url '{base_url}' cannot be used as a base"
            )));
        }
        Ok(Self {
            client,
            base_url,
            policy,
        })
    }

    fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    fn lookup_url(&self, item_id: &str) -> Url {
        let mut url = self.endpoint(&["lookup", "shells"]);
        let asset_ids = json!([{ "name": "globalAssetId", "value": item_id }]).to_string();
        url.query_pairs_mut().append_pair("assetIds", &asset_ids);
        url
    }

    fn descriptor_url(&self, shell_id: &str) -> Url {
        let encoded = URL_SAFE.encode(shell_id.as_bytes());
        self.endpoint(&["shell-descriptors", &encoded])
    }
}

#[async_trait]
impl DigitalTwinRegistry for HttpDigitalTwinRegistry {
    async fn resolve(&self, item_id: &str) -> Result<ShellDescriptor> {
        let lookup_url = self.lookup_url(item_id);
        let lookup: LookupResponse =
            serde_json::from_value(get_json(&self.client, &self.policy, lookup_url.as_str()).await?)
                .map_err(|e| Error::parse(format!("invalid lookup response: {e}")))?;

        let Some(shell_id) = lookup.result.into_iter().next() else {
            return Err(TransportError::new(
                lookup_url.as_str(),
                format!("no digital twin registered for {item_id}"),
                0,
            )
            .into());
        };

        debug!(item_id = %item_id, shell_id = %shell_id, "Resolved shell id");

        let descriptor_url = self.descriptor_url(&shell_id);
        let raw = get_json(&self.client, &self.policy, descriptor_url.as_str()).await?;
        serde_json::from_value(raw)
            .map_err(|e| Error::parse(format!("invalid shell descriptor for {shell_id}: {e}")))
    }
}
