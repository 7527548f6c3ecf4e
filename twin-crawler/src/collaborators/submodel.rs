//! Submodel fetch: endpoint address -> payload.

use async_trait::async_trait;
use serde_json::Value;

use super::http::get_json;
use super::retry::RetryPolicy;
use crate::Result;

/// Fetches the payload of one submodel endpoint.
#[async_trait]
pub trait SubmodelFacade: Send + Sync {
    async fn fetch(&self, endpoint: &str) -> Result<Value>;
}

/// Submodel client that GETs the endpoint address directly.
pub struct HttpSubmodelFacade {
    client: reqwest::Client,
    policy: RetryPolicy,
}

impl HttpSubmodelFacade {
    pub fn new(client: reqwest::Client, policy: RetryPolicy) -> Self {
        Self { client, policy }
    }
}

#[async_trait]
impl SubmodelFacade for HttpSubmodelFacade {
    async fn fetch(&self, endpoint: &str) -> Result<Value> {
        get_json(&self.client, &self.policy, endpoint).await
    }
}
