//! Controller client: worker discovery and model listing

use super::{LocatorError, WorkerLocator};
use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

const CONTROLLER_TIMEOUT: Duration = Duration::from_secs(20);

/// Sort keys that pin featured models to the top of the list
const DEFAULT_PRIORITIES: &[(&str, &str)] = &[("vicuna-13b", "aaaaaaa"), ("koala-13b", "aaaaaab")];

pub struct ControllerClient {
    client: Client,
    base_url: String,
    priorities: HashMap<String, String>,
}

impl ControllerClient {
    pub fn new(base_url: &str) -> Result<Self, LocatorError> {
        let client = Client::builder()
            .timeout(CONTROLLER_TIMEOUT)
            .build()
            .map_err(|e| LocatorError::Transport(e.to_string()))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            priorities: DEFAULT_PRIORITIES
                .iter()
                .map(|(model, key)| ((*model).to_string(), (*key).to_string()))
                .collect(),
        })
    }

    async fn post(&self, path: &str, body: Option<&impl Serialize>) -> Result<String, LocatorError> {
        let url = format!("{}{path}", self.base_url);
        let mut request = self.client.post(&url);
        if let Some(body) = body {
            request = request.json(body);
        }
        let response = request.send().await?;

        let status = response.status();
        let text = response.text().await?;
        if !status.is_success() {
            return Err(LocatorError::Status {
                status: status.as_u16(),
                body: text,
            });
        }
        Ok(text)
    }

    async fn post_json<R: DeserializeOwned>(
        &self,
        path: &str,
        body: Option<&impl Serialize>,
    ) -> Result<R, LocatorError> {
        let text = self.post(path, body).await?;
        serde_json::from_str(&text)
            .map_err(|e| LocatorError::Malformed(format!("{path}: {e} - body: {text}")))
    }
}

#[async_trait]
impl WorkerLocator for ControllerClient {
    async fn resolve(&self, model_id: &str) -> Result<String, LocatorError> {
        let body = AddressRequest { model: model_id };
        let response: AddressResponse = self.post_json("/get_worker_address", Some(&body)).await?;
        tracing::debug!(model = %model_id, address = %response.address, "Resolved worker");
        Ok(response.address)
    }

    async fn list_models(&self) -> Result<Vec<String>, LocatorError> {
        self.post("/refresh_all_workers", None::<&()>).await?;
        let response: ModelsResponse = self.post_json("/list_models", None::<&()>).await?;

        let mut models = response.models;
        sort_models(&mut models, &self.priorities);
        tracing::info!(count = models.len(), "Listed models");
        Ok(models)
    }
}

/// Stable sort by priority key, falling back to the model name itself
pub fn sort_models(models: &mut [String], priorities: &HashMap<String, String>) {
    models.sort_by(|a, b| {
        let key_a = priorities.get(a).unwrap_or(a);
        let key_b = priorities.get(b).unwrap_or(b);
        key_a.cmp(key_b)
    });
}

#[derive(Serialize)]
struct AddressRequest<'a> {
    model: &'a str,
}

#[derive(Deserialize)]
struct AddressResponse {
    address: String,
}

#[derive(Deserialize)]
struct ModelsResponse {
    models: Vec<String>,
}
