// Request and response bodies of the HTTP API

use crate::{
    dispatch::{GenerationRequest, ProvenanceFields},
    registry::{ModelDescriptor, OutputShape},
};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Body of `POST /replicate`.
#[derive(Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct ReplicateRequest {
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub short_model_name: String,
    #[serde(default)]
    pub user_name: Option<String>,
    // Forwarded to the upstream as-is; must hold at least `prompt` and `output_format`.
    #[serde(default)]
    pub model_payload: Map<String, Value>,
    #[serde(default)]
    pub meta_data: Option<ProvenanceFields>,
}

impl ReplicateRequest {
    pub fn into_generation_request(self, client_addr: String) -> GenerationRequest {
        GenerationRequest {
            client_addr,
            password: self.password,
            short_model_name: self.short_model_name,
            user_name: self.user_name,
            model_payload: self.model_payload,
            provenance: self.meta_data.unwrap_or_default(),
        }
    }
}

/// Entry of `GET /models`.
#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct ApiModelInfo {
    pub name: String,
    pub provider: String,
    pub shape: OutputShape,
}

impl From<&ModelDescriptor> for ApiModelInfo {
    fn from(model: &ModelDescriptor) -> Self {
        Self {
            name: model.short_name.to_string(),
            provider: model.provider_qualified_name(),
            shape: model.output_shape,
        }
    }
}
