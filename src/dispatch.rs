// Per-request pipeline: password, model lookup, upstream run, materialization.

use crate::{
    config::RelayConfig,
    file_name::sanitize_extension,
    materialize::{MaterializeError, Materializer},
    metadata::ArtifactMetadata,
    registry::{ModelDescriptor, ModelRegistry},
    upstream::{ImageGenerator, UpstreamError},
};
use serde::Deserialize;
use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::{debug, error, info};

const PROMPT_LOG_MAX_CHARS: usize = 150;
const DEFAULT_OUTPUT_FORMAT: &str = "webp";
const SOFTWARE: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"));
const AI_WARNING: &str = "Generated by AI";

/// Optional provenance fields supplied by the caller.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProvenanceFields {
    pub copyright: Option<String>,
    pub disclaimer: Option<String>,
    pub comment: Option<String>,
}

#[derive(Debug, Clone)]
pub struct GenerationRequest {
    pub client_addr: String,
    pub password: String,
    pub short_model_name: String,
    pub user_name: Option<String>,
    pub model_payload: Map<String, Value>,
    pub provenance: ProvenanceFields,
}

impl GenerationRequest {
    fn prompt(&self) -> &str {
        self.model_payload
            .get("prompt")
            .and_then(Value::as_str)
            .unwrap_or_default()
    }

    fn output_format(&self) -> String {
        self.model_payload
            .get("output_format")
            .and_then(Value::as_str)
            .map(sanitize_extension)
            .unwrap_or_else(|| DEFAULT_OUTPUT_FORMAT.to_string())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("Wrong password")]
    Unauthorized,
    #[error("Unknown model: {0}")]
    UnknownModel(String),
    #[error("Image generation failed: {}", .0.public_detail())]
    Upstream(#[source] UpstreamError),
    #[error("No result handler for model {0}")]
    NoHandler(String),
    #[error("Failed to save generated image")]
    Materialize(#[source] MaterializeError),
}

pub struct Dispatcher {
    config: Arc<RelayConfig>,
    registry: ModelRegistry,
    generator: Arc<dyn ImageGenerator>,
    materializer: Materializer,
}

impl Dispatcher {
    pub fn new(
        config: Arc<RelayConfig>,
        registry: ModelRegistry,
        generator: Arc<dyn ImageGenerator>,
        materializer: Materializer,
    ) -> Self {
        Self {
            config,
            registry,
            generator,
            materializer,
        }
    }

    pub fn registry(&self) -> &ModelRegistry {
        &self.registry
    }

    /// Runs one request to completion and returns the generated file names.
    pub async fn dispatch(&self, request: GenerationRequest) -> Result<Vec<String>, DispatchError> {
        let client = request.client_addr.as_str();

        if !self.check_password(&request.password) {
            error!("{} Wrong password: \"{}\"", client, request.password);
            return Err(DispatchError::Unauthorized);
        }

        let Some(model) = self.registry.get(&request.short_model_name) else {
            error!("{} Unknown model: \"{}\"", client, request.short_model_name);
            return Err(DispatchError::UnknownModel(request.short_model_name));
        };

        info!(
            "{} {}\n\"{}\"",
            client,
            model.short_name,
            prompt_excerpt(request.prompt())
        );

        let Some(provider_model) = self.registry.resolve_provider(model.short_name) else {
            error!("{} No provider for {}", client, model.short_name);
            return Err(DispatchError::UnknownModel(model.short_name.to_string()));
        };
        let output = self
            .generator
            .run(&provider_model, &request.model_payload)
            .await
            .map_err(|e| {
                error!("{} {} upstream error: {}", client, provider_model, e);
                DispatchError::Upstream(e)
            })?;
        debug!("{} {} returned {} payload(s)", client, provider_model, output.len());

        let Some(shape) = self.registry.resolve_output_handler(model.short_name) else {
            error!("{} No result handler for {}", client, model.short_name);
            return Err(DispatchError::NoHandler(model.short_name.to_string()));
        };

        let metadata = self.build_metadata(&request, model, &provider_model);
        let file_names = self
            .materializer
            .materialize(shape, output, &request.output_format(), &metadata)
            .await
            .map_err(|e| {
                error!(
                    "{} {:?} result handler for {} failed: {}",
                    client, shape, model.short_name, e
                );
                DispatchError::Materialize(e)
            })?;

        info!("{} {} -> {:?}", client, model.short_name, file_names);
        Ok(file_names)
    }

    fn check_password(&self, password: &str) -> bool {
        self.config.passwords.iter().any(|known| known == password)
    }

    fn build_metadata(
        &self,
        request: &GenerationRequest,
        model: &ModelDescriptor,
        provider_model: &str,
    ) -> ArtifactMetadata {
        let non_empty = |value: &Option<String>| value.clone().filter(|v| !v.trim().is_empty());
        let prompt = request.prompt();

        ArtifactMetadata {
            title: Some(format!("{} {}", self.config.file_prefix, model.short_name)),
            author: non_empty(&request.user_name),
            description: (!prompt.trim().is_empty()).then(|| prompt.to_string()),
            copyright: non_empty(&request.provenance.copyright),
            software: Some(SOFTWARE.to_string()),
            disclaimer: non_empty(&request.provenance.disclaimer),
            warning: Some(AI_WARNING.to_string()),
            source: Some(provider_model.to_string()),
            comment: non_empty(&request.provenance.comment),
        }
    }
}

fn prompt_excerpt(prompt: &str) -> String {
    if prompt.chars().count() <= PROMPT_LOG_MAX_CHARS {
        return prompt.to_string();
    }
    let mut excerpt: String = prompt.chars().take(PROMPT_LOG_MAX_CHARS).collect();
    excerpt.push_str("...");
    excerpt
}
