// Static table of the upstream models this relay accepts.

use serde::Serialize;

/// How a model returns its images.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputShape {
    /// One payload per run.
    Single,
    /// An ordered list of payloads per run.
    Multi,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelDescriptor {
    pub short_name: &'static str,
    pub provider_namespace: &'static str,
    pub output_shape: OutputShape,
}

impl ModelDescriptor {
    const fn new(
        short_name: &'static str,
        provider_namespace: &'static str,
        output_shape: OutputShape,
    ) -> Self {
        Self {
            short_name,
            provider_namespace,
            output_shape,
        }
    }

    /// `<namespace>/<short name>`, the identifier the upstream expects.
    pub fn provider_qualified_name(&self) -> String {
        format!("{}/{}", self.provider_namespace, self.short_name)
    }
}

const BUILTIN_MODELS: &[ModelDescriptor] = &[
    ModelDescriptor::new("flux-schnell", "black-forest-labs", OutputShape::Multi),
    ModelDescriptor::new("flux-dev", "black-forest-labs", OutputShape::Multi),
    ModelDescriptor::new("flux-pro", "black-forest-labs", OutputShape::Multi),
    ModelDescriptor::new("flux-2-klein-4b", "black-forest-labs", OutputShape::Multi),
    ModelDescriptor::new("flux-2-klein-9b-base", "black-forest-labs", OutputShape::Multi),
    ModelDescriptor::new("flux-2-dev", "black-forest-labs", OutputShape::Single),
    ModelDescriptor::new("flux-2-pro", "black-forest-labs", OutputShape::Single),
    ModelDescriptor::new("qwen-image", "qwen", OutputShape::Multi),
    ModelDescriptor::new("hidream-l1-fast", "prunaai", OutputShape::Single),
    ModelDescriptor::new("p-image", "prunaai", OutputShape::Single),
    ModelDescriptor::new("z-image-turbo", "prunaai", OutputShape::Single),
];

/// Immutable lookup from short model name to its descriptor.
#[derive(Debug, Clone)]
pub struct ModelRegistry {
    models: Vec<ModelDescriptor>,
}

impl ModelRegistry {
    pub fn builtin() -> Self {
        Self {
            models: BUILTIN_MODELS.to_vec(),
        }
    }

    pub fn get(&self, short_name: &str) -> Option<&ModelDescriptor> {
        self.models
            .iter()
            .find(|model| model.short_name == short_name)
    }

    pub fn resolve_provider(&self, short_name: &str) -> Option<String> {
        self.get(short_name)
            .map(ModelDescriptor::provider_qualified_name)
    }

    pub fn resolve_output_handler(&self, short_name: &str) -> Option<OutputShape> {
        self.get(short_name).map(|model| model.output_shape)
    }

    pub fn list(&self) -> impl Iterator<Item = &ModelDescriptor> {
        self.models.iter()
    }
}
