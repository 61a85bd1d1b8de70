// Contract for the remote image-generation service, plus its HTTP client.

mod replicate;

pub use replicate::ReplicateClient;

use async_trait::async_trait;
use serde_json::{Map, Value};

/// Raw bytes returned by one upstream run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpstreamOutput {
    Single(Vec<u8>),
    Multi(Vec<Vec<u8>>),
}

impl UpstreamOutput {
    /// Payloads in upstream order; a single payload becomes a one-element list.
    pub fn into_payloads(self) -> Vec<Vec<u8>> {
        match self {
            UpstreamOutput::Single(payload) => vec![payload],
            UpstreamOutput::Multi(payloads) => payloads,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            UpstreamOutput::Single(_) => 1,
            UpstreamOutput::Multi(payloads) => payloads.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug, thiserror::Error)]
pub enum UpstreamError {
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("upstream returned HTTP {status}: {detail}")]
    Status { status: u16, detail: String },
    #[error("prediction {status}: {detail}")]
    Failed { status: String, detail: String },
    #[error("unexpected response: {0}")]
    InvalidResponse(String),
    #[error("timed out after {0}s")]
    Timeout(u64),
}

impl UpstreamError {
    /// Message safe to hand back to API clients. Transport errors carry
    /// request URLs, so only their kind is reported.
    pub fn public_detail(&self) -> String {
        match self {
            UpstreamError::Transport(e) if e.is_timeout() => "upstream timed out".to_string(),
            UpstreamError::Transport(_) => "upstream unreachable".to_string(),
            other => other.to_string(),
        }
    }
}

/// Runs a model by its provider-qualified name with the caller's input mapping.
#[async_trait]
pub trait ImageGenerator: Send + Sync {
    async fn run(
        &self,
        model: &str,
        input: &Map<String, Value>,
    ) -> Result<UpstreamOutput, UpstreamError>;
}
