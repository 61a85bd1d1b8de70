// HTTP client for the hosted prediction API: create, poll, download.

use super::{ImageGenerator, UpstreamError, UpstreamOutput};
use crate::config::RelayConfig;
use async_trait::async_trait;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use reqwest::{Client as HttpClient, Response as HttpResponse, Url};
use serde_json::{Map, Value, json};
use std::time::Duration;
use tracing::debug;

const DETAIL_MAX_CHARS: usize = 512;

pub struct ReplicateClient {
    http: HttpClient,
    api_base: String,
    api_token: String,
    poll_interval: Duration,
    timeout: Option<Duration>,
}

#[derive(Debug, PartialEq, Eq)]
enum OutputRefs {
    Single(String),
    Multi(Vec<String>),
}

impl ReplicateClient {
    pub fn new(
        api_base: impl Into<String>,
        api_token: impl Into<String>,
        poll_interval: Duration,
        timeout: Option<Duration>,
    ) -> Result<Self, UpstreamError> {
        let http = HttpClient::builder()
            .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            http,
            api_base: api_base.into().trim_end_matches('/').to_string(),
            api_token: api_token.into(),
            poll_interval,
            timeout,
        })
    }

    pub fn from_config(config: &RelayConfig) -> Result<Self, UpstreamError> {
        Self::new(
            config.api_base.clone(),
            config.api_token.clone(),
            config.poll_interval,
            config.upstream_timeout,
        )
    }

    fn predictions_endpoint(&self, model: &str) -> String {
        format!("{}/models/{}/predictions", self.api_base, model)
    }

    async fn create_prediction(
        &self,
        model: &str,
        input: &Map<String, Value>,
    ) -> Result<Value, UpstreamError> {
        let endpoint = self.predictions_endpoint(model);
        debug!("Creating prediction: {}", endpoint);
        let response = self
            .http
            .post(&endpoint)
            .bearer_auth(&self.api_token)
            .header("Prefer", "wait")
            .json(&json!({ "input": input }))
            .send()
            .await?;
        response_json_or_error(response).await
    }

    async fn wait_for_prediction(&self, mut prediction: Value) -> Result<Value, UpstreamError> {
        loop {
            let status = prediction_status(&prediction);
            if status == "succeeded" {
                return Ok(prediction);
            }
            if matches!(status.as_str(), "failed" | "canceled" | "aborted") {
                return Err(UpstreamError::Failed {
                    detail: prediction_error(&prediction),
                    status,
                });
            }

            let poll_url = prediction
                .get("urls")
                .and_then(|urls| urls.get("get"))
                .and_then(Value::as_str)
                .map(str::trim)
                .filter(|url| !url.is_empty())
                .ok_or_else(|| {
                    UpstreamError::InvalidResponse(format!(
                        "prediction in state '{}' has no poll URL",
                        status
                    ))
                })?
                .to_string();

            // The token is only ever sent back to the API host.
            if !same_origin(&self.api_base, &poll_url) {
                return Err(UpstreamError::InvalidResponse(format!(
                    "poll URL for prediction in state '{}' is outside the API origin",
                    status
                )));
            }

            debug!("Prediction is {}, polling {}", status, poll_url);
            tokio::time::sleep(self.poll_interval).await;

            let response = self
                .http
                .get(&poll_url)
                .bearer_auth(&self.api_token)
                .send()
                .await?;
            prediction = response_json_or_error(response).await?;
        }
    }

    async fn download(&self, url: &str) -> Result<Vec<u8>, UpstreamError> {
        if let Some(data) = url.strip_prefix("data:") {
            return decode_data_uri(data);
        }

        let response = self.http.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(UpstreamError::Status {
                status: status.as_u16(),
                detail: format!(
                    "output download failed: {}",
                    status.canonical_reason().unwrap_or("unknown status")
                ),
            });
        }
        let bytes = response.bytes().await?.to_vec();
        debug!("Downloaded {} bytes from {}", bytes.len(), url);
        Ok(bytes)
    }

    async fn run_prediction(
        &self,
        model: &str,
        input: &Map<String, Value>,
    ) -> Result<UpstreamOutput, UpstreamError> {
        let prediction = self.create_prediction(model, input).await?;
        let prediction = self.wait_for_prediction(prediction).await?;

        match parse_output(prediction.get("output").unwrap_or(&Value::Null))? {
            OutputRefs::Single(url) => Ok(UpstreamOutput::Single(self.download(&url).await?)),
            OutputRefs::Multi(urls) => {
                let mut payloads = Vec::with_capacity(urls.len());
                for url in &urls {
                    payloads.push(self.download(url).await?);
                }
                Ok(UpstreamOutput::Multi(payloads))
            }
        }
    }
}

#[async_trait]
impl ImageGenerator for ReplicateClient {
    async fn run(
        &self,
        model: &str,
        input: &Map<String, Value>,
    ) -> Result<UpstreamOutput, UpstreamError> {
        match self.timeout {
            Some(limit) => tokio::time::timeout(limit, self.run_prediction(model, input))
                .await
                .map_err(|_| UpstreamError::Timeout(limit.as_secs()))?,
            None => self.run_prediction(model, input).await,
        }
    }
}

async fn response_json_or_error(response: HttpResponse) -> Result<Value, UpstreamError> {
    let status = response.status();
    let body = response.text().await?;
    if !status.is_success() {
        return Err(UpstreamError::Status {
            status: status.as_u16(),
            detail: error_detail(&body, status.canonical_reason()),
        });
    }
    serde_json::from_str(&body)
        .map_err(|e| UpstreamError::InvalidResponse(format!("invalid JSON payload: {}", e)))
}

/// `detail` (or `title`) from a JSON error body, else the HTTP reason phrase.
fn error_detail(body: &str, reason: Option<&str>) -> String {
    let detail = serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|value| {
            value
                .get("detail")
                .or_else(|| value.get("title"))
                .and_then(Value::as_str)
                .map(str::to_string)
        })
        .filter(|detail| !detail.trim().is_empty())
        .or_else(|| reason.map(str::to_string))
        .unwrap_or_else(|| "unknown error".to_string());
    truncate_text(&detail, DETAIL_MAX_CHARS)
}

fn prediction_status(prediction: &Value) -> String {
    prediction
        .get("status")
        .and_then(Value::as_str)
        .map(str::to_ascii_lowercase)
        .unwrap_or_default()
}

fn prediction_error(prediction: &Value) -> String {
    match prediction.get("error") {
        Some(Value::String(message)) if !message.trim().is_empty() => {
            truncate_text(message.trim(), DETAIL_MAX_CHARS)
        }
        Some(Value::Null) | None => "no error message".to_string(),
        Some(other) => truncate_text(&other.to_string(), DETAIL_MAX_CHARS),
    }
}

fn parse_output(output: &Value) -> Result<OutputRefs, UpstreamError> {
    match output {
        Value::String(url) => Ok(OutputRefs::Single(checked_url(url)?)),
        Value::Array(items) => items
            .iter()
            .map(|item| {
                item.as_str()
                    .ok_or_else(|| {
                        UpstreamError::InvalidResponse("output list holds a non-string".into())
                    })
                    .and_then(checked_url)
            })
            .collect::<Result<Vec<_>, _>>()
            .map(OutputRefs::Multi),
        Value::Null => Err(UpstreamError::InvalidResponse(
            "prediction succeeded without output".into(),
        )),
        _ => Err(UpstreamError::InvalidResponse(
            "output is neither a URL nor a list of URLs".into(),
        )),
    }
}

fn same_origin(base: &str, url: &str) -> bool {
    match (Url::parse(base), Url::parse(url)) {
        (Ok(base), Ok(url)) => base.origin() == url.origin(),
        _ => false,
    }
}

fn checked_url(url: &str) -> Result<String, UpstreamError> {
    let url = url.trim();
    if url.starts_with("https://") || url.starts_with("http://") || url.starts_with("data:") {
        Ok(url.to_string())
    } else {
        Err(UpstreamError::InvalidResponse(format!(
            "unsupported output reference '{}'",
            truncate_text(url, 64)
        )))
    }
}

fn decode_data_uri(rest: &str) -> Result<Vec<u8>, UpstreamError> {
    let (media, data) = rest
        .split_once(',')
        .ok_or_else(|| UpstreamError::InvalidResponse("malformed data URI".into()))?;
    if !media.ends_with(";base64") {
        return Err(UpstreamError::InvalidResponse(
            "only base64 data URIs are supported".into(),
        ));
    }
    BASE64
        .decode(data.trim())
        .map_err(|e| UpstreamError::InvalidResponse(format!("invalid base64 output: {}", e)))
}

fn truncate_text(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let mut out: String = text.chars().take(max_chars).collect();
    out.push_str("...");
    out
}
