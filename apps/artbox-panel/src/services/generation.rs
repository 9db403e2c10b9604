use anyhow::Context;
use async_trait::async_trait;
use serde_json::{json, Value};
use thiserror::Error;
use tracing::warn;

/// Why a render did not produce an image. Callers translate each variant
/// into a different user-facing message; only `Transient` invites a plain
/// retry.
#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("prompt rejected by content policy")]
    ContentPolicy,
    #[error("invalid generation parameters: {0}")]
    InvalidParams(String),
    #[error("generation backend unavailable")]
    Transient(#[source] anyhow::Error),
}

/// Text-to-image backend. One implementation talks to Replicate; tests
/// substitute their own.
#[async_trait]
pub trait GenerationGateway: Send + Sync {
    async fn render(&self, model_slug: &str, prompt: &str) -> Result<String, GenerationError>;
}

pub struct ReplicateGateway {
    http: reqwest::Client,
    api_token: String,
}

impl ReplicateGateway {
    pub fn new(api_token: String) -> Self {
        Self {
            http: reqwest::Client::new(),
            api_token,
        }
    }
}

#[async_trait]
impl GenerationGateway for ReplicateGateway {
    async fn render(&self, model_slug: &str, prompt: &str) -> Result<String, GenerationError> {
        let url = format!("https://api.replicate.com/v1/models/{model_slug}/predictions");
        let body = json!({
            "input": {
                "prompt": prompt,
                "num_outputs": 1,
                "aspect_ratio": "1:1",
                "output_format": "webp",
                "output_quality": 90,
            }
        });

        let resp = self
            .http
            .post(&url)
            .bearer_auth(&self.api_token)
            // Hold the connection until the prediction finishes instead of
            // polling the status endpoint.
            .header("Prefer", "wait")
            .json(&body)
            .send()
            .await
            .map_err(|e| GenerationError::Transient(e.into()))?;

        let status = resp.status();
        let payload: Value = resp
            .json()
            .await
            .context("Replicate returned a non-JSON body")
            .map_err(GenerationError::Transient)?;

        if !status.is_success() {
            warn!("Replicate error {}: {}", status, payload);
            return Err(classify_failure(status.as_u16(), &payload));
        }

        if payload.get("status").and_then(|s| s.as_str()) == Some("failed") {
            warn!("Replicate prediction failed: {}", payload);
            return Err(classify_failure(status.as_u16(), &payload));
        }

        extract_output_url(&payload).ok_or_else(|| {
            GenerationError::Transient(anyhow::anyhow!("No output URL in Replicate response"))
        })
    }
}

/// The `output` field is a single URL for some models and an array of URLs
/// for others; take the first either way.
pub(crate) fn extract_output_url(payload: &Value) -> Option<String> {
    match payload.get("output") {
        Some(Value::String(url)) if !url.is_empty() => Some(url.clone()),
        Some(Value::Array(items)) => items
            .iter()
            .find_map(|item| item.as_str())
            .map(str::to_string),
        _ => None,
    }
}

pub(crate) fn classify_failure(status: u16, payload: &Value) -> GenerationError {
    let detail = payload
        .get("detail")
        .or_else(|| payload.get("error"))
        .and_then(|d| d.as_str())
        .unwrap_or_default()
        .to_string();

    let lowered = detail.to_lowercase();
    if lowered.contains("nsfw") || lowered.contains("sensitive") || lowered.contains("flagged") {
        return GenerationError::ContentPolicy;
    }

    match status {
        400 | 422 => GenerationError::InvalidParams(detail),
        _ => GenerationError::Transient(anyhow::anyhow!(
            "Replicate request failed with status {status}: {detail}"
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn output_url_from_string_or_array() {
        let single = json!({ "output": "https://cdn.example/img.webp" });
        assert_eq!(
            extract_output_url(&single).as_deref(),
            Some("https://cdn.example/img.webp")
        );

        let list = json!({ "output": ["https://cdn.example/a.webp", "https://cdn.example/b.webp"] });
        assert_eq!(
            extract_output_url(&list).as_deref(),
            Some("https://cdn.example/a.webp")
        );

        assert!(extract_output_url(&json!({ "output": [] })).is_none());
        assert!(extract_output_url(&json!({})).is_none());
    }

    #[test]
    fn nsfw_detail_maps_to_content_policy() {
        let payload = json!({ "detail": "NSFW content detected in the generated image" });
        assert!(matches!(
            classify_failure(500, &payload),
            GenerationError::ContentPolicy
        ));
    }

    #[test]
    fn validation_errors_map_to_invalid_params() {
        let payload = json!({ "detail": "aspect_ratio must be one of ..." });
        assert!(matches!(
            classify_failure(422, &payload),
            GenerationError::InvalidParams(_)
        ));
        assert!(matches!(
            classify_failure(400, &payload),
            GenerationError::InvalidParams(_)
        ));
    }

    #[test]
    fn other_failures_are_transient() {
        let payload = json!({ "detail": "upstream timeout" });
        assert!(matches!(
            classify_failure(503, &payload),
            GenerationError::Transient(_)
        ));
    }
}
