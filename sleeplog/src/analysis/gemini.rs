//! [`SleepAnalyzer`] backed by the Google Generative Language REST API.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, warn};

use super::{AnalysisEntry, AnalysisError, NO_RECORDS_MESSAGE, SleepAnalyzer, build_prompt};
use crate::config::AnalysisConfig;

const API_KEY_HEADER: &str = "x-goog-api-key";

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest<'a> {
    contents: [Content<'a>; 1],
    generation_config: &'a GenerationConfig,
}

#[derive(Debug, Serialize)]
struct Content<'a> {
    role: &'static str,
    parts: [TextPart<'a>; 1],
}

#[derive(Debug, Serialize)]
struct TextPart<'a> {
    text: &'a str,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f32,
    top_k: u32,
    top_p: f32,
    max_output_tokens: u32,
    response_mime_type: &'static str,
}

#[derive(Debug, Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Debug, Deserialize)]
struct ResponsePart {
    text: Option<String>,
}

impl GenerateContentResponse {
    /// Concatenated text of the first candidate, if it has any.
    fn into_text(self) -> Option<String> {
        let content = self.candidates.into_iter().next()?.content?;
        let text: String = content.parts.into_iter().filter_map(|p| p.text).collect();
        (!text.trim().is_empty()).then_some(text)
    }
}

pub struct GeminiAnalyzer {
    client: Client,
    api_key: String,
    endpoint: String,
    generation_config: GenerationConfig,
}

impl std::fmt::Debug for GeminiAnalyzer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeminiAnalyzer")
            .field("endpoint", &self.endpoint)
            .field("api_key", &"<redacted>")
            .finish()
    }
}

impl GeminiAnalyzer {
    pub fn new(config: &AnalysisConfig) -> Result<Self, AnalysisError> {
        let api_key = config
            .api_key
            .as_deref()
            .map(str::trim)
            .filter(|key| !key.is_empty())
            .ok_or(AnalysisError::MissingApiKey)?
            .to_string();

        crate::install_crypto_provider();
        let client = Client::builder().timeout(config.timeout).build()?;

        let endpoint = format!(
            "{}/v1beta/models/{}:generateContent",
            config.base_url.as_str().trim_end_matches('/'),
            config.model
        );

        Ok(Self {
            client,
            api_key,
            endpoint,
            generation_config: GenerationConfig {
                temperature: config.temperature,
                top_k: config.top_k,
                top_p: config.top_p,
                max_output_tokens: config.max_output_tokens,
                response_mime_type: "text/plain",
            },
        })
    }
}

#[async_trait]
impl SleepAnalyzer for GeminiAnalyzer {
    #[instrument(skip_all, fields(records = entries.len()), err)]
    async fn summarize(&self, entries: &[AnalysisEntry]) -> Result<String, AnalysisError> {
        if entries.is_empty() {
            return Ok(NO_RECORDS_MESSAGE.to_string());
        }

        let prompt = build_prompt(entries)?;
        let body = GenerateContentRequest {
            contents: [Content {
                role: "user",
                parts: [TextPart { text: &prompt }],
            }],
            generation_config: &self.generation_config,
        };

        debug!("Requesting sleep analysis from {}", self.endpoint);
        let response = self
            .client
            .post(&self.endpoint)
            .header(API_KEY_HEADER, &self.api_key)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(status = status.as_u16(), "Analysis model rejected request");
            return Err(AnalysisError::UpstreamStatus {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: GenerateContentResponse = response
            .json()
            .await
            .map_err(|e| AnalysisError::InvalidResponse(e.to_string()))?;

        parsed.into_text().ok_or(AnalysisError::EmptyResponse)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use serde_json::json;
    use std::time::Duration;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn config_for(server: &MockServer) -> AnalysisConfig {
        AnalysisConfig {
            api_key: Some("test-key".to_string()),
            base_url: server.uri().parse().unwrap(),
            timeout: Duration::from_secs(5),
            ..Default::default()
        }
    }

    fn entries() -> Vec<AnalysisEntry> {
        vec![AnalysisEntry {
            date: NaiveDate::from_ymd_opt(2024, 3, 1).unwrap(),
            sleep_time: "23:00".to_string(),
            wake_time: "07:00".to_string(),
            duration: 8.0,
            notes: Some("잘 잤음".to_string()),
        }]
    }

    #[test]
    fn test_refuses_to_construct_without_key() {
        let config = AnalysisConfig {
            api_key: None,
            ..Default::default()
        };
        assert!(matches!(GeminiAnalyzer::new(&config), Err(AnalysisError::MissingApiKey)));

        let config = AnalysisConfig {
            api_key: Some("   ".to_string()),
            ..Default::default()
        };
        assert!(matches!(GeminiAnalyzer::new(&config), Err(AnalysisError::MissingApiKey)));
    }

    #[tokio::test]
    async fn test_summarize_concatenates_candidate_parts() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v1beta/models/gemma-3-1b-it:generateContent"))
            .and(header("x-goog-api-key", "test-key"))
            .and(body_partial_json(json!({
                "generationConfig": {"topK": 40, "maxOutputTokens": 4096}
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "candidates": [{
                    "content": {"role": "model", "parts": [{"text": "규칙적인 "}, {"text": "수면입니다."}]}
                }]
            })))
            .expect(1)
            .mount(&mock_server)
            .await;

        let analyzer = GeminiAnalyzer::new(&config_for(&mock_server)).unwrap();
        let text = analyzer.summarize(&entries()).await.unwrap();
        assert_eq!(text, "규칙적인 수면입니다.");
    }

    #[tokio::test]
    async fn test_prompt_carries_records() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "candidates": [{"content": {"parts": [{"text": "ok"}]}}]
            })))
            .expect(1)
            .mount(&mock_server)
            .await;

        let analyzer = GeminiAnalyzer::new(&config_for(&mock_server)).unwrap();
        analyzer.summarize(&entries()).await.unwrap();

        let requests = mock_server.received_requests().await.unwrap();
        let body: serde_json::Value = serde_json::from_slice(&requests[0].body).unwrap();
        assert_eq!(body["contents"][0]["role"], "user");
        let prompt = body["contents"][0]["parts"][0]["text"].as_str().unwrap();
        assert!(prompt.contains("\"wakeTime\": \"07:00\""));
        assert!(prompt.contains("\"duration\": 8.0"));
    }

    #[tokio::test]
    async fn test_empty_candidates_is_an_error() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"candidates": []})))
            .mount(&mock_server)
            .await;

        let analyzer = GeminiAnalyzer::new(&config_for(&mock_server)).unwrap();
        let err = analyzer.summarize(&entries()).await.unwrap_err();
        assert!(matches!(err, AnalysisError::EmptyResponse));
    }

    #[tokio::test]
    async fn test_upstream_status_is_reported() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(429).set_body_string("quota exceeded"))
            .mount(&mock_server)
            .await;

        let analyzer = GeminiAnalyzer::new(&config_for(&mock_server)).unwrap();
        match analyzer.summarize(&entries()).await.unwrap_err() {
            AnalysisError::UpstreamStatus { status, body } => {
                assert_eq!(status, 429);
                assert_eq!(body, "quota exceeded");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_no_records_skips_the_model() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&mock_server)
            .await;

        let analyzer = GeminiAnalyzer::new(&config_for(&mock_server)).unwrap();
        assert_eq!(analyzer.summarize(&[]).await.unwrap(), NO_RECORDS_MESSAGE);
    }
}
