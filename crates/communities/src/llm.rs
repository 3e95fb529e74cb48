use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::LlmRequestError;
use crate::prompt;
use crate::record::Chunk;
use crate::report::CommunityReport;
use crate::retry::RetryPolicy;
use crate::usage::Usage;

/// Writes a report for one chunk of a community.
#[async_trait]
pub trait ReportGenerator: Send + Sync {
    async fn generate(&self, model: &str, chunk: &Chunk) -> Result<(CommunityReport, Usage)>;
}

/// Merges the partial reports of a community that needed several chunks.
#[async_trait]
pub trait ReportCombiner: Send + Sync {
    async fn combine(&self, model: &str, reports: &[CommunityReport]) -> Result<(CommunityReport, Usage)>;
}

#[derive(Clone)]
pub struct OllamaReportClient {
    base_url: String,
    client: reqwest::Client,
    retry: RetryPolicy,
    max_json_retries: usize,
}

#[derive(Serialize)]
struct OllamaRequest {
    model: String,
    prompt: String,
    stream: bool,
    format: String, // "json" for structured output
}

#[derive(Deserialize)]
struct OllamaResponse {
    response: String,
    #[serde(default)]
    prompt_eval_count: u64,
    #[serde(default)]
    eval_count: u64,
}

impl OllamaReportClient {
    pub fn new(base_url: impl Into<String>, retry: RetryPolicy) -> Self {
        Self {
            base_url: base_url.into(),
            client: reqwest::Client::new(),
            retry,
            max_json_retries: 3,
        }
    }

    async fn request(&self, model: &str, prompt: &str) -> Result<(String, Usage), LlmRequestError> {
        let url = format!("{}/api/generate", self.base_url);

        let request = OllamaRequest {
            model: model.to_string(),
            prompt: prompt.to_string(),
            stream: false,
            format: "json".to_string(),
        };

        let response = self.client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(LlmRequestError::Transport)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(LlmRequestError::Status { status, body });
        }

        let ollama_response: OllamaResponse = response
            .json()
            .await
            .map_err(LlmRequestError::InvalidResponse)?;

        let usage = Usage::for_call(ollama_response.prompt_eval_count, ollama_response.eval_count);
        Ok((ollama_response.response, usage))
    }

    async fn generate_text(&self, model: &str, prompt: &str) -> Result<(String, Usage), LlmRequestError> {
        self.retry.run("ollama_generate", || self.request(model, prompt)).await
    }

    /// Generate until the response parses as a report. Usage of discarded
    /// attempts is still counted.
    async fn generate_report(&self, model: &str, prompt: &str) -> Result<(CommunityReport, Usage)> {
        let mut usage = Usage::default();
        let mut current_prompt = prompt.to_string();

        for _ in 0..self.max_json_retries {
            let (text, call_usage) = self.generate_text(model, &current_prompt).await?;
            usage += call_usage;

            match parse_report(&text) {
                Ok(report) => return Ok((report, usage)),
                Err(e) => {
                    tracing::warn!(error = %e, "Report was not valid JSON, asking for a correction");
                    current_prompt = prompt::build_retry_prompt(&text);
                }
            }
        }

        anyhow::bail!("Failed to get a valid report after {} attempts", self.max_json_retries)
    }
}

#[async_trait]
impl ReportGenerator for OllamaReportClient {
    async fn generate(&self, model: &str, chunk: &Chunk) -> Result<(CommunityReport, Usage)> {
        let prompt = prompt::build_community_report_prompt(&chunk.to_text());
        self.generate_report(model, &prompt)
            .await
            .context("Failed to generate community report")
    }
}

#[async_trait]
impl ReportCombiner for OllamaReportClient {
    async fn combine(&self, model: &str, reports: &[CommunityReport]) -> Result<(CommunityReport, Usage)> {
        let prompt = prompt::build_combine_prompt(reports);
        self.generate_report(model, &prompt)
            .await
            .context("Failed to combine community reports")
    }
}

fn parse_report(text: &str) -> Result<CommunityReport> {
    let trimmed = text.trim();
    // Some models wrap JSON in a markdown fence despite the instructions
    let json = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .and_then(|rest| rest.strip_suffix("```"))
        .unwrap_or(trimmed);

    serde_json::from_str(json.trim()).context("Failed to parse community report")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::EntityRecord;

    #[test]
    fn test_parse_report() {
        let report = parse_report(
            r#"{"title": "Film studios", "summary": "Studios and their directors.", "rating": 6.5,
                "findings": [{"summary": "Shared cast", "explanation": "Several films share actors."}]}"#,
        )
        .unwrap();

        assert_eq!(report.title, "Film studios");
        assert_eq!(report.community_id, None);
        assert_eq!(report.findings.len(), 1);
        assert_eq!(report.rating_explanation, "");
    }

    #[test]
    fn test_parse_fenced_report() {
        let report = parse_report("```json\n{\"title\": \"t\", \"summary\": \"s\"}\n```").unwrap();
        assert_eq!(report.summary, "s");
    }

    #[test]
    fn test_parse_rejects_missing_fields() {
        assert!(parse_report(r#"{"rating": 3}"#).is_err());
        assert!(parse_report("not json").is_err());
    }

    fn client(server: &mockito::Server, max_retries: u32) -> OllamaReportClient {
        let retry = RetryPolicy {
            max_retries,
            initial_backoff_ms: 1,
            max_backoff_ms: 5,
        };
        OllamaReportClient::new(server.url(), retry)
    }

    fn chunk() -> Chunk {
        Chunk {
            records: vec![EntityRecord::new("studio")],
            token_count: 1,
        }
    }

    #[tokio::test]
    async fn test_generate_reads_report_and_usage() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/api/generate")
            .with_status(200)
            .with_body(
                r#"{"response": "{\"title\": \"Studios\", \"summary\": \"Film studios.\"}",
                    "prompt_eval_count": 120, "eval_count": 30}"#,
            )
            .expect(1)
            .create_async()
            .await;

        let (report, usage) = client(&server, 3).generate("llama3", &chunk()).await.unwrap();

        mock.assert_async().await;
        assert_eq!(report.title, "Studios");
        assert_eq!(usage, Usage::for_call(120, 30));
    }

    #[tokio::test]
    async fn test_unknown_model_is_not_retried() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/api/generate")
            .with_status(404)
            .with_body(r#"{"error": "model 'llama9' not found"}"#)
            .expect(1)
            .create_async()
            .await;

        let err = client(&server, 3).generate("llama9", &chunk()).await.unwrap_err();

        mock.assert_async().await;
        assert!(format!("{err:#}").contains("404"));
    }

    #[tokio::test]
    async fn test_overloaded_service_is_retried() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/api/generate")
            .with_status(503)
            .expect(3)
            .create_async()
            .await;

        let result = client(&server, 2).generate("llama3", &chunk()).await;

        mock.assert_async().await;
        assert!(result.is_err());
    }

    #[test]
    fn test_response_usage_defaults() {
        let response: OllamaResponse = serde_json::from_str(r#"{"response": "{}"}"#).unwrap();
        assert_eq!(response.prompt_eval_count, 0);
        assert_eq!(response.eval_count, 0);
    }
}
