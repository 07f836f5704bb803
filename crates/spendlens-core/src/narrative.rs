//! Narration collaborator
//!
//! Turns an answer or an insight into a sentence or two of prose. Narrators
//! never produce numbers of their own: they are handed the computed facts,
//! and anything that fails the framing rules is replaced by the template.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use crate::ask::AskResponse;
use crate::error::{Error, Result};
use crate::synthesis::{money, validate_framing, Insight};

/// What to narrate, with the deterministic text to fall back on
#[derive(Debug, Clone, Serialize)]
pub struct NarrationRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub question: Option<String>,
    pub tool_used: String,
    pub facts: Value,
    pub template: String,
}

impl NarrationRequest {
    pub fn for_answer(question: &str, response: &AskResponse) -> Self {
        Self {
            question: Some(question.to_string()),
            tool_used: response.tool_used.clone(),
            facts: response.answer_payload.clone(),
            template: answer_template(response),
        }
    }

    pub fn for_insight(insight: &Insight) -> Self {
        Self {
            question: None,
            tool_used: insight.tool_source.name().to_string(),
            facts: serde_json::to_value(insight).unwrap_or_default(),
            template: format!("{}. {}", insight.title, insight.description),
        }
    }
}

fn num(facts: &Value, key: &str) -> f64 {
    facts[key].as_f64().unwrap_or(0.0)
}

fn text<'a>(facts: &'a Value, key: &str) -> &'a str {
    facts[key].as_str().unwrap_or("")
}

fn answer_template(response: &AskResponse) -> String {
    let f = &response.answer_payload;
    if response.fallback {
        return "There is no exact computation for that question yet.".to_string();
    }
    match response.tool_used.as_str() {
        "simulate_cancellation" => format!(
            "Cancelling {} frees up about {} a year.",
            text(f, "merchant"),
            money(num(f, "annual_savings"))
        ),
        "spending_what_if" => format!(
            "Trimming {} by {:.0}% keeps about {} a year.",
            text(f, "category"),
            num(f, "reduction_pct"),
            money(num(f, "annual_savings"))
        ),
        "compare_periods" => format!(
            "Spending was {} in {} and {} in {}.",
            money(num(&f["period_a"], "total")),
            text(&f["period_a"], "month"),
            money(num(&f["period_b"], "total")),
            text(&f["period_b"], "month")
        ),
        "find_merchant_pattern" => format!(
            "{} shows {} purchases totalling {}, about {} each.",
            text(f, "merchant"),
            f["transactions"].as_u64().unwrap_or(0),
            money(num(f, "total")),
            money(num(f, "avg_amount"))
        ),
        "breakdown_category" => format!(
            "{} totals {} across {} purchases.",
            text(f, "category"),
            money(num(f, "total")),
            f["transactions"].as_u64().unwrap_or(0)
        ),
        other => format!("Here is the {} result from your analysis.", other.replace('_', " ")),
    }
}

#[async_trait]
pub trait Narrator: Send + Sync {
    async fn narrate(&self, request: &NarrationRequest) -> Result<String>;
}

/// Deterministic narrator: returns the template text
#[derive(Debug, Clone, Default)]
pub struct TemplateNarrator;

#[async_trait]
impl Narrator for TemplateNarrator {
    async fn narrate(&self, request: &NarrationRequest) -> Result<String> {
        Ok(request.template.clone())
    }
}

#[derive(Debug, Serialize)]
struct GenerateRequest {
    model: String,
    prompt: String,
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    response: String,
}

/// Narration through an Ollama-compatible `/api/generate` endpoint
#[derive(Debug, Clone)]
pub struct OllamaNarrator {
    http_client: Client,
    base_url: String,
    model: String,
}

impl OllamaNarrator {
    pub fn new(base_url: &str, model: &str) -> Self {
        Self {
            http_client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
        }
    }

    /// Create from `OLLAMA_HOST` / `OLLAMA_MODEL`; None without a host
    pub fn from_env() -> Option<Self> {
        let host = std::env::var("OLLAMA_HOST").ok()?;
        let model = std::env::var("OLLAMA_MODEL").unwrap_or_else(|_| "llama3.2".to_string());
        Some(Self::new(&host, &model))
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn prompt(request: &NarrationRequest) -> String {
        let mut prompt = String::from(
            "Explain this personal finance result in at most two short, neutral sentences. \
             Use only the numbers in the facts and add none of your own. \
             Do not judge the reader.\n",
        );
        if let Some(question) = &request.question {
            prompt.push_str(&format!("Question: {}\n", question));
        }
        prompt.push_str(&format!("Source: {}\n", request.tool_used));
        prompt.push_str(&format!("Facts: {}\n", request.facts));
        prompt
    }
}

#[async_trait]
impl Narrator for OllamaNarrator {
    async fn narrate(&self, request: &NarrationRequest) -> Result<String> {
        let body = GenerateRequest {
            model: self.model.clone(),
            prompt: Self::prompt(request),
            stream: false,
        };
        let response = self
            .http_client
            .post(format!("{}/api/generate", self.base_url))
            .json(&body)
            .send()
            .await?
            .error_for_status()?;

        let generated: GenerateResponse = response.json().await?;
        debug!(model = %self.model, chars = generated.response.len(), "Narration received");

        let text = generated.response.trim();
        if text.is_empty() {
            return Err(Error::Narration("empty response".into()));
        }
        Ok(text.to_string())
    }
}

/// Narrate, falling back to the template on error or failed framing
pub async fn narrate_or_template(narrator: &dyn Narrator, request: &NarrationRequest) -> String {
    match narrator.narrate(request).await {
        Ok(text) => match validate_framing(&text) {
            Ok(()) => text,
            Err(reason) => {
                warn!(%reason, "Narration failed framing; using template");
                request.template.clone()
            }
        },
        Err(e) => {
            warn!(error = %e, "Narration failed; using template");
            request.template.clone()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Confidence;
    use crate::test_utils::MockOllamaServer;
    use serde_json::json;

    fn cancellation() -> AskResponse {
        AskResponse {
            tool_used: "simulate_cancellation".into(),
            answer_payload: json!({ "merchant": "NETFLIX", "annual_savings": 185.88 }),
            confidence: Confidence::High,
            methodology: String::new(),
            fallback: false,
        }
    }

    #[tokio::test]
    async fn test_template_narrator() {
        let request = NarrationRequest::for_answer("cancel netflix?", &cancellation());
        let text = TemplateNarrator.narrate(&request).await.unwrap();
        assert_eq!(text, "Cancelling NETFLIX frees up about $186 a year.");
    }

    #[tokio::test]
    async fn test_ollama_narrator_uses_generated_text() {
        let server = MockOllamaServer::start_with_reply("Dropping NETFLIX keeps $185.88 a year.").await;
        let narrator = OllamaNarrator::new(&server.url(), "llama3.2");
        let request = NarrationRequest::for_answer("cancel netflix?", &cancellation());

        let text = narrate_or_template(&narrator, &request).await;
        assert_eq!(text, "Dropping NETFLIX keeps $185.88 a year.");
    }

    #[tokio::test]
    async fn test_default_mock_reply_passes_framing() {
        let server = MockOllamaServer::start().await;
        let narrator = OllamaNarrator::new(&server.url(), "llama3.2");
        let request = NarrationRequest::for_answer("cancel netflix?", &cancellation());

        let text = narrator.narrate(&request).await.unwrap();
        assert!(validate_framing(&text).is_ok());
        assert_ne!(narrate_or_template(&narrator, &request).await, request.template);
    }

    #[tokio::test]
    async fn test_judgmental_reply_falls_back() {
        let server = MockOllamaServer::start_with_reply("You should stop wasting money.").await;
        let narrator = OllamaNarrator::new(&server.url(), "llama3.2");
        let request = NarrationRequest::for_answer("cancel netflix?", &cancellation());

        let text = narrate_or_template(&narrator, &request).await;
        assert_eq!(text, request.template);
    }

    #[tokio::test]
    async fn test_unreachable_host_falls_back() {
        let narrator = OllamaNarrator::new("http://127.0.0.1:9", "llama3.2");
        let request = NarrationRequest::for_answer("cancel netflix?", &cancellation());
        assert_eq!(narrate_or_template(&narrator, &request).await, request.template);
    }
}
