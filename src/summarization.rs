//! Profile summarization with the completion model.
//!
//! Builds the prompt from a filtered profile and parses the reply into
//! exactly two facts and two ice breakers.

use crate::config::{ApiKeys, ServiceEndpoints};
use crate::errors::PipelineError;
use crate::models::{ProfileDocument, StructuredSummary};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Sampling temperature for summaries. High on purpose: ice breakers should vary.
pub const SUMMARY_TEMPERATURE: f32 = 1.0;

const PROFILE_PLACEHOLDER: &str = "{linkedin_information}";

/// Prompt sent for every profile; `{linkedin_information}` is replaced by the profile JSON.
pub const SUMMARY_PROMPT_TEMPLATE: &str = concat!(
    "Given the Linkedin information {linkedin_information} about a person I want you to create a JSON response with the following structure:",
    " 1. Key \"summary\": A short summary, Value: String formatted",
    " 2. Key \"latest_position\": Latest position, job title, company and a brief summary, Value: String formatted",
    " 3. Key \"facts\": Two interesting facts about them, Value: Array of two strings",
    " 4. Key \"topic_of_interest\": A topic that may interest them, Value: String formatted",
    " 5. Key \"ice_breakers\": Two creative Ice breakers to open a conversation with them, Value: Array of two strings.",
    " Answer with the JSON object only."
);

/// Fills the prompt template with a profile.
pub fn render_prompt(profile: &ProfileDocument) -> Result<String, PipelineError> {
    let profile_json = serde_json::to_string(profile).map_err(|e| {
        PipelineError::Summarization(format!("Failed to serialize profile: {}", e))
    })?;
    Ok(SUMMARY_PROMPT_TEMPLATE.replace(PROFILE_PLACEHOLDER, &profile_json))
}

/// Parses the model's answer into a summary.
///
/// The answer may be wrapped in a Markdown code fence. `facts` and
/// `ice_breakers` must hold exactly two entries each.
pub fn parse_summary(text: &str) -> Result<StructuredSummary, PipelineError> {
    let body = strip_code_fence(text);
    let summary: StructuredSummary = serde_json::from_str(body).map_err(|e| {
        PipelineError::Summarization(format!("Model answer is not the expected JSON: {}", e))
    })?;

    if summary.facts.len() != 2 {
        return Err(PipelineError::Summarization(format!(
            "expected 2 facts, got {}",
            summary.facts.len()
        )));
    }
    if summary.ice_breakers.len() != 2 {
        return Err(PipelineError::Summarization(format!(
            "expected 2 ice breakers, got {}",
            summary.ice_breakers.len()
        )));
    }

    Ok(summary)
}

fn strip_code_fence(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    // Drop the info string (e.g. "json") on the opening line.
    let rest = rest.split_once('\n').map(|(_, body)| body).unwrap_or(rest);
    rest.trim_end().strip_suffix("```").unwrap_or(rest).trim()
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    temperature: f32,
    messages: Vec<ChatMessage<'a>>,
}

#[derive(Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Deserialize)]
struct ChatChoiceMessage {
    content: Option<String>,
}

/// Client for the hosted completion model.
#[derive(Clone)]
pub struct Summarizer {
    client: Client,
    base_url: String,
    api_key: String,
    model: String,
    temperature: f32,
}

impl Summarizer {
    pub fn new(keys: &ApiKeys, endpoints: &ServiceEndpoints) -> Result<Self, PipelineError> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| {
                PipelineError::Summarization(format!("Failed to create HTTP client: {}", e))
            })?;

        Ok(Self {
            client,
            base_url: endpoints.openai_base_url.trim_end_matches('/').to_string(),
            api_key: keys.openai.clone(),
            model: endpoints.openai_model.clone(),
            temperature: SUMMARY_TEMPERATURE,
        })
    }

    /// Asks the model for a structured summary of a profile.
    pub async fn summarize(
        &self,
        profile: &ProfileDocument,
    ) -> Result<StructuredSummary, PipelineError> {
        let prompt = render_prompt(profile)?;
        let url = format!("{}/v1/chat/completions", self.base_url);
        let request = ChatCompletionRequest {
            model: &self.model,
            temperature: self.temperature,
            messages: vec![ChatMessage {
                role: "user",
                content: &prompt,
            }],
        };

        tracing::info!("Requesting summary from {}", self.model);

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                PipelineError::Summarization(format!("Completion request failed: {}", e))
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(PipelineError::Summarization(format!(
                "Completion API returned {}: {}",
                status, error_text
            )));
        }

        let completion: ChatCompletionResponse = response.json().await.map_err(|e| {
            PipelineError::Summarization(format!("Failed to parse completion response: {}", e))
        })?;

        let content = completion
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| {
                PipelineError::Summarization("Completion response has no content".to_string())
            })?;

        tracing::info!("{}", content);
        parse_summary(&content)
    }
}
