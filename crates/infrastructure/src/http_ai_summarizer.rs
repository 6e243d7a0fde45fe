use async_trait::async_trait;
use bureau_application::{AiSummarizer, SummaryRequest};
use bureau_core::{AppError, AppResult};
use serde::Deserialize;
use serde_json::json;
use tracing::info;

use crate::http_response::{checked, transport_error};

const SYSTEM_PROMPT: &str =
    "You summarize office notes and records in two or three plain sentences.";

#[derive(Debug, Deserialize)]
struct ChatCompletion {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    content: Option<String>,
}

/// Summarizer backed by an OpenAI-compatible chat completions endpoint.
#[derive(Clone)]
pub struct HttpAiSummarizer {
    http_client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    model: String,
}

impl HttpAiSummarizer {
    /// Creates a summarizer for `base_url` such as `https://api.openai.com/v1`.
    #[must_use]
    pub fn new(
        http_client: reqwest::Client,
        base_url: impl Into<String>,
        api_key: Option<String>,
        model: impl Into<String>,
    ) -> Self {
        Self {
            http_client,
            base_url: base_url.into().trim_end_matches('/').to_owned(),
            api_key,
            model: model.into(),
        }
    }

    fn completions_url(&self) -> String {
        format!("{}/chat/completions", self.base_url)
    }
}

fn user_prompt(request: &SummaryRequest) -> String {
    match request.instructions.as_deref() {
        Some(instructions) => format!("{instructions}\n\n{}", request.text),
        None => request.text.clone(),
    }
}

#[async_trait]
impl AiSummarizer for HttpAiSummarizer {
    async fn summarize(&self, request: SummaryRequest) -> AppResult<String> {
        let operation = "ai summarization";
        let mut builder = self.http_client.post(self.completions_url()).json(&json!({
            "model": self.model,
            "messages": [
                {"role": "system", "content": SYSTEM_PROMPT},
                {"role": "user", "content": user_prompt(&request)},
            ],
        }));
        if let Some(api_key) = &self.api_key {
            builder = builder.bearer_auth(api_key);
        }

        let response = builder
            .send()
            .await
            .map_err(|error| transport_error(&error, operation))?;
        let completion = checked(response, operation)
            .await?
            .json::<ChatCompletion>()
            .await
            .map_err(|error| {
                AppError::Unavailable(format!("{operation} returned an unreadable body: {error}"))
            })?;

        let summary = completion
            .choices
            .into_iter()
            .find_map(|choice| choice.message.content)
            .map(|content| content.trim().to_owned())
            .filter(|content| !content.is_empty())
            .ok_or_else(|| {
                AppError::Unavailable(format!("{operation} returned an empty completion"))
            })?;

        info!(
            tenant_id = %request.tenant_id,
            model = self.model.as_str(),
            chars = summary.len(),
            "text summarized"
        );

        Ok(summary)
    }
}
