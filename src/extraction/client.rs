use crate::error::{PnlError, Result};
use crate::extraction::types::*;
use log::debug;
use reqwest::Client;
use std::time::Duration;

const GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(120);

#[derive(Clone)]
pub struct GeminiClient {
    client: Client,
    api_key: String,
    base_url: String,
    timeout: Duration,
}

impl GeminiClient {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            api_key: api_key.into(),
            base_url: GEMINI_BASE_URL.to_string(),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Upper bound for one request, including reading the response body.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Sends one `generateContent` call and returns the first text part of the reply.
    pub async fn generate_content(
        &self,
        model: &str,
        system_prompt: &str,
        messages: Vec<Content>,
    ) -> Result<String> {
        match tokio::time::timeout(
            self.timeout,
            self.send_request(model, system_prompt, messages),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(PnlError::ExtractionFailed(format!(
                "Gemini request timed out after {}s",
                self.timeout.as_secs()
            ))),
        }
    }

    async fn send_request(
        &self,
        model: &str,
        system_prompt: &str,
        messages: Vec<Content>,
    ) -> Result<String> {
        let url = format!(
            "{}/models/{}:generateContent?key={}",
            self.base_url, model, self.api_key
        );

        let payload = GenerateContentRequest {
            contents: messages,
            system_instruction: Some(Content::user(vec![Part::text(system_prompt)])),
            generation_config: GenerationConfig {
                response_mime_type: "application/json".to_string(),
                temperature: 0.0,
            },
        };

        debug!("Calling Gemini model {}", model);
        let res = self
            .client
            .post(&url)
            .json(&payload)
            .send()
            .await
            .map_err(transport_error)?;
        let status = res.status();

        if !status.is_success() {
            let err_text = res.text().await.map_err(transport_error)?;
            return Err(PnlError::ExtractionFailed(format!(
                "Gemini API Error (status {}): {}",
                status, err_text
            )));
        }

        let body: GenerateContentResponse = res.json().await.map_err(transport_error)?;
        first_text(body)
    }
}

fn transport_error(err: reqwest::Error) -> PnlError {
    PnlError::ExtractionFailed(format!("Gemini request failed: {}", err))
}

fn first_text(body: GenerateContentResponse) -> Result<String> {
    let part = body
        .candidates
        .ok_or_else(|| PnlError::ExtractionFailed("No candidates returned".to_string()))?
        .into_iter()
        .next()
        .ok_or_else(|| PnlError::ExtractionFailed("Empty candidates list".to_string()))?
        .content
        .parts
        .into_iter()
        .next()
        .ok_or_else(|| PnlError::ExtractionFailed("No parts in content".to_string()))?;

    match part {
        Part::Text { text } => Ok(text),
        _ => Err(PnlError::ExtractionFailed(
            "Model returned non-text content".to_string(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_text() {
        let body: GenerateContentResponse = serde_json::from_str(
            r#"{"candidates":[{"content":{"role":"model","parts":[{"text":"[{\"a\":1}]"}]}}]}"#,
        )
        .unwrap();
        assert_eq!(first_text(body).unwrap(), "[{\"a\":1}]");
    }

    #[test]
    fn test_first_text_without_candidates() {
        let body: GenerateContentResponse = serde_json::from_str("{}").unwrap();
        assert!(matches!(
            first_text(body),
            Err(PnlError::ExtractionFailed(_))
        ));
    }
}
