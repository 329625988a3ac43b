use {async_trait::async_trait, secrecy::ExposeSecret, tracing::{debug, trace, warn}};

#[cfg(feature = "metrics")]
use trinity_metrics::{counter, histogram, labels, llm as llm_metrics};

use crate::{
    model::{ChatMessage, CompletionResponse, LlmProvider, Usage},
    providers::{shared_http_client, strip_think_tags},
};

/// OpenAI chat-completions client. Works with any compatible endpoint
/// (OpenAI, Ollama, LM Studio, OpenRouter, ...).
pub struct OpenAiProvider {
    api_key: secrecy::Secret<String>,
    model: String,
    base_url: String,
    temperature: Option<f32>,
    client: &'static reqwest::Client,
}

impl OpenAiProvider {
    pub fn new(api_key: secrecy::Secret<String>, model: String, base_url: String) -> Self {
        Self {
            api_key,
            model,
            base_url,
            temperature: None,
            client: shared_http_client(),
        }
    }

    #[must_use]
    pub fn with_temperature(mut self, temperature: Option<f32>) -> Self {
        self.temperature = temperature;
        self
    }

    fn request_body(&self, messages: &[ChatMessage]) -> serde_json::Value {
        let mut body = serde_json::json!({
            "model": self.model,
            "messages": messages.iter().map(ChatMessage::to_openai_value).collect::<Vec<_>>(),
        });
        if let Some(t) = self.temperature {
            body["temperature"] = serde_json::json!(t);
        }
        body
    }
}

#[async_trait]
impl LlmProvider for OpenAiProvider {
    fn name(&self) -> &str {
        "openai"
    }

    fn id(&self) -> &str {
        &self.model
    }

    async fn complete(&self, messages: &[ChatMessage]) -> anyhow::Result<CompletionResponse> {
        let body = self.request_body(messages);

        debug!(
            model = %self.model,
            messages_count = messages.len(),
            "openai complete request"
        );
        trace!(body = %body, "openai request body");

        #[cfg(feature = "metrics")]
        let start = std::time::Instant::now();

        let http_resp = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .header(
                "Authorization",
                format!("Bearer {}", self.api_key.expose_secret()),
            )
            .header("content-type", "application/json")
            .json(&body)
            .send()
            .await?;

        let status = http_resp.status();
        if !status.is_success() {
            let body_text = http_resp.text().await.unwrap_or_default();
            warn!(status = %status, model = %self.model, body = %body_text, "openai API error");
            #[cfg(feature = "metrics")]
            counter!(llm_metrics::COMPLETION_ERRORS_TOTAL, labels::MODEL => self.model.clone())
                .increment(1);
            anyhow::bail!("OpenAI API error HTTP {status}: {body_text}");
        }

        let resp = http_resp.json::<serde_json::Value>().await?;
        trace!(response = %resp, "openai raw response");

        let text = resp["choices"][0]["message"]["content"]
            .as_str()
            .map(|s| strip_think_tags(s).0)
            .filter(|s| !s.is_empty());

        let usage = Usage {
            input_tokens: resp["usage"]["prompt_tokens"].as_u64().unwrap_or(0) as u32,
            output_tokens: resp["usage"]["completion_tokens"].as_u64().unwrap_or(0) as u32,
        };

        #[cfg(feature = "metrics")]
        {
            histogram!(llm_metrics::COMPLETION_DURATION_SECONDS, labels::MODEL => self.model.clone())
                .record(start.elapsed().as_secs_f64());
            counter!(llm_metrics::INPUT_TOKENS_TOTAL, labels::MODEL => self.model.clone())
                .increment(u64::from(usage.input_tokens));
            counter!(llm_metrics::OUTPUT_TOKENS_TOTAL, labels::MODEL => self.model.clone())
                .increment(u64::from(usage.output_tokens));
        }

        Ok(CompletionResponse { text, usage })
    }
}

#[cfg(test)]
mod tests {
    use {super::*, secrecy::Secret};

    fn provider(base_url: String) -> OpenAiProvider {
        OpenAiProvider::new(Secret::new("sk-test".into()), "gpt-test".into(), base_url)
    }

    #[test]
    fn body_includes_temperature_only_when_set() {
        let p = provider("http://localhost".into());
        let body = p.request_body(&[ChatMessage::user("hi")]);
        assert!(body.get("temperature").is_none());
        assert_eq!(body["messages"][0]["content"], "hi");

        let p = p.with_temperature(Some(0.5));
        let body = p.request_body(&[]);
        assert_eq!(body["temperature"], 0.5);
    }

    #[tokio::test]
    async fn parses_completion_and_strips_thinking() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/chat/completions")
            .match_header("authorization", "Bearer sk-test")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                r#"{"choices":[{"message":{"content":"<think>plan</think>Hello!"}}],
                    "usage":{"prompt_tokens":12,"completion_tokens":3}}"#,
            )
            .create_async()
            .await;

        let resp = provider(server.url())
            .complete(&[ChatMessage::user("hi")])
            .await
            .unwrap();

        mock.assert_async().await;
        assert_eq!(resp.text.as_deref(), Some("Hello!"));
        assert_eq!(resp.usage.input_tokens, 12);
        assert_eq!(resp.usage.output_tokens, 3);
    }

    #[tokio::test]
    async fn http_error_is_reported() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/chat/completions")
            .with_status(429)
            .with_body("slow down")
            .create_async()
            .await;

        let err = provider(server.url())
            .complete(&[ChatMessage::user("hi")])
            .await
            .unwrap_err();
        assert!(err.to_string().contains("429"));
        assert!(err.to_string().contains("slow down"));
    }
}
