pub mod openai;

use std::sync::Arc;

use {once_cell::sync::Lazy, trinity_config::ProviderConfig};

use crate::model::LlmProvider;

static HTTP_CLIENT: Lazy<reqwest::Client> = Lazy::new(reqwest::Client::new);

/// Process-wide HTTP client so connection pools are shared across agents.
pub fn shared_http_client() -> &'static reqwest::Client {
    &HTTP_CLIENT
}

/// Build the OpenAI-compatible provider for one agent.
///
/// `model` and `temperature` override the provider-level defaults.
pub fn build_provider(
    config: &ProviderConfig,
    model: Option<&str>,
    temperature: Option<f32>,
) -> anyhow::Result<Arc<dyn LlmProvider>> {
    let api_key = config.resolve_api_key().ok_or_else(|| {
        anyhow::anyhow!(
            "no API key: set provider.api_key or the {} environment variable",
            config.api_key_env
        )
    })?;
    let provider = openai::OpenAiProvider::new(
        api_key,
        model.unwrap_or(&config.model).to_string(),
        config.base_url.trim_end_matches('/').to_string(),
    )
    .with_temperature(temperature.or(config.temperature));
    Ok(Arc::new(provider))
}

/// Split `<think>…</think>` blocks out of a reply.
///
/// Returns `(visible, thinking)`, both trimmed. An unterminated block hides
/// everything after its opening tag.
pub fn strip_think_tags(text: &str) -> (String, String) {
    const OPEN: &str = "<think>";
    const CLOSE: &str = "</think>";

    let mut visible = String::with_capacity(text.len());
    let mut thinking = String::new();
    let mut rest = text;

    while let Some(start) = rest.find(OPEN) {
        visible.push_str(&rest[..start]);
        let inner = &rest[start + OPEN.len()..];
        match inner.find(CLOSE) {
            Some(end) => {
                thinking.push_str(&inner[..end]);
                rest = &inner[end + CLOSE.len()..];
            },
            None => {
                thinking.push_str(inner);
                rest = "";
            },
        }
    }
    visible.push_str(rest);

    (visible.trim().to_string(), thinking.trim().to_string())
}

#[cfg(test)]
mod tests {
    use {super::*, secrecy::Secret};

    #[test]
    fn strips_think_block() {
        let (visible, thinking) = strip_think_tags("<think>hmm</think>\nChoice: respond");
        assert_eq!(visible, "Choice: respond");
        assert_eq!(thinking, "hmm");
    }

    #[test]
    fn unterminated_think_hides_tail() {
        let (visible, thinking) = strip_think_tags("Hi <think>never closed");
        assert_eq!(visible, "Hi");
        assert_eq!(thinking, "never closed");
    }

    #[test]
    fn build_requires_api_key() {
        let cfg = ProviderConfig {
            api_key: None,
            api_key_env: "TRINITY_TEST_NO_SUCH_KEY".into(),
            ..Default::default()
        };
        assert!(build_provider(&cfg, None, None).is_err());
    }

    #[test]
    fn build_applies_model_override() {
        let cfg = ProviderConfig {
            api_key: Some(Secret::new("sk-test".into())),
            ..Default::default()
        };
        let provider = build_provider(&cfg, Some("gpt-4o"), None).unwrap();
        assert_eq!(provider.id(), "gpt-4o");
        assert_eq!(provider.name(), "openai");
    }
}
