use anyhow::{Context, Result};
use async_trait::async_trait;
use journal_composer::Prompt;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Chat-completion backend that answers a prompt with one JSON object.
/// The JSON shape is requested by the prompt, not enforced here.
#[async_trait]
pub trait ChatModel: Send + Sync {
    async fn complete_json(&self, prompt: &Prompt) -> Result<String>;

    /// Label used in logs
    fn describe(&self) -> String;
}

/// Configuration for the chat model
#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub provider: LlmProvider,
    pub api_key: Option<String>,
    pub base_url: String,
    pub model: String,
    pub timeout_secs: u64,
    pub max_tokens: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub enum LlmProvider {
    Ollama,
    OpenAI,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: LlmProvider::OpenAI,
            api_key: None,
            base_url: "https://api.openai.com".to_string(),
            model: "gpt-4o-mini".to_string(),
            timeout_secs: 60,
            max_tokens: 2048,
        }
    }
}

impl LlmConfig {
    /// Create config from environment variables
    pub fn from_env() -> Result<Self> {
        Self::from_vars(|key| std::env::var(key).ok())
    }

    /// Same as [`LlmConfig::from_env`] with an explicit variable source
    pub fn from_vars<F>(var: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let provider = match var("LLM_PROVIDER")
            .unwrap_or_else(|| "openai".to_string())
            .to_lowercase()
            .as_str()
        {
            "ollama" => LlmProvider::Ollama,
            "openai" => LlmProvider::OpenAI,
            other => anyhow::bail!("Unknown LLM_PROVIDER '{}' (expected openai or ollama)", other),
        };

        let (base_url, model) = match provider {
            LlmProvider::Ollama => (
                var("OLLAMA_URL").unwrap_or_else(|| "http://localhost:11434".to_string()),
                var("OLLAMA_MODEL").unwrap_or_else(|| "llama3.2:3b".to_string()),
            ),
            LlmProvider::OpenAI => (
                var("OPENAI_BASE_URL").unwrap_or_else(|| "https://api.openai.com".to_string()),
                var("OPENAI_MODEL").unwrap_or_else(|| "gpt-4o-mini".to_string()),
            ),
        };

        let api_key = if provider == LlmProvider::OpenAI {
            Some(var("OPENAI_API_KEY").context("OPENAI_API_KEY required for OpenAI provider")?)
        } else {
            None
        };

        let timeout_secs = match var("LLM_TIMEOUT_SECS") {
            Some(raw) => raw
                .parse()
                .with_context(|| format!("LLM_TIMEOUT_SECS must be a number, got '{}'", raw))?,
            None => 60,
        };

        Ok(Self {
            provider,
            api_key,
            base_url: base_url.trim_end_matches('/').to_string(),
            model,
            timeout_secs,
            max_tokens: 2048,
        })
    }
}

/// Build the client for the configured provider. Called once at startup.
pub fn connect(config: &LlmConfig) -> Result<Arc<dyn ChatModel>> {
    let client = Client::builder()
        .timeout(Duration::from_secs(config.timeout_secs))
        .build()
        .context("Failed to build HTTP client")?;

    let model: Arc<dyn ChatModel> = match config.provider {
        LlmProvider::OpenAI => Arc::new(OpenAIChatModel {
            client,
            config: config.clone(),
        }),
        LlmProvider::Ollama => Arc::new(OllamaChatModel {
            client,
            config: config.clone(),
        }),
    };

    Ok(model)
}

/// OpenAI-compatible `/v1/chat/completions` in JSON mode
pub struct OpenAIChatModel {
    client: Client,
    config: LlmConfig,
}

#[async_trait]
impl ChatModel for OpenAIChatModel {
    async fn complete_json(&self, prompt: &Prompt) -> Result<String> {
        let url = format!("{}/v1/chat/completions", self.config.base_url);

        let request_body = json!({
            "model": self.config.model,
            "messages": [
                { "role": "system", "content": prompt.system },
                { "role": "user", "content": prompt.user }
            ],
            "temperature": prompt.temperature,
            "max_tokens": self.config.max_tokens,
            "response_format": { "type": "json_object" }
        });

        debug!("Calling OpenAI at {}", url);

        let mut request = self.client.post(&url).json(&request_body);

        if let Some(ref api_key) = self.config.api_key {
            request = request.bearer_auth(api_key);
        }

        let response = request.send().await.context("Failed to call OpenAI API")?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            anyhow::bail!("OpenAI API error {}: {}", status, error_text);
        }

        #[derive(Deserialize)]
        struct OpenAIResponse {
            choices: Vec<OpenAIChoice>,
        }

        #[derive(Deserialize)]
        struct OpenAIChoice {
            message: OpenAIMessage,
        }

        #[derive(Deserialize)]
        struct OpenAIMessage {
            content: Option<String>,
        }

        let openai_response: OpenAIResponse = response
            .json()
            .await
            .context("Failed to parse OpenAI response")?;

        openai_response
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| anyhow::anyhow!("No response from OpenAI"))
    }

    fn describe(&self) -> String {
        format!("openai:{}", self.config.model)
    }
}

/// Local Ollama `/api/generate` with JSON output
pub struct OllamaChatModel {
    client: Client,
    config: LlmConfig,
}

#[async_trait]
impl ChatModel for OllamaChatModel {
    async fn complete_json(&self, prompt: &Prompt) -> Result<String> {
        let url = format!("{}/api/generate", self.config.base_url);

        let request_body = json!({
            "model": self.config.model,
            "system": prompt.system,
            "prompt": prompt.user,
            "stream": false,
            "format": "json",
            "options": {
                "temperature": prompt.temperature,
                "num_predict": self.config.max_tokens,
            }
        });

        debug!("Calling Ollama at {}", url);

        let response = self
            .client
            .post(&url)
            .json(&request_body)
            .send()
            .await
            .context("Failed to call Ollama API")?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            anyhow::bail!("Ollama API error {}: {}", status, error_text);
        }

        #[derive(Deserialize)]
        struct OllamaResponse {
            response: String,
        }

        let ollama_response: OllamaResponse = response
            .json()
            .await
            .context("Failed to parse Ollama response")?;

        Ok(ollama_response.response)
    }

    fn describe(&self) -> String {
        format!("ollama:{}", self.config.model)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn vars(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_config_for_ollama() {
        let config = LlmConfig::from_vars(vars(&[
            ("LLM_PROVIDER", "ollama"),
            ("OLLAMA_URL", "http://localhost:11434/"),
            ("OLLAMA_MODEL", "llama3.2:3b"),
        ]))
        .unwrap();

        assert_eq!(config.provider, LlmProvider::Ollama);
        assert_eq!(config.base_url, "http://localhost:11434");
        assert_eq!(config.model, "llama3.2:3b");
        assert!(config.api_key.is_none());
    }

    #[test]
    fn test_openai_requires_api_key() {
        let missing = LlmConfig::from_vars(vars(&[("LLM_PROVIDER", "openai")]));
        assert!(missing.is_err());

        let config = LlmConfig::from_vars(vars(&[
            ("OPENAI_API_KEY", "sk-test"),
            ("LLM_TIMEOUT_SECS", "15"),
        ]))
        .unwrap();
        assert_eq!(config.provider, LlmProvider::OpenAI);
        assert_eq!(config.model, "gpt-4o-mini");
        assert_eq!(config.timeout_secs, 15);
    }

    #[test]
    fn test_unknown_provider_is_rejected() {
        assert!(LlmConfig::from_vars(vars(&[("LLM_PROVIDER", "carrier-pigeon")])).is_err());
    }

    #[test]
    fn test_connect_picks_provider() {
        let config = LlmConfig {
            provider: LlmProvider::Ollama,
            model: "llama3.2:3b".to_string(),
            ..LlmConfig::default()
        };

        let model = connect(&config).unwrap();
        assert_eq!(model.describe(), "ollama:llama3.2:3b");
    }
}
