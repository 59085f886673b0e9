//! Chat-completions reviewer client

use std::time::Duration;

use async_trait::async_trait;
use codegate_core::config::ReviewerConfig;
use codegate_core::{Message, Provider, Reviewer, ReviewerResponse, ToolDefinition};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use tracing::{debug, info};
use url::Url;

use crate::wire::{error_message, ChatRequest, ChatResponse};
use crate::{Error, Result};

/// Reviewer backed by an OpenAI-compatible `/chat/completions` endpoint
pub struct ChatReviewer {
    http: reqwest::Client,
    endpoint: Url,
    provider: Provider,
    model: String,
    temperature: Option<f32>,
    max_tokens: Option<u32>,
}

impl ChatReviewer {
    /// Create a reviewer for `base_url`
    ///
    /// The API key, when given, is sent as a bearer token.
    pub fn new(
        provider: Provider,
        base_url: &str,
        model: impl Into<String>,
        api_key: Option<&str>,
        timeout: Duration,
    ) -> Result<Self> {
        let endpoint = chat_endpoint(base_url)?;

        let mut headers = HeaderMap::new();
        if let Some(key) = api_key {
            let mut value = HeaderValue::from_str(&format!("Bearer {key}"))
                .map_err(|e| Error::Config(format!("Invalid API key: {e}")))?;
            value.set_sensitive(true);
            headers.insert(AUTHORIZATION, value);
        }

        let http = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(timeout)
            .build()?;

        Ok(Self {
            http,
            endpoint,
            provider,
            model: model.into(),
            temperature: None,
            max_tokens: None,
        })
    }

    /// Create a reviewer from the `[reviewer]` config section
    ///
    /// Fails when the provider needs an API key and none is configured.
    pub fn from_config(config: &ReviewerConfig) -> Result<Self> {
        let model = config.resolved_model()?;
        let api_key = config.resolved_api_key();
        if api_key.is_none() && config.provider.requires_api_key() {
            return Err(Error::MissingApiKey {
                provider: config.provider.to_string(),
                env: config
                    .resolved_api_key_env()
                    .unwrap_or_else(|| "an API key variable".to_string()),
            });
        }

        let reviewer = Self::new(
            config.provider,
            &config.resolved_base_url(),
            model,
            api_key.as_deref(),
            config.timeout,
        )?
        .with_sampling(config.temperature, config.max_tokens);

        info!(
            provider = %reviewer.provider,
            model = %reviewer.model,
            endpoint = %reviewer.endpoint,
            "Created reviewer client"
        );
        Ok(reviewer)
    }

    pub fn with_sampling(mut self, temperature: Option<f32>, max_tokens: Option<u32>) -> Self {
        self.temperature = temperature;
        self.max_tokens = max_tokens;
        self
    }

    pub fn provider(&self) -> Provider {
        self.provider
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    async fn complete(
        &self,
        messages: &[Message],
        tools: &[ToolDefinition],
    ) -> Result<ReviewerResponse> {
        let mut request = ChatRequest::new(&self.model, messages, tools);
        request.temperature = self.temperature;
        request.max_tokens = self.max_tokens;

        debug!(
            provider = %self.provider,
            model = %self.model,
            messages = messages.len(),
            tools = tools.len(),
            "Calling reviewer"
        );

        let response = self
            .http
            .post(self.endpoint.clone())
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Api {
                status: status.as_u16(),
                message: error_message(&body),
            });
        }

        let body: ChatResponse = response
            .json()
            .await
            .map_err(|e| Error::Parse(format!("Failed to parse chat response: {e}")))?;
        let choice = body
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| Error::Parse("Chat response has no choices".to_string()))?;

        let parsed = ReviewerResponse::from(choice.message);
        debug!(
            tool_calls = parsed.tool_calls.len(),
            has_text = parsed.text.is_some(),
            "Reviewer responded"
        );
        Ok(parsed)
    }
}

#[async_trait]
impl Reviewer for ChatReviewer {
    fn name(&self) -> &str {
        self.provider.name()
    }

    fn model(&self) -> &str {
        &self.model
    }

    async fn call(
        &self,
        messages: &[Message],
        tools: &[ToolDefinition],
    ) -> codegate_core::Result<ReviewerResponse> {
        Ok(self.complete(messages, tools).await?)
    }
}

impl std::fmt::Debug for ChatReviewer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatReviewer")
            .field("provider", &self.provider)
            .field("model", &self.model)
            .field("endpoint", &self.endpoint.as_str())
            .finish_non_exhaustive()
    }
}

/// `<base_url>/chat/completions`
fn chat_endpoint(base_url: &str) -> Result<Url> {
    let joined = format!("{}/chat/completions", base_url.trim_end_matches('/'));
    Url::parse(&joined).map_err(|source| Error::InvalidUrl {
        url: base_url.to_string(),
        source,
    })
}
