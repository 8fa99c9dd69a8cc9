//! Provider groups, chat-completion wire types, and the HTTP backend.
//!
//! Both provider groups speak the OpenAI-shaped chat-completions dialect, so
//! one request/response pair covers the wire. Requests are fire-and-wait: no
//! streaming, one JSON body in, one JSON body out. The `CompletionBackend`
//! trait is the seam the dispatch engine calls through, so tests can swap the
//! network out for a scripted backend.

use std::collections::HashMap;

use async_trait::async_trait;
use clap::ValueEnum;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::error::ArenaError;

/// Which model catalog a panel draws from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, ValueEnum, Serialize, Deserialize)]
pub enum Provider {
    Groq,
    Openai,
}

impl Provider {
    pub const ALL: [Provider; 2] = [Provider::Groq, Provider::Openai];

    /// Display name matching the original dropdown labels.
    pub fn label(&self) -> &'static str {
        match self {
            Provider::Groq => "Groq",
            Provider::Openai => "OpenAI",
        }
    }

    pub fn default_base_url(&self) -> &'static str {
        match self {
            Provider::Groq => "https://api.groq.com/openai/v1",
            Provider::Openai => "https://api.openai.com/v1",
        }
    }

    /// Environment variable conventionally holding this provider's key.
    pub fn key_env(&self) -> &'static str {
        match self {
            Provider::Groq => "GROQ_API_KEY",
            Provider::Openai => "OPENAI_API_KEY",
        }
    }
}

impl std::fmt::Display for Provider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Provider::Groq => write!(f, "groq"),
            Provider::Openai => write!(f, "openai"),
        }
    }
}

// -- Chat completion wire types ---------------------------------------------

#[derive(Debug, Clone, Serialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

#[derive(Debug, Serialize)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
}

#[derive(Debug, Deserialize)]
pub struct ChoiceMessage {
    pub content: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct Choice {
    pub message: ChoiceMessage,
}

/// Usage metrics snapshot (Groq shape; every field optional so the OpenAI
/// subset parses too). Display-only — nothing downstream depends on it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CompletionUsage {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub queue_time: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt_tokens: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt_time: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completion_tokens: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completion_time: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_tokens: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_time: Option<f64>,
}

#[derive(Debug, Deserialize)]
pub struct ChatCompletion {
    pub choices: Vec<Choice>,
    #[serde(default)]
    pub usage: Option<CompletionUsage>,
}

// -- Models listing wire types ----------------------------------------------

#[derive(Debug, Deserialize)]
pub struct ModelEntry {
    pub id: String,
}

#[derive(Debug, Deserialize)]
pub struct ModelList {
    pub data: Vec<ModelEntry>,
}

// -- Backend seam ------------------------------------------------------------

/// One resolved completion: the assistant text plus optional usage metrics.
#[derive(Debug, Clone)]
pub struct Completion {
    pub text: String,
    pub usage: Option<CompletionUsage>,
}

/// The dispatch engine's view of a model endpoint. Implemented by
/// [`HttpBackend`] for real traffic and by scripted fakes in tests.
#[async_trait]
pub trait CompletionBackend: Send + Sync {
    async fn complete(
        &self,
        provider: Provider,
        model: &str,
        question: &str,
    ) -> Result<Completion, ArenaError>;
}

/// Base URL and bearer credential for one provider.
#[derive(Debug, Clone)]
pub struct Endpoint {
    pub base_url: String,
    pub api_key: String,
}

/// reqwest-backed implementation talking to the configured providers.
pub struct HttpBackend {
    client: Client,
    endpoints: HashMap<Provider, Endpoint>,
}

impl HttpBackend {
    pub fn new(endpoints: HashMap<Provider, Endpoint>) -> Self {
        HttpBackend {
            client: Client::new(),
            endpoints,
        }
    }

    /// Providers this backend holds credentials for.
    pub fn configured_providers(&self) -> Vec<Provider> {
        let mut providers: Vec<Provider> = Provider::ALL
            .into_iter()
            .filter(|p| self.endpoints.contains_key(p))
            .collect();
        providers.sort_by_key(|p| p.to_string());
        providers
    }

    fn endpoint(&self, provider: Provider) -> Result<&Endpoint, ArenaError> {
        self.endpoints.get(&provider).ok_or_else(|| {
            ArenaError::Config(format!(
                "{} not set. Export it or pass via environment.",
                provider.key_env()
            ))
        })
    }

    /// Fetch the raw model-id list for one provider. Only `id` is used.
    pub async fn list_models(&self, provider: Provider) -> Result<Vec<String>, ArenaError> {
        let ep = self.endpoint(provider)?;
        let response = self
            .client
            .get(format!("{}/models", ep.base_url))
            .header("Authorization", format!("Bearer {}", ep.api_key))
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await?;
            return Err(ArenaError::Provider {
                provider: provider.to_string(),
                status,
                body,
            });
        }

        let list: ModelList = response.json().await?;
        Ok(list.data.into_iter().map(|m| m.id).collect())
    }
}

#[async_trait]
impl CompletionBackend for HttpBackend {
    async fn complete(
        &self,
        provider: Provider,
        model: &str,
        question: &str,
    ) -> Result<Completion, ArenaError> {
        let ep = self.endpoint(provider)?;
        let request = ChatRequest {
            model: model.to_string(),
            messages: vec![ChatMessage {
                role: "user".to_string(),
                content: question.to_string(),
            }],
        };

        let response = self
            .client
            .post(format!("{}/chat/completions", ep.base_url))
            .header("Authorization", format!("Bearer {}", ep.api_key))
            .header("Content-Type", "application/json")
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await?;
            return Err(ArenaError::Provider {
                provider: provider.to_string(),
                status,
                body,
            });
        }

        let completion: ChatCompletion = response.json().await?;
        let text = completion
            .choices
            .first()
            .and_then(|c| c.message.content.clone())
            .unwrap_or_default();

        Ok(Completion {
            text,
            usage: completion.usage,
        })
    }
}
