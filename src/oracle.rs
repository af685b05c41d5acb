//! External natural-language decision oracle.
//!
//! The oracle is consulted over an OpenAI-compatible chat-completions API.
//! Every call site supplies a deterministic fallback: an unavailable oracle,
//! a timeout or a malformed reply degrades to the fallback and negotiation
//! continues. No decision point depends on the oracle being up.

use crate::{
    config::OracleConfig,
    error::{Result, UcpError},
    protocol::Terms,
};
use reqwest::Client;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DecisionAction {
    Accept,
    Counter,
    Reject,
}

/// Terms as drafted by the oracle (or a fallback) before they are completed
/// into full [`Terms`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TermsDraft {
    pub price: f64,
    pub delivery_days: u32,
    #[serde(default)]
    pub penalty_per_day: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasoning: Option<String>,
}

impl TermsDraft {
    pub fn into_terms(self, service_type: &str) -> Terms {
        Terms {
            price: self.price,
            delivery_days: self.delivery_days,
            penalty_per_day: self.penalty_per_day,
            service_type: service_type.to_string(),
            escrow: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NegotiationDecision {
    pub action: DecisionAction,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub terms: Option<TermsDraft>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl NegotiationDecision {
    pub fn accept() -> Self {
        Self {
            action: DecisionAction::Accept,
            terms: None,
            reason: None,
        }
    }

    pub fn counter(terms: TermsDraft) -> Self {
        Self {
            action: DecisionAction::Counter,
            terms: Some(terms),
            reason: None,
        }
    }

    pub fn reject(reason: String) -> Self {
        Self {
            action: DecisionAction::Reject,
            terms: None,
            reason: Some(reason),
        }
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    max_tokens: u32,
    temperature: f64,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
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

#[derive(Clone)]
pub struct DecisionOracle {
    client: Client,
    config: OracleConfig,
}

impl DecisionOracle {
    pub fn new(config: OracleConfig) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds.max(1)))
            .build()
            .unwrap_or_default();
        Self { client, config }
    }

    pub fn is_configured(&self) -> bool {
        self.config
            .api_key
            .as_deref()
            .map(|k| !k.is_empty())
            .unwrap_or(false)
    }

    /// One chat completion round-trip.
    pub async fn complete(&self, system: &str, prompt: &str) -> Result<String> {
        let api_key = self
            .config
            .api_key
            .as_deref()
            .filter(|k| !k.is_empty())
            .ok_or_else(|| UcpError::OracleUnavailable("no API key configured".to_string()))?;

        let request = ChatRequest {
            model: &self.config.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: system,
                },
                ChatMessage {
                    role: "user",
                    content: prompt,
                },
            ],
            max_tokens: self.config.max_tokens,
            temperature: self.config.temperature,
        };

        let response = self
            .client
            .post(format!(
                "{}/chat/completions",
                self.config.api_base.trim_end_matches('/')
            ))
            .bearer_auth(api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| UcpError::OracleUnavailable(e.to_string()))?;

        if !response.status().is_success() {
            return Err(UcpError::OracleUnavailable(format!(
                "oracle returned {}",
                response.status()
            )));
        }

        let body: ChatResponse = response
            .json()
            .await
            .map_err(|e| UcpError::OracleUnavailable(e.to_string()))?;

        body.choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .filter(|c| !c.is_empty())
            .ok_or_else(|| UcpError::OracleUnavailable("empty completion".to_string()))
    }

    /// Ask the oracle for a structured decision and parse its reply as JSON.
    pub async fn decide<T: DeserializeOwned>(&self, system: &str, prompt: &str) -> Result<T> {
        let raw = self.complete(system, prompt).await?;
        let json = extract_json(&raw)
            .ok_or_else(|| UcpError::OracleUnavailable("reply contains no JSON".to_string()))?;
        serde_json::from_str(json)
            .map_err(|e| UcpError::OracleUnavailable(format!("malformed decision: {}", e)))
    }

    /// The mandatory-fallback call pattern: any oracle failure is logged and
    /// the deterministic fallback decides instead.
    pub async fn decide_or<T, F>(&self, system: &str, prompt: &str, fallback: F) -> T
    where
        T: DeserializeOwned,
        F: FnOnce() -> T,
    {
        match self.decide(system, prompt).await {
            Ok(decision) => decision,
            Err(e) => {
                tracing::warn!(error = %e, "oracle unavailable, using deterministic fallback");
                fallback()
            }
        }
    }
}

/// Locate the JSON object in a model reply, tolerating fenced code blocks
/// and surrounding prose.
fn extract_json(raw: &str) -> Option<&str> {
    let start = raw.find('{')?;
    let end = raw.rfind('}')?;
    if end < start {
        return None;
    }
    Some(&raw[start..=end])
}
