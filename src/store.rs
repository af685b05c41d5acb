//! Client for the external session store (transcripts, agents, sessions,
//! simulations, mediations, reputation events).
//!
//! Every write is best-effort: callers log a persistence failure and keep
//! going, because in-memory session state is authoritative. An empty base
//! URL disables the client entirely.

use crate::{
    error::{Result, UcpError},
    protocol::{Capabilities, UcpMessage},
    reputation::{ReputationEvent, TrustTier},
    simulation::{HistoricalContext, SimulationResult},
    AgentId, SessionId,
};
use reqwest::Client;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscriptRecord {
    pub session_id: SessionId,
    pub speaker_agent_id: AgentId,
    pub ucp_message: UcpMessage,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentRecord {
    pub id: AgentId,
    pub role: String,
    pub service_type: String,
    pub reputation_score: u8,
    pub trust_tier: TrustTier,
    pub capabilities: Capabilities,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionRecord {
    pub id: SessionId,
    pub buyer_agent_id: AgentId,
    pub seller_agent_id: AgentId,
    pub status: String,
    pub ucp_version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub escrow_amount: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MediationRecord {
    pub session_id: SessionId,
    pub mediator_agent_id: AgentId,
    pub outcome: String,
    pub proposal: crate::mediation::MediationProposal,
}

#[derive(Clone)]
pub struct StoreClient {
    base_url: String,
    api_key: Option<String>,
    client: Client,
}

impl StoreClient {
    pub fn new(base_url: &str, api_key: Option<String>) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            client: Client::new(),
        }
    }

    pub fn from_config(config: &crate::config::StoreConfig) -> Self {
        Self::new(&config.base_url, config.api_key.clone())
    }

    /// A client that drops every write and answers every query with
    /// `Persistence`. Used when no store is configured and in tests.
    pub fn disabled() -> Self {
        Self::new("", None)
    }

    pub fn is_enabled(&self) -> bool {
        !self.base_url.is_empty()
    }

    fn table_url(&self, table: &str) -> String {
        format!("{}/rest/v1/{}", self.base_url, table)
    }

    async fn post_json<T: Serialize>(&self, table: &str, body: &T) -> Result<()> {
        if !self.is_enabled() {
            return Err(UcpError::Persistence("store not configured".to_string()));
        }

        let mut request = self.client.post(self.table_url(table)).json(body);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request
            .send()
            .await
            .map_err(|e| UcpError::Persistence(e.to_string()))?;

        if !response.status().is_success() {
            return Err(UcpError::Persistence(format!(
                "store rejected write to '{}': {}",
                table,
                response.status()
            )));
        }
        Ok(())
    }

    async fn get_json<T: for<'de> Deserialize<'de>>(&self, path: &str) -> Result<T> {
        if !self.is_enabled() {
            return Err(UcpError::Persistence("store not configured".to_string()));
        }

        let mut request = self.client.get(format!("{}{}", self.base_url, path));
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request
            .send()
            .await
            .map_err(|e| UcpError::Persistence(e.to_string()))?;

        if !response.status().is_success() {
            return Err(UcpError::Persistence(format!(
                "store query '{}' failed: {}",
                path,
                response.status()
            )));
        }
        response
            .json()
            .await
            .map_err(|e| UcpError::Persistence(e.to_string()))
    }

    pub async fn append_transcript(&self, msg: &UcpMessage) -> Result<()> {
        let record = TranscriptRecord {
            session_id: msg.session_id.clone(),
            speaker_agent_id: msg.from.clone(),
            ucp_message: msg.clone(),
        };
        self.post_json("transcripts", &record).await
    }

    pub async fn upsert_agent(&self, record: &AgentRecord) -> Result<()> {
        self.post_json("agents", record).await
    }

    pub async fn upsert_session(&self, record: &SessionRecord) -> Result<()> {
        self.post_json("sessions", record).await
    }

    pub async fn record_reputation_event(&self, event: &ReputationEvent) -> Result<()> {
        self.post_json("reputation_events", event).await
    }

    pub async fn record_simulation(
        &self,
        session_id: &str,
        result: &SimulationResult,
    ) -> Result<()> {
        #[derive(Serialize)]
        struct SimulationRow<'a> {
            session_id: &'a str,
            #[serde(flatten)]
            result: &'a SimulationResult,
        }
        self.post_json(
            "simulations",
            &SimulationRow {
                session_id,
                result,
            },
        )
        .await
    }

    pub async fn record_mediation(&self, record: &MediationRecord) -> Result<()> {
        self.post_json("mediations", record).await
    }

    pub async fn query_transcripts(&self, session_id: &str) -> Result<Vec<TranscriptRecord>> {
        self.get_json(&format!(
            "/rest/v1/transcripts?session_id=eq.{}&order=created_at.asc",
            session_id
        ))
        .await
    }

    /// Summary of historical delivery and dispute rates used to seed the
    /// risk simulation.
    pub async fn historical_context(&self) -> Result<HistoricalContext> {
        self.get_json("/rest/v1/analytics/historical_context").await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_disabled_store_refuses_quietly() {
        let store = StoreClient::disabled();
        assert!(!store.is_enabled());

        let msg = UcpMessage::accept("a", "b", "NEG-1").unwrap();
        let err = store.append_transcript(&msg).await.unwrap_err();
        assert!(matches!(err, UcpError::Persistence(_)));

        let err = store.historical_context().await.unwrap_err();
        assert!(matches!(err, UcpError::Persistence(_)));
    }
}
