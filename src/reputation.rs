//! Bounded per-agent reputation with derived trust tiers.

use crate::{store::StoreClient, AgentId, SessionId};
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

/// Derived reputation bucket. Boundaries follow the protocol defaults:
/// score >= 71 is GOLD, >= 41 is SILVER, everything else BRONZE.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TrustTier {
    Gold,
    Silver,
    Bronze,
}

impl TrustTier {
    pub fn from_score(score: u8) -> Self {
        match score {
            71..=u8::MAX => TrustTier::Gold,
            41..=70 => TrustTier::Silver,
            _ => TrustTier::Bronze,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReputationEventType {
    NegotiationSuccess,
    NegotiationFailed,
    MediationSuccess,
    MediationRejected,
    SystemAdjustment,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReputationEvent {
    pub agent_id: AgentId,
    pub event_type: ReputationEventType,
    pub score_delta: i32,
    pub new_score: u8,
    pub session_id: SessionId,
    pub timestamp: DateTime<Utc>,
}

/// In-memory reputation scores, clamped to [0, 100] on every update.
///
/// The in-memory score is authoritative: event persistence to the external
/// store is best-effort and its failure never rolls an update back.
#[derive(Clone)]
pub struct ReputationLedger {
    scores: Arc<RwLock<HashMap<AgentId, u8>>>,
    initial_score: u8,
    store: StoreClient,
}

impl ReputationLedger {
    pub fn new(initial_score: u8, store: StoreClient) -> Self {
        Self {
            scores: Arc::new(RwLock::new(HashMap::new())),
            initial_score: initial_score.min(100),
            store,
        }
    }

    pub fn score(&self, agent_id: &str) -> u8 {
        self.scores
            .read()
            .get(agent_id)
            .copied()
            .unwrap_or(self.initial_score)
    }

    pub fn tier(&self, agent_id: &str) -> TrustTier {
        TrustTier::from_score(self.score(agent_id))
    }

    /// Apply a delta and return the clamped new score. Always succeeds
    /// locally.
    pub async fn update(
        &self,
        agent_id: &str,
        delta: i32,
        session_id: &str,
        event_type: ReputationEventType,
    ) -> u8 {
        let new_score = {
            let mut scores = self.scores.write();
            let current = scores.get(agent_id).copied().unwrap_or(self.initial_score);
            let updated = (current as i32 + delta).clamp(0, 100) as u8;
            scores.insert(agent_id.to_string(), updated);
            updated
        };

        tracing::info!(
            agent = agent_id,
            session = session_id,
            delta,
            new_score,
            event = ?event_type,
            "reputation updated"
        );

        let event = ReputationEvent {
            agent_id: agent_id.to_string(),
            event_type,
            score_delta: delta,
            new_score,
            session_id: session_id.to_string(),
            timestamp: Utc::now(),
        };
        if let Err(e) = self.store.record_reputation_event(&event).await {
            tracing::warn!(agent = agent_id, error = %e, "reputation event not persisted");
        }

        new_score
    }
}
