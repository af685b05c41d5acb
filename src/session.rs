//! In-process registry of active negotiation sessions.
//!
//! Sessions are created on the first PROPOSAL or DISCOVER referencing an
//! unseen session ID and retired, never deleted, once a terminal status is
//! reached.

use crate::{
    protocol::{MessageType, OfferPayload, UcpMessage},
    error::{Result, UcpError},
    simulation::SimulationResult,
    AgentId, SessionId,
};
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Discovering,
    Negotiating,
    Mediating,
    Accepted,
    Rejected,
    Settled,
}

impl SessionStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SessionStatus::Accepted | SessionStatus::Rejected | SessionStatus::Settled
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Participants {
    pub buyer: AgentId,
    pub seller: AgentId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mediator: Option<AgentId>,
}

/// One offer extracted from a session's PROPOSAL/COUNTER history, in
/// chronological order.
#[derive(Debug, Clone, PartialEq)]
pub struct Offer {
    pub agent: AgentId,
    pub price: f64,
    pub delivery_days: u32,
    pub penalty_per_day: f64,
}

#[derive(Debug, Clone)]
pub struct Session {
    pub id: SessionId,
    pub participants: Participants,
    pub status: SessionStatus,
    pub history: Vec<UcpMessage>,
    pub last_offer_by_participant: HashMap<AgentId, OfferPayload>,
    pub last_simulation: Option<SimulationResult>,
    pub retired: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Session {
    pub fn new(id: &str, buyer: &str, seller: &str) -> Self {
        let now = Utc::now();
        Self {
            id: id.to_string(),
            participants: Participants {
                buyer: buyer.to_string(),
                seller: seller.to_string(),
                mediator: None,
            },
            status: SessionStatus::Negotiating,
            history: Vec::new(),
            last_offer_by_participant: HashMap::new(),
            last_simulation: None,
            retired: false,
            created_at: now,
            updated_at: now,
        }
    }

    /// Append a message to the ordered history, tracking the sender's last
    /// offer when the message carries one.
    pub fn record(&mut self, msg: &UcpMessage) {
        if msg.message_type.is_offer() {
            if let Ok(payload) = msg.offer_payload() {
                self.last_offer_by_participant
                    .insert(msg.from.clone(), payload);
            }
        }
        if msg.message_type == MessageType::Mediate {
            self.participants.mediator = Some(msg.from.clone());
        }
        self.history.push(msg.clone());
        self.updated_at = Utc::now();
    }

    pub fn set_status(&mut self, status: SessionStatus) {
        self.status = status;
        self.updated_at = Utc::now();
    }

    /// The chronological PROPOSAL/COUNTER offer history.
    pub fn offers(&self) -> Vec<Offer> {
        self.history
            .iter()
            .filter(|m| m.message_type.is_offer())
            .filter_map(|m| {
                let payload = m.offer_payload().ok()?;
                Some(Offer {
                    agent: m.from.clone(),
                    price: payload.price,
                    delivery_days: payload.delivery_days,
                    penalty_per_day: payload.penalty_per_day,
                })
            })
            .collect()
    }

    /// The sender's most recent offer, as it arrived on the wire.
    pub fn last_offer_of(&self, agent: &str) -> Option<&OfferPayload> {
        self.last_offer_by_participant.get(agent)
    }
}

/// Arena-style session table. Retirement is explicit: terminal sessions stay
/// queryable but are flagged so handlers stop mutating them.
#[derive(Clone, Default)]
pub struct SessionRegistry {
    inner: Arc<RwLock<HashMap<SessionId, Session>>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create the session unless it already exists. Only the PROPOSAL and
    /// DISCOVER paths may call this; every other message type requires an
    /// existing session.
    pub fn create_if_absent(&self, id: &str, buyer: &str, seller: &str) {
        let mut sessions = self.inner.write();
        sessions
            .entry(id.to_string())
            .or_insert_with(|| Session::new(id, buyer, seller));
    }

    pub fn contains(&self, id: &str) -> bool {
        self.inner.read().contains_key(id)
    }

    /// Run a closure against a session, or fail with `SessionNotFound`.
    pub fn with<R>(&self, id: &str, f: impl FnOnce(&mut Session) -> R) -> Result<R> {
        let mut sessions = self.inner.write();
        let session = sessions
            .get_mut(id)
            .ok_or_else(|| UcpError::SessionNotFound(id.to_string()))?;
        Ok(f(session))
    }

    pub fn snapshot(&self, id: &str) -> Option<Session> {
        self.inner.read().get(id).cloned()
    }

    pub fn offers(&self, id: &str) -> Result<Vec<Offer>> {
        self.with(id, |s| s.offers())
    }

    /// Flag a terminal session as retired. The record is kept.
    pub fn retire(&self, id: &str) -> Result<()> {
        self.with(id, |s| {
            s.retired = true;
            s.updated_at = Utc::now();
        })
    }

    pub fn active_ids(&self) -> Vec<SessionId> {
        self.inner
            .read()
            .values()
            .filter(|s| !s.retired)
            .map(|s| s.id.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.inner.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::Terms;

    fn terms(price: f64, days: u32) -> Terms {
        Terms {
            price,
            delivery_days: days,
            penalty_per_day: 15.0,
            service_type: "data_delivery".to_string(),
            escrow: true,
        }
    }

    #[test]
    fn test_create_and_retire() {
        let registry = SessionRegistry::new();
        registry.create_if_absent("NEG-1", "BUYER-1", "SELLER-1");
        assert!(registry.contains("NEG-1"));

        // Re-creating must not reset state.
        registry
            .with("NEG-1", |s| s.set_status(SessionStatus::Mediating))
            .unwrap();
        registry.create_if_absent("NEG-1", "BUYER-2", "SELLER-2");
        let snapshot = registry.snapshot("NEG-1").unwrap();
        assert_eq!(snapshot.status, SessionStatus::Mediating);
        assert_eq!(snapshot.participants.buyer, "BUYER-1");

        registry.with("NEG-1", |s| s.set_status(SessionStatus::Accepted)).unwrap();
        registry.retire("NEG-1").unwrap();

        // Retired, not deleted.
        assert!(registry.contains("NEG-1"));
        assert!(registry.snapshot("NEG-1").unwrap().retired);
        assert!(registry.active_ids().is_empty());
    }

    #[test]
    fn test_unknown_session_errors() {
        let registry = SessionRegistry::new();
        let err = registry.with("NEG-404", |_| ()).unwrap_err();
        assert!(matches!(err, UcpError::SessionNotFound(id) if id == "NEG-404"));
    }

    #[test]
    fn test_offer_history_extraction() {
        let registry = SessionRegistry::new();
        registry.create_if_absent("NEG-1", "BUYER-1", "SELLER-1");

        let proposal =
            UcpMessage::proposal("BUYER-1", "SELLER-1", "NEG-1", &terms(240.0, 5)).unwrap();
        let counter =
            UcpMessage::counter("SELLER-1", "BUYER-1", "NEG-1", &terms(290.0, 3), None).unwrap();
        let accept = UcpMessage::accept("BUYER-1", "SELLER-1", "NEG-1").unwrap();

        registry
            .with("NEG-1", |s| {
                s.record(&proposal);
                s.record(&counter);
                s.record(&accept);
            })
            .unwrap();

        let offers = registry.offers("NEG-1").unwrap();
        assert_eq!(offers.len(), 2);
        assert_eq!(offers[0].agent, "BUYER-1");
        assert_eq!(offers[0].price, 240.0);
        assert_eq!(offers[1].agent, "SELLER-1");
        assert_eq!(offers[1].delivery_days, 3);

        let snapshot = registry.snapshot("NEG-1").unwrap();
        assert_eq!(snapshot.history.len(), 3);
        let last = snapshot.last_offer_of("SELLER-1").unwrap();
        assert_eq!(last.price, 290.0);
        // The sender's service type survives into the tracked offer.
        assert_eq!(last.service_type.as_deref(), Some("data_delivery"));
    }
}
