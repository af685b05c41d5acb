//! UCP message protocol: envelope shape, type set, validation and
//! per-type constructors.
//!
//! Constructors stamp the timestamp at construction time and never touch
//! the network; a message that fails [`UcpMessage::validate`] is unsendable.

use crate::{
    error::{Result, UcpError},
    mediation::MediationProposal,
    simulation::SimulationResult,
    AgentId, SessionId,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

pub const UCP_VERSION: &str = "1.0";

/// Well-known addressing constants on the agent network.
pub const BROADCAST: &str = "network";
pub const DISCOVERY_SESSION: &str = "DISCOVERY";
pub const SIMULATOR_AGENT: &str = "SIMULATOR";
pub const ALL_PARTICIPANTS: &str = "ALL_PARTICIPANTS";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MessageType {
    Discover,
    Proposal,
    Counter,
    Mediate,
    Accept,
    Reject,
    Simulate,
    SimulationResult,
    Register,
    Heartbeat,
}

impl MessageType {
    pub const ALL: [MessageType; 10] = [
        MessageType::Discover,
        MessageType::Proposal,
        MessageType::Counter,
        MessageType::Mediate,
        MessageType::Accept,
        MessageType::Reject,
        MessageType::Simulate,
        MessageType::SimulationResult,
        MessageType::Register,
        MessageType::Heartbeat,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            MessageType::Discover => "DISCOVER",
            MessageType::Proposal => "PROPOSAL",
            MessageType::Counter => "COUNTER",
            MessageType::Mediate => "MEDIATE",
            MessageType::Accept => "ACCEPT",
            MessageType::Reject => "REJECT",
            MessageType::Simulate => "SIMULATE",
            MessageType::SimulationResult => "SIMULATION_RESULT",
            MessageType::Register => "REGISTER",
            MessageType::Heartbeat => "HEARTBEAT",
        }
    }

    pub fn parse(raw: &str) -> Option<MessageType> {
        MessageType::ALL.iter().find(|t| t.as_str() == raw).copied()
    }

    /// True for the message kinds that carry an offer in their payload.
    pub fn is_offer(&self) -> bool {
        matches!(self, MessageType::Proposal | MessageType::Counter)
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The negotiable contract parameters exchanged in proposals and counters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Terms {
    pub price: f64,
    pub delivery_days: u32,
    pub penalty_per_day: f64,
    pub service_type: String,
    pub escrow: bool,
}

impl Terms {
    pub fn validate(&self) -> Result<()> {
        if !(self.price > 0.0) {
            return Err(UcpError::OutOfRangeTerms(format!(
                "price must be greater than 0, got {}",
                self.price
            )));
        }
        if self.delivery_days == 0 {
            return Err(UcpError::OutOfRangeTerms(
                "delivery_days must be greater than 0".to_string(),
            ));
        }
        if self.penalty_per_day < 0.0 {
            return Err(UcpError::OutOfRangeTerms(format!(
                "penalty_per_day must not be negative, got {}",
                self.penalty_per_day
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PriceRange {
    pub min: f64,
    pub max: f64,
}

/// Capabilities advertised in DISCOVER and REGISTER payloads.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Capabilities {
    pub service_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price_range: Option<PriceRange>,
    #[serde(default)]
    pub delivery_sla_days: Vec<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quality_level: Option<String>,
}

fn default_escrow() -> bool {
    true
}

/// Payload of PROPOSAL and COUNTER messages.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OfferPayload {
    pub price: f64,
    pub delivery_days: u32,
    #[serde(default)]
    pub penalty_per_day: f64,
    #[serde(default = "default_escrow")]
    pub escrow: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasoning: Option<String>,
}

impl OfferPayload {
    pub fn from_terms(terms: &Terms, reasoning: Option<String>) -> Self {
        Self {
            price: terms.price,
            delivery_days: terms.delivery_days,
            penalty_per_day: terms.penalty_per_day,
            escrow: terms.escrow,
            service_type: Some(terms.service_type.clone()),
            reasoning,
        }
    }

    /// Convert back into [`Terms`], filling in the service type when the
    /// sender omitted it.
    pub fn to_terms(&self, default_service_type: &str) -> Terms {
        Terms {
            price: self.price,
            delivery_days: self.delivery_days,
            penalty_per_day: self.penalty_per_day,
            service_type: self
                .service_type
                .clone()
                .unwrap_or_else(|| default_service_type.to_string()),
            escrow: self.escrow,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AcceptPayload {
    pub accepted_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RejectPayload {
    pub rejected_at: DateTime<Utc>,
    pub reason: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulatePayload {
    pub terms_to_evaluate: Terms,
    pub request_timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulationResultPayload {
    pub simulation_id: String,
    pub simulation_timestamp: DateTime<Utc>,
    #[serde(flatten)]
    pub result: SimulationResult,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscoverPayload {
    pub agent_id: AgentId,
    pub capabilities: Capabilities,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MediatePayload {
    pub mediation_type: String,
    pub proposed_terms: Terms,
    pub reasoning: String,
    pub confidence: crate::simulation::Confidence,
    pub success_probability: f64,
    pub fairness_score: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeartbeatPayload {
    pub agent_id: AgentId,
    pub timestamp: DateTime<Utc>,
}

/// The structured envelope exchanged between agents.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UcpMessage {
    #[serde(rename = "protocol_version")]
    pub version: String,
    pub session_id: SessionId,
    pub from: AgentId,
    pub to: AgentId,
    #[serde(rename = "type")]
    pub message_type: MessageType,
    pub payload: serde_json::Value,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature: Option<String>,
}

impl UcpMessage {
    fn new(
        from: &str,
        to: &str,
        session_id: &str,
        message_type: MessageType,
        payload: serde_json::Value,
    ) -> Self {
        Self {
            version: UCP_VERSION.to_string(),
            session_id: session_id.to_string(),
            from: from.to_string(),
            to: to.to_string(),
            message_type,
            payload,
            timestamp: Utc::now(),
            // Signing algorithm is unspecified in v1.0; the field is reserved.
            signature: None,
        }
    }

    /// Check the envelope invariant: all seven required fields present and
    /// non-empty.
    pub fn validate(&self) -> Result<()> {
        if self.version.is_empty() {
            return Err(UcpError::MissingField("protocol_version"));
        }
        if self.session_id.is_empty() {
            return Err(UcpError::MissingField("session_id"));
        }
        if self.from.is_empty() {
            return Err(UcpError::MissingField("from"));
        }
        if self.to.is_empty() {
            return Err(UcpError::MissingField("to"));
        }
        if self.payload.is_null() {
            return Err(UcpError::MissingField("payload"));
        }
        Ok(())
    }

    /// Serialize for transmission. Validates first so a malformed message
    /// never leaves the runtime.
    pub fn to_json(&self) -> Result<String> {
        self.validate()?;
        Ok(serde_json::to_string(self)?)
    }

    /// Parse an inbound message, distinguishing an unknown type from a
    /// generally malformed envelope.
    pub fn from_json(raw: &str) -> Result<Self> {
        let value: serde_json::Value =
            serde_json::from_str(raw).map_err(|e| UcpError::Serialization(e.to_string()))?;
        match value.get("type").and_then(|v| v.as_str()) {
            Some(kind) if MessageType::parse(kind).is_none() => {
                return Err(UcpError::UnknownType(kind.to_string()));
            }
            Some(_) => {}
            None => return Err(UcpError::MissingField("type")),
        }
        let msg: UcpMessage = serde_json::from_value(value)?;
        msg.validate()?;
        Ok(msg)
    }

    pub fn proposal(from: &str, to: &str, session_id: &str, terms: &Terms) -> Result<Self> {
        terms.validate()?;
        let payload = serde_json::to_value(OfferPayload::from_terms(terms, None))?;
        Ok(Self::new(from, to, session_id, MessageType::Proposal, payload))
    }

    pub fn counter(
        from: &str,
        to: &str,
        session_id: &str,
        terms: &Terms,
        reasoning: Option<String>,
    ) -> Result<Self> {
        terms.validate()?;
        let payload = serde_json::to_value(OfferPayload::from_terms(terms, reasoning))?;
        Ok(Self::new(from, to, session_id, MessageType::Counter, payload))
    }

    pub fn accept(from: &str, to: &str, session_id: &str) -> Result<Self> {
        let payload = serde_json::to_value(AcceptPayload {
            accepted_at: Utc::now(),
        })?;
        Ok(Self::new(from, to, session_id, MessageType::Accept, payload))
    }

    pub fn reject(from: &str, to: &str, session_id: &str, reason: &str) -> Result<Self> {
        let payload = serde_json::to_value(RejectPayload {
            rejected_at: Utc::now(),
            reason: reason.to_string(),
        })?;
        Ok(Self::new(from, to, session_id, MessageType::Reject, payload))
    }

    pub fn simulate(from: &str, to: &str, session_id: &str, terms: &Terms) -> Result<Self> {
        terms.validate()?;
        let payload = serde_json::to_value(SimulatePayload {
            terms_to_evaluate: terms.clone(),
            request_timestamp: Utc::now(),
        })?;
        Ok(Self::new(from, to, session_id, MessageType::Simulate, payload))
    }

    pub fn simulation_result(
        from: &str,
        to: &str,
        session_id: &str,
        result: &SimulationResult,
    ) -> Result<Self> {
        let payload = serde_json::to_value(SimulationResultPayload {
            simulation_id: format!("SIM-{}", Uuid::new_v4()),
            simulation_timestamp: Utc::now(),
            result: result.clone(),
        })?;
        Ok(Self::new(
            from,
            to,
            session_id,
            MessageType::SimulationResult,
            payload,
        ))
    }

    pub fn discover(agent_id: &str, capabilities: &Capabilities) -> Result<Self> {
        let payload = serde_json::to_value(DiscoverPayload {
            agent_id: agent_id.to_string(),
            capabilities: capabilities.clone(),
            timestamp: Utc::now(),
        })?;
        Ok(Self::new(
            agent_id,
            BROADCAST,
            DISCOVERY_SESSION,
            MessageType::Discover,
            payload,
        ))
    }

    pub fn register(agent_id: &str, capabilities: &Capabilities) -> Result<Self> {
        let payload = serde_json::to_value(DiscoverPayload {
            agent_id: agent_id.to_string(),
            capabilities: capabilities.clone(),
            timestamp: Utc::now(),
        })?;
        Ok(Self::new(
            agent_id,
            BROADCAST,
            DISCOVERY_SESSION,
            MessageType::Register,
            payload,
        ))
    }

    pub fn heartbeat(agent_id: &str) -> Result<Self> {
        let payload = serde_json::to_value(HeartbeatPayload {
            agent_id: agent_id.to_string(),
            timestamp: Utc::now(),
        })?;
        Ok(Self::new(
            agent_id,
            BROADCAST,
            DISCOVERY_SESSION,
            MessageType::Heartbeat,
            payload,
        ))
    }

    pub fn mediate(
        from: &str,
        to: &str,
        session_id: &str,
        proposal: &MediationProposal,
    ) -> Result<Self> {
        let payload = serde_json::to_value(MediatePayload {
            mediation_type: "convergence_suggestion".to_string(),
            proposed_terms: proposal.terms.clone(),
            reasoning: proposal.reasoning.clone(),
            confidence: proposal.confidence,
            success_probability: proposal.success_probability,
            fairness_score: proposal.fairness_score,
        })?;
        Ok(Self::new(from, to, session_id, MessageType::Mediate, payload))
    }

    /// Parse the offer carried by a PROPOSAL or COUNTER message.
    pub fn offer_payload(&self) -> Result<OfferPayload> {
        if !self.message_type.is_offer() {
            return Err(UcpError::Serialization(format!(
                "{} message carries no offer",
                self.message_type
            )));
        }
        Ok(serde_json::from_value(self.payload.clone())?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_terms() -> Terms {
        Terms {
            price: 250.0,
            delivery_days: 5,
            penalty_per_day: 15.0,
            service_type: "data_delivery".to_string(),
            escrow: true,
        }
    }

    #[test]
    fn test_proposal_round_trip() {
        let msg = UcpMessage::proposal("BUYER-1", "SELLER-1", "NEG-1", &sample_terms()).unwrap();
        let json = msg.to_json().unwrap();
        let back = UcpMessage::from_json(&json).unwrap();

        assert_eq!(back.version, UCP_VERSION);
        assert_eq!(back.session_id, msg.session_id);
        assert_eq!(back.from, msg.from);
        assert_eq!(back.to, msg.to);
        assert_eq!(back.message_type, MessageType::Proposal);
        assert_eq!(back.payload, msg.payload);
        assert_eq!(back.timestamp, msg.timestamp);
    }

    #[test]
    fn test_all_constructors_round_trip() {
        let terms = sample_terms();
        let caps = Capabilities {
            service_type: "data_delivery".to_string(),
            price_range: Some(PriceRange { min: 200.0, max: 400.0 }),
            delivery_sla_days: vec![3, 5, 7],
            quality_level: Some("premium".to_string()),
        };
        let messages = vec![
            UcpMessage::proposal("a", "b", "s", &terms).unwrap(),
            UcpMessage::counter("a", "b", "s", &terms, Some("meet me halfway".into())).unwrap(),
            UcpMessage::accept("a", "b", "s").unwrap(),
            UcpMessage::reject("a", "b", "s", "too expensive").unwrap(),
            UcpMessage::simulate("a", SIMULATOR_AGENT, "s", &terms).unwrap(),
            UcpMessage::discover("a", &caps).unwrap(),
            UcpMessage::register("a", &caps).unwrap(),
            UcpMessage::heartbeat("a").unwrap(),
        ];

        for msg in messages {
            let json = msg.to_json().unwrap();
            let back = UcpMessage::from_json(&json).unwrap();
            assert_eq!(back.message_type, msg.message_type);
            assert_eq!(back.payload, msg.payload);
        }
    }

    #[test]
    fn test_unknown_type_rejected() {
        let raw = r#"{
            "protocol_version": "1.0",
            "session_id": "NEG-1",
            "from": "a",
            "to": "b",
            "type": "BRIBE",
            "payload": {},
            "timestamp": "2026-01-01T00:00:00Z"
        }"#;
        match UcpMessage::from_json(raw) {
            Err(UcpError::UnknownType(kind)) => assert_eq!(kind, "BRIBE"),
            other => panic!("expected UnknownType, got {other:?}"),
        }
    }

    #[test]
    fn test_missing_field_rejected() {
        let mut msg = UcpMessage::accept("a", "b", "s").unwrap();
        msg.from = String::new();
        match msg.validate() {
            Err(UcpError::MissingField(field)) => assert_eq!(field, "from"),
            other => panic!("expected MissingField, got {other:?}"),
        }
        assert!(msg.to_json().is_err());
    }

    #[test]
    fn test_terms_validation() {
        let mut terms = sample_terms();
        assert!(terms.validate().is_ok());

        terms.price = 0.0;
        assert!(matches!(terms.validate(), Err(UcpError::OutOfRangeTerms(_))));

        terms = sample_terms();
        terms.delivery_days = 0;
        assert!(terms.validate().is_err());

        terms = sample_terms();
        terms.penalty_per_day = -1.0;
        assert!(terms.validate().is_err());
    }

    #[test]
    fn test_offer_payload_defaults() {
        let raw = serde_json::json!({ "price": 180.0, "delivery_days": 4 });
        let payload: OfferPayload = serde_json::from_value(raw).unwrap();
        assert!(payload.escrow);
        assert_eq!(payload.penalty_per_day, 0.0);

        let terms = payload.to_terms("data_delivery");
        assert_eq!(terms.service_type, "data_delivery");
        assert_eq!(terms.price, 180.0);
    }

    #[test]
    fn test_message_type_parse() {
        assert_eq!(MessageType::parse("SIMULATION_RESULT"), Some(MessageType::SimulationResult));
        assert_eq!(MessageType::parse("MEDIATE"), Some(MessageType::Mediate));
        assert_eq!(MessageType::parse("bribe"), None);
        for kind in MessageType::ALL {
            assert_eq!(MessageType::parse(kind.as_str()), Some(kind));
        }
    }
}
