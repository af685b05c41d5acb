//! Role-dispatched agent runtime.
//!
//! One `Agent` type covers all four roles; behavior differences live in the
//! per-(role, message type) dispatch inside [`Agent::handle`]. Handlers take
//! an inbound message and return the outbound messages it provoked; actual
//! delivery belongs to the caller.

use crate::{
    config::AppConfig,
    error::{Result, UcpError},
    mediation::{MediationEngine, MediationProposal},
    oracle::{DecisionAction, DecisionOracle, NegotiationDecision, TermsDraft},
    protocol::{
        Capabilities, DiscoverPayload, MediatePayload, MessageType, PriceRange, SimulatePayload,
        SimulationResultPayload, Terms, UcpMessage, SIMULATOR_AGENT,
    },
    reputation::{ReputationEventType, ReputationLedger},
    session::{SessionRegistry, SessionStatus},
    settlement::SettlementService,
    simulation::RiskSimulator,
    store::{AgentRecord, SessionRecord, StoreClient},
    AgentId, SessionId,
};
use std::collections::HashMap;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Buyer,
    Seller,
    Mediator,
    Simulator,
}

impl Role {
    pub fn parse(raw: &str) -> Result<Role> {
        match raw {
            "buyer" => Ok(Role::Buyer),
            "seller" => Ok(Role::Seller),
            "mediator" => Ok(Role::Mediator),
            "simulator" => Ok(Role::Simulator),
            other => Err(UcpError::Config(format!("unknown agent role '{}'", other))),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Buyer => "buyer",
            Role::Seller => "seller",
            Role::Mediator => "mediator",
            Role::Simulator => "simulator",
        }
    }
}

pub struct Agent {
    pub id: AgentId,
    pub role: Role,
    config: AppConfig,
    pub sessions: SessionRegistry,
    pub reputation: ReputationLedger,
    oracle: DecisionOracle,
    simulator: RiskSimulator,
    mediation: MediationEngine,
    settlement: SettlementService,
    store: StoreClient,
    discovered: HashMap<AgentId, Capabilities>,
    last_seen: HashMap<AgentId, chrono::DateTime<chrono::Utc>>,
    pending_mediations: HashMap<SessionId, MediationProposal>,
}

impl Agent {
    pub fn from_config(config: &AppConfig) -> Result<Self> {
        let role = Role::parse(&config.agent.role)?;
        let id = if !config.agent.id.is_empty() {
            config.agent.id.clone()
        } else if role == Role::Simulator {
            SIMULATOR_AGENT.to_string()
        } else {
            format!("{}-{}", role.as_str().to_uppercase(), Uuid::new_v4())
        };

        let store = StoreClient::from_config(&config.store);
        let oracle = DecisionOracle::new(config.oracle.clone());
        Ok(Self {
            id,
            role,
            config: config.clone(),
            sessions: SessionRegistry::new(),
            reputation: ReputationLedger::new(config.negotiation.initial_reputation, store.clone()),
            simulator: RiskSimulator::new(config.simulation.clone(), store.clone()),
            mediation: MediationEngine::new(config.mediation.clone(), oracle.clone()),
            oracle,
            settlement: SettlementService::new(config.settlement.clone()),
            store,
            discovered: HashMap::new(),
            last_seen: HashMap::new(),
            pending_mediations: HashMap::new(),
        })
    }

    /// Capabilities advertised in DISCOVER/REGISTER broadcasts.
    pub fn capabilities(&self) -> Capabilities {
        match self.role {
            Role::Buyer => Capabilities {
                service_type: self.config.buyer.service_type.clone(),
                price_range: Some(PriceRange {
                    min: 0.0,
                    max: self.config.buyer.max_price,
                }),
                delivery_sla_days: vec![self.config.buyer.preferred_delivery_days],
                quality_level: None,
            },
            Role::Seller => Capabilities {
                service_type: self.config.seller.service_type.clone(),
                price_range: Some(self.config.seller.price_range),
                delivery_sla_days: self.config.seller.delivery_sla_days.clone(),
                quality_level: Some(self.config.seller.quality_level.clone()),
            },
            Role::Mediator => Capabilities {
                service_type: "mediation".to_string(),
                price_range: None,
                delivery_sla_days: Vec::new(),
                quality_level: None,
            },
            Role::Simulator => Capabilities {
                service_type: "risk_simulation".to_string(),
                price_range: None,
                delivery_sla_days: Vec::new(),
                quality_level: None,
            },
        }
    }

    /// Process one inbound message and return the outbound messages it
    /// provoked. Messages from this agent itself, messages for retired
    /// sessions and combinations the role does not handle all produce an
    /// empty reply.
    pub async fn handle(&mut self, msg: UcpMessage) -> Result<Vec<UcpMessage>> {
        msg.validate()?;
        if msg.from == self.id {
            return Ok(Vec::new());
        }

        // Liveness bookkeeping is role-independent and never answered.
        match msg.message_type {
            MessageType::Register => {
                let payload: DiscoverPayload = serde_json::from_value(msg.payload.clone())?;
                self.discovered.insert(msg.from.clone(), payload.capabilities);
                self.last_seen.insert(msg.from.clone(), msg.timestamp);
                return Ok(Vec::new());
            }
            MessageType::Heartbeat => {
                self.last_seen.insert(msg.from.clone(), msg.timestamp);
                return Ok(Vec::new());
            }
            _ => {}
        }

        // A replayed PROPOSAL must not reopen a settled session; only the
        // SIMULATION_RESULT of an in-flight request may still land.
        if matches!(
            msg.message_type,
            MessageType::Proposal
                | MessageType::Counter
                | MessageType::Mediate
                | MessageType::Accept
                | MessageType::Reject
        ) {
            if let Some(session) = self.sessions.snapshot(&msg.session_id) {
                if session.retired {
                    tracing::debug!(session = %msg.session_id, "message for retired session dropped");
                    return Ok(Vec::new());
                }
            }
        }

        self.persist_transcript(&msg).await;

        let replies = match (self.role, msg.message_type) {
            (Role::Buyer, MessageType::Discover) => self.buyer_on_discover(&msg).await?,
            (Role::Buyer, MessageType::Counter) => self.buyer_on_counter(&msg).await?,
            (Role::Buyer, MessageType::Mediate) => self.buyer_on_mediate(&msg).await?,
            (Role::Buyer, MessageType::Accept) => self.on_counterpart_accept(&msg).await?,
            (Role::Buyer, MessageType::Reject) => self.on_counterpart_reject(&msg).await?,
            (Role::Buyer, MessageType::SimulationResult) => self.on_simulation_result(&msg)?,

            (Role::Seller, MessageType::Proposal) => self.seller_on_offer(&msg).await?,
            (Role::Seller, MessageType::Counter) => self.seller_on_offer(&msg).await?,
            (Role::Seller, MessageType::Mediate) => self.seller_on_mediate(&msg).await?,
            (Role::Seller, MessageType::Accept) => self.on_counterpart_accept(&msg).await?,
            (Role::Seller, MessageType::Reject) => self.on_counterpart_reject(&msg).await?,
            (Role::Seller, MessageType::SimulationResult) => self.on_simulation_result(&msg)?,

            (Role::Mediator, MessageType::Proposal) => self.mediator_on_proposal(&msg)?,
            (Role::Mediator, MessageType::Counter) => self.mediator_on_counter(&msg).await?,
            (Role::Mediator, MessageType::Accept) => self.mediator_on_outcome(&msg, true).await?,
            (Role::Mediator, MessageType::Reject) => self.mediator_on_outcome(&msg, false).await?,

            (Role::Simulator, MessageType::Simulate) => self.simulator_on_simulate(&msg).await?,

            (role, kind) => {
                tracing::debug!(role = role.as_str(), kind = %kind, "message kind not handled by role");
                Vec::new()
            }
        };

        for reply in &replies {
            self.persist_transcript(reply).await;
        }
        Ok(replies)
    }

    async fn persist_transcript(&self, msg: &UcpMessage) {
        if !self.store.is_enabled() {
            return;
        }
        if let Err(e) = self.store.append_transcript(msg).await {
            tracing::warn!(session = %msg.session_id, error = %e, "transcript not persisted");
        }
    }

    // ---- buyer -----------------------------------------------------------

    async fn buyer_on_discover(&mut self, msg: &UcpMessage) -> Result<Vec<UcpMessage>> {
        let payload: DiscoverPayload = serde_json::from_value(msg.payload.clone())?;
        if !self.is_seller_suitable(&payload.capabilities) {
            tracing::debug!(seller = %msg.from, "seller capabilities do not fit");
            return Ok(Vec::new());
        }

        tracing::info!(seller = %msg.from, "suitable seller discovered");
        self.discovered
            .insert(msg.from.clone(), payload.capabilities.clone());

        let session_id = format!("NEG-{}", Uuid::new_v4());
        let terms = self.buyer_initial_terms(&payload.capabilities).await;
        let proposal = UcpMessage::proposal(&self.id, &msg.from, &session_id, &terms)?;
        let simulate = UcpMessage::simulate(&self.id, SIMULATOR_AGENT, &session_id, &terms)?;

        self.sessions.create_if_absent(&session_id, &self.id, &msg.from);
        self.sessions.with(&session_id, |s| s.record(&proposal))?;
        tracing::info!(session = %session_id, seller = %msg.from, price = terms.price, "negotiation initiated");
        Ok(vec![proposal, simulate])
    }

    /// A seller fits when service types match, its floor price is within
    /// budget and at least one SLA option lands near the preferred delivery
    /// window.
    fn is_seller_suitable(&self, capabilities: &Capabilities) -> bool {
        let prefs = &self.config.buyer;
        if capabilities.service_type != prefs.service_type {
            return false;
        }
        if let Some(range) = &capabilities.price_range {
            if range.min > prefs.max_price {
                return false;
            }
        }
        if !capabilities
            .delivery_sla_days
            .iter()
            .any(|days| *days <= prefs.preferred_delivery_days + 2)
        {
            return false;
        }
        true
    }

    async fn buyer_initial_terms(&self, seller: &Capabilities) -> Terms {
        let prefs = &self.config.buyer;
        let system = "You are a buyer agent negotiating a service contract. \
                      Respond with JSON only: {\"price\": number, \"delivery_days\": number, \
                      \"penalty_per_day\": number, \"reasoning\": string}";
        let prompt = format!(
            "Generate an opening offer for {}.\n\
             My constraints: max price {}, preferred delivery {} days, risk tolerance {}.\n\
             Seller capabilities: {}",
            prefs.service_type,
            prefs.max_price,
            prefs.preferred_delivery_days,
            prefs.risk_tolerance,
            serde_json::to_string(seller).unwrap_or_default(),
        );

        let draft = self
            .oracle
            .decide_or(system, &prompt, || TermsDraft {
                price: (prefs.max_price * 0.8).min(prefs.initial_offer_ceiling),
                delivery_days: prefs.preferred_delivery_days,
                penalty_per_day: prefs.initial_penalty_per_day,
                reasoning: Some("Conservative initial offer".to_string()),
            })
            .await;
        draft.into_terms(&prefs.service_type)
    }

    async fn buyer_on_counter(&mut self, msg: &UcpMessage) -> Result<Vec<UcpMessage>> {
        let counter = msg.offer_payload()?;
        let terms = counter.to_terms(&self.config.buyer.service_type);
        self.sessions.with(&msg.session_id, |s| s.record(msg))?;

        let decision = self.buyer_evaluate(&msg.session_id, &terms).await;
        match decision.action {
            DecisionAction::Accept => self.respond_accept(&msg.session_id, &msg.from).await,
            DecisionAction::Counter => {
                let draft = match decision.terms {
                    Some(draft) => draft,
                    None => {
                        tracing::warn!(session = %msg.session_id, "counter decision carried no terms, accepting instead");
                        return self.respond_accept(&msg.session_id, &msg.from).await;
                    }
                };
                let reasoning = draft.reasoning.clone();
                let new_terms = draft.into_terms(&self.config.buyer.service_type);
                let counter =
                    UcpMessage::counter(&self.id, &msg.from, &msg.session_id, &new_terms, reasoning)?;
                let simulate =
                    UcpMessage::simulate(&self.id, SIMULATOR_AGENT, &msg.session_id, &new_terms)?;
                self.sessions.with(&msg.session_id, |s| s.record(&counter))?;
                Ok(vec![counter, simulate])
            }
            DecisionAction::Reject => {
                let reason = decision
                    .reason
                    .unwrap_or_else(|| "terms outside my constraints".to_string());
                self.respond_reject(&msg.session_id, &msg.from, &reason).await
            }
        }
    }

    async fn buyer_evaluate(&self, session_id: &str, offered: &Terms) -> NegotiationDecision {
        let prefs = &self.config.buyer;
        let my_last = self
            .sessions
            .snapshot(session_id)
            .and_then(|s| s.last_offer_of(&self.id).cloned());

        let system = "You are a buyer agent evaluating a counter-offer. \
                      Respond with JSON only: {\"action\": \"accept|counter|reject\", \
                      \"terms\": {\"price\": number, \"delivery_days\": number, \
                      \"penalty_per_day\": number}, \"reason\": string}";
        let prompt = format!(
            "Counter-offer received: {}\n\
             My previous offer: {}\n\
             My constraints: max price {}, preferred delivery {} days, risk tolerance {}.",
            serde_json::to_string(offered).unwrap_or_default(),
            my_last
                .as_ref()
                .and_then(|t| serde_json::to_string(t).ok())
                .unwrap_or_else(|| "none".to_string()),
            prefs.max_price,
            prefs.preferred_delivery_days,
            prefs.risk_tolerance,
        );

        let max_price = prefs.max_price;
        let price = offered.price;
        self.oracle
            .decide_or(system, &prompt, || {
                if price <= max_price {
                    NegotiationDecision::accept()
                } else {
                    NegotiationDecision::reject(format!(
                        "Price {} exceeds my maximum of {}",
                        price, max_price
                    ))
                }
            })
            .await
    }

    /// A mediation proposal the buyer can afford is folded back into the
    /// negotiation as a COUNTER to the seller, alongside an ACCEPT to the
    /// mediator; an unaffordable one is rejected to the mediator.
    async fn buyer_on_mediate(&mut self, msg: &UcpMessage) -> Result<Vec<UcpMessage>> {
        let payload: MediatePayload = serde_json::from_value(msg.payload.clone())?;
        let seller = self
            .sessions
            .with(&msg.session_id, |s| {
                s.record(msg);
                s.set_status(SessionStatus::Mediating);
                s.participants.seller.clone()
            })?;

        if payload.proposed_terms.price <= self.config.buyer.max_price {
            let accept = UcpMessage::accept(&self.id, &msg.from, &msg.session_id)?;
            let counter = UcpMessage::counter(
                &self.id,
                &seller,
                &msg.session_id,
                &payload.proposed_terms,
                Some(payload.reasoning),
            )?;
            self.sessions.with(&msg.session_id, |s| s.record(&counter))?;
            Ok(vec![accept, counter])
        } else {
            Ok(vec![UcpMessage::reject(
                &self.id,
                &msg.from,
                &msg.session_id,
                &format!(
                    "Mediated price {} exceeds my maximum of {}",
                    payload.proposed_terms.price, self.config.buyer.max_price
                ),
            )?])
        }
    }

    /// Both negotiating parties store the verdict on the session; the result
    /// of a request still in flight may land after retirement.
    fn on_simulation_result(&mut self, msg: &UcpMessage) -> Result<Vec<UcpMessage>> {
        let payload: SimulationResultPayload = serde_json::from_value(msg.payload.clone())?;
        tracing::info!(
            session = %msg.session_id,
            risk = payload.result.risk_score,
            recommendation = ?payload.result.recommendation,
            "simulation result received"
        );
        self.sessions.with(&msg.session_id, |s| {
            s.last_simulation = Some(payload.result);
        })?;
        Ok(Vec::new())
    }

    // ---- seller ----------------------------------------------------------

    async fn seller_on_offer(&mut self, msg: &UcpMessage) -> Result<Vec<UcpMessage>> {
        let offer = msg.offer_payload()?;
        let terms = offer.to_terms(&self.config.seller.service_type);

        if msg.message_type == MessageType::Proposal {
            self.sessions.create_if_absent(&msg.session_id, &msg.from, &self.id);
        }
        self.sessions.with(&msg.session_id, |s| s.record(msg))?;

        let decision = self.seller_evaluate(&terms).await;
        match decision.action {
            DecisionAction::Accept => self.respond_accept(&msg.session_id, &msg.from).await,
            DecisionAction::Counter => {
                let draft = match decision.terms {
                    Some(draft) => draft,
                    None => return self.respond_accept(&msg.session_id, &msg.from).await,
                };
                let reasoning = draft.reasoning.clone();
                let new_terms = draft.into_terms(&self.config.seller.service_type);
                let counter =
                    UcpMessage::counter(&self.id, &msg.from, &msg.session_id, &new_terms, reasoning)?;
                let simulate =
                    UcpMessage::simulate(&self.id, SIMULATOR_AGENT, &msg.session_id, &new_terms)?;
                self.sessions.with(&msg.session_id, |s| s.record(&counter))?;
                Ok(vec![counter, simulate])
            }
            DecisionAction::Reject => {
                let reason = decision
                    .reason
                    .unwrap_or_else(|| "cannot serve these terms".to_string());
                self.respond_reject(&msg.session_id, &msg.from, &reason).await
            }
        }
    }

    async fn seller_evaluate(&self, offered: &Terms) -> NegotiationDecision {
        let caps = &self.config.seller;
        let system = "You are a seller agent evaluating a buyer's offer. \
                      Respond with JSON only: {\"action\": \"accept|counter|reject\", \
                      \"terms\": {\"price\": number, \"delivery_days\": number, \
                      \"penalty_per_day\": number, \"reasoning\": string}, \"reason\": string}";
        let prompt = format!(
            "Offer received: {}\n\
             My capabilities: price range {}-{}, delivery SLA options {:?} days, quality {}.",
            serde_json::to_string(offered).unwrap_or_default(),
            caps.price_range.min,
            caps.price_range.max,
            caps.delivery_sla_days,
            caps.quality_level,
        );

        let offered = offered.clone();
        let caps = caps.clone();
        self.oracle
            .decide_or(system, &prompt, move || {
                let sla_ok = caps.delivery_sla_days.contains(&offered.delivery_days);
                let in_range = offered.price >= caps.price_range.min
                    && offered.price <= caps.price_range.max;
                if in_range && sla_ok {
                    NegotiationDecision::accept()
                } else if offered.price > caps.price_range.max {
                    NegotiationDecision::reject(format!(
                        "Price {} is above my advertised maximum of {}",
                        offered.price, caps.price_range.max
                    ))
                } else if offered.price < caps.price_range.min {
                    let fastest = caps
                        .delivery_sla_days
                        .iter()
                        .copied()
                        .min()
                        .unwrap_or(offered.delivery_days);
                    NegotiationDecision::counter(TermsDraft {
                        price: caps.price_range.min,
                        delivery_days: fastest,
                        penalty_per_day: if offered.penalty_per_day > 0.0 {
                            offered.penalty_per_day
                        } else {
                            caps.default_penalty_per_day
                        },
                        reasoning: Some("Minimum acceptable price for premium service".to_string()),
                    })
                } else {
                    NegotiationDecision::reject(format!(
                        "cannot meet delivery SLA of {} days",
                        offered.delivery_days
                    ))
                }
            })
            .await
    }

    async fn seller_on_mediate(&mut self, msg: &UcpMessage) -> Result<Vec<UcpMessage>> {
        let payload: MediatePayload = serde_json::from_value(msg.payload.clone())?;
        self.sessions.with(&msg.session_id, |s| {
            s.record(msg);
            s.set_status(SessionStatus::Mediating);
        })?;

        let range = self.config.seller.price_range;
        if payload.proposed_terms.price >= range.min {
            Ok(vec![UcpMessage::accept(&self.id, &msg.from, &msg.session_id)?])
        } else {
            Ok(vec![UcpMessage::reject(
                &self.id,
                &msg.from,
                &msg.session_id,
                &format!(
                    "Mediated price {} is below my minimum of {}",
                    payload.proposed_terms.price, range.min
                ),
            )?])
        }
    }

    // ---- shared buyer/seller outcomes ------------------------------------

    /// Accept the counterpart's last offer: emit ACCEPT and finalize.
    async fn respond_accept(&mut self, session_id: &str, to: &str) -> Result<Vec<UcpMessage>> {
        let accept = UcpMessage::accept(&self.id, to, session_id)?;
        self.sessions.with(session_id, |s| s.record(&accept))?;
        self.finalize_accepted(session_id).await?;
        Ok(vec![accept])
    }

    async fn respond_reject(
        &mut self,
        session_id: &str,
        to: &str,
        reason: &str,
    ) -> Result<Vec<UcpMessage>> {
        let reject = UcpMessage::reject(&self.id, to, session_id, reason)?;
        self.sessions.with(session_id, |s| {
            s.record(&reject);
            s.set_status(SessionStatus::Rejected);
        })?;
        self.reputation
            .update(
                &self.id,
                -self.config.negotiation.reject_penalty,
                session_id,
                ReputationEventType::NegotiationFailed,
            )
            .await;
        self.sessions.retire(session_id)?;
        tracing::info!(session = session_id, reason, "negotiation rejected");
        Ok(vec![reject])
    }

    /// The counterpart accepted this agent's last offer.
    async fn on_counterpart_accept(&mut self, msg: &UcpMessage) -> Result<Vec<UcpMessage>> {
        self.sessions.with(&msg.session_id, |s| s.record(msg))?;
        self.finalize_accepted(&msg.session_id).await?;
        Ok(Vec::new())
    }

    async fn on_counterpart_reject(&mut self, msg: &UcpMessage) -> Result<Vec<UcpMessage>> {
        self.sessions.with(&msg.session_id, |s| {
            s.record(msg);
            s.set_status(SessionStatus::Rejected);
        })?;
        self.reputation
            .update(
                &self.id,
                -self.config.negotiation.reject_penalty,
                &msg.session_id,
                ReputationEventType::NegotiationFailed,
            )
            .await;
        self.sessions.retire(&msg.session_id)?;
        Ok(Vec::new())
    }

    /// Reputation reward, settlement and retirement for an accepted deal.
    /// Settlement failure is logged and does not undo the acceptance.
    async fn finalize_accepted(&mut self, session_id: &str) -> Result<()> {
        self.sessions
            .with(session_id, |s| s.set_status(SessionStatus::Accepted))?;
        self.reputation
            .update(
                &self.id,
                self.config.negotiation.accept_reward,
                session_id,
                ReputationEventType::NegotiationSuccess,
            )
            .await;

        let (participants, agreed) = self.sessions.with(session_id, |s| {
            let agreed = s
                .history
                .iter()
                .rev()
                .find(|m| m.message_type.is_offer())
                .and_then(|m| m.offer_payload().ok())
                .map(|p| p.to_terms(&self.default_service_type()));
            (s.participants.clone(), agreed)
        })?;

        if let Some(terms) = agreed {
            match self
                .settlement
                .execute(session_id, &participants.buyer, &participants.seller, &terms)
                .await
            {
                Ok(reference) => {
                    tracing::info!(session = session_id, escrow = %reference.escrow_id, "settlement executed");
                    let record = SessionRecord {
                        id: session_id.to_string(),
                        buyer_agent_id: participants.buyer.clone(),
                        seller_agent_id: participants.seller.clone(),
                        status: "settled".to_string(),
                        ucp_version: crate::protocol::UCP_VERSION.to_string(),
                        escrow_amount: Some(terms.price),
                    };
                    if self.store.is_enabled() {
                        if let Err(e) = self.store.upsert_session(&record).await {
                            tracing::warn!(session = session_id, error = %e, "session record not persisted");
                        }
                    }
                }
                Err(e) => {
                    tracing::warn!(session = session_id, error = %e, "settlement failed, deal stands");
                }
            }
        } else {
            tracing::warn!(session = session_id, "accepted session has no offer to settle");
        }

        self.sessions
            .with(session_id, |s| s.set_status(SessionStatus::Settled))?;
        self.sessions.retire(session_id)?;
        Ok(())
    }

    /// Best-effort upsert of this agent's public record into the store.
    pub async fn publish_profile(&self) {
        if !self.store.is_enabled() {
            return;
        }
        let score = self.reputation.score(&self.id);
        let record = AgentRecord {
            id: self.id.clone(),
            role: self.role.as_str().to_string(),
            service_type: self.default_service_type(),
            reputation_score: score,
            trust_tier: crate::reputation::TrustTier::from_score(score),
            capabilities: self.capabilities(),
        };
        if let Err(e) = self.store.upsert_agent(&record).await {
            tracing::warn!(agent = %self.id, error = %e, "agent record not persisted");
        }
    }

    /// Peers known via DISCOVER/REGISTER.
    pub fn known_peers(&self) -> usize {
        self.discovered.len()
    }

    /// Timestamp of the peer's latest REGISTER or HEARTBEAT.
    pub fn peer_last_seen(&self, agent_id: &str) -> Option<chrono::DateTime<chrono::Utc>> {
        self.last_seen.get(agent_id).copied()
    }

    fn default_service_type(&self) -> String {
        match self.role {
            Role::Buyer => self.config.buyer.service_type.clone(),
            _ => self.config.seller.service_type.clone(),
        }
    }

    // ---- mediator --------------------------------------------------------

    fn mediator_on_proposal(&mut self, msg: &UcpMessage) -> Result<Vec<UcpMessage>> {
        self.sessions.create_if_absent(&msg.session_id, &msg.from, &msg.to);
        self.sessions.with(&msg.session_id, |s| s.record(msg))?;
        Ok(Vec::new())
    }

    /// Every COUNTER re-measures the session's convergence; one MEDIATE per
    /// session is offered when the parties drift apart.
    async fn mediator_on_counter(&mut self, msg: &UcpMessage) -> Result<Vec<UcpMessage>> {
        self.sessions.with(&msg.session_id, |s| s.record(msg))?;
        if self.pending_mediations.contains_key(&msg.session_id) {
            return Ok(Vec::new());
        }

        let offers = self.sessions.offers(&msg.session_id)?;
        let dynamics = self.mediation.analyze(&offers);
        if !self.mediation.should_mediate(&dynamics) {
            return Ok(Vec::new());
        }

        let service_type = msg
            .offer_payload()?
            .service_type
            .unwrap_or_else(|| self.config.seller.service_type.clone());
        let proposal = self.mediation.propose(&dynamics, &service_type).await;
        tracing::info!(
            session = %msg.session_id,
            price = proposal.terms.price,
            spread = dynamics.price_spread,
            "offering mediation"
        );

        let mediate = UcpMessage::mediate(
            &self.id,
            crate::protocol::ALL_PARTICIPANTS,
            &msg.session_id,
            &proposal,
        )?;
        self.sessions.with(&msg.session_id, |s| {
            s.record(&mediate);
            s.set_status(SessionStatus::Mediating);
        })?;
        self.pending_mediations.insert(msg.session_id.clone(), proposal);
        Ok(vec![mediate])
    }

    async fn mediator_on_outcome(
        &mut self,
        msg: &UcpMessage,
        accepted: bool,
    ) -> Result<Vec<UcpMessage>> {
        let proposal = match self.pending_mediations.remove(&msg.session_id) {
            Some(proposal) => proposal,
            None => return Ok(Vec::new()),
        };
        self.sessions.with(&msg.session_id, |s| s.record(msg))?;

        let (delta, event, outcome) = if accepted {
            (
                self.config.negotiation.mediation_reward,
                ReputationEventType::MediationSuccess,
                "accepted",
            )
        } else {
            (
                -self.config.negotiation.mediation_penalty,
                ReputationEventType::MediationRejected,
                "rejected",
            )
        };
        self.reputation
            .update(&self.id, delta, &msg.session_id, event)
            .await;

        if self.store.is_enabled() {
            let record = crate::store::MediationRecord {
                session_id: msg.session_id.clone(),
                mediator_agent_id: self.id.clone(),
                outcome: outcome.to_string(),
                proposal,
            };
            if let Err(e) = self.store.record_mediation(&record).await {
                tracing::warn!(session = %msg.session_id, error = %e, "mediation outcome not persisted");
            }
        }
        tracing::info!(session = %msg.session_id, outcome, "mediation resolved");
        Ok(Vec::new())
    }

    // ---- simulator -------------------------------------------------------

    /// Stateless: every SIMULATE is answered from the terms it carries, with
    /// no session bookkeeping.
    async fn simulator_on_simulate(&mut self, msg: &UcpMessage) -> Result<Vec<UcpMessage>> {
        let payload: SimulatePayload = serde_json::from_value(msg.payload.clone())?;
        let result = self.simulator.assess(&payload.terms_to_evaluate).await;
        let outcome = self.simulator.run_monte_carlo(
            &payload.terms_to_evaluate,
            self.simulator.default_iterations(),
            &mut rand::thread_rng(),
        );
        tracing::info!(
            session = %msg.session_id,
            risk = result.risk_score,
            recommendation = ?result.recommendation,
            success_probability = outcome.success_probability,
            average_profit = outcome.average_profit,
            "simulation completed"
        );

        if self.store.is_enabled() {
            if let Err(e) = self.store.record_simulation(&msg.session_id, &result).await {
                tracing::warn!(session = %msg.session_id, error = %e, "simulation not persisted");
            }
        }
        Ok(vec![UcpMessage::simulation_result(
            &self.id,
            &msg.from,
            &msg.session_id,
            &result,
        )?])
    }
}
