//! # UCP Agents - Universal Commerce Protocol
//!
//! Autonomous agent-to-agent commerce negotiation over the UCP message
//! protocol.
//!
//! ## Architecture
//!
//! - **Message Protocol**: JSON envelope with a fixed type set (PROPOSAL,
//!   COUNTER, MEDIATE, ACCEPT, REJECT, SIMULATE, ...), validation and
//!   per-type constructors
//! - **Agent Runtime**: one polymorphic actor with per-role behavior
//!   (buyer / seller / mediator / simulator) dispatching inbound messages
//! - **Mediation Engine**: convergence analysis over a session's offer
//!   history plus a compromise proposal
//! - **Risk Simulation Engine**: deterministic multi-factor risk scoring
//!   with a Monte Carlo companion mode
//! - **Reputation Ledger**: bounded per-agent reputation with trust tiers
//! - **External collaborators**: decision oracle, session store and
//!   settlement service, all reached over HTTP with deterministic fallbacks

pub mod agent;
pub mod config;
pub mod error;
pub mod gateway;
pub mod mediation;
pub mod oracle;
pub mod protocol;
pub mod reputation;
pub mod session;
pub mod settlement;
pub mod simulation;
pub mod store;
pub mod tasks;

pub use agent::{Agent, Role};
pub use config::AppConfig;
pub use error::{Result, UcpError};
pub use mediation::{MediationEngine, MediationProposal, NegotiationDynamics};
pub use protocol::{Capabilities, MessageType, Terms, UcpMessage, UCP_VERSION};
pub use reputation::{ReputationLedger, TrustTier};
pub use session::{Session, SessionRegistry, SessionStatus};
pub use settlement::SettlementService;
pub use simulation::{MonteCarloOutcome, RiskSimulator, SimulationResult};
pub use store::StoreClient;

pub type AgentId = String;
pub type SessionId = String;
