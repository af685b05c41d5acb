//! Escrow settlement of accepted terms.
//!
//! When an external escrow endpoint is configured, settlement is a single
//! POST to it; otherwise funds are locked in a local mock escrow so the
//! negotiation flow can complete end to end without infrastructure.

use crate::{
    config::SettlementConfig,
    error::{Result, UcpError},
    protocol::Terms,
    AgentId, SessionId,
};
use chrono::{DateTime, Duration, Utc};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EscrowStatus {
    EscrowLocked,
    Released,
    Refunded,
}

/// Handle to a completed settlement, local or remote.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SettlementReference {
    pub escrow_id: String,
    pub session_id: SessionId,
    pub amount: f64,
    pub status: EscrowStatus,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

#[derive(Serialize)]
struct EscrowRequest<'a> {
    session_id: &'a str,
    buyer_agent_id: &'a str,
    seller_agent_id: &'a str,
    amount: f64,
    delivery_days: u32,
    penalty_per_day: f64,
}

#[derive(Clone)]
pub struct SettlementService {
    config: SettlementConfig,
    client: Client,
}

impl SettlementService {
    pub fn new(config: SettlementConfig) -> Self {
        Self {
            config,
            client: Client::new(),
        }
    }

    /// Lock the agreed amount in escrow. Remote when an endpoint is
    /// configured, local mock otherwise.
    pub async fn execute(
        &self,
        session_id: &str,
        buyer: &AgentId,
        seller: &AgentId,
        terms: &Terms,
    ) -> Result<SettlementReference> {
        match self.config.endpoint.as_deref().filter(|e| !e.is_empty()) {
            Some(endpoint) => {
                self.execute_remote(endpoint, session_id, buyer, seller, terms)
                    .await
            }
            None => Ok(self.execute_local(session_id, terms)),
        }
    }

    async fn execute_remote(
        &self,
        endpoint: &str,
        session_id: &str,
        buyer: &str,
        seller: &str,
        terms: &Terms,
    ) -> Result<SettlementReference> {
        let request = EscrowRequest {
            session_id,
            buyer_agent_id: buyer,
            seller_agent_id: seller,
            amount: terms.price,
            delivery_days: terms.delivery_days,
            penalty_per_day: terms.penalty_per_day,
        };

        let response = self
            .client
            .post(endpoint)
            .json(&request)
            .send()
            .await
            .map_err(|e| UcpError::Settlement(e.to_string()))?;

        if !response.status().is_success() {
            return Err(UcpError::Settlement(format!(
                "escrow service returned {}",
                response.status()
            )));
        }

        response
            .json()
            .await
            .map_err(|e| UcpError::Settlement(e.to_string()))
    }

    fn execute_local(&self, session_id: &str, terms: &Terms) -> SettlementReference {
        let reference = SettlementReference {
            escrow_id: format!("escrow-{}", Uuid::new_v4()),
            session_id: session_id.to_string(),
            amount: terms.price,
            status: EscrowStatus::EscrowLocked,
            created_at: Utc::now(),
            expires_at: Utc::now() + Duration::days(7),
        };
        tracing::info!(
            session = session_id,
            escrow = %reference.escrow_id,
            amount = terms.price,
            "funds locked in local escrow"
        );
        reference
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn terms() -> Terms {
        Terms {
            price: 280.0,
            delivery_days: 5,
            penalty_per_day: 15.0,
            service_type: "data_delivery".to_string(),
            escrow: true,
        }
    }

    #[tokio::test]
    async fn test_local_escrow_when_unconfigured() {
        let service = SettlementService::new(SettlementConfig { endpoint: None });
        let reference = service
            .execute("NEG-1", &"BUYER-1".to_string(), &"SELLER-1".to_string(), &terms())
            .await
            .unwrap();

        assert!(reference.escrow_id.starts_with("escrow-"));
        assert_eq!(reference.session_id, "NEG-1");
        assert_eq!(reference.amount, 280.0);
        assert_eq!(reference.status, EscrowStatus::EscrowLocked);
        assert!(reference.expires_at > reference.created_at);
    }

    #[tokio::test]
    async fn test_empty_endpoint_is_local() {
        let service = SettlementService::new(SettlementConfig {
            endpoint: Some(String::new()),
        });
        let reference = service
            .execute("NEG-2", &"BUYER-1".to_string(), &"SELLER-1".to_string(), &terms())
            .await
            .unwrap();
        assert_eq!(reference.status, EscrowStatus::EscrowLocked);
    }
}
