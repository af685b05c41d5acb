//! HTTP inbox for an agent, plus the outbound delivery helper.
//!
//! Peers POST UCP messages to `/ucp`; the reply body carries the messages
//! the handler produced. Malformed envelopes and unknown sessions are
//! dropped with a log line and an empty reply, never an error status.

use crate::{agent::Agent, error::UcpError, protocol::UcpMessage};
use axum::{
    extract::State,
    response::Json,
    routing::{get, post},
    Router,
};
use serde_json::json;
use std::sync::Arc;
use tokio::sync::Mutex;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

pub type SharedAgent = Arc<Mutex<Agent>>;

pub fn router(agent: SharedAgent) -> Router {
    Router::new()
        .route("/ucp", post(handle_ucp))
        .route("/health", get(health))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(agent)
}

async fn handle_ucp(
    State(agent): State<SharedAgent>,
    body: String,
) -> Json<Vec<UcpMessage>> {
    let msg = match UcpMessage::from_json(&body) {
        Ok(msg) => msg,
        Err(e) => {
            tracing::warn!(error = %e, "invalid message dropped");
            return Json(Vec::new());
        }
    };

    let mut agent = agent.lock().await;
    match agent.handle(msg).await {
        Ok(replies) => Json(replies),
        Err(e @ UcpError::SessionNotFound(_)) => {
            tracing::warn!(error = %e, "message for unknown session dropped");
            Json(Vec::new())
        }
        Err(e) => {
            tracing::warn!(error = %e, "message dropped");
            Json(Vec::new())
        }
    }
}

async fn health(State(agent): State<SharedAgent>) -> Json<serde_json::Value> {
    let agent = agent.lock().await;
    Json(json!({
        "status": "healthy",
        "agent_id": agent.id,
        "role": agent.role.as_str(),
        "reputation": agent.reputation.score(&agent.id),
        "sessions": agent.sessions.len(),
    }))
}

/// Deliver a message to a peer or network gateway. Delivery failures are
/// reported, not fatal; the caller decides whether to retry on the next
/// tick.
pub async fn deliver(client: &reqwest::Client, url: &str, msg: &UcpMessage) -> crate::Result<()> {
    let body = msg.to_json()?;
    let response = client
        .post(url)
        .header("content-type", "application/json")
        .body(body)
        .send()
        .await?;
    if !response.status().is_success() {
        return Err(UcpError::Persistence(format!(
            "gateway at {} returned {}",
            url,
            response.status()
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;
    use crate::protocol::Terms;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    fn shared_agent(role: &str) -> SharedAgent {
        let mut config = AppConfig::default();
        config.agent.role = role.to_string();
        config.agent.id = format!("{}-1", role.to_uppercase());
        Arc::new(Mutex::new(Agent::from_config(&config).unwrap()))
    }

    async fn post_ucp(app: Router, body: String) -> (StatusCode, Vec<UcpMessage>) {
        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/ucp")
                    .header("content-type", "application/json")
                    .body(Body::from(body))
                    .unwrap(),
            )
            .await
            .unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn test_proposal_round_trip_over_http() {
        let app = router(shared_agent("seller"));
        let terms = Terms {
            price: 250.0,
            delivery_days: 5,
            penalty_per_day: 15.0,
            service_type: "data_delivery".to_string(),
            escrow: true,
        };
        let proposal =
            UcpMessage::proposal("BUYER-1", "SELLER-1", "NEG-1", &terms).unwrap();

        let (status, replies) = post_ucp(app, proposal.to_json().unwrap()).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(replies.len(), 1);
        assert_eq!(replies[0].message_type, crate::protocol::MessageType::Accept);
    }

    #[tokio::test]
    async fn test_invalid_message_dropped_quietly() {
        let app = router(shared_agent("seller"));
        let (status, replies) = post_ucp(app.clone(), "{\"type\": \"BRIBE\"}".to_string()).await;
        assert_eq!(status, StatusCode::OK);
        assert!(replies.is_empty());

        let (status, replies) = post_ucp(app, "not json".to_string()).await;
        assert_eq!(status, StatusCode::OK);
        assert!(replies.is_empty());
    }

    #[tokio::test]
    async fn test_unknown_session_dropped_quietly() {
        let app = router(shared_agent("buyer"));
        let terms = Terms {
            price: 250.0,
            delivery_days: 5,
            penalty_per_day: 15.0,
            service_type: "data_delivery".to_string(),
            escrow: true,
        };
        let counter =
            UcpMessage::counter("SELLER-1", "BUYER-1", "NEG-404", &terms, None).unwrap();
        let (status, replies) = post_ucp(app, counter.to_json().unwrap()).await;
        assert_eq!(status, StatusCode::OK);
        assert!(replies.is_empty());
    }

    #[tokio::test]
    async fn test_health_reports_identity() {
        let app = router(shared_agent("mediator"));
        let response = app
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["status"], "healthy");
        assert_eq!(body["role"], "mediator");
    }
}
