//! Mediation engine: detects stalled negotiations and proposes compromise
//! terms.
//!
//! The engine is pure analysis over a session's offer history; the mediator
//! agent decides when to run it and what to do with the proposal.

use crate::{
    config::MediationConfig,
    oracle::DecisionOracle,
    protocol::Terms,
    session::Offer,
    simulation::Confidence,
};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NegotiationStage {
    Early,
    Active,
    Prolonged,
}

/// Convergence snapshot of one negotiation, computed from its chronological
/// offer history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NegotiationDynamics {
    pub stage: NegotiationStage,
    pub needs_mediation: bool,
    pub price_spread: f64,
    pub delivery_spread: f64,
    pub rounds: usize,
    pub latest_prices: Vec<f64>,
    pub latest_delivery_days: Vec<u32>,
}

impl NegotiationDynamics {
    fn early() -> Self {
        Self {
            stage: NegotiationStage::Early,
            needs_mediation: false,
            price_spread: 0.0,
            delivery_spread: 0.0,
            rounds: 0,
            latest_prices: Vec::new(),
            latest_delivery_days: Vec::new(),
        }
    }
}

/// Compromise terms suggested to both parties.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MediationProposal {
    pub terms: Terms,
    pub reasoning: String,
    pub confidence: Confidence,
    pub success_probability: f64,
    pub fairness_score: f64,
}

/// Oracle reply shape for a mediation proposal.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct MediationDraft {
    price: f64,
    delivery_days: u32,
    penalty_per_day: f64,
    reasoning: String,
    confidence: Confidence,
    success_probability: f64,
    fairness_score: f64,
}

/// Price band both parties can plausibly live with, derived from their
/// assumed reserve prices.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CompromiseZone {
    pub min: f64,
    pub max: f64,
    pub optimal_price: f64,
}

#[derive(Clone)]
pub struct MediationEngine {
    config: MediationConfig,
    oracle: DecisionOracle,
}

impl MediationEngine {
    pub fn new(config: MediationConfig, oracle: DecisionOracle) -> Self {
        Self { config, oracle }
    }

    /// Measure convergence over the offer history. Fewer than two offers is
    /// always `Early` and never triggers mediation.
    pub fn analyze(&self, offers: &[Offer]) -> NegotiationDynamics {
        if offers.len() < 2 {
            return NegotiationDynamics::early();
        }

        let prices: Vec<f64> = offers.iter().map(|o| o.price).collect();
        let delivery: Vec<u32> = offers.iter().map(|o| o.delivery_days).collect();

        let max_price = prices.iter().cloned().fold(f64::MIN, f64::max);
        let min_price = prices.iter().cloned().fold(f64::MAX, f64::min);
        let price_spread = if max_price > 0.0 {
            (max_price - min_price) / max_price
        } else {
            0.0
        };

        let max_days = delivery.iter().copied().max().unwrap_or(0);
        let min_days = delivery.iter().copied().min().unwrap_or(0);
        let delivery_spread = if max_days > 0 {
            (max_days - min_days) as f64 / max_days as f64
        } else {
            0.0
        };

        let rounds = offers.len();
        let needs_mediation = price_spread > self.config.price_spread_threshold
            || delivery_spread > self.config.delivery_spread_threshold
            || rounds > self.config.max_rounds;

        let tail = rounds.saturating_sub(3);
        NegotiationDynamics {
            stage: if rounds > self.config.prolonged_rounds {
                NegotiationStage::Prolonged
            } else {
                NegotiationStage::Active
            },
            needs_mediation,
            price_spread,
            delivery_spread,
            rounds,
            latest_prices: prices[tail..].to_vec(),
            latest_delivery_days: delivery[tail..].to_vec(),
        }
    }

    pub fn should_mediate(&self, dynamics: &NegotiationDynamics) -> bool {
        if dynamics.stage == NegotiationStage::Early {
            return false;
        }
        dynamics.needs_mediation || dynamics.rounds > self.config.max_rounds
    }

    /// Draft compromise terms, asking the oracle first and computing the
    /// mathematical fallback when it is unavailable.
    pub async fn propose(
        &self,
        dynamics: &NegotiationDynamics,
        service_type: &str,
    ) -> MediationProposal {
        let system = "You are a neutral mediator between two negotiating commerce agents. \
                      Propose fair compromise terms both parties can profit from. \
                      Respond with JSON only: {\"price\": number, \"delivery_days\": number, \
                      \"penalty_per_day\": number, \"reasoning\": string, \
                      \"confidence\": \"LOW|MEDIUM|HIGH\", \"success_probability\": number, \
                      \"fairness_score\": number}";
        let prompt = format!(
            "Negotiation dynamics:\n\
             - price spread: {:.1}%\n\
             - delivery spread: {:.1}%\n\
             - rounds so far: {}\n\
             - latest prices: {:?}\n\
             - latest delivery days: {:?}",
            dynamics.price_spread * 100.0,
            dynamics.delivery_spread * 100.0,
            dynamics.rounds,
            dynamics.latest_prices,
            dynamics.latest_delivery_days,
        );

        let fallback = self.fallback_proposal(dynamics, service_type);
        let draft: MediationDraft = self
            .oracle
            .decide_or(system, &prompt, || MediationDraft {
                price: fallback.terms.price,
                delivery_days: fallback.terms.delivery_days,
                penalty_per_day: fallback.terms.penalty_per_day,
                reasoning: fallback.reasoning.clone(),
                confidence: fallback.confidence,
                success_probability: fallback.success_probability,
                fairness_score: fallback.fairness_score,
            })
            .await;

        MediationProposal {
            terms: Terms {
                price: draft.price,
                delivery_days: draft.delivery_days,
                penalty_per_day: draft.penalty_per_day,
                service_type: service_type.to_string(),
                escrow: true,
            },
            reasoning: draft.reasoning,
            confidence: draft.confidence,
            success_probability: draft.success_probability,
            fairness_score: draft.fairness_score,
        }
    }

    /// Median-based compromise over the last three offers: the median price
    /// gets a small premium, delivery is clamped to the standard window and
    /// the penalty tracks the settled price.
    pub fn fallback_proposal(
        &self,
        dynamics: &NegotiationDynamics,
        service_type: &str,
    ) -> MediationProposal {
        let mut prices = dynamics.latest_prices.clone();
        prices.sort_by(|a, b| a.total_cmp(b));
        let median_price = prices.get(prices.len() / 2).copied().unwrap_or(0.0);

        let mut delivery = dynamics.latest_delivery_days.clone();
        delivery.sort_unstable();
        let median_delivery = delivery.get(delivery.len() / 2).copied().unwrap_or(0);

        let fair_price = (median_price * (1.0 + self.config.compromise_premium)).round();
        let fair_delivery = median_delivery.clamp(
            self.config.min_delivery_days,
            self.config.max_delivery_days,
        );
        let fair_penalty = (fair_price * self.config.penalty_rate).round();

        MediationProposal {
            terms: Terms {
                price: fair_price,
                delivery_days: fair_delivery,
                penalty_per_day: fair_penalty,
                service_type: service_type.to_string(),
                escrow: true,
            },
            reasoning: format!(
                "Mathematical mediation: median price ${} adjusted for fairness, median delivery {} days",
                median_price, median_delivery
            ),
            confidence: Confidence::Medium,
            success_probability: 0.75,
            fairness_score: 0.85,
        }
    }

    /// Reserve-price analysis over the latest offers. The buyer is assumed
    /// to tolerate 10% under the lowest offer and the seller 10% over the
    /// highest; the zone exists only when those reserves overlap.
    pub fn compromise_zone(&self, dynamics: &NegotiationDynamics) -> Option<CompromiseZone> {
        let max_price = dynamics
            .latest_prices
            .iter()
            .cloned()
            .fold(f64::MIN, f64::max);
        let min_price = dynamics
            .latest_prices
            .iter()
            .cloned()
            .fold(f64::MAX, f64::min);
        if dynamics.latest_prices.is_empty() {
            return None;
        }

        let buyer_reserve = min_price * 0.9;
        let seller_reserve = max_price * 1.1;
        let zone_min = buyer_reserve.max(seller_reserve * 0.8);
        let zone_max = seller_reserve.min(buyer_reserve * 1.2);
        if zone_min > zone_max {
            return None;
        }

        Some(CompromiseZone {
            min: zone_min,
            max: zone_max,
            optimal_price: (zone_min + zone_max) / 2.0,
        })
    }
}
