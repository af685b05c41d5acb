//! Risk simulation engine: deterministic multi-factor scoring of proposed
//! terms, plus a stochastic Monte Carlo companion mode.

use crate::{config::SimulationConfig, protocol::Terms, store::StoreClient};
use rand::Rng;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Confidence {
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Recommendation {
    Proceed,
    Caution,
    Abort,
}

/// Immutable outcome of one risk assessment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulationResult {
    pub risk_score: f64,
    pub recommended_penalty: f64,
    pub delivery_failure_probability: f64,
    pub dispute_likelihood: f64,
    pub confidence: Confidence,
    pub recommendation: Recommendation,
    pub reasoning: String,
    pub factors_analyzed: Vec<String>,
}

/// Historical delivery/dispute baseline, fetched from the analytics
/// collaborator or synthesized when it is unreachable.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoricalContext {
    pub similar_contracts: u32,
    pub average_on_time_delivery: f64,
    pub average_dispute_rate: f64,
}

impl HistoricalContext {
    pub fn synthetic(rng: &mut impl Rng) -> Self {
        Self {
            similar_contracts: rng.gen_range(10..60),
            average_on_time_delivery: rng.gen_range(0.80..0.90),
            average_dispute_rate: rng.gen_range(0.03..0.07),
        }
    }
}

/// Additive risk contributions per factor; overall risk is their sum capped
/// at 1.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RiskFactors {
    pub price: f64,
    pub delivery: f64,
    pub penalty: f64,
    pub service: f64,
}

impl RiskFactors {
    pub fn overall(&self) -> f64 {
        (self.price + self.delivery + self.penalty + self.service).min(1.0)
    }
}

/// Aggregate of one Monte Carlo run. Trials are independent and identically
/// distributed; nothing is shared between them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonteCarloOutcome {
    pub success_probability: f64,
    pub average_profit: f64,
    pub worst_case: f64,
    pub best_case: f64,
    pub iterations: u32,
}

#[derive(Clone)]
pub struct RiskSimulator {
    config: SimulationConfig,
    store: StoreClient,
}

impl RiskSimulator {
    pub fn new(config: SimulationConfig, store: StoreClient) -> Self {
        Self { config, store }
    }

    /// Score terms against the historical baseline, fetching context from
    /// the analytics collaborator first and synthesizing it on failure.
    pub async fn assess(&self, terms: &Terms) -> SimulationResult {
        let context = match self.store.historical_context().await {
            Ok(context) => context,
            Err(e) => {
                tracing::debug!(error = %e, "analytics unavailable, synthesizing historical context");
                HistoricalContext::synthetic(&mut rand::thread_rng())
            }
        };
        self.score(terms, &context)
    }

    /// Deterministic scoring path, given a historical baseline.
    pub fn score(&self, terms: &Terms, context: &HistoricalContext) -> SimulationResult {
        let factors = self.risk_factors(terms);
        let risk_score = factors.overall();
        let delivery_failure_probability = 1.0 - self.delivery_success_probability(terms, context);
        let dispute_likelihood = self.dispute_likelihood(terms, context);
        let recommended_penalty = self.recommended_penalty(terms.price, risk_score);
        let recommendation =
            self.recommendation(risk_score, delivery_failure_probability, dispute_likelihood);
        let confidence = self.confidence(risk_score);

        SimulationResult {
            risk_score,
            recommended_penalty,
            delivery_failure_probability,
            dispute_likelihood,
            confidence,
            recommendation,
            reasoning: format!(
                "Risk assessment: {:.2}, Delivery risk: {:.2}, Dispute risk: {:.2}",
                risk_score, delivery_failure_probability, dispute_likelihood
            ),
            factors_analyzed: vec![
                "price_risk".to_string(),
                "delivery_time".to_string(),
                "penalty_structure".to_string(),
                "historical_performance".to_string(),
            ],
        }
    }

    pub fn risk_factors(&self, terms: &Terms) -> RiskFactors {
        let price = if terms.price > 300.0 {
            0.3
        } else if terms.price > 200.0 {
            0.15
        } else {
            0.05
        };
        let delivery = if terms.delivery_days > 7 {
            0.4
        } else if terms.delivery_days > 5 {
            0.2
        } else {
            0.1
        };
        let penalty = if terms.penalty_per_day >= 10.0 { 0.1 } else { 0.3 };
        let service = if terms.service_type == self.config.recognized_service_type {
            0.1
        } else {
            0.2
        };
        RiskFactors {
            price,
            delivery,
            penalty,
            service,
        }
    }

    fn delivery_success_probability(&self, terms: &Terms, context: &HistoricalContext) -> f64 {
        let days_multiplier = if terms.delivery_days <= 3 {
            0.9
        } else if terms.delivery_days <= 5 {
            1.0
        } else {
            0.8
        };
        let complexity_multiplier = if terms.price > 250.0 { 0.9 } else { 1.0 };
        (context.average_on_time_delivery * days_multiplier * complexity_multiplier).clamp(0.0, 1.0)
    }

    fn dispute_likelihood(&self, terms: &Terms, context: &HistoricalContext) -> f64 {
        let price_multiplier = if terms.price > 300.0 {
            1.5
        } else if terms.price > 200.0 {
            1.2
        } else {
            1.0
        };
        let time_multiplier = if terms.delivery_days > 7 {
            1.3
        } else if terms.delivery_days > 5 {
            1.1
        } else {
            1.0
        };
        let penalty_multiplier = if terms.penalty_per_day <= 0.0 { 1.4 } else { 1.0 };
        (context.average_dispute_rate * price_multiplier * time_multiplier * penalty_multiplier)
            .clamp(0.0, 1.0)
    }

    fn recommended_penalty(&self, price: f64, risk_score: f64) -> f64 {
        (price * self.config.penalty_rate * (risk_score * 2.0).max(1.0)).round()
    }

    fn recommendation(&self, risk: f64, failure: f64, dispute: f64) -> Recommendation {
        let c = &self.config;
        if risk > c.abort_risk_threshold
            || failure > c.abort_failure_threshold
            || dispute > c.abort_dispute_threshold
        {
            Recommendation::Abort
        } else if risk > c.caution_risk_threshold
            || failure > c.caution_failure_threshold
            || dispute > c.caution_dispute_threshold
        {
            Recommendation::Caution
        } else {
            Recommendation::Proceed
        }
    }

    fn confidence(&self, risk: f64) -> Confidence {
        if risk < self.config.high_confidence_risk {
            Confidence::High
        } else if risk < self.config.medium_confidence_risk {
            Confidence::Medium
        } else {
            Confidence::Low
        }
    }

    /// Stochastic companion mode. Each trial draws delivery success and
    /// dispute occurrence independently; profit starts at the margin and is
    /// charged the full penalty window on failure and half the price on a
    /// dispute.
    pub fn run_monte_carlo(
        &self,
        terms: &Terms,
        iterations: u32,
        rng: &mut impl Rng,
    ) -> MonteCarloOutcome {
        let iterations = iterations.max(1);
        let mut successes = 0u32;
        let mut total_profit = 0.0f64;
        let mut worst_case = f64::INFINITY;
        let mut best_case = f64::NEG_INFINITY;

        for _ in 0..iterations {
            let delivered = rng.gen_bool(self.config.trial_delivery_success);
            let disputed = rng.gen_bool(self.config.trial_dispute_rate);

            let mut profit = terms.price * self.config.profit_margin_rate;
            if !delivered {
                profit -= terms.penalty_per_day * terms.delivery_days as f64;
            }
            if disputed {
                profit -= terms.price * self.config.dispute_cost_rate;
            }

            if delivered && !disputed {
                successes += 1;
            }
            total_profit += profit;
            worst_case = worst_case.min(profit);
            best_case = best_case.max(profit);
        }

        MonteCarloOutcome {
            success_probability: successes as f64 / iterations as f64,
            average_profit: total_profit / iterations as f64,
            worst_case,
            best_case,
            iterations,
        }
    }

    pub fn default_iterations(&self) -> u32 {
        self.config.default_iterations
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SimulationConfig;
    use proptest::prelude::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn simulator() -> RiskSimulator {
        RiskSimulator::new(SimulationConfig::default(), StoreClient::disabled())
    }

    fn terms(price: f64, days: u32, penalty: f64) -> Terms {
        Terms {
            price,
            delivery_days: days,
            penalty_per_day: penalty,
            service_type: "data_delivery".to_string(),
            escrow: true,
        }
    }

    fn context() -> HistoricalContext {
        HistoricalContext {
            similar_contracts: 25,
            average_on_time_delivery: 0.85,
            average_dispute_rate: 0.05,
        }
    }

    #[test]
    fn test_risk_factor_breakpoints() {
        let sim = simulator();

        let low = sim.risk_factors(&terms(150.0, 3, 20.0));
        assert_eq!(low.price, 0.05);
        assert_eq!(low.delivery, 0.1);
        assert_eq!(low.penalty, 0.1);
        assert_eq!(low.service, 0.1);

        let high = sim.risk_factors(&terms(350.0, 9, 0.0));
        assert_eq!(high.price, 0.3);
        assert_eq!(high.delivery, 0.4);
        assert_eq!(high.penalty, 0.3);
        assert_eq!(high.overall(), 1.0);

        let mut other_service = terms(150.0, 3, 20.0);
        other_service.service_type = "translation".to_string();
        assert_eq!(sim.risk_factors(&other_service).service, 0.2);
    }

    #[test]
    fn test_low_risk_terms_proceed() {
        let sim = simulator();
        let result = sim.score(&terms(150.0, 5, 20.0), &context());

        assert!(result.risk_score <= 0.4);
        assert_eq!(result.recommendation, Recommendation::Proceed);
        assert_eq!(result.confidence, Confidence::Medium);
        // 1 - 0.85 with neutral multipliers.
        assert!((result.delivery_failure_probability - 0.15).abs() < 1e-9);
        assert!(result.dispute_likelihood < 0.1);
    }

    #[test]
    fn test_high_risk_terms_abort() {
        let sim = simulator();
        let result = sim.score(&terms(350.0, 9, 0.0), &context());

        assert_eq!(result.risk_score, 1.0);
        assert_eq!(result.recommendation, Recommendation::Abort);
        assert_eq!(result.confidence, Confidence::Low);
        assert!(result.dispute_likelihood > 0.1);
    }

    #[test]
    fn test_recommended_penalty() {
        let sim = simulator();
        // risk 0.45 -> multiplier 1.0; 300 * 0.05 = 15
        let result = sim.score(&terms(300.0, 5, 20.0), &context());
        assert_eq!(result.recommended_penalty, 15.0);

        // risk 1.0 -> multiplier 2.0; 350 * 0.05 * 2 = 35
        let result = sim.score(&terms(350.0, 9, 0.0), &context());
        assert_eq!(result.recommended_penalty, 35.0);
    }

    #[test]
    fn test_recommendation_monotonic_in_risk() {
        let sim = simulator();
        let ctx = context();
        let mut last_risk = -1.0;
        let mut last_rec = Recommendation::Proceed;

        // Increasingly risky terms: recommendation never improves as the
        // risk score rises.
        for t in [
            terms(150.0, 3, 20.0),
            terms(250.0, 5, 20.0),
            terms(250.0, 6, 20.0),
            terms(350.0, 6, 5.0),
            terms(350.0, 9, 0.0),
        ] {
            let result = sim.score(&t, &ctx);
            assert!(result.risk_score >= last_risk);
            assert!(result.recommendation >= last_rec);
            last_risk = result.risk_score;
            last_rec = result.recommendation;
        }
    }

    #[test]
    fn test_monte_carlo_statistical_bound() {
        let sim = simulator();
        let mut rng = StdRng::seed_from_u64(42);
        let outcome = sim.run_monte_carlo(&terms(300.0, 5, 20.0), 1000, &mut rng);

        assert_eq!(outcome.iterations, 1000);
        // Per-trial success is 0.85 * 0.95 ~= 0.8075; three sigma over 1000
        // trials stays well inside +-0.05.
        assert!((outcome.success_probability - 0.8075).abs() < 0.05);
        assert!(outcome.best_case <= 300.0 * 0.8);
        assert!(outcome.worst_case >= 300.0 * 0.8 - 20.0 * 5.0 - 300.0 * 0.5);
        assert!(outcome.average_profit <= outcome.best_case);
        assert!(outcome.average_profit >= outcome.worst_case);
    }

    proptest! {
        #[test]
        fn prop_risk_score_in_unit_interval(
            price in 1.0f64..10_000.0,
            days in 1u32..60,
            penalty in 0.0f64..500.0,
        ) {
            let sim = simulator();
            let result = sim.score(&terms(price, days, penalty), &context());
            prop_assert!((0.0..=1.0).contains(&result.risk_score));
            prop_assert!((0.0..=1.0).contains(&result.delivery_failure_probability));
            prop_assert!((0.0..=1.0).contains(&result.dispute_likelihood));
            prop_assert!(result.recommended_penalty >= 0.0);
        }
    }
}
