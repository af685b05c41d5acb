use crate::error::{Result, UcpError};
use crate::protocol::PriceRange;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Top-level configuration. All hand-tuned negotiation and risk constants
/// live here with the protocol defaults, so deployments can retune them
/// without touching code.
#[derive(Debug, Deserialize, Clone, Serialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub agent: AgentSection,
    pub buyer: BuyerConfig,
    pub seller: SellerConfig,
    pub negotiation: NegotiationConfig,
    pub mediation: MediationConfig,
    pub simulation: SimulationConfig,
    pub oracle: OracleConfig,
    pub store: StoreConfig,
    pub settlement: SettlementConfig,
    pub network: NetworkConfig,
    pub server: ServerConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize, Clone, Serialize)]
#[serde(default)]
pub struct AgentSection {
    pub id: String,
    pub name: String,
    pub role: String,
}

#[derive(Debug, Deserialize, Clone, Serialize)]
#[serde(default)]
pub struct BuyerConfig {
    pub service_type: String,
    pub max_price: f64,
    pub preferred_delivery_days: u32,
    pub risk_tolerance: String,
    /// Ceiling applied to the deterministic fallback opening offer
    /// (80% of max price, capped here).
    pub initial_offer_ceiling: f64,
    pub initial_penalty_per_day: f64,
}

#[derive(Debug, Deserialize, Clone, Serialize)]
#[serde(default)]
pub struct SellerConfig {
    pub service_type: String,
    pub price_range: PriceRange,
    pub delivery_sla_days: Vec<u32>,
    pub quality_level: String,
    pub default_penalty_per_day: f64,
}

/// Reputation deltas applied on negotiation and mediation outcomes.
#[derive(Debug, Deserialize, Clone, Serialize)]
#[serde(default)]
pub struct NegotiationConfig {
    pub initial_reputation: u8,
    pub accept_reward: i32,
    pub reject_penalty: i32,
    pub mediation_reward: i32,
    pub mediation_penalty: i32,
}

#[derive(Debug, Deserialize, Clone, Serialize)]
#[serde(default)]
pub struct MediationConfig {
    /// Price spread (as a fraction of the highest offer) beyond which the
    /// parties are considered far apart.
    pub price_spread_threshold: f64,
    pub delivery_spread_threshold: f64,
    /// Round count beyond which mediation is always offered.
    pub max_rounds: usize,
    /// Round count beyond which the negotiation is considered prolonged.
    pub prolonged_rounds: usize,
    pub compromise_premium: f64,
    pub min_delivery_days: u32,
    pub max_delivery_days: u32,
    pub penalty_rate: f64,
}

#[derive(Debug, Deserialize, Clone, Serialize)]
#[serde(default)]
pub struct SimulationConfig {
    pub recognized_service_type: String,
    pub abort_risk_threshold: f64,
    pub caution_risk_threshold: f64,
    pub abort_failure_threshold: f64,
    pub caution_failure_threshold: f64,
    pub abort_dispute_threshold: f64,
    pub caution_dispute_threshold: f64,
    pub high_confidence_risk: f64,
    pub medium_confidence_risk: f64,
    pub penalty_rate: f64,
    pub default_iterations: u32,
    pub trial_delivery_success: f64,
    pub trial_dispute_rate: f64,
    pub profit_margin_rate: f64,
    pub dispute_cost_rate: f64,
}

#[derive(Debug, Deserialize, Clone, Serialize)]
#[serde(default)]
pub struct OracleConfig {
    pub api_base: String,
    pub api_key: Option<String>,
    pub model: String,
    pub max_tokens: u32,
    pub temperature: f64,
    pub timeout_seconds: u64,
}

#[derive(Debug, Deserialize, Clone, Serialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Base URL of the external session store. Empty disables persistence;
    /// in-memory state is always authoritative.
    pub base_url: String,
    pub api_key: Option<String>,
}

#[derive(Debug, Deserialize, Clone, Serialize)]
#[serde(default)]
pub struct SettlementConfig {
    pub endpoint: Option<String>,
}

#[derive(Debug, Deserialize, Clone, Serialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// Gateway the periodic discovery/heartbeat broadcasts are posted to.
    pub gateway_url: Option<String>,
    pub discovery_interval_secs: u64,
    pub heartbeat_interval_secs: u64,
}

#[derive(Debug, Deserialize, Clone, Serialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Deserialize, Clone, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub format: Option<String>,
}

impl Default for AgentSection {
    fn default() -> Self {
        Self {
            id: String::new(),
            name: "ucp-agent".to_string(),
            role: "buyer".to_string(),
        }
    }
}

impl Default for BuyerConfig {
    fn default() -> Self {
        Self {
            service_type: "data_delivery".to_string(),
            max_price: 300.0,
            preferred_delivery_days: 5,
            risk_tolerance: "medium".to_string(),
            initial_offer_ceiling: 300.0,
            initial_penalty_per_day: 15.0,
        }
    }
}

impl Default for SellerConfig {
    fn default() -> Self {
        Self {
            service_type: "data_delivery".to_string(),
            price_range: PriceRange { min: 200.0, max: 400.0 },
            delivery_sla_days: vec![3, 5, 7],
            quality_level: "premium".to_string(),
            default_penalty_per_day: 20.0,
        }
    }
}

impl Default for NegotiationConfig {
    fn default() -> Self {
        Self {
            initial_reputation: 50,
            accept_reward: 5,
            reject_penalty: 2,
            mediation_reward: 3,
            mediation_penalty: 1,
        }
    }
}

impl Default for MediationConfig {
    fn default() -> Self {
        Self {
            price_spread_threshold: 0.3,
            delivery_spread_threshold: 0.4,
            max_rounds: 6,
            prolonged_rounds: 4,
            compromise_premium: 0.05,
            min_delivery_days: 3,
            max_delivery_days: 7,
            penalty_rate: 0.05,
        }
    }
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            recognized_service_type: "data_delivery".to_string(),
            abort_risk_threshold: 0.7,
            caution_risk_threshold: 0.4,
            abort_failure_threshold: 0.3,
            caution_failure_threshold: 0.2,
            abort_dispute_threshold: 0.15,
            caution_dispute_threshold: 0.1,
            high_confidence_risk: 0.3,
            medium_confidence_risk: 0.6,
            penalty_rate: 0.05,
            default_iterations: 1000,
            trial_delivery_success: 0.85,
            trial_dispute_rate: 0.05,
            profit_margin_rate: 0.8,
            dispute_cost_rate: 0.5,
        }
    }
}

impl Default for OracleConfig {
    fn default() -> Self {
        Self {
            api_base: "https://api.groq.com/openai/v1".to_string(),
            api_key: None,
            model: "llama3-70b-8192".to_string(),
            max_tokens: 1000,
            temperature: 0.7,
            timeout_seconds: 30,
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            api_key: None,
        }
    }
}

impl Default for SettlementConfig {
    fn default() -> Self {
        Self { endpoint: None }
    }
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            gateway_url: None,
            discovery_interval_secs: 30,
            heartbeat_interval_secs: 60,
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: None,
        }
    }
}

impl AppConfig {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let config_str = std::fs::read_to_string(path)
            .map_err(|e| UcpError::Config(format!("failed to read config file: {}", e)))?;

        let config: AppConfig = toml::from_str(&config_str)
            .map_err(|e| UcpError::Config(format!("failed to parse config file: {}", e)))?;

        Ok(config)
    }

    pub fn load_with_env_overrides<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut config = Self::load(path)?;
        config.apply_env_overrides();
        Ok(config)
    }

    pub fn apply_env_overrides(&mut self) {
        if let Ok(key) = std::env::var("UCP_ORACLE_API_KEY") {
            self.oracle.api_key = Some(key);
        }
        if let Ok(key) = std::env::var("UCP_STORE_API_KEY") {
            self.store.api_key = Some(key);
        }
        if let Ok(url) = std::env::var("UCP_STORE_URL") {
            self.store.base_url = url;
        }
        if let Ok(level) = std::env::var("RUST_LOG") {
            self.logging.level = level;
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.server.port == 0 {
            return Err(UcpError::Config("server port cannot be 0".to_string()));
        }
        if self.buyer.max_price <= 0.0 {
            return Err(UcpError::Config("buyer max_price must be positive".to_string()));
        }
        if self.seller.price_range.min > self.seller.price_range.max {
            return Err(UcpError::Config(
                "seller price_range.min must not exceed price_range.max".to_string(),
            ));
        }
        if self.seller.delivery_sla_days.is_empty() {
            return Err(UcpError::Config(
                "seller delivery_sla_days cannot be empty".to_string(),
            ));
        }
        if self.mediation.min_delivery_days > self.mediation.max_delivery_days {
            return Err(UcpError::Config(
                "mediation delivery window is inverted".to_string(),
            ));
        }
        if self.simulation.default_iterations == 0 {
            return Err(UcpError::Config(
                "simulation default_iterations must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    pub fn server_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}

pub fn create_default_config_file<P: AsRef<Path>>(path: P) -> Result<()> {
    let default_config = AppConfig::default();
    let toml_str = toml::to_string_pretty(&default_config)
        .map_err(|e| UcpError::Config(format!("failed to serialize default config: {}", e)))?;

    std::fs::write(path, toml_str)
        .map_err(|e| UcpError::Config(format!("failed to write default config file: {}", e)))?;

    Ok(())
}
