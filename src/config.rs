// =============================================================================
// Configuration — environment-variable driven
// =============================================================================
//
// All runtime knobs are read once at startup from the environment (with a
// `.env` file loaded first, for local development). Missing required
// variables are a Fatal error per the error-handling design: the process
// should not start with an incomplete configuration.
// =============================================================================

use std::env;

use anyhow::{Context, Result};

fn env_var(key: &str) -> Result<String> {
    env::var(key).with_context(|| format!("{key} missing from environment"))
}

fn env_var_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.parse::<T>().ok())
        .unwrap_or(default)
}

/// Filter-stage thresholds (C7).
#[derive(Debug, Clone)]
pub struct FilterConfig {
    pub order_flow_buy_threshold_pct: f64,
    pub aggressive_buy_threshold_pct: f64,
    pub min_baseline_sample: u32,
    pub min_strategy_signals: u32,
    pub low_win_rate_pct: f64,
    pub high_win_rate_pct: f64,
    pub require_order_flow: bool,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            order_flow_buy_threshold_pct: 50.0,
            aggressive_buy_threshold_pct: 55.0,
            min_baseline_sample: 30,
            min_strategy_signals: 15,
            low_win_rate_pct: 45.0,
            high_win_rate_pct: 60.0,
            require_order_flow: true,
        }
    }
}

/// Risk / admission-guard limits (C8).
#[derive(Debug, Clone)]
pub struct RiskConfig {
    pub max_daily_loss_pct: f64,
    pub max_consecutive_losses: u32,
    pub max_open_positions: u32,
    pub min_signal_interval_minutes: i64,
    pub max_holding_loss_pct: f64,
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            max_daily_loss_pct: 5.0,
            max_consecutive_losses: 3,
            max_open_positions: 8,
            min_signal_interval_minutes: 15,
            max_holding_loss_pct: 10.0,
        }
    }
}

/// ATR multipliers for exit-level computation (C8), per trade class.
#[derive(Debug, Clone, Copy)]
pub struct AtrMultipliers {
    pub k_sl: f64,
    pub k_tp1: f64,
    pub k_tp2: f64,
    pub k_ts: f64,
}

/// Breakeven-promotion knobs (C8).
#[derive(Debug, Clone, Copy)]
pub struct BreakevenConfig {
    pub trigger_pct: f64,
    pub buffer_pct: f64,
}

/// SWING trade settings (C8).
#[derive(Debug, Clone)]
pub struct SwingConfig {
    pub enabled: bool,
    pub min_confidence: f64,
    pub max_holding_days: i64,
    pub min_baseline_days: i64,
    pub position_size_pct: f64,
    pub require_trend: bool,
}

impl Default for SwingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            min_confidence: 0.75,
            max_holding_days: 10,
            min_baseline_days: 20,
            position_size_pct: 2.0,
            require_trend: true,
        }
    }
}

/// Top-level configuration, populated once at startup from the environment.
#[derive(Debug, Clone)]
pub struct Config {
    pub feed_url: String,
    pub feed_auth_url: String,
    pub database_url: String,
    pub redis_url: String,
    pub server_port: u16,
    pub admin_token: String,
    pub civil_timezone_offset_hours: i32,
    pub webhook_url: Option<String>,
    pub symbols: Vec<String>,
    pub filters: FilterConfig,
    pub risk: RiskConfig,
    pub day_multipliers: AtrMultipliers,
    pub swing_multipliers: AtrMultipliers,
    pub breakeven: BreakevenConfig,
    pub swing: SwingConfig,
}

impl Config {
    /// Load configuration from the environment. Loads `.env` first (if
    /// present) so local development does not require exporting every
    /// variable manually.
    pub fn from_env() -> Result<Self> {
        let _ = dotenv::dotenv();

        let database_url = env_var("DATABASE_URL")?;
        let feed_url = env_var_or("FEED_WS_URL", "wss://feed.example.invalid/stream");
        let feed_auth_url = env_var_or("FEED_AUTH_URL", "https://feed.example.invalid/auth");
        let redis_url = env_var_or("REDIS_URL", "redis://127.0.0.1:6379");
        let server_port = env_parse("SERVER_PORT", 3001u16);
        let admin_token = env_var_or("AURORA_ADMIN_TOKEN", "");
        let civil_timezone_offset_hours = env_parse("APP_TIMEZONE_OFFSET_HOURS", 7i32);
        let webhook_url = env::var("WEBHOOK_URL").ok().filter(|s| !s.is_empty());

        let symbols = env::var("AURORA_SYMBOLS")
            .ok()
            .map(|s| {
                s.split(',')
                    .map(|x| x.trim().to_uppercase())
                    .filter(|x| !x.is_empty())
                    .collect::<Vec<_>>()
            })
            .filter(|v| !v.is_empty())
            .unwrap_or_else(|| vec!["ABCD".into(), "EFGH".into()]);

        let filters = FilterConfig {
            order_flow_buy_threshold_pct: env_parse("FILTER_ORDER_FLOW_BUY_THRESHOLD_PCT", 50.0),
            aggressive_buy_threshold_pct: env_parse("FILTER_AGGRESSIVE_BUY_THRESHOLD_PCT", 55.0),
            min_baseline_sample: env_parse("FILTER_MIN_BASELINE_SAMPLE", 30),
            min_strategy_signals: env_parse("FILTER_MIN_STRATEGY_SIGNALS", 15),
            low_win_rate_pct: env_parse("FILTER_LOW_WIN_RATE_PCT", 45.0),
            high_win_rate_pct: env_parse("FILTER_HIGH_WIN_RATE_PCT", 60.0),
            require_order_flow: env_parse("FILTER_REQUIRE_ORDER_FLOW", true),
        };

        let risk = RiskConfig {
            max_daily_loss_pct: env_parse("RISK_MAX_DAILY_LOSS_PCT", 5.0),
            max_consecutive_losses: env_parse("RISK_MAX_CONSECUTIVE_LOSSES", 3),
            max_open_positions: env_parse("RISK_MAX_OPEN_POSITIONS", 8),
            min_signal_interval_minutes: env_parse("RISK_MIN_SIGNAL_INTERVAL_MINUTES", 15),
            max_holding_loss_pct: env_parse("RISK_MAX_HOLDING_LOSS_PCT", 10.0),
        };

        let day_multipliers = AtrMultipliers {
            k_sl: env_parse("ATR_DAY_K_SL", 1.5),
            k_tp1: env_parse("ATR_DAY_K_TP1", 3.0),
            k_tp2: env_parse("ATR_DAY_K_TP2", 6.0),
            k_ts: env_parse("ATR_DAY_K_TS", 1.5),
        };

        let swing_multipliers = AtrMultipliers {
            k_sl: env_parse("ATR_SWING_K_SL", 4.5),
            k_tp1: env_parse("ATR_SWING_K_TP1", 9.0),
            k_tp2: env_parse("ATR_SWING_K_TP2", 18.0),
            k_ts: env_parse("ATR_SWING_K_TS", 3.0),
        };

        let breakeven = BreakevenConfig {
            trigger_pct: env_parse("BREAKEVEN_TRIGGER_PCT", 1.0),
            buffer_pct: env_parse("BREAKEVEN_BUFFER_PCT", 0.15),
        };

        let swing = SwingConfig {
            enabled: env_parse("SWING_ENABLED", true),
            min_confidence: env_parse("SWING_MIN_CONFIDENCE", 0.75),
            max_holding_days: env_parse("SWING_MAX_HOLDING_DAYS", 10),
            min_baseline_days: env_parse("SWING_MIN_BASELINE_DAYS", 20),
            position_size_pct: env_parse("SWING_POSITION_SIZE_PCT", 2.0),
            require_trend: env_parse("SWING_REQUIRE_TREND", true),
        };

        Ok(Self {
            feed_url,
            feed_auth_url,
            database_url,
            redis_url,
            server_port,
            admin_token,
            civil_timezone_offset_hours,
            webhook_url,
            symbols,
            filters,
            risk,
            day_multipliers,
            swing_multipliers,
            breakeven,
            swing,
        })
    }

    /// The configured civil timezone as a fixed UTC offset (DESIGN.md open
    /// question: no IANA tz-database lookup, just a fixed offset).
    pub fn civil_offset(&self) -> chrono::FixedOffset {
        chrono::FixedOffset::east_opt(self.civil_timezone_offset_hours * 3600)
            .unwrap_or_else(|| chrono::FixedOffset::east_opt(0).unwrap())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn civil_offset_defaults_to_plus_seven() {
        let cfg = Config {
            feed_url: String::new(),
            feed_auth_url: String::new(),
            database_url: String::new(),
            redis_url: String::new(),
            server_port: 0,
            admin_token: String::new(),
            civil_timezone_offset_hours: 7,
            webhook_url: None,
            symbols: vec![],
            filters: FilterConfig::default(),
            risk: RiskConfig::default(),
            day_multipliers: AtrMultipliers {
                k_sl: 1.5,
                k_tp1: 3.0,
                k_tp2: 6.0,
                k_ts: 1.5,
            },
            swing_multipliers: AtrMultipliers {
                k_sl: 4.5,
                k_tp1: 9.0,
                k_tp2: 18.0,
                k_ts: 3.0,
            },
            breakeven: BreakevenConfig {
                trigger_pct: 1.0,
                buffer_pct: 0.15,
            },
            swing: SwingConfig::default(),
        };
        assert_eq!(cfg.civil_offset().local_minus_utc(), 7 * 3600);
    }
}
