// src/config.rs
use crate::analysis::AnalyzerConfig;
use crate::domain::errors::{AppError, AppResult};
use crate::exchange::SimulatedFeedSettings;
use crate::market_data::{MarketDataSettings, DEFAULT_BAR_RETENTION, DEFAULT_RESOLUTIONS};
use crate::notification::NotificationConfig;
use crate::persistence::PersistenceConfig;
use crate::signals::ImbalanceConfig;
use dotenv::dotenv;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

/// Imbalance monitor configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Instrument, resolutions and analysis cadence
    pub monitor: MonitorConfig,

    /// Exchange adapters to start
    pub exchange: ExchangeConfig,

    /// Imbalance rule thresholds
    pub imbalance: ImbalanceConfig,

    /// Zone and breakout tunables
    pub analyzer: AnalyzerConfig,

    /// Alert validation batching
    pub notification: NotificationConfig,

    /// Completed bar log
    pub persistence: PersistenceConfig,

    /// Logging configuration
    pub logging: LoggingConfig,
}

/// Monitoring configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    /// Monitored symbol (e.g., "ETHUSDT")
    pub symbol: String,

    /// Tick bar resolutions, in trades per bar
    pub resolutions: Vec<u32>,

    /// Period of the analysis timer
    pub analysis_interval_ms: u64,

    /// Most recent bars examined per resolution on each pass
    pub bars_per_pass: usize,

    /// Completed bars retained per resolution
    pub bar_retention: usize,

    /// Trades kept for VWAP
    pub trade_window: usize,

    pub atr_resolution: u32,
    pub atr_period: usize,
}

impl MonitorConfig {
    pub fn analysis_interval(&self) -> Duration {
        Duration::from_millis(self.analysis_interval_ms.max(1))
    }

    pub fn market_data_settings(&self) -> MarketDataSettings {
        MarketDataSettings {
            trade_window: self.trade_window,
            atr_resolution: self.atr_resolution,
            atr_period: self.atr_period,
        }
    }
}

/// Exchange adapter configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExchangeConfig {
    /// One simulated adapter is started per name
    pub names: Vec<String>,

    /// Feed seed; adapters derive their own from it
    pub seed: Option<u64>,

    /// Starting price of the simulated walk
    pub base_price: Decimal,

    pub trades_per_second: u32,

    pub order_book_interval_ms: u64,

    /// Open interest polling period
    pub open_interest_poll_secs: u64,

    pub base_open_interest: f64,
}

impl ExchangeConfig {
    /// Feed settings for the adapter at `index` in `names`
    pub fn feed_settings(&self, index: usize) -> SimulatedFeedSettings {
        SimulatedFeedSettings {
            seed: self.seed.map(|seed| seed.wrapping_add((index as u64) << 32)),
            base_price: self.base_price,
            trades_per_second: self.trades_per_second,
            order_book_interval: Duration::from_millis(self.order_book_interval_ms),
            open_interest_poll: Duration::from_secs(self.open_interest_poll_secs),
            base_open_interest: self.base_open_interest,
            ..SimulatedFeedSettings::default()
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (e.g., "info", "debug", "warn", "error")
    pub level: String,

    /// Log to file
    pub to_file: bool,

    /// Log file path
    pub file_path: Option<String>,
}

impl LoggingConfig {
    /// Unrecognized level names log at `info`
    pub fn level_filter(&self) -> log::LevelFilter {
        log::LevelFilter::from_str(self.level.trim()).unwrap_or(log::LevelFilter::Info)
    }

    pub fn log_file(&self) -> Option<&Path> {
        if self.to_file {
            self.file_path.as_deref().map(Path::new)
        } else {
            None
        }
    }
}

fn env_or<T: FromStr>(key: &str, default: T) -> T {
    env::var(key).ok().and_then(|v| v.trim().parse().ok()).unwrap_or(default)
}

fn env_list<T: FromStr>(key: &str) -> Option<Vec<T>> {
    let raw = env::var(key).ok()?;
    let values: Vec<T> = raw
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .filter_map(|s| s.parse().ok())
        .collect();
    if values.is_empty() {
        None
    } else {
        Some(values)
    }
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> AppResult<Self> {
        // Load .env file if it exists
        dotenv().ok();

        let defaults = Config::default();

        let monitor = MonitorConfig {
            symbol: env::var("MONITOR_SYMBOL").unwrap_or(defaults.monitor.symbol),
            resolutions: env_list("TICK_RESOLUTIONS").unwrap_or(defaults.monitor.resolutions),
            analysis_interval_ms: env_or(
                "ANALYSIS_INTERVAL_MS",
                defaults.monitor.analysis_interval_ms,
            ),
            bars_per_pass: env_or("BARS_PER_PASS", defaults.monitor.bars_per_pass),
            bar_retention: env_or("BAR_RETENTION", defaults.monitor.bar_retention),
            trade_window: env_or("TRADE_WINDOW", defaults.monitor.trade_window),
            atr_resolution: env_or("ATR_RESOLUTION", defaults.monitor.atr_resolution),
            atr_period: env_or("ATR_PERIOD", defaults.monitor.atr_period),
        };

        let exchange = ExchangeConfig {
            names: env_list("EXCHANGE_NAMES").unwrap_or(defaults.exchange.names),
            seed: env::var("FEED_SEED").ok().and_then(|v| v.trim().parse().ok()),
            base_price: env_or("FEED_BASE_PRICE", defaults.exchange.base_price),
            trades_per_second: env_or(
                "FEED_TRADES_PER_SECOND",
                defaults.exchange.trades_per_second,
            ),
            order_book_interval_ms: env_or(
                "FEED_ORDER_BOOK_INTERVAL_MS",
                defaults.exchange.order_book_interval_ms,
            ),
            open_interest_poll_secs: env_or(
                "OPEN_INTEREST_POLL_SECS",
                defaults.exchange.open_interest_poll_secs,
            ),
            base_open_interest: env_or(
                "FEED_BASE_OPEN_INTEREST",
                defaults.exchange.base_open_interest,
            ),
        };

        let persistence = PersistenceConfig {
            bar_log_path: env::var("BAR_LOG_PATH").ok().map(Into::into),
        };

        let logging = LoggingConfig {
            level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            to_file: env_or("LOG_TO_FILE", false),
            file_path: env::var("LOG_FILE_PATH").ok(),
        };

        // Rule thresholds only come from a config file
        let config = Config {
            monitor,
            exchange,
            persistence,
            logging,
            ..defaults
        };
        config.validate()?;
        Ok(config)
    }

    /// Load a JSON config file; missing sections take their defaults
    pub fn from_file<P: AsRef<Path>>(path: P) -> AppResult<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path)
            .map_err(|e| AppError::Config(format!("cannot read {}: {}", path.display(), e)))?;
        let config: Config = serde_json::from_str(&contents)
            .map_err(|e| AppError::Config(format!("invalid {}: {}", path.display(), e)))?;

        config.validate()?;
        Ok(config)
    }

    pub fn to_file<P: AsRef<Path>>(&self, path: P) -> AppResult<()> {
        fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    /// Settings the monitor cannot run with
    pub fn validate(&self) -> AppResult<()> {
        if !self.monitor.resolutions.iter().any(|&r| r > 0) {
            return Err(AppError::Config(
                "no positive tick resolution configured".to_string(),
            ));
        }
        Ok(())
    }

    /// Install the global logger. Fails if one is already installed.
    pub fn init_logging(&self) -> AppResult<()> {
        let mut builder = env_logger::Builder::new();
        builder.filter_level(self.logging.level_filter());

        if let Some(path) = self.logging.log_file() {
            builder.target(env_logger::Target::Pipe(Box::new(fs::File::create(path)?)));
        }

        builder
            .try_init()
            .map_err(|e| AppError::Config(format!("logger setup: {}", e)))
    }
}

impl Default for MonitorConfig {
    fn default() -> Self {
        let market_data = MarketDataSettings::default();
        Self {
            symbol: "ETHUSDT".to_string(),
            resolutions: DEFAULT_RESOLUTIONS.to_vec(),
            analysis_interval_ms: 100,
            bars_per_pass: 50,
            bar_retention: DEFAULT_BAR_RETENTION,
            trade_window: market_data.trade_window,
            atr_resolution: market_data.atr_resolution,
            atr_period: market_data.atr_period,
        }
    }
}

impl Default for ExchangeConfig {
    fn default() -> Self {
        let feed = SimulatedFeedSettings::default();
        Self {
            names: vec!["simulated".to_string()],
            seed: None,
            base_price: feed.base_price,
            trades_per_second: feed.trades_per_second,
            order_book_interval_ms: feed.order_book_interval.as_millis() as u64,
            open_interest_poll_secs: feed.open_interest_poll.as_secs(),
            base_open_interest: feed.base_open_interest,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            to_file: false,
            file_path: None,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            monitor: MonitorConfig::default(),
            exchange: ExchangeConfig::default(),
            imbalance: ImbalanceConfig::default(),
            analyzer: AnalyzerConfig::default(),
            notification: NotificationConfig::default(),
            persistence: PersistenceConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn documented_defaults() {
        let config = Config::default();
        assert_eq!(config.monitor.symbol, "ETHUSDT");
        assert_eq!(config.monitor.resolutions, vec![500, 1000, 5000, 15000]);
        assert_eq!(config.monitor.analysis_interval(), Duration::from_millis(100));
        assert_eq!(config.monitor.bars_per_pass, 50);
        assert_eq!(config.exchange.open_interest_poll_secs, 5);
        assert_eq!(config.notification.validation_batch_size, 10);
        assert_eq!(config.analyzer.breakout_tolerance, 2.0);
        assert_eq!(config.imbalance.fast_tick_threshold, 15);
    }

    #[test]
    fn file_round_trip_and_partial_files() {
        let path = std::env::temp_dir()
            .join(format!("monitor-config-{}.json", std::process::id()));
        let mut config = Config::default();
        config.monitor.symbol = "BTCUSDT".to_string();
        config.exchange.seed = Some(42);
        config.to_file(&path).unwrap();

        let loaded = Config::from_file(&path).unwrap();
        assert_eq!(loaded.monitor.symbol, "BTCUSDT");
        assert_eq!(loaded.exchange.seed, Some(42));
        std::fs::remove_file(&path).unwrap();

        let partial: Config =
            serde_json::from_str(r#"{"monitor": {"resolutions": [100]}}"#).unwrap();
        assert_eq!(partial.monitor.resolutions, vec![100]);
        assert_eq!(partial.monitor.symbol, "ETHUSDT");
        assert_eq!(partial.imbalance.whale_tick_threshold, 8);
    }

    #[test]
    fn missing_file_is_config_error() {
        let result = Config::from_file("/nonexistent/monitor.json");
        assert!(matches!(result, Err(AppError::Config(msg)) if msg.contains("monitor.json")));
    }

    #[test]
    fn file_without_positive_resolution_is_rejected() {
        let path = std::env::temp_dir()
            .join(format!("monitor-config-zero-{}.json", std::process::id()));
        std::fs::write(&path, r#"{"monitor": {"resolutions": [0]}}"#).unwrap();

        let result = Config::from_file(&path);
        std::fs::remove_file(&path).unwrap();
        assert!(matches!(result, Err(AppError::Config(_))));
    }

    #[test]
    fn log_level_and_target() {
        let mut logging = LoggingConfig {
            level: "DEBUG".to_string(),
            ..Default::default()
        };
        assert_eq!(logging.level_filter(), log::LevelFilter::Debug);

        logging.level = "verbose".to_string();
        assert_eq!(logging.level_filter(), log::LevelFilter::Info);

        logging.file_path = Some("monitor.log".to_string());
        assert_eq!(logging.log_file(), None);
        logging.to_file = true;
        assert_eq!(logging.log_file(), Some(Path::new("monitor.log")));
    }

    #[test]
    fn adapters_get_distinct_seeds() {
        let exchange = ExchangeConfig {
            seed: Some(9),
            ..Default::default()
        };
        assert_ne!(exchange.feed_settings(0).seed, exchange.feed_settings(1).seed);
        assert_eq!(exchange.feed_settings(0).open_interest_poll, Duration::from_secs(5));
    }
}
