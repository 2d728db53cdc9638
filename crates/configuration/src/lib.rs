use crate::error::ConfigError;

// Declare the modules that make up this crate.
pub mod error;
pub mod logging;
pub mod settings;
mod validate;

// Re-export the core types to provide a clean public API.
pub use logging::init_logging;
pub use settings::{
    ApiConfig, ApiKeys, Config, DynamicThresholdConfig, EngineConfig, ExitConfig,
    IndicatorConfig, LoggingConfig, MarketFilterConfig, MtfConfig, RiskConfig, ScannerConfig,
    StrategyConfig, TelegramConfig, TierConfig, TimeframeConfig, TradingConfig,
    TradingDirection, TradingMode, VolumeConfig,
};

/// Prefix for environment overrides, e.g. `TRADELANE__API__TESTNET__SECRET`.
pub const ENV_PREFIX: &str = "TRADELANE";

/// Loads the application configuration from the `config.toml` file.
pub fn load_config() -> Result<Config, ConfigError> {
    load_config_from("config.toml")
}

/// Loads and validates the configuration from `path`, layered with environment overrides.
///
/// A missing file is not an error: every section falls back to its defaults.
pub fn load_config_from(path: &str) -> Result<Config, ConfigError> {
    let builder = config::Config::builder()
        .add_source(config::File::with_name(path).required(false))
        .add_source(
            config::Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("__")
                .separator("__")
                .list_separator(",")
                .with_list_parse_key("trading.symbols")
                .try_parsing(true),
        )
        .build()?;

    // Attempt to deserialize the entire configuration into our `Config` struct
    let config = builder.try_deserialize::<Config>()?;
    config.validate()?;
    tracing::debug!(path, symbols = config.trading.symbols.len(), "Configuration loaded.");

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use std::io::Write;

    #[test]
    fn test_partial_file_keeps_defaults() {
        let dir = std::env::temp_dir().join(format!("tradelane-config-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("partial.toml");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(
            file,
            "[trading]\nleverage = 3\nsymbols = [\"BTC/USDT\"]\n\n[risk]\nrisk_per_trade = 0.02\n"
        )
        .unwrap();

        let config = load_config_from(path.to_str().unwrap()).unwrap();
        assert_eq!(config.trading.leverage, 3);
        assert_eq!(config.trading.symbols, vec!["BTC/USDT".to_string()]);
        assert_eq!(config.risk.risk_per_trade, dec!(0.02));
        assert_eq!(config.exit.first_partial_pct, dec!(30));
        assert_eq!(config.timeframes.signal, "1h");

        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_invalid_file_is_rejected() {
        let dir = std::env::temp_dir().join(format!("tradelane-config-bad-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("bad.toml");
        std::fs::write(&path, "[engine]\npoll_interval_secs = 0\n").unwrap();

        let result = load_config_from(path.to_str().unwrap());
        assert!(matches!(result, Err(ConfigError::ValidationError(_))));

        std::fs::remove_dir_all(&dir).unwrap();
    }
}
