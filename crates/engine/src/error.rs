use thiserror::Error;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Configuration error: {0}")]
    Configuration(#[from] configuration::error::ConfigError),

    #[error("API client error: {0}")]
    ApiClient(#[from] api_client::error::ApiError),

    #[error("Indicator error: {0}")]
    Indicator(#[from] indicators::IndicatorError),

    #[error("Strategy error: {0}")]
    Strategy(#[from] strategies::StrategyError),

    #[error("Risk management error: {0}")]
    Risk(#[from] risk::RiskError),

    #[error("Execution error: {0}")]
    Executor(#[from] executor::ExecutorError),

    #[error("Event serialization error: {0}")]
    Events(#[from] events::EventsError),

    #[error("Startup check '{check}' failed: {reason}")]
    Startup { check: &'static str, reason: String },
}
