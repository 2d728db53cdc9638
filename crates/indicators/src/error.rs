use thiserror::Error;

#[derive(Error, Debug)]
pub enum IndicatorError {
    #[error("Invalid indicator period: {0}")]
    InvalidPeriod(String),

    #[error("Failed to convert {0} between Decimal and f64")]
    Conversion(&'static str),

    #[error("Indicator library error: {0}")]
    Library(String),
}
