use thiserror::Error;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum CoreError {
    #[error("Invalid {0}: {1}")]
    InvalidInput(String, String),
}
