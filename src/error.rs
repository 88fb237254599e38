use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EngineError {
    #[error("run already finalized; no further samples accepted")]
    Finalized,
    #[error("invalid sample: {0}")]
    InvalidSample(String),
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}
