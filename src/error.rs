use thiserror::Error;

/// Errors returned by flow controllers.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum Error {
    /// The seed rate was negative, NaN or infinite.
    #[error("invalid rate {0}: must be finite and non-negative")]
    InvalidRate(f64),
    /// An [Options](crate::Options) value was out of range.
    #[error("invalid options: {0}")]
    InvalidOptions(&'static str),
    /// A completion was reported with no outstanding permit to release.
    #[error("completion reported with no outstanding permits")]
    Unbalanced,
    /// The flow controller has been shut down.
    #[error("flow controller shut down")]
    Shutdown,
    /// No permits became available before the deadline.
    #[error("timed out waiting for permits")]
    Timeout,
    /// Construction needs a Tokio runtime to run the rate refresher on.
    #[error("no Tokio runtime available")]
    NoRuntime,
}
