use thiserror::Error;

use crate::source::SourceError;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EngineError {
    /// The data source could not deliver booked dates. Availability is unknown.
    #[error("failed to fetch booked dates: {0}")]
    FetchFailed(#[from] SourceError),
    #[error("invalid date: {0}")]
    InvalidDate(String),
    #[error("availability not loaded yet")]
    NotLoaded,
    #[error("availability session closed")]
    Closed,
}
