//! Error types for heaptree-core.

use thiserror::Error;

use crate::model::NodeId;
use crate::tree::SlotId;

/// Errors raised by providers, the expansion engine and the explorer tree.
#[derive(Error, Debug)]
pub enum Error {
    /// Transport or backend failure while talking to the graph provider.
    #[error("Provider unavailable: {0}")]
    ProviderUnavailable(String),

    /// The identifier no longer resolves to a node (stale reference).
    #[error("Node not found: {0}")]
    NodeNotFound(NodeId),

    /// The provider returned data that violates the page contract.
    #[error("Malformed response: {0}")]
    MalformedResponse(String),

    /// Expansion refused (cycle sentinel, placeholder, or owner not expanded).
    #[error("Not expandable: {0}")]
    NotExpandable(String),

    /// The slot does not exist in this tree.
    #[error("Unknown tree slot: {0}")]
    UnknownSlot(SlotId),

    /// The slot was reset while a fetch for it was in flight.
    #[error("Expansion of slot {0} superseded by a root reset")]
    Superseded(SlotId),

    /// Configuration value out of range.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Configuration source could not be read or extracted.
    #[error("Configuration error: {0}")]
    Config(#[from] Box<figment::Error>),

    /// JSON deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Returns true for failures where re-issuing the same request may succeed.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::ProviderUnavailable(_) | Self::Superseded(_))
    }
}

impl From<figment::Error> for Error {
    fn from(err: figment::Error) -> Self {
        Self::Config(Box::new(err))
    }
}

/// Result type alias for heaptree operations.
pub type Result<T> = std::result::Result<T, Error>;
