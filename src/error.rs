//! Error taxonomy for the registry core.
//!
//! The set of variants is closed and mirrors the six kinds of failure the
//! registry can surface: a caller-visible rejection (stale version,
//! malformed delta, lifecycle-closed), an isolated per-subscriber or
//! per-channel failure (slow consumer, transport failure), or an internal
//! invariant violation that triggers shutdown.

use thiserror::Error;

/// Errors surfaced by registry operations, subscriptions, and replication
/// channels.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// Operation attempted after the registry (or channel) was shut down.
    #[error("[{code}] operation attempted after shutdown: {detail}", code = codes::LIFECYCLE_CLOSED)]
    LifecycleClosed { detail: String },

    /// `register`/`update` supplied a version not greater than the current
    /// copy from the same source.
    #[error(
        "[{code}] stale version for id {id:?} from source {source}: incoming {incoming} <= current {current}",
        code = codes::STALE_VERSION
    )]
    StaleVersion {
        id: String,
        source: String,
        incoming: u64,
        current: u64,
    },

    /// A delta targeted an attribute absent from the current info.
    #[error(
        "[{code}] delta for id {id:?} targets unknown attribute {attribute:?}",
        code = codes::MALFORMED_DELTA
    )]
    MalformedDelta { id: String, attribute: String },

    /// Send/receive error on a replication channel's transport.
    #[error("[{code}] transport failure: {source}", code = codes::TRANSPORT_FAILURE)]
    TransportFailure {
        #[source]
        source: Box<dyn std::error::Error + Send + Sync + 'static>,
    },

    /// A subscriber's bounded buffer overflowed its high-watermark.
    #[error("[{code}] slow consumer: buffer exceeded high watermark {watermark}", code = codes::SLOW_CONSUMER)]
    SlowConsumer { watermark: usize },

    /// An internal invariant was violated; the registry must shut down.
    #[error("[{code}] internal invariant violated: {detail}", code = codes::INTERNAL)]
    Internal { detail: String },
}

impl RegistryError {
    /// Stable error code, suitable for metrics/log correlation.
    pub fn code(&self) -> &'static str {
        match self {
            RegistryError::LifecycleClosed { .. } => codes::LIFECYCLE_CLOSED,
            RegistryError::StaleVersion { .. } => codes::STALE_VERSION,
            RegistryError::MalformedDelta { .. } => codes::MALFORMED_DELTA,
            RegistryError::TransportFailure { .. } => codes::TRANSPORT_FAILURE,
            RegistryError::SlowConsumer { .. } => codes::SLOW_CONSUMER,
            RegistryError::Internal { .. } => codes::INTERNAL,
        }
    }

    pub fn lifecycle_closed(detail: impl Into<String>) -> Self {
        RegistryError::LifecycleClosed {
            detail: detail.into(),
        }
    }

    pub fn internal(detail: impl Into<String>) -> Self {
        RegistryError::Internal {
            detail: detail.into(),
        }
    }
}

/// Stable, `domain.reason`-shaped error codes, for machine-readable
/// correlation in logs and metrics.
pub mod codes {
    pub const LIFECYCLE_CLOSED: &str = "registry.lifecycle_closed";
    pub const STALE_VERSION: &str = "registry.stale_version";
    pub const MALFORMED_DELTA: &str = "registry.malformed_delta";
    pub const TRANSPORT_FAILURE: &str = "replication.transport_failure";
    pub const SLOW_CONSUMER: &str = "fabric.slow_consumer";
    pub const INTERNAL: &str = "registry.internal";
}

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, RegistryError>;
