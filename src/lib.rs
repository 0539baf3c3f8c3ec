//! beacon-registry-core: an in-memory, multi-sourced service instance
//! registry — the data plane underneath a discovery service in the shape
//! of Eureka/Consul/Zookeeper.
//!
//! An instance id is held by a [`holder::MultiSourcedDataHolder`], one copy
//! per contending [`source::Source`]; a [`holder::SelectionPolicy`] picks
//! the view external readers see. Mutations flow through
//! [`registry::SourcedRegistry`], which serializes per instance id,
//! publishes [`notification::ChangeNotification`]s onto an internal bus,
//! and lets [`fabric::subscribe`] join a consistent snapshot with the live
//! tail for each [`interest::Interest`]-filtered subscription. Bulk removal
//! (e.g. after a replication peer disconnects) is throttled through
//! [`eviction::EvictionController`], and [`replication::ReplicationChannel`]
//! mirrors the LOCAL-origin view outward to a single peer.

pub use async_trait::async_trait;

pub mod arc_swap;
pub mod config;
pub mod contract;
pub mod error;
pub mod eviction;
pub mod fabric;
pub mod future;
pub mod holder;
pub mod instance;
pub mod interest;
pub mod notification;
pub mod observability;
pub mod registry;
pub mod replication;
pub mod source;

pub use config::{RegistryConfig, RegistryConfigBuilder, RegistryConfigError};
pub use contract::Cancellation;
pub use error::{RegistryError, Result};
pub use eviction::{EvictionCandidate, EvictionController};
pub use fabric::Subscription;
pub use future::{BoxFuture, BoxStream, Stream};
pub use holder::{DefaultSelectionPolicy, MultiSourcedDataHolder, SelectionPolicy};
pub use instance::{AttributeValue, Delta, InstanceInfo};
pub use interest::Interest;
pub use notification::{BusEvent, ChangeNotification};
pub use observability::{
    AttributeKey, AttributeSet, Counter, Gauge, Histogram, InstrumentDescriptor, KeyValue,
    MetricAttributeValue, MetricsProvider, NoopMetricsProvider, OwnedAttributeSet,
};
pub use registry::{HolderSnapshot, SourcedRegistry};
pub use replication::{
    ChannelEvent, CloseReason, ReplicationChannel, TransportClient, TransportConnection,
    WireMessage,
};
pub use source::{Source, SourceFilter, SourceOrigin};
