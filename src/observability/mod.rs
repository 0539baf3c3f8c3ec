//! Metrics surface the registry core emits through, per the injected
//! `MetricSink` interface (spec §6): `registrations`, `updates`,
//! `unregisters`, `evictions`, `subscribers`, `bus-depth`.
//!
//! Modeled on OpenTelemetry's instrument/attribute split, trimmed to the
//! counter/gauge/histogram shapes the registry actually needs.

pub mod attributes;
pub mod metrics;

pub use attributes::{AttributeKey, AttributeSet, KeyValue, MetricAttributeValue, OwnedAttributeSet};
pub use metrics::{Counter, Gauge, Histogram, InstrumentDescriptor, MetricsProvider, NoopMetricsProvider};
