use super::attributes::AttributeSet;
use std::sync::Arc;

/// Static metadata identifying one instrument. `name` should be a
/// globally-unique `namespace.metric_name`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct InstrumentDescriptor<'a> {
    pub name: &'a str,
    pub description: Option<&'a str>,
    pub unit: Option<&'a str>,
}

impl<'a> InstrumentDescriptor<'a> {
    pub const fn new(name: &'a str) -> Self {
        Self {
            name,
            description: None,
            unit: None,
        }
    }

    pub const fn with_description(mut self, description: &'a str) -> Self {
        self.description = Some(description);
        self
    }

    pub const fn with_unit(mut self, unit: &'a str) -> Self {
        self.unit = Some(unit);
        self
    }
}

/// Monotonically increasing counter.
pub trait Counter: Send + Sync {
    fn add(&self, value: u64, attributes: AttributeSet<'_>);

    fn increment(&self, attributes: AttributeSet<'_>) {
        self.add(1, attributes);
    }
}

/// A value that can move up or down, for queue depths, connection counts,
/// and similar instantaneous measurements.
pub trait Gauge: Send + Sync {
    fn set(&self, value: f64, attributes: AttributeSet<'_>);
    fn increment(&self, delta: f64, attributes: AttributeSet<'_>);
    fn decrement(&self, delta: f64, attributes: AttributeSet<'_>);
}

/// Distribution of sampled values (latencies, sizes).
pub trait Histogram: Send + Sync {
    fn record(&self, value: f64, attributes: AttributeSet<'_>);
}

/// Backend-agnostic factory for the instrument traits above. Implementations
/// should cache instruments by descriptor rather than recreating them per
/// call.
pub trait MetricsProvider: Send + Sync + 'static {
    fn counter(&self, descriptor: &InstrumentDescriptor<'_>) -> Arc<dyn Counter>;
    fn gauge(&self, descriptor: &InstrumentDescriptor<'_>) -> Arc<dyn Gauge>;
    fn histogram(&self, descriptor: &InstrumentDescriptor<'_>) -> Arc<dyn Histogram>;

    fn record_counter_add(
        &self,
        descriptor: &InstrumentDescriptor<'_>,
        value: u64,
        attributes: AttributeSet<'_>,
    ) {
        self.counter(descriptor).add(value, attributes);
    }

    fn record_gauge_set(
        &self,
        descriptor: &InstrumentDescriptor<'_>,
        value: f64,
        attributes: AttributeSet<'_>,
    ) {
        self.gauge(descriptor).set(value, attributes);
    }

    fn record_histogram(
        &self,
        descriptor: &InstrumentDescriptor<'_>,
        value: f64,
        attributes: AttributeSet<'_>,
    ) {
        self.histogram(descriptor).record(value, attributes);
    }
}

/// Default backend for embedders that haven't wired a real metrics
/// pipeline: every instrument is a shared no-op, so recording never
/// allocates per-call state and never panics for want of a backend.
#[derive(Default, Clone, Copy)]
pub struct NoopMetricsProvider;

impl Counter for NoopMetricsProvider {
    fn add(&self, _value: u64, _attributes: AttributeSet<'_>) {}
}

impl Gauge for NoopMetricsProvider {
    fn set(&self, _value: f64, _attributes: AttributeSet<'_>) {}
    fn increment(&self, _delta: f64, _attributes: AttributeSet<'_>) {}
    fn decrement(&self, _delta: f64, _attributes: AttributeSet<'_>) {}
}

impl Histogram for NoopMetricsProvider {
    fn record(&self, _value: f64, _attributes: AttributeSet<'_>) {}
}

impl MetricsProvider for NoopMetricsProvider {
    fn counter(&self, _descriptor: &InstrumentDescriptor<'_>) -> Arc<dyn Counter> {
        Arc::new(NoopMetricsProvider)
    }
    fn gauge(&self, _descriptor: &InstrumentDescriptor<'_>) -> Arc<dyn Gauge> {
        Arc::new(NoopMetricsProvider)
    }
    fn histogram(&self, _descriptor: &InstrumentDescriptor<'_>) -> Arc<dyn Histogram> {
        Arc::new(NoopMetricsProvider)
    }
}
