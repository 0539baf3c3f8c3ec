//! Sourced registry (spec §4.2): owns the id→holder map, serializes
//! mutations per instance id, and publishes change notifications onto a
//! single internal bus.

use std::sync::atomic::Ordering;
use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::Mutex as SyncMutex;
use tokio::sync::broadcast;
use tracing::{debug, instrument, warn};

use crate::config::RegistryConfig;
use crate::contract::Cancellation;
use crate::error::{RegistryError, Result as RegistryResult};
use crate::eviction::{EvictionCandidate, EvictionController, PrependedQuotaStream};
use crate::fabric::{self, Subscription};
use crate::future::Stream;
use crate::holder::{DefaultSelectionPolicy, MultiSourcedDataHolder, SelectionPolicy};
use crate::instance::{Delta, InstanceInfo};
use crate::interest::Interest;
use crate::notification::{BusEvent, ChangeNotification};
use crate::observability::MetricsProvider;
use crate::source::{Source, SourceFilter};

/// Read-only description of a holder, returned from
/// [`SourcedRegistry::get_holders`]. External code never gets a mutable
/// handle to a holder — only immutable snapshots (spec §5).
#[derive(Clone, Debug)]
pub struct HolderSnapshot {
    pub id: Arc<str>,
    pub size: usize,
    pub selected: Option<InstanceInfo>,
    pub holder_version: u64,
}

const BUS_CAPACITY: usize = 4096;

struct Metrics {
    registrations: Arc<dyn crate::observability::Counter>,
    updates: Arc<dyn crate::observability::Counter>,
    unregisters: Arc<dyn crate::observability::Counter>,
    evictions: Arc<dyn crate::observability::Counter>,
    subscribers: Arc<dyn crate::observability::Gauge>,
    bus_depth: Arc<dyn crate::observability::Gauge>,
}

impl Metrics {
    fn new(provider: Arc<dyn MetricsProvider>) -> Self {
        use crate::observability::InstrumentDescriptor;
        let registrations = provider.counter(&InstrumentDescriptor::new("registrations"));
        let updates = provider.counter(&InstrumentDescriptor::new("updates"));
        let unregisters = provider.counter(&InstrumentDescriptor::new("unregisters"));
        let evictions = provider.counter(&InstrumentDescriptor::new("evictions"));
        let subscribers = provider.gauge(&InstrumentDescriptor::new("subscribers"));
        let bus_depth = provider.gauge(&InstrumentDescriptor::new("bus-depth"));
        Self {
            registrations,
            updates,
            unregisters,
            evictions,
            subscribers,
            bus_depth,
        }
    }
}

/// The in-memory, multi-sourced service instance registry.
///
/// Construction returns an `Arc` because the eviction controller's
/// completion callback and spawned background tasks need to call back into
/// the registry without creating a reference cycle (they hold a `Weak`).
pub struct SourcedRegistry {
    holders: DashMap<Arc<str>, SyncMutex<MultiSourcedDataHolder>>,
    bus: broadcast::Sender<BusEvent>,
    policy: Arc<dyn SelectionPolicy>,
    closed: Cancellation,
    metrics: Metrics,
    config: RegistryConfig,
    eviction: Arc<EvictionController>,
    subscriber_count: std::sync::atomic::AtomicUsize,
    self_weak: std::sync::Weak<SourcedRegistry>,
}

impl SourcedRegistry {
    pub fn new(config: RegistryConfig, metrics: Arc<dyn MetricsProvider>) -> Arc<Self> {
        Self::with_selection_policy(config, metrics, Arc::new(DefaultSelectionPolicy))
    }

    pub fn with_selection_policy(
        config: RegistryConfig,
        metrics: Arc<dyn MetricsProvider>,
        policy: Arc<dyn SelectionPolicy>,
    ) -> Arc<Self> {
        let (bus, _) = broadcast::channel(BUS_CAPACITY);
        Arc::new_cyclic(|weak| SourcedRegistry {
            holders: DashMap::new(),
            bus,
            policy,
            closed: Cancellation::new(),
            metrics: Metrics::new(metrics),
            config,
            eviction: Arc::new(EvictionController::new()),
            subscriber_count: std::sync::atomic::AtomicUsize::new(0),
            self_weak: weak.clone(),
        })
    }

    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }

    /// Spawns the preservation controller's drain loop against an
    /// externally supplied quota stream (spec §6 `EvictionQuotaStream`).
    /// Should be called once, after construction.
    pub fn spawn_eviction_loop<S>(&self, quota_stream: S)
    where
        S: Stream<Item = u64> + Unpin + Send + 'static,
    {
        let controller = self.eviction.clone();
        let weak = self.self_weak.clone();
        let closed = self.closed.child();
        let quota_stream =
            PrependedQuotaStream::new(self.config.eviction_quota_initial(), quota_stream);
        tokio::spawn(controller.run(quota_stream, closed, move |candidate: EvictionCandidate| {
            if let Some(registry) = weak.upgrade() {
                registry.complete_eviction(candidate);
            }
        }));
    }

    fn ensure_open(&self) -> RegistryResult<()> {
        if self.closed.is_cancelled() {
            return Err(RegistryError::lifecycle_closed(
                "registry has been shut down",
            ));
        }
        Ok(())
    }

    fn publish(&self, source: Source, notification: ChangeNotification, holder_version: u64) {
        let event = BusEvent {
            notification,
            source: Arc::new(source),
            holder_version,
        };
        // A send error here means there are currently no receivers, which
        // is a normal, non-erroneous condition for a broadcast bus.
        let _ = self.bus.send(event);
        self.metrics
            .bus_depth
            .set(self.bus.len() as f64, &[]);
    }

    fn do_upsert(
        &self,
        info: InstanceInfo,
        source: Source,
        explicit_deltas: Option<Vec<Delta>>,
    ) -> RegistryResult<bool> {
        self.ensure_open()?;
        let id: Arc<str> = Arc::from(info.id());
        let mut created = false;
        let outcome = {
            let entry = self.holders.entry(id.clone()).or_insert_with(|| {
                created = true;
                SyncMutex::new(MultiSourcedDataHolder::new(id.clone(), self.policy.clone()))
            });
            let mut holder = entry.lock();
            let notification = holder.update(source.clone(), info, explicit_deltas)?;
            notification.map(|n| (n, holder.holder_version()))
        };
        if let Some((notification, holder_version)) = outcome {
            self.publish(source, notification, holder_version);
        }
        Ok(created)
    }

    /// `register(info, source) → bool`: returns `true` iff the holder was
    /// just created.
    #[instrument(skip(self, info), fields(id = info.id(), source = %source))]
    pub fn register(&self, info: InstanceInfo, source: Source) -> RegistryResult<bool> {
        let created = self.do_upsert(info, source, None)?;
        self.metrics.registrations.increment(&[]);
        debug!(created, "register");
        Ok(created)
    }

    /// `update(info, deltas, source) → bool`: like `register`, but when the
    /// selected source equals `source`, `deltas` seed the `Modify`
    /// notification verbatim (spec §4.1).
    #[instrument(skip(self, info, deltas), fields(id = info.id(), source = %source))]
    pub fn update(
        &self,
        info: InstanceInfo,
        deltas: Vec<Delta>,
        source: Source,
    ) -> RegistryResult<bool> {
        let created = self.do_upsert(info, source, Some(deltas))?;
        self.metrics.updates.increment(&[]);
        Ok(created)
    }

    /// `unregister(info, source) → bool`: returns `true` iff the holder's
    /// last copy was removed (holder destroyed).
    #[instrument(skip(self, info), fields(id = info.id(), source = %source))]
    pub fn unregister(&self, info: InstanceInfo, source: Source) -> RegistryResult<bool> {
        self.ensure_open()?;
        let id: Arc<str> = Arc::from(info.id());
        self.metrics.unregisters.increment(&[]);
        self.remove_copy(id, source)
    }

    fn remove_copy(&self, id: Arc<str>, source: Source) -> RegistryResult<bool> {
        let outcome = match self.holders.get(&id) {
            Some(entry) => {
                let mut holder = entry.lock();
                let notification = holder.remove(&source);
                let destroyed = holder.is_empty();
                let holder_version = holder.holder_version();
                Some((notification, destroyed, holder_version))
            }
            None => None,
        };
        let Some((notification, destroyed, holder_version)) = outcome else {
            return Ok(false);
        };
        if destroyed {
            self.holders.remove(&id);
        }
        if let Some(notification) = notification {
            self.publish(source, notification, holder_version);
        }
        Ok(destroyed)
    }

    /// Invoked by the eviction controller once a candidate clears the
    /// quota-gated FIFO queue (spec §4.4).
    fn complete_eviction(&self, candidate: EvictionCandidate) {
        match self.remove_copy(candidate.id, candidate.source) {
            Ok(_) => self.metrics.evictions.increment(&[]),
            Err(error) => warn!(%error, "eviction completion failed"),
        }
    }

    /// `forSnapshot(interest) → sequence of InstanceInfo`: a finite
    /// snapshot of currently selected views matching `interest`.
    pub fn for_snapshot(&self, interest: &Interest) -> Vec<InstanceInfo> {
        self.holders
            .iter()
            .filter_map(|entry| {
                let holder = entry.value().lock();
                holder.get().filter(|info| interest.matches(info))
            })
            .collect()
    }

    /// `forInterest(interest, source?) → sequence of ChangeNotification`:
    /// snapshot-then-live subscription (spec §4.3).
    pub fn for_interest(
        &self,
        interest: Interest,
        source_filter: Option<SourceFilter>,
    ) -> RegistryResult<Subscription> {
        self.ensure_open()?;
        // Subscribe to the bus before capturing the snapshot so that no
        // notification can fall in the gap between the two (spec §9).
        let bus_receiver = self.bus.subscribe();
        let snapshot = self.for_snapshot(&interest);
        self.subscriber_count.fetch_add(1, Ordering::Relaxed);
        self.metrics
            .subscribers
            .set(self.subscriber_count.load(Ordering::Relaxed) as f64, &[]);
        let watermark = self.config.subscriber_buffer_high_watermark().get();
        Ok(fabric::subscribe(
            snapshot,
            bus_receiver,
            interest,
            source_filter,
            watermark,
            self.closed.child(),
        ))
    }

    /// `evictAll(source?) → count`: enqueues every matching copy with the
    /// preservation controller, returning the number of distinct holders
    /// touched (a holder with copies from several sources still counts
    /// once, per spec).
    pub fn evict_all(&self, source_filter: Option<&Source>) -> RegistryResult<usize> {
        self.ensure_open()?;
        let mut candidates = Vec::new();
        let mut holders_touched = 0usize;
        for entry in self.holders.iter() {
            let holder = entry.value().lock();
            let sources = holder_sources(&holder, source_filter);
            if sources.is_empty() {
                continue;
            }
            holders_touched += 1;
            let id = entry.key().clone();
            candidates.extend(
                sources
                    .into_iter()
                    .map(|source| EvictionCandidate { id: id.clone(), source }),
            );
        }
        self.eviction.enqueue(candidates);
        Ok(holders_touched)
    }

    /// `getHolders() → sequence of holder`: snapshot of all current
    /// holders.
    pub fn get_holders(&self) -> Vec<HolderSnapshot> {
        self.holders
            .iter()
            .map(|entry| {
                let holder = entry.value().lock();
                HolderSnapshot {
                    id: entry.key().clone(),
                    size: holder.size(),
                    selected: holder.get(),
                    holder_version: holder.holder_version(),
                }
            })
            .collect()
    }

    /// Idempotent shutdown: rejects further mutations and cancels `closed`,
    /// which every live subscription's live-tail loop (`fabric::subscribe`)
    /// and the eviction controller's drain loop race against, terminating
    /// both.
    pub fn shutdown(&self) {
        self.closed.cancel();
    }

    pub fn is_closed(&self) -> bool {
        self.closed.is_cancelled()
    }
}

/// Sources present on a holder matching an optional filter, read out while
/// already holding the holder's lock. Holder internals are private to
/// `holder.rs`; this reaches the copies indirectly through `get`/`size`
/// plus the selected view isn't enough, so registry needs its own
/// accessor — exposed as `MultiSourcedDataHolder::sources_matching` below.
fn holder_sources(
    holder: &MultiSourcedDataHolder,
    source_filter: Option<&Source>,
) -> Vec<Source> {
    holder.sources_matching(source_filter)
}
