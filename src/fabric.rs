//! Notification fabric (spec §4.3): the snapshot-then-live join and its
//! per-subscriber backpressure. Kept as a plain bounded-channel pipeline
//! per the design note in spec §9 — no reactive-streams library needed.

use std::collections::HashSet;
use std::sync::Arc;

use tokio::sync::broadcast;
use tokio::sync::mpsc;

use crate::contract::Cancellation;
use crate::error::RegistryError;
use crate::instance::InstanceInfo;
use crate::interest::Interest;
use crate::notification::{BusEvent, ChangeNotification};
use crate::source::SourceFilter;

/// A live subscription: a bounded stream of notifications that begins with
/// a consistent snapshot and transitions to the live tail, terminating
/// with `Err(SlowConsumer)` if the consumer falls more than the
/// configured high-watermark behind.
pub struct Subscription {
    receiver: mpsc::Receiver<Result<ChangeNotification, RegistryError>>,
}

impl Subscription {
    pub async fn recv(&mut self) -> Option<Result<ChangeNotification, RegistryError>> {
        self.receiver.recv().await
    }
}

/// Spawns the task that drives one subscription's join algorithm. The
/// caller must have already captured `snapshot` and `bus_receiver` such
/// that `bus_receiver` was subscribed no later than the moment `snapshot`
/// was taken — otherwise a notification could be lost between the two.
/// `closed` is the registry's shutdown token; once cancelled, the live
/// tail loop returns and the subscription ends.
pub fn subscribe(
    snapshot: Vec<InstanceInfo>,
    mut bus_receiver: broadcast::Receiver<BusEvent>,
    interest: Interest,
    source_filter: Option<SourceFilter>,
    high_watermark: usize,
    closed: Cancellation,
) -> Subscription {
    let (tx, rx) = mpsc::channel(high_watermark);

    tokio::spawn(async move {
        let mut seen_ids: HashSet<Arc<str>> =
            snapshot.iter().map(|info| Arc::from(info.id())).collect();

        for info in snapshot {
            if send_or_terminate(&tx, ChangeNotification::Add(info), high_watermark).is_err() {
                return;
            }
        }
        if send_or_terminate(&tx, ChangeNotification::BufferSentinel, high_watermark).is_err() {
            return;
        }

        // Drain whatever accumulated in the bus between subscribe-time and
        // now, applying the duplicate-suppression rules of spec §4.3.
        let mut buffered = Vec::new();
        loop {
            match bus_receiver.try_recv() {
                Ok(event) => buffered.push(event),
                Err(broadcast::error::TryRecvError::Empty) => break,
                Err(broadcast::error::TryRecvError::Lagged(_)) => {
                    let _ = tx
                        .send(Err(RegistryError::internal(
                            "notification bus overflowed before subscription could drain it",
                        )))
                        .await;
                    return;
                }
                Err(broadcast::error::TryRecvError::Closed) => return,
            }
        }
        for event in buffered {
            if !passes_source_filter(&event, source_filter.as_ref()) {
                continue;
            }
            if let Some(notification) = suppress_buffered(&mut seen_ids, event.notification) {
                if !matches_interest(&notification, &interest) {
                    continue;
                }
                if send_or_terminate(&tx, notification, high_watermark).is_err() {
                    return;
                }
            }
        }

        // Live tail: events from here on are forwarded directly, until the
        // registry is shut down.
        loop {
            let received = tokio::select! {
                () = closed.cancelled() => return,
                received = bus_receiver.recv() => received,
            };
            match received {
                Ok(event) => {
                    if !passes_source_filter(&event, source_filter.as_ref()) {
                        continue;
                    }
                    if !matches_interest(&event.notification, &interest) {
                        continue;
                    }
                    if send_or_terminate(&tx, event.notification, high_watermark).is_err() {
                        return;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(_)) => {
                    let _ = tx
                        .send(Err(RegistryError::internal(
                            "notification bus overflowed during live tail",
                        )))
                        .await;
                    return;
                }
                Err(broadcast::error::RecvError::Closed) => return,
            }
        }
    });

    Subscription { receiver: rx }
}

fn matches_interest(notification: &ChangeNotification, interest: &Interest) -> bool {
    match notification.info() {
        Some(info) => interest.matches(info),
        None => true,
    }
}

fn passes_source_filter(event: &BusEvent, source_filter: Option<&SourceFilter>) -> bool {
    match source_filter {
        Some(filter) => filter.matches(event.source.as_ref()),
        None => true,
    }
}

/// Applies the snapshot/live duplicate-suppression rules (spec §4.3):
/// a buffered `Add` for an id already in the snapshot is dropped unless an
/// intervening `Delete` passed through first; a `Modify` for an id not in
/// the snapshot is upgraded to `Add`; a `Delete` for an id not in the
/// snapshot is dropped.
fn suppress_buffered(
    seen_ids: &mut HashSet<Arc<str>>,
    notification: ChangeNotification,
) -> Option<ChangeNotification> {
    match notification {
        ChangeNotification::Add(info) => {
            let id: Arc<str> = Arc::from(info.id());
            if seen_ids.contains(&id) {
                None
            } else {
                seen_ids.insert(id);
                Some(ChangeNotification::Add(info))
            }
        }
        ChangeNotification::Modify(info, deltas) => {
            let id: Arc<str> = Arc::from(info.id());
            if seen_ids.contains(&id) {
                Some(ChangeNotification::Modify(info, deltas))
            } else {
                seen_ids.insert(id);
                Some(ChangeNotification::Add(info))
            }
        }
        ChangeNotification::Delete(info) => {
            let id: Arc<str> = Arc::from(info.id());
            if seen_ids.remove(&id) {
                Some(ChangeNotification::Delete(info))
            } else {
                None
            }
        }
        ChangeNotification::BufferSentinel => None,
    }
}

fn send_or_terminate(
    tx: &mpsc::Sender<Result<ChangeNotification, RegistryError>>,
    notification: ChangeNotification,
    high_watermark: usize,
) -> Result<(), ()> {
    match tx.try_send(Ok(notification)) {
        Ok(()) => Ok(()),
        Err(mpsc::error::TrySendError::Full(_)) => {
            let _ = tx.try_send(Err(RegistryError::SlowConsumer {
                watermark: high_watermark,
            }));
            Err(())
        }
        Err(mpsc::error::TrySendError::Closed(_)) => Err(()),
    }
}
