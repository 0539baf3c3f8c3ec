//! Change notification records flowing out of the registry (spec §3).

use std::sync::Arc;

use crate::instance::{Delta, InstanceInfo};
use crate::source::Source;

/// One of the registry's observable transitions. `BufferSentinel` is a
/// synthetic marker separating a subscription's initial snapshot from its
/// live tail (spec §4.3); it carries no instance data.
#[derive(Clone, Debug)]
pub enum ChangeNotification {
    Add(InstanceInfo),
    Modify(InstanceInfo, Vec<Delta>),
    Delete(InstanceInfo),
    BufferSentinel,
}

impl ChangeNotification {
    /// The instance this notification describes, if any.
    pub fn info(&self) -> Option<&InstanceInfo> {
        match self {
            ChangeNotification::Add(info) | ChangeNotification::Delete(info) => Some(info),
            ChangeNotification::Modify(info, _) => Some(info),
            ChangeNotification::BufferSentinel => None,
        }
    }
}

/// A notification as it travels the internal bus: tagged with the source
/// whose mutation produced it and the holder's `holderVersion` at the time
/// (spec §4.2), so per-id ordering and `source`-filtered subscriptions
/// (used by replication channels to avoid echoing a peer's own updates)
/// can both be implemented against the same record.
#[derive(Clone, Debug)]
pub struct BusEvent {
    pub notification: ChangeNotification,
    pub source: Arc<Source>,
    pub holder_version: u64,
}
