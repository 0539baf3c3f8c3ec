//! Multi-sourced data holder (spec §4.1): reconciles concurrent claims
//! about one instance id from distinct sources into a single coherent
//! view, emitting the notification describing each transition.

use std::collections::HashMap;
use std::sync::Arc;

use crate::error::RegistryError;
use crate::instance::{Delta, InstanceInfo};
use crate::notification::ChangeNotification;
use crate::source::{Source, SourceOrigin};

/// Deterministic total order over sources competing for the same instance
/// id. Injected at holder construction (spec §9: "expose it as a
/// comparator... rather than hard-coding the ordering").
pub trait SelectionPolicy: Send + Sync {
    /// Returns the winning source among `copies`, or `None` if empty.
    fn select<'a>(&self, copies: &'a HashMap<Source, InstanceInfo>) -> Option<&'a Source>;
}

/// LOCAL origin beats all others; among equal origins, the highest
/// `version` wins; remaining ties break by source name, smallest first for
/// a deterministic pick that's stable across restarts (spec §4.1).
#[derive(Default, Clone, Copy)]
pub struct DefaultSelectionPolicy;

impl SelectionPolicy for DefaultSelectionPolicy {
    fn select<'a>(&self, copies: &'a HashMap<Source, InstanceInfo>) -> Option<&'a Source> {
        copies
            .iter()
            .max_by(|(a_source, a_info), (b_source, b_info)| {
                let a_key = (
                    a_source.origin() == SourceOrigin::Local,
                    a_info.version(),
                    std::cmp::Reverse(a_source.name()),
                );
                let b_key = (
                    b_source.origin() == SourceOrigin::Local,
                    b_info.version(),
                    std::cmp::Reverse(b_source.name()),
                );
                a_key.cmp(&b_key)
            })
            .map(|(source, _)| source)
    }
}

/// Per-instance-id container. Created lazily on first register for an id;
/// destroyed by the owning registry once the last copy is removed and no
/// subscriber holds a reference. Mutated only under the registry's per-id
/// serialization (spec §5) — this type itself performs no locking.
pub struct MultiSourcedDataHolder {
    id: Arc<str>,
    copies: HashMap<Source, InstanceInfo>,
    selected: Option<Source>,
    holder_version: u64,
    policy: Arc<dyn SelectionPolicy>,
}

impl MultiSourcedDataHolder {
    pub fn new(id: impl Into<Arc<str>>, policy: Arc<dyn SelectionPolicy>) -> Self {
        Self {
            id: id.into(),
            copies: HashMap::new(),
            selected: None,
            holder_version: 0,
            policy,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn holder_version(&self) -> u64 {
        self.holder_version
    }

    pub fn size(&self) -> usize {
        self.copies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.copies.is_empty()
    }

    /// The currently selected view, if any.
    pub fn get(&self) -> Option<InstanceInfo> {
        self.selected.as_ref().and_then(|s| self.copies.get(s)).cloned()
    }

    /// Sets `copies[source] = info`, recomputes the selected view, and
    /// returns the notification describing the transition (if any).
    /// `explicit_deltas`, when the updating source ends up selected, seed
    /// the `Modify` notification verbatim instead of a recomputed diff
    /// (spec §4.1 "Modify emission").
    pub fn update(
        &mut self,
        source: Source,
        info: InstanceInfo,
        explicit_deltas: Option<Vec<Delta>>,
    ) -> Result<Option<ChangeNotification>, RegistryError> {
        if let Some(existing) = self.copies.get(&source) {
            if info.version() < existing.version() {
                return Err(RegistryError::StaleVersion {
                    id: self.id.to_string(),
                    source: source.to_string(),
                    incoming: info.version(),
                    current: existing.version(),
                });
            }
        }

        let was_empty = self.copies.is_empty();
        let prior_selected_source = self.selected.clone();
        let prior_view = self.get();

        self.copies.insert(source.clone(), info);
        let new_selected_source = self.policy.select(&self.copies).cloned();
        self.selected = new_selected_source.clone();
        let new_view = self.get();

        let notification = if was_empty {
            new_view.map(ChangeNotification::Add)
        } else if new_selected_source == prior_selected_source {
            match (&prior_view, &new_view) {
                (Some(pv), Some(nv)) if pv != nv => {
                    let deltas = match explicit_deltas {
                        Some(deltas) if new_selected_source.as_ref() == Some(&source) => deltas,
                        _ => pv.diff(nv),
                    };
                    Some(ChangeNotification::Modify(nv.clone(), deltas))
                }
                _ => None,
            }
        } else {
            match (&prior_view, &new_view) {
                (Some(pv), Some(nv)) => Some(ChangeNotification::Modify(nv.clone(), pv.diff(nv))),
                _ => None,
            }
        };

        // holderVersion advances exactly in step with emitted notifications
        // so the per-id sequence stays gap-free (spec §8, property 3).
        if notification.is_some() {
            self.holder_version += 1;
        }
        Ok(notification)
    }

    /// Sources currently holding a copy, optionally restricted to one
    /// source (used by bulk eviction to target a single replication peer).
    pub fn sources_matching(&self, source_filter: Option<&Source>) -> Vec<Source> {
        self.copies
            .keys()
            .filter(|source| source_filter.is_none_or(|filter| *source == filter))
            .cloned()
            .collect()
    }

    /// Deletes `copies[source]`, recomputes the selected view, and returns
    /// the notification describing the transition (if any).
    pub fn remove(&mut self, source: &Source) -> Option<ChangeNotification> {
        let prior_selected_source = self.selected.clone();
        let prior_view = self.get();

        self.copies.remove(source);
        let new_selected_source = self.policy.select(&self.copies).cloned();
        self.selected = new_selected_source;
        let new_view = self.get();

        let notification = if self.copies.is_empty() {
            prior_view.map(ChangeNotification::Delete)
        } else if prior_selected_source.as_ref() == Some(source) {
            match (&prior_view, &new_view) {
                (Some(pv), Some(nv)) => Some(ChangeNotification::Modify(nv.clone(), pv.diff(nv))),
                _ => None,
            }
        } else {
            None
        };

        if notification.is_some() {
            self.holder_version += 1;
        }
        notification
    }
}
