//! The registered-instance value type and its attribute-scoped diff
//! (spec §3).

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::error::RegistryError;

/// A single attribute value carried in an instance's attribute bag.
/// Closed, like the teacher's `MetricAttributeValue`, to keep structural
/// equality and diffing exact instead of routing every comparison through
/// string parsing.
#[derive(Clone, Debug, PartialEq)]
pub enum AttributeValue {
    Text(Arc<str>),
    Bool(bool),
    Int(i64),
}

impl From<&str> for AttributeValue {
    fn from(value: &str) -> Self {
        AttributeValue::Text(Arc::from(value))
    }
}

impl From<String> for AttributeValue {
    fn from(value: String) -> Self {
        AttributeValue::Text(Arc::from(value.as_str()))
    }
}

impl From<bool> for AttributeValue {
    fn from(value: bool) -> Self {
        AttributeValue::Bool(value)
    }
}

impl From<i64> for AttributeValue {
    fn from(value: i64) -> Self {
        AttributeValue::Int(value)
    }
}

/// A registered service instance. Opaque to the registry core beyond
/// identity, version, and the attribute bag's structural equality (spec
/// §3). `id` is a non-empty stable string; `version` is monotonic within a
/// single source.
#[derive(Clone, Debug, PartialEq)]
pub struct InstanceInfo {
    id: Arc<str>,
    version: u64,
    attributes: BTreeMap<String, AttributeValue>,
}

impl InstanceInfo {
    /// Builds a new instance. `id` must be non-empty; this is the caller's
    /// contract to uphold, not enforced here (the registry treats a
    /// non-empty id as a precondition, per spec §3).
    pub fn new(id: impl Into<Arc<str>>, version: u64) -> Self {
        Self {
            id: id.into(),
            version,
            attributes: BTreeMap::new(),
        }
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<AttributeValue>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn attribute(&self, key: &str) -> Option<&AttributeValue> {
        self.attributes.get(key)
    }

    pub fn attributes(&self) -> impl Iterator<Item = (&str, &AttributeValue)> {
        self.attributes.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Minimal set of per-attribute diffs needed to turn `self` into
    /// `next`, used when recomputing a `Modify` notification from scratch
    /// (spec §4.1). Added, changed, and removed keys are all reported;
    /// removal is represented with a `None` new-value delta is not part of
    /// this crate's closed `Delta` shape, so a removed key is simply
    /// omitted — the receiver's `applyDelta` only ever replaces, never
    /// deletes, an attribute (spec §3).
    pub fn diff(&self, next: &InstanceInfo) -> Vec<Delta> {
        next.attributes
            .iter()
            .filter(|(key, value)| self.attributes.get(key.as_str()) != Some(value))
            .map(|(key, value)| Delta {
                id: next.id.clone(),
                version: next.version,
                attribute: key.clone(),
                new_value: value.clone(),
            })
            .collect()
    }

    /// Applies a delta, yielding a new `InstanceInfo` with the delta's
    /// version and the named attribute replaced. Invariant: the result's
    /// `id` equals `self.id` and `delta.version > self.version` (spec §3).
    pub fn apply_delta(&self, delta: &Delta) -> Result<InstanceInfo, RegistryError> {
        if !self.attributes.contains_key(&delta.attribute) {
            return Err(RegistryError::MalformedDelta {
                id: self.id.to_string(),
                attribute: delta.attribute.clone(),
            });
        }
        let mut next = self.clone();
        next.version = delta.version;
        next.attributes.insert(delta.attribute.clone(), delta.new_value.clone());
        Ok(next)
    }
}

/// An attribute-scoped diff: `(id, version, attribute-tag, new-value)`.
#[derive(Clone, Debug, PartialEq)]
pub struct Delta {
    pub id: Arc<str>,
    pub version: u64,
    pub attribute: String,
    pub new_value: AttributeValue,
}
