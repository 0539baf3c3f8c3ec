//! Tagged origin of a registration (spec §3).

use std::fmt;
use std::sync::Arc;

/// Where a registration claim came from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SourceOrigin {
    /// A local client of this registry instance.
    Local,
    /// Mirrored in from a replication peer.
    Replicated,
    /// Seeded at process startup from a bootstrap list.
    Bootstrap,
    /// Synthesized internally to satisfy an interest subscription.
    Interest,
}

/// A tagged origin for a registration. Two sources compare equal iff both
/// `origin` and `name` match; immutable once created.
#[derive(Clone, Debug, Eq)]
pub struct Source {
    origin: SourceOrigin,
    name: Arc<str>,
}

impl Source {
    pub fn new(origin: SourceOrigin, name: impl Into<Arc<str>>) -> Self {
        Self {
            origin,
            name: name.into(),
        }
    }

    pub fn local(name: impl Into<Arc<str>>) -> Self {
        Self::new(SourceOrigin::Local, name)
    }

    pub fn replicated(name: impl Into<Arc<str>>) -> Self {
        Self::new(SourceOrigin::Replicated, name)
    }

    pub fn bootstrap(name: impl Into<Arc<str>>) -> Self {
        Self::new(SourceOrigin::Bootstrap, name)
    }

    pub fn origin(&self) -> SourceOrigin {
        self.origin
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl PartialEq for Source {
    fn eq(&self, other: &Self) -> bool {
        self.origin == other.origin && self.name == other.name
    }
}

impl std::hash::Hash for Source {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.origin.hash(state);
        self.name.hash(state);
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}:{}", self.origin, self.name)
    }
}

/// Filters a subscription's notifications by their originating source
/// (spec §4.3's optional `source` parameter). `Exact` keeps the original
/// same-source-and-name semantics; `Origin` matches any source of a given
/// origin class regardless of name, needed by the replication channel
/// (spec §4.5), which must forward every LOCAL-origin notification no
/// matter which local client produced it.
#[derive(Clone, Debug, PartialEq)]
pub enum SourceFilter {
    Exact(Source),
    Origin(SourceOrigin),
}

impl SourceFilter {
    pub fn matches(&self, source: &Source) -> bool {
        match self {
            SourceFilter::Exact(expected) => source == expected,
            SourceFilter::Origin(origin) => source.origin() == *origin,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn equality_requires_both_origin_and_name() {
        let a = Source::local("srv1");
        let b = Source::local("srv1");
        let c = Source::local("srv2");
        let d = Source::replicated("srv1");
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_ne!(a, d);
    }

    #[test]
    fn origin_filter_matches_regardless_of_name() {
        let filter = SourceFilter::Origin(SourceOrigin::Local);
        assert!(filter.matches(&Source::local("srv1")));
        assert!(filter.matches(&Source::local("srv2")));
        assert!(!filter.matches(&Source::replicated("srv1")));
    }

    #[test]
    fn exact_filter_requires_origin_and_name_match() {
        let filter = SourceFilter::Exact(Source::local("srv1"));
        assert!(filter.matches(&Source::local("srv1")));
        assert!(!filter.matches(&Source::local("srv2")));
        assert!(!filter.matches(&Source::replicated("srv1")));
    }
}
