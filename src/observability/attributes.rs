use std::borrow::Cow;

/// A metric or log attribute key. `Cow` so a static key and a
/// runtime-generated one share the same type.
pub type AttributeKey<'a> = Cow<'a, str>;

/// One key/value pair attached to a metric observation.
#[derive(Clone, Debug, PartialEq)]
pub struct KeyValue<'a> {
    pub key: AttributeKey<'a>,
    pub value: MetricAttributeValue<'a>,
}

impl<'a> KeyValue<'a> {
    pub fn new(
        key: impl Into<AttributeKey<'a>>,
        value: impl Into<MetricAttributeValue<'a>>,
    ) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

/// Borrowed view over a set of attributes, passed to every `MetricsProvider`
/// call so callers can reuse one buffer across observations.
pub type AttributeSet<'a> = &'a [KeyValue<'a>];

/// Scalar attribute value. Closed to the four kinds metrics backends
/// commonly support; unsigned integers are folded into `I64` with
/// saturation rather than adding a fifth variant.
#[derive(Clone, Debug, PartialEq)]
#[non_exhaustive]
pub enum MetricAttributeValue<'a> {
    Text(Cow<'a, str>),
    Bool(bool),
    F64(f64),
    I64(i64),
}

impl<'a> From<&'a str> for MetricAttributeValue<'a> {
    fn from(value: &'a str) -> Self {
        Self::Text(Cow::Borrowed(value))
    }
}

impl From<String> for MetricAttributeValue<'_> {
    fn from(value: String) -> Self {
        Self::Text(Cow::Owned(value))
    }
}

impl<'a> From<Cow<'a, str>> for MetricAttributeValue<'a> {
    fn from(value: Cow<'a, str>) -> Self {
        Self::Text(value)
    }
}

impl From<bool> for MetricAttributeValue<'_> {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<f64> for MetricAttributeValue<'_> {
    fn from(value: f64) -> Self {
        Self::F64(value)
    }
}

impl From<f32> for MetricAttributeValue<'_> {
    fn from(value: f32) -> Self {
        Self::F64(value.into())
    }
}

impl From<i64> for MetricAttributeValue<'_> {
    fn from(value: i64) -> Self {
        Self::I64(value)
    }
}

impl From<i32> for MetricAttributeValue<'_> {
    fn from(value: i32) -> Self {
        Self::I64(value.into())
    }
}

impl From<u64> for MetricAttributeValue<'_> {
    fn from(value: u64) -> Self {
        if value > i64::MAX as u64 {
            MetricAttributeValue::I64(i64::MAX)
        } else {
            MetricAttributeValue::I64(value as i64)
        }
    }
}

impl From<u32> for MetricAttributeValue<'_> {
    fn from(value: u32) -> Self {
        MetricAttributeValue::I64(value as i64)
    }
}

impl<'a> MetricAttributeValue<'a> {
    /// Promotes to `'static`, cloning any borrowed text.
    pub fn into_owned(self) -> MetricAttributeValue<'static> {
        match self {
            MetricAttributeValue::Text(text) => {
                MetricAttributeValue::Text(Cow::Owned(text.into_owned()))
            }
            MetricAttributeValue::Bool(value) => MetricAttributeValue::Bool(value),
            MetricAttributeValue::F64(value) => MetricAttributeValue::F64(value),
            MetricAttributeValue::I64(value) => MetricAttributeValue::I64(value),
        }
    }
}

/// An owned, reusable attribute buffer — build once with [`Self::push_owned`]
/// or [`Self::extend_from`], then pass [`Self::as_slice`] wherever an
/// [`AttributeSet`] is expected.
#[derive(Default, Clone, Debug)]
pub struct OwnedAttributeSet {
    entries: Vec<KeyValue<'static>>,
}

impl OwnedAttributeSet {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// Appends owned copies of a borrowed attribute set.
    pub fn extend_from(&mut self, borrowed: AttributeSet<'_>) {
        self.entries.reserve(borrowed.len());
        for kv in borrowed {
            self.entries.push(KeyValue {
                key: Cow::Owned(kv.key.clone().into_owned()),
                value: kv.value.clone().into_owned(),
            });
        }
    }

    pub fn push_owned(
        &mut self,
        key: impl Into<AttributeKey<'static>>,
        value: impl Into<MetricAttributeValue<'static>>,
    ) {
        self.entries.push(KeyValue {
            key: key.into(),
            value: value.into(),
        });
    }

    pub fn as_slice(&self) -> AttributeSet<'_> {
        self.entries.as_slice()
    }

    /// Clears entries but keeps the backing capacity, for reuse across
    /// observations in a hot loop.
    pub fn clear(&mut self) {
        self.entries.clear();
    }
}
