//! Predicate language over instances (spec §3), used to filter both
//! snapshots and the live notification tail.

use crate::instance::{AttributeValue, InstanceInfo};

/// A composable predicate over [`InstanceInfo`]. Evaluation is pure and
/// side-effect-free, matching spec §3's contract.
#[derive(Clone, Debug)]
pub enum Interest {
    ById(String),
    ByAppName(String),
    ByVipAddress(String),
    Full,
    None,
    Or(Vec<Interest>),
}

impl Interest {
    pub fn matches(&self, info: &InstanceInfo) -> bool {
        match self {
            Interest::ById(id) => info.id() == id,
            Interest::ByAppName(name) => {
                matches!(info.attribute("app_name"), Some(AttributeValue::Text(v)) if v.as_ref() == name)
            }
            Interest::ByVipAddress(addr) => {
                matches!(info.attribute("vip_address"), Some(AttributeValue::Text(v)) if v.as_ref() == addr)
            }
            Interest::Full => true,
            Interest::None => false,
            Interest::Or(interests) => interests.iter().any(|i| i.matches(info)),
        }
    }

    pub fn or(interests: impl IntoIterator<Item = Interest>) -> Self {
        Interest::Or(interests.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_matches_everything() {
        let info = InstanceInfo::new("A", 1);
        assert!(Interest::Full.matches(&info));
        assert!(!Interest::None.matches(&info));
    }

    #[test]
    fn by_id_matches_exact_id() {
        let info = InstanceInfo::new("A", 1);
        assert!(Interest::ById("A".into()).matches(&info));
        assert!(!Interest::ById("B".into()).matches(&info));
    }

    #[test]
    fn or_matches_if_any_branch_matches() {
        let info = InstanceInfo::new("A", 1);
        let interest = Interest::or([Interest::ById("B".into()), Interest::ById("A".into())]);
        assert!(interest.matches(&info));
    }

    #[test]
    fn by_app_name_matches_attribute() {
        let info = InstanceInfo::new("A", 1).with_attribute("app_name", "checkout");
        assert!(Interest::ByAppName("checkout".into()).matches(&info));
        assert!(!Interest::ByAppName("billing".into()).matches(&info));
    }
}
