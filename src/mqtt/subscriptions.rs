use std::collections::BTreeMap;

use rumqttc::QoS;

/// Desired subscriptions, keyed by topic filter.
///
/// The set is the source of truth that is replayed after every (re)connect. Iteration
/// order is lexicographic by filter so replays are deterministic.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SubscriptionSet {
    entries: BTreeMap<String, QoS>,
}

impl SubscriptionSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the previously requested QoS if the filter was already present.
    pub fn insert(&mut self, filter: impl Into<String>, qos: QoS) -> Option<QoS> {
        self.entries.insert(filter.into(), qos)
    }

    pub fn remove(&mut self, filter: &str) -> Option<QoS> {
        self.entries.remove(filter)
    }

    pub fn get(&self, filter: &str) -> Option<QoS> {
        self.entries.get(filter).copied()
    }

    pub fn contains(&self, filter: &str) -> bool {
        self.entries.contains_key(filter)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, QoS)> {
        self.entries.iter().map(|(filter, qos)| (filter.as_str(), *qos))
    }
}

impl<S: Into<String>> FromIterator<(S, QoS)> for SubscriptionSet {
    fn from_iter<I: IntoIterator<Item = (S, QoS)>>(iter: I) -> Self {
        let mut set = SubscriptionSet::new();
        for (filter, qos) in iter {
            set.insert(filter, qos);
        }
        set
    }
}
