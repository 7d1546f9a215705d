use std::collections::VecDeque;

use tracing::debug;

use super::palette::{TopicColor, TopicPalette};
use crate::mqtt::message_manager::MqttMessage;

pub const DEFAULT_CAPACITY: usize = 2000;

/// Bounded message history with a filtered view.
///
/// `visible` holds indices into `messages` for every record matching `filter`, in
/// insertion order. Eviction shifts those indices instead of rebuilding the view.
#[derive(Debug, Clone)]
pub struct MessageStore {
    messages: VecDeque<MqttMessage>,
    visible: Vec<usize>,
    filter: String,
    palette: TopicPalette,
    capacity: usize,
}

impl Default for MessageStore {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }
}

impl MessageStore {
    /// A capacity of zero is treated as one.
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            messages: VecDeque::with_capacity(capacity),
            visible: Vec::new(),
            filter: String::new(),
            palette: TopicPalette::new(),
            capacity,
        }
    }

    pub fn add(&mut self, message: MqttMessage) {
        if self.messages.len() >= self.capacity {
            self.evict_oldest();
        }

        self.palette.assign(message.topic());
        let index = self.messages.len();
        let matches = message.matches(&self.filter);
        self.messages.push_back(message);
        if matches {
            self.visible.push(index);
        }
    }

    pub fn clear(&mut self) {
        self.messages.clear();
        self.visible.clear();
        self.palette.reset();
        debug!("Message store cleared");
    }

    pub fn set_filter(&mut self, text: &str) {
        self.filter = text.to_lowercase();
        let filter = &self.filter;
        self.visible = self
            .messages
            .iter()
            .enumerate()
            .filter(|(_, message)| message.matches(filter))
            .map(|(index, _)| index)
            .collect();
        debug!(
            "Filter '{}' matches {}/{} messages",
            self.filter,
            self.visible.len(),
            self.messages.len()
        );
    }

    /// Record at `row` of the filtered view.
    pub fn at(&self, row: usize) -> Option<&MqttMessage> {
        self.visible
            .get(row)
            .and_then(|&index| self.messages.get(index))
    }

    pub fn topic_identity(&self, topic: &str) -> Option<TopicColor> {
        self.palette.get(topic)
    }

    pub fn count(&self) -> usize {
        self.messages.len()
    }

    pub fn visible_count(&self) -> usize {
        self.visible.len()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn filter(&self) -> &str {
        &self.filter
    }

    pub fn is_filtered(&self) -> bool {
        !self.filter.is_empty()
    }

    /// Records of the filtered view, in order.
    pub fn visible(&self) -> impl Iterator<Item = &MqttMessage> + '_ {
        self.visible
            .iter()
            .filter_map(move |&index| self.messages.get(index))
    }

    /// Every stored record, oldest first.
    pub fn iter(&self) -> impl Iterator<Item = &MqttMessage> + '_ {
        self.messages.iter()
    }

    fn evict_oldest(&mut self) {
        if self.messages.pop_front().is_none() {
            return;
        }
        // Indices are ascending, so the evicted record can only be the first entry.
        if self.visible.first() == Some(&0) {
            self.visible.remove(0);
        }
        for index in &mut self.visible {
            *index -= 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Local};

    fn message(topic: &str, payload: &str) -> MqttMessage {
        MqttMessage::new(Local::now(), topic, payload, 0, false)
    }

    fn visible_topics(store: &MessageStore) -> Vec<String> {
        store.visible().map(|m| m.topic().to_string()).collect()
    }

    #[test]
    fn eviction_keeps_view_in_sync() {
        let mut store = MessageStore::with_capacity(2);
        store.add(message("A", ""));
        store.add(message("B", ""));
        store.add(message("C", ""));

        let all: Vec<&str> = store.iter().map(|m| m.topic()).collect();
        assert_eq!(all, vec!["B", "C"]);
        assert_eq!(visible_topics(&store), vec!["B", "C"]);
        assert_eq!(store.at(0).map(|m| m.topic()), Some("B"));
        assert_eq!(store.at(1).map(|m| m.topic()), Some("C"));
        assert!(store.at(2).is_none());
    }

    #[test]
    fn eviction_of_hidden_record_shifts_indices() {
        let mut store = MessageStore::with_capacity(3);
        store.set_filter("keep");
        store.add(message("drop/1", ""));
        store.add(message("keep/1", ""));
        store.add(message("keep/2", ""));
        store.add(message("keep/3", ""));

        assert_eq!(store.count(), 3);
        assert_eq!(visible_topics(&store), vec!["keep/1", "keep/2", "keep/3"]);

        store.add(message("drop/2", ""));
        assert_eq!(visible_topics(&store), vec!["keep/2", "keep/3"]);
    }

    #[test]
    fn filter_is_case_insensitive_and_rebuilds() {
        let mut store = MessageStore::default();
        store.add(message("home/Kitchen", "on"));
        store.add(message("home/garage", "KITCHEN door"));
        store.add(message("office", "idle"));

        store.set_filter("KiTcHeN");
        assert_eq!(store.filter(), "kitchen");
        assert_eq!(store.visible_count(), 2);
        assert!(store.is_filtered());

        store.set_filter("");
        assert_eq!(store.visible_count(), 3);
        assert!(!store.is_filtered());
    }

    #[test]
    fn new_records_respect_active_filter() {
        let mut store = MessageStore::default();
        store.set_filter("temp");
        store.add(message("sensor/temp", "20"));
        store.add(message("sensor/humidity", "40"));
        assert_eq!(store.count(), 2);
        assert_eq!(visible_topics(&store), vec!["sensor/temp"]);
    }

    #[test]
    fn clear_resets_everything() {
        let mut store = MessageStore::default();
        store.add(message("a", ""));
        store.add(message("b", ""));
        store.clear();
        assert_eq!(store.count(), 0);
        assert_eq!(store.visible_count(), 0);
        assert!(store.topic_identity("a").is_none());

        store.add(message("b", ""));
        assert_eq!(store.topic_identity("b").map(|c| c.slot()), Some(0));
    }

    #[test]
    fn topic_identity_is_stable() {
        let mut store = MessageStore::with_capacity(4);
        store.add(message("alpha", ""));
        let alpha = store.topic_identity("alpha");
        for i in 0..20 {
            store.add(message(&format!("other/{i}"), ""));
        }
        // alpha has been evicted from the history but keeps its identity until clear().
        assert_eq!(store.topic_identity("alpha"), alpha);
        assert!(store.topic_identity("never").is_none());
    }

    #[test]
    fn capacity_scenario() {
        let mut store = MessageStore::with_capacity(2000);
        let start = Local::now();
        for i in 0..2500 {
            store.add(MqttMessage::new(
                start + Duration::milliseconds(i),
                format!("t{i}"),
                "",
                0,
                false,
            ));
        }
        assert_eq!(store.count(), 2000);
        assert_eq!(store.visible_count(), 2000);
        assert_eq!(store.at(0).map(|m| m.topic()), Some("t500"));
        assert_eq!(store.at(1999).map(|m| m.topic()), Some("t2499"));
    }

    #[test]
    fn zero_capacity_holds_one() {
        let mut store = MessageStore::with_capacity(0);
        store.add(message("a", ""));
        store.add(message("b", ""));
        assert_eq!(store.capacity(), 1);
        assert_eq!(store.at(0).map(|m| m.topic()), Some("b"));
    }
}
