use std::collections::HashMap;
use std::fmt;

/// Tokyo Night topic colours, handed out in first-seen order.
pub const TOPIC_PALETTE: [&str; 8] = [
    "#7aa2f7", // blue
    "#9ece6a", // green
    "#e0af68", // orange
    "#bb9af7", // purple
    "#f7768e", // red
    "#2ac3de", // cyan
    "#ff9e64", // amber
    "#73daca", // teal
];

/// Identity token assigned to a topic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TopicColor {
    slot: usize,
}

impl TopicColor {
    pub fn slot(&self) -> usize {
        self.slot
    }

    pub fn hex(&self) -> &'static str {
        TOPIC_PALETTE[self.slot % TOPIC_PALETTE.len()]
    }

    /// RGB components, for terminals with 24-bit colour
    pub fn rgb(&self) -> (u8, u8, u8) {
        let hex = self.hex().trim_start_matches('#');
        let channel = |range: std::ops::Range<usize>| {
            hex.get(range)
                .and_then(|digits| u8::from_str_radix(digits, 16).ok())
                .unwrap_or(0)
        };
        (channel(0..2), channel(2..4), channel(4..6))
    }
}

impl fmt::Display for TopicColor {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.hex())
    }
}

/// Assigns palette slots to topics, cycling once the palette is exhausted.
#[derive(Debug, Default, Clone)]
pub struct TopicPalette {
    assigned: HashMap<String, TopicColor>,
    next_slot: usize,
}

impl TopicPalette {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn assign(&mut self, topic: &str) -> TopicColor {
        if let Some(color) = self.assigned.get(topic) {
            return *color;
        }
        let color = TopicColor {
            slot: self.next_slot % TOPIC_PALETTE.len(),
        };
        self.next_slot += 1;
        self.assigned.insert(topic.to_string(), color);
        color
    }

    pub fn get(&self, topic: &str) -> Option<TopicColor> {
        self.assigned.get(topic).copied()
    }

    pub fn len(&self) -> usize {
        self.assigned.len()
    }

    pub fn is_empty(&self) -> bool {
        self.assigned.is_empty()
    }

    pub fn reset(&mut self) {
        self.assigned.clear();
        self.next_slot = 0;
    }
}
