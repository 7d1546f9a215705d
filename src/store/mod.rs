//! # Message Store
//!
//! In-memory history of received messages for display.
//!
//! ## Why This Module Exists
//!
//! The broker can deliver messages far faster than anyone reads them. The store keeps
//! memory bounded by evicting the oldest record once `capacity` is reached, while keeping a
//! filtered view (indices of records matching a substring) valid across every insertion
//! and eviction. Topic colours are assigned here as well, so grouping stays consistent
//! for as long as the history lives.
//!
//! ```text
//! store/
//! ├── message_store.rs  - bounded history + filtered view
//! ├── palette.rs        - topic -> colour identity
//! └── export.rs         - CSV projection of the filtered view
//! ```
//!
//! The store is owned by the console loop and is not meant for concurrent writers.

pub mod export;
pub mod message_store;
pub mod palette;

pub use message_store::{MessageStore, DEFAULT_CAPACITY};
pub use palette::{TopicColor, TopicPalette, TOPIC_PALETTE};
