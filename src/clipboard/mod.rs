pub mod bridge;

pub use bridge::{MemorySource, Selection, SelectionBridge, TextSource};
