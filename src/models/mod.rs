pub mod history;
pub mod item;

pub use history::{DedupHistory, HistoryEmpty, HistoryHandle};
pub use item::{Item, OmitMode, Producer, Truncation, ValueFn};
