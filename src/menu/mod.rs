pub mod picker;
pub mod provider;

pub use picker::{HistoryPicker, MenuEntry, MultiPicker, PickerState, Popup, PopupOptions};
pub use provider::{CallableRegistry, CompiledItem, ItemProvider, ProviderContext, ProviderLayout};

use crate::models::Item;

/// Capability for sourcing the items a popup shows. Pickers hold one of
/// these next to their popup-rendering capability and combine the two by
/// delegation.
pub trait ItemSource {
    /// A fresh snapshot of the current items.
    fn items(&self) -> Vec<Item>;
}
