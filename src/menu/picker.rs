use anyhow::{bail, Result};
use std::cell::RefCell;
use std::rc::Rc;

use crate::clipboard::SelectionBridge;
use crate::menu::provider::{CompiledItem, ItemProvider, ProviderContext};
use crate::menu::ItemSource;
use crate::models::{DedupHistory, HistoryHandle, Item, Producer, Truncation};
use crate::platform::HotkeyBinder;
use crate::storage::PluginOptions;

/// Rendered shape of one popup row, handed to the (external) menu toolkit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MenuEntry {
    /// Non-selectable bold header showing the current top entry.
    Header(String),
    Separator,
    Leaf(String),
    Submenu(String),
}

/// Popup lifecycle. `Idle` is the resting state; `NestedOpen` means a lazy
/// submenu has been expanded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PickerState {
    #[default]
    Idle,
    Open,
    NestedOpen,
}

#[derive(Debug, Clone)]
pub struct PopupOptions {
    /// Prepend the truncated current top entry as a header row.
    pub show_current: bool,
    pub truncation: Truncation,
}

impl PopupOptions {
    pub fn from_plugin(options: &PluginOptions) -> Self {
        PopupOptions {
            show_current: options.get_bool("show-current-selection", true),
            truncation: options.truncation(),
        }
    }
}

impl Default for PopupOptions {
    fn default() -> Self {
        PopupOptions {
            show_current: true,
            truncation: Truncation::default(),
        }
    }
}

/// Popup-rendering capability shared by all pickers.
///
/// Holds the snapshot taken at `open`, resolves activations against it,
/// and forwards produced values to the bridge's clipboard-set operation.
/// Activation indexes refer to the item snapshot; header and separator
/// rows are not selectable and not counted.
pub struct Popup {
    state: RefCell<PickerState>,
    snapshot: RefCell<Vec<Item>>,
    nested: RefCell<Vec<Item>>,
    options: PopupOptions,
    bridge: Rc<SelectionBridge>,
}

impl Popup {
    pub fn new(bridge: Rc<SelectionBridge>, options: PopupOptions) -> Self {
        Popup {
            state: RefCell::new(PickerState::Idle),
            snapshot: RefCell::new(Vec::new()),
            nested: RefCell::new(Vec::new()),
            options,
            bridge,
        }
    }

    pub fn state(&self) -> PickerState {
        *self.state.borrow()
    }

    /// idle → open. Snapshots `items` and returns the rows to render,
    /// prepending the header when configured and a top entry exists.
    pub fn open(&self, items: Vec<Item>, current_top: Option<&str>) -> Vec<MenuEntry> {
        let mut entries = Vec::with_capacity(items.len() + 2);

        if self.options.show_current {
            if let Some(top) = current_top {
                entries.push(MenuEntry::Header(self.options.truncation.printable(top)));
                entries.push(MenuEntry::Separator);
            }
        }

        entries.extend(items.iter().map(entry_for));

        *self.snapshot.borrow_mut() = items;
        self.nested.borrow_mut().clear();
        *self.state.borrow_mut() = PickerState::Open;

        entries
    }

    /// Activate the row at `index` of the currently shown menu.
    ///
    /// A leaf invokes its producer, forwards the value to the bridge and
    /// returns to idle. A submenu entry invokes its producer lazily,
    /// exactly once, and returns the fresh nested rows.
    pub fn activate(&self, index: usize) -> Result<Option<Vec<MenuEntry>>> {
        let state = self.state();
        let item = {
            let items = match state {
                PickerState::Open => self.snapshot.borrow(),
                PickerState::NestedOpen => self.nested.borrow(),
                PickerState::Idle => bail!("picker is not open"),
            };
            match items.get(index) {
                Some(item) => item.clone(),
                None => bail!("menu index {} out of range", index),
            }
        };

        match item.producer {
            Producer::Value(produce) => {
                self.close();
                self.set((*produce)())?;
                Ok(None)
            }
            Producer::Submenu(expand) => {
                let fresh = (*expand)();
                let entries: Vec<MenuEntry> = fresh.iter().map(entry_for).collect();
                *self.nested.borrow_mut() = fresh;
                *self.state.borrow_mut() = PickerState::NestedOpen;
                Ok(Some(entries))
            }
        }
    }

    /// Escape/close: any state → idle. Snapshots are dropped.
    pub fn close(&self) {
        self.snapshot.borrow_mut().clear();
        self.nested.borrow_mut().clear();
        *self.state.borrow_mut() = PickerState::Idle;
    }

    /// Forward a produced value to the owning context's clipboard-set.
    /// `None` (failed or declined production) is a silent no-op.
    pub fn set(&self, value: Option<String>) -> Result<()> {
        match value {
            Some(text) => self.bridge.set(&text),
            None => Ok(()),
        }
    }
}

fn entry_for(item: &Item) -> MenuEntry {
    match item.producer {
        Producer::Submenu(_) => MenuEntry::Submenu(item.label.clone()),
        Producer::Value(_) => MenuEntry::Leaf(item.label.clone()),
    }
}

const HISTORY_BINDING: &str = "<Ctrl><Alt>C";
const ACTIONS_BINDING: &str = "<Ctrl><Alt>A";
const SNIPPETS_BINDING: &str = "<Ctrl><Alt>S";

/// Popup picker over its own dedup history: every "text selected" event
/// feeds the history, the popup lists it most-recent-first.
pub struct HistoryPicker {
    name: String,
    history: HistoryHandle,
    popup: Popup,
    truncation: Truncation,
    shortcut: String,
}

impl HistoryPicker {
    pub fn new(name: impl Into<String>, options: &PluginOptions, bridge: Rc<SelectionBridge>) -> Self {
        let history = DedupHistory::shared(
            options.get_usize("length", 15),
            options.get_bool("extend-detection", true),
        );

        HistoryPicker {
            name: name.into(),
            history,
            popup: Popup::new(bridge, PopupOptions::from_plugin(options)),
            truncation: options.truncation(),
            shortcut: options.get_or("shortcut", HISTORY_BINDING),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// The picker exclusively owns this history; dependents receive
    /// non-owning clones of the handle.
    pub fn history(&self) -> HistoryHandle {
        self.history.clone()
    }

    pub fn popup(&self) -> &Popup {
        &self.popup
    }

    /// Subscribe to the bridge and register the global trigger. Runs after
    /// all plugins are constructed.
    pub fn bootstrap(self: &Rc<Self>, bridge: &SelectionBridge, hotkeys: &dyn HotkeyBinder) {
        let history = self.history.clone();
        bridge.text_selected().connect(move |text: &String| {
            history.borrow_mut().add(text, true)?;
            Ok(())
        });

        let this = self.clone();
        hotkeys.bind(&self.shortcut, Box::new(move || {
            this.open();
        }));
    }

    /// idle → open with a fresh snapshot of the history.
    pub fn open(&self) -> Vec<MenuEntry> {
        let top = self.history.borrow().top().ok().map(str::to_string);
        self.popup.open(self.items(), top.as_deref())
    }
}

impl ItemSource for HistoryPicker {
    fn items(&self) -> Vec<Item> {
        self.history
            .borrow()
            .items(&self.truncation)
            .map(|(label, raw)| Item::new(label, Producer::fixed(raw)))
            .collect()
    }
}

/// Popup picker over config-declared items (snippets, actions), tied to
/// another picker's history for its producer seed.
pub struct MultiPicker {
    name: String,
    history: HistoryHandle,
    provider: ItemProvider,
    compiled: RefCell<Vec<CompiledItem>>,
    popup: Popup,
    shortcut: String,
}

impl MultiPicker {
    pub fn new(
        name: impl Into<String>,
        options: &PluginOptions,
        default_binding: &str,
        provider: ItemProvider,
        history: HistoryHandle,
        bridge: Rc<SelectionBridge>,
    ) -> Self {
        MultiPicker {
            name: name.into(),
            history,
            provider,
            compiled: RefCell::new(Vec::new()),
            popup: Popup::new(bridge, PopupOptions::from_plugin(options)),
            shortcut: options.get_or("shortcut", default_binding),
        }
    }

    /// Snippet picker preset: `[snippets]` sections, `<Ctrl><Alt>S`.
    pub fn snippets(
        name: impl Into<String>,
        options: &PluginOptions,
        provider: ItemProvider,
        history: HistoryHandle,
        bridge: Rc<SelectionBridge>,
    ) -> Self {
        Self::new(
            name,
            options,
            SNIPPETS_BINDING,
            provider,
            history,
            bridge,
        )
    }

    /// Action picker preset: `[actions]` sections, `<Ctrl><Alt>A`.
    pub fn actions(
        name: impl Into<String>,
        options: &PluginOptions,
        provider: ItemProvider,
        history: HistoryHandle,
        bridge: Rc<SelectionBridge>,
    ) -> Self {
        Self::new(
            name,
            options,
            ACTIONS_BINDING,
            provider,
            history,
            bridge,
        )
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// The tied history; this picker never owns it.
    pub fn history(&self) -> HistoryHandle {
        self.history.clone()
    }

    pub fn popup(&self) -> &Popup {
        &self.popup
    }

    /// Compile the provider's items and register global triggers: the
    /// picker's own popup binding plus one binding per item that declared
    /// a `shortcut`, each invoking `set` on that entry directly.
    pub fn bootstrap(
        self: &Rc<Self>,
        ctx: &ProviderContext,
        hotkeys: &dyn HotkeyBinder,
    ) -> Result<()> {
        let compiled = self.provider.compile(ctx)?;

        for entry in &compiled {
            if let (Some(combo), Producer::Value(produce)) =
                (&entry.shortcut, &entry.item.producer)
            {
                let this = self.clone();
                let produce = produce.clone();
                hotkeys.bind(combo, Box::new(move || {
                    if let Err(e) = this.popup.set((*produce)()) {
                        log::error!("Shortcut set failed: {}", e);
                    }
                }));
            }
        }

        *self.compiled.borrow_mut() = compiled;

        let this = self.clone();
        hotkeys.bind(&self.shortcut, Box::new(move || {
            this.open();
        }));

        Ok(())
    }

    pub fn open(&self) -> Vec<MenuEntry> {
        let top = self.history.borrow().top().ok().map(str::to_string);
        self.popup.open(self.items(), top.as_deref())
    }
}

impl ItemSource for MultiPicker {
    fn items(&self) -> Vec<Item> {
        self.compiled
            .borrow()
            .iter()
            .map(|entry| entry.item.clone())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clipboard::{MemorySource, TextSource};
    use crate::menu::provider::{CallableRegistry, ProviderLayout};
    use crate::platform::{Notifier, Spawner};
    use crate::storage::TomlConfig;

    fn test_bridge() -> (Rc<SelectionBridge>, Rc<MemorySource>) {
        struct Shared(Rc<MemorySource>);
        impl TextSource for Shared {
            fn read(&self) -> Option<String> {
                self.0.read()
            }
            fn write(&self, text: &str) {
                self.0.write(text);
            }
        }

        let clipboard = Rc::new(MemorySource::new());
        let bridge = Rc::new(SelectionBridge::new(
            Box::new(Shared(clipboard.clone())),
            Box::new(MemorySource::new()),
            false,
        ));
        (bridge, clipboard)
    }

    fn leaf(label: &str, value: &str) -> Item {
        Item::new(label, Producer::fixed(value))
    }

    #[test]
    fn test_idle_to_open_to_idle_on_leaf() {
        let (bridge, clipboard) = test_bridge();
        let popup = Popup::new(bridge, PopupOptions::default());
        assert_eq!(popup.state(), PickerState::Idle);

        let entries = popup.open(vec![leaf("a", "alpha"), leaf("b", "beta")], None);
        assert_eq!(popup.state(), PickerState::Open);
        assert_eq!(
            entries,
            vec![
                MenuEntry::Leaf("a".to_string()),
                MenuEntry::Leaf("b".to_string())
            ]
        );

        assert!(popup.activate(1).unwrap().is_none());
        assert_eq!(popup.state(), PickerState::Idle);
        assert_eq!(clipboard.read().as_deref(), Some("beta"));
    }

    #[test]
    fn test_header_shows_truncated_top() {
        let (bridge, _) = test_bridge();
        let popup = Popup::new(bridge, PopupOptions::default());

        let entries = popup.open(vec![leaf("a", "alpha")], Some("current   top\tentry"));
        assert_eq!(
            entries[0],
            MenuEntry::Header("current top entry".to_string())
        );
        assert_eq!(entries[1], MenuEntry::Separator);
    }

    #[test]
    fn test_header_suppressed_when_disabled_or_empty() {
        let (bridge, _) = test_bridge();
        let popup = Popup::new(
            bridge.clone(),
            PopupOptions {
                show_current: false,
                truncation: Truncation::default(),
            },
        );
        let entries = popup.open(vec![leaf("a", "alpha")], Some("top"));
        assert_eq!(entries.len(), 1);

        let popup = Popup::new(bridge, PopupOptions::default());
        let entries = popup.open(vec![leaf("a", "alpha")], None);
        assert_eq!(entries.len(), 1);
    }

    #[test]
    fn test_submenu_expands_lazily_exactly_once() {
        let (bridge, clipboard) = test_bridge();
        let popup = Popup::new(bridge, PopupOptions::default());

        let expansions = Rc::new(RefCell::new(0usize));
        let submenu = {
            let expansions = expansions.clone();
            Producer::submenu(move || {
                *expansions.borrow_mut() += 1;
                vec![leaf("inner", "nested value")]
            })
        };

        popup.open(vec![Item::new("more", submenu)], None);
        assert_eq!(*expansions.borrow(), 0, "submenus must never expand eagerly");

        let nested = popup.activate(0).unwrap().unwrap();
        assert_eq!(*expansions.borrow(), 1);
        assert_eq!(popup.state(), PickerState::NestedOpen);
        assert_eq!(nested, vec![MenuEntry::Leaf("inner".to_string())]);

        assert!(popup.activate(0).unwrap().is_none());
        assert_eq!(popup.state(), PickerState::Idle);
        assert_eq!(clipboard.read().as_deref(), Some("nested value"));
        assert_eq!(*expansions.borrow(), 1);
    }

    #[test]
    fn test_close_returns_to_idle_from_nested() {
        let (bridge, _) = test_bridge();
        let popup = Popup::new(bridge, PopupOptions::default());

        popup.open(
            vec![Item::new("more", Producer::submenu(|| vec![]))],
            None,
        );
        popup.activate(0).unwrap();
        assert_eq!(popup.state(), PickerState::NestedOpen);

        popup.close();
        assert_eq!(popup.state(), PickerState::Idle);
    }

    #[test]
    fn test_activate_while_idle_is_an_error() {
        let (bridge, _) = test_bridge();
        let popup = Popup::new(bridge, PopupOptions::default());
        assert!(popup.activate(0).is_err());
    }

    #[test]
    fn test_set_none_is_silent_noop() {
        let (bridge, clipboard) = test_bridge();
        let popup = Popup::new(bridge, PopupOptions::default());

        popup.set(None).unwrap();
        assert_eq!(clipboard.read(), None);
    }

    #[test]
    fn test_history_picker_feeds_from_text_selected() {
        let (bridge, _) = test_bridge();
        let picker = Rc::new(HistoryPicker::new(
            "history",
            &PluginOptions::default(),
            bridge.clone(),
        ));

        struct NoHotkeys;
        impl HotkeyBinder for NoHotkeys {
            fn bind(&self, _combo: &str, _callback: Box<dyn Fn()>) {}
        }
        picker.bootstrap(&bridge, &NoHotkeys);

        bridge.text_selected().emit(&"copied".to_string()).unwrap();
        assert_eq!(picker.history().borrow().top().unwrap(), "copied");

        let entries = picker.open();
        // Header + separator + one leaf.
        assert_eq!(entries.len(), 3);
        assert_eq!(entries[2], MenuEntry::Leaf("copied".to_string()));
    }

    #[test]
    fn test_history_picker_leaf_sets_raw_entry() {
        let (bridge, clipboard) = test_bridge();
        let picker = HistoryPicker::new("history", &PluginOptions::default(), bridge.clone());

        picker
            .history()
            .borrow_mut()
            .add("raw   spaced   text", false)
            .unwrap();

        picker.open();
        // Activation resolves against the item snapshot; the label is
        // collapsed but the raw entry is what gets set.
        picker.popup().activate(0).unwrap();
        assert_eq!(clipboard.read().as_deref(), Some("raw   spaced   text"));
    }

    struct NullNotifier;
    impl Notifier for NullNotifier {
        fn notify(&self, _summary: &str, _body: &str) {}
    }
    struct NullSpawner;
    impl Spawner for NullSpawner {
        fn spawn(&self, _argv: &[String]) {}
    }

    #[test]
    fn test_multi_picker_binds_item_shortcuts() {
        let (bridge, clipboard) = test_bridge();
        let config = TomlConfig::parse(
            r#"
[snippets]

["snippet greeting"]
value = "hello there"
shortcut = "<Ctrl><Alt>G"
"#,
        )
        .unwrap();

        let history = DedupHistory::shared(5, true);
        let provider = ItemProvider::from_config(&config, &ProviderLayout::snippets()).unwrap();
        let picker = Rc::new(MultiPicker::snippets(
            "snippets",
            &PluginOptions::default(),
            provider,
            history.clone(),
            bridge.clone(),
        ));

        let ctx = ProviderContext {
            history,
            notifier: Rc::new(NullNotifier),
            spawner: Rc::new(NullSpawner),
            registry: Rc::new(CallableRegistry::new()),
        };

        struct CollectingHotkeys(RefCell<Vec<(String, Box<dyn Fn()>)>>);
        impl HotkeyBinder for CollectingHotkeys {
            fn bind(&self, combo: &str, callback: Box<dyn Fn()>) {
                self.0.borrow_mut().push((combo.to_string(), callback));
            }
        }

        let hotkeys = CollectingHotkeys(RefCell::new(Vec::new()));
        picker.bootstrap(&ctx, &hotkeys).unwrap();

        let bindings = hotkeys.0.borrow();
        let combos: Vec<&str> = bindings.iter().map(|(c, _)| c.as_str()).collect();
        assert_eq!(combos, vec!["<Ctrl><Alt>G", "<Ctrl><Alt>S"]);

        // The item shortcut sets the snippet directly, no popup involved.
        (bindings[0].1)();
        assert_eq!(clipboard.read().as_deref(), Some("hello there"));
    }
}
