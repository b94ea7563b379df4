use anyhow::Result;
use std::cell::RefCell;

use crate::events::Signal;

/// A clipboard-like text source: readable, writable, with change
/// notifications delivered externally by the hosting event loop.
pub trait TextSource {
    /// Current text, or `None` when the source holds no text.
    fn read(&self) -> Option<String>;

    fn write(&self, text: &str);
}

/// In-process text source for headless operation and tests.
#[derive(Default)]
pub struct MemorySource {
    text: RefCell<Option<String>>,
}

impl MemorySource {
    pub fn new() -> Self {
        MemorySource::default()
    }
}

impl TextSource for MemorySource {
    fn read(&self) -> Option<String> {
        self.text.borrow().clone()
    }

    fn write(&self, text: &str) {
        *self.text.borrow_mut() = Some(text.to_string());
    }
}

/// Which of the two watched sources reported a change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Selection {
    Clipboard,
    Primary,
}

/// Observes the system clipboard and the primary selection, deduplicates
/// against the last-seen value, optionally mirrors one source into the
/// other, and emits "text selected" for every new value.
pub struct SelectionBridge {
    clipboard: Box<dyn TextSource>,
    primary: Box<dyn TextSource>,
    sync: bool,
    last_seen: RefCell<Option<String>>,
    text_selected: Signal<String>,
    text_set: Signal<String>,
}

impl SelectionBridge {
    pub fn new(clipboard: Box<dyn TextSource>, primary: Box<dyn TextSource>, sync: bool) -> Self {
        SelectionBridge {
            clipboard,
            primary,
            sync,
            last_seen: RefCell::new(None),
            text_selected: Signal::new(),
            text_set: Signal::new(),
        }
    }

    /// Change-notification entry point, called by the hosting loop when
    /// either source reports a new owner.
    ///
    /// Returns whether a "text selected" event was emitted. The last-seen
    /// value is recorded before the mirroring write-back, so a re-entrant
    /// notification caused by the mirror hits the equality check and stops.
    pub fn source_changed(&self, which: Selection) -> Result<bool> {
        let source = match which {
            Selection::Clipboard => self.clipboard.as_ref(),
            Selection::Primary => self.primary.as_ref(),
        };

        let text = match source.read() {
            Some(text) => text,
            None => return Ok(false),
        };

        let unchanged = self.last_seen.borrow().as_deref() == Some(text.as_str());
        if unchanged {
            return Ok(false);
        }

        *self.last_seen.borrow_mut() = Some(text.clone());

        if self.sync {
            let other = match which {
                Selection::Clipboard => self.primary.as_ref(),
                Selection::Primary => self.clipboard.as_ref(),
            };
            if other.read().as_deref() != Some(text.as_str()) {
                other.write(&text);
            }
        }

        self.text_selected.emit(&text)?;
        Ok(true)
    }

    /// Write `text` into both sources and emit "text set". The resulting
    /// owner-change notifications flow back through `source_changed`.
    pub fn set(&self, text: &str) -> Result<()> {
        self.clipboard.write(text);
        self.primary.write(text);
        self.text_set.emit(&text.to_string())
    }

    pub fn text_selected(&self) -> &Signal<String> {
        &self.text_selected
    }

    pub fn text_set(&self) -> &Signal<String> {
        &self.text_set
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::rc::Rc;

    fn bridge_with_sources(sync: bool) -> (Rc<SelectionBridge>, Rc<MemorySource>, Rc<MemorySource>) {
        // Boxed clones share state with the handles the test keeps.
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
        let primary = Rc::new(MemorySource::new());
        let bridge = Rc::new(SelectionBridge::new(
            Box::new(Shared(clipboard.clone())),
            Box::new(Shared(primary.clone())),
            sync,
        ));
        (bridge, clipboard, primary)
    }

    #[test]
    fn test_change_emits_text_selected() {
        let (bridge, clipboard, _) = bridge_with_sources(false);
        let seen = Rc::new(RefCell::new(Vec::new()));

        {
            let seen = seen.clone();
            bridge.text_selected().connect(move |text: &String| {
                seen.borrow_mut().push(text.clone());
                Ok(())
            });
        }

        clipboard.write("hello");
        assert!(bridge.source_changed(Selection::Clipboard).unwrap());
        assert_eq!(*seen.borrow(), vec!["hello"]);
    }

    #[test]
    fn test_unchanged_value_is_deduplicated() {
        let (bridge, clipboard, _) = bridge_with_sources(false);

        clipboard.write("hello");
        assert!(bridge.source_changed(Selection::Clipboard).unwrap());
        assert!(!bridge.source_changed(Selection::Clipboard).unwrap());
    }

    #[test]
    fn test_empty_source_is_no_event() {
        let (bridge, _, _) = bridge_with_sources(true);
        assert!(!bridge.source_changed(Selection::Clipboard).unwrap());
    }

    #[test]
    fn test_mirroring_copies_into_other_source() {
        let (bridge, clipboard, primary) = bridge_with_sources(true);

        primary.write("selected text");
        bridge.source_changed(Selection::Primary).unwrap();
        assert_eq!(clipboard.read().as_deref(), Some("selected text"));

        clipboard.write("copied text");
        bridge.source_changed(Selection::Clipboard).unwrap();
        assert_eq!(primary.read().as_deref(), Some("copied text"));
    }

    #[test]
    fn test_mirroring_disabled_leaves_other_source() {
        let (bridge, clipboard, primary) = bridge_with_sources(false);

        primary.write("selected text");
        bridge.source_changed(Selection::Primary).unwrap();
        assert_eq!(clipboard.read(), None);
    }

    #[test]
    fn test_mirror_writeback_does_not_retrigger() {
        let (bridge, clipboard, primary) = bridge_with_sources(true);
        let count = Rc::new(RefCell::new(0usize));

        {
            let count = count.clone();
            bridge.text_selected().connect(move |_: &String| {
                *count.borrow_mut() += 1;
                Ok(())
            });
        }

        primary.write("text");
        bridge.source_changed(Selection::Primary).unwrap();
        // The mirror write raises a change notification for the clipboard;
        // the recorded last-seen value must swallow it.
        bridge.source_changed(Selection::Clipboard).unwrap();

        assert_eq!(*count.borrow(), 1);
        assert_eq!(clipboard.read().as_deref(), Some("text"));
    }

    #[test]
    fn test_set_writes_both_and_emits_text_set() {
        let (bridge, clipboard, primary) = bridge_with_sources(true);
        let seen = Rc::new(RefCell::new(Vec::new()));

        {
            let seen = seen.clone();
            bridge.text_set().connect(move |text: &String| {
                seen.borrow_mut().push(text.clone());
                Ok(())
            });
        }

        bridge.set("chosen").unwrap();
        assert_eq!(clipboard.read().as_deref(), Some("chosen"));
        assert_eq!(primary.read().as_deref(), Some("chosen"));
        assert_eq!(*seen.borrow(), vec!["chosen"]);
    }
}
