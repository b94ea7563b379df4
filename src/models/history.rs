use anyhow::Result;
use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

use crate::events::Signal;
use crate::models::item::Truncation;

/// Recoverable condition: `top` was asked of a history with no entries.
/// Callers convert this into user feedback at the boundary where feedback
/// is appropriate; it is never a fatal error.
#[derive(Debug, thiserror::Error)]
#[error("the history is empty")]
pub struct HistoryEmpty;

/// Shared, non-owning handle to a history.
///
/// The owning picker creates the handle; dependents (persistence, pickers,
/// exchange) hold clones and never control the history's lifecycle. All
/// access happens on the hosting event-loop thread, so `Rc<RefCell<_>>`
/// suffices, no locking.
pub type HistoryHandle = Rc<RefCell<DedupHistory>>;

/// Bounded, ordered collection of accepted text entries, most-recent-first,
/// with merge-by-extension on the top entry.
///
/// Inserting beyond capacity silently evicts the oldest (tail) entry.
pub struct DedupHistory {
    entries: VecDeque<String>,
    capacity: usize,
    extend_detection: bool,
    accepted: Signal<String>,
}

impl DedupHistory {
    /// Create an empty history. `capacity` is clamped to at least 1 and is
    /// immutable afterwards.
    pub fn new(capacity: usize, extend_detection: bool) -> Self {
        DedupHistory {
            entries: VecDeque::with_capacity(capacity.max(1)),
            capacity: capacity.max(1),
            extend_detection,
            accepted: Signal::new(),
        }
    }

    /// Convenience constructor for the shared-handle form every consumer
    /// actually uses.
    pub fn shared(capacity: usize, extend_detection: bool) -> HistoryHandle {
        Rc::new(RefCell::new(DedupHistory::new(capacity, extend_detection)))
    }

    /// Admission policy: non-empty after trimming, and not equal to the
    /// current top entry. Whitespace-only input is rejected without error.
    pub fn accepts(&self, text: &str) -> bool {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return false;
        }

        match self.entries.front() {
            None => true,
            Some(top) => trimmed != top,
        }
    }

    /// Extend detection: the incoming text grows or shrinks the current
    /// top entry by a verbatim prefix or suffix. A user re-copying while
    /// typing produces exactly this pattern; merging keeps the history
    /// from filling with near-duplicates.
    fn is_extended(&self, text: &str) -> bool {
        if !self.extend_detection {
            return false;
        }

        match self.entries.front() {
            Some(top) => text.starts_with(top.as_str()) || text.ends_with(top.as_str()),
            None => false,
        }
    }

    /// Insert `text` if the admission policy accepts it.
    ///
    /// An extending text replaces the top entry in place; anything else is
    /// pushed to the front, evicting the tail beyond capacity. With `emit`
    /// the "entry accepted" signal fires synchronously after the mutation
    /// is committed; a subscriber failure (e.g. a persistence flush)
    /// propagates to the caller.
    ///
    /// Returns `Ok(false)` for rejected input, `Ok(true)` for accepted.
    pub fn add(&mut self, text: &str, emit: bool) -> Result<bool> {
        if !self.accepts(text) {
            return Ok(false);
        }

        // Stored verbatim; trimming applies to the admission check only.
        let text = text.to_string();

        if self.is_extended(&text) {
            self.entries[0] = text.clone();
        } else {
            self.entries.push_front(text.clone());
            self.entries.truncate(self.capacity);
        }

        if emit {
            self.accepted.emit(&text)?;
        }
        Ok(true)
    }

    /// The most recent entry. Empty histories are a recoverable condition,
    /// not a crash.
    pub fn top(&self) -> Result<&str, HistoryEmpty> {
        self.entries.front().map(|s| s.as_str()).ok_or(HistoryEmpty)
    }

    /// `(printable_label, raw_entry)` pairs, most-recent-first. Restartable:
    /// each call reflects the state at call time.
    pub fn items<'a>(
        &'a self,
        truncation: &'a Truncation,
    ) -> impl Iterator<Item = (String, &'a str)> + 'a {
        self.entries
            .iter()
            .map(move |entry| (truncation.printable(entry), entry.as_str()))
    }

    /// Raw entries, most-recent-first.
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|s| s.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// The "entry accepted" signal. Subscribers must not call back into
    /// this history; emission happens while `add` holds the mutable borrow.
    pub fn accepted(&self) -> &Signal<String> {
        &self.accepted
    }
}
