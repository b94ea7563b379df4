use anyhow::{Context, Result};
use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

use crate::models::HistoryHandle;
use crate::storage::record::RecordStore;

/// Keeps a history alive across restarts.
///
/// At bootstrap it replays the backing record stream into the history
/// (bounded to the history's capacity, oldest-first, without re-triggering
/// persistence), then subscribes to "entry accepted" and appends one
/// durable record per accepted entry.
pub struct PersistentHistory {
    store: Rc<RefCell<dyn RecordStore>>,
    history: HistoryHandle,
}

impl PersistentHistory {
    pub fn new(store: Rc<RefCell<dyn RecordStore>>, history: HistoryHandle) -> Self {
        PersistentHistory { store, history }
    }

    /// Replay, then start appending. Called once, after all components are
    /// constructed.
    pub fn bootstrap(&self) -> Result<()> {
        let records = self
            .store
            .borrow_mut()
            .replay()
            .context("Failed to replay history records")?;

        // Stage into a capacity-bounded buffer so a long-lived stream only
        // contributes its newest records.
        let capacity = self.history.borrow().capacity();
        let mut staged: VecDeque<String> = VecDeque::with_capacity(capacity);
        for record in records {
            if staged.len() == capacity {
                staged.pop_front();
            }
            staged.push_back(record);
        }

        for text in &staged {
            self.history.borrow_mut().add(text, false)?;
        }
        log::debug!("Seeded history with {} staged records", staged.len());

        let store = self.store.clone();
        self.history.borrow().accepted().connect(move |text: &String| {
            store.borrow_mut().append(text)
        });

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::DedupHistory;
    use crate::storage::record::FileRecordStore;
    use std::fs;
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn temp_path(tag: &str) -> PathBuf {
        static COUNTER: AtomicUsize = AtomicUsize::new(0);
        let n = COUNTER.fetch_add(1, Ordering::SeqCst);
        std::env::temp_dir().join(format!(
            "klemmbrett-persist-{}-{}-{}.history",
            tag,
            std::process::id(),
            n
        ))
    }

    fn store_at(path: &PathBuf) -> Rc<RefCell<dyn RecordStore>> {
        Rc::new(RefCell::new(FileRecordStore::new(path.clone())))
    }

    #[test]
    fn test_round_trip_restores_order_and_content() {
        let path = temp_path("roundtrip");

        {
            let history = DedupHistory::shared(10, false);
            let persist = PersistentHistory::new(store_at(&path), history.clone());
            persist.bootstrap().unwrap();

            for text in ["alpha", "beta", "gamma"] {
                history.borrow_mut().add(text, true).unwrap();
            }
        }

        let history = DedupHistory::shared(10, false);
        let persist = PersistentHistory::new(store_at(&path), history.clone());
        persist.bootstrap().unwrap();

        let entries: Vec<String> =
            history.borrow().iter().map(|s| s.to_string()).collect();
        assert_eq!(entries, vec!["gamma", "beta", "alpha"]);

        let _ = fs::remove_file(&path);
    }

    #[test]
    fn test_replay_is_bounded_to_capacity() {
        let path = temp_path("bounded");

        {
            let history = DedupHistory::shared(10, false);
            let persist = PersistentHistory::new(store_at(&path), history.clone());
            persist.bootstrap().unwrap();

            for i in 0..6 {
                history.borrow_mut().add(&format!("entry-{}", i), true).unwrap();
            }
        }

        // A smaller history only takes the newest records.
        let history = DedupHistory::shared(2, false);
        let persist = PersistentHistory::new(store_at(&path), history.clone());
        persist.bootstrap().unwrap();

        let entries: Vec<String> =
            history.borrow().iter().map(|s| s.to_string()).collect();
        assert_eq!(entries, vec!["entry-5", "entry-4"]);

        let _ = fs::remove_file(&path);
    }

    #[test]
    fn test_replay_does_not_retrigger_persistence() {
        let path = temp_path("noloop");

        {
            let history = DedupHistory::shared(10, false);
            let persist = PersistentHistory::new(store_at(&path), history.clone());
            persist.bootstrap().unwrap();
            history.borrow_mut().add("only", true).unwrap();
        }

        // Bootstrap twice more; the stream must still hold one record.
        for _ in 0..2 {
            let history = DedupHistory::shared(10, false);
            let persist = PersistentHistory::new(store_at(&path), history.clone());
            persist.bootstrap().unwrap();
        }

        let mut fresh = FileRecordStore::new(&path);
        assert_eq!(fresh.replay().unwrap(), vec!["only"]);

        let _ = fs::remove_file(&path);
    }
}
