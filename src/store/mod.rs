use std::collections::HashMap;

use chrono::NaiveDateTime;

use crate::models::contact::{Contact, User};
use crate::models::history::HistoryNote;
use crate::models::queue::{QueueItem, QueueStats};

pub mod memory;
pub mod sqlite;

/// Durable ordered collection of pending items.
/// Implementations: `SqliteStore` (rusqlite/r2d2) and `MemoryStore`.
pub trait QueueStore<T>: Send + Sync {
    /// Every stored item, in insertion order.
    fn fetch_all_pending(&self) -> Result<Vec<T>, String>;
    fn save(&self, item: &T) -> Result<(), String>;
    fn delete(&self, item: &T) -> Result<(), String>;

    /// Enqueue a new item and return its id.
    fn push(&self, item: &T) -> Result<i64, String>;
    fn get(&self, id: i64) -> Result<Option<T>, String>;
}

/// Operator queries over the mail queue.
pub trait MailQueueAdmin: QueueStore<QueueItem> {
    /// Items past the error ceiling, left in place for inspection.
    fn stuck(&self, max_error_attempts: i64) -> Result<Vec<QueueItem>, String> {
        Ok(self
            .fetch_all_pending()?
            .into_iter()
            .filter(|item| item.exceeds_ceiling(max_error_attempts))
            .collect())
    }

    /// Clear the failure state so the item is attempted again.
    /// Returns false when no item has this id.
    fn reset_attempts(&self, id: i64) -> Result<bool, String> {
        match self.get(id)? {
            Some(mut item) => {
                item.error_attempts = None;
                item.error_result.clear();
                self.save(&item)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn stats(&self, max_error_attempts: i64, now: NaiveDateTime) -> Result<QueueStats, String> {
        let items = self.fetch_all_pending()?;
        Ok(QueueStats::from_items(&items, max_error_attempts, now))
    }
}

impl<S: QueueStore<QueueItem> + ?Sized> MailQueueAdmin for S {}

/// Contacts, users and their activity history.
pub trait ContactStore: Send + Sync {
    fn find_contact(&self, id: &str) -> Result<Option<Contact>, String>;
    fn find_user(&self, id: &str) -> Result<Option<User>, String>;
    fn create_history_note(&self, note: &HistoryNote) -> Result<(), String>;
    /// Newest first.
    fn history_for_contact(&self, contact_id: &str) -> Result<Vec<HistoryNote>, String>;
}

/// Key/value settings.
pub trait SettingsStore: Send + Sync {
    fn setting_get(&self, key: &str) -> Option<String>;
    fn setting_get_or(&self, key: &str, default: &str) -> String {
        self.setting_get(key).unwrap_or_else(|| default.to_string())
    }
    fn setting_set(&self, key: &str, value: &str) -> Result<(), String>;
    fn setting_all(&self) -> Result<HashMap<String, String>, String>;
}

#[cfg(test)]
mod tests {
    use super::memory::MemoryStore;
    use super::*;
    use chrono::{Duration, Utc};

    fn item(to: &str) -> QueueItem {
        QueueItem::new(to, "subject", "body")
    }

    #[test]
    fn test_push_assigns_increasing_ids() {
        let s = MemoryStore::new();
        let a = s.push(&item("a@x.com")).unwrap();
        let b = s.push(&item("b@x.com")).unwrap();
        assert!(b > a);
        let all = s.fetch_all_pending().unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].id, a);
        assert_eq!(all[1].to_address, "b@x.com");
    }

    #[test]
    fn test_stuck_and_reset() {
        let s = MemoryStore::new();
        let mut stuck = item("a@x.com");
        stuck.error_attempts = Some(6);
        stuck.error_result = "Error: nope".to_string();
        let id = s.push(&stuck).unwrap();
        s.push(&item("b@x.com")).unwrap();

        let listed = s.stuck(5).unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].id, id);
        assert!(s.stuck(0).unwrap().is_empty());

        assert!(s.reset_attempts(id).unwrap());
        let reset = s.get(id).unwrap().unwrap();
        assert_eq!(reset.error_attempts, None);
        assert!(reset.error_result.is_empty());
        assert!(!s.reset_attempts(9_999).unwrap());
    }

    #[test]
    fn test_stats() {
        let s = MemoryStore::new();
        let now = Utc::now().naive_utc();
        let mut later = item("a@x.com");
        later.delay_until = Some(now + Duration::hours(1));
        s.push(&later).unwrap();
        s.push(&item("b@x.com")).unwrap();
        let stats = s.stats(3, now).unwrap();
        assert_eq!(stats.deferred, 1);
        assert_eq!(stats.pending, 1);
        assert_eq!(stats.total, 2);
    }
}
