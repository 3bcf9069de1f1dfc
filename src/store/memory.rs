use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use crate::models::contact::{Contact, User};
use crate::models::history::HistoryNote;
use crate::models::queue::QueueItem;

use super::{ContactStore, QueueStore, SettingsStore};

#[derive(Default)]
struct Inner {
    next_id: i64,
    queue: Vec<QueueItem>,
    contacts: HashMap<String, Contact>,
    users: HashMap<String, User>,
    history: Vec<HistoryNote>,
    settings: HashMap<String, String>,
}

/// In-process store keeping everything in insertion order.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store preloaded with queue items, keeping their ids.
    pub fn with_queue(items: Vec<QueueItem>) -> Self {
        let next_id = items.iter().map(|q| q.id).max().unwrap_or(0);
        MemoryStore {
            inner: Mutex::new(Inner {
                next_id,
                queue: items,
                ..Default::default()
            }),
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, Inner>, String> {
        self.inner
            .lock()
            .map_err(|_| "memory store lock poisoned".to_string())
    }

    pub fn add_contact(&self, contact: Contact) -> Result<(), String> {
        self.lock()?.contacts.insert(contact.id.clone(), contact);
        Ok(())
    }

    pub fn add_user(&self, user: User) -> Result<(), String> {
        self.lock()?.users.insert(user.id.clone(), user);
        Ok(())
    }

    pub fn history(&self) -> Result<Vec<HistoryNote>, String> {
        Ok(self.lock()?.history.clone())
    }
}

impl QueueStore<QueueItem> for MemoryStore {
    fn fetch_all_pending(&self) -> Result<Vec<QueueItem>, String> {
        Ok(self.lock()?.queue.clone())
    }

    fn save(&self, item: &QueueItem) -> Result<(), String> {
        let mut inner = self.lock()?;
        match inner.queue.iter_mut().find(|q| q.id == item.id) {
            Some(slot) => {
                *slot = item.clone();
                Ok(())
            }
            None => Err(format!("queue item {} not found", item.id)),
        }
    }

    fn delete(&self, item: &QueueItem) -> Result<(), String> {
        self.lock()?.queue.retain(|q| q.id != item.id);
        Ok(())
    }

    fn push(&self, item: &QueueItem) -> Result<i64, String> {
        let mut inner = self.lock()?;
        inner.next_id += 1;
        let mut stored = item.clone();
        stored.id = inner.next_id;
        inner.queue.push(stored);
        Ok(inner.next_id)
    }

    fn get(&self, id: i64) -> Result<Option<QueueItem>, String> {
        Ok(self.lock()?.queue.iter().find(|q| q.id == id).cloned())
    }
}

impl ContactStore for MemoryStore {
    fn find_contact(&self, id: &str) -> Result<Option<Contact>, String> {
        Ok(self.lock()?.contacts.get(id).cloned())
    }

    fn find_user(&self, id: &str) -> Result<Option<User>, String> {
        Ok(self.lock()?.users.get(id).cloned())
    }

    fn create_history_note(&self, note: &HistoryNote) -> Result<(), String> {
        self.lock()?.history.push(note.clone());
        Ok(())
    }

    fn history_for_contact(&self, contact_id: &str) -> Result<Vec<HistoryNote>, String> {
        Ok(self
            .lock()?
            .history
            .iter()
            .rev()
            .filter(|n| n.contact_id == contact_id)
            .cloned()
            .collect())
    }
}

impl SettingsStore for MemoryStore {
    fn setting_get(&self, key: &str) -> Option<String> {
        self.lock().ok()?.settings.get(key).cloned()
    }

    fn setting_set(&self, key: &str, value: &str) -> Result<(), String> {
        self.lock()?
            .settings
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn setting_all(&self) -> Result<HashMap<String, String>, String> {
        Ok(self.lock()?.settings.clone())
    }
}
