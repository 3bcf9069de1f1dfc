use std::collections::HashMap;

use rusqlite::{params, OptionalExtension};

use crate::db::DbPool;
use crate::models::contact::{Contact, User};
use crate::models::history::{HistoryNote, HistoryType};
use crate::models::queue::QueueItem;
use crate::models::settings::Setting;

use super::{ContactStore, QueueStore, SettingsStore};

/// SQLite-backed store for the queue, contacts and settings.
/// Wraps an r2d2 connection pool.
pub struct SqliteStore {
    pub pool: DbPool,
}

const QUEUE_COLS: &str = "id, from_address, to_address, subject, body, is_html, attachment_path, \
     delay_until, error_attempts, error_result, record_for_contact_id, create_user";

const HISTORY_COLS: &str = "id, history_type, category, result, contact_id, contact_name, \
     account_id, account_name, user_id, user_name, description, notes, long_notes, \
     start_date, completed_date";

impl SqliteStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub fn new_at(path: &str) -> Result<Self, String> {
        let pool = crate::db::init_pool_at(path)?;
        Ok(Self { pool })
    }

    // ── Lifecycle ───────────────────────────────────────────────────

    pub fn run_migrations(&self) -> Result<(), String> {
        crate::db::run_migrations(&self.pool).map_err(|e| e.to_string())
    }

    pub fn seed_defaults(&self) -> Result<(), String> {
        crate::db::seed_defaults(&self.pool).map_err(|e| e.to_string())
    }

    // ── Directory data ──────────────────────────────────────────────

    pub fn account_upsert(&self, id: &str, name: &str) -> Result<(), String> {
        let conn = self.pool.get().map_err(|e| e.to_string())?;
        conn.execute(
            "INSERT INTO accounts (id, name) VALUES (?1, ?2)
             ON CONFLICT(id) DO UPDATE SET name = ?2",
            params![id, name],
        )
        .map_err(|e| e.to_string())?;
        Ok(())
    }

    pub fn contact_upsert(&self, contact: &Contact) -> Result<(), String> {
        let conn = self.pool.get().map_err(|e| e.to_string())?;
        conn.execute(
            "INSERT INTO contacts (id, first_name, last_name, email, account_id)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(id) DO UPDATE SET first_name = ?2, last_name = ?3, email = ?4, account_id = ?5",
            params![
                contact.id,
                contact.first_name,
                contact.last_name,
                contact.email,
                contact.account_id
            ],
        )
        .map_err(|e| e.to_string())?;
        Ok(())
    }

    pub fn user_upsert(&self, user: &User) -> Result<(), String> {
        let conn = self.pool.get().map_err(|e| e.to_string())?;
        conn.execute(
            "INSERT INTO users (id, display_name) VALUES (?1, ?2)
             ON CONFLICT(id) DO UPDATE SET display_name = ?2",
            params![user.id, user.display_name],
        )
        .map_err(|e| e.to_string())?;
        Ok(())
    }
}

fn queue_item_from_row(r: &rusqlite::Row) -> rusqlite::Result<QueueItem> {
    Ok(QueueItem {
        id: r.get(0)?,
        from_address: r.get(1)?,
        to_address: r.get(2)?,
        subject: r.get(3)?,
        body: r.get(4)?,
        is_html: r.get(5)?,
        attachment_path: r.get(6)?,
        delay_until: r.get(7)?,
        error_attempts: r.get(8)?,
        error_result: r.get::<_, Option<String>>(9)?.unwrap_or_default(),
        record_for_contact_id: r.get(10)?,
        create_user: r.get(11)?,
    })
}

fn history_from_row(r: &rusqlite::Row) -> rusqlite::Result<HistoryNote> {
    let kind: String = r.get(1)?;
    let history_type = HistoryType::parse(&kind).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            1,
            rusqlite::types::Type::Text,
            format!("unknown history type '{}'", kind).into(),
        )
    })?;
    Ok(HistoryNote {
        id: r.get(0)?,
        history_type,
        category: r.get(2)?,
        result: r.get(3)?,
        contact_id: r.get(4)?,
        contact_name: r.get(5)?,
        account_id: r.get(6)?,
        account_name: r.get(7)?,
        user_id: r.get(8)?,
        user_name: r.get(9)?,
        description: r.get(10)?,
        notes: r.get(11)?,
        long_notes: r.get(12)?,
        start_date: r.get(13)?,
        completed_date: r.get(14)?,
    })
}

impl QueueStore<QueueItem> for SqliteStore {
    fn fetch_all_pending(&self) -> Result<Vec<QueueItem>, String> {
        let conn = self.pool.get().map_err(|e| e.to_string())?;
        let mut stmt = conn
            .prepare(&format!("SELECT {} FROM mail_queue ORDER BY id ASC", QUEUE_COLS))
            .map_err(|e| e.to_string())?;
        let rows = stmt
            .query_map([], queue_item_from_row)
            .map_err(|e| e.to_string())?;
        rows.collect::<Result<Vec<_>, _>>()
            .map_err(|e| e.to_string())
    }

    fn save(&self, item: &QueueItem) -> Result<(), String> {
        let conn = self.pool.get().map_err(|e| e.to_string())?;
        let changed = conn
            .execute(
                "UPDATE mail_queue SET from_address = ?1, to_address = ?2, subject = ?3, body = ?4, \
                 is_html = ?5, attachment_path = ?6, delay_until = ?7, error_attempts = ?8, \
                 error_result = ?9, record_for_contact_id = ?10, create_user = ?11 \
                 WHERE id = ?12",
                params![
                    item.from_address,
                    item.to_address,
                    item.subject,
                    item.body,
                    item.is_html,
                    item.attachment_path,
                    item.delay_until,
                    item.error_attempts,
                    item.error_result,
                    item.record_for_contact_id,
                    item.create_user,
                    item.id
                ],
            )
            .map_err(|e| e.to_string())?;
        if changed == 0 {
            return Err(format!("queue item {} not found", item.id));
        }
        Ok(())
    }

    fn delete(&self, item: &QueueItem) -> Result<(), String> {
        let conn = self.pool.get().map_err(|e| e.to_string())?;
        conn.execute("DELETE FROM mail_queue WHERE id = ?1", params![item.id])
            .map_err(|e| e.to_string())?;
        Ok(())
    }

    fn push(&self, item: &QueueItem) -> Result<i64, String> {
        let conn = self.pool.get().map_err(|e| e.to_string())?;
        conn.execute(
            "INSERT INTO mail_queue (from_address, to_address, subject, body, is_html, \
             attachment_path, delay_until, error_attempts, error_result, record_for_contact_id, create_user) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            params![
                item.from_address,
                item.to_address,
                item.subject,
                item.body,
                item.is_html,
                item.attachment_path,
                item.delay_until,
                item.error_attempts,
                item.error_result,
                item.record_for_contact_id,
                item.create_user
            ],
        )
        .map_err(|e| e.to_string())?;
        Ok(conn.last_insert_rowid())
    }

    fn get(&self, id: i64) -> Result<Option<QueueItem>, String> {
        let conn = self.pool.get().map_err(|e| e.to_string())?;
        conn.query_row(
            &format!("SELECT {} FROM mail_queue WHERE id = ?1", QUEUE_COLS),
            params![id],
            queue_item_from_row,
        )
        .optional()
        .map_err(|e| e.to_string())
    }
}

impl ContactStore for SqliteStore {
    fn find_contact(&self, id: &str) -> Result<Option<Contact>, String> {
        let conn = self.pool.get().map_err(|e| e.to_string())?;
        conn.query_row(
            "SELECT c.id, c.first_name, c.last_name, c.email, c.account_id, a.name \
             FROM contacts c LEFT JOIN accounts a ON a.id = c.account_id \
             WHERE c.id = ?1",
            params![id],
            |r| {
                Ok(Contact {
                    id: r.get(0)?,
                    first_name: r.get(1)?,
                    last_name: r.get(2)?,
                    email: r.get(3)?,
                    account_id: r.get(4)?,
                    account_name: r.get(5)?,
                })
            },
        )
        .optional()
        .map_err(|e| e.to_string())
    }

    fn find_user(&self, id: &str) -> Result<Option<User>, String> {
        let conn = self.pool.get().map_err(|e| e.to_string())?;
        conn.query_row(
            "SELECT id, display_name FROM users WHERE id = ?1",
            params![id],
            |r| {
                Ok(User {
                    id: r.get(0)?,
                    display_name: r.get(1)?,
                })
            },
        )
        .optional()
        .map_err(|e| e.to_string())
    }

    fn create_history_note(&self, note: &HistoryNote) -> Result<(), String> {
        let conn = self.pool.get().map_err(|e| e.to_string())?;
        conn.execute(
            &format!(
                "INSERT INTO history ({}) VALUES \
                 (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)",
                HISTORY_COLS
            ),
            params![
                note.id,
                note.history_type.as_str(),
                note.category,
                note.result,
                note.contact_id,
                note.contact_name,
                note.account_id,
                note.account_name,
                note.user_id,
                note.user_name,
                note.description,
                note.notes,
                note.long_notes,
                note.start_date,
                note.completed_date
            ],
        )
        .map_err(|e| e.to_string())?;
        Ok(())
    }

    fn history_for_contact(&self, contact_id: &str) -> Result<Vec<HistoryNote>, String> {
        let conn = self.pool.get().map_err(|e| e.to_string())?;
        let mut stmt = conn
            .prepare(&format!(
                "SELECT {} FROM history WHERE contact_id = ?1 \
                 ORDER BY completed_date DESC, rowid DESC",
                HISTORY_COLS
            ))
            .map_err(|e| e.to_string())?;
        let rows = stmt
            .query_map(params![contact_id], history_from_row)
            .map_err(|e| e.to_string())?;
        rows.collect::<Result<Vec<_>, _>>()
            .map_err(|e| e.to_string())
    }
}

impl SettingsStore for SqliteStore {
    fn setting_get(&self, key: &str) -> Option<String> {
        Setting::get(&self.pool, key).ok().flatten()
    }

    fn setting_set(&self, key: &str, value: &str) -> Result<(), String> {
        Setting::set(&self.pool, key, value)
    }

    fn setting_all(&self) -> Result<HashMap<String, String>, String> {
        Setting::all(&self.pool)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config;
    use chrono::{Duration, Utc};

    /// Create a fresh in-memory SqliteStore with migrations + seed applied.
    fn test_store() -> SqliteStore {
        let manager = r2d2_sqlite::SqliteConnectionManager::memory();
        let pool = r2d2::Pool::builder()
            .max_size(1)
            .build(manager)
            .expect("Failed to create in-memory pool");
        let store = SqliteStore::new(pool);
        store.run_migrations().expect("migrations failed");
        store.seed_defaults().expect("seed failed");
        store
    }

    // ── Queue ───────────────────────────────────────────────────────

    #[test]
    fn test_queue_lifecycle() {
        let s = test_store();
        let now = Utc::now().naive_utc();
        let mut item = QueueItem::new("a@x.com; b@x.com", "Hi", "<p>Hello</p>");
        item.is_html = Some(true);
        item.delay_until = Some(now + Duration::minutes(10));
        item.record_for_contact_id = Some("C1".to_string());

        let id = s.push(&item).unwrap();
        let stored = s.get(id).unwrap().unwrap();
        assert_eq!(stored.to_address, "a@x.com; b@x.com");
        assert_eq!(stored.is_html, Some(true));
        assert_eq!(stored.error_attempts, None);
        assert!(stored.delay_until.is_some());

        let mut failed = stored.clone();
        failed.mark_failed("timeout");
        s.save(&failed).unwrap();
        let reloaded = s.get(id).unwrap().unwrap();
        assert_eq!(reloaded.error_attempts, Some(1));
        assert_eq!(reloaded.error_result, "Error: timeout");

        s.delete(&reloaded).unwrap();
        assert!(s.get(id).unwrap().is_none());
    }

    #[test]
    fn test_fetch_keeps_insertion_order() {
        let s = test_store();
        for to in ["c@x.com", "a@x.com", "b@x.com"] {
            s.push(&QueueItem::new(to, "s", "b")).unwrap();
        }
        let order: Vec<String> = s
            .fetch_all_pending()
            .unwrap()
            .into_iter()
            .map(|i| i.to_address)
            .collect();
        assert_eq!(order, vec!["c@x.com", "a@x.com", "b@x.com"]);
    }

    #[test]
    fn test_save_missing_item_fails() {
        let s = test_store();
        let mut ghost = QueueItem::new("a@x.com", "s", "b");
        ghost.id = 42;
        assert!(s.save(&ghost).is_err());
    }

    // ── Contacts & history ──────────────────────────────────────────

    #[test]
    fn test_contact_with_account() {
        let s = test_store();
        s.account_upsert("A1", "Engines Ltd").unwrap();
        s.contact_upsert(&Contact {
            id: "C1".to_string(),
            first_name: "Ada".to_string(),
            last_name: "Lovelace".to_string(),
            email: "ada@x.com".to_string(),
            account_id: Some("A1".to_string()),
            account_name: None,
        })
        .unwrap();

        let c = s.find_contact("C1").unwrap().unwrap();
        assert_eq!(c.account_name.as_deref(), Some("Engines Ltd"));
        assert!(s.find_contact("nope").unwrap().is_none());
    }

    #[test]
    fn test_history_note_persisted() {
        let s = test_store();
        s.user_upsert(&User {
            id: "U1".to_string(),
            display_name: "Grace".to_string(),
        })
        .unwrap();
        let user = s.find_user("U1").unwrap().unwrap();
        let contact = Contact {
            id: "C1".to_string(),
            first_name: "Ada".to_string(),
            last_name: String::new(),
            email: "ada@x.com".to_string(),
            account_id: None,
            account_name: None,
        };
        let item = QueueItem::new("ada@x.com", "Quote", "Here is your quote");
        let note = HistoryNote::for_email(&item, &contact, &user, Utc::now().naive_utc());
        s.create_history_note(&note).unwrap();

        let notes = s.history_for_contact("C1").unwrap();
        assert_eq!(notes.len(), 1);
        assert_eq!(notes[0].user_name, "Grace");
        assert_eq!(notes[0].history_type, HistoryType::Email);
        assert_eq!(notes[0].description, "Quote");
    }

    // ── Settings ────────────────────────────────────────────────────

    #[test]
    fn test_setting_get_set() {
        let s = test_store();
        assert!(s.setting_get("nonexistent_key_xyz").is_none());
        s.setting_set("test_key", "hello").unwrap();
        assert_eq!(s.setting_get("test_key"), Some("hello".to_string()));
    }

    #[test]
    fn test_seeded_defaults_do_not_overwrite() {
        let s = test_store();
        assert_eq!(s.setting_get(config::KEY_SMTP_PORT), Some("25".to_string()));
        s.setting_set(config::KEY_SMTP_PORT, "2525").unwrap();
        s.seed_defaults().unwrap();
        assert_eq!(s.setting_get(config::KEY_SMTP_PORT), Some("2525".to_string()));
    }
}
