use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;

use crate::config;
use crate::models::settings::Setting;

pub type DbPool = Pool<SqliteConnectionManager>;

pub fn init_pool_at(path: &str) -> Result<DbPool, String> {
    let manager = SqliteConnectionManager::file(path);
    let pool = Pool::builder()
        .max_size(4)
        .build(manager)
        .map_err(|e| e.to_string())?;

    // WAL keeps CLI reads from blocking the worker's writes
    let conn = pool.get().map_err(|e| e.to_string())?;
    conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")
        .map_err(|e| e.to_string())?;

    Ok(pool)
}

pub fn run_migrations(pool: &DbPool) -> Result<(), Box<dyn std::error::Error>> {
    let conn = pool.get()?;

    conn.execute_batch(
        "
        -- Pending outbound e-mail
        CREATE TABLE IF NOT EXISTS mail_queue (
            id INTEGER PRIMARY KEY,
            from_address TEXT,
            to_address TEXT NOT NULL,
            subject TEXT NOT NULL DEFAULT '',
            body TEXT NOT NULL DEFAULT '',
            is_html INTEGER,
            attachment_path TEXT,
            delay_until DATETIME,
            error_attempts INTEGER,
            error_result TEXT NOT NULL DEFAULT '',
            record_for_contact_id TEXT,
            create_user TEXT,
            created_at DATETIME DEFAULT CURRENT_TIMESTAMP
        );

        -- Accounts (companies) owning contacts
        CREATE TABLE IF NOT EXISTS accounts (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL
        );

        -- Contacts that e-mails can be recorded against
        CREATE TABLE IF NOT EXISTS contacts (
            id TEXT PRIMARY KEY,
            first_name TEXT NOT NULL DEFAULT '',
            last_name TEXT NOT NULL DEFAULT '',
            email TEXT NOT NULL DEFAULT '',
            account_id TEXT,
            FOREIGN KEY (account_id) REFERENCES accounts(id)
        );

        -- Users queueing mail
        CREATE TABLE IF NOT EXISTS users (
            id TEXT PRIMARY KEY,
            display_name TEXT NOT NULL
        );

        -- Activity history
        CREATE TABLE IF NOT EXISTS history (
            id TEXT PRIMARY KEY,
            history_type TEXT NOT NULL,
            category TEXT NOT NULL,
            result TEXT NOT NULL,
            contact_id TEXT NOT NULL,
            contact_name TEXT NOT NULL,
            account_id TEXT,
            account_name TEXT,
            user_id TEXT NOT NULL,
            user_name TEXT NOT NULL,
            description TEXT NOT NULL,
            notes TEXT NOT NULL,
            long_notes TEXT NOT NULL,
            start_date DATETIME NOT NULL,
            completed_date DATETIME NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_history_contact ON history(contact_id);

        -- Settings (key-value)
        CREATE TABLE IF NOT EXISTS settings (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL
        );
        ",
    )?;

    Ok(())
}

pub fn seed_defaults(pool: &DbPool) -> Result<(), Box<dyn std::error::Error>> {
    for (key, value) in config::DEFAULT_SETTINGS {
        Setting::set_default(pool, key, value)?;
    }
    Ok(())
}
