use log::{error, info, warn};
use std::fs;
use std::path::Path;

/// Start-up checks for the database location and the optional config file.
/// Creates a missing database directory. Returns an error when the worker
/// cannot run.
pub fn run(db_path: &Path, config_path: Option<&Path>) -> Result<(), String> {
    info!("[boot] mailq boot check starting...");

    let mut warnings = 0u32;

    // ── 1. Database directory ──────────────────────────
    let db_dir = db_path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    if !db_dir.exists() {
        fs::create_dir_all(db_dir).map_err(|e| {
            error!("[boot] FAILED to create directory {}: {}", db_dir.display(), e);
            format!("cannot create {}: {}", db_dir.display(), e)
        })?;
        info!("[boot] Created directory: {}", db_dir.display());
    }

    // ── 2. Database directory writable ──────────────────
    let test_file = db_dir.join(".write_test");
    match fs::write(&test_file, "test") {
        Ok(_) => {
            let _ = fs::remove_file(&test_file);
        }
        Err(e) => {
            error!("[boot] Database directory not writable: {}", e);
            return Err(format!("{} is not writable: {}", db_dir.display(), e));
        }
    }

    // ── 3. Config file ──────────────────────────────────
    match config_path {
        Some(path) if !path.exists() => {
            // Each run reports the load failure; the worker keeps polling
            warn!("[boot] Config file {} not found", path.display());
            warnings += 1;
        }
        Some(_) => {}
        None => info!("[boot] No config file given, using the settings table"),
    }

    if warnings > 0 {
        warn!("[boot] Boot check passed with {} warning(s).", warnings);
    } else {
        info!("[boot] Boot check passed.");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn creates_missing_db_directory() {
        let dir = std::env::temp_dir().join(format!("mailq-boot-{}", std::process::id()));
        let _ = fs::remove_dir_all(&dir);
        let db = dir.join("nested").join("mailq.db");
        run(&db, None).unwrap();
        assert!(db.parent().unwrap().is_dir());
        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn missing_config_file_is_only_a_warning() {
        let db = std::env::temp_dir().join("mailq-boot-warn.db");
        assert!(run(&db, Some(Path::new("/nonexistent/mailq.toml"))).is_ok());
    }
}
