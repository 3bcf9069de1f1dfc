use std::thread;
use std::time::Duration;

use crate::config::{self, ConfigSource, RunConfiguration};
use crate::dispatch::{Dispatcher, RunSummary};
use crate::error::DispatchError;
use crate::mailer::{DryRunMailer, Mailer};
use crate::models::queue::QueueItem;
use crate::progress::{ProgressReporter, ProgressUpdate, StatusBoard};
use crate::store::memory::MemoryStore;
use crate::store::{ContactStore, QueueStore, SettingsStore};

/// One scheduled invocation: reload settings, then drain the queue.
///
/// Returns `None` when the run could not start or aborted; the cause is
/// logged and reported as an `Error` phase.
pub fn run_tick<S>(
    store: &S,
    source: &ConfigSource,
    mailer: &dyn Mailer,
    progress: &dyn ProgressReporter,
) -> Option<RunSummary>
where
    S: QueueStore<QueueItem> + ContactStore + SettingsStore,
{
    let config = match source.load(store) {
        Ok(c) => c,
        Err(e) => {
            log::error!("[task] Could not load mail queue settings: {}", e);
            progress.report(ProgressUpdate::phase("Error").detail(e.to_string()));
            return None;
        }
    };

    match Dispatcher::new(store, store, mailer)
        .with_progress(progress)
        .run_once(&config)
    {
        Ok(summary) => Some(summary),
        Err(e) => {
            log::error!("[task] Mail queue run aborted: {}", e);
            None
        }
    }
}

/// Run forever on this thread. Runs never overlap: the next one starts
/// only after the previous returned and the interval elapsed. `board`
/// holds the latest progress of the current or last run.
pub fn run_forever<S>(
    store: &S,
    source: &ConfigSource,
    mailer: &dyn Mailer,
    board: &StatusBoard,
    interval_override: Option<u64>,
) -> !
where
    S: QueueStore<QueueItem> + ContactStore + SettingsStore,
{
    log::info!("[task] Mail queue worker started");
    loop {
        run_tick(store, source, mailer, board);
        let interval = interval_override
            .map(|s| s.max(1))
            .unwrap_or_else(|| config::interval_secs(store));
        log::info!("[task] {}, next run in {}s", status_line(board), interval);
        thread::sleep(Duration::from_secs(interval));
    }
}

/// Process a snapshot of the pending queue in memory. Messages are built
/// and logged but not sent, and `queue` is never written to.
pub fn dry_run(
    queue: &dyn QueueStore<QueueItem>,
    config: &RunConfiguration,
    progress: &dyn ProgressReporter,
) -> Result<RunSummary, DispatchError> {
    let pending = queue.fetch_all_pending().map_err(DispatchError::QueueLoad)?;
    let scratch = MemoryStore::with_queue(pending);
    Dispatcher::new(&scratch, &scratch, &DryRunMailer)
        .with_progress(progress)
        .run_once(config)
}

/// One-line status of the last run for the worker log.
pub fn status_line(board: &StatusBoard) -> String {
    match board.latest() {
        Some(update) => {
            let phase = update.phase.as_deref().unwrap_or("-");
            match update.detail.as_deref() {
                Some(detail) if !detail.is_empty() => format!("Last run: {} ({})", phase, detail),
                _ => format!("Last run: {}", phase),
            }
        }
        None => "No run yet".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{KEY_ENABLED, KEY_INTERVAL_SECS, KEY_SMTP_PORT, KEY_SMTP_SERVER};
    use crate::dispatch::RunStatus;
    use crate::mailer::RecordingMailer;
    use crate::progress::NoopReporter;

    #[test]
    fn tick_reads_settings_each_time() {
        let store = MemoryStore::new();
        store.push(&QueueItem::new("a@x.com", "s", "b")).unwrap();
        let mailer = RecordingMailer::new();

        let summary = run_tick(&store, &ConfigSource::Settings, &mailer, &NoopReporter).unwrap();
        assert_eq!(summary.status, RunStatus::Disabled);
        assert!(mailer.sent().is_empty());

        store.setting_set(KEY_ENABLED, "true").unwrap();
        store.setting_set(KEY_SMTP_SERVER, "relay.local").unwrap();
        let summary = run_tick(&store, &ConfigSource::Settings, &mailer, &NoopReporter).unwrap();
        assert_eq!(summary.status, RunStatus::Complete);
        assert_eq!(mailer.sent().len(), 1);
    }

    #[test]
    fn tick_with_broken_settings_does_not_run() {
        let store = MemoryStore::new();
        store.push(&QueueItem::new("a@x.com", "s", "b")).unwrap();
        store.setting_set(KEY_ENABLED, "true").unwrap();
        store.setting_set(KEY_SMTP_SERVER, "relay.local").unwrap();
        store.setting_set(KEY_SMTP_PORT, "not-a-port").unwrap();
        let mailer = RecordingMailer::new();

        assert!(run_tick(&store, &ConfigSource::Settings, &mailer, &NoopReporter).is_none());
        assert!(mailer.sent().is_empty());
        assert_eq!(store.fetch_all_pending().unwrap().len(), 1);
    }

    #[test]
    fn broken_settings_reach_the_status_board() {
        let store = MemoryStore::new();
        store.push(&QueueItem::new("a@x.com", "s", "b")).unwrap();
        store.setting_set(KEY_ENABLED, "true").unwrap();
        store.setting_set(KEY_SMTP_SERVER, "relay.local").unwrap();
        let mailer = RecordingMailer::new();
        let board = StatusBoard::new();

        run_tick(&store, &ConfigSource::Settings, &mailer, &board).unwrap();
        assert_eq!(board.latest().unwrap().phase.as_deref(), Some("Complete"));

        store.setting_set(KEY_SMTP_PORT, "abc").unwrap();
        assert!(run_tick(&store, &ConfigSource::Settings, &mailer, &board).is_none());
        let latest = board.latest().unwrap();
        assert_eq!(latest.phase.as_deref(), Some("Error"));
        assert!(latest.detail.unwrap().contains(KEY_SMTP_PORT));
    }

    #[test]
    fn dry_run_leaves_the_queue_alone() {
        let store = MemoryStore::new();
        let good = store.push(&QueueItem::new("a@x.com, b@x.com", "s", "b")).unwrap();
        let bad = store.push(&QueueItem::new("not an address", "s", "b")).unwrap();
        let cfg = RunConfiguration {
            enabled: true,
            smtp_server: "relay.local".to_string(),
            default_from_address: "crm@example.com".to_string(),
            ..Default::default()
        };

        let summary = dry_run(&store, &cfg, &NoopReporter).unwrap();
        assert_eq!(summary.status, RunStatus::Error);
        assert_eq!(summary.total, 2);
        assert_eq!(summary.errors, 1);
        assert!(summary.error_descriptions[0].starts_with(&format!("Item {}:", bad)));

        let pending = store.fetch_all_pending().unwrap();
        assert_eq!(pending.len(), 2);
        assert_eq!(pending[0].id, good);
        assert_eq!(pending[1].attempts(), 0);
        assert_eq!(pending[1].error_result, "");
    }

    #[test]
    fn status_line_follows_the_board() {
        let board = StatusBoard::new();
        assert_eq!(status_line(&board), "No run yet");
        board.report(ProgressUpdate::phase("Complete").detail("1 e-mail(s) sent, 0 failed"));
        assert_eq!(status_line(&board), "Last run: Complete (1 e-mail(s) sent, 0 failed)");
        board.report(ProgressUpdate::phase("Loading"));
        assert_eq!(status_line(&board), "Last run: Loading");
    }

    #[test]
    fn interval_has_a_floor() {
        let store = MemoryStore::new();
        assert_eq!(config::interval_secs(&store), config::DEFAULT_INTERVAL_SECS);
        store.setting_set(KEY_INTERVAL_SECS, "0").unwrap();
        assert_eq!(config::interval_secs(&store), 1);
        store.setting_set(KEY_INTERVAL_SECS, "15").unwrap();
        assert_eq!(config::interval_secs(&store), 15);
    }
}
