pub mod hooks;
pub mod recording;

use std::path::PathBuf;

use chrono::{NaiveDateTime, Utc};
use serde::Serialize;

use crate::config::RunConfiguration;
use crate::error::{DeliveryError, DispatchError};
use crate::mailer::{Mailer, OutgoingMessage, SmtpEndpoint};
use crate::models::queue::QueueItem;
use crate::progress::{NoopReporter, ProgressReporter, ProgressUpdate};
use crate::store::{ContactStore, QueueStore};

use hooks::{NoopHook, ProcessedHook};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RunStatus {
    /// Every attempted item was sent.
    Complete,
    /// At least one attempted item failed.
    Error,
    /// Processing is switched off.
    Disabled,
    /// No SMTP server configured, nothing was attempted.
    NotConfigured,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Complete => "Complete",
            RunStatus::Error => "Error",
            RunStatus::Disabled => "Disabled",
            RunStatus::NotConfigured => "NotConfigured",
        }
    }
}

/// Outcome of one run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub status: RunStatus,
    /// Items attempted this run.
    pub total: u64,
    pub errors: u64,
    /// Items passed over (deferred or past the error ceiling).
    pub skipped: u64,
    /// One entry per failed item, naming the item.
    pub error_descriptions: Vec<String>,
    /// Problems that did not change an item's outcome.
    pub warnings: Vec<String>,
}

impl RunSummary {
    fn empty(status: RunStatus) -> Self {
        RunSummary {
            status,
            total: 0,
            errors: 0,
            skipped: 0,
            error_descriptions: Vec::new(),
            warnings: Vec::new(),
        }
    }

    pub fn succeeded(&self) -> u64 {
        self.total - self.errors
    }

    /// Per-item failures joined with `, `.
    pub fn error_description(&self) -> String {
        self.error_descriptions.join(", ")
    }

    pub fn message(&self) -> String {
        match self.status {
            RunStatus::Disabled => "Mail queue processing is disabled".to_string(),
            RunStatus::NotConfigured => format!(
                "Mail queue is not configured: {}",
                self.error_description()
            ),
            RunStatus::Complete | RunStatus::Error => {
                let mut msg = format!(
                    "{} e-mail(s) sent, {} failed",
                    self.succeeded(),
                    self.errors
                );
                if self.skipped > 0 {
                    msg.push_str(&format!(", {} skipped", self.skipped));
                }
                if self.errors > 0 {
                    msg.push_str(&format!(". Errors: {}", self.error_description()));
                }
                msg
            }
        }
    }
}

/// Split a recipient field. A `,` anywhere makes `,` the only delimiter,
/// otherwise `;` is used. Entries are trimmed and blanks dropped.
pub fn expand_recipients(to_address: &str) -> Vec<String> {
    let parts: Vec<&str> = if to_address.contains(',') {
        to_address.split(',').collect()
    } else if to_address.contains(';') {
        to_address.split(';').collect()
    } else {
        vec![to_address]
    };
    parts
        .into_iter()
        .map(str::trim)
        .filter(|addr| !addr.is_empty())
        .map(str::to_string)
        .collect()
}

/// Resolve sender, recipients and attachment for an item.
pub fn build_outgoing(
    item: &QueueItem,
    default_from_address: &str,
) -> Result<OutgoingMessage, DeliveryError> {
    let to = expand_recipients(&item.to_address);
    if to.is_empty() {
        return Err(DeliveryError::NoRecipients);
    }

    let from = item
        .from_address
        .as_deref()
        .map(str::trim)
        .filter(|f| !f.is_empty())
        .unwrap_or(default_from_address)
        .to_string();

    // A path that is not a readable file is skipped, not an error
    let attachment = item
        .attachment_path
        .as_deref()
        .filter(|p| !p.trim().is_empty())
        .map(PathBuf::from)
        .filter(|p| p.is_file());

    Ok(OutgoingMessage {
        from,
        to,
        subject: item.subject.clone(),
        body: item.body.clone(),
        is_html: item.is_html(),
        attachment,
    })
}

/// Drains the mail queue once per call.
pub struct Dispatcher<'a> {
    queue: &'a dyn QueueStore<QueueItem>,
    contacts: &'a dyn ContactStore,
    mailer: &'a dyn Mailer,
    progress: &'a dyn ProgressReporter,
    hook: &'a dyn ProcessedHook,
}

impl<'a> Dispatcher<'a> {
    pub fn new(
        queue: &'a dyn QueueStore<QueueItem>,
        contacts: &'a dyn ContactStore,
        mailer: &'a dyn Mailer,
    ) -> Self {
        Dispatcher {
            queue,
            contacts,
            mailer,
            progress: &NoopReporter,
            hook: &NoopHook,
        }
    }

    pub fn with_progress(mut self, progress: &'a dyn ProgressReporter) -> Self {
        self.progress = progress;
        self
    }

    pub fn with_hook(mut self, hook: &'a dyn ProcessedHook) -> Self {
        self.hook = hook;
        self
    }

    pub fn run_once(&self, config: &RunConfiguration) -> Result<RunSummary, DispatchError> {
        self.run_once_at(config, Utc::now().naive_utc())
    }

    /// Process every eligible queued item, treating `now` as the current UTC time.
    pub fn run_once_at(
        &self,
        config: &RunConfiguration,
        now: NaiveDateTime,
    ) -> Result<RunSummary, DispatchError> {
        if !config.enabled {
            log::info!("[mailq] Mail queue processing disabled, skipping run");
            self.progress.report(ProgressUpdate::phase("Disabled"));
            return Ok(RunSummary::empty(RunStatus::Disabled));
        }

        if let Err(e) = config.validate() {
            log::error!("[mailq] Invalid mail queue settings: {}", e);
            self.progress
                .report(ProgressUpdate::phase("Error").detail(e.to_string()));
            let mut summary = RunSummary::empty(RunStatus::NotConfigured);
            summary.error_descriptions.push(e.to_string());
            return Ok(summary);
        }

        self.progress
            .report(ProgressUpdate::phase("Loading").detail("Reading mail queue"));
        let items = match self.queue.fetch_all_pending() {
            Ok(items) => items,
            Err(e) => {
                log::error!("[mailq] Failed to load mail queue: {}", e);
                self.progress
                    .report(ProgressUpdate::phase("Error").detail(e.clone()));
                return Err(DispatchError::QueueLoad(e));
            }
        };

        let count = items.len() as u64;
        log::info!("[mailq] Processing mail queue ({} item(s))", count);
        let endpoint = config.endpoint();
        let mut summary = RunSummary::empty(RunStatus::Complete);

        for (idx, mut item) in items.into_iter().enumerate() {
            self.progress.report(
                ProgressUpdate::phase("Sending")
                    .detail(format!("Item {}", item.id))
                    .counts(idx as u64, count),
            );

            if item.exceeds_ceiling(config.max_error_attempts) {
                log::debug!(
                    "[mailq] Item {} skipped after {} failed attempts",
                    item.id,
                    item.attempts()
                );
                summary.skipped += 1;
                continue;
            }
            if item.is_deferred(now) {
                log::debug!("[mailq] Item {} deferred until {:?}", item.id, item.delay_until);
                summary.skipped += 1;
                continue;
            }

            summary.total += 1;
            match self.deliver(&item, config, &endpoint) {
                Ok(()) => self.complete(item, now, &mut summary),
                Err(e) => self.fail(&mut item, e, &mut summary),
            }
        }

        if summary.errors > 0 {
            summary.status = RunStatus::Error;
        }
        self.progress.report(
            ProgressUpdate::phase(summary.status.as_str())
                .detail(summary.message())
                .counts(count, count),
        );
        log::info!("[mailq] Run finished: {}", summary.message());
        Ok(summary)
    }

    fn deliver(
        &self,
        item: &QueueItem,
        config: &RunConfiguration,
        endpoint: &SmtpEndpoint,
    ) -> Result<(), DeliveryError> {
        let message = build_outgoing(item, &config.default_from_address)?;
        self.mailer.send(&message, endpoint)
    }

    fn complete(&self, mut item: QueueItem, now: NaiveDateTime, summary: &mut RunSummary) {
        item.error_result.clear();
        log::info!("[mailq] Sent item {} to {}", item.id, item.to_address);

        self.hook.on_processed(&item);

        if let Err(e) = recording::record_for_contact(self.contacts, &item, now) {
            log::warn!("[mailq] Item {} sent, history not recorded: {}", item.id, e);
            summary.warnings.push(format!("Item {}: {}", item.id, e));
        }

        if let Err(e) = self.queue.delete(&item) {
            log::error!("[mailq] Item {} sent but could not be removed: {}", item.id, e);
            summary
                .warnings
                .push(format!("Item {}: sent but not removed: {}", item.id, e));
        }
    }

    fn fail(&self, item: &mut QueueItem, err: DeliveryError, summary: &mut RunSummary) {
        let reason = err.to_string();
        log::warn!(
            "[mailq] Failed to send item {} to {}: {}",
            item.id,
            item.to_address,
            reason
        );

        item.mark_failed(&reason);
        let mut entry = format!("Item {}: {}", item.id, reason);
        if let Err(e) = self.queue.save(item) {
            log::error!("[mailq] Could not save failure state of item {}: {}", item.id, e);
            entry.push_str(&format!(" (state not saved: {})", e));
        }

        summary.errors += 1;
        summary.error_descriptions.push(entry);
    }
}
