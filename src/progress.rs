use std::sync::Mutex;

/// One observability update from a run. Every field is optional.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProgressUpdate {
    pub phase: Option<String>,
    pub detail: Option<String>,
    pub current: Option<u64>,
    pub total: Option<u64>,
}

impl ProgressUpdate {
    pub fn phase(phase: &str) -> Self {
        ProgressUpdate {
            phase: Some(phase.to_string()),
            ..Default::default()
        }
    }

    pub fn detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }

    pub fn counts(mut self, current: u64, total: u64) -> Self {
        self.current = Some(current);
        self.total = Some(total);
        self
    }

    /// Percentage done, only when both counts are known.
    pub fn percentage(&self) -> Option<u64> {
        match (self.current, self.total) {
            (Some(_), Some(0)) => Some(0),
            (Some(current), Some(total)) => Some(100 * current / total),
            _ => None,
        }
    }
}

/// Sink for run progress. Has no influence on the run itself.
pub trait ProgressReporter: Send + Sync {
    fn report(&self, update: ProgressUpdate);
}

pub struct NoopReporter;

impl ProgressReporter for NoopReporter {
    fn report(&self, _update: ProgressUpdate) {}
}

/// Writes each update to the log.
pub struct LogReporter;

impl ProgressReporter for LogReporter {
    fn report(&self, update: ProgressUpdate) {
        let phase = update.phase.as_deref().unwrap_or("-");
        let detail = update.detail.as_deref().unwrap_or("");
        match update.percentage() {
            Some(pct) => log::info!("[progress] {} {}% {}", phase, pct, detail),
            None => log::info!("[progress] {} {}", phase, detail),
        }
    }
}

/// Keeps the latest update for a status display. Forwards to an inner
/// reporter when one is given.
#[derive(Default)]
pub struct StatusBoard {
    latest: Mutex<Option<ProgressUpdate>>,
    forward: Option<Box<dyn ProgressReporter>>,
}

impl StatusBoard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn forwarding(inner: Box<dyn ProgressReporter>) -> Self {
        StatusBoard {
            latest: Mutex::new(None),
            forward: Some(inner),
        }
    }

    pub fn latest(&self) -> Option<ProgressUpdate> {
        self.latest.lock().ok().and_then(|l| l.clone())
    }
}

impl ProgressReporter for StatusBoard {
    fn report(&self, update: ProgressUpdate) {
        if let Ok(mut latest) = self.latest.lock() {
            *latest = Some(update.clone());
        }
        if let Some(inner) = &self.forward {
            inner.report(update);
        }
    }
}
