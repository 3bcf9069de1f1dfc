use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// A pending e-mail waiting in the queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueItem {
    pub id: i64,
    pub from_address: Option<String>,
    /// One or more recipients, delimited by `,` or `;`.
    pub to_address: String,
    pub subject: String,
    pub body: String,
    pub is_html: Option<bool>,
    pub attachment_path: Option<String>,
    /// Not eligible for sending before this UTC time.
    pub delay_until: Option<NaiveDateTime>,
    /// `None` means the item has never failed.
    pub error_attempts: Option<i64>,
    pub error_result: String,
    pub record_for_contact_id: Option<String>,
    pub create_user: Option<String>,
}

impl QueueItem {
    pub fn new(to_address: &str, subject: &str, body: &str) -> Self {
        QueueItem {
            id: 0,
            from_address: None,
            to_address: to_address.to_string(),
            subject: subject.to_string(),
            body: body.to_string(),
            is_html: None,
            attachment_path: None,
            delay_until: None,
            error_attempts: None,
            error_result: String::new(),
            record_for_contact_id: None,
            create_user: None,
        }
    }

    pub fn is_html(&self) -> bool {
        self.is_html.unwrap_or(false)
    }

    pub fn attempts(&self) -> i64 {
        self.error_attempts.unwrap_or(0)
    }

    /// True once the item has failed more often than `max_error_attempts`.
    /// A ceiling of zero or below means unlimited retries.
    pub fn exceeds_ceiling(&self, max_error_attempts: i64) -> bool {
        max_error_attempts > 0 && self.attempts() > max_error_attempts
    }

    /// True while `delay_until` lies strictly after `now`.
    pub fn is_deferred(&self, now: NaiveDateTime) -> bool {
        self.delay_until.map(|t| t > now).unwrap_or(false)
    }

    pub fn contact_id(&self) -> Option<&str> {
        self.record_for_contact_id
            .as_deref()
            .filter(|id| !id.trim().is_empty())
    }

    /// Record a failed attempt.
    pub fn mark_failed(&mut self, reason: &str) {
        self.error_result = format!("Error: {}", reason);
        self.error_attempts = Some(self.attempts() + 1);
    }
}

/// Queue counters relative to an error ceiling and a point in time.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct QueueStats {
    /// Eligible on the next run.
    pub pending: u64,
    /// Waiting for `delay_until`.
    pub deferred: u64,
    /// Failed at least once, still retried.
    pub failing: u64,
    /// Past the error ceiling, kept for inspection.
    pub stuck: u64,
    pub total: u64,
}

impl QueueStats {
    pub fn from_items(items: &[QueueItem], max_error_attempts: i64, now: NaiveDateTime) -> Self {
        let mut stats = QueueStats {
            total: items.len() as u64,
            ..Default::default()
        };
        for item in items {
            if item.exceeds_ceiling(max_error_attempts) {
                stats.stuck += 1;
                continue;
            }
            if item.is_deferred(now) {
                stats.deferred += 1;
            } else {
                stats.pending += 1;
            }
            if item.attempts() > 0 {
                stats.failing += 1;
            }
        }
        stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};

    #[test]
    fn ceiling_is_strictly_greater() {
        let mut item = QueueItem::new("a@x.com", "s", "b");
        item.error_attempts = Some(2);
        assert!(!item.exceeds_ceiling(2));
        item.error_attempts = Some(3);
        assert!(item.exceeds_ceiling(2));
    }

    #[test]
    fn non_positive_ceiling_is_unlimited() {
        let mut item = QueueItem::new("a@x.com", "s", "b");
        item.error_attempts = Some(1_000);
        assert!(!item.exceeds_ceiling(0));
        assert!(!item.exceeds_ceiling(-1));
    }

    #[test]
    fn deferred_only_when_strictly_future() {
        let now = Utc::now().naive_utc();
        let mut item = QueueItem::new("a@x.com", "s", "b");
        assert!(!item.is_deferred(now));
        item.delay_until = Some(now);
        assert!(!item.is_deferred(now));
        item.delay_until = Some(now + Duration::hours(1));
        assert!(item.is_deferred(now));
    }

    #[test]
    fn mark_failed_counts_from_unset() {
        let mut item = QueueItem::new("a@x.com", "s", "b");
        item.mark_failed("connection refused");
        assert_eq!(item.error_attempts, Some(1));
        assert_eq!(item.error_result, "Error: connection refused");
        item.mark_failed("timeout");
        assert_eq!(item.error_attempts, Some(2));
    }

    #[test]
    fn blank_contact_id_is_ignored() {
        let mut item = QueueItem::new("a@x.com", "s", "b");
        item.record_for_contact_id = Some("  ".to_string());
        assert_eq!(item.contact_id(), None);
        item.record_for_contact_id = Some("C1".to_string());
        assert_eq!(item.contact_id(), Some("C1"));
    }

    #[test]
    fn stats_classify_items() {
        let now = Utc::now().naive_utc();
        let fresh = QueueItem::new("a@x.com", "s", "b");
        let mut later = QueueItem::new("a@x.com", "s", "b");
        later.delay_until = Some(now + Duration::minutes(5));
        let mut retrying = QueueItem::new("a@x.com", "s", "b");
        retrying.error_attempts = Some(1);
        let mut stuck = QueueItem::new("a@x.com", "s", "b");
        stuck.error_attempts = Some(4);

        let stats = QueueStats::from_items(&[fresh, later, retrying, stuck], 3, now);
        assert_eq!(stats.pending, 2);
        assert_eq!(stats.deferred, 1);
        assert_eq!(stats.failing, 1);
        assert_eq!(stats.stuck, 1);
        assert_eq!(stats.total, 4);
    }
}
