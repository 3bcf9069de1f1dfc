use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use super::contact::{Contact, User};
use super::queue::QueueItem;

pub const EMAIL_CATEGORY: &str = "E-mail";
pub const RESULT_COMPLETED: &str = "Completed";

/// Number of body characters kept in `notes`.
pub const NOTES_PREVIEW_CHARS: usize = 255;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HistoryType {
    Email,
}

impl HistoryType {
    pub fn as_str(&self) -> &'static str {
        match self {
            HistoryType::Email => "email",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "email" => Some(HistoryType::Email),
            _ => None,
        }
    }
}

/// Activity record written against a contact after a successful send.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryNote {
    pub id: String,
    pub history_type: HistoryType,
    pub category: String,
    pub result: String,
    pub contact_id: String,
    pub contact_name: String,
    pub account_id: Option<String>,
    pub account_name: Option<String>,
    pub user_id: String,
    pub user_name: String,
    pub description: String,
    /// First characters of the body.
    pub notes: String,
    pub long_notes: String,
    pub start_date: NaiveDateTime,
    pub completed_date: NaiveDateTime,
}

impl HistoryNote {
    /// Build the note for an e-mail sent to `contact`, attributed to `user`.
    pub fn for_email(
        item: &QueueItem,
        contact: &Contact,
        user: &User,
        now: NaiveDateTime,
    ) -> Self {
        HistoryNote {
            id: uuid::Uuid::new_v4().to_string(),
            history_type: HistoryType::Email,
            category: EMAIL_CATEGORY.to_string(),
            result: RESULT_COMPLETED.to_string(),
            contact_id: contact.id.clone(),
            contact_name: contact.full_name(),
            account_id: contact.account_id.clone(),
            account_name: contact.account_name.clone(),
            user_id: user.id.clone(),
            user_name: user.display_name.clone(),
            description: item.subject.clone(),
            notes: preview(&item.body),
            long_notes: item.body.clone(),
            start_date: now,
            completed_date: now,
        }
    }
}

fn preview(body: &str) -> String {
    body.chars().take(NOTES_PREVIEW_CHARS).collect()
}
