use chrono::NaiveDateTime;

use crate::error::RecordingError;
use crate::models::contact::User;
use crate::models::history::HistoryNote;
use crate::models::queue::QueueItem;
use crate::store::ContactStore;

/// Write an e-mail history note against the item's contact.
///
/// Returns `Ok(None)` when the item names no contact or the contact does not
/// exist. An unknown or unresolvable creating user is attributed to the
/// administrator identity.
pub fn record_for_contact(
    store: &dyn ContactStore,
    item: &QueueItem,
    now: NaiveDateTime,
) -> Result<Option<HistoryNote>, RecordingError> {
    let Some(contact_id) = item.contact_id() else {
        return Ok(None);
    };

    let contact = match store.find_contact(contact_id) {
        Ok(Some(contact)) => contact,
        Ok(None) => {
            log::debug!(
                "[history] Contact {} for item {} not found, nothing recorded",
                contact_id,
                item.id
            );
            return Ok(None);
        }
        Err(reason) => {
            return Err(RecordingError::Lookup {
                contact_id: contact_id.to_string(),
                reason,
            })
        }
    };

    let user = resolve_user(store, item.create_user.as_deref());
    let note = HistoryNote::for_email(item, &contact, &user, now);
    store
        .create_history_note(&note)
        .map_err(|reason| RecordingError::Persist {
            contact_id: contact.id.clone(),
            reason,
        })?;

    log::info!(
        "[history] Recorded e-mail '{}' for contact {}",
        note.description,
        note.contact_id
    );
    Ok(Some(note))
}

fn resolve_user(store: &dyn ContactStore, user_id: Option<&str>) -> User {
    let Some(user_id) = user_id.filter(|id| !id.trim().is_empty()) else {
        return User::administrator();
    };
    match store.find_user(user_id) {
        Ok(Some(user)) => user,
        Ok(None) => User::administrator(),
        Err(e) => {
            log::warn!("[history] User lookup for {} failed: {}", user_id, e);
            User::administrator()
        }
    }
}
