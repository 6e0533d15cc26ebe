//! Per-viewer read boundaries and derived unread counts.
//!
//! A message's read flag transitions false to true exactly once, and only
//! for messages whose sender is not the reader. Unread counts are always
//! recomputed from the message log, never cached.

use crate::error::MessagingError;
use crate::storage::Storage;

pub struct ReadStateTracker<'a> {
    storage: &'a Storage,
}

impl<'a> ReadStateTracker<'a> {
    pub fn new(storage: &'a Storage) -> Self {
        Self { storage }
    }

    /// Mark every unread message from other senders as read. Idempotent;
    /// returns the number of messages newly marked.
    pub fn mark_read(
        &self,
        conversation_id: &str,
        viewer_id: &str,
    ) -> Result<u32, MessagingError> {
        if self.storage.get_conversation(conversation_id)?.is_none() {
            return Err(MessagingError::NotFound(format!(
                "conversation {conversation_id}"
            )));
        }
        let marked = self
            .storage
            .mark_conversation_read(conversation_id, viewer_id)?;
        if marked > 0 {
            crate::qlog!(
                "read: {} marked {} message(s) read in {}",
                crate::logging::user_id(viewer_id),
                marked,
                crate::logging::conv_id(conversation_id)
            );
        }
        Ok(marked)
    }

    /// Count of messages the viewer has not read yet. Always equals the
    /// count obtained by listing and filtering the log.
    pub fn unread_count(
        &self,
        conversation_id: &str,
        viewer_id: &str,
    ) -> Result<u32, MessagingError> {
        if self.storage.get_conversation(conversation_id)?.is_none() {
            return Err(MessagingError::NotFound(format!(
                "conversation {conversation_id}"
            )));
        }
        Ok(self.storage.count_unread(conversation_id, viewer_id)?)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
