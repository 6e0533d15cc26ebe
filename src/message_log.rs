//! Append-only per-conversation message log.
//!
//! Messages are totally ordered by `(created_at, seq)`; the order is
//! assigned at insert and never changes. Rows are immutable apart from the
//! read flag, which only the read-state tracker advances.

use std::time::{SystemTime, UNIX_EPOCH};

use uuid::Uuid;

use crate::error::MessagingError;
use crate::storage::{MessageRow, Storage};

/// Largest page a caller can request from [`MessageLog::list`].
pub const MAX_PAGE_LIMIT: u32 = 200;

/// Ordering key of a message, used as the pagination cursor. Pass the key
/// of the oldest message already held to fetch the previous page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cursor {
    pub created_at: u64,
    pub seq: i64,
}

impl Cursor {
    pub fn of(message: &MessageRow) -> Self {
        Self {
            created_at: message.created_at,
            seq: message.seq,
        }
    }
}

/// Append and retrieve ordered messages for a conversation.
pub struct MessageLog<'a> {
    storage: &'a Storage,
}

impl<'a> MessageLog<'a> {
    pub fn new(storage: &'a Storage) -> Self {
        Self { storage }
    }

    /// Append a message. Content must be non-empty after trimming and the
    /// sender must be a participant; a failed send leaves the log unchanged.
    pub fn send(
        &self,
        conversation_id: &str,
        sender_id: &str,
        content: &str,
    ) -> Result<MessageRow, MessagingError> {
        let content = content.trim();
        if content.is_empty() {
            return Err(MessagingError::EmptyMessage);
        }

        if self.storage.get_conversation(conversation_id)?.is_none() {
            return Err(MessagingError::NotFound(format!(
                "conversation {conversation_id}"
            )));
        }
        if !self.storage.is_participant(conversation_id, sender_id)? {
            return Err(MessagingError::NotAParticipant {
                conversation_id: conversation_id.to_string(),
                user_id: sender_id.to_string(),
            });
        }

        let message_id = Uuid::new_v4().to_string();
        let created_at = now_secs();
        let seq = self
            .storage
            .insert_message(&message_id, conversation_id, sender_id, content, created_at)?;

        crate::qlog!(
            "send: message {} from {} in {}",
            crate::logging::msg_id(&message_id),
            crate::logging::user_id(sender_id),
            crate::logging::conv_id(conversation_id)
        );

        Ok(MessageRow {
            seq,
            message_id,
            conversation_id: conversation_id.to_string(),
            sender_id: sender_id.to_string(),
            content: content.to_string(),
            created_at,
            is_read: false,
        })
    }

    /// List up to `limit` messages in ascending `(created_at, seq)` order.
    /// Without a cursor this is the most recent page.
    pub fn list(
        &self,
        conversation_id: &str,
        before: Option<Cursor>,
        limit: u32,
    ) -> Result<Vec<MessageRow>, MessagingError> {
        if self.storage.get_conversation(conversation_id)?.is_none() {
            return Err(MessagingError::NotFound(format!(
                "conversation {conversation_id}"
            )));
        }
        let limit = limit.min(MAX_PAGE_LIMIT);
        let rows = self.storage.list_conversation_messages(
            conversation_id,
            before.map(|c| (c.created_at, c.seq)),
            limit,
        )?;
        Ok(rows)
    }

    pub fn get(&self, message_id: &str) -> Result<MessageRow, MessagingError> {
        self.storage
            .get_message(message_id)?
            .ok_or_else(|| MessagingError::NotFound(format!("message {message_id}")))
    }
}

fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resolver::ConversationResolver;

    fn setup_conversation(storage: &Storage) -> String {
        let resolver = ConversationResolver::new(storage);
        resolver
            .ensure_direct_conversation("alice", "bob")
            .unwrap()
            .conversation
            .conversation_id
    }

    #[test]
    fn test_send_and_list_round_trip() {
        let storage = Storage::open_in_memory().unwrap();
        let conv = setup_conversation(&storage);
        let log = MessageLog::new(&storage);

        let sent = log.send(&conv, "alice", "  hello bob  ").unwrap();
        assert_eq!(sent.content, "hello bob");
        assert!(!sent.is_read);

        let listed = log.list(&conv, None, 50).unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].message_id, sent.message_id);
        assert_eq!(listed[0].seq, sent.seq);
    }

    #[test]
    fn test_empty_content_rejected_and_log_unchanged() {
        let storage = Storage::open_in_memory().unwrap();
        let conv = setup_conversation(&storage);
        let log = MessageLog::new(&storage);

        let before = log.list(&conv, None, 50).unwrap().len();
        let err = log.send(&conv, "alice", "   \n\t ").unwrap_err();
        assert!(matches!(err, MessagingError::EmptyMessage));
        assert_eq!(log.list(&conv, None, 50).unwrap().len(), before);
    }

    #[test]
    fn test_non_participant_cannot_send() {
        let storage = Storage::open_in_memory().unwrap();
        let conv = setup_conversation(&storage);
        let log = MessageLog::new(&storage);

        let err = log.send(&conv, "mallory", "hi").unwrap_err();
        assert!(matches!(err, MessagingError::NotAParticipant { .. }));
        assert!(log.list(&conv, None, 50).unwrap().is_empty());
    }

    #[test]
    fn test_unknown_conversation_is_not_found() {
        let storage = Storage::open_in_memory().unwrap();
        let log = MessageLog::new(&storage);

        let err = log.send("nope", "alice", "hi").unwrap_err();
        assert!(matches!(err, MessagingError::NotFound(_)));
        let err = log.list("nope", None, 50).unwrap_err();
        assert!(matches!(err, MessagingError::NotFound(_)));
    }

    #[test]
    fn test_list_order_is_stable_across_calls() {
        let storage = Storage::open_in_memory().unwrap();
        let conv = setup_conversation(&storage);
        let log = MessageLog::new(&storage);

        for i in 0..10 {
            log.send(&conv, if i % 2 == 0 { "alice" } else { "bob" }, &format!("msg {i}"))
                .unwrap();
        }

        let first = log.list(&conv, None, 50).unwrap();
        let second = log.list(&conv, None, 50).unwrap();
        let ids: Vec<&str> = first.iter().map(|m| m.message_id.as_str()).collect();
        let ids2: Vec<&str> = second.iter().map(|m| m.message_id.as_str()).collect();
        assert_eq!(ids, ids2);

        // Non-decreasing ordering key
        for pair in first.windows(2) {
            let a = Cursor::of(&pair[0]);
            let b = Cursor::of(&pair[1]);
            assert!((a.created_at, a.seq) < (b.created_at, b.seq));
        }
    }

    #[test]
    fn test_cursor_pagination_walks_backwards() {
        let storage = Storage::open_in_memory().unwrap();
        let conv = setup_conversation(&storage);
        let log = MessageLog::new(&storage);

        for i in 0..7 {
            log.send(&conv, "alice", &format!("msg {i}")).unwrap();
        }

        let mut pages = Vec::new();
        let mut cursor: Option<Cursor> = None;
        loop {
            let page = log.list(&conv, cursor, 3).unwrap();
            if page.is_empty() {
                break;
            }
            cursor = Some(Cursor::of(&page[0]));
            pages.push(page);
        }

        // 3 + 3 + 1, newest page first, each page ascending
        assert_eq!(pages.len(), 3);
        let all: Vec<String> = pages
            .into_iter()
            .rev()
            .flatten()
            .map(|m| m.content)
            .collect();
        let expected: Vec<String> = (0..7).map(|i| format!("msg {i}")).collect();
        assert_eq!(all, expected);
    }

    #[test]
    fn test_page_limit_is_clamped() {
        let storage = Storage::open_in_memory().unwrap();
        let conv = setup_conversation(&storage);
        let log = MessageLog::new(&storage);
        // A huge requested limit must not panic or overflow; it is clamped.
        assert!(log.list(&conv, None, u32::MAX).unwrap().is_empty());
    }
}
