//! Error taxonomy for the messaging service.
//!
//! Validation errors (`InvalidParticipants`, `InvalidName`, `EmptyMessage`)
//! are raised before any store call. Store-originated errors are surfaced
//! to the caller with enough detail to decide on a retry; no operation in
//! this crate retries on its own.

use crate::storage::StorageError;

#[derive(Debug)]
pub enum MessagingError {
    /// The participant set is unusable: a user messaging themselves, an
    /// empty id, or a group resolving to fewer than two participants.
    InvalidParticipants(String),
    /// A group/course-channel display name was empty after trimming.
    InvalidName,
    /// Message content was empty after trimming.
    EmptyMessage,
    /// The sender is not a participant of the target conversation.
    NotAParticipant {
        conversation_id: String,
        user_id: String,
    },
    /// The conversation row was created but the participant links could not
    /// be written. The conversation is reachable again through its pair key,
    /// so a retried resolve repairs it rather than duplicating it.
    ParticipantLinkFailed {
        conversation_id: String,
        reason: String,
    },
    /// A referenced conversation or message does not exist.
    NotFound(String),
    /// The backing store failed; retry is a caller decision.
    StoreUnavailable(StorageError),
}

impl std::fmt::Display for MessagingError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MessagingError::InvalidParticipants(msg) => {
                write!(f, "invalid participants: {msg}")
            }
            MessagingError::InvalidName => write!(f, "conversation name cannot be empty"),
            MessagingError::EmptyMessage => write!(f, "message content cannot be empty"),
            MessagingError::NotAParticipant {
                conversation_id,
                user_id,
            } => write!(
                f,
                "user {user_id} is not a participant of conversation {conversation_id}"
            ),
            MessagingError::ParticipantLinkFailed {
                conversation_id,
                reason,
            } => write!(
                f,
                "failed to link participants to conversation {conversation_id}: {reason}"
            ),
            MessagingError::NotFound(msg) => write!(f, "not found: {msg}"),
            MessagingError::StoreUnavailable(e) => write!(f, "store unavailable: {e}"),
        }
    }
}

impl std::error::Error for MessagingError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            MessagingError::StoreUnavailable(e) => Some(e),
            _ => None,
        }
    }
}

impl From<StorageError> for MessagingError {
    fn from(e: StorageError) -> Self {
        match e {
            StorageError::NotFound(msg) => MessagingError::NotFound(msg),
            other => MessagingError::StoreUnavailable(other),
        }
    }
}
