//! Conversation resolution: deterministically map a contact intent to one
//! stable conversation id.
//!
//! Direct conversations are find-or-create over the sorted participant pair.
//! The store's UNIQUE pair-key index makes creation race-safe: concurrent
//! resolves for the same pair converge on a single winning conversation,
//! whichever caller's insert lands first.

use std::collections::HashSet;
use std::time::{SystemTime, UNIX_EPOCH};

use uuid::Uuid;

use crate::error::MessagingError;
use crate::storage::{direct_pair_key, ConversationRow, Storage, StorageError};

/// Conversation kinds understood by the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConversationKind {
    Direct,
    Group,
    CourseChannel,
}

impl ConversationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConversationKind::Direct => "direct",
            ConversationKind::Group => "group",
            ConversationKind::CourseChannel => "course_channel",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "direct" => Some(ConversationKind::Direct),
            "group" => Some(ConversationKind::Group),
            "course_channel" => Some(ConversationKind::CourseChannel),
            _ => None,
        }
    }
}

/// Outcome of a direct-conversation resolve.
#[derive(Debug, Clone)]
pub struct Resolved {
    pub conversation: ConversationRow,
    /// True when the conversation already existed (including a repaired
    /// orphan), false when this call created it.
    pub existing: bool,
}

/// Orchestration entry point for conversation lookup and creation.
pub struct ConversationResolver<'a> {
    storage: &'a Storage,
}

impl<'a> ConversationResolver<'a> {
    pub fn new(storage: &'a Storage) -> Self {
        Self { storage }
    }

    /// Find or create the single direct conversation between two users.
    ///
    /// Any number of calls, in either argument order, concurrent or
    /// sequential, return the same conversation id.
    pub fn ensure_direct_conversation(
        &self,
        user_a: &str,
        user_b: &str,
    ) -> Result<Resolved, MessagingError> {
        let user_a = user_a.trim();
        let user_b = user_b.trim();
        if user_a.is_empty() || user_b.is_empty() {
            return Err(MessagingError::InvalidParticipants(
                "user ids cannot be empty".to_string(),
            ));
        }
        if user_a == user_b {
            return Err(MessagingError::InvalidParticipants(format!(
                "cannot open a direct conversation with yourself ({user_a})"
            )));
        }

        let pair = [user_a.to_string(), user_b.to_string()];
        let pair_key = direct_pair_key(user_a, user_b);

        // Fast path: both participant links already present.
        if let Some(conversation) = self.storage.find_direct_conversation(user_a, user_b)? {
            return Ok(Resolved {
                conversation,
                existing: true,
            });
        }

        // The participant join misses a conversation whose links were never
        // written (a resolve that failed after the row insert). The pair key
        // still reaches it; repair the links and reuse it.
        if let Some(conversation) = self.storage.get_conversation_by_pair(&pair_key)? {
            self.link_participants(&conversation.conversation_id, &pair)?;
            return Ok(Resolved {
                conversation,
                existing: true,
            });
        }

        let conversation = ConversationRow {
            conversation_id: Uuid::new_v4().to_string(),
            kind: ConversationKind::Direct.as_str().to_string(),
            name: None,
            pair_key: Some(pair_key.clone()),
            created_at: now_secs(),
        };

        match self.storage.insert_conversation(&conversation) {
            Ok(()) => {}
            Err(StorageError::AlreadyExists(_)) => {
                // Lost the creation race; converge on the winner.
                let winner = self
                    .storage
                    .get_conversation_by_pair(&pair_key)?
                    .ok_or_else(|| {
                        MessagingError::NotFound(format!(
                            "direct conversation for pair {pair_key}"
                        ))
                    })?;
                self.link_participants(&winner.conversation_id, &pair)?;
                return Ok(Resolved {
                    conversation: winner,
                    existing: true,
                });
            }
            Err(e) => return Err(e.into()),
        }

        self.link_participants(&conversation.conversation_id, &pair)?;

        crate::qlog!(
            "resolver: created direct conversation {} for {} <-> {}",
            crate::logging::conv_id(&conversation.conversation_id),
            crate::logging::user_id(user_a),
            crate::logging::user_id(user_b)
        );

        Ok(Resolved {
            conversation,
            existing: false,
        })
    }

    /// Create a group conversation with an explicit member list. The creator
    /// is added implicitly; duplicate member ids are collapsed.
    pub fn create_group_conversation(
        &self,
        creator_id: &str,
        name: &str,
        member_ids: &[String],
    ) -> Result<ConversationRow, MessagingError> {
        self.create_named(ConversationKind::Group, creator_id, name, member_ids)
    }

    /// Create a course channel: same shape as a group, distinct kind so the
    /// UI can render course spaces differently.
    pub fn create_course_channel(
        &self,
        creator_id: &str,
        name: &str,
        member_ids: &[String],
    ) -> Result<ConversationRow, MessagingError> {
        self.create_named(ConversationKind::CourseChannel, creator_id, name, member_ids)
    }

    fn create_named(
        &self,
        kind: ConversationKind,
        creator_id: &str,
        name: &str,
        member_ids: &[String],
    ) -> Result<ConversationRow, MessagingError> {
        let creator_id = creator_id.trim();
        if creator_id.is_empty() {
            return Err(MessagingError::InvalidParticipants(
                "creator id cannot be empty".to_string(),
            ));
        }
        let name = name.trim();
        if name.is_empty() {
            return Err(MessagingError::InvalidName);
        }

        // Creator first, then members in given order, duplicates dropped.
        let mut seen = HashSet::new();
        let mut participants = vec![creator_id.to_string()];
        seen.insert(creator_id.to_string());
        for member in member_ids {
            let member = member.trim();
            if member.is_empty() {
                return Err(MessagingError::InvalidParticipants(
                    "member ids cannot be empty".to_string(),
                ));
            }
            if seen.insert(member.to_string()) {
                participants.push(member.to_string());
            }
        }
        if participants.len() < 2 {
            return Err(MessagingError::InvalidParticipants(format!(
                "a {} needs at least one member besides the creator",
                kind.as_str()
            )));
        }

        let conversation = ConversationRow {
            conversation_id: Uuid::new_v4().to_string(),
            kind: kind.as_str().to_string(),
            name: Some(name.to_string()),
            pair_key: None,
            created_at: now_secs(),
        };
        self.storage.insert_conversation(&conversation)?;
        self.link_participants(&conversation.conversation_id, &participants)?;

        crate::qlog!(
            "resolver: created {} {} ({}) with {} participant(s)",
            kind.as_str(),
            crate::logging::conv_id(&conversation.conversation_id),
            name,
            participants.len()
        );

        Ok(conversation)
    }

    fn link_participants(
        &self,
        conversation_id: &str,
        user_ids: &[String],
    ) -> Result<(), MessagingError> {
        self.storage
            .insert_participants(conversation_id, user_ids, now_secs())
            .map_err(|e| MessagingError::ParticipantLinkFailed {
                conversation_id: conversation_id.to_string(),
                reason: e.to_string(),
            })
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
