//! Read-only profile directory.
//!
//! Decorates participants and senders with display names and avatars. A
//! missing profile never fails a lookup; it renders as "Unknown User".

use std::collections::{HashMap, HashSet};

use serde::Serialize;

use crate::error::MessagingError;
use crate::storage::{ProfileRow, Storage};

pub const UNKNOWN_USER_NAME: &str = "Unknown User";

/// Display identity of a user as the messaging UI needs it.
#[derive(Debug, Clone, Serialize)]
pub struct ProfileInfo {
    pub user_id: String,
    pub name: String,
    pub avatar_url: Option<String>,
}

impl ProfileInfo {
    fn unknown(user_id: &str) -> Self {
        Self {
            user_id: user_id.to_string(),
            name: UNKNOWN_USER_NAME.to_string(),
            avatar_url: None,
        }
    }
}

impl From<ProfileRow> for ProfileInfo {
    fn from(row: ProfileRow) -> Self {
        Self {
            user_id: row.user_id,
            name: row.name,
            avatar_url: row.avatar_url,
        }
    }
}

pub struct ProfileDirectory<'a> {
    storage: &'a Storage,
}

impl<'a> ProfileDirectory<'a> {
    pub fn new(storage: &'a Storage) -> Self {
        Self { storage }
    }

    /// Look up display identities for a set of users. Every requested id is
    /// present in the result; ids without a profile map to the unknown-user
    /// placeholder.
    pub fn get_profiles<I>(&self, ids: I) -> Result<HashMap<String, ProfileInfo>, MessagingError>
    where
        I: IntoIterator,
        I::Item: AsRef<str>,
    {
        let unique: HashSet<String> = ids.into_iter().map(|id| id.as_ref().to_string()).collect();
        let mut result = HashMap::with_capacity(unique.len());
        for id in unique {
            let info = match self.storage.get_profile(&id)? {
                Some(row) => ProfileInfo::from(row),
                None => ProfileInfo::unknown(&id),
            };
            result.insert(id, info);
        }
        Ok(result)
    }

    /// Single-user convenience wrapper around [`get_profiles`].
    pub fn get_profile(&self, user_id: &str) -> Result<ProfileInfo, MessagingError> {
        Ok(match self.storage.get_profile(user_id)? {
            Some(row) => ProfileInfo::from(row),
            None => ProfileInfo::unknown(user_id),
        })
    }

    /// People search for starting a conversation: case-insensitive name
    /// match, excluding the searching user.
    pub fn search(
        &self,
        query: &str,
        exclude_user_id: &str,
        limit: u32,
    ) -> Result<Vec<ProfileRow>, MessagingError> {
        let query = query.trim();
        if query.is_empty() {
            return Ok(Vec::new());
        }
        Ok(self.storage.search_profiles(query, exclude_user_id, limit)?)
    }

    /// Seed or refresh a profile. The messaging subsystem itself never calls
    /// this; it exists for the platform that owns identities.
    pub fn upsert(&self, row: &ProfileRow) -> Result<(), MessagingError> {
        Ok(self.storage.upsert_profile(row)?)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
