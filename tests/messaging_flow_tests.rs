//! Integration tests for the full messaging flow: conversation resolution,
//! sending, listing, read state, and unread counts over one shared store.

use quad::directory::{ProfileDirectory, UNKNOWN_USER_NAME};
use quad::error::MessagingError;
use quad::message_log::{Cursor, MessageLog};
use quad::read_state::ReadStateTracker;
use quad::resolver::ConversationResolver;
use quad::storage::{ProfileRow, Storage};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn seeded_storage() -> Storage {
    let storage = Storage::open_in_memory().unwrap();
    let directory = ProfileDirectory::new(&storage);
    for (user_id, name) in [
        ("alice", "Alice Chen"),
        ("bob", "Bob Diaz"),
        ("carol", "Carol Okafor"),
    ] {
        directory
            .upsert(&ProfileRow {
                user_id: user_id.to_string(),
                name: name.to_string(),
                avatar_url: None,
                major: Some("Computer Science".to_string()),
                year: Some("Junior".to_string()),
                updated_at: 0,
            })
            .unwrap();
    }
    storage
}

fn direct(storage: &Storage, a: &str, b: &str) -> String {
    ConversationResolver::new(storage)
        .ensure_direct_conversation(a, b)
        .unwrap()
        .conversation
        .conversation_id
}

// ---------------------------------------------------------------------------
// Conversation resolution
// ---------------------------------------------------------------------------

#[test]
fn direct_conversation_is_unique_per_pair() {
    let storage = seeded_storage();
    let resolver = ConversationResolver::new(&storage);

    // Alice opens the conversation, then Bob opens "his" side of it
    let from_alice = resolver.ensure_direct_conversation("alice", "bob").unwrap();
    let from_bob = resolver.ensure_direct_conversation("bob", "alice").unwrap();

    assert!(!from_alice.existing);
    assert!(from_bob.existing);
    assert_eq!(
        from_alice.conversation.conversation_id,
        from_bob.conversation.conversation_id
    );

    // Hammering the resolver changes nothing
    for _ in 0..10 {
        let again = resolver.ensure_direct_conversation("alice", "bob").unwrap();
        assert_eq!(
            again.conversation.conversation_id,
            from_alice.conversation.conversation_id
        );
    }

    // Exactly one conversation exists for the pair
    assert_eq!(storage.list_user_conversations("alice").unwrap().len(), 1);
    assert_eq!(storage.list_user_conversations("bob").unwrap().len(), 1);
}

#[test]
fn group_creation_builds_full_membership() {
    let storage = seeded_storage();
    let resolver = ConversationResolver::new(&storage);
    let log = MessageLog::new(&storage);

    let group = resolver
        .create_group_conversation("alice", "Study Group", &["bob".into(), "carol".into()])
        .unwrap();
    assert_eq!(group.kind, "group");

    let participants = storage.list_participants(&group.conversation_id).unwrap();
    let ids: Vec<&str> = participants.iter().map(|p| p.user_id.as_str()).collect();
    assert!(ids.contains(&"alice"));
    assert!(ids.contains(&"bob"));
    assert!(ids.contains(&"carol"));

    // A non-member cannot post into the group
    let err = log
        .send(&group.conversation_id, "dave", "let me in")
        .unwrap_err();
    assert!(matches!(err, MessagingError::NotAParticipant { .. }));
    assert!(log.list(&group.conversation_id, None, 50).unwrap().is_empty());
}

// ---------------------------------------------------------------------------
// Send, list, read
// ---------------------------------------------------------------------------

#[test]
fn send_then_read_flow_between_two_users() {
    let storage = seeded_storage();
    let conv = direct(&storage, "alice", "bob");
    let log = MessageLog::new(&storage);
    let tracker = ReadStateTracker::new(&storage);

    log.send(&conv, "alice", "hello").unwrap();

    // Bob sees one unread message from Alice
    let messages = log.list(&conv, None, 50).unwrap();
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].sender_id, "alice");
    assert!(!messages[0].is_read);
    assert_eq!(tracker.unread_count(&conv, "bob").unwrap(), 1);

    // Bob reads; Alice's boundary is untouched
    tracker.mark_read(&conv, "bob").unwrap();
    assert_eq!(tracker.unread_count(&conv, "bob").unwrap(), 0);
    assert_eq!(tracker.unread_count(&conv, "alice").unwrap(), 0);
}

#[test]
fn failed_sends_leave_the_log_untouched() {
    let storage = seeded_storage();
    let conv = direct(&storage, "alice", "bob");
    let log = MessageLog::new(&storage);

    log.send(&conv, "alice", "first").unwrap();
    let before = log.list(&conv, None, 50).unwrap();

    // Empty after trim
    let err = log.send(&conv, "alice", "   ").unwrap_err();
    assert!(matches!(err, MessagingError::EmptyMessage));

    // Not a participant
    let err = log.send(&conv, "carol", "hi").unwrap_err();
    assert!(matches!(err, MessagingError::NotAParticipant { .. }));

    let after = log.list(&conv, None, 50).unwrap();
    assert_eq!(before.len(), after.len());
    assert_eq!(before[0].message_id, after[0].message_id);
}

#[test]
fn listing_is_ordered_and_pageable_across_senders() {
    let storage = seeded_storage();
    let conv = direct(&storage, "alice", "bob");
    let log = MessageLog::new(&storage);

    for i in 0..25 {
        let sender = if i % 2 == 0 { "alice" } else { "bob" };
        log.send(&conv, sender, &format!("message {i}")).unwrap();
    }

    // Walk the full history backwards through the cursor
    let mut collected = Vec::new();
    let mut cursor: Option<Cursor> = None;
    loop {
        let page = log.list(&conv, cursor, 10).unwrap();
        if page.is_empty() {
            break;
        }
        cursor = Some(Cursor::of(&page[0]));
        collected.splice(0..0, page);
    }

    assert_eq!(collected.len(), 25);
    for (i, message) in collected.iter().enumerate() {
        assert_eq!(message.content, format!("message {i}"));
    }
    // Stable across repeated listings
    let again = log.list(&conv, None, 200).unwrap();
    assert_eq!(
        again.iter().map(|m| m.message_id.as_str()).collect::<Vec<_>>(),
        collected.iter().map(|m| m.message_id.as_str()).collect::<Vec<_>>()
    );
}

#[test]
fn unread_count_always_matches_the_log() {
    let storage = seeded_storage();
    let conv = direct(&storage, "alice", "bob");
    let log = MessageLog::new(&storage);
    let tracker = ReadStateTracker::new(&storage);

    let check = |viewer: &str| {
        let derived = log
            .list(&conv, None, 200)
            .unwrap()
            .iter()
            .filter(|m| m.sender_id != viewer && !m.is_read)
            .count() as u32;
        assert_eq!(tracker.unread_count(&conv, viewer).unwrap(), derived);
    };

    log.send(&conv, "alice", "one").unwrap();
    check("alice");
    check("bob");

    log.send(&conv, "bob", "two").unwrap();
    log.send(&conv, "alice", "three").unwrap();
    check("alice");
    check("bob");

    tracker.mark_read(&conv, "bob").unwrap();
    check("alice");
    check("bob");

    tracker.mark_read(&conv, "alice").unwrap();
    check("alice");
    check("bob");
}

// ---------------------------------------------------------------------------
// Conversation list view
// ---------------------------------------------------------------------------

#[test]
fn conversation_summaries_track_activity_and_unread() {
    let storage = seeded_storage();
    let resolver = ConversationResolver::new(&storage);
    let log = MessageLog::new(&storage);

    let dm = direct(&storage, "alice", "bob");
    let group = resolver
        .create_group_conversation("alice", "Dorm 4 West", &["bob".into(), "carol".into()])
        .unwrap()
        .conversation_id;

    log.send(&dm, "bob", "lunch?").unwrap();
    log.send(&group, "carol", "quiet hours start at 10").unwrap();

    let summaries = storage.list_conversation_summaries("alice").unwrap();
    assert_eq!(summaries.len(), 2);
    for summary in &summaries {
        assert_eq!(summary.unread_count, 1);
        assert!(summary.last_content.is_some());
    }

    // Carol only sees the group, and her own message is not unread for her
    let summaries = storage.list_conversation_summaries("carol").unwrap();
    assert_eq!(summaries.len(), 1);
    assert_eq!(summaries[0].conversation_id, group);
    assert_eq!(summaries[0].unread_count, 0);
}

// ---------------------------------------------------------------------------
// Profile directory
// ---------------------------------------------------------------------------

#[test]
fn participants_decorate_with_profiles_and_unknown_fallback() {
    let storage = seeded_storage();
    let directory = ProfileDirectory::new(&storage);
    let resolver = ConversationResolver::new(&storage);

    // "ghost" has no profile row but can still hold a conversation
    let conv = resolver
        .ensure_direct_conversation("alice", "ghost")
        .unwrap()
        .conversation;
    let participants = storage.list_participants(&conv.conversation_id).unwrap();
    let ids: Vec<&str> = participants.iter().map(|p| p.user_id.as_str()).collect();

    let profiles = directory.get_profiles(ids).unwrap();
    assert_eq!(profiles["alice"].name, "Alice Chen");
    assert_eq!(profiles["ghost"].name, UNKNOWN_USER_NAME);
}
