//! Realtime fan-out of newly appended messages, and the consumer-side
//! merge buffer that keeps an optimistic UI convergent.
//!
//! Delivery is at-least-once: a sender's own optimistic append and the echo
//! of the same message through a subscription must collapse to one entry.
//! [`ConversationView`] implements that contract; ground truth for display
//! order is always the message log, not notification arrival order.

use std::collections::HashSet;

use serde::Serialize;
use tokio::sync::broadcast;

use crate::storage::MessageRow;

/// Events published to live subscribers.
#[derive(Clone, Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    MessageAppended {
        #[serde(flatten)]
        message: MessageRow,
    },
    ConversationRead {
        conversation_id: String,
        reader_id: String,
        marked: u32,
    },
}

impl Event {
    pub fn conversation_id(&self) -> &str {
        match self {
            Event::MessageAppended { message } => &message.conversation_id,
            Event::ConversationRead {
                conversation_id, ..
            } => conversation_id,
        }
    }
}

/// What a per-conversation subscription yields.
#[derive(Debug, Clone)]
pub enum Delivery {
    Message(MessageRow),
    /// The subscriber fell behind and events were dropped. Refresh from the
    /// message log; the count is how many events were skipped.
    Lagged(u64),
}

/// Pushes events to live subscribers over a broadcast channel. Publishing
/// to a channel with no subscribers is a silent no-op.
#[derive(Clone)]
pub struct Notifier {
    tx: broadcast::Sender<Event>,
}

impl Notifier {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn message_appended(&self, message: &MessageRow) {
        let _ = self.tx.send(Event::MessageAppended {
            message: message.clone(),
        });
    }

    pub fn conversation_read(&self, conversation_id: &str, reader_id: &str, marked: u32) {
        let _ = self.tx.send(Event::ConversationRead {
            conversation_id: conversation_id.to_string(),
            reader_id: reader_id.to_string(),
            marked,
        });
    }

    /// Subscribe to one conversation's appended messages. Events published
    /// before this call are not delivered.
    pub fn subscribe(&self, conversation_id: &str) -> Subscription {
        Subscription {
            conversation_id: conversation_id.to_string(),
            rx: Some(self.tx.subscribe()),
        }
    }

    /// Unfiltered event stream; feeds the WebSocket fan-out.
    pub fn subscribe_all(&self) -> broadcast::Receiver<Event> {
        self.tx.subscribe()
    }
}

/// Handle for one conversation's message stream.
pub struct Subscription {
    conversation_id: String,
    rx: Option<broadcast::Receiver<Event>>,
}

impl Subscription {
    /// Receive the next message for this conversation. Returns `None` once
    /// the subscription is closed (locally or because the notifier dropped).
    pub async fn recv(&mut self) -> Option<Delivery> {
        loop {
            let rx = self.rx.as_mut()?;
            match rx.recv().await {
                Ok(Event::MessageAppended { message })
                    if message.conversation_id == self.conversation_id =>
                {
                    return Some(Delivery::Message(message));
                }
                Ok(_) => continue,
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    return Some(Delivery::Lagged(n));
                }
                Err(broadcast::error::RecvError::Closed) => {
                    self.rx = None;
                    return None;
                }
            }
        }
    }

    /// Stop delivery. Safe to call any number of times.
    pub fn close(&mut self) {
        self.rx = None;
    }

    pub fn is_closed(&self) -> bool {
        self.rx.is_none()
    }
}

// ---------------------------------------------------------------------------
// Consumer-side merge
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PendingState {
    /// Send issued, no confirmation yet.
    Sending,
    /// Send failed; the entry stays visible so the UI can mark it clearly.
    Failed,
}

/// A locally appended message awaiting server confirmation, keyed by a
/// client-generated correlation id.
#[derive(Debug, Clone)]
pub struct PendingMessage {
    pub correlation_id: String,
    pub sender_id: String,
    pub content: String,
    pub state: PendingState,
}

/// Client-held view of one conversation: confirmed messages in log order,
/// deduplicated by message id, plus pending optimistic entries.
///
/// The same message may arrive both as the response to a send and as a
/// realtime echo, in either order; the view shows exactly one entry per
/// message id regardless.
pub struct ConversationView {
    conversation_id: String,
    confirmed: Vec<MessageRow>,
    seen: HashSet<String>,
    pending: Vec<PendingMessage>,
}

impl ConversationView {
    pub fn new(conversation_id: &str) -> Self {
        Self {
            conversation_id: conversation_id.to_string(),
            confirmed: Vec::new(),
            seen: HashSet::new(),
            pending: Vec::new(),
        }
    }

    /// Replace the confirmed buffer with a page from the message log.
    /// Pending entries are kept.
    pub fn load(&mut self, messages: Vec<MessageRow>) {
        self.confirmed.clear();
        self.seen.clear();
        for message in messages {
            self.insert_confirmed(message);
        }
    }

    /// Optimistically append a message the user just submitted.
    pub fn append_pending(&mut self, correlation_id: &str, sender_id: &str, content: &str) {
        self.pending.push(PendingMessage {
            correlation_id: correlation_id.to_string(),
            sender_id: sender_id.to_string(),
            content: content.to_string(),
            state: PendingState::Sending,
        });
    }

    /// The send succeeded: replace the pending entry with the confirmed row.
    /// If the realtime echo already delivered the row, the pending entry is
    /// simply dropped.
    pub fn confirm_send(&mut self, correlation_id: &str, message: MessageRow) {
        self.pending.retain(|p| p.correlation_id != correlation_id);
        self.insert_confirmed(message);
    }

    /// The send failed: keep the entry, visibly failed, for the UI.
    pub fn fail_pending(&mut self, correlation_id: &str) {
        if let Some(entry) = self
            .pending
            .iter_mut()
            .find(|p| p.correlation_id == correlation_id)
        {
            entry.state = PendingState::Failed;
        }
    }

    /// Apply a message delivered by the realtime stream. Returns true if the
    /// view changed; duplicates and other conversations' messages are
    /// dropped.
    pub fn apply_remote(&mut self, message: MessageRow) -> bool {
        if message.conversation_id != self.conversation_id {
            return false;
        }
        self.insert_confirmed(message)
    }

    fn insert_confirmed(&mut self, message: MessageRow) -> bool {
        if !self.seen.insert(message.message_id.clone()) {
            return false;
        }
        let key = (message.created_at, message.seq);
        let pos = self
            .confirmed
            .partition_point(|m| (m.created_at, m.seq) <= key);
        self.confirmed.insert(pos, message);
        true
    }

    /// Confirmed messages in `(created_at, seq)` order.
    pub fn messages(&self) -> &[MessageRow] {
        &self.confirmed
    }

    /// Optimistic entries not yet confirmed, in submission order.
    pub fn pending(&self) -> &[PendingMessage] {
        &self.pending
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
