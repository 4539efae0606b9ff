use std::collections::HashSet;

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use crate::models::{Conversation, Message, Reaction};
use crate::ws::ConnectionState;

/// Origin tag for an incoming message. All three origins funnel through the
/// same merge in [`ChatStore::apply_message`]; the tag only decides unread
/// accounting and local id assignment, never the merge rule itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageSource {
    /// Authoritative result of a REST call (snapshot item or create response).
    Rest,
    /// Gateway push delivered independently of any request.
    Push,
    /// Locally authored content that never reached the server.
    Local,
}

struct StoreState {
    conversations: Vec<Conversation>,
    active_conversation_id: Option<i64>,
    /// Message slice for the active conversation, ordered by (created_at, id).
    messages: Vec<Message>,
    typing_users: HashSet<i64>,
    connection: ConnectionState,
    last_error: Option<String>,
    /// Descending counter for failed local sends; never collides with
    /// server-assigned ids, which are positive.
    next_local_id: i64,
}

/// Single source of truth for the chat session: conversation list, active
/// conversation, message slice, typing set, and connection status. Every
/// mutation goes through the one write lock, so REST resolutions and gateway
/// pushes can never interleave mid-merge.
pub struct ChatStore {
    current_user_id: i64,
    inner: RwLock<StoreState>,
}

impl ChatStore {
    pub fn new(current_user_id: i64) -> Self {
        Self {
            current_user_id,
            inner: RwLock::new(StoreState {
                conversations: Vec::new(),
                active_conversation_id: None,
                messages: Vec::new(),
                typing_users: HashSet::new(),
                connection: ConnectionState::Disconnected,
                last_error: None,
                next_local_id: 0,
            }),
        }
    }

    pub fn current_user_id(&self) -> i64 {
        self.current_user_id
    }

    // ── Conversation slice ──

    /// Wholesale replacement from a REST snapshot. The active pointer is
    /// kept only if the new snapshot still contains it.
    pub async fn replace_conversations(&self, mut conversations: Vec<Conversation>) {
        let mut s = self.inner.write().await;
        sort_conversations(&mut conversations);
        if let Some(active) = s.active_conversation_id {
            if !conversations.iter().any(|c| c.id == active) {
                s.active_conversation_id = None;
                s.messages.clear();
                s.typing_users.clear();
            }
        }
        s.conversations = conversations;
        s.last_error = None;
    }

    pub async fn upsert_conversation(&self, conversation: Conversation) {
        let mut s = self.inner.write().await;
        match s.conversations.iter_mut().find(|c| c.id == conversation.id) {
            Some(existing) => *existing = conversation,
            None => s.conversations.push(conversation),
        }
        sort_conversations(&mut s.conversations);
    }

    pub async fn remove_conversation(&self, conversation_id: i64) {
        let mut s = self.inner.write().await;
        s.conversations.retain(|c| c.id != conversation_id);
        if s.active_conversation_id == Some(conversation_id) {
            s.active_conversation_id = None;
            s.messages.clear();
            s.typing_users.clear();
        }
    }

    /// Switch the active conversation, clearing the message slice and typing
    /// set. Returns the previously active id.
    pub async fn set_active_conversation(&self, conversation_id: Option<i64>) -> Option<i64> {
        let mut s = self.inner.write().await;
        let previous = s.active_conversation_id;
        if previous == conversation_id {
            return previous;
        }
        s.active_conversation_id = conversation_id;
        s.messages.clear();
        s.typing_users.clear();
        previous
    }

    // ── Message slice ──

    /// Wholesale replacement of the active conversation's messages from a
    /// REST snapshot. A snapshot for anything other than the currently
    /// active conversation is stale and is discarded.
    pub async fn set_messages(&self, conversation_id: i64, mut messages: Vec<Message>) -> bool {
        let mut s = self.inner.write().await;
        if s.active_conversation_id != Some(conversation_id) {
            tracing::debug!(
                "discarding stale message snapshot for conversation {}",
                conversation_id
            );
            return false;
        }
        messages.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        s.messages = messages;
        s.last_error = None;
        true
    }

    /// The single merge path for messages from any origin: id-keyed
    /// idempotent insert in (created_at, id) order. Messages for inactive
    /// conversations only touch the summary and unread counter.
    pub async fn apply_message(&self, source: MessageSource, mut message: Message) {
        let mut s = self.inner.write().await;

        if source == MessageSource::Local && message.id <= 0 {
            s.next_local_id -= 1;
            message.id = s.next_local_id;
        }

        let is_active = s.active_conversation_id == Some(message.conversation_id);
        let from_self = message.sender_id == self.current_user_id;

        if let Some(c) = s
            .conversations
            .iter_mut()
            .find(|c| c.id == message.conversation_id)
        {
            if message.id > 0 {
                c.last_message = Some(message.content.clone());
                c.last_message_id = Some(message.id);
                c.updated_at = message.created_at;
            }
            if source == MessageSource::Push && !is_active && !from_self {
                c.unread_count += 1;
            }
        }
        sort_conversations(&mut s.conversations);

        if !is_active {
            return;
        }
        if s.messages.iter().any(|m| m.id == message.id) {
            tracing::debug!("duplicate message {} ignored", message.id);
            return;
        }
        let key = (message.created_at, message.id);
        let idx = s
            .messages
            .partition_point(|m| (m.created_at, m.id) <= key);
        s.messages.insert(idx, message);
    }

    pub async fn remove_message(&self, message_id: i64) {
        let mut s = self.inner.write().await;
        s.messages.retain(|m| m.id != message_id);
    }

    /// Newest known message id for a conversation: the tail of the active
    /// slice, or the summary id carried on the conversation itself.
    pub async fn latest_message_id(&self, conversation_id: i64) -> Option<i64> {
        let s = self.inner.read().await;
        if s.active_conversation_id == Some(conversation_id) {
            if let Some(id) = s.messages.iter().map(|m| m.id).filter(|id| *id > 0).max() {
                return Some(id);
            }
        }
        s.conversations
            .iter()
            .find(|c| c.id == conversation_id)
            .and_then(|c| c.last_message_id)
    }

    // ── Reactions ──

    /// Apply one reaction mutation against the raw triple list. Returns
    /// whether anything changed; a duplicate add or a remove of an absent
    /// triple is a no-op and must not be compensated later.
    pub async fn apply_reaction(
        &self,
        message_id: i64,
        user_id: i64,
        emoji: &str,
        added: bool,
    ) -> bool {
        let mut s = self.inner.write().await;
        let Some(message) = s.messages.iter_mut().find(|m| m.id == message_id) else {
            return false;
        };
        let position = message
            .reactions
            .iter()
            .position(|r| r.user_id == user_id && r.emoji == emoji);
        if added {
            if position.is_some() {
                return false;
            }
            message.reactions.push(Reaction {
                message_id,
                user_id,
                emoji: emoji.to_string(),
            });
            true
        } else {
            match position {
                Some(idx) => {
                    message.reactions.remove(idx);
                    true
                }
                None => false,
            }
        }
    }

    // ── Typing ──

    pub async fn set_typing(&self, conversation_id: i64, user_id: i64, is_typing: bool) {
        let mut s = self.inner.write().await;
        if s.active_conversation_id != Some(conversation_id) {
            return;
        }
        if is_typing {
            s.typing_users.insert(user_id);
        } else {
            s.typing_users.remove(&user_id);
        }
    }

    // ── Read receipts ──

    /// A receipt from the current user (another device) clears the unread
    /// counter; a receipt from someone else marks our own messages up to
    /// `message_id` as read.
    pub async fn apply_read_receipt(&self, conversation_id: i64, user_id: i64, message_id: i64) {
        let mut s = self.inner.write().await;
        if user_id == self.current_user_id {
            if let Some(c) = s.conversations.iter_mut().find(|c| c.id == conversation_id) {
                c.unread_count = 0;
            }
            return;
        }
        if s.active_conversation_id != Some(conversation_id) {
            return;
        }
        let current_user_id = self.current_user_id;
        for m in s
            .messages
            .iter_mut()
            .filter(|m| m.sender_id == current_user_id && m.id <= message_id)
        {
            m.is_read = true;
        }
    }

    pub async fn clear_unread(&self, conversation_id: i64) {
        let mut s = self.inner.write().await;
        if let Some(c) = s.conversations.iter_mut().find(|c| c.id == conversation_id) {
            c.unread_count = 0;
        }
    }

    // ── Presence ──

    /// Update a participant's presence everywhere it appears and recompute
    /// the derived online counters.
    pub async fn apply_user_status(
        &self,
        user_id: i64,
        is_online: bool,
        last_seen: Option<DateTime<Utc>>,
    ) {
        let mut s = self.inner.write().await;
        for conversation in s.conversations.iter_mut() {
            let mut touched = false;
            for participant in conversation
                .participants
                .iter_mut()
                .filter(|p| p.id == user_id)
            {
                participant.is_online = is_online;
                participant.last_seen = last_seen;
                touched = true;
            }
            if touched {
                conversation.online_count = conversation
                    .participants
                    .iter()
                    .filter(|p| p.is_online)
                    .count() as u32;
            }
        }
    }

    // ── Connection / errors ──

    pub async fn set_connection_state(&self, state: ConnectionState) {
        self.inner.write().await.connection = state;
    }

    pub async fn set_error(&self, error: Option<String>) {
        self.inner.write().await.last_error = error;
    }

    // ── Getters ──

    pub async fn conversations(&self) -> Vec<Conversation> {
        self.inner.read().await.conversations.clone()
    }

    pub async fn conversation(&self, conversation_id: i64) -> Option<Conversation> {
        self.inner
            .read()
            .await
            .conversations
            .iter()
            .find(|c| c.id == conversation_id)
            .cloned()
    }

    pub async fn active_conversation_id(&self) -> Option<i64> {
        self.inner.read().await.active_conversation_id
    }

    pub async fn messages(&self) -> Vec<Message> {
        self.inner.read().await.messages.clone()
    }

    pub async fn message(&self, message_id: i64) -> Option<Message> {
        self.inner
            .read()
            .await
            .messages
            .iter()
            .find(|m| m.id == message_id)
            .cloned()
    }

    pub async fn typing_users(&self) -> Vec<i64> {
        let mut users: Vec<i64> = self.inner.read().await.typing_users.iter().copied().collect();
        users.sort_unstable();
        users
    }

    pub async fn connection_state(&self) -> ConnectionState {
        self.inner.read().await.connection
    }

    pub async fn last_error(&self) -> Option<String> {
        self.inner.read().await.last_error.clone()
    }
}

fn sort_conversations(conversations: &mut [Conversation]) {
    conversations.sort_by(|a, b| b.updated_at.cmp(&a.updated_at).then(a.id.cmp(&b.id)));
}
