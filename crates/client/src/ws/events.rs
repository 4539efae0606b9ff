use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::{Message, MessageKind};

// ── Server → Client Events ──

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerEvent {
    // The message rides under its own key; its `type` field (content kind)
    // must not clash with the event tag.
    NewMessage { message: Message },
    UserTyping(TypingEvent),
    UserStatus(UserStatusEvent),
    MessagesRead(ReadReceiptEvent),
    MessageDeleted(MessageDeletedEvent),
    ConversationDeleted(ConversationDeletedEvent),
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TypingEvent {
    pub conversation_id: i64,
    pub user_id: i64,
    pub is_typing: bool,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserStatusEvent {
    pub user_id: i64,
    pub is_online: bool,
    #[serde(default)]
    pub last_seen: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadReceiptEvent {
    pub conversation_id: i64,
    pub user_id: i64,
    pub message_id: i64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageDeletedEvent {
    pub message_id: i64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationDeletedEvent {
    pub conversation_id: i64,
}

// ── Client → Server Events ──

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientEvent {
    JoinConversation {
        #[serde(rename = "conversationId")]
        conversation_id: i64,
    },
    LeaveConversation {
        #[serde(rename = "conversationId")]
        conversation_id: i64,
    },
    SendMessage {
        #[serde(rename = "conversationId")]
        conversation_id: i64,
        content: String,
        #[serde(rename = "type")]
        message_type: MessageKind,
    },
    Typing {
        #[serde(rename = "conversationId")]
        conversation_id: i64,
        #[serde(rename = "isTyping")]
        is_typing: bool,
    },
    ReadMessages {
        #[serde(rename = "conversationId")]
        conversation_id: i64,
        #[serde(rename = "messageId")]
        message_id: i64,
    },
    AddReaction {
        #[serde(rename = "messageId")]
        message_id: i64,
        emoji: String,
    },
    RemoveReaction {
        #[serde(rename = "messageId")]
        message_id: i64,
        emoji: String,
    },
    DeleteMessage {
        #[serde(rename = "messageId")]
        message_id: i64,
    },
    DeleteConversation {
        #[serde(rename = "conversationId")]
        conversation_id: i64,
    },
}
