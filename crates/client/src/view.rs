//! Pure projections of raw entities into UI-ready records. Nothing here
//! touches session state; the current user id and reference instant come in
//! as arguments, and inputs are never mutated.

use chrono::{DateTime, Datelike, Utc};
use serde::Serialize;

use crate::models::{Conversation, ConversationKind, Delivery, Message, MessageKind, Participant};

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationView {
    pub id: i64,
    pub display_name: String,
    pub avatar_glyph: String,
    pub is_group: bool,
    pub last_message: Option<String>,
    pub unread_count: u32,
    pub online_count: u32,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReactionGroup {
    pub emoji: String,
    pub count: usize,
    pub user_names: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageView {
    pub id: i64,
    pub conversation_id: i64,
    pub sender_id: i64,
    pub sender_name: String,
    pub content: String,
    #[serde(rename = "type")]
    pub message_type: MessageKind,
    pub is_own: bool,
    pub is_read: bool,
    pub failed: bool,
    pub timestamp_label: String,
    pub reactions: Vec<ReactionGroup>,
}

pub fn conversation_view(conversation: &Conversation, current_user_id: i64) -> ConversationView {
    let display_name = resolve_display_name(conversation, current_user_id);
    let avatar_glyph = display_name
        .chars()
        .next()
        .map(|c| c.to_uppercase().to_string())
        .unwrap_or_default();

    ConversationView {
        id: conversation.id,
        display_name,
        avatar_glyph,
        is_group: conversation.conversation_type == ConversationKind::Group,
        last_message: conversation.last_message.clone(),
        unread_count: conversation.unread_count,
        online_count: conversation.online_count,
        updated_at: conversation.updated_at,
    }
}

pub fn message_view(
    message: &Message,
    participants: &[Participant],
    current_user_id: i64,
    now: DateTime<Utc>,
) -> MessageView {
    MessageView {
        id: message.id,
        conversation_id: message.conversation_id,
        sender_id: message.sender_id,
        sender_name: participant_name(participants, message.sender_id),
        content: message.content.clone(),
        message_type: message.message_type,
        is_own: message.sender_id == current_user_id,
        is_read: message.is_read,
        failed: message.delivery == Delivery::Failed,
        timestamp_label: timestamp_label(message.created_at, now),
        reactions: aggregate_reactions(message, participants),
    }
}

/// Explicit name, else a synthesized one: `Group {id}` for groups, the first
/// other participant's name for personal chats, `User {id}` as the last
/// resort.
fn resolve_display_name(conversation: &Conversation, current_user_id: i64) -> String {
    if let Some(name) = conversation.name.as_deref() {
        if !name.trim().is_empty() {
            return name.to_string();
        }
    }
    if conversation.conversation_type == ConversationKind::Group {
        return format!("Group {}", conversation.id);
    }
    conversation
        .participants
        .iter()
        .find(|p| p.id != current_user_id)
        .map(|p| p.name.clone())
        .unwrap_or_else(|| format!("User {}", conversation.id))
}

/// Group raw reaction triples by emoji in encounter order; counts and
/// reacting user names are recomputed from the triples every time, never
/// cached on the message.
fn aggregate_reactions(message: &Message, participants: &[Participant]) -> Vec<ReactionGroup> {
    let mut groups: Vec<ReactionGroup> = Vec::new();
    for reaction in &message.reactions {
        let name = participant_name(participants, reaction.user_id);
        match groups.iter_mut().find(|g| g.emoji == reaction.emoji) {
            Some(group) => {
                group.count += 1;
                group.user_names.push(name);
            }
            None => groups.push(ReactionGroup {
                emoji: reaction.emoji.clone(),
                count: 1,
                user_names: vec![name],
            }),
        }
    }
    groups
}

fn participant_name(participants: &[Participant], user_id: i64) -> String {
    participants
        .iter()
        .find(|p| p.id == user_id)
        .map(|p| p.name.clone())
        .unwrap_or_else(|| format!("User {}", user_id))
}

/// Short time for same-day messages, date plus time otherwise.
fn timestamp_label(created_at: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let created = created_at.date_naive();
    if created == now.date_naive() {
        created_at.format("%H:%M").to_string()
    } else if created.year() == now.year() {
        created_at.format("%b %-d, %H:%M").to_string()
    } else {
        created_at.format("%Y-%m-%d %H:%M").to_string()
    }
}
