use crate::constants::*;

pub fn validate_conversation_name(name: &str) -> Result<(), String> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err("Conversation name is required".into());
    }
    if trimmed.len() > MAX_CONVERSATION_NAME_LENGTH {
        return Err(format!(
            "Conversation name must be at most {} characters",
            MAX_CONVERSATION_NAME_LENGTH
        ));
    }
    Ok(())
}

pub fn validate_message_content(content: &str) -> Result<(), String> {
    if content.trim().is_empty() {
        return Err("Message content is required".into());
    }
    if content.len() > MAX_MESSAGE_LENGTH {
        return Err(format!(
            "Message must be at most {} characters",
            MAX_MESSAGE_LENGTH
        ));
    }
    Ok(())
}

pub fn validate_emoji(emoji: &str) -> Result<(), String> {
    if emoji.is_empty() {
        return Err("Emoji is required".into());
    }
    if emoji.chars().count() > 8 {
        return Err("Not a valid reaction emoji".into());
    }
    Ok(())
}
