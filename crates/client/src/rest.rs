use url::Url;

use crate::error::ApiError;
use crate::models::{
    Conversation, ConversationSettings, CreateConversationRequest, CreateMessageRequest, Message,
    ReactionRequest, UpdateConversationRequest, UpdateMembershipRequest,
};

/// Thin typed wrapper over the REST collaborator. Every call carries the
/// bearer credential; this layer neither issues nor refreshes it.
pub struct RestApi {
    http: reqwest::Client,
    base_url: Url,
    token: String,
}

impl RestApi {
    pub fn new(base_url: Url, token: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url,
            token: token.into(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url.as_str().trim_end_matches('/'), path)
    }

    async fn rejection(response: reqwest::Response) -> ApiError {
        let status = response.status().as_u16();
        let message = response
            .json::<serde_json::Value>()
            .await
            .ok()
            .and_then(|v| v.get("error").and_then(|e| e.as_str()).map(str::to_string))
            .unwrap_or_else(|| "request rejected".to_string());
        ApiError::Rejected { status, message }
    }

    // ── Conversations ──

    /// GET /api/conversations
    pub async fn list_conversations(&self) -> Result<Vec<Conversation>, ApiError> {
        let response = self
            .http
            .get(self.url("/api/conversations"))
            .bearer_auth(&self.token)
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(Self::rejection(response).await);
        }
        Ok(response.json().await?)
    }

    /// GET /api/conversations/search?q=
    pub async fn search_conversations(&self, query: &str) -> Result<Vec<Conversation>, ApiError> {
        let response = self
            .http
            .get(self.url("/api/conversations/search"))
            .query(&[("q", query)])
            .bearer_auth(&self.token)
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(Self::rejection(response).await);
        }
        Ok(response.json().await?)
    }

    /// POST /api/conversations
    pub async fn create_conversation(
        &self,
        request: &CreateConversationRequest,
    ) -> Result<Conversation, ApiError> {
        let response = self
            .http
            .post(self.url("/api/conversations"))
            .bearer_auth(&self.token)
            .json(request)
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(Self::rejection(response).await);
        }
        Ok(response.json().await?)
    }

    /// DELETE /api/conversations/:conversationId
    pub async fn delete_conversation(&self, conversation_id: i64) -> Result<(), ApiError> {
        let response = self
            .http
            .delete(self.url(&format!("/api/conversations/{}", conversation_id)))
            .bearer_auth(&self.token)
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(Self::rejection(response).await);
        }
        Ok(())
    }

    /// GET /api/conversations/:conversationId/settings
    pub async fn get_conversation_settings(
        &self,
        conversation_id: i64,
    ) -> Result<ConversationSettings, ApiError> {
        let response = self
            .http
            .get(self.url(&format!("/api/conversations/{}/settings", conversation_id)))
            .bearer_auth(&self.token)
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(Self::rejection(response).await);
        }
        Ok(response.json().await?)
    }

    /// PATCH /api/conversations/:conversationId/settings
    pub async fn update_conversation_settings(
        &self,
        conversation_id: i64,
        request: &UpdateConversationRequest,
    ) -> Result<Conversation, ApiError> {
        let response = self
            .http
            .patch(self.url(&format!("/api/conversations/{}/settings", conversation_id)))
            .bearer_auth(&self.token)
            .json(request)
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(Self::rejection(response).await);
        }
        Ok(response.json().await?)
    }

    /// PATCH /api/conversations/:conversationId/members
    pub async fn update_membership(
        &self,
        conversation_id: i64,
        request: &UpdateMembershipRequest,
    ) -> Result<Conversation, ApiError> {
        let response = self
            .http
            .patch(self.url(&format!("/api/conversations/{}/members", conversation_id)))
            .bearer_auth(&self.token)
            .json(request)
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(Self::rejection(response).await);
        }
        Ok(response.json().await?)
    }

    // ── Messages ──

    /// GET /api/conversations/:conversationId/messages
    pub async fn list_messages(
        &self,
        conversation_id: i64,
        limit: i64,
    ) -> Result<Vec<Message>, ApiError> {
        let response = self
            .http
            .get(self.url(&format!(
                "/api/conversations/{}/messages",
                conversation_id
            )))
            .query(&[("limit", limit)])
            .bearer_auth(&self.token)
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(Self::rejection(response).await);
        }
        Ok(response.json().await?)
    }

    /// POST /api/conversations/:conversationId/messages
    pub async fn create_message(
        &self,
        conversation_id: i64,
        request: &CreateMessageRequest,
    ) -> Result<Message, ApiError> {
        let response = self
            .http
            .post(self.url(&format!(
                "/api/conversations/{}/messages",
                conversation_id
            )))
            .bearer_auth(&self.token)
            .json(request)
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(Self::rejection(response).await);
        }
        Ok(response.json().await?)
    }

    // ── Reactions ──

    /// POST /api/messages/:messageId/reactions
    pub async fn add_reaction(&self, message_id: i64, emoji: &str) -> Result<(), ApiError> {
        let response = self
            .http
            .post(self.url(&format!("/api/messages/{}/reactions", message_id)))
            .bearer_auth(&self.token)
            .json(&ReactionRequest {
                emoji: emoji.to_string(),
            })
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(Self::rejection(response).await);
        }
        Ok(())
    }

    /// DELETE /api/messages/:messageId/reactions
    pub async fn remove_reaction(&self, message_id: i64, emoji: &str) -> Result<(), ApiError> {
        let response = self
            .http
            .delete(self.url(&format!("/api/messages/{}/reactions", message_id)))
            .bearer_auth(&self.token)
            .json(&ReactionRequest {
                emoji: emoji.to_string(),
            })
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(Self::rejection(response).await);
        }
        Ok(())
    }

    // ── Read state ──

    /// POST /api/conversations/:conversationId/read
    pub async fn mark_read(&self, conversation_id: i64) -> Result<(), ApiError> {
        let response = self
            .http
            .post(self.url(&format!("/api/conversations/{}/read", conversation_id)))
            .bearer_auth(&self.token)
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(Self::rejection(response).await);
        }
        Ok(())
    }
}
