use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;

use crate::config::Config;
use crate::error::{Error, Result};
use crate::models::{
    Conversation, ConversationKind, ConversationSettings, CreateConversationRequest,
    CreateMessageRequest, Delivery, Message, MessageKind, UpdateConversationRequest,
    UpdateMembershipRequest,
};
use crate::rest::RestApi;
use crate::store::{ChatStore, MessageSource};
use crate::view::{self, ConversationView, MessageView};
use crate::ws::{ConnectionState, ServerEvent, Transport};

/// Everything the pump task applies to the store, in arrival order.
enum StoreEvent {
    Server(ServerEvent),
    Connection(ConnectionState),
}

/// The only entry point UI code uses. Pairs REST durability with gateway
/// fan-out, owns the typing timers, and funnels every inbound event through
/// one queue so store mutations apply in arrival order.
pub struct ChatClient {
    current_user_id: i64,
    token: String,
    config: Config,
    api: Arc<RestApi>,
    transport: Arc<Transport>,
    store: Arc<ChatStore>,
    /// conversation_id -> pending auto-stop for our own typing indicator
    typing_stop_timers: Mutex<HashMap<i64, JoinHandle<()>>>,
}

impl ChatClient {
    pub async fn new(config: Config, current_user_id: i64, token: impl Into<String>) -> Self {
        let token = token.into();
        let api = Arc::new(RestApi::new(config.api_base_url.clone(), token.clone()));
        let transport = Transport::new(config.clone());
        let store = Arc::new(ChatStore::new(current_user_id));

        let (tx, rx) = mpsc::unbounded_channel::<StoreEvent>();
        Self::wire_transport(&transport, &tx).await;

        let pump_store = Arc::clone(&store);
        let typing_expiry = config.typing_expiry;
        tokio::spawn(async move {
            Self::run_event_pump(pump_store, rx, typing_expiry).await;
        });

        Self {
            current_user_id,
            token,
            config,
            api,
            transport,
            store,
            typing_stop_timers: Mutex::new(HashMap::new()),
        }
    }

    pub fn store(&self) -> &Arc<ChatStore> {
        &self.store
    }

    pub fn transport(&self) -> &Arc<Transport> {
        &self.transport
    }

    pub fn current_user_id(&self) -> i64 {
        self.current_user_id
    }

    async fn wire_transport(transport: &Arc<Transport>, tx: &mpsc::UnboundedSender<StoreEvent>) {
        let forward = tx.clone();
        transport
            .on_new_message(move |message| {
                let _ = forward.send(StoreEvent::Server(ServerEvent::NewMessage {
                    message: message.clone(),
                }));
            })
            .await;
        let forward = tx.clone();
        transport
            .on_typing(move |event| {
                let _ = forward.send(StoreEvent::Server(ServerEvent::UserTyping(event.clone())));
            })
            .await;
        let forward = tx.clone();
        transport
            .on_user_status(move |event| {
                let _ = forward.send(StoreEvent::Server(ServerEvent::UserStatus(event.clone())));
            })
            .await;
        let forward = tx.clone();
        transport
            .on_messages_read(move |event| {
                let _ =
                    forward.send(StoreEvent::Server(ServerEvent::MessagesRead(event.clone())));
            })
            .await;
        let forward = tx.clone();
        transport
            .on_message_deleted(move |event| {
                let _ = forward.send(StoreEvent::Server(ServerEvent::MessageDeleted(
                    event.clone(),
                )));
            })
            .await;
        let forward = tx.clone();
        transport
            .on_conversation_deleted(move |event| {
                let _ = forward.send(StoreEvent::Server(ServerEvent::ConversationDeleted(
                    event.clone(),
                )));
            })
            .await;
        let forward = tx.clone();
        transport
            .on_connection_changed(move |state| {
                let _ = forward.send(StoreEvent::Connection(*state));
            })
            .await;
    }

    async fn run_event_pump(
        store: Arc<ChatStore>,
        mut rx: mpsc::UnboundedReceiver<StoreEvent>,
        typing_expiry: Duration,
    ) {
        // (conversation_id, user_id) -> silence-window timer for inbound typing
        let mut typing_timers: HashMap<(i64, i64), JoinHandle<()>> = HashMap::new();
        while let Some(event) = rx.recv().await {
            match event {
                StoreEvent::Connection(state) => store.set_connection_state(state).await,
                StoreEvent::Server(event) => {
                    Self::apply_server_event(&store, event, &mut typing_timers, typing_expiry)
                        .await
                }
            }
        }
    }

    async fn apply_server_event(
        store: &Arc<ChatStore>,
        event: ServerEvent,
        typing_timers: &mut HashMap<(i64, i64), JoinHandle<()>>,
        typing_expiry: Duration,
    ) {
        match event {
            ServerEvent::NewMessage { message } => {
                store.apply_message(MessageSource::Push, message).await;
            }
            ServerEvent::UserTyping(event) => {
                store
                    .set_typing(event.conversation_id, event.user_id, event.is_typing)
                    .await;
                let key = (event.conversation_id, event.user_id);
                if let Some(handle) = typing_timers.remove(&key) {
                    handle.abort();
                }
                if event.is_typing {
                    // A peer that goes silent without sending a stop event
                    // still leaves the typing set after the expiry window.
                    let store = Arc::clone(store);
                    let handle = tokio::spawn(async move {
                        tokio::time::sleep(typing_expiry).await;
                        store.set_typing(key.0, key.1, false).await;
                    });
                    typing_timers.insert(key, handle);
                }
            }
            ServerEvent::UserStatus(event) => {
                store
                    .apply_user_status(event.user_id, event.is_online, event.last_seen)
                    .await;
            }
            ServerEvent::MessagesRead(event) => {
                store
                    .apply_read_receipt(event.conversation_id, event.user_id, event.message_id)
                    .await;
            }
            ServerEvent::MessageDeleted(event) => {
                store.remove_message(event.message_id).await;
            }
            ServerEvent::ConversationDeleted(event) => {
                store.remove_conversation(event.conversation_id).await;
            }
        }
    }

    // ── Connection ──

    pub async fn connect(&self) -> Result<()> {
        self.transport.connect(&self.token).await
    }

    pub async fn disconnect(&self) {
        let mut timers = self.typing_stop_timers.lock().await;
        for (_, handle) in timers.drain() {
            handle.abort();
        }
        drop(timers);
        self.transport.disconnect().await;
    }

    // ── Conversations ──

    pub async fn load_conversations(&self) -> Result<Vec<Conversation>> {
        match self.api.list_conversations().await {
            Ok(conversations) => {
                self.store
                    .replace_conversations(conversations.clone())
                    .await;
                Ok(conversations)
            }
            Err(e) => {
                self.store.set_error(Some(e.to_string())).await;
                Err(Error::Command(e))
            }
        }
    }

    pub async fn search_conversations(&self, query: &str) -> Result<Vec<Conversation>> {
        self.api
            .search_conversations(query)
            .await
            .map_err(Error::Command)
    }

    /// Make a conversation active and load its message snapshot. The room is
    /// joined before the fetch is issued, so a push racing the snapshot is at
    /// worst a duplicate removed by the idempotent merge.
    pub async fn select_conversation(&self, conversation_id: i64) -> Result<()> {
        let previous = self
            .store
            .set_active_conversation(Some(conversation_id))
            .await;
        if previous != Some(conversation_id) {
            if let Some(previous) = previous {
                self.transport.leave_conversation_room(previous).await;
            }
            self.transport.join_conversation_room(conversation_id).await;
        }
        match self
            .api
            .list_messages(conversation_id, self.config.message_page_size)
            .await
        {
            Ok(messages) => {
                self.store.set_messages(conversation_id, messages).await;
                Ok(())
            }
            Err(e) => {
                self.store.set_error(Some(e.to_string())).await;
                Err(Error::Command(e))
            }
        }
    }

    pub async fn close_conversation(&self) {
        if let Some(previous) = self.store.set_active_conversation(None).await {
            self.transport.leave_conversation_room(previous).await;
        }
    }

    pub async fn create_conversation(
        &self,
        conversation_type: ConversationKind,
        name: Option<String>,
        participant_ids: Vec<i64>,
    ) -> Result<Conversation> {
        if let Some(name) = name.as_deref() {
            cadence_shared::validation::validate_conversation_name(name)
                .map_err(Error::InvalidInput)?;
        }
        let request = CreateConversationRequest {
            conversation_type,
            name,
            participant_ids,
        };
        match self.api.create_conversation(&request).await {
            Ok(conversation) => {
                self.store.upsert_conversation(conversation.clone()).await;
                Ok(conversation)
            }
            Err(e) => {
                self.store.set_error(Some(e.to_string())).await;
                Err(Error::Command(e))
            }
        }
    }

    pub async fn delete_conversation(&self, conversation_id: i64) -> Result<()> {
        if let Err(e) = self.api.delete_conversation(conversation_id).await {
            self.store.set_error(Some(e.to_string())).await;
            return Err(Error::Command(e));
        }
        self.store.remove_conversation(conversation_id).await;
        self.transport
            .send_delete_conversation(conversation_id)
            .await;
        self.transport.leave_conversation_room(conversation_id).await;
        Ok(())
    }

    pub async fn conversation_settings(
        &self,
        conversation_id: i64,
    ) -> Result<ConversationSettings> {
        self.api
            .get_conversation_settings(conversation_id)
            .await
            .map_err(Error::Command)
    }

    pub async fn rename_conversation(
        &self,
        conversation_id: i64,
        name: &str,
    ) -> Result<Conversation> {
        cadence_shared::validation::validate_conversation_name(name).map_err(Error::InvalidInput)?;
        let request = UpdateConversationRequest {
            name: Some(name.to_string()),
        };
        match self
            .api
            .update_conversation_settings(conversation_id, &request)
            .await
        {
            Ok(conversation) => {
                self.store.upsert_conversation(conversation.clone()).await;
                Ok(conversation)
            }
            Err(e) => {
                self.store.set_error(Some(e.to_string())).await;
                Err(Error::Command(e))
            }
        }
    }

    pub async fn update_membership(
        &self,
        conversation_id: i64,
        add: Vec<i64>,
        remove: Vec<i64>,
    ) -> Result<Conversation> {
        let request = UpdateMembershipRequest { add, remove };
        match self.api.update_membership(conversation_id, &request).await {
            Ok(conversation) => {
                self.store.upsert_conversation(conversation.clone()).await;
                Ok(conversation)
            }
            Err(e) => {
                self.store.set_error(Some(e.to_string())).await;
                Err(Error::Command(e))
            }
        }
    }

    // ── Messages ──

    /// Persist via REST, merge the authoritative result, then fan out over
    /// the gateway when the conversation is the active one. A rejected send
    /// is kept locally as a failed message instead of being discarded.
    pub async fn send_message(
        &self,
        conversation_id: i64,
        content: impl Into<String>,
        message_type: MessageKind,
    ) -> Result<Message> {
        let content = content.into();
        cadence_shared::validation::validate_message_content(&content)
            .map_err(Error::InvalidInput)?;
        let request = CreateMessageRequest {
            content: content.clone(),
            message_type,
            idempotency_key: uuid::Uuid::new_v4().to_string(),
        };
        match self.api.create_message(conversation_id, &request).await {
            Ok(message) => {
                self.store
                    .apply_message(MessageSource::Rest, message.clone())
                    .await;
                if self.store.active_conversation_id().await == Some(conversation_id) {
                    self.transport
                        .send_message(conversation_id, content, message_type)
                        .await;
                }
                Ok(message)
            }
            Err(e) => {
                let failed = Message {
                    id: 0,
                    conversation_id,
                    sender_id: self.current_user_id,
                    content,
                    message_type,
                    created_at: Utc::now(),
                    is_read: false,
                    reactions: Vec::new(),
                    delivery: Delivery::Failed,
                };
                self.store.apply_message(MessageSource::Local, failed).await;
                self.store.set_error(Some(e.to_string())).await;
                Err(Error::Command(e))
            }
        }
    }

    pub async fn delete_message(&self, message_id: i64) {
        self.store.remove_message(message_id).await;
        self.transport.send_delete_message(message_id).await;
    }

    // ── Typing ──

    /// Emit immediately; a `true` also arms the single-shot auto-stop timer.
    /// Every keystroke cancels and replaces the previous timer, so exactly
    /// one stop event fires, timed from the last call.
    pub async fn set_typing(&self, conversation_id: i64, is_typing: bool) {
        self.transport.send_typing(conversation_id, is_typing).await;
        let mut timers = self.typing_stop_timers.lock().await;
        if let Some(handle) = timers.remove(&conversation_id) {
            handle.abort();
        }
        if is_typing {
            let transport = Arc::clone(&self.transport);
            let delay = self.config.typing_stop_delay;
            let handle = tokio::spawn(async move {
                tokio::time::sleep(delay).await;
                transport.send_typing(conversation_id, false).await;
            });
            timers.insert(conversation_id, handle);
        }
    }

    // ── Read state ──

    /// REST first, then a read receipt referencing the newest message id
    /// known at call time.
    pub async fn mark_as_read(&self, conversation_id: i64) -> Result<()> {
        let newest = self.store.latest_message_id(conversation_id).await;
        if let Err(e) = self.api.mark_read(conversation_id).await {
            self.store.set_error(Some(e.to_string())).await;
            return Err(Error::Command(e));
        }
        self.store.clear_unread(conversation_id).await;
        match newest {
            Some(message_id) => {
                self.transport
                    .send_read_receipt(conversation_id, message_id)
                    .await;
            }
            None => {
                tracing::debug!("no messages to acknowledge in conversation {}", conversation_id)
            }
        }
        Ok(())
    }

    // ── Reactions ──

    /// Optimistic: the raw triple is applied before the round-trip. A REST
    /// rejection is compensated by the exact inverse mutation, and only when
    /// the optimistic apply actually changed something.
    pub async fn add_reaction(&self, message_id: i64, emoji: &str) -> Result<()> {
        cadence_shared::validation::validate_emoji(emoji).map_err(Error::InvalidInput)?;
        let applied = self
            .store
            .apply_reaction(message_id, self.current_user_id, emoji, true)
            .await;
        match self.api.add_reaction(message_id, emoji).await {
            Ok(()) => {
                self.transport
                    .send_add_reaction(message_id, emoji.to_string())
                    .await;
                Ok(())
            }
            Err(e) => {
                if applied {
                    self.store
                        .apply_reaction(message_id, self.current_user_id, emoji, false)
                        .await;
                }
                self.store.set_error(Some(e.to_string())).await;
                Err(Error::Command(e))
            }
        }
    }

    pub async fn remove_reaction(&self, message_id: i64, emoji: &str) -> Result<()> {
        let applied = self
            .store
            .apply_reaction(message_id, self.current_user_id, emoji, false)
            .await;
        match self.api.remove_reaction(message_id, emoji).await {
            Ok(()) => {
                self.transport
                    .send_remove_reaction(message_id, emoji.to_string())
                    .await;
                Ok(())
            }
            Err(e) => {
                if applied {
                    self.store
                        .apply_reaction(message_id, self.current_user_id, emoji, true)
                        .await;
                }
                self.store.set_error(Some(e.to_string())).await;
                Err(Error::Command(e))
            }
        }
    }

    // ── View projections ──

    pub async fn conversation_views(&self) -> Vec<ConversationView> {
        self.store
            .conversations()
            .await
            .iter()
            .map(|c| view::conversation_view(c, self.current_user_id))
            .collect()
    }

    pub async fn message_views(&self, now: DateTime<Utc>) -> Vec<MessageView> {
        let participants = match self.store.active_conversation_id().await {
            Some(id) => self
                .store
                .conversation(id)
                .await
                .map(|c| c.participants)
                .unwrap_or_default(),
            None => Vec::new(),
        };
        self.store
            .messages()
            .await
            .iter()
            .map(|m| view::message_view(m, &participants, self.current_user_id, now))
            .collect()
    }
}
