mod events;
mod registry;

pub use events::{
    ClientEvent, ConversationDeletedEvent, MessageDeletedEvent, ReadReceiptEvent, ServerEvent,
    TypingEvent, UserStatusEvent,
};
pub use registry::HandlerId;

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use futures::{SinkExt, StreamExt};
use serde::Serialize;
use tokio::sync::{mpsc, RwLock};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message as WsMessage;

use crate::config::Config;
use crate::error::Error;
use crate::models::{Message, MessageKind};
use registry::Handlers;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

struct ConnInner {
    state: ConnectionState,
    /// Sender feeding the forward task of the live socket, if any.
    tx: Option<mpsc::UnboundedSender<String>>,
    /// Last credential used, reused by automatic reconnects.
    token: Option<String>,
}

struct EventHandlers {
    new_message: Handlers<Message>,
    typing: Handlers<TypingEvent>,
    user_status: Handlers<UserStatusEvent>,
    messages_read: Handlers<ReadReceiptEvent>,
    message_deleted: Handlers<MessageDeletedEvent>,
    conversation_deleted: Handlers<ConversationDeletedEvent>,
    connection: Handlers<ConnectionState>,
}

/// Owns the single gateway connection for a session: connect/disconnect,
/// room membership, best-effort outbound emissions, and typed inbound
/// subscriptions. Raw socket errors never leave this module; subscribers
/// only ever observe `ConnectionState` transitions.
pub struct Transport {
    config: Config,
    /// Bumped on every explicit connect/disconnect and on every socket
    /// that comes up. A receive loop whose generation is stale must not
    /// trigger reconnection.
    generation: AtomicU64,
    inner: RwLock<ConnInner>,
    /// conversation_id -> reference count of UI surfaces in the room
    rooms: RwLock<HashMap<i64, usize>>,
    handlers: EventHandlers,
}

impl Transport {
    pub fn new(config: Config) -> Arc<Self> {
        Arc::new(Self {
            config,
            generation: AtomicU64::new(0),
            inner: RwLock::new(ConnInner {
                state: ConnectionState::Disconnected,
                tx: None,
                token: None,
            }),
            rooms: RwLock::new(HashMap::new()),
            handlers: EventHandlers {
                new_message: Handlers::new(),
                typing: Handlers::new(),
                user_status: Handlers::new(),
                messages_read: Handlers::new(),
                message_deleted: Handlers::new(),
                conversation_deleted: Handlers::new(),
                connection: Handlers::new(),
            },
        })
    }

    /// Open the gateway connection. Resolves once the upgrade handshake
    /// completes; a timeout or rejected credential fails the call and
    /// leaves the transport disconnected.
    pub async fn connect(self: &Arc<Self>, token: &str) -> Result<(), Error> {
        // Invalidate any receive loop or pending reconnect from before.
        self.generation.fetch_add(1, Ordering::SeqCst);
        match self.establish(token).await {
            Ok(()) => Ok(()),
            Err(e) => {
                self.set_state(ConnectionState::Disconnected).await;
                Err(e)
            }
        }
    }

    /// Close the connection and drop socket state. Idempotent; suppresses
    /// any in-flight automatic reconnect.
    pub async fn disconnect(&self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
        {
            let mut inner = self.inner.write().await;
            // Dropping the sender ends the forward task, which closes the socket.
            inner.tx = None;
            inner.token = None;
        }
        self.rooms.write().await.clear();
        self.set_state(ConnectionState::Disconnected).await;
    }

    pub async fn connection_state(&self) -> ConnectionState {
        self.inner.read().await.state
    }

    async fn establish(self: &Arc<Self>, token: &str) -> Result<(), Error> {
        self.set_state(ConnectionState::Connecting).await;

        let ws_url = format!(
            "{}?token={}",
            self.config.gateway_url,
            urlencoding::encode(token)
        );
        let handshake = tokio::time::timeout(self.config.handshake_timeout, connect_async(&ws_url));
        let (socket, _) = match handshake.await {
            Ok(Ok(pair)) => pair,
            Ok(Err(e)) => {
                return Err(Error::Connection {
                    reason: e.to_string(),
                })
            }
            Err(_) => {
                return Err(Error::Connection {
                    reason: format!(
                        "handshake timed out after {:?}",
                        self.config.handshake_timeout
                    ),
                })
            }
        };

        let (mut ws_tx, mut ws_rx) = socket.split();
        let (tx, mut rx) = mpsc::unbounded_channel::<String>();

        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        {
            let mut inner = self.inner.write().await;
            inner.tx = Some(tx);
            inner.token = Some(token.to_string());
        }

        // Task to forward queued emissions to the socket. Dropping the
        // sender ends the loop, and the close handshake tears the
        // receive loop down with it.
        tokio::spawn(async move {
            while let Some(msg) = rx.recv().await {
                if ws_tx.send(WsMessage::Text(msg.into())).await.is_err() {
                    break;
                }
            }
            let _ = ws_tx.send(WsMessage::Close(None)).await;
        });

        // Receive loop
        let transport = Arc::clone(self);
        tokio::spawn(async move {
            while let Some(Ok(msg)) = ws_rx.next().await {
                match msg {
                    WsMessage::Text(text) => {
                        let text_str: &str = &text;
                        match serde_json::from_str::<ServerEvent>(text_str) {
                            Ok(event) => transport.dispatch(event).await,
                            Err(e) => {
                                tracing::debug!("ignoring unrecognized gateway frame: {}", e)
                            }
                        }
                    }
                    WsMessage::Close(_) => break,
                    _ => {}
                }
            }
            transport.connection_lost(generation).await;
        });

        self.set_state(ConnectionState::Connected).await;
        self.rejoin_rooms().await;
        Ok(())
    }

    async fn connection_lost(self: &Arc<Self>, generation: u64) {
        if self.generation.load(Ordering::SeqCst) != generation {
            // Explicit disconnect, or a newer socket superseded this one.
            return;
        }
        self.inner.write().await.tx = None;
        tracing::warn!("gateway connection lost, scheduling reconnect");
        let transport = Arc::clone(self);
        tokio::spawn(async move {
            transport.reconnect_loop(generation).await;
        });
    }

    fn reconnect_loop(
        self: Arc<Self>,
        generation: u64,
    ) -> std::pin::Pin<Box<dyn std::future::Future<Output = ()> + Send>> {
        Box::pin(async move {
        for attempt in 1..=self.config.reconnect_max_attempts {
            if self.generation.load(Ordering::SeqCst) != generation {
                return;
            }
            self.set_state(ConnectionState::Connecting).await;
            tokio::time::sleep(self.config.reconnect_base_delay * attempt).await;
            if self.generation.load(Ordering::SeqCst) != generation {
                return;
            }
            let token = self.inner.read().await.token.clone();
            let Some(token) = token else { return };
            match self.establish(&token).await {
                Ok(()) => {
                    tracing::info!("gateway reconnected on attempt {}", attempt);
                    return;
                }
                Err(e) => tracing::warn!("reconnect attempt {} failed: {}", attempt, e),
            }
        }
        tracing::error!(
            "gateway reconnect gave up after {} attempts",
            self.config.reconnect_max_attempts
        );
        self.set_state(ConnectionState::Disconnected).await;
        })
    }

    async fn set_state(&self, state: ConnectionState) {
        {
            let mut inner = self.inner.write().await;
            if inner.state == state {
                return;
            }
            inner.state = state;
        }
        self.handlers.connection.emit(&state).await;
    }

    async fn dispatch(&self, event: ServerEvent) {
        match event {
            ServerEvent::NewMessage { message } => self.handlers.new_message.emit(&message).await,
            ServerEvent::UserTyping(event) => self.handlers.typing.emit(&event).await,
            ServerEvent::UserStatus(event) => self.handlers.user_status.emit(&event).await,
            ServerEvent::MessagesRead(event) => self.handlers.messages_read.emit(&event).await,
            ServerEvent::MessageDeleted(event) => self.handlers.message_deleted.emit(&event).await,
            ServerEvent::ConversationDeleted(event) => {
                self.handlers.conversation_deleted.emit(&event).await
            }
        }
    }

    /// Fire-and-forget emission. Dropped with a warning while disconnected;
    /// REST is the durable path, the gateway is fan-out only.
    async fn emit(&self, event: ClientEvent) {
        let inner = self.inner.read().await;
        let Some(tx) = inner.tx.as_ref() else {
            tracing::warn!("gateway disconnected, dropping {:?}", event);
            return;
        };
        let msg = match serde_json::to_string(&event) {
            Ok(m) => m,
            Err(_) => return,
        };
        let _ = tx.send(msg);
    }

    // ── Room membership ──

    pub async fn join_conversation_room(&self, conversation_id: i64) {
        let first_ref = {
            let mut rooms = self.rooms.write().await;
            let count = rooms.entry(conversation_id).or_insert(0);
            *count += 1;
            *count == 1
        };
        if first_ref {
            self.emit(ClientEvent::JoinConversation { conversation_id })
                .await;
        }
    }

    pub async fn leave_conversation_room(&self, conversation_id: i64) {
        let last_ref = {
            let mut rooms = self.rooms.write().await;
            match rooms.get_mut(&conversation_id) {
                Some(count) if *count > 1 => {
                    *count -= 1;
                    false
                }
                Some(_) => {
                    rooms.remove(&conversation_id);
                    true
                }
                None => false,
            }
        };
        if last_ref {
            self.emit(ClientEvent::LeaveConversation { conversation_id })
                .await;
        }
    }

    /// Re-declare membership for every held room, once each, after a
    /// successful (re)connect.
    async fn rejoin_rooms(&self) {
        let ids: Vec<i64> = self.rooms.read().await.keys().copied().collect();
        for conversation_id in ids {
            self.emit(ClientEvent::JoinConversation { conversation_id })
                .await;
        }
    }

    // ── Outbound events ──

    pub async fn send_message(
        &self,
        conversation_id: i64,
        content: String,
        message_type: MessageKind,
    ) {
        self.emit(ClientEvent::SendMessage {
            conversation_id,
            content,
            message_type,
        })
        .await;
    }

    pub async fn send_typing(&self, conversation_id: i64, is_typing: bool) {
        self.emit(ClientEvent::Typing {
            conversation_id,
            is_typing,
        })
        .await;
    }

    pub async fn send_read_receipt(&self, conversation_id: i64, message_id: i64) {
        self.emit(ClientEvent::ReadMessages {
            conversation_id,
            message_id,
        })
        .await;
    }

    pub async fn send_add_reaction(&self, message_id: i64, emoji: String) {
        self.emit(ClientEvent::AddReaction { message_id, emoji }).await;
    }

    pub async fn send_remove_reaction(&self, message_id: i64, emoji: String) {
        self.emit(ClientEvent::RemoveReaction { message_id, emoji })
            .await;
    }

    pub async fn send_delete_message(&self, message_id: i64) {
        self.emit(ClientEvent::DeleteMessage { message_id }).await;
    }

    pub async fn send_delete_conversation(&self, conversation_id: i64) {
        self.emit(ClientEvent::DeleteConversation { conversation_id })
            .await;
    }

    // ── Inbound subscriptions ──

    pub async fn on_new_message(
        &self,
        handler: impl Fn(&Message) + Send + Sync + 'static,
    ) -> HandlerId {
        self.handlers.new_message.subscribe(handler).await
    }

    pub async fn off_new_message(&self, id: HandlerId) -> bool {
        self.handlers.new_message.unsubscribe(id).await
    }

    pub async fn on_typing(
        &self,
        handler: impl Fn(&TypingEvent) + Send + Sync + 'static,
    ) -> HandlerId {
        self.handlers.typing.subscribe(handler).await
    }

    pub async fn off_typing(&self, id: HandlerId) -> bool {
        self.handlers.typing.unsubscribe(id).await
    }

    pub async fn on_user_status(
        &self,
        handler: impl Fn(&UserStatusEvent) + Send + Sync + 'static,
    ) -> HandlerId {
        self.handlers.user_status.subscribe(handler).await
    }

    pub async fn off_user_status(&self, id: HandlerId) -> bool {
        self.handlers.user_status.unsubscribe(id).await
    }

    pub async fn on_messages_read(
        &self,
        handler: impl Fn(&ReadReceiptEvent) + Send + Sync + 'static,
    ) -> HandlerId {
        self.handlers.messages_read.subscribe(handler).await
    }

    pub async fn off_messages_read(&self, id: HandlerId) -> bool {
        self.handlers.messages_read.unsubscribe(id).await
    }

    pub async fn on_message_deleted(
        &self,
        handler: impl Fn(&MessageDeletedEvent) + Send + Sync + 'static,
    ) -> HandlerId {
        self.handlers.message_deleted.subscribe(handler).await
    }

    pub async fn off_message_deleted(&self, id: HandlerId) -> bool {
        self.handlers.message_deleted.unsubscribe(id).await
    }

    pub async fn on_conversation_deleted(
        &self,
        handler: impl Fn(&ConversationDeletedEvent) + Send + Sync + 'static,
    ) -> HandlerId {
        self.handlers.conversation_deleted.subscribe(handler).await
    }

    pub async fn off_conversation_deleted(&self, id: HandlerId) -> bool {
        self.handlers.conversation_deleted.unsubscribe(id).await
    }

    pub async fn on_connection_changed(
        &self,
        handler: impl Fn(&ConnectionState) + Send + Sync + 'static,
    ) -> HandlerId {
        self.handlers.connection.subscribe(handler).await
    }

    pub async fn off_connection_changed(&self, id: HandlerId) -> bool {
        self.handlers.connection.unsubscribe(id).await
    }
}
