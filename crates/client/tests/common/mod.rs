#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{Message as WsFrame, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{delete, get, patch, post};
use axum::{Json, Router};
use futures::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::sync::{mpsc, Mutex};

use cadence_client::models::{
    Conversation, ConversationKind, Delivery, Message, MessageKind, Participant,
};
use cadence_client::Config;

pub const TEST_TOKEN: &str = "test-token";
pub const TEST_USER_ID: i64 = 1;

// ── Model builders ──

pub fn ts(s: &str) -> chrono::DateTime<chrono::Utc> {
    s.parse().unwrap()
}

pub fn participant(id: i64, name: &str) -> Participant {
    Participant {
        id,
        name: name.into(),
        is_online: false,
        last_seen: None,
    }
}

pub fn personal_conversation(id: i64, participants: Vec<Participant>) -> Conversation {
    Conversation {
        id,
        conversation_type: ConversationKind::Personal,
        name: None,
        participants,
        created_at: ts("2026-08-06T09:00:00Z"),
        updated_at: ts("2026-08-06T09:00:00Z"),
        last_message: None,
        last_message_id: None,
        unread_count: 0,
        online_count: 0,
    }
}

pub fn group_conversation(id: i64, name: Option<&str>, participants: Vec<Participant>) -> Conversation {
    Conversation {
        conversation_type: ConversationKind::Group,
        name: name.map(str::to_string),
        ..personal_conversation(id, participants)
    }
}

pub fn text_message(
    id: i64,
    conversation_id: i64,
    sender_id: i64,
    content: &str,
    at: &str,
) -> Message {
    Message {
        id,
        conversation_id,
        sender_id,
        content: content.into(),
        message_type: MessageKind::Text,
        created_at: ts(at),
        is_read: false,
        reactions: Vec::new(),
        delivery: Delivery::Delivered,
    }
}

/// In-memory stand-in for the REST collaborator plus the gateway, so the
/// client under test talks to a real HTTP/WS server on a random port.
pub struct MockState {
    next_message_id: Mutex<i64>,
    next_conversation_id: Mutex<i64>,
    pub conversations: Mutex<Vec<Value>>,
    pub messages: Mutex<HashMap<i64, Vec<Value>>>,
    pub fail_reactions: AtomicBool,
    pub fail_message_create: AtomicBool,
    pub fail_message_list: AtomicBool,
    pub gateway_connections: AtomicUsize,
    push_tx: Mutex<Option<mpsc::UnboundedSender<String>>>,
    kick_tx: Mutex<Option<mpsc::UnboundedSender<()>>>,
    pub client_frames: Mutex<Vec<Value>>,
}

pub struct MockBackend {
    pub state: Arc<MockState>,
    pub base: String,
}

/// Start the mock backend on a random TCP port and return a handle to it.
pub async fn start_backend() -> MockBackend {
    init_tracing();

    let state = Arc::new(MockState {
        next_message_id: Mutex::new(100),
        next_conversation_id: Mutex::new(10),
        conversations: Mutex::new(Vec::new()),
        messages: Mutex::new(HashMap::new()),
        fail_reactions: AtomicBool::new(false),
        fail_message_create: AtomicBool::new(false),
        fail_message_list: AtomicBool::new(false),
        gateway_connections: AtomicUsize::new(0),
        push_tx: Mutex::new(None),
        kick_tx: Mutex::new(None),
        client_frames: Mutex::new(Vec::new()),
    });

    let app = Router::new()
        .route("/api/conversations", get(list_conversations))
        .route("/api/conversations", post(create_conversation))
        .route("/api/conversations/search", get(search_conversations))
        .route(
            "/api/conversations/{conversationId}",
            delete(delete_conversation),
        )
        .route(
            "/api/conversations/{conversationId}/settings",
            patch(update_settings),
        )
        .route(
            "/api/conversations/{conversationId}/messages",
            get(list_messages),
        )
        .route(
            "/api/conversations/{conversationId}/messages",
            post(create_message),
        )
        .route("/api/conversations/{conversationId}/read", post(mark_read))
        .route("/api/messages/{messageId}/reactions", post(add_reaction))
        .route(
            "/api/messages/{messageId}/reactions",
            delete(remove_reaction),
        )
        .route("/gateway", get(gateway))
        .with_state(state.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let base = format!("127.0.0.1:{}", addr.port());

    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    // Give the server a moment to start
    tokio::time::sleep(Duration::from_millis(50)).await;

    MockBackend { state, base }
}

pub fn init_tracing() {
    use tracing_subscriber::EnvFilter;
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| "cadence_client=debug".into()),
        )
        .try_init()
        .ok();
}

impl MockBackend {
    /// Config pointing at this backend, with timings compressed for tests.
    pub fn config(&self) -> Config {
        Config {
            api_base_url: format!("http://{}", self.base).parse().unwrap(),
            gateway_url: format!("ws://{}/gateway", self.base).parse().unwrap(),
            handshake_timeout: Duration::from_millis(1_000),
            reconnect_max_attempts: 5,
            reconnect_base_delay: Duration::from_millis(40),
            typing_stop_delay: Duration::from_millis(150),
            typing_expiry: Duration::from_millis(400),
            message_page_size: 50,
        }
    }

    pub async fn seed_conversation(&self, conversation: Value) {
        self.state.conversations.lock().await.push(conversation);
    }

    pub async fn seed_message(&self, conversation_id: i64, message: Value) {
        self.state
            .messages
            .lock()
            .await
            .entry(conversation_id)
            .or_default()
            .push(message);
    }

    /// Push a gateway event to the connected client.
    pub async fn push(&self, event: Value) {
        let guard = self.state.push_tx.lock().await;
        let tx = guard.as_ref().expect("no gateway client connected");
        tx.send(event.to_string()).unwrap();
    }

    /// Drop the gateway connection server-side.
    pub async fn kick(&self) {
        if let Some(tx) = self.state.kick_tx.lock().await.as_ref() {
            let _ = tx.send(());
        }
    }

    pub async fn frames(&self) -> Vec<Value> {
        self.state.client_frames.lock().await.clone()
    }

    pub async fn frames_of_type(&self, event_type: &str) -> Vec<Value> {
        self.frames()
            .await
            .into_iter()
            .filter(|f| f.get("type").and_then(|t| t.as_str()) == Some(event_type))
            .collect()
    }

    /// Wait until at least `count` frames of `event_type` arrived, or panic
    /// after the timeout.
    pub async fn wait_for_frames(&self, event_type: &str, count: usize, timeout: Duration) -> Vec<Value> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let frames = self.frames_of_type(event_type).await;
            if frames.len() >= count {
                return frames;
            }
            if tokio::time::Instant::now() >= deadline {
                panic!(
                    "expected {} '{}' frames, saw {:?}",
                    count,
                    event_type,
                    self.frames().await
                );
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    pub fn connection_count(&self) -> usize {
        self.state.gateway_connections.load(Ordering::SeqCst)
    }
}

pub fn conversation_json(id: i64, kind: &str, name: Option<&str>, participants: Value) -> Value {
    json!({
        "id": id,
        "type": kind,
        "name": name,
        "participants": participants,
        "createdAt": "2026-08-06T09:00:00Z",
        "updatedAt": "2026-08-06T09:00:00Z",
        "lastMessage": null,
        "lastMessageId": null,
        "unreadCount": 0,
        "onlineCount": 0,
    })
}

pub fn message_json(id: i64, conversation_id: i64, sender_id: i64, content: &str, created_at: &str) -> Value {
    json!({
        "id": id,
        "conversationId": conversation_id,
        "senderId": sender_id,
        "content": content,
        "type": "text",
        "createdAt": created_at,
        "isRead": false,
        "reactions": [],
    })
}

// ── REST handlers ──

fn unauthorized() -> (StatusCode, Json<Value>) {
    (
        StatusCode::UNAUTHORIZED,
        Json(json!({"error": "Invalid token"})),
    )
}

fn check_auth(headers: &axum::http::HeaderMap) -> bool {
    headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        == Some(TEST_TOKEN)
}

async fn list_conversations(
    State(state): State<Arc<MockState>>,
    headers: axum::http::HeaderMap,
) -> impl IntoResponse {
    if !check_auth(&headers) {
        return unauthorized().into_response();
    }
    Json(state.conversations.lock().await.clone()).into_response()
}

async fn search_conversations(
    State(state): State<Arc<MockState>>,
    headers: axum::http::HeaderMap,
    Query(params): Query<HashMap<String, String>>,
) -> impl IntoResponse {
    if !check_auth(&headers) {
        return unauthorized().into_response();
    }
    let q = params.get("q").cloned().unwrap_or_default().to_lowercase();
    let items: Vec<Value> = state
        .conversations
        .lock()
        .await
        .iter()
        .filter(|c| {
            c.get("name")
                .and_then(|n| n.as_str())
                .map(|n| n.to_lowercase().contains(&q))
                .unwrap_or(false)
        })
        .cloned()
        .collect();
    Json(items).into_response()
}

async fn create_conversation(
    State(state): State<Arc<MockState>>,
    headers: axum::http::HeaderMap,
    Json(body): Json<Value>,
) -> impl IntoResponse {
    if !check_auth(&headers) {
        return unauthorized().into_response();
    }
    let id = {
        let mut next = state.next_conversation_id.lock().await;
        *next += 1;
        *next
    };
    let conversation = json!({
        "id": id,
        "type": body.get("type").cloned().unwrap_or(json!("personal")),
        "name": body.get("name").cloned().unwrap_or(Value::Null),
        "participants": body
            .get("participantIds")
            .and_then(|ids| ids.as_array())
            .map(|ids| {
                ids.iter()
                    .map(|uid| json!({"id": uid, "name": format!("user-{}", uid)}))
                    .collect::<Vec<_>>()
            })
            .unwrap_or_default(),
        "createdAt": "2026-08-06T10:00:00Z",
        "updatedAt": "2026-08-06T10:00:00Z",
        "lastMessage": null,
        "lastMessageId": null,
        "unreadCount": 0,
        "onlineCount": 0,
    });
    state.conversations.lock().await.push(conversation.clone());
    Json(conversation).into_response()
}

async fn delete_conversation(
    State(state): State<Arc<MockState>>,
    headers: axum::http::HeaderMap,
    Path(conversation_id): Path<i64>,
) -> impl IntoResponse {
    if !check_auth(&headers) {
        return unauthorized().into_response();
    }
    state
        .conversations
        .lock()
        .await
        .retain(|c| c.get("id").and_then(|i| i.as_i64()) != Some(conversation_id));
    Json(json!({"ok": true})).into_response()
}

async fn update_settings(
    State(state): State<Arc<MockState>>,
    headers: axum::http::HeaderMap,
    Path(conversation_id): Path<i64>,
    Json(body): Json<Value>,
) -> impl IntoResponse {
    if !check_auth(&headers) {
        return unauthorized().into_response();
    }
    let mut conversations = state.conversations.lock().await;
    let Some(conversation) = conversations
        .iter_mut()
        .find(|c| c.get("id").and_then(|i| i.as_i64()) == Some(conversation_id))
    else {
        return (
            StatusCode::NOT_FOUND,
            Json(json!({"error": "Conversation not found"})),
        )
            .into_response();
    };
    if let Some(name) = body.get("name") {
        conversation["name"] = name.clone();
    }
    Json(conversation.clone()).into_response()
}

async fn list_messages(
    State(state): State<Arc<MockState>>,
    headers: axum::http::HeaderMap,
    Path(conversation_id): Path<i64>,
) -> impl IntoResponse {
    if !check_auth(&headers) {
        return unauthorized().into_response();
    }
    if state.fail_message_list.load(Ordering::SeqCst) {
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({"error": "Failed to load messages"})),
        )
            .into_response();
    }
    let messages = state.messages.lock().await;
    Json(messages.get(&conversation_id).cloned().unwrap_or_default()).into_response()
}

async fn create_message(
    State(state): State<Arc<MockState>>,
    headers: axum::http::HeaderMap,
    Path(conversation_id): Path<i64>,
    Json(body): Json<Value>,
) -> impl IntoResponse {
    if !check_auth(&headers) {
        return unauthorized().into_response();
    }
    if state.fail_message_create.load(Ordering::SeqCst) {
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({"error": "Failed to save message"})),
        )
            .into_response();
    }
    let id = {
        let mut next = state.next_message_id.lock().await;
        *next += 1;
        *next
    };
    let message = json!({
        "id": id,
        "conversationId": conversation_id,
        "senderId": TEST_USER_ID,
        "content": body.get("content").cloned().unwrap_or(json!("")),
        "type": body.get("type").cloned().unwrap_or(json!("text")),
        "createdAt": chrono_now(),
        "isRead": false,
        "reactions": [],
    });
    state
        .messages
        .lock()
        .await
        .entry(conversation_id)
        .or_default()
        .push(message.clone());
    Json(message).into_response()
}

async fn mark_read(
    State(_state): State<Arc<MockState>>,
    headers: axum::http::HeaderMap,
    Path(_conversation_id): Path<i64>,
) -> impl IntoResponse {
    if !check_auth(&headers) {
        return unauthorized().into_response();
    }
    Json(json!({"ok": true})).into_response()
}

async fn add_reaction(
    State(state): State<Arc<MockState>>,
    headers: axum::http::HeaderMap,
    Path(_message_id): Path<i64>,
    Json(_body): Json<Value>,
) -> impl IntoResponse {
    if !check_auth(&headers) {
        return unauthorized().into_response();
    }
    if state.fail_reactions.load(Ordering::SeqCst) {
        return (
            StatusCode::CONFLICT,
            Json(json!({"error": "Reaction rejected"})),
        )
            .into_response();
    }
    Json(json!({"ok": true})).into_response()
}

async fn remove_reaction(
    State(state): State<Arc<MockState>>,
    headers: axum::http::HeaderMap,
    Path(_message_id): Path<i64>,
    Json(_body): Json<Value>,
) -> impl IntoResponse {
    if !check_auth(&headers) {
        return unauthorized().into_response();
    }
    if state.fail_reactions.load(Ordering::SeqCst) {
        return (
            StatusCode::CONFLICT,
            Json(json!({"error": "Reaction rejected"})),
        )
            .into_response();
    }
    Json(json!({"ok": true})).into_response()
}

fn chrono_now() -> String {
    chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
}

// ── Gateway handler ──

async fn gateway(
    ws: WebSocketUpgrade,
    Query(params): Query<HashMap<String, String>>,
    State(state): State<Arc<MockState>>,
) -> impl IntoResponse {
    if params.get("token").map(|t| t.as_str()) != Some(TEST_TOKEN) {
        return StatusCode::UNAUTHORIZED.into_response();
    }
    ws.on_upgrade(move |socket| handle_gateway(socket, state))
        .into_response()
}

async fn handle_gateway(socket: WebSocket, state: Arc<MockState>) {
    state.gateway_connections.fetch_add(1, Ordering::SeqCst);

    let (push_tx, mut push_rx) = mpsc::unbounded_channel::<String>();
    let (kick_tx, mut kick_rx) = mpsc::unbounded_channel::<()>();
    *state.push_tx.lock().await = Some(push_tx);
    *state.kick_tx.lock().await = Some(kick_tx);

    let (mut ws_tx, mut ws_rx) = socket.split();
    loop {
        tokio::select! {
            Some(msg) = push_rx.recv() => {
                if ws_tx.send(WsFrame::Text(msg.into())).await.is_err() {
                    break;
                }
            }
            Some(()) = kick_rx.recv() => {
                break;
            }
            frame = ws_rx.next() => {
                match frame {
                    Some(Ok(WsFrame::Text(text))) => {
                        let text_str: &str = &text;
                        if let Ok(value) = serde_json::from_str::<Value>(text_str) {
                            state.client_frames.lock().await.push(value);
                        }
                    }
                    Some(Ok(WsFrame::Close(_))) | Some(Err(_)) | None => break,
                    _ => {}
                }
            }
        }
    }
}
