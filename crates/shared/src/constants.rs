pub const APP_NAME: &str = "Cadence";

// Limits
pub const MAX_MESSAGE_LENGTH: usize = 4000;
pub const MAX_CONVERSATION_NAME_LENGTH: usize = 100;

pub const MESSAGE_PAGE_SIZE: i64 = 50;

// WebSocket
pub const WS_HANDSHAKE_TIMEOUT_MS: u64 = 10_000;
pub const WS_RECONNECT_MAX_ATTEMPTS: u32 = 5;
pub const WS_RECONNECT_BASE_DELAY_MS: u64 = 1_000;

// Typing indicator
pub const TYPING_STOP_DELAY_MS: u64 = 3_000;
pub const TYPING_EXPIRY_MS: u64 = 7_000;
