use std::env;
use std::time::Duration;

use url::Url;

use cadence_shared::constants::{
    MESSAGE_PAGE_SIZE, TYPING_EXPIRY_MS, TYPING_STOP_DELAY_MS, WS_HANDSHAKE_TIMEOUT_MS,
    WS_RECONNECT_BASE_DELAY_MS, WS_RECONNECT_MAX_ATTEMPTS,
};

#[derive(Clone)]
pub struct Config {
    pub api_base_url: Url,
    pub gateway_url: Url,
    pub handshake_timeout: Duration,
    pub reconnect_max_attempts: u32,
    pub reconnect_base_delay: Duration,
    pub typing_stop_delay: Duration,
    pub typing_expiry: Duration,
    pub message_page_size: i64,
}

impl Config {
    pub fn from_env() -> Self {
        // Load .env if present
        dotenvy::dotenv().ok();

        Self {
            api_base_url: env::var("API_BASE_URL")
                .unwrap_or_else(|_| "http://localhost:3001".into())
                .parse()
                .expect("API_BASE_URL must be a valid URL"),
            gateway_url: env::var("GATEWAY_URL")
                .unwrap_or_else(|_| "ws://localhost:3001/gateway".into())
                .parse()
                .expect("GATEWAY_URL must be a valid URL"),
            handshake_timeout: Duration::from_millis(
                env::var("WS_HANDSHAKE_TIMEOUT_MS")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(WS_HANDSHAKE_TIMEOUT_MS),
            ),
            reconnect_max_attempts: env::var("WS_RECONNECT_MAX_ATTEMPTS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(WS_RECONNECT_MAX_ATTEMPTS),
            reconnect_base_delay: Duration::from_millis(
                env::var("WS_RECONNECT_BASE_DELAY_MS")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(WS_RECONNECT_BASE_DELAY_MS),
            ),
            typing_stop_delay: Duration::from_millis(TYPING_STOP_DELAY_MS),
            typing_expiry: Duration::from_millis(TYPING_EXPIRY_MS),
            message_page_size: MESSAGE_PAGE_SIZE,
        }
    }
}
