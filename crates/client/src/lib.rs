pub mod commands;
pub mod config;
pub mod error;
pub mod models;
pub mod rest;
pub mod store;
pub mod view;
pub mod ws;

pub use commands::ChatClient;
pub use config::Config;
pub use error::{ApiError, Error};
pub use store::{ChatStore, MessageSource};
pub use ws::{ConnectionState, Transport};
