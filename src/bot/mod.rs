//! Bot module for handling Telegram interactions
//!
//! - `message_handler`: Handles incoming messages and drives the admit card pipeline
//! - `ui_builder`: Formats captions and help texts

pub mod message_handler;
pub mod ui_builder;

// Re-export main handler function for use in main.rs
pub use message_handler::message_handler;

pub use ui_builder::{format_caption, format_help, format_welcome};
