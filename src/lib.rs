//! # Admit Card Telegram Bot
//!
//! A Telegram bot that takes a form number, fetches the matching admit card
//! PDF from the exam portal with a headless browser, reads the student
//! details out of it and sends both back to the user.

pub mod admit_card_model;
pub mod bot;
pub mod browser_session;
pub mod errors;
pub mod field_patterns;
pub mod health;
pub mod localization;
pub mod pdf;
pub mod pipeline;
pub mod retrieval_config;
pub mod retriever;
pub mod text_processing;
