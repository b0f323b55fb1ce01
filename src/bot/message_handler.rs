//! Message Handler module for processing incoming Telegram messages

use anyhow::Result;
use std::sync::Arc;
use teloxide::prelude::*;
use teloxide::types::{InputFile, ParseMode};
use tracing::{debug, error, info, warn};

// Import localization
use crate::localization::t_lang;

// Import pipeline types
use crate::admit_card_model::{AdmitCard, FormNumber};
use crate::errors::AdmitCardError;
use crate::pipeline::{AdmitCardService, AdmitCardSource};

// Import UI builder functions
use super::ui_builder::{format_caption, format_help, format_welcome};

/// What to do with a text message
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TextCommand {
    Start,
    Help,
    Lookup(FormNumber),
    Invalid,
}

impl TextCommand {
    pub fn parse(text: &str) -> Self {
        let trimmed = text.trim();
        // "/start@SomeBot" in group chats
        let command = trimmed.split('@').next().unwrap_or(trimmed);
        match command {
            "/start" => TextCommand::Start,
            "/help" => TextCommand::Help,
            _ => match FormNumber::parse(trimmed) {
                Ok(form_number) => TextCommand::Lookup(form_number),
                Err(_) => TextCommand::Invalid,
            },
        }
    }
}

/// Send the admit card with its caption
async fn deliver_admit_card(
    bot: &Bot,
    chat_id: ChatId,
    card: &AdmitCard,
    language_code: Option<&str>,
) -> Result<(), AdmitCardError> {
    let caption = format_caption(&card.form_number, &card.record, language_code);
    let document = InputFile::file(card.document.path().to_path_buf()).file_name(card.document.file_name());

    bot.send_document(chat_id, document)
        .caption(caption)
        .parse_mode(ParseMode::MarkdownV2)
        .await
        .map_err(|e| AdmitCardError::DeliveryFailed(e.to_string()))?;
    Ok(())
}

async fn handle_form_number<S: AdmitCardSource>(
    bot: &Bot,
    msg: &Message,
    service: &AdmitCardService<S>,
    form_number: FormNumber,
    language_code: Option<&str>,
) -> Result<()> {
    let chat_id = msg.chat.id;
    info!(user_id = %chat_id, %form_number, "Admit card requested");

    let status = bot
        .send_message(chat_id, t_lang("status-searching", language_code))
        .await?;

    let outcome = match service.retrieve(&form_number).await {
        Ok(card) => {
            let delivered = deliver_admit_card(bot, chat_id, &card, language_code).await;
            // The document is removed here, delivered or not
            drop(card);
            delivered
        }
        Err(e) => Err(e),
    };

    match outcome {
        Ok(()) => {
            info!(user_id = %chat_id, %form_number, "Admit card delivered");
            if let Err(e) = bot.delete_message(chat_id, status.id).await {
                debug!(user_id = %chat_id, error = %e, "Could not remove status message");
            }
        }
        Err(e) => {
            match &e {
                AdmitCardError::DeliveryFailed(_) => {
                    error!(user_id = %chat_id, %form_number, error = %e, "Admit card delivery failed")
                }
                _ => warn!(user_id = %chat_id, %form_number, error = %e, "Admit card request failed"),
            }
            bot.edit_message_text(chat_id, status.id, t_lang(e.user_message_key(), language_code))
                .await?;
        }
    }
    Ok(())
}

async fn handle_text_message<S: AdmitCardSource>(
    bot: &Bot,
    msg: &Message,
    service: &AdmitCardService<S>,
    text: &str,
) -> Result<()> {
    debug!(user_id = %msg.chat.id, message_length = text.len(), "Received text message from user");

    // Extract user's language code from Telegram
    let language_code = msg
        .from
        .as_ref()
        .and_then(|user| user.language_code.as_ref())
        .map(|s| s.as_str());

    match TextCommand::parse(text) {
        TextCommand::Start => {
            bot.send_message(msg.chat.id, format_welcome(language_code)).await?;
        }
        TextCommand::Help => {
            bot.send_message(msg.chat.id, format_help(language_code)).await?;
        }
        TextCommand::Invalid => {
            debug!(user_id = %msg.chat.id, "Rejected non-numeric form number");
            bot.send_message(msg.chat.id, t_lang("error-input-invalid", language_code))
                .await?;
        }
        TextCommand::Lookup(form_number) => {
            handle_form_number(bot, msg, service, form_number, language_code).await?;
        }
    }
    Ok(())
}

async fn handle_unsupported_message(bot: &Bot, msg: &Message) -> Result<()> {
    let language_code = msg
        .from
        .as_ref()
        .and_then(|user| user.language_code.as_ref())
        .map(|s| s.as_str());

    debug!(user_id = %msg.chat.id, "Received unsupported message type from user");
    bot.send_message(msg.chat.id, t_lang("unsupported-message", language_code))
        .await?;
    Ok(())
}

pub async fn message_handler<S: AdmitCardSource>(
    bot: Bot,
    msg: Message,
    service: Arc<AdmitCardService<S>>,
) -> Result<()> {
    if let Some(text) = msg.text() {
        handle_text_message(&bot, &msg, &service, text).await?;
    } else {
        handle_unsupported_message(&bot, &msg).await?;
    }

    Ok(())
}
