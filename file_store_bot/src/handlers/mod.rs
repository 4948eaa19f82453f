pub mod commands;

use std::sync::Arc;

use bot_commons::useful_methods::MessageStuff;
use teloxide::{
    prelude::*,
    types::{CallbackQuery, Me},
    RequestError,
};

use crate::{
    actions::{self, effective_auto_delete},
    config::Config,
    database::Database,
    expiry::ExpiryScheduler,
    misc::{describe_delay, parse_auto_delete},
    types::ShareKey,
    CLOSE_CALLBACK_DATA,
};

use self::commands::HELP_TEXT;

pub async fn handle_message(
    bot: Bot,
    me: Me,
    message: Message,
    config: Arc<Config>,
    database: Arc<Database>,
    scheduler: Arc<ExpiryScheduler<Bot>>,
) -> Result<(), RequestError> {
    // Everything happens in DMs.
    if !message.chat.is_private() {
        return Ok(());
    }

    if let Some((command, params)) = message.command_and_params(me.username()) {
        return handle_command(
            &bot, &config, &database, &scheduler, &message, &command, params,
        )
        .await;
    }

    if let Some(media) = message.storable_media() {
        log::debug!("Got {media:?} in chat {}", message.chat.id);
        return actions::handle_upload(&bot, &me, &config, &database, &message).await;
    }

    Ok(())
}

async fn handle_command(
    bot: &Bot,
    config: &Config,
    database: &Database,
    scheduler: &ExpiryScheduler<Bot>,
    message: &Message,
    command: &str,
    params: &str,
) -> Result<(), RequestError> {
    match command {
        "/start" => match requested_file(params) {
            Some(key) => actions::serve_file(bot, config, database, scheduler, message, key).await,
            None => actions::greet(bot, config, message).await,
        },
        "/help" => {
            bot.send_message(message.chat.id, HELP_TEXT).await?;
            Ok(())
        }
        "/autodelete" => handle_auto_delete_command(bot, config, database, message, params).await,
        _ => {
            bot.send_message(message.chat.id, "Unknown command. Use /help.")
                .await?;
            Ok(())
        }
    }
}

/// The file key a `/start` payload asks for, if it asks for a file at all.
/// Anything else just gets a greeting.
fn requested_file(params: &str) -> Option<&str> {
    params
        .split_whitespace()
        .next()
        .filter(|payload| ShareKey::is_claimed_by(payload))
}

/// `/autodelete` shows the delay, `/autodelete <secs>` sets it, `/autodelete off` disables it.
async fn handle_auto_delete_command(
    bot: &Bot,
    config: &Config,
    database: &Database,
    message: &Message,
    params: &str,
) -> Result<(), RequestError> {
    let is_admin = message
        .from
        .as_ref()
        .is_some_and(|user| config.is_admin(user.id));

    if !is_admin {
        bot.send_message(message.chat.id, "You are not authorized to change settings.")
            .await?;
        return Ok(());
    }

    let text = if params.is_empty() {
        match effective_auto_delete(config, database).await {
            Some(delay) => format!(
                "Files sent to users are deleted {} after sending.",
                describe_delay(delay)
            ),
            None => "Files sent to users are not deleted automatically.".to_string(),
        }
    } else {
        match parse_auto_delete(params) {
            None => concat!(
                "Usage: /autodelete <seconds>, or /autodelete off to disable.\n",
                "The delay can be at most a year."
            )
            .to_string(),
            Some(delay) => match database.set_auto_delete(delay).await {
                Ok(()) => {
                    log::info!("Auto-delete delay set to {delay:?}");
                    match delay {
                        Some(delay) => format!(
                            "Files sent to users will now be deleted {} after sending.",
                            describe_delay(delay)
                        ),
                        None => "Files sent to users will no longer be deleted automatically."
                            .to_string(),
                    }
                }
                Err(e) => {
                    log::error!("Failed to save the auto-delete setting: {e}");
                    "Failed to save the setting. Please try again later.".to_string()
                }
            },
        }
    };

    bot.send_message(message.chat.id, text).await?;
    Ok(())
}

/// Only the CLOSE button exists, which deletes the message it's on.
pub async fn handle_callback_query(bot: Bot, query: CallbackQuery) -> Result<(), RequestError> {
    if query.data.as_deref() == Some(CLOSE_CALLBACK_DATA) {
        if let Some(message) = query.regular_message() {
            if let Err(e) = bot.delete_message(message.chat.id, message.id).await {
                log::warn!("Could not delete message: {e}");
            }
        }
    }

    bot.answer_callback_query(query.id).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn start_payloads() {
        let key = ShareKey::generate();
        assert_eq!(requested_file(key.as_str()), Some(key.as_str()));
        // Malformed keys still go to the file lookup, which reports them as invalid.
        assert_eq!(requested_file("file_nope"), Some("file_nope"));
        assert_eq!(requested_file(""), None);
        assert_eq!(requested_file("ref_12345"), None);
        assert_eq!(requested_file("hello file_abc"), None);
    }
}
