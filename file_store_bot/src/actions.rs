use std::time::Duration;

use bot_commons::is_member_of;
use teloxide::{
    payloads::SendMessageSetters,
    prelude::*,
    types::{InlineKeyboardButton, InlineKeyboardMarkup, Me, User},
    RequestError,
};
use url::Url;

use crate::{
    config::Config,
    database::{self, Database},
    expiry::{ExpiryScheduler, MessagingEndpoint},
    misc::describe_delay,
    types::{MessageLocation, ShareKey},
    CLOSE_CALLBACK_DATA,
};

#[derive(Debug, thiserror::Error)]
enum StoreFileError {
    #[error("could not copy the file to the storage channel: {0}")]
    Copying(#[from] RequestError),
    #[error("could not save the file: {0}")]
    Database(#[from] database::Error),
    #[error("could not make a link to the file: {0}")]
    Link(#[from] url::ParseError),
}

/// Keyboard with a single button that deletes the message it's attached to.
#[must_use]
pub fn close_keyboard() -> InlineKeyboardMarkup {
    InlineKeyboardMarkup::new(vec![vec![InlineKeyboardButton::callback(
        "CLOSE",
        CLOSE_CALLBACK_DATA,
    )]])
}

/// Keyboard leading to the main channel, if we know a link to it.
#[must_use]
pub fn join_keyboard(config: &Config, with_close: bool) -> InlineKeyboardMarkup {
    let mut rows = Vec::new();
    if let Some(link) = &config.join_link {
        rows.push(vec![InlineKeyboardButton::url("JOIN CHANNEL", link.clone())]);
    }
    if with_close {
        rows.push(vec![InlineKeyboardButton::callback(
            "CLOSE",
            CLOSE_CALLBACK_DATA,
        )]);
    }
    InlineKeyboardMarkup::new(rows)
}

fn first_name(user: Option<&User>) -> &str {
    user.map_or("there", |user| user.first_name.as_str())
}

/// How long users currently get to keep their copy of a file.
/// An admin's choice wins over the configured default.
pub async fn effective_auto_delete(config: &Config, database: &Database) -> Option<Duration> {
    match database.get_auto_delete().await {
        Ok(Some(delay)) => delay,
        Ok(None) => config.default_auto_delete,
        Err(e) => {
            log::error!("Failed to read the auto-delete setting, using the default: {e}");
            config.default_auto_delete
        }
    }
}

/// Greet someone who sent `/start` without a file key.
pub async fn greet(bot: &Bot, config: &Config, message: &Message) -> Result<(), RequestError> {
    bot.send_message(
        message.chat.id,
        format!(
            concat!(
                "Hello 👋, {}\n\n",
                "You need to join in my Channel/Group to use me\n\n",
                "Kindly Please join Channel 👇"
            ),
            first_name(message.from.as_ref())
        ),
    )
    .reply_markup(join_keyboard(config, false))
    .await?;
    Ok(())
}

/// Copy the file in this message into the storage channel and remember it.
/// Returns the deep link to it.
async fn store_file(
    bot: &Bot,
    me: &Me,
    config: &Config,
    database: &Database,
    message: &Message,
    uploader: UserId,
) -> Result<Url, StoreFileError> {
    let stored = bot
        .send_copy(MessageLocation::of(message), config.storage_channel)
        .await?;

    let key = ShareKey::generate();
    database
        .save_file(&key, stored, Some(uploader), message.caption())
        .await?;

    log::info!("Stored {} from {} as {}", stored, uploader, key);

    Ok(key.deep_link(me.username())?)
}

/// Handle an admin sending a file to the bot.
pub async fn handle_upload(
    bot: &Bot,
    me: &Me,
    config: &Config,
    database: &Database,
    message: &Message,
) -> Result<(), RequestError> {
    let Some(uploader) = message.from.as_ref() else {
        return Ok(());
    };

    if !config.is_admin(uploader.id) {
        log::info!("Non-admin {} tried to upload a file.", uploader.id);
        bot.send_message(message.chat.id, "You are not authorized to upload files.")
            .await?;
        return Ok(());
    }

    let text = match store_file(bot, me, config, database, message, uploader.id).await {
        Ok(link) => format!(
            concat!(
                "File saved successfully.\n\n",
                "Share this link with users:\n{}\n\n",
                "Note: users must join the main channel to access the file."
            ),
            link
        ),
        Err(e) => {
            log::error!("Error saving file from {}: {e}", uploader.id);
            concat!(
                "Failed to save file. Make sure the bot is admin ",
                "of the private channel and can post there."
            )
            .to_string()
        }
    };

    bot.send_message(message.chat.id, text).await?;
    Ok(())
}

/// Handle someone opening a deep link, i.e. sending `/start <key>`.
pub async fn serve_file(
    bot: &Bot,
    config: &Config,
    database: &Database,
    scheduler: &ExpiryScheduler<Bot>,
    message: &Message,
    key: &str,
) -> Result<(), RequestError> {
    let Some(user) = message.from.as_ref() else {
        return Ok(());
    };

    let joined = match is_member_of(bot, user.id, config.main_channel.clone()).await {
        Ok(joined) => joined,
        Err(e) => {
            // Probably not an admin in the main channel.
            log::warn!("Failed to check if {} is in the main channel: {e}", user.id);
            false
        }
    };

    if !joined {
        bot.send_message(
            message.chat.id,
            format!(
                concat!(
                    "Hello 👋, {}\n\n",
                    "You need to join my Channel/Group to use me.\n\n",
                    "Kindly please join the channel and then open this link again."
                ),
                first_name(Some(user))
            ),
        )
        .reply_markup(join_keyboard(config, true))
        .await?;
        return Ok(());
    }

    let file = match ShareKey::parse(key) {
        Some(key) => match database.get_file(&key).await {
            Ok(file) => file,
            Err(e) => {
                log::error!("Failed to look up {key}: {e}");
                bot.send_message(message.chat.id, "Failed to deliver the file. Contact admin.")
                    .reply_markup(close_keyboard())
                    .await?;
                return Ok(());
            }
        },
        None => None,
    };

    let Some(file) = file else {
        bot.send_message(
            message.chat.id,
            "Sorry, the file link is invalid or has expired.",
        )
        .reply_markup(close_keyboard())
        .await?;
        return Ok(());
    };

    let copy = match bot.send_copy(file.location, message.chat.id).await {
        Ok(copy) => copy,
        Err(e) => {
            log::error!("Failed to copy {} to {}: {e}", file.key, user.id);
            bot.send_message(message.chat.id, "Failed to deliver the file. Contact admin.")
                .reply_markup(close_keyboard())
                .await?;
            return Ok(());
        }
    };

    log::info!("Served {} to {}", file.key, user.id);

    let auto_delete = effective_auto_delete(config, database).await;

    let text = match auto_delete {
        Some(delay) => format!(
            concat!(
                "Here is your file. It will be deleted in {}, ",
                "so save it somewhere if you need it.\n\n",
                "(This message will be deleted if you press CLOSE)"
            ),
            describe_delay(delay)
        ),
        None => "Here is your file. (Message will be deleted if you press CLOSE)".to_string(),
    };

    let notice = bot
        .send_message(message.chat.id, text)
        .reply_markup(close_keyboard())
        .await?;

    if let Some(delay) = auto_delete {
        for location in [copy, MessageLocation::of(&notice)] {
            // The user just keeps the message if this fails. Oh well.
            if let Err(e) = scheduler.schedule_after(location, delay).await {
                log::error!("Failed to schedule deletion of {location}: {e}");
            }
        }
    }

    Ok(())
}
