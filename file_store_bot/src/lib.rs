//! Source code for the File Store Bot.
//!
//! Admins upload media to the bot, which keeps it in a private storage channel
//! and hands out deep links. Users opening a link get a copy of the file if they
//! are in the main channel, and that copy is deleted again after a while.

/// Configuration loaded from the environment.
pub mod config;

/// Various types used throughout.
pub mod types;

/// The database.
pub mod database;

/// Deferred deletion of delivered messages.
pub mod expiry;

/// Miscellaneous functions.
mod misc;

/// Functions that perform stuff via the bot.
mod actions;

/// Functions that handle events from Telegram.
mod handlers;

/// Entry function that starts the bot.
mod entry;
pub use entry::*;

/// Callback data of the button that deletes the message it's attached to.
const CLOSE_CALLBACK_DATA: &str = "close_msg";
