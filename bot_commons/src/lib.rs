//! Stuff shared between bots in this workspace: process startup,
//! and a couple of helpers over teloxide that would otherwise be copypasted.

use std::future::Future;

use teloxide::{prelude::*, types::Recipient, RequestError};

pub mod useful_methods;

/// Initialize logging and start the `closure` in an async runtime.
///
/// Logging uses `default_filter` unless overridden by environment
/// variable `RUST_LOG`. This uses the crate [pretty_env_logger][]
/// internally, see its documentation for the filter syntax.
///
/// Timestamps are left out when running as a systemd service,
/// since journald adds its own.
///
/// [pretty_env_logger]: https://docs.rs/pretty_env_logger
///
/// # Panics
///
/// Panics if the tokio runtime could not be built.
pub fn start_everything(default_filter: &str, closure: impl Future<Output = ()>) {
    let log_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| default_filter.to_string());

    let running_as_systemd_service = std::env::var_os("JOURNAL_STREAM").is_some();

    let mut builder = match running_as_systemd_service {
        true => pretty_env_logger::formatted_builder(),
        false => pretty_env_logger::formatted_timed_builder(),
    };

    builder.parse_filters(&log_filter);

    if builder.try_init().is_err() {
        log::error!("Tried to init logger twice!");
    }

    log::info!("Starting up with log filter \"{log_filter}\"");

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .expect("Failed to build the tokio runtime!")
        .block_on(closure);
}

/// Find out if a user of this ID is currently a member of the specified chat,
/// be it a channel or a group. Owners, admins, regular and restricted
/// members count; users that left or were banned don't.
///
/// The bot must be able to see the member list of the chat for this to work,
/// which for channels means being an admin there.
pub async fn is_member_of(
    bot: &Bot,
    user: UserId,
    chat: impl Into<Recipient>,
) -> Result<bool, RequestError> {
    Ok(bot.get_chat_member(chat, user).await?.is_present())
}
