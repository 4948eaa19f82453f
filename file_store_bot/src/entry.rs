use std::sync::Arc;
use teloxide::{dptree::deps, prelude::*};

use crate::{
    config::Config,
    database::Database,
    expiry::ExpiryScheduler,
    handlers::{commands::generate_bot_commands, handle_callback_query, handle_message},
};

/// # Panics
///
/// Panics if the config is incomplete or the database can't be opened.
pub async fn entry() {
    let config = Arc::new(Config::from_env().expect("Could not load the config!"));

    let bot = Bot::new(&config.bot_token);

    if let Err(e) = bot.set_my_commands(generate_bot_commands()).await {
        log::warn!("Failed to set bot commands: {e}");
    }

    let database = Arc::new(
        Database::open(&config.database_path)
            .await
            .expect("Failed to open the database!"),
    );

    // Has to happen before anything new gets scheduled.
    let scheduler = Arc::new(ExpiryScheduler::new(database.clone(), bot.clone()));
    let recovered = scheduler.recover().await;
    log::info!("Recovered {recovered} pending deletions.");

    log::info!("Creating the handler...");

    let handler = dptree::entry()
        .branch(Update::filter_message().endpoint(handle_message))
        .branch(Update::filter_callback_query().endpoint(handle_callback_query));

    log::info!("Dispatching the dispatcher!");

    Dispatcher::builder(bot, handler)
        .default_handler(|_| async {})
        .dependencies(deps![config, database.clone(), scheduler])
        .enable_ctrlc_handler()
        .build()
        .dispatch()
        .await;

    log::info!("Shutting down.");

    database.close().await;
}
