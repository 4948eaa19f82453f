use bot_commons::*;

fn main() {
    // Before logging starts, so that RUST_LOG can come from there too.
    let dotenv_problem = file_store_bot::config::load_dotenv();

    start_everything("WARN,file_store_bot=info", async move {
        if let Some(e) = dotenv_problem {
            log::warn!("Failed to load the .env file: {e}");
        }
        file_store_bot::entry().await;
    });
}
