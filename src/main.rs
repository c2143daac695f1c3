use dotenvy::dotenv;
use gemini_scout::bot::handlers::{handle_message, is_routable, Command};
use gemini_scout::bot::Router;
use gemini_scout::config::Settings;
use gemini_scout::llm::providers::GeminiProvider;
use gemini_scout::logging::init_logging;
use gemini_scout::search::build_search_provider;
use gemini_scout::storage::{HistoryLog, MemoryStorage, R2Storage, SessionStore};
use std::sync::Arc;
use teloxide::dispatching::UpdateHandler;
use teloxide::prelude::*;
use teloxide::utils::command::BotCommands;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load .env file
    dotenv().ok();

    init_logging();

    info!("Starting Gemini Scout bot...");

    let settings = init_settings();
    let (sessions, history) = init_storage(&settings).await;

    let responder = match GeminiProvider::from_settings(&settings) {
        Ok(p) => Arc::new(p),
        Err(e) => {
            error!("Failed to initialize Gemini provider: {}", e);
            std::process::exit(1);
        }
    };
    info!(
        chat_model = %settings.gemini_chat_model,
        vision_model = %settings.gemini_vision_model,
        "Gemini provider initialized."
    );

    let search = match build_search_provider(&settings) {
        Ok(p) => p,
        Err(e) => {
            error!("Failed to initialize search provider: {}", e);
            std::process::exit(1);
        }
    };
    info!("Search provider initialized: {}", search.name());

    let router = Arc::new(
        Router::new(sessions, history, responder, search)
            .with_policy(settings.registration_policy())
            .with_timeout(settings.provider_timeout()),
    );
    info!(
        policy = ?router.policy(),
        timeout_secs = settings.provider_timeout_secs,
        "Router ready."
    );

    let bot = Bot::new(settings.telegram_token.clone());
    if let Err(e) = bot.set_my_commands(Command::bot_commands()).await {
        warn!("Failed to publish command list: {}", e);
    }

    info!("Bot is running...");

    Dispatcher::builder(bot, setup_handler())
        .dependencies(dptree::deps![router])
        .enable_ctrlc_handler()
        .build()
        .dispatch()
        .await;

    Ok(())
}

fn init_settings() -> Settings {
    match Settings::new() {
        Ok(s) => {
            info!("Configuration loaded successfully.");
            s
        }
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    }
}

async fn init_storage(settings: &Settings) -> (Arc<dyn SessionStore>, Arc<dyn HistoryLog>) {
    if !settings.has_r2_credentials() {
        warn!("R2 credentials not set, using in-memory storage. Data is lost on restart.");
        let memory = Arc::new(MemoryStorage::new());
        return (memory.clone(), memory);
    }

    match R2Storage::new(settings).await {
        Ok(s) => {
            info!("R2 Storage initialized.");
            if let Err(e) = s.check_connection().await {
                error!("R2 Storage connection check returned error: {}", e);
            }
            let storage = Arc::new(s);
            (storage.clone(), storage)
        }
        Err(e) => {
            error!("Failed to initialize R2 Storage: {}", e);
            std::process::exit(1);
        }
    }
}

fn setup_handler() -> UpdateHandler<teloxide::RequestError> {
    Update::filter_message()
        .filter(|msg: Message| is_routable(&msg))
        .endpoint(handle_update)
}

async fn handle_update(
    bot: Bot,
    msg: Message,
    router: Arc<Router>,
) -> Result<(), teloxide::RequestError> {
    if let Err(e) = handle_message(bot, msg, router).await {
        error!("Message handler error: {}", e);
    }
    respond(())
}
