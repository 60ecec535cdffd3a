use std::sync::Arc;

use anyhow::{Context, Result};
use teloxide::prelude::*;
use tracing::info;
use tracing_subscriber::EnvFilter;

use order_intake::bot::{self, BotContext, CallbackRegistry, Collaborators, TelegramNotifier, UpdateRouter};
use order_intake::config::BotConfig;
use order_intake::db::{self, PgStore};
use order_intake::localization::init_localization;
use order_intake::session_store::SessionStore;

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let json = std::env::var("LOG_FORMAT").is_ok_and(|format| format.eq_ignore_ascii_case("json"));

    if json {
        tracing_subscriber::fmt().json().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from .env file
    dotenv::dotenv().ok();

    init_tracing();
    info!("Starting order intake bot");

    let config = BotConfig::from_env()?;
    init_localization(&config.default_language).context("Failed to load translations")?;
    CallbackRegistry::standard()
        .validate()
        .context("Invalid callback prefix table")?;

    info!(max_connections = config.db_max_connections, "Connecting to database");
    let pool = db::connect(&config.database_url, config.db_max_connections).await?;
    db::init_database_schema(&pool).await?;

    let store = Arc::new(PgStore::new(pool));
    let bot = Bot::new(config.telegram_token.clone());

    let services = Collaborators {
        directory: store.clone(),
        orders: store.clone(),
        reviews: store.clone(),
        referrals: store.clone(),
        stats: store,
        notifier: Arc::new(TelegramNotifier::new(bot.clone())),
    };

    let sessions = Arc::new(SessionStore::new());
    let _reaper = sessions.spawn_reaper(config.session.ttl, config.session.reap_interval);

    let router = Arc::new(UpdateRouter::new(BotContext::new(sessions, services, config)));

    info!("Bot initialized, starting dispatcher");

    let handler = dptree::entry()
        .branch(Update::filter_message().endpoint(bot::message_endpoint))
        .branch(Update::filter_callback_query().endpoint(bot::callback_endpoint));

    Dispatcher::builder(bot, handler)
        .dependencies(dptree::deps![router])
        .enable_ctrlc_handler()
        .build()
        .dispatch()
        .await;

    Ok(())
}
