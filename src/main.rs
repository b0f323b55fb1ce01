use anyhow::{Context, Result};
use std::net::SocketAddr;
use std::sync::Arc;
use teloxide::prelude::*;
use tracing::info;
use tracing_subscriber::EnvFilter;

use admit_card_bot::bot;
use admit_card_bot::browser_session::BrowserSession;
use admit_card_bot::health::HealthServer;
use admit_card_bot::localization::init_localization_with_default;
use admit_card_bot::pipeline::AdmitCardService;
use admit_card_bot::retrieval_config::AppConfig;
use admit_card_bot::retriever::PortalRetriever;

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let json = std::env::var("LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from .env file
    dotenv::dotenv().ok();

    // Initialize logging
    init_tracing();

    info!("Starting Admit Card Telegram Bot");

    let config = AppConfig::from_env().context("Invalid configuration")?;

    init_localization_with_default(&config.default_language)?;

    // The hosting platform only checks that something answers on $PORT
    let health_addr = SocketAddr::from(([0, 0, 0, 0], config.health_port));
    let _health = HealthServer::start(health_addr)
        .with_context(|| format!("Failed to bind health check port {}", config.health_port))?;

    // Launched on the first request, closed after the dispatcher stops
    let session = Arc::new(BrowserSession::new(config.retrieval.chrome_path.clone()));
    let retriever = PortalRetriever::new(Arc::clone(&session), config.retrieval.clone());
    let service = Arc::new(AdmitCardService::new(
        retriever,
        config.retrieval.download_dir.clone(),
    ));

    info!(
        portal = %config.retrieval.portal_url,
        download_dir = %config.retrieval.download_dir.display(),
        "Admit card pipeline configured"
    );

    // Initialize the bot
    let bot = Bot::new(config.bot_token);

    info!("Bot initialized, starting dispatcher");

    let handler = dptree::entry().branch(Update::filter_message().endpoint({
        let service = Arc::clone(&service);
        move |bot: Bot, msg: Message| {
            let service = Arc::clone(&service);
            async move { bot::message_handler(bot, msg, service).await }
        }
    }));

    Dispatcher::builder(bot, handler)
        .enable_ctrlc_handler()
        .build()
        .dispatch()
        .await;

    session.shutdown().await;
    info!("Admit Card Telegram Bot stopped");

    Ok(())
}
