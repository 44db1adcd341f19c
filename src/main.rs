use std::sync::Arc;

use anyhow::{Context, Result};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use clinic_directory_bot::config::BotConfig;
use clinic_directory_bot::context::BotContext;
use clinic_directory_bot::directory::DirectoryStore;
use clinic_directory_bot::fallback::{install_panic_hook, FallbackHandler};
use clinic_directory_bot::health;
use clinic_directory_bot::localization::init_localization;
use clinic_directory_bot::resilience::{signal_channel, ResilienceController};
use clinic_directory_bot::telegram::TelegramConnector;

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let json = std::env::var("LOG_FORMAT").is_ok_and(|format| format == "json");

    if json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

/// Cancel `shutdown` on Ctrl+C or SIGTERM
async fn wait_for_signal(shutdown: CancellationToken) {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut terminate) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => info!("Received SIGINT"),
                    _ = terminate.recv() => info!("Received SIGTERM"),
                }
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                let _ = tokio::signal::ctrl_c().await;
                info!("Received SIGINT");
            }
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
        info!("Received Ctrl+C");
    }

    shutdown.cancel();
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from .env file
    dotenv::dotenv().ok();

    init_tracing();
    info!("Starting Clinic Directory Bot");

    init_localization().context("Failed to load locales")?;

    let config = BotConfig::from_env()?;

    let directory = DirectoryStore::load(&config.clinics_path, &config.districts_path)
        .context("Failed to load directory data")?;
    info!(
        clinics = directory.clinics().len(),
        districts = directory.districts().len(),
        "Directory loaded"
    );

    let ctx = Arc::new(BotContext::new(
        directory,
        config.admin_id,
        config.retry.clone(),
    ));

    let shutdown = CancellationToken::new();
    let (signals_tx, signals_rx) = signal_channel();

    let fallback = Arc::new(FallbackHandler::new(
        signals_tx.clone(),
        config.resilience.fallback_debounce,
    ));
    install_panic_hook(Arc::clone(&fallback));

    let health_shutdown = shutdown.clone();
    let port = config.port;
    tokio::spawn(async move {
        if let Err(e) = health::serve(port, health_shutdown).await {
            error!(error = %e, "Health endpoint stopped");
        }
    });

    tokio::spawn(wait_for_signal(shutdown.clone()));

    let connector = TelegramConnector::new(
        config.bot_token.clone(),
        config.resilience.clone(),
        ctx,
        fallback,
    );
    let mut controller = ResilienceController::new(
        connector,
        config.resilience,
        signals_tx,
        signals_rx,
        shutdown,
    );

    controller.run().await;

    info!("Bot stopped");
    Ok(())
}
