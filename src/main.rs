use anyhow::Context;
use dotenvy::dotenv;
use log::{error, info, warn};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

use ticketbot::catalog::ServiceCatalog;
use ticketbot::channels::discord::DiscordProvider;
use ticketbot::channels::gateway::DiscordGateway;
use ticketbot::channels::TicketGateway;
use ticketbot::core::config::AppConfig;
use ticketbot::main_module::{run_health_server, shutdown_signal};
use ticketbot::tickets::{LedgerStore, SystemClock, TicketLedger, TicketService};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .write_style(env_logger::WriteStyle::Always)
        .init();

    let config = AppConfig::from_env().context("Failed to load config from env")?;
    info!("Starting ticketbot {}", env!("CARGO_PKG_VERSION"));

    let ledger = TicketLedger::open(LedgerStore::new(config.storage.ticket_file.clone()));
    let catalog = ServiceCatalog::load(&config.storage.services_file);
    if catalog.is_empty() {
        warn!(
            "Service catalog {} is empty or missing",
            config.storage.services_file.display()
        );
    }

    let (events_tx, events_rx) = mpsc::unbounded_channel();
    let gateway: Arc<dyn TicketGateway> = Arc::new(DiscordProvider::new(&config.discord.token));
    let mut service = TicketService::new(
        ledger,
        gateway,
        Arc::new(SystemClock),
        catalog,
        config.tickets.clone(),
        events_tx.clone(),
    );
    service.start().await;

    let mut discord = DiscordGateway::new(config.discord.token.clone(), events_tx).spawn();

    let host = config.server.host.clone();
    let port = config.server.port;
    let http = tokio::spawn(async move {
        if let Err(e) = run_health_server(&host, port, shutdown_signal()).await {
            error!("Health server failed: {}", e);
        }
    });

    let result = tokio::select! {
        _ = service.run(events_rx) => {
            warn!("Ticket service stopped");
            Ok(())
        }
        _ = &mut discord => {
            error!("Discord gateway stopped, exiting");
            Err(anyhow::anyhow!("Discord gateway stopped"))
        }
        _ = shutdown_signal() => Ok(()),
    };

    discord.abort();
    if tokio::time::timeout(Duration::from_secs(5), http).await.is_err() {
        warn!("Health server did not stop in time");
    }
    info!("Shutdown complete");
    result
}
