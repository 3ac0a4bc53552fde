//! Turnstile notification delivery worker.
//!
//! Drains the notification topic and sends emails through the configured
//! SMTP relay. Runs until Ctrl+C.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use turnstile_worker::{DeliveryWorker, SmtpMailer, WorkerConfig};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,turnstile_worker=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = WorkerConfig::from_env();
    tracing::info!(
        brokers = %config.broker.brokers,
        topic = %config.broker.topic,
        smtp_host = %config.smtp.host,
        "Configuration loaded"
    );

    let mailer = SmtpMailer::new(&config.smtp);
    let worker = DeliveryWorker::new(config, mailer);

    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Ctrl+C received, shutting down");
            let _ = shutdown_tx.send(true);
        }
    });

    worker.run(shutdown_rx).await?;

    tracing::info!("Delivery worker stopped");
    Ok(())
}
