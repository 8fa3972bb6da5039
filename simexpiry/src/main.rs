// simexpiry - SIM card expiry reminders
// Entry point and application setup

use simexpiry::app;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "simexpiry=debug,info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting simexpiry");

    let (state, signals) = app::setup(app::data_dir_from_env()).await?;

    let outcome = state.reminders.on_host_restart().await?;
    tracing::info!("Next expiry check at {}", outcome.wake_up.fire_at);

    let reminders_loop = state.reminders.clone().start(signals);

    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutting down");

    state.shutdown().await?;
    reminders_loop.abort();

    Ok(())
}
