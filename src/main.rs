use std::sync::Arc;

use tokio::net::TcpListener;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use whereabouts::error::Result;
use whereabouts::notify::WebhookNotifier;
use whereabouts::server;
use whereabouts::settings::Settings;
use whereabouts::tracker::Tracker;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| "info,tower_http=debug".into()),
        )
        .init();

    serve().await.inspect_err(|e| error!(error = %e, "whereabouts stopped"))
}

async fn serve() -> Result<()> {
    let settings = Settings::load()?;
    let notifier = Arc::new(WebhookNotifier::from_settings(&settings)?);
    let tracker = Tracker::open(
        &settings.persistence(),
        notifier,
        settings.round(),
        settings.lock_timeout(),
    )?;
    for assignment in &settings.devices {
        tracker.assign_device(&assignment.device, &assignment.room).await?;
        info!(device = %assignment.device, room = %assignment.room, "device assigned");
    }

    let listener = TcpListener::bind(("0.0.0.0", settings.port)).await?;
    info!(
        port = settings.port,
        rooms = settings.room_count,
        database = %settings.database_url,
        "listening"
    );
    axum::serve(listener, server::router(Arc::new(tracker))).await?;
    Ok(())
}
