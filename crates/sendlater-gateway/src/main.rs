use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tracing::info;

mod app;
mod client;
mod http;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "sendlater_gateway=info,tower_http=debug".into()),
        )
        .init();

    // load config: explicit path > SENDLATER_CONFIG env > ~/.sendlater/sendlater.toml
    let config_path = std::env::var("SENDLATER_CONFIG").ok();
    let config = sendlater_core::config::SendlaterConfig::load(config_path.as_deref())
        .map_err(|e| anyhow::anyhow!("config load failed: {e}"))?;

    let bind = config.gateway.bind.clone();
    let port = config.gateway.port;

    // initialize SQLite database
    let db_path = &config.database.path;
    ensure_parent_dir(db_path);
    info!(path = %db_path, "opening SQLite database");

    let db = rusqlite::Connection::open(db_path)?;
    db.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")?;
    sendlater_store::db::init_db(&db)?;
    info!("database migrations complete");

    // platform REST client — shared by the request path and delivery
    let platform = Arc::new(client::PlatformClient::new(&config.platform));

    // the handler and the engine each get their own store handle so the
    // request path never contends with the engine's sweep on one connection
    let handler_store = Arc::new(sendlater_store::ScheduleStore::new(
        rusqlite::Connection::open(db_path)?,
    )?);
    let engine_store = Arc::new(sendlater_store::ScheduleStore::new(
        rusqlite::Connection::open(db_path)?,
    )?);

    // Early-wake signal: handlers poke this after insert/cancel so the
    // engine re-derives its next due instant.
    let wake = Arc::new(tokio::sync::Notify::new());

    let handler = sendlater_command::CommandHandler::new(
        Arc::clone(&handler_store),
        Arc::clone(&platform) as Arc<dyn sendlater_core::platform::UserDirectory>,
        Arc::clone(&platform) as Arc<dyn sendlater_core::platform::TargetDirectory>,
        Arc::clone(&wake),
    );

    let policy = sendlater_scheduler::RetryPolicy::new(
        config.delivery.max_attempts,
        Duration::from_millis(config.delivery.base_delay_ms),
    );
    let delivery = Arc::new(sendlater_scheduler::Delivery::new(
        Arc::clone(&engine_store),
        Arc::clone(&platform) as Arc<dyn sendlater_core::platform::PostingApi>,
        Arc::clone(&platform) as Arc<dyn sendlater_core::platform::NotificationApi>,
        policy,
    ));
    let engine = sendlater_scheduler::SchedulerEngine::new(
        Arc::clone(&engine_store),
        delivery,
        Arc::clone(&wake),
    );

    // spawn the engine loop in the background
    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    tokio::spawn(async move { engine.run(shutdown_rx).await });

    let state = Arc::new(app::AppState::new(config, handler));
    let router = app::build_router(state);

    let addr: SocketAddr = format!("{}:{}", bind, port).parse()?;
    info!("sendlater gateway listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router).await?;

    // signal the engine to stop
    let _ = shutdown_tx.send(true);
    Ok(())
}

fn ensure_parent_dir(path: &str) {
    if let Some(parent) = std::path::Path::new(path).parent() {
        if !parent.as_os_str().is_empty() {
            let _ = std::fs::create_dir_all(parent);
        }
    }
}
