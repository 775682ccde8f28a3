use std::sync::Arc;
use std::time::Duration;
use walletflow::streamer_core::{
    JsonlWriter, LogDispatcher, RuntimeConfig, SessionHandle, SessionManager, SessionSettings,
    YellowstoneTransport,
};
use walletflow::watchlist::{reload_task, WatchlistStore};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv::dotenv().ok();

    let runtime_config = RuntimeConfig::from_env()?;

    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(&runtime_config.rust_log),
    )
    .target(env_logger::Target::Stderr)
    .init();

    // NOTE: Workaround for rustls issue
    rustls::crypto::aws_lc_rs::default_provider()
        .install_default()
        .map_err(|_| "Can't set crypto provider to aws_lc_rs")?;

    log::info!("🚀 Starting walletflow");
    log::info!("   ├─ Geyser: {}", runtime_config.geyser_url);
    log::info!("   ├─ Target program: {}", runtime_config.target_program_id);
    log::info!("   ├─ Commitment: {:?}", runtime_config.commitment_level);
    log::info!("   ├─ Watchlist: {}", runtime_config.watchlist_path);
    log::info!("   ├─ Heartbeat: {}ms", runtime_config.heartbeat_interval_ms);
    log::info!("   └─ Reconnect policy: {:?}", runtime_config.reconnect_policy);

    let store = Arc::new(WatchlistStore::open(&runtime_config.watchlist_path)?);
    let transport = Arc::new(YellowstoneTransport::from_config(&runtime_config));
    let settings = SessionSettings::from(&runtime_config);

    let mut manager = SessionManager::new(
        transport,
        store.clone(),
        Arc::new(LogDispatcher),
        settings,
    );

    if let Some(path) = &runtime_config.signal_log_path {
        let journal = JsonlWriter::new(
            path,
            runtime_config.output_max_size_mb,
            runtime_config.output_max_rotations,
        )?;
        log::info!("📝 Journaling signals to {}", path);
        manager = manager.with_journal(Box::new(journal));
    }

    if let Err(e) = manager.setup_stream().await {
        log::error!("❌ Initial stream setup failed: {}", e);
        std::process::exit(1);
    }

    if runtime_config.watchlist_reload_secs > 0 {
        tokio::spawn(reload_task(
            store.clone(),
            Duration::from_secs(runtime_config.watchlist_reload_secs),
        ));
    }

    let (handle, commands) = SessionHandle::channel(16);
    let session = tokio::spawn(async move {
        manager.run(commands).await;
    });

    tokio::signal::ctrl_c().await?;
    log::info!("🛑 Ctrl-C received, stopping");

    handle.shutdown().await;
    session.await?;

    Ok(())
}
