//! 实时分发服务入口
//!
//! 加载配置、装配基础设施、启动实时核心并提供 HTTP/WebSocket 服务。

use std::sync::Arc;

use application::RealtimeHub;
use config::AppConfig;
use infrastructure::Infrastructure;
use relay::{router, AppState};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 初始化日志
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = AppConfig::load()?;
    tracing::info!(
        database = %config.sanitized_database_url(),
        offline_backend = ?config.realtime.offline_backend,
        "configuration loaded"
    );

    let infrastructure = Infrastructure::connect(&config).await?;
    let hub = Arc::new(RealtimeHub::new(
        infrastructure.hub_dependencies(),
        &config.realtime,
    ));
    hub.start(infrastructure.membership_source.as_ref()).await?;

    let shutdown = CancellationToken::new();
    let sweep = config
        .realtime
        .liveness_sweep_interval()
        .map(|interval| hub.spawn_liveness_sweep(interval, shutdown.clone()));

    if config.server.internal_token.is_none() {
        tracing::warn!("server.internal_token not set, membership event publishing is disabled");
    }
    let app = router(
        AppState::new(hub.clone()).with_internal_token(config.server.internal_token.clone()),
    );
    let listener = TcpListener::bind(config.bind_address()).await?;
    tracing::info!(address = %config.bind_address(), "relay listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(hub.clone(), shutdown.clone()))
        .await?;

    shutdown.cancel();
    if let Some(sweep) = sweep {
        let _ = sweep.await;
    }
    Ok(())
}

/// 收到 Ctrl-C 后先关闭所有会话，已升级的 WebSocket 连接才会退出
async fn shutdown_signal(hub: Arc<RealtimeHub>, shutdown: CancellationToken) {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %err, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutdown requested");
    shutdown.cancel();
    hub.shutdown().await;
}
