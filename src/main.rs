use anyhow::Context;
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tracing::{error, info, warn};

use lili_backend::infrastructure::{database::DatabaseManager, logger::init_logging};
use lili_backend::{build_router, AppState, Config};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let (config, config_path) = Config::load().context("加载配置失败")?;
    let _guard = init_logging(&config.logging)?;

    info!("启动理理后端服务 v{}", env!("CARGO_PKG_VERSION"));
    match &config_path {
        Some(path) => info!("从配置文件加载: {}", path.display()),
        None => warn!("未找到配置文件，使用默认配置"),
    }

    let database = DatabaseManager::new(&config.database).await.map_err(|e| {
        error!("数据库连接失败: {}", e);
        e
    })?;
    if config.database.run_migrations {
        database.migrate().await.context("数据库迁移失败")?;
    }

    let addr: SocketAddr = format!("{}:{}", config.http.bind_address, config.http.port)
        .parse()
        .context("无效的监听地址")?;

    let state = AppState::new(config, database.into_pool())?;
    let app = build_router(state);

    let listener = TcpListener::bind(addr).await?;
    info!("HTTP 服务监听 http://{}", listener.local_addr()?);
    info!("接口前缀 /api/v1，健康检查 /health");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("服务已停止");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("监听退出信号失败: {}", e);
        return;
    }
    info!("收到退出信号，正在关闭服务");
}
