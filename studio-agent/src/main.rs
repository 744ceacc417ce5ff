use anyhow::Context;
use shared::CaptureTarget;
use std::sync::Arc;
use studio_agent::{CaptureAgent, MemoryRemote, RedbCaptureStore, print_banner, setup_environment};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 1. 设置环境 (dotenv, 日志) 并加载配置
    let config = setup_environment();
    print_banner();
    tracing::info!("Studio agent starting...");

    // 2. 工作目录与数据库
    config
        .ensure_work_dir_structure()
        .context("failed to create work directory")?;
    let store = RedbCaptureStore::open(config.database_path())
        .with_context(|| format!("failed to open {}", config.database_path().display()))?;

    // 3. 进程内 studio 服务 (演示用)
    let mut remote = MemoryRemote::new().with_scenes(["Main", "Intermission"]);
    if let Some(password) = &config.remote.password {
        remote = remote.with_password(password.clone());
    }

    let agent = CaptureAgent::new(config, Arc::new(remote), Arc::new(store));
    if agent.registry().targets()?.is_empty() {
        agent
            .registry()
            .add_target(CaptureTarget::new("Main program", "Main", 2_000))?;
    }

    // 4. 启动后台任务
    agent.start()?;
    let mut notifications = agent.subscribe();
    tokio::spawn(async move {
        while let Ok(notification) = notifications.recv().await {
            tracing::info!(?notification, "Notification");
        }
    });

    // 5. 启动连接 (失败后交给后台重连)
    if let Err(e) = agent.connect_at_startup().await {
        tracing::warn!(error = %e, "Startup connection failed, background reconnect stays active");
    }

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for shutdown signal")?;
    agent.shutdown().await;
    Ok(())
}
