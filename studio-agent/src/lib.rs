//! Studio Agent - 远程 studio 服务的连接守护与周期采集
//!
//! # 架构概述
//!
//! - **连接** (`connection`): 单一远程 session，健康检查与自动重连
//! - **事件** (`events`): 远程推送事件 → 观察者 → 变更通知
//! - **采集** (`capture`): 每个 target 一个周期 worker，历史数量有上限
//! - **存储** (`storage`): 嵌入式 redb 存储 target 和采集结果
//! - **远程** (`remote`): `RemoteConnector` / `RemoteSession` 抽象与进程内实现
//!
//! # 模块结构
//!
//! ```text
//! studio-agent/src/
//! ├── core/          # 配置、错误、后台任务、CaptureAgent
//! ├── connection/    # ConnectionManager、HealthMonitor
//! ├── remote/        # 远程服务接口、MemoryRemote
//! ├── events/        # EventBridge、NotificationRouter、sink
//! ├── capture/       # CaptureRegistry、CaptureWorker、RetentionSweeper
//! ├── storage/       # CaptureStore、RedbCaptureStore
//! └── utils/         # 日志
//! ```

pub mod capture;
pub mod connection;
pub mod core;
pub mod events;
pub mod remote;
pub mod storage;
pub mod utils;

#[cfg(test)]
pub(crate) mod test_support;

// Re-export 公共类型
pub use capture::{CaptureRegistry, RegistrySettings, SweepReport};
pub use connection::{ConnectionConfig, ConnectionManager, HealthMonitor, HealthState};
pub use crate::core::{AgentError, AgentResult, CaptureAgent, Config};
pub use events::{BroadcastSink, NotificationRouter, NotificationSink, SceneObserver};
pub use remote::{MemoryRemote, RemoteConfig, RemoteConnector, RemoteError, RemoteSession};
pub use storage::{CaptureStore, RedbCaptureStore, StorageError};

// Re-export logger functions
pub use utils::logger::{init_logger, init_logger_with_file};

/// 加载 `.env` 并初始化日志
///
/// 返回从环境变量读取的配置。
pub fn setup_environment() -> Config {
    let _ = dotenv::dotenv();
    let config = Config::from_env();
    init_logger_with_file(
        Some(&config.log_level),
        config.log_json,
        config.log_dir.as_deref(),
    );
    config
}

pub fn print_banner() {
    println!(
        r#"
   _____ __            ___
  / ___// /___  ______/ (_)___
  \__ \/ __/ / / / __  / / __ \
 ___/ / /_/ /_/ / /_/ / / /_/ /
/____/\__/\__,_/\__,_/_/\____/
    ___                    __
   /   | ____ ____  ____  / /_
  / /| |/ __ `/ _ \/ __ \/ __/
 / ___ / /_/ /  __/ / / / /_
/_/  |_\__, /\___/_/ /_/\__/
      /____/
    "#
    );
}
