//! 后台任务管理
//!
//! 统一管理一个作用域内所有后台任务的启动和关闭。
//!
//! # 任务类型
//!
//! - [`TaskKind::Worker`] - 采集 worker（每个 target 一个）
//! - [`TaskKind::Listener`] - 事件监听器（每个 session 一个）
//! - [`TaskKind::Periodic`] - 定时任务（健康检查/重连、历史清理）

use futures::FutureExt;
use std::fmt;
use std::panic::AssertUnwindSafe;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

/// 任务类型
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskKind {
    /// 采集 worker
    Worker,
    /// 事件监听器
    Listener,
    /// 定时任务
    Periodic,
}

impl fmt::Display for TaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskKind::Worker => write!(f, "Worker"),
            TaskKind::Listener => write!(f, "Listener"),
            TaskKind::Periodic => write!(f, "Periodic"),
        }
    }
}

/// 后台任务管理器
///
/// 持有一个取消作用域（父作用域的 child token）和一个 [`TaskTracker`]。
/// `shutdown()` 发出取消信号后等待作用域内所有任务退出，
/// 包括已经从调用方视野中分离出去的任务。
///
/// # 使用示例
///
/// ```ignore
/// let tasks = BackgroundTasks::with_parent(&root);
///
/// let token = tasks.child_token();
/// tasks.spawn("retention_sweeper", TaskKind::Periodic, async move {
///     // 任务逻辑, select! on token.cancelled()
/// });
///
/// tasks.shutdown().await;
/// ```
#[derive(Debug)]
pub struct BackgroundTasks {
    tracker: TaskTracker,
    shutdown: CancellationToken,
}

impl BackgroundTasks {
    /// 创建独立作用域
    pub fn new() -> Self {
        Self::from_token(CancellationToken::new())
    }

    /// 创建父作用域下的子作用域（父取消时一并取消）
    pub fn with_parent(parent: &CancellationToken) -> Self {
        Self::from_token(parent.child_token())
    }

    fn from_token(shutdown: CancellationToken) -> Self {
        Self {
            tracker: TaskTracker::new(),
            shutdown,
        }
    }

    /// 获取作用域令牌
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// 创建子令牌（可单独取消，作用域取消时也会取消）
    pub fn child_token(&self) -> CancellationToken {
        self.shutdown.child_token()
    }

    pub fn is_shutdown(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    /// 注册并启动一个后台任务
    ///
    /// 任务会被包装以捕获 panic。定时任务在作用域未取消时退出会被视为异常。
    pub fn spawn<F>(&self, name: &'static str, kind: TaskKind, future: F)
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let shutdown = self.shutdown.clone();
        let wrapped_future = async move {
            let result: Result<(), Box<dyn std::any::Any + Send>> =
                AssertUnwindSafe(future).catch_unwind().await;
            match result {
                Ok(()) => {
                    if kind == TaskKind::Periodic && !shutdown.is_cancelled() {
                        tracing::warn!(task = %name, kind = %kind, "Background task completed unexpectedly");
                    } else {
                        tracing::debug!(task = %name, kind = %kind, "Background task exited");
                    }
                }
                Err(panic_info) => {
                    let panic_msg: String = if let Some(s) = panic_info.downcast_ref::<&str>() {
                        (*s).to_string()
                    } else if let Some(s) = panic_info.downcast_ref::<String>() {
                        s.clone()
                    } else {
                        "Unknown panic".to_string()
                    };
                    tracing::error!(
                        task = %name,
                        kind = %kind,
                        panic = %panic_msg,
                        "Background task panicked! This is a bug that should be reported."
                    );
                }
            }
        };

        self.tracker.spawn(wrapped_future);
        tracing::debug!(task = %name, kind = %kind, "Registered background task");
    }

    /// 当前存活任务数量
    pub fn len(&self) -> usize {
        self.tracker.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracker.is_empty()
    }

    /// 等待已关闭作用域中剩余的任务退出
    pub async fn wait(&self) {
        self.tracker.wait().await;
    }

    /// Graceful shutdown - 取消所有任务并等待完成
    pub async fn shutdown(&self) {
        tracing::debug!(tasks = self.tracker.len(), "Shutting down background tasks");
        self.shutdown.cancel();
        self.tracker.close();
        self.tracker.wait().await;
        tracing::debug!("All background tasks stopped");
    }
}

impl Default for BackgroundTasks {
    fn default() -> Self {
        Self::new()
    }
}
