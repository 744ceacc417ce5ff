//! 核心模块 - 配置、错误、后台任务和组件装配
//!
//! - [`Config`] - Agent 配置
//! - [`AgentError`] - 错误类型
//! - [`BackgroundTasks`] - 后台任务作用域
//! - [`CaptureAgent`] - 组件装配

pub mod agent;
pub mod config;
pub mod error;
pub mod tasks;

pub use agent::CaptureAgent;
pub use config::Config;
pub use error::{AgentError, AgentResult};
pub use tasks::{BackgroundTasks, TaskKind};
