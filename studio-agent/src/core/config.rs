use crate::remote::RemoteConfig;
use std::path::PathBuf;
use std::time::Duration;

/// Agent 配置
///
/// # 环境变量
///
/// 所有配置项都可以通过环境变量覆盖：
///
/// | 环境变量 | 默认值 | 说明 |
/// |----------|--------|------|
/// | WORK_DIR | ./data | 工作目录 (数据库、日志) |
/// | REMOTE_HOST | 127.0.0.1 | 远程服务地址 |
/// | REMOTE_PORT | 4455 | 远程服务端口 |
/// | REMOTE_PASSWORD | - | 远程服务密码 |
/// | AUTO_RECONNECT | true | 断线后自动重连 |
/// | HEALTH_CHECK_INTERVAL_MS | 5000 | 健康检查/重连周期 |
/// | REQUEST_TIMEOUT_MS | 5000 | 单次远程调用超时 |
/// | SWEEP_INTERVAL_MS | 60000 | 历史清理周期 |
/// | MAX_HISTORY_PER_TARGET | 10 | 每个 target 保留的最大采集数 |
/// | STARTUP_CONNECT_ATTEMPTS | 3 | 启动时连接尝试次数 |
/// | STARTUP_RETRY_DELAY_MS | 2000 | 启动重试间隔 |
/// | LOG_LEVEL | info | 日志级别 |
/// | LOG_JSON | false | JSON 日志输出 |
/// | LOG_DIR | - | 日志目录 (存在时按天滚动写文件) |
///
/// # 示例
///
/// ```ignore
/// REMOTE_HOST=10.0.0.5 MAX_HISTORY_PER_TARGET=50 cargo run -p studio-agent
/// ```
#[derive(Debug, Clone)]
pub struct Config {
    /// 工作目录
    pub work_dir: String,
    /// 远程服务连接参数
    pub remote: RemoteConfig,
    pub auto_reconnect: bool,
    pub health_check_interval: Duration,
    pub request_timeout: Duration,
    pub sweep_interval: Duration,
    pub max_history_per_target: usize,
    pub startup_connect_attempts: u32,
    pub startup_retry_delay: Duration,
    pub log_level: String,
    pub log_json: bool,
    pub log_dir: Option<String>,
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_millis(key: &str, default_ms: u64) -> Duration {
    Duration::from_millis(env_parse(key, default_ms))
}

impl Config {
    /// 从环境变量加载配置
    ///
    /// 如果环境变量未设置或无法解析，使用默认值
    pub fn from_env() -> Self {
        let remote = RemoteConfig {
            host: std::env::var("REMOTE_HOST").unwrap_or_else(|_| "127.0.0.1".into()),
            port: env_parse("REMOTE_PORT", 4455),
            password: std::env::var("REMOTE_PASSWORD")
                .ok()
                .filter(|p| !p.is_empty()),
        };

        Self {
            work_dir: std::env::var("WORK_DIR").unwrap_or_else(|_| "./data".into()),
            remote,
            auto_reconnect: env_parse("AUTO_RECONNECT", true),
            health_check_interval: env_millis("HEALTH_CHECK_INTERVAL_MS", 5_000),
            request_timeout: env_millis("REQUEST_TIMEOUT_MS", 5_000),
            sweep_interval: env_millis("SWEEP_INTERVAL_MS", 60_000),
            max_history_per_target: env_parse("MAX_HISTORY_PER_TARGET", 10),
            startup_connect_attempts: env_parse("STARTUP_CONNECT_ATTEMPTS", 3),
            startup_retry_delay: env_millis("STARTUP_RETRY_DELAY_MS", 2_000),
            log_level: std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".into()),
            log_json: env_parse("LOG_JSON", false),
            log_dir: std::env::var("LOG_DIR").ok().filter(|d| !d.is_empty()),
        }
    }

    /// 使用自定义工作目录和远程地址覆盖部分配置
    ///
    /// 常用于测试场景
    pub fn with_overrides(work_dir: impl Into<String>, remote: RemoteConfig) -> Self {
        let mut config = Self::from_env();
        config.work_dir = work_dir.into();
        config.remote = remote;
        config
    }

    /// 数据库目录: {work_dir}/database
    pub fn database_dir(&self) -> PathBuf {
        PathBuf::from(&self.work_dir).join("database")
    }

    /// 数据库文件: {work_dir}/database/captures.redb
    pub fn database_path(&self) -> PathBuf {
        self.database_dir().join("captures.redb")
    }

    /// 确保工作目录结构存在
    pub fn ensure_work_dir_structure(&self) -> std::io::Result<()> {
        std::fs::create_dir_all(self.database_dir())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::from_env()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_with_overrides_and_paths() {
        let config = Config::with_overrides("/tmp/studio", RemoteConfig::new("10.0.0.5", 4460));
        assert_eq!(config.remote.endpoint(), "10.0.0.5:4460");
        assert_eq!(
            config.database_path(),
            PathBuf::from("/tmp/studio/database/captures.redb")
        );
    }

    #[test]
    fn test_env_parse_falls_back_on_garbage() {
        // Key is never set by the test environment
        assert_eq!(env_parse("STUDIO_AGENT_TEST_UNSET_KEY", 42u32), 42);
        assert_eq!(
            env_millis("STUDIO_AGENT_TEST_UNSET_KEY", 1500),
            Duration::from_millis(1500)
        );
    }
}
