/// 获取当前 UTC 时间戳（毫秒）
pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Generate an opaque identifier for a new capture target.
///
/// Simple (hyphen-less) UUID v4, safe to embed in storage keys and URIs.
pub fn new_target_id() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}
