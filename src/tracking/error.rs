// ==========================================
// 单线生产排程引擎 - 跟踪服务适配层错误类型
// ==========================================
// 工具: thiserror 派生宏
// ==========================================

use thiserror::Error;

/// 跟踪服务适配层错误类型
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TrackingError {
    // ===== 传输错误 (可重试) =====
    #[error("跟踪服务不可达: {0}")]
    Transport(String),

    // ===== 服务端拒绝 =====
    #[error("跟踪服务拒绝请求: status={status}, message={message}")]
    Rejected { status: u16, message: String },

    #[error("跟踪服务记录未找到: {entity} with id={id}")]
    NotFound { entity: String, id: String },

    // ===== 数据格式错误 =====
    #[error("跟踪服务数据格式错误: {0}")]
    Schema(String),

    #[error("不支持的跟踪数据版本: found={found}, expected={expected}")]
    UnsupportedSchemaVersion { found: u32, expected: u32 },
}

impl TrackingError {
    /// 是否值得重试 (传输失败 / 限流 / 服务端 5xx)
    pub fn is_transient(&self) -> bool {
        match self {
            TrackingError::Transport(_) => true,
            TrackingError::Rejected { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }

    pub fn not_found(entity: &str, id: &str) -> Self {
        TrackingError::NotFound {
            entity: entity.to_string(),
            id: id.to_string(),
        }
    }
}

impl From<serde_json::Error> for TrackingError {
    fn from(err: serde_json::Error) -> Self {
        TrackingError::Schema(err.to_string())
    }
}

/// Result 类型别名
pub type TrackingResult<T> = Result<T, TrackingError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        assert!(TrackingError::Transport("timeout".to_string()).is_transient());
        assert!(TrackingError::Rejected { status: 503, message: String::new() }.is_transient());
        assert!(TrackingError::Rejected { status: 429, message: String::new() }.is_transient());
        assert!(!TrackingError::Rejected { status: 422, message: String::new() }.is_transient());
        assert!(!TrackingError::Schema("bad".to_string()).is_transient());
        assert!(!TrackingError::not_found("phase", "x").is_transient());
    }
}
