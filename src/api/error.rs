// ==========================================
// 单线生产排程引擎 - API层错误类型
// ==========================================
// 职责: 汇总引擎/仓储/跟踪服务错误,转换为调用方可读的错误消息
// 红线: 所有错误信息必须包含显式原因
// ==========================================

use crate::engine::error::{EngineError, RecoveryError};
use crate::repository::error::RepositoryError;
use crate::tracking::error::TrackingError;
use thiserror::Error;

/// API层错误类型
#[derive(Error, Debug)]
pub enum ApiError {
    // ==========================================
    // 业务规则错误
    // ==========================================
    #[error("无效输入: {0}")]
    InvalidInput(String),

    #[error("资源未找到: {0}")]
    NotFound(String),

    #[error("业务规则违反: {0}")]
    BusinessRuleViolation(String),

    #[error("无效的状态转换: from={from} to={to}")]
    InvalidStateTransition { from: String, to: String },

    #[error("排程引擎错误: {0}")]
    Engine(#[from] EngineError),

    // ==========================================
    // 数据访问错误
    // ==========================================
    #[error("数据库错误: {0}")]
    DatabaseError(String),

    #[error("数据库连接失败: {0}")]
    DatabaseConnectionError(String),

    // ==========================================
    // 跟踪服务错误
    // ==========================================
    #[error("跟踪服务不可用: {0}")]
    TrackingUnavailable(String),

    #[error("跟踪服务拒绝请求: {0}")]
    TrackingRejected(String),

    // ==========================================
    // 通用错误
    // ==========================================
    #[error("内部错误: {0}")]
    InternalError(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

// ==========================================
// 从 RepositoryError 转换
// ==========================================
impl From<RepositoryError> for ApiError {
    fn from(err: RepositoryError) -> Self {
        match err {
            RepositoryError::NotFound { entity, id } => {
                ApiError::NotFound(format!("{}(id={})不存在", entity, id))
            }
            RepositoryError::LockError(msg) => {
                ApiError::DatabaseConnectionError(format!("数据库锁获取失败: {}", msg))
            }
            RepositoryError::DatabaseQueryError(msg) => ApiError::DatabaseError(msg),
            RepositoryError::UniqueConstraintViolation(msg) => {
                ApiError::BusinessRuleViolation(format!("唯一约束违反: {}", msg))
            }
            RepositoryError::InvalidStateTransition { from, to } => {
                ApiError::InvalidStateTransition { from, to }
            }
            RepositoryError::FieldValueError { field, message } => {
                ApiError::InvalidInput(format!("字段{}错误: {}", field, message))
            }
            RepositoryError::SerializationError(msg) => ApiError::InternalError(msg),
            RepositoryError::Other(err) => ApiError::Other(err),
        }
    }
}

// ==========================================
// 从 TrackingError 转换
// ==========================================
impl From<TrackingError> for ApiError {
    fn from(err: TrackingError) -> Self {
        match err {
            TrackingError::NotFound { entity, id } => {
                ApiError::NotFound(format!("跟踪服务中 {}(id={}) 不存在", entity, id))
            }
            TrackingError::Transport(msg) => ApiError::TrackingUnavailable(msg),
            TrackingError::Rejected { status, message } if status >= 500 || status == 429 => {
                ApiError::TrackingUnavailable(format!("HTTP {}: {}", status, message))
            }
            TrackingError::Rejected { status, message } => {
                ApiError::TrackingRejected(format!("HTTP {}: {}", status, message))
            }
            other @ (TrackingError::Schema(_) | TrackingError::UnsupportedSchemaVersion { .. }) => {
                ApiError::InternalError(other.to_string())
            }
        }
    }
}

impl From<RecoveryError> for ApiError {
    fn from(err: RecoveryError) -> Self {
        match err {
            RecoveryError::Engine(e) => ApiError::Engine(e),
            RecoveryError::Repository(e) => e.into(),
        }
    }
}

/// Result 类型别名
pub type ApiResult<T> = Result<T, ApiError>;
