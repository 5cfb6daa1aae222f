// ==========================================
// 单线生产排程引擎 - 引擎层错误类型
// ==========================================
// 工具: thiserror 派生宏
// ==========================================

use thiserror::Error;

/// 引擎层错误类型
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    // ===== 配置错误 (构造期) =====
    #[error("班次配置无效: start_hour={start_hour}, end_hour={end_hour}")]
    InvalidShift { start_hour: u32, end_hour: u32 },

    #[error("未知排序策略: {0}")]
    UnknownPolicy(String),

    // ===== 主数据错误 =====
    #[error("BOM 中不存在产品: {0}")]
    UnknownProduct(String),

    #[error("产品 {0} 没有任何非零工序")]
    EmptyRouting(String),

    #[error("未知工序名称: {0}")]
    UnknownPhase(String),

    #[error("未知工序状态: {0}")]
    UnknownPhaseStatus(String),

    // ===== 计划推进错误 =====
    #[error("工时超出可排日期范围: from={from}, minutes={minutes}")]
    HorizonOverflow {
        from: chrono::NaiveDateTime,
        minutes: u64,
    },

    // ===== 恢复流程错误 =====
    #[error("无效的恢复决策: '{0}' (只接受 skip / restart)")]
    InvalidDecision(String),

    #[error("排程位置越界: position={position}, len={len}")]
    PositionOutOfRange { position: usize, len: usize },

    #[error("故障记录与排程不一致: {0}")]
    OrderMismatch(String),

    #[error("无效的执行状态迁移: from={from} action={action}")]
    InvalidTransition { from: String, action: String },
}

/// Result 类型别名
pub type EngineResult<T> = Result<T, EngineError>;

/// 故障恢复流程错误 (引擎规则 + 故障记录持久化)
#[derive(Error, Debug)]
pub enum RecoveryError {
    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error("故障记录持久化失败: {0}")]
    Repository(#[from] crate::repository::RepositoryError),
}

pub type RecoveryResult<T> = Result<T, RecoveryError>;
