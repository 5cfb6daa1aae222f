// ==========================================
// 单线生产排程引擎 - 领域模型层
// ==========================================
// 职责: 定义领域实体、类型与派生量
// 红线: 不含数据访问逻辑,不含引擎逻辑
// ==========================================

pub mod failure;
pub mod order;
pub mod schedule;
pub mod types;

// 重导出核心类型
pub use failure::{FailureEvent, FailureRecord};
pub use order::Order;
pub use schedule::{
    PhasePlan, ProductionEntry, Schedule, ScheduledEntry, SkipReason, SkippedOrder,
};
pub use types::{EntryStatus, PhaseName, PhaseStatus, RecoveryDecision, ScheduleStatus};
