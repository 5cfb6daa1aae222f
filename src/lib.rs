// ==========================================
// 单线生产排程引擎 - 核心库
// ==========================================
// 技术栈: Rust + SQLite + tokio
// 系统定位: 单条产线的交期驱动排程 (人工决策故障恢复)
// ==========================================

// ==========================================
// 模块声明
// ==========================================

// 领域层 - 实体与类型
pub mod domain;

// 数据仓储层 - 数据访问
pub mod repository;

// 引擎层 - 排程规则
pub mod engine;

// 配置层 - 系统配置
pub mod config;

// 跟踪服务适配层
pub mod tracking;

// 数据库基础设施（连接初始化/PRAGMA 统一）
pub mod db;

// 日志系统
pub mod logging;

// API 层 - 业务接口
pub mod api;

// ==========================================
// 重导出核心类型
// ==========================================

// 领域类型
pub use domain::types::{EntryStatus, PhaseName, PhaseStatus, RecoveryDecision, ScheduleStatus};

// 领域实体
pub use domain::{FailureEvent, FailureRecord, Order, PhasePlan, ProductionEntry, Schedule};

// 引擎
pub use engine::{
    BillOfMaterials, FailureRecoveryCoordinator, OrderSequencer, PhasePlanner, ScheduleAssembler,
    WorkingCalendar,
};

// API
pub use api::{ProductionRunner, SchedulingApi};

// ==========================================
// 常量定义
// ==========================================

// 系统版本
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

// 系统名称
pub const APP_NAME: &str = "单线生产排程引擎";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }
}
