// ==========================================
// 单线生产排程引擎 - API 层
// ==========================================
// 职责: 提供排程 API,供操作台 / 执行代理调用
// ==========================================

pub mod error;
pub mod production_runner;
pub mod scheduling_api;

// 重导出核心类型
pub use error::{ApiError, ApiResult};
pub use production_runner::{ProductionRunner, RunReport};
pub use scheduling_api::{AcceptReport, RecoveryReport, SchedulingApi};
