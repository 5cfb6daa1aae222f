// ==========================================
// 单线生产排程引擎 - 引擎层
// ==========================================
// 职责: 日历、BOM、排序、工序排布、排程组装、故障恢复
// 红线: Engine 不拼 SQL, 不直接访问跟踪服务
// ==========================================

pub mod assembler;
pub mod bom;
pub mod calendar;
pub mod decision_provider;
pub mod error;
pub mod events;
pub mod execution;
pub mod planner;
pub mod recovery;
pub mod sequencer;
pub mod strategy;

// 重导出核心引擎
pub use assembler::ScheduleAssembler;
pub use bom::{BillOfMaterials, PhaseSpec};
pub use calendar::WorkingCalendar;
pub use decision_provider::{
    ChannelDecisionProvider, DecisionConsole, DecisionPrompt, DecisionProvider, DecisionReply,
};
pub use error::{EngineError, EngineResult, RecoveryError, RecoveryResult};
pub use events::{
    NoOpEventPublisher, OptionalEventPublisher, ScheduleEvent, ScheduleEventPublisher,
    ScheduleEventType,
};
pub use execution::{ExecutionCursor, OrderExecutionState, PhaseExecutor, PhaseOutcome};
pub use planner::PhasePlanner;
pub use recovery::{FailureRecoveryCoordinator, RecoveryOutcome};
pub use sequencer::OrderSequencer;
pub use strategy::SequencingPolicy;
