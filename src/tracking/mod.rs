// ==========================================
// 单线生产排程引擎 - 跟踪服务适配层
// ==========================================
// 职责: 远端跟踪服务的类型化边界
// 红线: 引擎不接触原始 JSON; 所有记录在此转换为领域类型
// ==========================================

pub mod date_writer;
pub mod dto;
pub mod error;
pub mod memory;
pub mod service;

pub use date_writer::{
    choose_write_order, stored_ranges, DateRangeUpdate, DateSyncReport, DateTarget,
    DateWriteFailure, DateWriter, WriteOrder,
};
pub use dto::{
    BomRecord, PhaseRecord, ProductionOrderRecord, SalesOrderRecord, TRACKING_SCHEMA_VERSION,
};
pub use error::{TrackingError, TrackingResult};
pub use memory::InMemoryTrackingService;
pub use service::{load_bom, load_live_snapshot, LiveSnapshot, TrackingService};
