// ==========================================
// 单线生产排程引擎 - 故障记录领域模型
// ==========================================
// 职责: 工序失败的持久化记录,进程重启后可据此继续恢复流程
// ==========================================

use crate::domain::schedule::{ProductionEntry, Schedule};
use crate::domain::types::{PhaseName, RecoveryDecision};
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

// ==========================================
// FailureEvent - 执行端上报的失败事件
// ==========================================
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureEvent {
    pub order_id: String,
    pub phase_id: String,
    pub reported_at: NaiveDateTime,
}

// ==========================================
// FailureRecord - 故障记录
// ==========================================
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureRecord {
    pub record_id: String,
    pub schedule_position: usize,         // 失败条目在排程中的位置
    pub order_id: Option<String>,         // 订单ID (占位条目为空)
    pub entry_id: Option<String>,         // 生产单ID
    pub internal_id: String,              // 展示编号
    pub failed_phase_id: Option<String>,  // 失败工序ID
    pub failed_phase: PhaseName,          // 失败工序
    pub failed_at: NaiveDateTime,         // 失败时间
    pub entry_snapshot: ProductionEntry,  // 失败条目快照
    pub schedule_snapshot: Schedule,      // 所在排程快照
    pub decision: Option<RecoveryDecision>,
    pub resolved_at: Option<NaiveDateTime>,
}

impl FailureRecord {
    /// 尚未得到人工决策
    pub fn is_open(&self) -> bool {
        self.decision.is_none()
    }
}
