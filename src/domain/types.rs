// ==========================================
// 单线生产排程引擎 - 领域类型定义
// ==========================================
// 职责: 工序名称、工序状态、排程状态、恢复决策等枚举
// 红线: 工序集合固定且有序,不允许动态扩展
// ==========================================

use crate::engine::error::EngineError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// ==========================================
// 工序名称 (Phase Name)
// ==========================================
// 顺序即 BOM 工艺顺序: SMT → Reflow → THT → AOI → Test → Coating → Pack
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum PhaseName {
    #[serde(rename = "SMT")]
    Smt, // 贴片
    #[serde(rename = "Reflow")]
    Reflow, // 回流焊
    #[serde(rename = "THT")]
    Tht, // 插件
    #[serde(rename = "AOI")]
    Aoi, // 光学检测
    #[serde(rename = "Test")]
    Test, // 功能测试
    #[serde(rename = "Coating")]
    Coating, // 三防涂覆
    #[serde(rename = "Pack")]
    Pack, // 包装
}

impl PhaseName {
    /// 固定工艺顺序
    pub const ALL: [PhaseName; 7] = [
        PhaseName::Smt,
        PhaseName::Reflow,
        PhaseName::Tht,
        PhaseName::Aoi,
        PhaseName::Test,
        PhaseName::Coating,
        PhaseName::Pack,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PhaseName::Smt => "SMT",
            PhaseName::Reflow => "Reflow",
            PhaseName::Tht => "THT",
            PhaseName::Aoi => "AOI",
            PhaseName::Test => "Test",
            PhaseName::Coating => "Coating",
            PhaseName::Pack => "Pack",
        }
    }

    /// 工艺顺序下标
    pub fn ordinal(&self) -> usize {
        *self as usize
    }
}

impl fmt::Display for PhaseName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for PhaseName {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "SMT" => Ok(PhaseName::Smt),
            "REFLOW" => Ok(PhaseName::Reflow),
            "THT" => Ok(PhaseName::Tht),
            "AOI" => Ok(PhaseName::Aoi),
            "TEST" => Ok(PhaseName::Test),
            "COATING" => Ok(PhaseName::Coating),
            "PACK" => Ok(PhaseName::Pack),
            other => Err(EngineError::UnknownPhase(other.to_string())),
        }
    }
}

// ==========================================
// 工序执行状态 (Phase Status)
// ==========================================
// 状态机: not_ready → ready → started → completed (终态)
//                                     ↘ failed (非终态,触发恢复)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PhaseStatus {
    NotReady,
    Ready,
    Started,
    Completed,
    Failed,
}

impl PhaseStatus {
    /// 已被执行端确认的状态,时间戳不可再改
    pub fn is_checkpoint(&self) -> bool {
        matches!(self, PhaseStatus::Started | PhaseStatus::Completed)
    }

    pub fn to_db_str(&self) -> &'static str {
        match self {
            PhaseStatus::NotReady => "not_ready",
            PhaseStatus::Ready => "ready",
            PhaseStatus::Started => "started",
            PhaseStatus::Completed => "completed",
            PhaseStatus::Failed => "failed",
        }
    }

    /// 合法迁移检查
    pub fn can_transition_to(&self, next: PhaseStatus) -> bool {
        matches!(
            (self, next),
            (PhaseStatus::NotReady, PhaseStatus::Ready)
                | (PhaseStatus::Ready, PhaseStatus::Started)
                | (PhaseStatus::Started, PhaseStatus::Completed)
                | (PhaseStatus::Started, PhaseStatus::Failed)
                | (PhaseStatus::Failed, PhaseStatus::Ready)
        )
    }
}

impl fmt::Display for PhaseStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_db_str())
    }
}

impl FromStr for PhaseStatus {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "not_ready" => Ok(PhaseStatus::NotReady),
            "ready" => Ok(PhaseStatus::Ready),
            "started" | "in_progress" => Ok(PhaseStatus::Started),
            "completed" | "done" => Ok(PhaseStatus::Completed),
            "failed" => Ok(PhaseStatus::Failed),
            other => Err(EngineError::UnknownPhaseStatus(other.to_string())),
        }
    }
}

// ==========================================
// 生产条目执行状态 (Entry Status)
// ==========================================
// 由各工序状态推导,不单独存储
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryStatus {
    NotReady,
    Ready,
    InProgress,
    Completed,
    Failed,
}

impl fmt::Display for EntryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntryStatus::NotReady => write!(f, "not_ready"),
            EntryStatus::Ready => write!(f, "ready"),
            EntryStatus::InProgress => write!(f, "in_progress"),
            EntryStatus::Completed => write!(f, "completed"),
            EntryStatus::Failed => write!(f, "failed"),
        }
    }
}

// ==========================================
// 排程方案状态 (Schedule Status)
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScheduleStatus {
    Proposed, // 待审批
    Accepted, // 已接受
    Rejected, // 已驳回
}

impl fmt::Display for ScheduleStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScheduleStatus::Proposed => write!(f, "proposed"),
            ScheduleStatus::Accepted => write!(f, "accepted"),
            ScheduleStatus::Rejected => write!(f, "rejected"),
        }
    }
}

// ==========================================
// 故障恢复决策 (Recovery Decision)
// ==========================================
// 只有两种: 跳过 / 从首工序重做; 其余输入一律拒绝
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecoveryDecision {
    Skip,
    Restart,
}

impl RecoveryDecision {
    pub fn to_db_str(&self) -> &'static str {
        match self {
            RecoveryDecision::Skip => "skip",
            RecoveryDecision::Restart => "restart",
        }
    }
}

impl fmt::Display for RecoveryDecision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_db_str())
    }
}

impl FromStr for RecoveryDecision {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "1" | "skip" => Ok(RecoveryDecision::Skip),
            "2" | "restart" => Ok(RecoveryDecision::Restart),
            other => Err(EngineError::InvalidDecision(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_phase_order_is_fixed() {
        let ordinals: Vec<usize> = PhaseName::ALL.iter().map(|p| p.ordinal()).collect();
        assert_eq!(ordinals, vec![0, 1, 2, 3, 4, 5, 6]);
        assert!(PhaseName::Smt < PhaseName::Pack);
    }

    #[test]
    fn test_phase_name_parse() {
        assert_eq!("smt".parse::<PhaseName>().unwrap(), PhaseName::Smt);
        assert_eq!(" Coating ".parse::<PhaseName>().unwrap(), PhaseName::Coating);
        assert!("Polish".parse::<PhaseName>().is_err());
    }

    #[test]
    fn test_phase_status_transitions() {
        assert!(PhaseStatus::Ready.can_transition_to(PhaseStatus::Started));
        assert!(PhaseStatus::Started.can_transition_to(PhaseStatus::Failed));
        assert!(!PhaseStatus::Completed.can_transition_to(PhaseStatus::Started));
        assert!(!PhaseStatus::NotReady.can_transition_to(PhaseStatus::Completed));
        assert!(PhaseStatus::Completed.is_checkpoint());
        assert!(!PhaseStatus::Failed.is_checkpoint());
    }

    #[test]
    fn test_recovery_decision_parse() {
        assert_eq!("SKIP".parse::<RecoveryDecision>().unwrap(), RecoveryDecision::Skip);
        assert_eq!("2".parse::<RecoveryDecision>().unwrap(), RecoveryDecision::Restart);
        let err = "later".parse::<RecoveryDecision>().unwrap_err();
        assert!(matches!(err, EngineError::InvalidDecision(_)));
    }
}
