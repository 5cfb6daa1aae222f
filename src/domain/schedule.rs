// ==========================================
// 单线生产排程引擎 - 排程领域模型
// ==========================================
// 职责: PhasePlan / ProductionEntry / Schedule 定义与派生量
// 红线:
// - 同一订单内工序首尾相接 (phase[k+1].start == phase[k].end)
// - 跨订单不重叠 (entry[i+1].start >= entry[i].end)
// - on_time 只由 overall_end 与 deadline 比较得出,相等算准时
// ==========================================

use crate::domain::order::Order;
use crate::domain::types::{EntryStatus, PhaseName, PhaseStatus, ScheduleStatus};
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::fmt;

// ==========================================
// PhasePlan - 工序计划
// ==========================================
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhasePlan {
    pub phase_id: Option<String>, // 跟踪系统工序ID (新排条目在接受前为空)
    pub phase: PhaseName,         // 工序
    pub start: NaiveDateTime,     // 开始
    pub end: NaiveDateTime,       // 结束
    pub duration_minutes: u64,    // 工时 (分钟, 已乘数量)
    pub status: PhaseStatus,      // 执行状态
}

// ==========================================
// ProductionEntry - 生产条目
// ==========================================
// 订单 + 有序工序计划; is_live=true 表示来自执行端的权威记录
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductionEntry {
    pub entry_id: Option<String>,        // 跟踪系统生产单ID
    pub internal_id: String,             // 展示编号 (批次号/订单号)
    pub order: Option<Order>,            // 绑定订单 (None = 未关联占位条目)
    pub linked_order_id: Option<String>, // 执行端给出的显式订单关联
    pub product_code: String,
    pub quantity: u32,
    pub phases: Vec<PhasePlan>,
    pub is_live: bool,
    /// 执行端报告的整体起止 (仅在没有任何带日期工序时使用)
    #[serde(default)]
    pub reported_range: Option<(NaiveDateTime, NaiveDateTime)>,
}

impl ProductionEntry {
    /// 整体开始 = 首工序开始
    pub fn overall_start(&self) -> NaiveDateTime {
        match (self.phases.first(), self.reported_range) {
            (Some(first), _) => first.start,
            (None, Some((start, _))) => start,
            (None, None) => NaiveDateTime::default(),
        }
    }

    /// 整体结束 = 末工序结束
    pub fn overall_end(&self) -> NaiveDateTime {
        match (self.phases.last(), self.reported_range) {
            (Some(last), _) => last.end,
            (None, Some((_, end))) => end,
            (None, None) => NaiveDateTime::default(),
        }
    }

    /// 由工序状态推导条目状态
    pub fn status(&self) -> EntryStatus {
        if self.phases.is_empty() {
            return EntryStatus::NotReady;
        }
        if self.phases.iter().any(|p| p.status == PhaseStatus::Failed) {
            return EntryStatus::Failed;
        }
        if self.phases.iter().all(|p| p.status == PhaseStatus::Completed) {
            return EntryStatus::Completed;
        }
        if self.phases.iter().any(|p| p.status.is_checkpoint()) {
            return EntryStatus::InProgress;
        }
        if self.phases.iter().any(|p| p.status == PhaseStatus::Ready) {
            return EntryStatus::Ready;
        }
        EntryStatus::NotReady
    }

    /// 未能关联到订单的占位条目
    pub fn is_placeholder(&self) -> bool {
        self.order.is_none()
    }

    /// 是否存在已开工/已完工的工序 (时间戳不可改)
    pub fn has_checkpoint(&self) -> bool {
        self.phases.iter().any(|p| p.status.is_checkpoint())
    }

    pub fn order_id(&self) -> Option<&str> {
        self.order.as_ref().map(|o| o.order_id.as_str())
    }

    /// 交期; 占位条目以自身结束时间作为交期
    pub fn deadline(&self) -> NaiveDateTime {
        self.order
            .as_ref()
            .map(|o| o.deadline)
            .unwrap_or_else(|| self.overall_end())
    }

    pub fn find_phase(&self, phase_id: &str) -> Option<(usize, &PhasePlan)> {
        self.phases
            .iter()
            .enumerate()
            .find(|(_, p)| p.phase_id.as_deref() == Some(phase_id))
    }

    pub fn total_minutes(&self) -> u64 {
        self.phases.iter().map(|p| p.duration_minutes).sum()
    }
}

// ==========================================
// ScheduledEntry - 排程行 (条目 + 准时/余量)
// ==========================================
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduledEntry {
    pub entry: ProductionEntry,
    pub deadline: NaiveDateTime,
    /// slack = deadline - overall_end (分钟, 向下取整)
    pub slack_minutes: i64,
    pub on_time: bool,
    pub conflict_note: Option<String>,
}

impl ScheduledEntry {
    pub fn evaluate(entry: ProductionEntry) -> Self {
        let deadline = entry.deadline();
        let end = entry.overall_end();
        let slack_seconds = (deadline - end).num_seconds();
        let on_time = end <= deadline;
        let conflict_note = if on_time {
            None
        } else {
            Some(format!(
                "{} 预计完工 {} 晚于交期 {}",
                entry.internal_id,
                end.format("%Y-%m-%d %H:%M"),
                deadline.format("%Y-%m-%d %H:%M")
            ))
        };

        Self {
            entry,
            deadline,
            slack_minutes: slack_seconds.div_euclid(60),
            on_time,
            conflict_note,
        }
    }

    pub fn slack_hours(&self) -> f64 {
        self.slack_minutes as f64 / 60.0
    }
}

// ==========================================
// SkippedOrder - 本次未排订单
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    DeadlinePassed,    // 交期已过且无在制
    UnknownProduct,    // BOM 中无此产品
    MissingIdentifier, // 跟踪系统缺少产品/工序映射
    BeyondHorizon,     // 工时超出可排日期范围
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::DeadlinePassed => write!(f, "deadline_passed"),
            SkipReason::UnknownProduct => write!(f, "unknown_product"),
            SkipReason::MissingIdentifier => write!(f, "missing_identifier"),
            SkipReason::BeyondHorizon => write!(f, "beyond_horizon"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkippedOrder {
    pub order_id: String,
    pub internal_id: String,
    pub reason: SkipReason,
}

// ==========================================
// Schedule - 排程快照
// ==========================================
// 一次性快照: 每次排程生成新快照,旧快照整体丢弃,不做 diff
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Schedule {
    /// 由 API 层登记时分配; 引擎产出时为空
    pub schedule_id: Option<String>,
    pub generated_at: NaiveDateTime,
    pub status: ScheduleStatus,
    pub entries: Vec<ScheduledEntry>,
    pub skipped: Vec<SkippedOrder>,
    pub conflicts: Vec<String>,
    pub notes: String,
}

impl Schedule {
    /// 从条目构建 (按整体开始时间稳定排序并计算余量)
    pub fn from_entries(
        mut entries: Vec<ProductionEntry>,
        generated_at: NaiveDateTime,
        skipped: Vec<SkippedOrder>,
    ) -> Self {
        entries.sort_by_key(|e| e.overall_start());
        Self::from_ordered_entries(entries, generated_at, skipped)
    }

    /// 从已排好序的条目构建 (保持给定顺序)
    pub fn from_ordered_entries(
        entries: Vec<ProductionEntry>,
        generated_at: NaiveDateTime,
        skipped: Vec<SkippedOrder>,
    ) -> Self {
        let entries: Vec<ScheduledEntry> = entries.into_iter().map(ScheduledEntry::evaluate).collect();
        let conflicts = entries
            .iter()
            .filter_map(|e| e.conflict_note.clone())
            .collect();

        Self {
            schedule_id: None,
            generated_at,
            status: ScheduleStatus::Proposed,
            entries,
            skipped,
            conflicts,
            notes: String::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn all_on_time(&self) -> bool {
        self.entries.iter().all(|e| e.on_time)
    }

    pub fn late_count(&self) -> usize {
        self.entries.iter().filter(|e| !e.on_time).count()
    }

    pub fn late_entries(&self) -> impl Iterator<Item = &ScheduledEntry> {
        self.entries.iter().filter(|e| !e.on_time)
    }

    /// 订单在排程中的位置
    pub fn position_of_order(&self, order_id: &str) -> Option<usize> {
        self.entries
            .iter()
            .position(|e| e.entry.order_id() == Some(order_id))
    }

    pub fn position_of_entry(&self, entry_id: &str) -> Option<usize> {
        self.entries
            .iter()
            .position(|e| e.entry.entry_id.as_deref() == Some(entry_id))
    }

    /// 新排 (非在制) 条目
    pub fn planned_entries(&self) -> impl Iterator<Item = &ScheduledEntry> {
        self.entries.iter().filter(|e| !e.entry.is_live)
    }
}
