// ==========================================
// 单线生产排程引擎 - 日期回写器
// ==========================================
// 职责: 把计划日期推送到跟踪服务 (工序 + 生产单)
// 规则:
// - 起止两次独立调用; 写入顺序依据已存储区间选择,
//   保证服务端 start <= end 校验在两次调用之间也成立:
//   新开始晚于旧结束 → 先写结束; 否则先写开始
// - 瞬时失败按线性退避重试,最多 max_attempts 次
// - 条目之间并发推送; 失败只记录,不中断整个回写
// 说明: 写入顺序是本跟踪服务缺少原子双字段更新的适配层处理,
//       换用其他后端时不应假定同样成立
// ==========================================

use crate::domain::schedule::ProductionEntry;
use crate::tracking::error::{TrackingError, TrackingResult};
use crate::tracking::service::TrackingService;
use chrono::NaiveDateTime;
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// 回写目标
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DateTarget {
    Phase(String),
    Order(String),
}

impl DateTarget {
    pub fn id(&self) -> &str {
        match self {
            DateTarget::Phase(id) | DateTarget::Order(id) => id,
        }
    }
}

impl fmt::Display for DateTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DateTarget::Phase(id) => write!(f, "phase:{}", id),
            DateTarget::Order(id) => write!(f, "order:{}", id),
        }
    }
}

/// 两次单字段写入的顺序
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOrder {
    StartFirst,
    EndFirst,
}

/// 依据已存储区间选择写入顺序
pub fn choose_write_order(
    previous: Option<(NaiveDateTime, NaiveDateTime)>,
    new_start: NaiveDateTime,
) -> WriteOrder {
    match previous {
        Some((_, previous_end)) if new_start > previous_end => WriteOrder::EndFirst,
        _ => WriteOrder::StartFirst,
    }
}

/// 一条区间回写请求
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DateRangeUpdate {
    pub target: DateTarget,
    pub previous: Option<(NaiveDateTime, NaiveDateTime)>,
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
}

/// 单条回写失败
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateWriteFailure {
    pub target: DateTarget,
    pub error: String,
}

/// 回写报告
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateSyncReport {
    pub attempted: usize,
    pub written: usize,
    pub retries: u32,
    /// 缺少工序ID/生产单ID 而无法回写的数量
    pub skipped_unbound: usize,
    pub failures: Vec<DateWriteFailure>,
}

impl DateSyncReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty() && self.skipped_unbound == 0
    }

    pub fn merge(&mut self, other: DateSyncReport) {
        self.attempted += other.attempted;
        self.written += other.written;
        self.retries += other.retries;
        self.skipped_unbound += other.skipped_unbound;
        self.failures.extend(other.failures);
    }
}

/// 从条目收集已存储区间 (工序ID / 生产单ID → 区间)
pub fn stored_ranges(entries: &[ProductionEntry]) -> HashMap<String, (NaiveDateTime, NaiveDateTime)> {
    let mut ranges = HashMap::new();
    for entry in entries {
        if let Some(entry_id) = &entry.entry_id {
            ranges.insert(entry_id.clone(), (entry.overall_start(), entry.overall_end()));
        }
        for phase in &entry.phases {
            if let Some(phase_id) = &phase.phase_id {
                ranges.insert(phase_id.clone(), (phase.start, phase.end));
            }
        }
    }
    ranges
}

// ==========================================
// DateWriter - 日期回写器
// ==========================================
#[derive(Clone)]
pub struct DateWriter {
    service: Arc<dyn TrackingService>,
    max_attempts: u32,
    backoff: Duration,
}

impl DateWriter {
    pub fn new(service: Arc<dyn TrackingService>, max_attempts: u32, backoff: Duration) -> Self {
        Self {
            service,
            max_attempts: max_attempts.max(1),
            backoff,
        }
    }

    /// 条目的全部回写请求 (工序在前,生产单在后)
    ///
    /// 已开工/已完工工序不回写; 缺少ID的工序计入 skipped_unbound。
    pub fn updates_for_entry(
        entry: &ProductionEntry,
        stored: &HashMap<String, (NaiveDateTime, NaiveDateTime)>,
    ) -> (Vec<DateRangeUpdate>, usize) {
        let mut updates = Vec::with_capacity(entry.phases.len() + 1);
        let mut unbound = 0;

        for phase in &entry.phases {
            if phase.status.is_checkpoint() {
                continue;
            }
            match &phase.phase_id {
                Some(phase_id) => updates.push(DateRangeUpdate {
                    target: DateTarget::Phase(phase_id.clone()),
                    previous: stored.get(phase_id).copied(),
                    start: phase.start,
                    end: phase.end,
                }),
                None => unbound += 1,
            }
        }

        match &entry.entry_id {
            Some(entry_id) if !entry.phases.is_empty() => updates.push(DateRangeUpdate {
                target: DateTarget::Order(entry_id.clone()),
                previous: stored.get(entry_id).copied(),
                start: entry.overall_start(),
                end: entry.overall_end(),
            }),
            Some(_) => {}
            None => unbound += 1,
        }

        (updates, unbound)
    }

    /// 推送一组条目 (条目间并发,条目内顺序)
    pub async fn push_entries(
        &self,
        entries: &[ProductionEntry],
        stored: &HashMap<String, (NaiveDateTime, NaiveDateTime)>,
    ) -> DateSyncReport {
        let futures = entries.iter().map(|entry| {
            let (updates, unbound) = Self::updates_for_entry(entry, stored);
            async move {
                let mut report = self.push_updates(updates).await;
                report.skipped_unbound += unbound;
                if unbound > 0 {
                    tracing::warn!(internal_id = %entry.internal_id, unbound, "条目缺少跟踪ID,部分日期未回写");
                }
                report
            }
        });

        let mut report = DateSyncReport::default();
        for part in join_all(futures).await {
            report.merge(part);
        }

        tracing::info!(
            attempted = report.attempted,
            written = report.written,
            retries = report.retries,
            failed = report.failures.len(),
            "日期回写完成"
        );
        report
    }

    /// 顺序推送一组区间
    pub async fn push_updates(&self, updates: Vec<DateRangeUpdate>) -> DateSyncReport {
        let mut report = DateSyncReport::default();
        for update in updates {
            report.attempted += 1;
            match self.push_range(&update).await {
                Ok(retries) => {
                    report.written += 1;
                    report.retries += retries;
                }
                Err((retries, e)) => {
                    report.retries += retries;
                    tracing::error!(target_id = %update.target, error = %e, "日期回写失败,保留内部计划");
                    report.failures.push(DateWriteFailure {
                        target: update.target.clone(),
                        error: e.to_string(),
                    });
                }
            }
        }
        report
    }

    /// 推送单个区间; 返回重试次数
    pub async fn push_range(&self, update: &DateRangeUpdate) -> Result<u32, (u32, TrackingError)> {
        let mut retries = 0;
        let steps = match choose_write_order(update.previous, update.start) {
            WriteOrder::StartFirst => [Field::Start, Field::End],
            WriteOrder::EndFirst => [Field::End, Field::Start],
        };

        for field in steps {
            let value = match field {
                Field::Start => update.start,
                Field::End => update.end,
            };
            match self.write_with_retry(&update.target, field, value).await {
                Ok(r) => retries += r,
                Err((r, e)) => return Err((retries + r, e)),
            }
        }
        Ok(retries)
    }

    async fn write_with_retry(
        &self,
        target: &DateTarget,
        field: Field,
        value: NaiveDateTime,
    ) -> Result<u32, (u32, TrackingError)> {
        let mut attempt: u32 = 0;
        loop {
            attempt += 1;
            match self.write_once(target, field, value).await {
                Ok(()) => return Ok(attempt - 1),
                Err(e) if e.is_transient() && attempt < self.max_attempts => {
                    tracing::debug!(target_id = %target, attempt, error = %e, "瞬时失败,退避后重试");
                    tokio::time::sleep(self.backoff * attempt).await;
                }
                Err(e) => return Err((attempt - 1, e)),
            }
        }
    }

    async fn write_once(&self, target: &DateTarget, field: Field, value: NaiveDateTime) -> TrackingResult<()> {
        match (target, field) {
            (DateTarget::Phase(id), Field::Start) => self.service.update_phase_start(id, value).await,
            (DateTarget::Phase(id), Field::End) => self.service.update_phase_end(id, value).await,
            (DateTarget::Order(id), Field::Start) => self.service.update_order_start(id, value).await,
            (DateTarget::Order(id), Field::End) => self.service.update_order_end(id, value).await,
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum Field {
    Start,
    End,
}
