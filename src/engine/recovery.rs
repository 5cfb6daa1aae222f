// ==========================================
// 单线生产排程引擎 - 故障恢复协调器
// ==========================================
// 职责: 工序失败 → 落库故障记录 → 等待人工决策 → 重排
// 决策:
// - skip: 移除失败条目,其后条目按原相对顺序从当前时刻重排 (长度 -1)
// - restart: 失败条目从首工序重排 (忽略已有检查点),其后条目从其新结束时间起重排 (长度不变)
// 红线:
// - 故障记录必须在请求决策之前落库
// - 等待决策没有超时,也没有默认决策
// - 其他条目上已开工/已完工的工序永不改写
// ==========================================

use crate::domain::failure::{FailureEvent, FailureRecord};
use crate::domain::schedule::{ProductionEntry, Schedule};
use crate::domain::types::RecoveryDecision;
use crate::engine::assembler::ScheduleAssembler;
use crate::engine::decision_provider::{DecisionPrompt, DecisionProvider, DecisionReply};
use crate::engine::error::{EngineError, EngineResult, RecoveryResult};
use crate::engine::events::{OptionalEventPublisher, ScheduleEvent, ScheduleEventType};
use crate::repository::FailureRecordRepository;
use chrono::NaiveDateTime;
use std::sync::Arc;
use tracing::instrument;
use uuid::Uuid;

/// 恢复流程结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecoveryOutcome {
    /// 已决策并重排
    Resolved {
        record: FailureRecord,
        decision: RecoveryDecision,
        schedule: Schedule,
    },
    /// 会话被取消; 记录保持未决,可在重启后继续
    Cancelled { record: FailureRecord },
}

// ==========================================
// FailureRecoveryCoordinator - 故障恢复协调器
// ==========================================
pub struct FailureRecoveryCoordinator {
    assembler: ScheduleAssembler,
    record_repo: Arc<FailureRecordRepository>,
    event_publisher: OptionalEventPublisher,
}

impl FailureRecoveryCoordinator {
    pub fn new(assembler: ScheduleAssembler, record_repo: Arc<FailureRecordRepository>) -> Self {
        Self {
            assembler,
            record_repo,
            event_publisher: OptionalEventPublisher::none(),
        }
    }

    pub fn with_event_publisher(mut self, publisher: OptionalEventPublisher) -> Self {
        self.event_publisher = publisher;
        self
    }

    pub fn record_repo(&self) -> &Arc<FailureRecordRepository> {
        &self.record_repo
    }

    /// 由失败事件构建故障记录 (不落库)
    ///
    /// 订单定位: 先按订单ID,再按生产单ID (未关联订单的占位条目)。
    pub fn open_record(&self, schedule: &Schedule, event: &FailureEvent) -> EngineResult<FailureRecord> {
        let position = schedule
            .position_of_order(&event.order_id)
            .or_else(|| schedule.position_of_entry(&event.order_id))
            .ok_or_else(|| {
                EngineError::OrderMismatch(format!("排程中不存在订单 {}", event.order_id))
            })?;

        let entry = &schedule.entries[position].entry;
        let (_, phase) = entry.find_phase(&event.phase_id).ok_or_else(|| {
            EngineError::OrderMismatch(format!(
                "订单 {} 不含工序 {}",
                event.order_id, event.phase_id
            ))
        })?;

        Ok(FailureRecord {
            record_id: Uuid::new_v4().to_string(),
            schedule_position: position,
            order_id: entry.order_id().map(|s| s.to_string()),
            entry_id: entry.entry_id.clone(),
            internal_id: entry.internal_id.clone(),
            failed_phase_id: Some(event.phase_id.clone()),
            failed_phase: phase.phase,
            failed_at: event.reported_at,
            entry_snapshot: entry.clone(),
            schedule_snapshot: schedule.clone(),
            decision: None,
            resolved_at: None,
        })
    }

    /// 应用恢复决策 (纯函数)
    ///
    /// # 参数
    /// - schedule: 失败发生时的排程
    /// - position: 失败条目位置
    /// - decision: skip / restart
    /// - now: 重排起点
    pub fn apply_decision(
        &self,
        schedule: &Schedule,
        position: usize,
        decision: RecoveryDecision,
        now: NaiveDateTime,
    ) -> EngineResult<Schedule> {
        if position >= schedule.len() {
            return Err(EngineError::PositionOutOfRange {
                position,
                len: schedule.len(),
            });
        }

        let entries: Vec<ProductionEntry> = schedule.entries.iter().map(|e| e.entry.clone()).collect();
        let mut prefix: Vec<ProductionEntry> = entries[..position].to_vec();
        let failed = entries[position].clone();
        let suffix: Vec<ProductionEntry> = entries[position + 1..].to_vec();

        // 产线在前序条目结束前不空闲
        let mut cursor = self.assembler.planner().calendar().snap_to_shift(now);
        if let Some(latest) = prefix.iter().map(|e| e.overall_end()).max() {
            cursor = cursor.max(latest);
        }

        match decision {
            RecoveryDecision::Skip => {
                let (replanned, _) = self.assembler.replan_sequence(suffix, cursor);
                prefix.extend(replanned);
            }
            RecoveryDecision::Restart => {
                let blocked = self.assembler.blocked_ranges(&suffix);
                let (restarted, next_cursor) = self.assembler.replan_around(&failed, cursor, &blocked)?;
                let (replanned, _) = self.assembler.replan_sequence(suffix, next_cursor);
                let mut tail = Vec::with_capacity(replanned.len() + 1);
                tail.push(restarted);
                tail.extend(replanned);
                tail.sort_by_key(|e| e.overall_start());
                prefix.extend(tail);
            }
        }

        let mut revised = Schedule::from_ordered_entries(prefix, now, schedule.skipped.clone());
        revised.status = schedule.status;
        revised.notes = format!(
            "{} 工序失败后按 {} 重排",
            failed.internal_id, decision
        );

        tracing::info!(
            internal_id = %failed.internal_id,
            decision = %decision,
            before = schedule.len(),
            after = revised.len(),
            late = revised.late_count(),
            "故障恢复重排完成"
        );
        Ok(revised)
    }

    /// 处理一次工序失败
    ///
    /// 1. 构建并落库故障记录
    /// 2. 请求人工决策 (无效回答重新询问)
    /// 3. 重排并登记决策
    #[instrument(skip(self, schedule, provider), fields(order_id = %event.order_id, phase_id = %event.phase_id))]
    pub async fn handle_failure(
        &self,
        schedule: &Schedule,
        event: FailureEvent,
        now: NaiveDateTime,
        provider: &dyn DecisionProvider,
    ) -> RecoveryResult<RecoveryOutcome> {
        let record = self.record_failure(schedule, &event)?;
        self.resolve(record, now, provider).await
    }

    /// 构建并落库故障记录,发布 PhaseFailed 事件
    pub fn record_failure(&self, schedule: &Schedule, event: &FailureEvent) -> RecoveryResult<FailureRecord> {
        let record = self.open_record(schedule, event)?;
        self.record_repo.insert(&record)?;

        tracing::warn!(
            record_id = %record.record_id,
            internal_id = %record.internal_id,
            phase = %record.failed_phase,
            position = record.schedule_position,
            "工序失败,已落库故障记录,等待人工决策"
        );

        let failed_event = ScheduleEvent::for_order(
            schedule.schedule_id.clone(),
            ScheduleEventType::PhaseFailed,
            record.order_id.clone().unwrap_or_else(|| record.internal_id.clone()),
            Some("FailureRecoveryCoordinator".to_string()),
        )
        .with_phase(record.failed_phase)
        .with_detail(record.record_id.clone());
        self.event_publisher.publish_or_log(failed_event);

        Ok(record)
    }

    /// 继续一条未决故障记录 (进程重启后)
    pub async fn resume(
        &self,
        record: FailureRecord,
        now: NaiveDateTime,
        provider: &dyn DecisionProvider,
    ) -> RecoveryResult<RecoveryOutcome> {
        if !record.is_open() {
            return Err(EngineError::InvalidTransition {
                from: record
                    .decision
                    .map(|d| d.to_db_str().to_string())
                    .unwrap_or_default(),
                action: "resume".to_string(),
            }
            .into());
        }
        tracing::info!(record_id = %record.record_id, "继续未决故障记录");
        self.resolve(record, now, provider).await
    }

    async fn resolve(
        &self,
        mut record: FailureRecord,
        now: NaiveDateTime,
        provider: &dyn DecisionProvider,
    ) -> RecoveryResult<RecoveryOutcome> {
        verify_snapshot(&record)?;

        let Some(decision) = self.await_decision(&record, provider).await else {
            tracing::warn!(record_id = %record.record_id, "决策会话被取消,故障记录保持未决");
            return Ok(RecoveryOutcome::Cancelled { record });
        };

        let schedule = self.apply_decision(
            &record.schedule_snapshot,
            record.schedule_position,
            decision,
            now,
        )?;
        self.record_repo.resolve(&record.record_id, decision, now)?;
        record.decision = Some(decision);
        record.resolved_at = Some(now);

        for late in schedule.late_entries() {
            let key = late
                .entry
                .order_id()
                .unwrap_or(late.entry.internal_id.as_str())
                .to_string();
            self.event_publisher.publish_or_log(
                ScheduleEvent::for_order(
                    schedule.schedule_id.clone(),
                    ScheduleEventType::DeadlineAtRisk,
                    key,
                    Some("FailureRecoveryCoordinator".to_string()),
                )
                .with_detail(format!("slack_minutes={}", late.slack_minutes)),
            );
        }

        Ok(RecoveryOutcome::Resolved {
            record,
            decision,
            schedule,
        })
    }

    /// 循环询问直到得到有效决策; None = 会话取消
    async fn await_decision(
        &self,
        record: &FailureRecord,
        provider: &dyn DecisionProvider,
    ) -> Option<RecoveryDecision> {
        let mut attempt: u32 = 0;
        let mut last_error: Option<String> = None;

        loop {
            attempt += 1;
            let prompt = DecisionPrompt::for_record(record, attempt, last_error.take());
            match provider.request_decision(prompt).await {
                DecisionReply::Cancelled => return None,
                DecisionReply::Answer(text) => match text.parse::<RecoveryDecision>() {
                    Ok(decision) => {
                        tracing::info!(record_id = %record.record_id, decision = %decision, attempt, "收到恢复决策");
                        return Some(decision);
                    }
                    Err(e) => {
                        tracing::warn!(record_id = %record.record_id, input = %text, attempt, "无效的恢复决策,重新询问");
                        last_error = Some(e.to_string());
                    }
                },
            }
        }
    }
}

/// 故障记录与其排程快照一致性校验
fn verify_snapshot(record: &FailureRecord) -> EngineResult<()> {
    let schedule = &record.schedule_snapshot;
    let entry = schedule
        .entries
        .get(record.schedule_position)
        .ok_or(EngineError::PositionOutOfRange {
            position: record.schedule_position,
            len: schedule.len(),
        })?;

    if entry.entry.entry_id != record.entry_id || entry.entry.order_id() != record.order_id.as_deref() {
        return Err(EngineError::OrderMismatch(format!(
            "位置 {} 的条目为 {},记录为 {}",
            record.schedule_position, entry.entry.internal_id, record.internal_id
        )));
    }
    Ok(())
}
