// ==========================================
// 单线生产排程引擎 - 生产执行驱动
// ==========================================
// 职责: 按已接受排程逐条目、逐工序驱动执行端
// 流程 (每道未完工工序):
//   start_phase → 执行端执行 → complete_phase (末道工序再 complete_order)
//   失败 → 故障恢复 (落库 → 决策 → 重排 → 回写) → 按决策继续
// 红线: 决策会话取消时立即停止,排程保持最后一次接受的状态
// ==========================================

use crate::api::error::{ApiError, ApiResult};
use crate::api::scheduling_api::SchedulingApi;
use crate::domain::schedule::Schedule;
use crate::domain::types::{PhaseStatus, RecoveryDecision};
use crate::engine::decision_provider::DecisionProvider;
use crate::engine::events::{ScheduleEvent, ScheduleEventType};
use crate::engine::execution::{ExecutionCursor, OrderExecutionState, PhaseExecutor, PhaseOutcome};
use crate::engine::recovery::RecoveryOutcome;
use crate::tracking::date_writer::DateSyncReport;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

const EVENT_SOURCE: &str = "ProductionRunner";

/// 一次执行的汇总
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunReport {
    pub completed_phases: usize,
    pub completed_orders: Vec<String>,
    pub failures: usize,
    pub skipped_orders: Vec<String>,
    pub restarted_orders: Vec<String>,
    /// 缺少工序ID而无法执行的工序
    pub unbound_phases: usize,
    /// 决策会话被取消 (执行中止)
    pub cancelled: bool,
    pub sync: DateSyncReport,
    pub final_schedule: Option<Schedule>,
}

// ==========================================
// ProductionRunner - 生产执行驱动
// ==========================================
pub struct ProductionRunner {
    api: Arc<SchedulingApi>,
    executor: Arc<dyn PhaseExecutor>,
    provider: Arc<dyn DecisionProvider>,
}

impl ProductionRunner {
    pub fn new(
        api: Arc<SchedulingApi>,
        executor: Arc<dyn PhaseExecutor>,
        provider: Arc<dyn DecisionProvider>,
    ) -> Self {
        Self {
            api,
            executor,
            provider,
        }
    }

    /// 执行最后一次接受的排程直到结束或会话取消
    pub async fn run(&self) -> ApiResult<RunReport> {
        let mut schedule = self
            .api
            .last_accepted()?
            .ok_or_else(|| ApiError::NotFound("没有已接受的排程,无法执行".to_string()))?;
        let tracking = self.api.tracking().clone();

        let mut report = RunReport::default();
        let mut cursor = ExecutionCursor::new(schedule.len());

        while let OrderExecutionState::Running { phase_index } = cursor.state().clone() {
            let entry = schedule.entries[cursor.schedule_index()].entry.clone();
            let phase_count = entry.phases.len();
            let Some(phase) = entry.phases.get(phase_index).cloned() else {
                // 无工序的占位条目
                cursor.advance(phase_count)?;
                continue;
            };

            if phase.status == PhaseStatus::Completed {
                cursor.advance(phase_count)?;
                continue;
            }
            let Some(phase_id) = phase.phase_id.clone() else {
                tracing::warn!(internal_id = %entry.internal_id, phase = %phase.phase, "工序缺少跟踪ID,无法执行");
                report.unbound_phases += 1;
                cursor.advance(phase_count)?;
                continue;
            };
            let order_key = entry
                .order_id()
                .map(|s| s.to_string())
                .or_else(|| entry.entry_id.clone())
                .unwrap_or_else(|| entry.internal_id.clone());

            if phase.status != PhaseStatus::Started {
                tracking.start_phase(&phase_id).await?;
                self.api.update_phase_status(&phase_id, PhaseStatus::Started)?;
            }
            tracing::info!(internal_id = %entry.internal_id, phase = %phase.phase, "工序开工");

            match self.executor.execute(&entry, &phase).await {
                PhaseOutcome::Completed { finished_at } => {
                    tracking.complete_phase(&phase_id).await?;
                    self.api.update_phase_status(&phase_id, PhaseStatus::Completed)?;
                    schedule.entries[cursor.schedule_index()].entry.phases[phase_index].status =
                        PhaseStatus::Completed;
                    report.completed_phases += 1;
                    self.publish(&schedule, ScheduleEventType::PhaseCompleted, &order_key, Some(phase.phase), finished_at.to_string());

                    if phase_index + 1 == phase_count {
                        if let Some(entry_id) = &entry.entry_id {
                            if let Err(e) = tracking.complete_order(entry_id).await {
                                tracing::error!(entry_id = %entry_id, error = %e, "生产单完工登记失败");
                            }
                        }
                        tracing::info!(internal_id = %entry.internal_id, "订单完工");
                        report.completed_orders.push(order_key.clone());
                        self.publish(&schedule, ScheduleEventType::OrderCompleted, &order_key, None, finished_at.to_string());
                    }
                    cursor.advance(phase_count)?;
                }
                PhaseOutcome::Failed { failed_at, reason } => {
                    report.failures += 1;
                    tracing::warn!(internal_id = %entry.internal_id, phase = %phase.phase, reason = %reason, "工序失败");
                    self.api.update_phase_status(&phase_id, PhaseStatus::Failed)?;

                    let recovery = self
                        .api
                        .report_phase_failure(&order_key, &phase_id, failed_at, self.provider.as_ref())
                        .await?;
                    report.sync.merge(recovery.sync);

                    match recovery.outcome {
                        RecoveryOutcome::Resolved {
                            record,
                            decision,
                            schedule: revised,
                        } => {
                            cursor.fail(record.record_id.clone())?;
                            match decision {
                                RecoveryDecision::Skip => {
                                    report.skipped_orders.push(order_key.clone());
                                    cursor.resume_after_skip(revised.len())?;
                                }
                                RecoveryDecision::Restart => {
                                    report.restarted_orders.push(order_key.clone());
                                    cursor.resume_after_restart(revised.len())?;
                                }
                            }
                            schedule = revised;
                        }
                        RecoveryOutcome::Cancelled { record } => {
                            cursor.fail(record.record_id)?;
                            report.cancelled = true;
                            break;
                        }
                    }
                }
            }
        }

        report.final_schedule = self.api.last_accepted()?;
        tracing::info!(
            completed_phases = report.completed_phases,
            completed_orders = report.completed_orders.len(),
            failures = report.failures,
            cancelled = report.cancelled,
            "执行结束"
        );
        Ok(report)
    }

    fn publish(
        &self,
        schedule: &Schedule,
        event_type: ScheduleEventType,
        order_key: &str,
        phase: Option<crate::domain::types::PhaseName>,
        detail: String,
    ) {
        let mut event = ScheduleEvent::for_order(
            schedule.schedule_id.clone(),
            event_type,
            order_key,
            Some(EVENT_SOURCE.to_string()),
        )
        .with_detail(detail);
        event.phase = phase;
        self.api.events().publish_or_log(event);
    }
}
