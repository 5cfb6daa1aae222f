// ==========================================
// 单线生产排程引擎 - 排程 API
// ==========================================
// 职责: 串联跟踪服务读取 → 排程组装 → 接受回写 → 编辑重排 → 故障恢复
// 红线:
// - 提议排程不做任何远端写入
// - 编辑后整体重排,不做增量修补
// - 决策会话取消时保持最后一次接受的排程
// ==========================================

use crate::api::error::{ApiError, ApiResult};
use crate::config::engine_config::EngineConfig;
use crate::domain::failure::{FailureEvent, FailureRecord};
use crate::domain::schedule::{ProductionEntry, Schedule};
use crate::domain::types::{PhaseStatus, RecoveryDecision, ScheduleStatus};
use crate::engine::assembler::ScheduleAssembler;
use crate::engine::bom::BillOfMaterials;
use crate::engine::decision_provider::DecisionProvider;
use crate::engine::events::{OptionalEventPublisher, ScheduleEvent, ScheduleEventType};
use crate::engine::planner::PhasePlanner;
use crate::engine::recovery::{FailureRecoveryCoordinator, RecoveryOutcome};
use crate::engine::sequencer::OrderSequencer;
use crate::repository::FailureRecordRepository;
use crate::tracking::date_writer::{stored_ranges, DateSyncReport, DateWriter};
use crate::tracking::dto::ProductionOrderRecord;
use crate::tracking::service::{load_bom, load_live_snapshot, TrackingService};
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::instrument;
use uuid::Uuid;

const EVENT_SOURCE: &str = "SchedulingApi";

/// 接受排程的结果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AcceptReport {
    pub schedule: Schedule,
    /// 新建的生产单数量
    pub created: usize,
    /// 创建失败的条目 (展示编号, 原因)
    pub creation_failures: Vec<(String, String)>,
    pub sync: DateSyncReport,
}

/// 故障恢复后的结果 (含跟踪服务同步)
#[derive(Debug, Clone, PartialEq)]
pub struct RecoveryReport {
    pub outcome: RecoveryOutcome,
    pub sync: DateSyncReport,
}

#[derive(Debug, Default)]
struct ScheduleBook {
    proposals: HashMap<String, Schedule>,
    last_accepted: Option<Schedule>,
}

// ==========================================
// SchedulingApi - 排程 API
// ==========================================
pub struct SchedulingApi {
    tracking: Arc<dyn TrackingService>,
    assembler: ScheduleAssembler,
    sequencer: OrderSequencer,
    coordinator: FailureRecoveryCoordinator,
    date_writer: DateWriter,
    event_publisher: OptionalEventPublisher,
    book: Mutex<ScheduleBook>,
}

impl SchedulingApi {
    /// 创建 API 实例
    ///
    /// 班次或排序策略无效时返回错误。
    pub fn new(
        tracking: Arc<dyn TrackingService>,
        config: &EngineConfig,
        bom: BillOfMaterials,
        record_repo: Arc<FailureRecordRepository>,
    ) -> ApiResult<Self> {
        let planner = PhasePlanner::new(config.calendar()?, bom);
        let assembler = ScheduleAssembler::new(planner);
        let coordinator = FailureRecoveryCoordinator::new(assembler.clone(), record_repo);
        let date_writer = DateWriter::new(
            tracking.clone(),
            config.date_write_max_attempts,
            config.date_write_backoff(),
        );

        Ok(Self {
            tracking,
            assembler,
            sequencer: config.sequencer()?,
            coordinator,
            date_writer,
            event_publisher: OptionalEventPublisher::none(),
            book: Mutex::new(ScheduleBook::default()),
        })
    }

    /// 以跟踪服务的 BOM 表创建 API 实例
    pub async fn connect(
        tracking: Arc<dyn TrackingService>,
        config: &EngineConfig,
        record_repo: Arc<FailureRecordRepository>,
    ) -> ApiResult<Self> {
        let bom = load_bom(tracking.as_ref()).await?;
        if bom.product_codes().next().is_none() {
            tracing::warn!("跟踪服务 BOM 表为空,所有订单都将因未知产品被跳过");
        }
        Self::new(tracking, config, bom, record_repo)
    }

    pub fn with_event_publisher(mut self, publisher: OptionalEventPublisher) -> Self {
        self.coordinator = self.coordinator.with_event_publisher(publisher.clone());
        self.event_publisher = publisher;
        self
    }

    pub fn events(&self) -> &OptionalEventPublisher {
        &self.event_publisher
    }

    pub fn tracking(&self) -> &Arc<dyn TrackingService> {
        &self.tracking
    }

    fn book(&self) -> ApiResult<MutexGuard<'_, ScheduleBook>> {
        self.book
            .lock()
            .map_err(|e| ApiError::InternalError(format!("排程簿锁失效: {}", e)))
    }

    /// 最后一次接受 (或恢复后) 的排程
    pub fn last_accepted(&self) -> ApiResult<Option<Schedule>> {
        Ok(self.book()?.last_accepted.clone())
    }

    pub fn proposal(&self, schedule_id: &str) -> ApiResult<Option<Schedule>> {
        Ok(self.book()?.proposals.get(schedule_id).cloned())
    }

    // ==========================================
    // 提议 / 接受 / 拒绝
    // ==========================================

    /// 读取现场状态并生成提议排程 (不做远端写入)
    #[instrument(skip(self, hint), fields(hint = hint.len()))]
    pub async fn propose_schedule(&self, now: NaiveDateTime, hint: &[String]) -> ApiResult<Schedule> {
        let snapshot = load_live_snapshot(self.tracking.as_ref()).await?;

        let mut schedule = self.assembler.build_schedule(
            snapshot.entries,
            snapshot.orders,
            now,
            &self.sequencer,
            hint,
        );
        let schedule_id = Uuid::new_v4().to_string();
        schedule.schedule_id = Some(schedule_id.clone());

        self.book()?.proposals.insert(schedule_id.clone(), schedule.clone());

        self.event_publisher.publish_or_log(
            ScheduleEvent::schedule_level(
                Some(schedule_id),
                ScheduleEventType::ScheduleProposed,
                Some(EVENT_SOURCE.to_string()),
            )
            .with_detail(format!(
                "entries={} late={} skipped={}",
                schedule.len(),
                schedule.late_count(),
                schedule.skipped.len()
            )),
        );
        Ok(schedule)
    }

    /// 接受提议排程
    ///
    /// 为新排条目创建生产单并生成工序,按工序名称绑定工序ID,
    /// 然后回写全部计划日期。单条失败只记录,不中断。
    #[instrument(skip(self))]
    pub async fn accept_schedule(&self, schedule_id: &str) -> ApiResult<AcceptReport> {
        let mut schedule = self.take_proposal(schedule_id, ScheduleStatus::Accepted)?;

        let mut created = 0;
        let mut creation_failures = Vec::new();
        let mut to_push: Vec<ProductionEntry> = Vec::new();

        for scheduled in schedule.entries.iter_mut() {
            if scheduled.entry.is_live || scheduled.entry.entry_id.is_some() {
                continue;
            }
            match self.create_entry(&scheduled.entry).await {
                Ok(record) => {
                    bind_phase_ids(&mut scheduled.entry, &record);
                    created += 1;
                    to_push.push(scheduled.entry.clone());
                }
                Err(e) => {
                    tracing::error!(
                        internal_id = %scheduled.entry.internal_id,
                        error = %e,
                        "生产单创建失败,条目保留内部计划"
                    );
                    creation_failures.push((scheduled.entry.internal_id.clone(), e.to_string()));
                }
            }
        }

        // 新建工序尚无日期,不存在旧区间
        let sync = self.date_writer.push_entries(&to_push, &HashMap::new()).await;

        schedule.status = ScheduleStatus::Accepted;
        self.book()?.last_accepted = Some(schedule.clone());

        self.event_publisher.publish_or_log(
            ScheduleEvent::schedule_level(
                schedule.schedule_id.clone(),
                ScheduleEventType::ScheduleAccepted,
                Some(EVENT_SOURCE.to_string()),
            )
            .with_detail(format!("created={} failed={}", created, creation_failures.len())),
        );
        tracing::info!(schedule_id, created, failed = creation_failures.len(), "排程已接受");

        Ok(AcceptReport {
            schedule,
            created,
            creation_failures,
            sync,
        })
    }

    /// 拒绝提议排程
    pub fn reject_schedule(&self, schedule_id: &str, reason: &str) -> ApiResult<Schedule> {
        let mut schedule = self.take_proposal(schedule_id, ScheduleStatus::Rejected)?;
        schedule.status = ScheduleStatus::Rejected;
        schedule.notes = reason.to_string();

        self.event_publisher.publish_or_log(
            ScheduleEvent::schedule_level(
                schedule.schedule_id.clone(),
                ScheduleEventType::ScheduleRejected,
                Some(EVENT_SOURCE.to_string()),
            )
            .with_detail(reason),
        );
        tracing::info!(schedule_id, reason, "排程已拒绝");
        Ok(schedule)
    }

    fn take_proposal(&self, schedule_id: &str, target: ScheduleStatus) -> ApiResult<Schedule> {
        let mut book = self.book()?;
        let schedule = book
            .proposals
            .remove(schedule_id)
            .ok_or_else(|| ApiError::NotFound(format!("提议排程 {} 不存在或已处理", schedule_id)))?;
        if schedule.status != ScheduleStatus::Proposed {
            return Err(ApiError::InvalidStateTransition {
                from: schedule.status.to_string(),
                to: target.to_string(),
            });
        }
        Ok(schedule)
    }

    async fn create_entry(&self, entry: &ProductionEntry) -> ApiResult<ProductionOrderRecord> {
        let record = self
            .tracking
            .create_production_order(
                &entry.product_code,
                entry.quantity,
                entry.overall_start(),
                entry.overall_end(),
                entry.order_id(),
            )
            .await?;
        Ok(self.tracking.generate_phases(&record.id).await?)
    }

    // ==========================================
    // 订单编辑 (写入跟踪服务后整体重排)
    // ==========================================

    pub async fn edit_priority(&self, order_id: &str, priority: u8, now: NaiveDateTime) -> ApiResult<Schedule> {
        if priority == 0 {
            return Err(ApiError::InvalidInput("优先级必须为正整数".to_string()));
        }
        self.tracking.update_sales_order_priority(order_id, priority).await?;
        self.after_edit(order_id, format!("priority={}", priority), now).await
    }

    pub async fn edit_quantity(&self, order_id: &str, quantity: u32, now: NaiveDateTime) -> ApiResult<Schedule> {
        if quantity == 0 {
            return Err(ApiError::InvalidInput("数量必须为正整数".to_string()));
        }
        self.tracking.update_sales_order_quantity(order_id, quantity).await?;
        self.after_edit(order_id, format!("quantity={}", quantity), now).await
    }

    pub async fn edit_notes(&self, order_id: &str, notes: &str, now: NaiveDateTime) -> ApiResult<Schedule> {
        self.tracking.update_sales_order_notes(order_id, notes).await?;
        self.after_edit(order_id, "notes".to_string(), now).await
    }

    async fn after_edit(&self, order_id: &str, detail: String, now: NaiveDateTime) -> ApiResult<Schedule> {
        tracing::info!(order_id, change = %detail, "订单已编辑,整体重排");
        self.event_publisher.publish_or_log(
            ScheduleEvent::for_order(
                None,
                ScheduleEventType::OrderEdited,
                order_id.to_string(),
                Some(EVENT_SOURCE.to_string()),
            )
            .with_detail(detail),
        );
        self.propose_schedule(now, &[]).await
    }

    // ==========================================
    // 执行进度与故障恢复
    // ==========================================

    /// 登记工序状态到最后接受的排程 (执行进度)
    pub fn update_phase_status(&self, phase_id: &str, status: PhaseStatus) -> ApiResult<()> {
        let mut book = self.book()?;
        let schedule = book
            .last_accepted
            .as_mut()
            .ok_or_else(|| ApiError::NotFound("没有已接受的排程".to_string()))?;
        let phase = schedule
            .entries
            .iter_mut()
            .flat_map(|e| e.entry.phases.iter_mut())
            .find(|p| p.phase_id.as_deref() == Some(phase_id))
            .ok_or_else(|| ApiError::NotFound(format!("已接受排程中不存在工序 {}", phase_id)))?;
        phase.status = status;
        Ok(())
    }

    /// 处理执行端上报的工序失败
    ///
    /// 故障记录先落库,再请求决策; 取消时保持最后接受的排程不变。
    #[instrument(skip(self, provider))]
    pub async fn report_phase_failure(
        &self,
        order_id: &str,
        phase_id: &str,
        now: NaiveDateTime,
        provider: &dyn DecisionProvider,
    ) -> ApiResult<RecoveryReport> {
        let schedule = self
            .last_accepted()?
            .ok_or_else(|| ApiError::NotFound("没有已接受的排程,无法处理失败".to_string()))?;

        let event = FailureEvent {
            order_id: order_id.to_string(),
            phase_id: phase_id.to_string(),
            reported_at: now,
        };
        let outcome = self
            .coordinator
            .handle_failure(&schedule, event, now, provider)
            .await?;
        self.settle(outcome).await
    }

    /// 继续最早一条未决故障记录 (进程重启后)
    pub async fn resume_open_failure(
        &self,
        now: NaiveDateTime,
        provider: &dyn DecisionProvider,
    ) -> ApiResult<Option<RecoveryReport>> {
        let Some(record) = self.coordinator.record_repo().find_open()? else {
            return Ok(None);
        };
        let outcome = self.coordinator.resume(record, now, provider).await?;
        Ok(Some(self.settle(outcome).await?))
    }

    async fn settle(&self, outcome: RecoveryOutcome) -> ApiResult<RecoveryReport> {
        let sync = match &outcome {
            RecoveryOutcome::Resolved {
                record,
                decision,
                schedule,
            } => {
                let mut revised = schedule.clone();
                revised.schedule_id = Some(Uuid::new_v4().to_string());
                let sync = self.sync_recovery(record, *decision, &revised).await;
                self.book()?.last_accepted = Some(revised.clone());
                return Ok(RecoveryReport {
                    outcome: RecoveryOutcome::Resolved {
                        record: record.clone(),
                        decision: *decision,
                        schedule: revised,
                    },
                    sync,
                });
            }
            RecoveryOutcome::Cancelled { record } => {
                tracing::warn!(
                    record_id = %record.record_id,
                    "决策会话取消,保持最后一次接受的排程"
                );
                DateSyncReport::default()
            }
        };
        Ok(RecoveryReport { outcome, sync })
    }

    /// 把恢复决策同步到跟踪服务
    ///
    /// - skip: 删除失败条目的生产单
    /// - restart: 失败条目全部工序回到 ready
    /// 之后回写失败位置及其后全部条目的新日期。
    async fn sync_recovery(
        &self,
        record: &FailureRecord,
        decision: RecoveryDecision,
        revised: &Schedule,
    ) -> DateSyncReport {
        match decision {
            RecoveryDecision::Skip => {
                if let Some(entry_id) = &record.entry_id {
                    if let Err(e) = self.tracking.delete_production_order(entry_id).await {
                        tracing::error!(entry_id = %entry_id, error = %e, "跳过的生产单删除失败");
                    }
                }
            }
            RecoveryDecision::Restart => {
                for phase_id in record.entry_snapshot.phases.iter().filter_map(|p| p.phase_id.as_ref()) {
                    if let Err(e) = self.tracking.reset_phase(phase_id).await {
                        tracing::error!(phase_id = %phase_id, error = %e, "工序重置失败");
                    }
                }
            }
        }

        let stored = stored_ranges(
            &record
                .schedule_snapshot
                .entries
                .iter()
                .map(|e| e.entry.clone())
                .collect::<Vec<_>>(),
        );
        let moved: Vec<ProductionEntry> = revised
            .entries
            .iter()
            .skip(record.schedule_position)
            .map(|e| e.entry.clone())
            .collect();
        self.date_writer.push_entries(&moved, &stored).await
    }
}

/// 按工序名称把跟踪服务生成的工序ID绑定到计划工序
fn bind_phase_ids(entry: &mut ProductionEntry, record: &ProductionOrderRecord) {
    entry.entry_id = Some(record.id.clone());
    for phase in entry.phases.iter_mut() {
        let matched = record
            .phases
            .iter()
            .find(|p| p.phase_name().map(|name| name == phase.phase).unwrap_or(false));
        match matched {
            Some(remote) => phase.phase_id = Some(remote.id.clone()),
            None => tracing::warn!(
                production_order_id = %record.id,
                phase = %phase.phase,
                "跟踪服务未生成对应工序,该工序日期不回写"
            ),
        }
    }
}
