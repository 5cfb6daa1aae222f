// ==========================================
// 单线生产排程引擎 - 排程装配器
// ==========================================
// 职责: 在制条目 + 订单集合 + 当前时刻 → 排程快照
// 流程:
// 1. 在制条目与订单匹配 (显式关联优先, 其次 产品+数量)
// 2. 交期已过且无在制的订单剔除 (记入 skipped)
// 3. 排序器给出待排订单全序 (可带外部重排提示)
// 4. 游标 = max(当前时刻对齐班次, 全部在制条目的最晚结束)
// 5. 依次计划订单并推进游标
// 6. 在制 + 新排 按整体开始时间排序,计算余量
// 红线: 在制条目原样保留,已开工/已完工工序的时间戳永不改写
// ==========================================

use crate::domain::order::Order;
use crate::domain::schedule::{ProductionEntry, Schedule, SkipReason, SkippedOrder};
use crate::engine::error::{EngineError, EngineResult};
use crate::engine::planner::PhasePlanner;
use crate::engine::sequencer::OrderSequencer;
use chrono::NaiveDateTime;
use std::collections::HashSet;
use tracing::instrument;

// ==========================================
// ScheduleAssembler - 排程装配器
// ==========================================
#[derive(Debug, Clone)]
pub struct ScheduleAssembler {
    planner: PhasePlanner,
}

impl ScheduleAssembler {
    pub fn new(planner: PhasePlanner) -> Self {
        Self { planner }
    }

    pub fn planner(&self) -> &PhasePlanner {
        &self.planner
    }

    /// 生成排程快照
    ///
    /// # 参数
    /// - live_entries: 执行端已知的生产条目 (权威)
    /// - orders: 全部销售订单 (已关联在制条目的订单不会重复排产)
    /// - now: 当前时刻 (工厂本地时间)
    /// - sequencer: 排序器
    /// - hint: 外部重排提示 (订单ID 子序列, 可为空)
    ///
    /// # 返回
    /// - status = proposed 的排程快照; 相同输入两次调用结果完全相同
    #[instrument(skip_all, fields(live = live_entries.len(), orders = orders.len(), policy = %sequencer.policy()))]
    pub fn build_schedule(
        &self,
        live_entries: Vec<ProductionEntry>,
        orders: Vec<Order>,
        now: NaiveDateTime,
        sequencer: &OrderSequencer,
        hint: &[String],
    ) -> Schedule {
        // ===== 1. 在制条目与订单匹配 =====
        let (live_entries, pending) = match_live_entries(live_entries, orders);

        // ===== 2. 剔除过期订单 / 已结束的过期在制 =====
        let mut skipped: Vec<SkippedOrder> = Vec::new();
        let mut schedulable: Vec<Order> = Vec::with_capacity(pending.len());
        for order in pending {
            if order.is_overdue(now) {
                tracing::info!(
                    order_id = %order.order_id,
                    internal_id = %order.internal_id,
                    deadline = %order.deadline,
                    "订单交期已过且无在制,本次不排"
                );
                skipped.push(SkippedOrder {
                    order_id: order.order_id.clone(),
                    internal_id: order.internal_id.clone(),
                    reason: SkipReason::DeadlinePassed,
                });
            } else {
                schedulable.push(order);
            }
        }

        // ===== 4. 初始化游标 (占线按全部在制计算, 与是否展示无关) =====
        let mut cursor = self.planner.calendar().snap_to_shift(now);
        if let Some(latest) = live_entries.iter().map(|e| e.overall_end()).max() {
            cursor = cursor.max(latest);
        }

        let kept_live: Vec<ProductionEntry> = live_entries
            .into_iter()
            .filter(|e| e.deadline() > now || e.overall_end() > now)
            .collect();

        // ===== 3. 排序 =====
        let sequenced = sequencer.sequence_with_hint(schedulable, hint, self.planner.bom(), now);

        // ===== 5. 依次计划 =====
        let mut planned: Vec<ProductionEntry> = Vec::with_capacity(sequenced.len());
        for order in sequenced {
            match self.planner.plan_order(&order, cursor) {
                Ok((entry, next_cursor)) => {
                    planned.push(entry);
                    cursor = next_cursor;
                }
                Err(e) => {
                    tracing::warn!(
                        order_id = %order.order_id,
                        product_code = %order.product_code,
                        error = %e,
                        "订单无法计划,跳过"
                    );
                    skipped.push(SkippedOrder {
                        order_id: order.order_id.clone(),
                        internal_id: order.internal_id.clone(),
                        reason: skip_reason_for(&e),
                    });
                }
            }
        }

        // ===== 6. 合并并计算余量 =====
        let mut entries = kept_live;
        entries.extend(planned);
        let schedule = Schedule::from_entries(entries, now, skipped);

        tracing::info!(
            entries = schedule.len(),
            late = schedule.late_count(),
            skipped = schedule.skipped.len(),
            "排程生成完成"
        );
        schedule
    }

    /// 按给定相对顺序从游标起重排一串条目
    ///
    /// 已开工/已完工的条目及 BOM 中找不到的条目保持原样,其时段视为占用:
    /// 列在其后的条目从其结束时间之后开始; 列在其前的条目若与其重叠则顺延越过。
    /// 结果按开始时间排序。
    ///
    /// # 返回
    /// - (重排后的条目, 产线最早空闲时刻)
    pub fn replan_sequence(
        &self,
        entries: Vec<ProductionEntry>,
        cursor: NaiveDateTime,
    ) -> (Vec<ProductionEntry>, NaiveDateTime) {
        let mut cursor = self.planner.calendar().snap_to_shift(cursor);
        let mut blocked = self.blocked_ranges(&entries);
        let mut latest = cursor;
        let mut replanned = Vec::with_capacity(entries.len());

        for entry in entries {
            if self.is_fixed(&entry) {
                cursor = cursor.max(entry.overall_end());
                latest = latest.max(entry.overall_end());
                replanned.push(entry);
                continue;
            }

            match self.replan_around(&entry, cursor, &blocked) {
                Ok((moved, next_cursor)) => {
                    cursor = next_cursor;
                    latest = latest.max(next_cursor);
                    replanned.push(moved);
                }
                Err(e) => {
                    tracing::warn!(
                        internal_id = %entry.internal_id,
                        error = %e,
                        "条目无法重排,保持原计划"
                    );
                    blocked.push((entry.overall_start(), entry.overall_end()));
                    cursor = cursor.max(entry.overall_end());
                    latest = latest.max(entry.overall_end());
                    replanned.push(entry);
                }
            }
        }

        replanned.sort_by_key(|e| e.overall_start());
        (replanned, latest)
    }

    /// 不可移动条目: 有检查点工序 / 无工序 / BOM 中无此产品
    fn is_fixed(&self, entry: &ProductionEntry) -> bool {
        entry.has_checkpoint()
            || entry.phases.is_empty()
            || self.planner.bom().phases(&entry.product_code).is_err()
    }

    /// 一串条目中不可移动条目占用的时段
    pub fn blocked_ranges(&self, entries: &[ProductionEntry]) -> Vec<(NaiveDateTime, NaiveDateTime)> {
        entries
            .iter()
            .filter(|e| self.is_fixed(e))
            .map(|e| (e.overall_start(), e.overall_end()))
            .collect()
    }

    /// 从游标起重排单个条目,与占用时段重叠时越过其结束时间重试
    pub fn replan_around(
        &self,
        entry: &ProductionEntry,
        mut cursor: NaiveDateTime,
        blocked: &[(NaiveDateTime, NaiveDateTime)],
    ) -> EngineResult<(ProductionEntry, NaiveDateTime)> {
        loop {
            let (moved, next_cursor) = self.planner.replan_entry(entry, cursor)?;
            let (start, end) = (moved.overall_start(), moved.overall_end());
            let clash = blocked
                .iter()
                .filter(|(b_start, b_end)| *b_start < end && *b_end > start)
                .map(|(_, b_end)| *b_end)
                .max();

            let Some(blocked_until) = clash else {
                return Ok((moved, next_cursor));
            };
            tracing::debug!(
                internal_id = %entry.internal_id,
                blocked_until = %blocked_until,
                "与已开工条目时段重叠,顺延"
            );
            cursor = self.planner.calendar().snap_to_shift(cursor.max(blocked_until));
        }
    }
}

fn skip_reason_for(error: &EngineError) -> SkipReason {
    match error {
        EngineError::UnknownProduct(_) | EngineError::EmptyRouting(_) => SkipReason::UnknownProduct,
        EngineError::HorizonOverflow { .. } => SkipReason::BeyondHorizon,
        _ => SkipReason::MissingIdentifier,
    }
}

/// 在制条目与订单匹配
///
/// 先按显式关联ID匹配,再对剩余条目按 (产品, 数量) 在未匹配订单中找第一个。
/// 未匹配条目保留为占位条目; 未被任何条目占用的订单即待排订单。
fn match_live_entries(
    mut live_entries: Vec<ProductionEntry>,
    orders: Vec<Order>,
) -> (Vec<ProductionEntry>, Vec<Order>) {
    let mut used: HashSet<usize> = HashSet::new();

    for entry in live_entries.iter_mut() {
        let Some(linked) = entry.linked_order_id.as_deref() else {
            continue;
        };
        if let Some(idx) = orders
            .iter()
            .enumerate()
            .position(|(i, o)| !used.contains(&i) && o.order_id == linked)
        {
            used.insert(idx);
            entry.order = Some(orders[idx].clone());
        }
    }

    for entry in live_entries.iter_mut().filter(|e| e.order.is_none()) {
        let fallback = orders.iter().enumerate().position(|(i, o)| {
            !used.contains(&i) && o.product_code == entry.product_code && o.quantity == entry.quantity
        });
        match fallback {
            Some(idx) => {
                used.insert(idx);
                tracing::debug!(
                    internal_id = %entry.internal_id,
                    order_id = %orders[idx].order_id,
                    "在制条目按产品+数量匹配到订单"
                );
                entry.order = Some(orders[idx].clone());
            }
            None => {
                tracing::warn!(
                    internal_id = %entry.internal_id,
                    product_code = %entry.product_code,
                    quantity = entry.quantity,
                    "在制条目无法关联订单,作为占位条目保留"
                );
            }
        }
    }

    let pending = orders
        .into_iter()
        .enumerate()
        .filter(|(i, _)| !used.contains(i))
        .map(|(_, o)| o)
        .collect();

    (live_entries, pending)
}
