// ==========================================
// 单线生产排程引擎 - 工序计划器
// ==========================================
// 职责: 单订单 + 产线游标 → 带日期的工序计划 + 推进后的游标
// 红线:
// - 纯函数,无 I/O; 给定 (订单, 游标, BOM, 班次) 结果完全确定
// - 工序首尾相接,工时全部经过班次日历
// ==========================================

use crate::domain::order::Order;
use crate::domain::schedule::{PhasePlan, ProductionEntry};
use crate::domain::types::PhaseStatus;
use crate::engine::bom::BillOfMaterials;
use crate::engine::calendar::WorkingCalendar;
use crate::engine::error::EngineResult;
use chrono::NaiveDateTime;

// ==========================================
// PhasePlanner - 工序计划器
// ==========================================
#[derive(Debug, Clone)]
pub struct PhasePlanner {
    calendar: WorkingCalendar,
    bom: BillOfMaterials,
}

impl PhasePlanner {
    pub fn new(calendar: WorkingCalendar, bom: BillOfMaterials) -> Self {
        Self { calendar, bom }
    }

    pub fn calendar(&self) -> &WorkingCalendar {
        &self.calendar
    }

    pub fn bom(&self) -> &BillOfMaterials {
        &self.bom
    }

    /// 对产品+数量展开工序计划
    ///
    /// # 返回
    /// - (工序计划列表, 推进后的游标)
    /// - 未知产品 / 空工艺路线 / 超出日期范围时报错
    pub fn plan_phases(
        &self,
        product_code: &str,
        quantity: u32,
        cursor: NaiveDateTime,
    ) -> EngineResult<(Vec<PhasePlan>, NaiveDateTime)> {
        let specs = self.bom.phases(product_code)?;

        let mut cursor = self.calendar.snap_to_shift(cursor);
        let mut phases = Vec::with_capacity(specs.len());

        for spec in specs {
            let start = cursor;
            let duration_minutes = u64::from(spec.minutes_per_unit) * u64::from(quantity);
            let end = self.calendar.add_working_minutes(start, duration_minutes)?;

            phases.push(PhasePlan {
                phase_id: None,
                phase: spec.phase,
                start,
                end,
                duration_minutes,
                status: PhaseStatus::Ready,
            });
            cursor = end;
        }

        Ok((phases, cursor))
    }

    /// 计划单个订单
    ///
    /// # 参数
    /// - order: 待排订单
    /// - cursor: 产线下一次空闲时刻
    ///
    /// # 返回
    /// - (新生产条目, 推进后的游标)
    pub fn plan_order(
        &self,
        order: &Order,
        cursor: NaiveDateTime,
    ) -> EngineResult<(ProductionEntry, NaiveDateTime)> {
        let (phases, cursor) = self.plan_phases(&order.product_code, order.quantity, cursor)?;

        let entry = ProductionEntry {
            entry_id: None,
            internal_id: order.internal_id.clone(),
            order: Some(order.clone()),
            linked_order_id: Some(order.order_id.clone()),
            product_code: order.product_code.clone(),
            quantity: order.quantity,
            phases,
            is_live: false,
            reported_range: None,
        };

        Ok((entry, cursor))
    }

    /// 从首工序重新计划已有条目
    ///
    /// 保留条目身份与工序ID (按工序名称对应),忽略原有时间与状态。
    pub fn replan_entry(
        &self,
        entry: &ProductionEntry,
        cursor: NaiveDateTime,
    ) -> EngineResult<(ProductionEntry, NaiveDateTime)> {
        let (mut phases, cursor) = self.plan_phases(&entry.product_code, entry.quantity, cursor)?;

        for phase in &mut phases {
            phase.phase_id = entry
                .phases
                .iter()
                .find(|p| p.phase == phase.phase)
                .and_then(|p| p.phase_id.clone());
        }

        let replanned = ProductionEntry {
            phases,
            reported_range: None,
            ..entry.clone()
        };

        Ok((replanned, cursor))
    }
}
