// ==========================================
// 单线生产排程引擎 - 跟踪服务接口
// ==========================================
// 职责: 定义远端跟踪服务的操作集合 (async trait)
// 说明:
// - 起止日期是两个独立调用,不是原子操作
// - 所有写操作需幂等,便于至少一次重试
// ==========================================

use crate::domain::order::Order;
use crate::domain::schedule::ProductionEntry;
use crate::engine::bom::BillOfMaterials;
use crate::tracking::dto::{bom_from_records, BomRecord, ProductionOrderRecord, SalesOrderRecord};
use crate::tracking::error::TrackingResult;
use async_trait::async_trait;
use chrono::NaiveDateTime;

/// 远端跟踪服务
#[async_trait]
pub trait TrackingService: Send + Sync {
    // ===== 读取 =====
    async fn list_sales_orders(&self) -> TrackingResult<Vec<SalesOrderRecord>>;
    async fn list_production_orders(&self) -> TrackingResult<Vec<ProductionOrderRecord>>;
    async fn fetch_bom(&self) -> TrackingResult<Vec<BomRecord>>;

    // ===== 生产单 =====
    async fn create_production_order(
        &self,
        product_code: &str,
        quantity: u32,
        starts_at: NaiveDateTime,
        ends_at: NaiveDateTime,
        sales_order_id: Option<&str>,
    ) -> TrackingResult<ProductionOrderRecord>;

    /// 按 BOM 生成工序,返回带工序的生产单
    async fn generate_phases(&self, production_order_id: &str) -> TrackingResult<ProductionOrderRecord>;

    async fn update_order_start(&self, production_order_id: &str, starts_at: NaiveDateTime) -> TrackingResult<()>;
    async fn update_order_end(&self, production_order_id: &str, ends_at: NaiveDateTime) -> TrackingResult<()>;
    async fn complete_order(&self, production_order_id: &str) -> TrackingResult<()>;
    async fn delete_production_order(&self, production_order_id: &str) -> TrackingResult<()>;

    // ===== 工序 =====
    async fn update_phase_start(&self, phase_id: &str, starts_at: NaiveDateTime) -> TrackingResult<()>;
    async fn update_phase_end(&self, phase_id: &str, ends_at: NaiveDateTime) -> TrackingResult<()>;
    async fn start_phase(&self, phase_id: &str) -> TrackingResult<()>;
    async fn complete_phase(&self, phase_id: &str) -> TrackingResult<()>;
    /// 工序回到 ready (失败后从首工序重做)
    async fn reset_phase(&self, phase_id: &str) -> TrackingResult<()>;

    // ===== 销售订单编辑 =====
    async fn update_sales_order_priority(&self, sales_order_id: &str, priority: u8) -> TrackingResult<()>;
    async fn update_sales_order_quantity(&self, sales_order_id: &str, quantity: u32) -> TrackingResult<()>;
    async fn update_sales_order_notes(&self, sales_order_id: &str, notes: &str) -> TrackingResult<()>;
}

/// 一次读取的现场快照 (已转换为领域类型)
#[derive(Debug, Clone, Default)]
pub struct LiveSnapshot {
    pub entries: Vec<ProductionEntry>,
    pub orders: Vec<Order>,
    /// 无法转换而被丢弃的记录 (ID + 原因)
    pub rejected: Vec<(String, String)>,
}

/// 读取在制条目与销售订单
///
/// 单条记录格式错误只记录并跳过,不影响其余记录。
pub async fn load_live_snapshot(service: &dyn TrackingService) -> TrackingResult<LiveSnapshot> {
    let sales_orders = service.list_sales_orders().await?;
    let production_orders = service.list_production_orders().await?;

    let mut snapshot = LiveSnapshot::default();

    for record in sales_orders {
        let id = record.id.clone();
        match record.into_order() {
            Ok(order) => snapshot.orders.push(order),
            Err(e) => {
                tracing::warn!(sales_order_id = %id, error = %e, "销售订单无法转换,跳过");
                snapshot.rejected.push((id, e.to_string()));
            }
        }
    }

    for record in production_orders {
        let id = record.id.clone();
        match record.into_live_entry() {
            Ok(entry) => snapshot.entries.push(entry),
            Err(e) => {
                tracing::warn!(production_order_id = %id, error = %e, "生产单无法转换,跳过");
                snapshot.rejected.push((id, e.to_string()));
            }
        }
    }

    tracing::debug!(
        entries = snapshot.entries.len(),
        orders = snapshot.orders.len(),
        rejected = snapshot.rejected.len(),
        "现场快照读取完成"
    );
    Ok(snapshot)
}

/// 读取跟踪服务 BOM 表
pub async fn load_bom(service: &dyn TrackingService) -> TrackingResult<BillOfMaterials> {
    let records = service.fetch_bom().await?;
    bom_from_records(&records)
}
