// ==========================================
// 单线生产排程引擎 - 内存跟踪服务
// ==========================================
// 职责: 进程内实现 TrackingService,供测试与演示使用
// 行为:
// - 每次单字段日期写入都校验 start <= end (与远端服务一致)
// - 可注入瞬时失败 / 永久拒绝,用于验证重试与降级
// - 记录写入日志,用于断言调用顺序
// ==========================================

use crate::domain::order::Order;
use crate::engine::bom::BillOfMaterials;
use crate::tracking::dto::{
    format_wire_datetime, BomRecord, CustomerRecord, PhaseRecord, PhaseRef, ProductionOrderRecord,
    SalesOrderLineRecord, SalesOrderRecord,
};
use crate::tracking::error::{TrackingError, TrackingResult};
use crate::tracking::service::TrackingService;
use async_trait::async_trait;
use chrono::NaiveDateTime;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

#[derive(Debug, Default)]
struct State {
    sales_orders: Vec<SalesOrderRecord>,
    production_orders: Vec<ProductionOrderRecord>,
    bom: Vec<BomRecord>,
    /// 操作名 → 剩余瞬时失败次数
    transient_failures: HashMap<String, u32>,
    /// 永久拒绝的操作名
    rejected_operations: Vec<String>,
    write_log: Vec<String>,
    next_id: u64,
}

impl State {
    fn next_id(&mut self, prefix: &str) -> String {
        self.next_id += 1;
        format!("{}-{:04}", prefix, self.next_id)
    }

    /// 注入故障检查
    fn check_fault(&mut self, operation: &str) -> TrackingResult<()> {
        if self.rejected_operations.iter().any(|op| op == operation) {
            return Err(TrackingError::Rejected {
                status: 422,
                message: format!("{} 被拒绝 (注入)", operation),
            });
        }
        if let Some(remaining) = self.transient_failures.get_mut(operation) {
            if *remaining > 0 {
                *remaining -= 1;
                return Err(TrackingError::Transport(format!("{} 超时 (注入)", operation)));
            }
        }
        Ok(())
    }

    fn phase_mut(&mut self, phase_id: &str) -> TrackingResult<&mut PhaseRecord> {
        self.production_orders
            .iter_mut()
            .flat_map(|po| po.phases.iter_mut())
            .find(|p| p.id == phase_id)
            .ok_or_else(|| TrackingError::not_found("production_order_phase", phase_id))
    }

    fn order_mut(&mut self, production_order_id: &str) -> TrackingResult<&mut ProductionOrderRecord> {
        self.production_orders
            .iter_mut()
            .find(|po| po.id == production_order_id)
            .ok_or_else(|| TrackingError::not_found("production_order", production_order_id))
    }

    fn sales_order_mut(&mut self, sales_order_id: &str) -> TrackingResult<&mut SalesOrderRecord> {
        self.sales_orders
            .iter_mut()
            .find(|so| so.id == sales_order_id)
            .ok_or_else(|| TrackingError::not_found("sales_order", sales_order_id))
    }
}

fn validate_range(
    id: &str,
    start: Option<NaiveDateTime>,
    end: Option<NaiveDateTime>,
) -> TrackingResult<()> {
    if let (Some(start), Some(end)) = (start, end) {
        if start > end {
            return Err(TrackingError::Rejected {
                status: 422,
                message: format!(
                    "{}: starts_at {} 晚于 ends_at {}",
                    id,
                    format_wire_datetime(start),
                    format_wire_datetime(end)
                ),
            });
        }
    }
    Ok(())
}

// ==========================================
// InMemoryTrackingService - 内存跟踪服务
// ==========================================
#[derive(Debug, Default)]
pub struct InMemoryTrackingService {
    state: Mutex<State>,
}

impl InMemoryTrackingService {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> TrackingResult<MutexGuard<'_, State>> {
        self.state
            .lock()
            .map_err(|e| TrackingError::Transport(format!("状态锁失效: {}", e)))
    }

    /// 以物料清单初始化 BOM 表
    pub fn with_bom(self, bom: &BillOfMaterials) -> Self {
        if let Ok(mut state) = self.lock() {
            state.bom = bom
                .product_codes()
                .flat_map(|code| {
                    bom.phases(code)
                        .map(|specs| specs.to_vec())
                        .unwrap_or_default()
                        .into_iter()
                        .map(move |spec| BomRecord {
                            product_code: code.to_string(),
                            phase: spec.phase.as_str().to_string(),
                            minutes_per_unit: spec.minutes_per_unit,
                        })
                })
                .collect();
        }
        self
    }

    /// 登记销售订单
    pub fn add_sales_order(&self, order: &Order) {
        if let Ok(mut state) = self.lock() {
            state.sales_orders.push(SalesOrderRecord {
                id: order.order_id.clone(),
                internal_id: order.internal_id.clone(),
                customer: CustomerRecord {
                    id: format!("cust-{}", order.customer.to_lowercase()),
                    name: order.customer.clone(),
                },
                products: vec![SalesOrderLineRecord {
                    product_code: order.product_code.clone(),
                    quantity: order.quantity,
                }],
                deadline: order.deadline,
                priority: order.priority,
                status: "accepted".to_string(),
                notes: order.notes.clone(),
            });
        }
    }

    /// 直接登记生产单 (模拟已有在制)
    pub fn add_production_order(&self, record: ProductionOrderRecord) {
        if let Ok(mut state) = self.lock() {
            state.production_orders.push(record);
        }
    }

    /// 注入瞬时失败: 接下来 count 次该操作返回传输错误
    pub fn inject_transient_failures(&self, operation: &str, count: u32) {
        if let Ok(mut state) = self.lock() {
            state.transient_failures.insert(operation.to_string(), count);
        }
    }

    /// 注入永久拒绝
    pub fn reject_operation(&self, operation: &str) {
        if let Ok(mut state) = self.lock() {
            state.rejected_operations.push(operation.to_string());
        }
    }

    /// 写入日志 ("操作:ID")
    pub fn write_log(&self) -> Vec<String> {
        self.lock().map(|s| s.write_log.clone()).unwrap_or_default()
    }

    pub fn production_order(&self, production_order_id: &str) -> Option<ProductionOrderRecord> {
        self.lock().ok().and_then(|s| {
            s.production_orders
                .iter()
                .find(|po| po.id == production_order_id)
                .cloned()
        })
    }

    pub fn sales_order(&self, sales_order_id: &str) -> Option<SalesOrderRecord> {
        self.lock()
            .ok()
            .and_then(|s| s.sales_orders.iter().find(|so| so.id == sales_order_id).cloned())
    }

    pub fn phase(&self, phase_id: &str) -> Option<PhaseRecord> {
        self.lock().ok().and_then(|s| {
            s.production_orders
                .iter()
                .flat_map(|po| po.phases.iter())
                .find(|p| p.id == phase_id)
                .cloned()
        })
    }

    /// NovaBoard 演示数据: 五个销售订单,交期自 now 起 2~8 天
    pub fn novaboard_demo(now: NaiveDateTime) -> Self {
        let service = Self::new().with_bom(&BillOfMaterials::novaboard_catalog());
        let day = |n: i64, hour: u32| {
            let date = (now + chrono::Duration::days(n)).date();
            date.and_hms_opt(hour, 0, 0).unwrap_or(now)
        };
        let demo = [
            ("so-1", "SO-0001", "PCB-IND-100", 20, day(6, 16), 2, "Siemens"),
            ("so-2", "SO-0002", "MED-300", 5, day(8, 12), 1, "MedTec"),
            ("so-3", "SO-0003", "IOT-200", 40, day(3, 16), 3, "SmartHome"),
            ("so-4", "SO-0004", "AGR-400", 12, day(5, 16), 3, "AgriSense"),
            ("so-5", "SO-0005", "PCB-PWR-500", 25, day(2, 12), 2, "VoltWorks"),
        ];
        for (order_id, internal_id, product_code, quantity, deadline, priority, customer) in demo {
            service.add_sales_order(&Order {
                order_id: order_id.to_string(),
                internal_id: internal_id.to_string(),
                product_code: product_code.to_string(),
                quantity,
                deadline,
                priority,
                customer: customer.to_string(),
                notes: String::new(),
            });
        }
        service
    }

    fn log_write(state: &mut State, operation: &str, id: &str) {
        state.write_log.push(format!("{}:{}", operation, id));
    }
}

#[async_trait]
impl TrackingService for InMemoryTrackingService {
    async fn list_sales_orders(&self) -> TrackingResult<Vec<SalesOrderRecord>> {
        let mut state = self.lock()?;
        state.check_fault("list_sales_orders")?;
        Ok(state.sales_orders.clone())
    }

    async fn list_production_orders(&self) -> TrackingResult<Vec<ProductionOrderRecord>> {
        let mut state = self.lock()?;
        state.check_fault("list_production_orders")?;
        Ok(state.production_orders.clone())
    }

    async fn fetch_bom(&self) -> TrackingResult<Vec<BomRecord>> {
        let mut state = self.lock()?;
        state.check_fault("fetch_bom")?;
        Ok(state.bom.clone())
    }

    async fn create_production_order(
        &self,
        product_code: &str,
        quantity: u32,
        starts_at: NaiveDateTime,
        ends_at: NaiveDateTime,
        sales_order_id: Option<&str>,
    ) -> TrackingResult<ProductionOrderRecord> {
        let mut state = self.lock()?;
        state.check_fault("create_production_order")?;
        validate_range(product_code, Some(starts_at), Some(ends_at))?;

        let id = state.next_id("po");
        let record = ProductionOrderRecord {
            lot: Some(id.to_uppercase()),
            id: id.clone(),
            product_internal_id: product_code.to_string(),
            quantity,
            starts_at: Some(starts_at),
            ends_at: Some(ends_at),
            status: "planned".to_string(),
            sales_order_id: sales_order_id.map(|s| s.to_string()),
            phases: Vec::new(),
        };
        state.production_orders.push(record.clone());
        Self::log_write(&mut state, "create_production_order", &id);
        Ok(record)
    }

    async fn generate_phases(&self, production_order_id: &str) -> TrackingResult<ProductionOrderRecord> {
        let mut state = self.lock()?;
        state.check_fault("generate_phases")?;

        let product_code = state.order_mut(production_order_id)?.product_internal_id.clone();
        let mut routing: Vec<(crate::domain::types::PhaseName, u32)> = Vec::new();
        for record in state.bom.iter().filter(|r| r.product_code == product_code) {
            if record.minutes_per_unit == 0 {
                continue;
            }
            let phase = record
                .phase
                .parse()
                .map_err(|e: crate::engine::error::EngineError| TrackingError::Schema(e.to_string()))?;
            routing.push((phase, record.minutes_per_unit));
        }
        if routing.is_empty() {
            return Err(TrackingError::Rejected {
                status: 422,
                message: format!("产品 {} 没有 BOM", product_code),
            });
        }
        routing.sort_by_key(|(phase, _)| *phase);

        let mut phases = Vec::with_capacity(routing.len());
        for (idx, (phase, _)) in routing.into_iter().enumerate() {
            phases.push(PhaseRecord {
                id: state.next_id("ph"),
                phase: PhaseRef {
                    name: phase.as_str().to_string(),
                },
                status: if idx == 0 { "ready" } else { "not_ready" }.to_string(),
                starts_at: None,
                ends_at: None,
                duration: 0,
            });
        }

        let order = state.order_mut(production_order_id)?;
        order.phases = phases;
        let record = order.clone();
        Self::log_write(&mut state, "generate_phases", production_order_id);
        Ok(record)
    }

    async fn update_order_start(&self, production_order_id: &str, starts_at: NaiveDateTime) -> TrackingResult<()> {
        let mut state = self.lock()?;
        state.check_fault("update_order_start")?;
        let order = state.order_mut(production_order_id)?;
        validate_range(production_order_id, Some(starts_at), order.ends_at)?;
        order.starts_at = Some(starts_at);
        Self::log_write(&mut state, "update_order_start", production_order_id);
        Ok(())
    }

    async fn update_order_end(&self, production_order_id: &str, ends_at: NaiveDateTime) -> TrackingResult<()> {
        let mut state = self.lock()?;
        state.check_fault("update_order_end")?;
        let order = state.order_mut(production_order_id)?;
        validate_range(production_order_id, order.starts_at, Some(ends_at))?;
        order.ends_at = Some(ends_at);
        Self::log_write(&mut state, "update_order_end", production_order_id);
        Ok(())
    }

    async fn complete_order(&self, production_order_id: &str) -> TrackingResult<()> {
        let mut state = self.lock()?;
        state.check_fault("complete_order")?;
        let order = state.order_mut(production_order_id)?;
        if order.phases.iter().any(|p| p.status != "completed") {
            return Err(TrackingError::Rejected {
                status: 409,
                message: format!("生产单 {} 仍有未完工工序", production_order_id),
            });
        }
        order.status = "completed".to_string();
        Self::log_write(&mut state, "complete_order", production_order_id);
        Ok(())
    }

    async fn delete_production_order(&self, production_order_id: &str) -> TrackingResult<()> {
        let mut state = self.lock()?;
        state.check_fault("delete_production_order")?;
        let before = state.production_orders.len();
        state.production_orders.retain(|po| po.id != production_order_id);
        if state.production_orders.len() == before {
            return Err(TrackingError::not_found("production_order", production_order_id));
        }
        Self::log_write(&mut state, "delete_production_order", production_order_id);
        Ok(())
    }

    async fn update_phase_start(&self, phase_id: &str, starts_at: NaiveDateTime) -> TrackingResult<()> {
        let mut state = self.lock()?;
        state.check_fault("update_phase_start")?;
        let phase = state.phase_mut(phase_id)?;
        validate_range(phase_id, Some(starts_at), phase.ends_at)?;
        phase.starts_at = Some(starts_at);
        Self::log_write(&mut state, "update_phase_start", phase_id);
        Ok(())
    }

    async fn update_phase_end(&self, phase_id: &str, ends_at: NaiveDateTime) -> TrackingResult<()> {
        let mut state = self.lock()?;
        state.check_fault("update_phase_end")?;
        let phase = state.phase_mut(phase_id)?;
        validate_range(phase_id, phase.starts_at, Some(ends_at))?;
        phase.ends_at = Some(ends_at);
        Self::log_write(&mut state, "update_phase_end", phase_id);
        Ok(())
    }

    async fn start_phase(&self, phase_id: &str) -> TrackingResult<()> {
        let mut state = self.lock()?;
        state.check_fault("start_phase")?;
        let phase = state.phase_mut(phase_id)?;
        if phase.status != "ready" && phase.status != "not_ready" {
            return Err(TrackingError::Rejected {
                status: 409,
                message: format!("工序 {} 状态为 {},不能开工", phase_id, phase.status),
            });
        }
        phase.status = "started".to_string();
        Self::log_write(&mut state, "start_phase", phase_id);
        Ok(())
    }

    async fn complete_phase(&self, phase_id: &str) -> TrackingResult<()> {
        let mut state = self.lock()?;
        state.check_fault("complete_phase")?;
        let phase = state.phase_mut(phase_id)?;
        if phase.status != "started" {
            return Err(TrackingError::Rejected {
                status: 409,
                message: format!("工序 {} 状态为 {},不能完工", phase_id, phase.status),
            });
        }
        phase.status = "completed".to_string();

        // 下一道工序就绪
        if let Some(order) = state
            .production_orders
            .iter_mut()
            .find(|po| po.phases.iter().any(|p| p.id == phase_id))
        {
            if let Some(idx) = order.phases.iter().position(|p| p.id == phase_id) {
                if let Some(next) = order.phases.get_mut(idx + 1) {
                    if next.status == "not_ready" {
                        next.status = "ready".to_string();
                    }
                }
            }
            order.status = "in_progress".to_string();
        }
        Self::log_write(&mut state, "complete_phase", phase_id);
        Ok(())
    }

    async fn reset_phase(&self, phase_id: &str) -> TrackingResult<()> {
        let mut state = self.lock()?;
        state.check_fault("reset_phase")?;
        let phase = state.phase_mut(phase_id)?;
        phase.status = "ready".to_string();
        Self::log_write(&mut state, "reset_phase", phase_id);
        Ok(())
    }

    async fn update_sales_order_priority(&self, sales_order_id: &str, priority: u8) -> TrackingResult<()> {
        let mut state = self.lock()?;
        state.check_fault("update_sales_order_priority")?;
        state.sales_order_mut(sales_order_id)?.priority = priority;
        Self::log_write(&mut state, "update_sales_order_priority", sales_order_id);
        Ok(())
    }

    async fn update_sales_order_quantity(&self, sales_order_id: &str, quantity: u32) -> TrackingResult<()> {
        let mut state = self.lock()?;
        state.check_fault("update_sales_order_quantity")?;
        let so = state.sales_order_mut(sales_order_id)?;
        match so.products.first_mut() {
            Some(line) => line.quantity = quantity,
            None => {
                return Err(TrackingError::Schema(format!(
                    "销售订单 {} 没有产品行",
                    sales_order_id
                )))
            }
        }
        Self::log_write(&mut state, "update_sales_order_quantity", sales_order_id);
        Ok(())
    }

    async fn update_sales_order_notes(&self, sales_order_id: &str, notes: &str) -> TrackingResult<()> {
        let mut state = self.lock()?;
        state.check_fault("update_sales_order_notes")?;
        state.sales_order_mut(sales_order_id)?.notes = notes.to_string();
        Self::log_write(&mut state, "update_sales_order_notes", sales_order_id);
        Ok(())
    }
}
