// ==========================================
// 测试数据构建器 - 用于集成测试
// ==========================================

use chrono::{NaiveDate, NaiveDateTime};
use line_scheduler::domain::order::Order;
use line_scheduler::domain::types::PhaseName;
use line_scheduler::tracking::dto::{PhaseRecord, PhaseRef, ProductionOrderRecord};

/// 2026-03-{day} {hour}:{minute}
pub fn at(day: u32, hour: u32, minute: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2026, 3, day)
        .unwrap()
        .and_hms_opt(hour, minute, 0)
        .unwrap()
}

// ==========================================
// Order 构建器
// ==========================================

pub struct OrderBuilder {
    order_id: String,
    internal_id: String,
    product_code: String,
    quantity: u32,
    deadline: NaiveDateTime,
    priority: u8,
    customer: String,
}

impl OrderBuilder {
    pub fn new(order_id: &str) -> Self {
        Self {
            order_id: order_id.to_string(),
            internal_id: order_id.to_uppercase(),
            product_code: "IOT-200".to_string(),
            quantity: 1,
            deadline: at(20, 16, 0),
            priority: 3,
            customer: "NovaBoard".to_string(),
        }
    }

    pub fn product(mut self, product_code: &str) -> Self {
        self.product_code = product_code.to_string();
        self
    }

    pub fn quantity(mut self, quantity: u32) -> Self {
        self.quantity = quantity;
        self
    }

    pub fn deadline(mut self, deadline: NaiveDateTime) -> Self {
        self.deadline = deadline;
        self
    }

    pub fn priority(mut self, priority: u8) -> Self {
        self.priority = priority;
        self
    }

    pub fn customer(mut self, customer: &str) -> Self {
        self.customer = customer.to_string();
        self
    }

    pub fn build(self) -> Order {
        Order {
            order_id: self.order_id,
            internal_id: self.internal_id,
            product_code: self.product_code,
            quantity: self.quantity,
            deadline: self.deadline,
            priority: self.priority,
            customer: self.customer,
            notes: String::new(),
        }
    }
}

// ==========================================
// 跟踪服务生产单构建器 (模拟已有在制)
// ==========================================

pub struct ProductionOrderBuilder {
    record: ProductionOrderRecord,
}

impl ProductionOrderBuilder {
    pub fn new(id: &str, product_code: &str, quantity: u32) -> Self {
        Self {
            record: ProductionOrderRecord {
                id: id.to_string(),
                lot: Some(id.to_uppercase()),
                product_internal_id: product_code.to_string(),
                quantity,
                starts_at: None,
                ends_at: None,
                status: "in_progress".to_string(),
                sales_order_id: None,
                phases: Vec::new(),
            },
        }
    }

    pub fn sales_order(mut self, sales_order_id: &str) -> Self {
        self.record.sales_order_id = Some(sales_order_id.to_string());
        self
    }

    pub fn phase(
        mut self,
        phase: PhaseName,
        start: NaiveDateTime,
        end: NaiveDateTime,
        status: &str,
    ) -> Self {
        let id = format!("{}-{}", self.record.id, phase.as_str());
        self.record.phases.push(PhaseRecord {
            id,
            phase: PhaseRef {
                name: phase.as_str().to_string(),
            },
            status: status.to_string(),
            starts_at: Some(start),
            ends_at: Some(end),
            duration: 0,
        });
        self.record.starts_at = self.record.phases.first().and_then(|p| p.starts_at);
        self.record.ends_at = Some(end);
        self
    }

    pub fn build(self) -> ProductionOrderRecord {
        self.record
    }
}
