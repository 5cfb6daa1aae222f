// ==========================================
// 单线生产排程引擎 - 销售订单领域模型
// ==========================================
// 红线: 一次排程过程中订单只读; priority/quantity/notes 仅在两次排程之间由外部修改
// ==========================================

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

// ==========================================
// Order - 待排订单
// ==========================================
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    pub order_id: String,       // 订单ID (跟踪系统主键)
    pub internal_id: String,    // 订单编号 (如 SO-0003)
    pub product_code: String,   // 产品代码 (如 IOT-200)
    pub quantity: u32,          // 数量 (正整数)
    pub deadline: NaiveDateTime, // 交期
    pub priority: u8,           // 优先级 (越小越紧急)
    pub customer: String,       // 客户
    #[serde(default)]
    pub notes: String,          // 备注
}

impl Order {
    /// 交期是否已过
    pub fn is_overdue(&self, now: NaiveDateTime) -> bool {
        self.deadline <= now
    }
}
