// ==========================================
// 单线生产排程引擎 - 引擎配置
// ==========================================
// 职责: 类型化的运行参数 (班次 / 排序策略及其参数 / 回写重试)
// 红线: 班次或策略无效属于构造期错误,不在排程过程中暴露
// ==========================================

use crate::engine::calendar::WorkingCalendar;
use crate::engine::error::EngineResult;
use crate::engine::sequencer::OrderSequencer;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    pub shift_start_hour: u32,
    pub shift_end_hour: u32,
    pub sequencing_policy: String,
    /// 客户名 → 等级 (越小越优先), 仅 customer_tier 策略使用
    #[serde(default)]
    pub customer_tiers: HashMap<String, u32>,
    /// 订单ID 顺序, 仅 manual 策略使用; 未列出的订单排在最后
    #[serde(default)]
    pub manual_sequence: Vec<String>,
    pub date_write_max_attempts: u32,
    pub date_write_backoff_ms: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            shift_start_hour: 8,
            shift_end_hour: 16,
            sequencing_policy: "edf".to_string(),
            customer_tiers: HashMap::new(),
            manual_sequence: Vec::new(),
            date_write_max_attempts: 3,
            date_write_backoff_ms: 200,
        }
    }
}

impl EngineConfig {
    pub fn calendar(&self) -> EngineResult<WorkingCalendar> {
        WorkingCalendar::new(self.shift_start_hour, self.shift_end_hour)
    }

    pub fn sequencer(&self) -> EngineResult<OrderSequencer> {
        Ok(OrderSequencer::from_name(&self.sequencing_policy)?
            .with_customer_tiers(self.customer_tiers.clone())
            .with_manual_sequence(self.manual_sequence.clone()))
    }

    pub fn date_write_backoff(&self) -> Duration {
        Duration::from_millis(self.date_write_backoff_ms)
    }

    /// 构造期校验 (班次 + 策略)
    pub fn validate(&self) -> EngineResult<()> {
        self.calendar()?;
        self.sequencer()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::error::EngineError;
    use crate::domain::order::Order;
    use crate::engine::bom::BillOfMaterials;
    use crate::engine::strategy::SequencingPolicy;
    use chrono::{NaiveDate, NaiveDateTime};

    fn now() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2026, 3, 1)
            .unwrap()
            .and_hms_opt(8, 0, 0)
            .unwrap()
    }

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.calendar().unwrap().minutes_per_shift(), 480);
        assert_eq!(config.sequencer().unwrap().policy(), SequencingPolicy::DeadlineFirst);
        assert_eq!(config.date_write_backoff(), Duration::from_millis(200));
    }

    #[test]
    fn test_manual_sequence_reaches_sequencer() {
        let config = EngineConfig {
            sequencing_policy: "manual".to_string(),
            manual_sequence: vec!["so-2".to_string(), "so-1".to_string()],
            ..Default::default()
        };
        let orders: Vec<Order> = ["so-1", "so-3", "so-2"]
            .iter()
            .map(|id| Order {
                order_id: id.to_string(),
                internal_id: id.to_uppercase(),
                product_code: "IOT-200".to_string(),
                quantity: 1,
                deadline: now(),
                priority: 2,
                customer: "SmartHome".to_string(),
                notes: String::new(),
            })
            .collect();

        let sorted = config.sequencer().unwrap().sequence(
            orders,
            &BillOfMaterials::novaboard_catalog(),
            now(),
        );
        let ids: Vec<&str> = sorted.iter().map(|o| o.order_id.as_str()).collect();
        assert_eq!(ids, vec!["so-2", "so-1", "so-3"]);
    }

    #[test]
    fn test_invalid_values_rejected_at_construction() {
        let config = EngineConfig {
            shift_start_hour: 16,
            shift_end_hour: 8,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(EngineError::InvalidShift { .. })));

        let config = EngineConfig {
            sequencing_policy: "fifo".to_string(),
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(EngineError::UnknownPolicy(_))));
    }
}
