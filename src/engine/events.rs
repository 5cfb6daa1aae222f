// ==========================================
// 单线生产排程引擎 - 引擎层事件发布
// ==========================================
// 职责: 定义排程事件发布 trait,实现依赖倒置
// 说明: Engine 层定义 trait,控制台/通知服务实现适配器
// ==========================================

use crate::domain::types::PhaseName;
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::sync::Arc;

// ==========================================
// 排程事件类型
// ==========================================

/// 排程事件触发类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScheduleEventType {
    /// 新排程提案生成
    ScheduleProposed,
    /// 排程被接受并下发
    ScheduleAccepted,
    /// 排程被驳回
    ScheduleRejected,
    /// 工序完工
    PhaseCompleted,
    /// 订单完工
    OrderCompleted,
    /// 工序失败
    PhaseFailed,
    /// 预计晚于交期
    DeadlineAtRisk,
    /// 订单被编辑 (优先级/数量/备注)
    OrderEdited,
}

impl ScheduleEventType {
    /// 转换为字符串标识
    pub fn as_str(&self) -> &str {
        match self {
            ScheduleEventType::ScheduleProposed => "ScheduleProposed",
            ScheduleEventType::ScheduleAccepted => "ScheduleAccepted",
            ScheduleEventType::ScheduleRejected => "ScheduleRejected",
            ScheduleEventType::PhaseCompleted => "PhaseCompleted",
            ScheduleEventType::OrderCompleted => "OrderCompleted",
            ScheduleEventType::PhaseFailed => "PhaseFailed",
            ScheduleEventType::DeadlineAtRisk => "DeadlineAtRisk",
            ScheduleEventType::OrderEdited => "OrderEdited",
        }
    }
}

/// 排程事件
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleEvent {
    /// 排程ID (未登记的提案为空)
    pub schedule_id: Option<String>,
    /// 事件类型
    pub event_type: ScheduleEventType,
    /// 事件来源描述
    pub source: Option<String>,
    /// 相关订单 (None 表示整个排程)
    pub order_id: Option<String>,
    /// 相关工序
    pub phase: Option<PhaseName>,
    /// 附加说明
    pub detail: Option<String>,
}

impl ScheduleEvent {
    /// 创建排程级事件
    pub fn schedule_level(
        schedule_id: Option<String>,
        event_type: ScheduleEventType,
        source: Option<String>,
    ) -> Self {
        Self {
            schedule_id,
            event_type,
            source,
            order_id: None,
            phase: None,
            detail: None,
        }
    }

    /// 创建订单级事件
    pub fn for_order(
        schedule_id: Option<String>,
        event_type: ScheduleEventType,
        order_id: impl Into<String>,
        source: Option<String>,
    ) -> Self {
        Self {
            order_id: Some(order_id.into()),
            ..Self::schedule_level(schedule_id, event_type, source)
        }
    }

    pub fn with_phase(mut self, phase: PhaseName) -> Self {
        self.phase = Some(phase);
        self
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }
}

// ==========================================
// 事件发布 Trait
// ==========================================

/// 排程事件发布者 Trait
///
/// # 返回
/// - `Ok(task_id)`: 任务 ID (如果支持) 或空字符串
/// - `Err`: 发布失败 (调用方只记录日志,不中断排程)
pub trait ScheduleEventPublisher: Send + Sync {
    fn publish(&self, event: ScheduleEvent) -> Result<String, Box<dyn Error + Send + Sync>>;
}

/// 空操作事件发布者
///
/// 用于不需要事件发布的场景 (如单元测试)
#[derive(Debug, Clone, Default)]
pub struct NoOpEventPublisher;

impl ScheduleEventPublisher for NoOpEventPublisher {
    fn publish(&self, event: ScheduleEvent) -> Result<String, Box<dyn Error + Send + Sync>> {
        tracing::debug!(
            "NoOpEventPublisher: 跳过事件发布 - schedule_id={:?}, event_type={}",
            event.schedule_id,
            event.event_type.as_str()
        );
        Ok(String::new())
    }
}

/// 可选的事件发布者包装
///
/// 简化 Option<Arc<dyn ScheduleEventPublisher>> 的使用
#[derive(Clone)]
pub struct OptionalEventPublisher {
    inner: Option<Arc<dyn ScheduleEventPublisher>>,
}

impl OptionalEventPublisher {
    /// 创建带发布者的实例
    pub fn with_publisher(publisher: Arc<dyn ScheduleEventPublisher>) -> Self {
        Self {
            inner: Some(publisher),
        }
    }

    /// 创建空实例 (不发布事件)
    pub fn none() -> Self {
        Self { inner: None }
    }

    /// 发布事件 (如果有发布者)
    pub fn publish(&self, event: ScheduleEvent) -> Result<String, Box<dyn Error + Send + Sync>> {
        match &self.inner {
            Some(publisher) => publisher.publish(event),
            None => {
                tracing::debug!(
                    "OptionalEventPublisher: 未配置发布者,跳过事件 - schedule_id={:?}, event_type={}",
                    event.schedule_id,
                    event.event_type.as_str()
                );
                Ok(String::new())
            }
        }
    }

    /// 发布事件,失败只记录日志
    pub fn publish_or_log(&self, event: ScheduleEvent) {
        let event_type = event.event_type;
        if let Err(e) = self.publish(event) {
            tracing::warn!(event_type = event_type.as_str(), error = %e, "事件发布失败");
        }
    }

    /// 检查是否配置了发布者
    pub fn is_configured(&self) -> bool {
        self.inner.is_some()
    }
}

impl Default for OptionalEventPublisher {
    fn default() -> Self {
        Self::none()
    }
}

impl std::fmt::Debug for OptionalEventPublisher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OptionalEventPublisher")
            .field("configured", &self.is_configured())
            .finish()
    }
}
