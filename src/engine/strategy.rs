// ==========================================
// 单线生产排程引擎 - 排序策略定义
// ==========================================
// 用途:
// - 按名称选择订单排序策略 (配置/控制台传入);
// - 未知名称在构造期报错,不静默回落到默认策略。
// ==========================================

use crate::engine::error::EngineError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// 订单排序策略
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SequencingPolicy {
    DeadlineFirst,
    PriorityFirst,
    ShortestJobFirst,
    LongestJobFirst,
    LeastSlackFirst,
    CustomerTier,
    Manual,
}

impl SequencingPolicy {
    pub const ALL: [SequencingPolicy; 7] = [
        SequencingPolicy::DeadlineFirst,
        SequencingPolicy::PriorityFirst,
        SequencingPolicy::ShortestJobFirst,
        SequencingPolicy::LongestJobFirst,
        SequencingPolicy::LeastSlackFirst,
        SequencingPolicy::CustomerTier,
        SequencingPolicy::Manual,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SequencingPolicy::DeadlineFirst => "edf",
            SequencingPolicy::PriorityFirst => "priority",
            SequencingPolicy::ShortestJobFirst => "sjf",
            SequencingPolicy::LongestJobFirst => "ljf",
            SequencingPolicy::LeastSlackFirst => "slack",
            SequencingPolicy::CustomerTier => "customer",
            SequencingPolicy::Manual => "manual",
        }
    }

    pub fn title_cn(&self) -> &'static str {
        match self {
            SequencingPolicy::DeadlineFirst => "交期优先",
            SequencingPolicy::PriorityFirst => "优先级优先",
            SequencingPolicy::ShortestJobFirst => "短作业优先",
            SequencingPolicy::LongestJobFirst => "长作业优先",
            SequencingPolicy::LeastSlackFirst => "最小余量优先",
            SequencingPolicy::CustomerTier => "客户等级优先",
            SequencingPolicy::Manual => "人工顺序",
        }
    }
}

impl Default for SequencingPolicy {
    fn default() -> Self {
        SequencingPolicy::DeadlineFirst
    }
}

impl fmt::Display for SequencingPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for SequencingPolicy {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "edf" | "deadline_first" | "deadline-first" => Ok(SequencingPolicy::DeadlineFirst),
            "priority" | "priority_first" | "priority-first" => Ok(SequencingPolicy::PriorityFirst),
            "sjf" | "shortest_job_first" => Ok(SequencingPolicy::ShortestJobFirst),
            "ljf" | "longest_job_first" => Ok(SequencingPolicy::LongestJobFirst),
            "slack" | "least_slack_first" => Ok(SequencingPolicy::LeastSlackFirst),
            "customer" | "customer_tier" => Ok(SequencingPolicy::CustomerTier),
            "manual" => Ok(SequencingPolicy::Manual),
            other => Err(EngineError::UnknownPolicy(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_names_round_trip() {
        for policy in SequencingPolicy::ALL {
            assert_eq!(policy.as_str().parse::<SequencingPolicy>().unwrap(), policy);
        }
    }

    #[test]
    fn test_unknown_policy_is_error() {
        let err = "fifo".parse::<SequencingPolicy>().unwrap_err();
        assert_eq!(err, EngineError::UnknownPolicy("fifo".to_string()));
    }

    #[test]
    fn test_default_is_edf() {
        assert_eq!(SequencingPolicy::default(), SequencingPolicy::DeadlineFirst);
    }
}
