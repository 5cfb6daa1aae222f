// ==========================================
// 单线生产排程引擎 - 执行游标
// ==========================================
// 职责: 跟踪产线按排程执行到哪一条目/哪一道工序
// 状态机:
//   Running{phase_index} --advance--> Running{phase_index+1} / 下一条目 / Finished
//   Running --fail--> AwaitingDecision{record_id}
//   AwaitingDecision --resume_after_skip--> 同一位置的下一条目 (长度 -1)
//   AwaitingDecision --resume_after_restart--> 同一条目首工序 (长度不变)
// ==========================================

use crate::domain::schedule::{PhasePlan, ProductionEntry};
use crate::engine::error::{EngineError, EngineResult};
use async_trait::async_trait;
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// 当前条目的执行状态
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum OrderExecutionState {
    Running { phase_index: usize },
    AwaitingDecision { record_id: String },
    Finished,
}

impl OrderExecutionState {
    fn label(&self) -> &'static str {
        match self {
            OrderExecutionState::Running { .. } => "running",
            OrderExecutionState::AwaitingDecision { .. } => "awaiting_decision",
            OrderExecutionState::Finished => "finished",
        }
    }
}

// ==========================================
// ExecutionCursor - 执行游标
// ==========================================
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionCursor {
    schedule_index: usize,
    schedule_len: usize,
    state: OrderExecutionState,
}

impl ExecutionCursor {
    pub fn new(schedule_len: usize) -> Self {
        let state = if schedule_len == 0 {
            OrderExecutionState::Finished
        } else {
            OrderExecutionState::Running { phase_index: 0 }
        };
        Self {
            schedule_index: 0,
            schedule_len,
            state,
        }
    }

    pub fn schedule_index(&self) -> usize {
        self.schedule_index
    }

    pub fn state(&self) -> &OrderExecutionState {
        &self.state
    }

    pub fn is_finished(&self) -> bool {
        self.state == OrderExecutionState::Finished
    }

    /// 当前工序结束 (完工或无需执行)
    ///
    /// phase_count 为当前条目的工序数; 走完最后一道工序后进入下一条目。
    pub fn advance(&mut self, phase_count: usize) -> EngineResult<()> {
        let OrderExecutionState::Running { phase_index } = self.state else {
            return Err(self.invalid("advance"));
        };

        if phase_index + 1 < phase_count {
            self.state = OrderExecutionState::Running {
                phase_index: phase_index + 1,
            };
        } else {
            self.enter_entry(self.schedule_index + 1);
        }
        Ok(())
    }

    /// 当前工序失败,等待人工决策
    pub fn fail(&mut self, record_id: impl Into<String>) -> EngineResult<()> {
        if !matches!(self.state, OrderExecutionState::Running { .. }) {
            return Err(self.invalid("fail"));
        }
        self.state = OrderExecutionState::AwaitingDecision {
            record_id: record_id.into(),
        };
        Ok(())
    }

    /// skip 决策后继续: 原位置现在是失败条目的下一条
    pub fn resume_after_skip(&mut self, new_len: usize) -> EngineResult<()> {
        if !matches!(self.state, OrderExecutionState::AwaitingDecision { .. }) {
            return Err(self.invalid("resume_after_skip"));
        }
        self.schedule_len = new_len;
        self.enter_entry(self.schedule_index);
        Ok(())
    }

    /// restart 决策后继续: 同一条目从首工序重做
    pub fn resume_after_restart(&mut self, new_len: usize) -> EngineResult<()> {
        if !matches!(self.state, OrderExecutionState::AwaitingDecision { .. }) {
            return Err(self.invalid("resume_after_restart"));
        }
        if self.schedule_index >= new_len {
            return Err(EngineError::PositionOutOfRange {
                position: self.schedule_index,
                len: new_len,
            });
        }
        self.schedule_len = new_len;
        self.state = OrderExecutionState::Running { phase_index: 0 };
        Ok(())
    }

    fn enter_entry(&mut self, index: usize) {
        self.schedule_index = index;
        self.state = if index >= self.schedule_len {
            OrderExecutionState::Finished
        } else {
            OrderExecutionState::Running { phase_index: 0 }
        };
    }

    fn invalid(&self, action: &str) -> EngineError {
        EngineError::InvalidTransition {
            from: self.state.label().to_string(),
            action: action.to_string(),
        }
    }
}

// ==========================================
// PhaseExecutor - 执行端 (机器人/产线代理)
// ==========================================

/// 单道工序执行结果
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PhaseOutcome {
    Completed { finished_at: NaiveDateTime },
    Failed { failed_at: NaiveDateTime, reason: String },
}

/// 执行一道工序; 返回完工或失败
#[async_trait]
pub trait PhaseExecutor: Send + Sync {
    async fn execute(&self, entry: &ProductionEntry, phase: &PhasePlan) -> PhaseOutcome;
}
