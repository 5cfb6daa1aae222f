// ==========================================
// 单线生产排程引擎 - 人工决策通道
// ==========================================
// 职责: 向操作员请求故障恢复决策 (skip / restart)
// 红线:
// - 无默认决策、无超时; 只能由操作员回答或整体取消
// - 原始文本原样交回协调器,由协调器校验并在无效时重新询问
// ==========================================

use crate::domain::failure::FailureRecord;
use crate::domain::types::PhaseName;
use async_trait::async_trait;
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, Mutex};

/// 发给操作员的决策请求
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecisionPrompt {
    pub record_id: String,
    pub internal_id: String,
    pub order_id: Option<String>,
    pub failed_phase: PhaseName,
    pub failed_at: NaiveDateTime,
    /// 第几次询问 (从 1 开始)
    pub attempt: u32,
    /// 上一次回答被拒绝的原因
    pub last_error: Option<String>,
}

impl DecisionPrompt {
    pub fn for_record(record: &FailureRecord, attempt: u32, last_error: Option<String>) -> Self {
        Self {
            record_id: record.record_id.clone(),
            internal_id: record.internal_id.clone(),
            order_id: record.order_id.clone(),
            failed_phase: record.failed_phase,
            failed_at: record.failed_at,
            attempt,
            last_error,
        }
    }
}

/// 操作员回复
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecisionReply {
    /// 原始输入文本
    Answer(String),
    /// 整个会话被取消
    Cancelled,
}

/// 决策提供者 Trait
#[async_trait]
pub trait DecisionProvider: Send + Sync {
    async fn request_decision(&self, prompt: DecisionPrompt) -> DecisionReply;
}

// ==========================================
// ChannelDecisionProvider - 基于 mpsc 的决策通道
// ==========================================
pub struct ChannelDecisionProvider {
    prompts: mpsc::UnboundedSender<DecisionPrompt>,
    answers: Mutex<mpsc::UnboundedReceiver<String>>,
}

/// 控制台一侧: 读取请求、回答、取消
pub struct DecisionConsole {
    prompts: mpsc::UnboundedReceiver<DecisionPrompt>,
    answers: mpsc::UnboundedSender<String>,
}

impl ChannelDecisionProvider {
    /// 创建一对 (提供者, 控制台)
    pub fn channel() -> (Self, DecisionConsole) {
        let (prompt_tx, prompt_rx) = mpsc::unbounded_channel();
        let (answer_tx, answer_rx) = mpsc::unbounded_channel();
        (
            Self {
                prompts: prompt_tx,
                answers: Mutex::new(answer_rx),
            },
            DecisionConsole {
                prompts: prompt_rx,
                answers: answer_tx,
            },
        )
    }
}

#[async_trait]
impl DecisionProvider for ChannelDecisionProvider {
    async fn request_decision(&self, prompt: DecisionPrompt) -> DecisionReply {
        let record_id = prompt.record_id.clone();
        if self.prompts.send(prompt).is_err() {
            tracing::warn!(record_id = %record_id, "决策控制台已关闭");
        }

        let mut answers = self.answers.lock().await;
        match answers.recv().await {
            Some(text) => DecisionReply::Answer(text),
            None => DecisionReply::Cancelled,
        }
    }
}

impl DecisionConsole {
    /// 等待下一条决策请求
    pub async fn next_prompt(&mut self) -> Option<DecisionPrompt> {
        self.prompts.recv().await
    }

    /// 回答 (可提前排队); 提供者已释放时返回 false
    pub fn answer(&self, text: impl Into<String>) -> bool {
        self.answers.send(text.into()).is_ok()
    }

    /// 取消整个会话
    pub fn cancel(self) {
        drop(self);
    }
}
