// ==========================================
// 集成测试共享辅助
// ==========================================
// 职责: 临时数据库、脚本化决策/执行端、事件收集
// ==========================================
#![allow(dead_code)]

pub mod test_data_builder;

use async_trait::async_trait;
use chrono::Duration;
use line_scheduler::config::EngineConfig;
use line_scheduler::domain::schedule::{PhasePlan, ProductionEntry};
use line_scheduler::domain::types::PhaseName;
use line_scheduler::engine::decision_provider::{DecisionPrompt, DecisionProvider, DecisionReply};
use line_scheduler::engine::events::{OptionalEventPublisher, ScheduleEvent, ScheduleEventPublisher, ScheduleEventType};
use line_scheduler::engine::execution::{PhaseExecutor, PhaseOutcome};
use line_scheduler::repository::FailureRecordRepository;
use line_scheduler::tracking::{InMemoryTrackingService, TrackingService};
use line_scheduler::{BillOfMaterials, SchedulingApi};
use std::collections::{HashSet, VecDeque};
use std::error::Error;
use std::sync::{Arc, Mutex};
use tempfile::NamedTempFile;

/// 创建临时数据库文件
///
/// # 返回
/// - NamedTempFile: 临时数据库文件（需要保持存活）
/// - String: 数据库文件路径
pub fn create_test_db() -> (NamedTempFile, String) {
    let temp_file = NamedTempFile::new().expect("创建临时文件失败");
    let db_path = temp_file.path().to_str().unwrap().to_string();
    (temp_file, db_path)
}

/// 测试配置: 回写退避 1ms
pub fn test_config() -> EngineConfig {
    EngineConfig {
        date_write_backoff_ms: 1,
        ..EngineConfig::default()
    }
}

/// 以 NovaBoard BOM 构建 API (临时库)
pub fn build_api(
    tracking: Arc<InMemoryTrackingService>,
    db_path: &str,
    publisher: Option<Arc<CollectingPublisher>>,
) -> SchedulingApi {
    line_scheduler::logging::init_test();
    let repo = Arc::new(FailureRecordRepository::new(db_path).expect("打开故障记录库失败"));
    let tracking: Arc<dyn TrackingService> = tracking;
    let api = SchedulingApi::new(
        tracking,
        &test_config(),
        BillOfMaterials::novaboard_catalog(),
        repo,
    )
    .expect("构建 SchedulingApi 失败");
    match publisher {
        Some(p) => api.with_event_publisher(OptionalEventPublisher::with_publisher(p)),
        None => api,
    }
}

pub fn tracking_with_bom() -> Arc<InMemoryTrackingService> {
    Arc::new(InMemoryTrackingService::new().with_bom(&BillOfMaterials::novaboard_catalog()))
}

// ==========================================
// 脚本化决策提供者
// ==========================================
pub struct ScriptedProvider {
    replies: Mutex<VecDeque<DecisionReply>>,
    prompts: Mutex<Vec<DecisionPrompt>>,
}

impl ScriptedProvider {
    /// 依次回答; 回答用尽后视为会话取消
    pub fn answers(answers: &[&str]) -> Self {
        Self {
            replies: Mutex::new(
                answers
                    .iter()
                    .map(|a| DecisionReply::Answer(a.to_string()))
                    .collect(),
            ),
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn cancelling() -> Self {
        Self::answers(&[])
    }

    pub fn prompts(&self) -> Vec<DecisionPrompt> {
        self.prompts.lock().unwrap().clone()
    }
}

#[async_trait]
impl DecisionProvider for ScriptedProvider {
    async fn request_decision(&self, prompt: DecisionPrompt) -> DecisionReply {
        self.prompts.lock().unwrap().push(prompt);
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(DecisionReply::Cancelled)
    }
}

// ==========================================
// 脚本化执行端
// ==========================================
// 每道工序按计划结束时间完工; 指定 (订单, 工序) 第一次执行时失败
pub struct ScriptedExecutor {
    fail_once: Mutex<HashSet<(String, PhaseName)>>,
    executed: Mutex<Vec<(String, PhaseName)>>,
}

impl ScriptedExecutor {
    pub fn reliable() -> Self {
        Self::failing(&[])
    }

    pub fn failing(failures: &[(&str, PhaseName)]) -> Self {
        Self {
            fail_once: Mutex::new(
                failures
                    .iter()
                    .map(|(order_id, phase)| (order_id.to_string(), *phase))
                    .collect(),
            ),
            executed: Mutex::new(Vec::new()),
        }
    }

    pub fn executed(&self) -> Vec<(String, PhaseName)> {
        self.executed.lock().unwrap().clone()
    }
}

#[async_trait]
impl PhaseExecutor for ScriptedExecutor {
    async fn execute(&self, entry: &ProductionEntry, phase: &PhasePlan) -> PhaseOutcome {
        let key = (entry.order_id().unwrap_or_default().to_string(), phase.phase);
        self.executed.lock().unwrap().push(key.clone());
        if self.fail_once.lock().unwrap().remove(&key) {
            return PhaseOutcome::Failed {
                failed_at: phase.start + Duration::minutes(10),
                reason: "模拟故障".to_string(),
            };
        }
        PhaseOutcome::Completed {
            finished_at: phase.end,
        }
    }
}

// ==========================================
// 事件收集器
// ==========================================
#[derive(Default)]
pub struct CollectingPublisher {
    events: Mutex<Vec<ScheduleEvent>>,
}

impl CollectingPublisher {
    pub fn events(&self) -> Vec<ScheduleEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn count(&self, event_type: ScheduleEventType) -> usize {
        self.events
            .lock()
            .unwrap()
            .iter()
            .filter(|e| e.event_type == event_type)
            .count()
    }
}

impl ScheduleEventPublisher for CollectingPublisher {
    fn publish(&self, event: ScheduleEvent) -> Result<String, Box<dyn Error + Send + Sync>> {
        self.events.lock().unwrap().push(event);
        Ok(String::new())
    }
}
