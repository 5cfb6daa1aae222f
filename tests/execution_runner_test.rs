// ==========================================
// 生产执行驱动集成测试
// ==========================================
// 测试目标: 已接受排程的逐工序执行、失败恢复后续跑、会话取消中止
// 场景: so-1 PCB-PWR-500 x4 day2 08:00-13:00, so-2 IOT-200 x2 day2 13:00-15:06
// ==========================================

mod helpers;

use helpers::test_data_builder::{at, OrderBuilder};
use helpers::{build_api, create_test_db, tracking_with_bom, CollectingPublisher, ScriptedExecutor, ScriptedProvider};
use line_scheduler::api::{ApiError, ProductionRunner};
use line_scheduler::domain::types::{PhaseName, PhaseStatus};
use line_scheduler::engine::events::ScheduleEventType;
use line_scheduler::repository::FailureRecordRepository;
use line_scheduler::tracking::InMemoryTrackingService;
use line_scheduler::SchedulingApi;
use std::sync::Arc;

fn seeded_tracking() -> Arc<InMemoryTrackingService> {
    let tracking = tracking_with_bom();
    tracking.add_sales_order(
        &OrderBuilder::new("so-1")
            .product("PCB-PWR-500")
            .quantity(4)
            .deadline(at(4, 16, 0))
            .build(),
    );
    tracking.add_sales_order(
        &OrderBuilder::new("so-2")
            .product("IOT-200")
            .quantity(2)
            .deadline(at(8, 16, 0))
            .build(),
    );
    tracking
}

async fn accepted_api(
    tracking: Arc<InMemoryTrackingService>,
    db_path: &str,
    publisher: Option<Arc<CollectingPublisher>>,
) -> Arc<SchedulingApi> {
    let api = build_api(tracking, db_path, publisher);
    let proposal = api.propose_schedule(at(2, 8, 0), &[]).await.unwrap();
    api.accept_schedule(proposal.schedule_id.as_deref().unwrap())
        .await
        .unwrap();
    Arc::new(api)
}

#[tokio::test]
async fn test_reliable_run_completes_every_phase() {
    let (_db, db_path) = create_test_db();
    let tracking = seeded_tracking();
    let publisher = Arc::new(CollectingPublisher::default());
    let api = accepted_api(tracking.clone(), &db_path, Some(publisher.clone())).await;
    let executor = Arc::new(ScriptedExecutor::reliable());

    let runner = ProductionRunner::new(
        api.clone(),
        executor.clone(),
        Arc::new(ScriptedProvider::cancelling()),
    );
    let report = runner.run().await.unwrap();

    assert_eq!(report.completed_phases, 10);
    assert_eq!(report.completed_orders, vec!["so-1".to_string(), "so-2".to_string()]);
    assert_eq!(report.failures, 0);
    assert!(!report.cancelled);
    assert_eq!(executor.executed().len(), 10);
    assert_eq!(executor.executed()[0], ("so-1".to_string(), PhaseName::Smt));
    assert_eq!(executor.executed()[5], ("so-2".to_string(), PhaseName::Smt));

    let final_schedule = report.final_schedule.unwrap();
    for scheduled in &final_schedule.entries {
        assert!(scheduled.entry.phases.iter().all(|p| p.status == PhaseStatus::Completed));
        let remote = tracking
            .production_order(scheduled.entry.entry_id.as_deref().unwrap())
            .unwrap();
        assert_eq!(remote.status, "completed");
        assert!(remote.phases.iter().all(|p| p.status == "completed"));
    }
    assert_eq!(publisher.count(ScheduleEventType::PhaseCompleted), 10);
    assert_eq!(publisher.count(ScheduleEventType::OrderCompleted), 2);
}

#[tokio::test]
async fn test_restart_reruns_failed_order_from_first_phase() {
    let (_db, db_path) = create_test_db();
    let tracking = seeded_tracking();
    let api = accepted_api(tracking.clone(), &db_path, None).await;
    let executor = Arc::new(ScriptedExecutor::failing(&[("so-2", PhaseName::Smt)]));

    let runner = ProductionRunner::new(
        api.clone(),
        executor.clone(),
        Arc::new(ScriptedProvider::answers(&["restart"])),
    );
    let report = runner.run().await.unwrap();

    assert_eq!(report.failures, 1);
    assert_eq!(report.restarted_orders, vec!["so-2".to_string()]);
    assert_eq!(report.completed_orders, vec!["so-1".to_string(), "so-2".to_string()]);
    assert_eq!(report.completed_phases, 10);
    assert_eq!(executor.executed().len(), 11);
    assert!(report.sync.failures.is_empty(), "{:?}", report.sync);

    // 失败于 13:10,从该时刻整体重开
    let final_schedule = report.final_schedule.unwrap();
    assert_eq!(final_schedule.entries[1].entry.overall_start(), at(2, 13, 10));
    assert_eq!(final_schedule.entries[1].entry.overall_end(), at(2, 15, 16));
    assert!(final_schedule.entries[1]
        .entry
        .phases
        .iter()
        .all(|p| p.status == PhaseStatus::Completed));

    let repo = FailureRecordRepository::new(&db_path).unwrap();
    let records = repo.list_all().unwrap();
    assert_eq!(records.len(), 1);
    assert!(!records[0].is_open());
}

#[tokio::test]
async fn test_skip_drops_failed_order_and_continues_with_next() {
    let (_db, db_path) = create_test_db();
    let tracking = seeded_tracking();
    let api = accepted_api(tracking.clone(), &db_path, None).await;
    let skipped_entry_id = api.last_accepted().unwrap().unwrap().entries[0]
        .entry
        .entry_id
        .clone()
        .unwrap();
    let executor = Arc::new(ScriptedExecutor::failing(&[("so-1", PhaseName::Reflow)]));

    let runner = ProductionRunner::new(
        api.clone(),
        executor.clone(),
        Arc::new(ScriptedProvider::answers(&["skip"])),
    );
    let report = runner.run().await.unwrap();

    assert_eq!(report.skipped_orders, vec!["so-1".to_string()]);
    assert_eq!(report.completed_orders, vec!["so-2".to_string()]);
    // so-1 SMT + so-2 全部 5 道
    assert_eq!(report.completed_phases, 6);
    assert!(tracking.production_order(&skipped_entry_id).is_none());

    // Reflow 于 09:46 失败, so-2 从该时刻前移
    let final_schedule = report.final_schedule.unwrap();
    assert_eq!(final_schedule.len(), 1);
    assert_eq!(final_schedule.entries[0].entry.overall_start(), at(2, 9, 46));
    assert_eq!(final_schedule.entries[0].entry.overall_end(), at(2, 11, 52));
}

#[tokio::test]
async fn test_cancelled_decision_stops_run() {
    let (_db, db_path) = create_test_db();
    let tracking = seeded_tracking();
    let api = accepted_api(tracking.clone(), &db_path, None).await;
    let accepted_id = api.last_accepted().unwrap().unwrap().schedule_id;
    let executor = Arc::new(ScriptedExecutor::failing(&[("so-2", PhaseName::Smt)]));

    let runner = ProductionRunner::new(
        api.clone(),
        executor.clone(),
        Arc::new(ScriptedProvider::cancelling()),
    );
    let report = runner.run().await.unwrap();

    assert!(report.cancelled);
    assert_eq!(report.failures, 1);
    assert_eq!(report.completed_orders, vec!["so-1".to_string()]);
    assert_eq!(executor.executed().len(), 6);

    let final_schedule = report.final_schedule.unwrap();
    assert_eq!(final_schedule.schedule_id, accepted_id);
    assert_eq!(final_schedule.entries[1].entry.overall_start(), at(2, 13, 0));
    assert_eq!(final_schedule.entries[1].entry.phases[0].status, PhaseStatus::Failed);

    let repo = FailureRecordRepository::new(&db_path).unwrap();
    assert!(repo.find_open().unwrap().is_some());
}

#[tokio::test]
async fn test_run_without_accepted_schedule_is_not_found() {
    let (_db, db_path) = create_test_db();
    let api = Arc::new(build_api(seeded_tracking(), &db_path, None));

    let runner = ProductionRunner::new(
        api,
        Arc::new(ScriptedExecutor::reliable()),
        Arc::new(ScriptedProvider::cancelling()),
    );
    let err = runner.run().await.unwrap_err();

    assert!(matches!(err, ApiError::NotFound(_)));
}
