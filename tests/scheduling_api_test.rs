// ==========================================
// SchedulingApi 集成测试
// ==========================================
// 测试目标: 提议 → 接受/拒绝 → 编辑重排 的完整链路 (内存跟踪服务)
// ==========================================

mod helpers;

use helpers::test_data_builder::{at, OrderBuilder};
use helpers::{build_api, create_test_db, tracking_with_bom, CollectingPublisher};
use line_scheduler::api::ApiError;
use line_scheduler::domain::schedule::SkipReason;
use line_scheduler::domain::types::ScheduleStatus;
use line_scheduler::engine::events::ScheduleEventType;
use line_scheduler::tracking::InMemoryTrackingService;
use std::sync::Arc;

/// so-1: PCB-PWR-500 x4 (300 分钟), 交期 day4
/// so-2: IOT-200 x2 (126 分钟), 交期 day8
fn two_orders() -> Arc<InMemoryTrackingService> {
    let tracking = tracking_with_bom();
    tracking.add_sales_order(
        &OrderBuilder::new("so-1")
            .product("PCB-PWR-500")
            .quantity(4)
            .deadline(at(4, 16, 0))
            .priority(2)
            .build(),
    );
    tracking.add_sales_order(
        &OrderBuilder::new("so-2")
            .product("IOT-200")
            .quantity(2)
            .deadline(at(8, 16, 0))
            .priority(3)
            .build(),
    );
    tracking
}

#[tokio::test]
async fn test_propose_orders_by_deadline_and_writes_nothing() {
    let (_db, db_path) = create_test_db();
    let tracking = two_orders();
    let api = build_api(tracking.clone(), &db_path, None);

    let schedule = api.propose_schedule(at(2, 8, 0), &[]).await.unwrap();

    assert_eq!(schedule.status, ScheduleStatus::Proposed);
    assert!(schedule.schedule_id.is_some());
    assert_eq!(schedule.len(), 2);
    assert_eq!(schedule.entries[0].entry.internal_id, "SO-1");
    assert_eq!(schedule.entries[0].entry.overall_start(), at(2, 8, 0));
    assert_eq!(schedule.entries[0].entry.overall_end(), at(2, 13, 0));
    assert_eq!(schedule.entries[1].entry.overall_start(), at(2, 13, 0));
    assert_eq!(schedule.entries[1].entry.overall_end(), at(2, 15, 6));
    assert!(schedule.all_on_time());
    assert!(tracking.write_log().is_empty(), "提议排程不应写入跟踪服务");
}

#[tokio::test]
async fn test_accept_creates_orders_and_pushes_dates() {
    let (_db, db_path) = create_test_db();
    let tracking = two_orders();
    let publisher = Arc::new(CollectingPublisher::default());
    let api = build_api(tracking.clone(), &db_path, Some(publisher.clone()));

    let proposal = api.propose_schedule(at(2, 8, 0), &[]).await.unwrap();
    let report = api
        .accept_schedule(proposal.schedule_id.as_deref().unwrap())
        .await
        .unwrap();

    assert_eq!(report.created, 2);
    assert!(report.creation_failures.is_empty());
    assert!(report.sync.is_clean(), "回写应无失败: {:?}", report.sync);
    // 每个条目 5 道工序 + 1 个生产单区间
    assert_eq!(report.sync.written, 12);
    assert_eq!(report.schedule.status, ScheduleStatus::Accepted);

    let first = &report.schedule.entries[0].entry;
    let entry_id = first.entry_id.clone().expect("应绑定生产单ID");
    assert!(first.phases.iter().all(|p| p.phase_id.is_some()));

    let remote = tracking.production_order(&entry_id).unwrap();
    assert_eq!(remote.sales_order_id.as_deref(), Some("so-1"));
    assert_eq!(remote.phases[0].phase.name, "SMT");
    assert_eq!(remote.phases[0].starts_at, Some(at(2, 8, 0)));
    assert_eq!(remote.phases[0].ends_at, Some(at(2, 9, 36)));
    assert_eq!(remote.phases[4].ends_at, Some(at(2, 13, 0)));

    let accepted = api.last_accepted().unwrap().unwrap();
    assert_eq!(accepted.schedule_id, proposal.schedule_id);
    assert_eq!(publisher.count(ScheduleEventType::ScheduleProposed), 1);
    assert_eq!(publisher.count(ScheduleEventType::ScheduleAccepted), 1);
}

#[tokio::test]
async fn test_repropose_after_accept_keeps_committed_dates() {
    let (_db, db_path) = create_test_db();
    let tracking = two_orders();
    let api = build_api(tracking.clone(), &db_path, None);

    let proposal = api.propose_schedule(at(2, 8, 0), &[]).await.unwrap();
    api.accept_schedule(proposal.schedule_id.as_deref().unwrap())
        .await
        .unwrap();
    let writes_after_accept = tracking.write_log().len();

    let again = api.propose_schedule(at(2, 8, 0), &[]).await.unwrap();

    assert_eq!(again.len(), 2);
    assert!(again.entries.iter().all(|e| e.entry.is_live));
    for (before, after) in proposal.entries.iter().zip(again.entries.iter()) {
        assert_eq!(before.entry.overall_start(), after.entry.overall_start());
        assert_eq!(before.entry.overall_end(), after.entry.overall_end());
        assert_eq!(before.entry.order_id(), after.entry.order_id());
    }
    assert_eq!(tracking.write_log().len(), writes_after_accept);
}

#[tokio::test]
async fn test_reject_then_accept_is_not_found() {
    let (_db, db_path) = create_test_db();
    let publisher = Arc::new(CollectingPublisher::default());
    let api = build_api(two_orders(), &db_path, Some(publisher.clone()));

    let proposal = api.propose_schedule(at(2, 8, 0), &[]).await.unwrap();
    let schedule_id = proposal.schedule_id.clone().unwrap();

    let rejected = api.reject_schedule(&schedule_id, "客户要求推迟").unwrap();
    assert_eq!(rejected.status, ScheduleStatus::Rejected);
    assert_eq!(rejected.notes, "客户要求推迟");
    assert_eq!(publisher.count(ScheduleEventType::ScheduleRejected), 1);

    let err = api.accept_schedule(&schedule_id).await.unwrap_err();
    assert!(matches!(err, ApiError::NotFound(_)));
    assert!(api.last_accepted().unwrap().is_none());
}

#[tokio::test]
async fn test_accept_keeps_internal_plan_when_creation_fails() {
    let (_db, db_path) = create_test_db();
    let tracking = two_orders();
    tracking.reject_operation("create_production_order");
    let api = build_api(tracking.clone(), &db_path, None);

    let proposal = api.propose_schedule(at(2, 8, 0), &[]).await.unwrap();
    let report = api
        .accept_schedule(proposal.schedule_id.as_deref().unwrap())
        .await
        .unwrap();

    assert_eq!(report.created, 0);
    assert_eq!(report.creation_failures.len(), 2);
    assert_eq!(report.schedule.status, ScheduleStatus::Accepted);
    assert_eq!(report.schedule.entries[1].entry.overall_end(), at(2, 15, 6));
}

#[tokio::test]
async fn test_edit_quantity_writes_through_and_replans() {
    let (_db, db_path) = create_test_db();
    let tracking = two_orders();
    let publisher = Arc::new(CollectingPublisher::default());
    let api = build_api(tracking.clone(), &db_path, Some(publisher.clone()));

    // so-1 数量 4 → 2 (150 分钟)
    let schedule = api.edit_quantity("so-1", 2, at(2, 8, 0)).await.unwrap();

    assert_eq!(tracking.sales_order("so-1").unwrap().products[0].quantity, 2);
    assert_eq!(schedule.entries[0].entry.overall_end(), at(2, 10, 30));
    assert_eq!(schedule.entries[1].entry.overall_start(), at(2, 10, 30));
    assert_eq!(schedule.entries[1].entry.overall_end(), at(2, 12, 36));
    assert_eq!(publisher.count(ScheduleEventType::OrderEdited), 1);

    let err = api.edit_quantity("so-1", 0, at(2, 8, 0)).await.unwrap_err();
    assert!(matches!(err, ApiError::InvalidInput(_)));
    assert_eq!(tracking.sales_order("so-1").unwrap().products[0].quantity, 2);
}

#[tokio::test]
async fn test_escalated_priority_does_not_override_deadline() {
    let (_db, db_path) = create_test_db();
    let tracking = two_orders();
    let api = build_api(tracking.clone(), &db_path, None);

    let schedule = api.edit_priority("so-2", 1, at(2, 8, 0)).await.unwrap();

    assert_eq!(tracking.sales_order("so-2").unwrap().priority, 1);
    let order: Vec<&str> = schedule
        .entries
        .iter()
        .filter_map(|e| e.entry.order_id())
        .collect();
    assert_eq!(order, vec!["so-1", "so-2"]);

    let err = api.edit_priority("so-404", 1, at(2, 8, 0)).await.unwrap_err();
    assert!(matches!(err, ApiError::NotFound(_)));
}

#[tokio::test]
async fn test_late_and_past_deadline_orders_are_reported() {
    let (_db, db_path) = create_test_db();
    let tracking = tracking_with_bom();
    // MED-300 x2 = 558 分钟: 跨班次到 day3 09:18, 交期 day2 16:00 → 延期
    tracking.add_sales_order(
        &OrderBuilder::new("so-3")
            .product("MED-300")
            .quantity(2)
            .deadline(at(2, 16, 0))
            .build(),
    );
    tracking.add_sales_order(&OrderBuilder::new("so-4").deadline(at(1, 16, 0)).build());
    let api = build_api(tracking, &db_path, None);

    let schedule = api.propose_schedule(at(2, 8, 0), &[]).await.unwrap();

    assert_eq!(schedule.len(), 1);
    assert_eq!(schedule.entries[0].entry.overall_end(), at(3, 9, 18));
    assert_eq!(schedule.late_count(), 1);
    assert!(!schedule.entries[0].on_time);
    assert_eq!(schedule.conflicts.len(), 1);
    assert!(schedule.conflicts[0].contains("SO-3"));

    assert_eq!(schedule.skipped.len(), 1);
    assert_eq!(schedule.skipped[0].order_id, "so-4");
    assert_eq!(schedule.skipped[0].reason, SkipReason::DeadlinePassed);
}
