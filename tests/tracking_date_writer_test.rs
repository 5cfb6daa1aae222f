// ==========================================
// 日期回写集成测试
// ==========================================
// 测试目标: 起止两次单字段写入在服务端 start <= end 校验下的顺序、重试与降级
// ==========================================

mod helpers;

use chrono::Duration as ChronoDuration;
use helpers::test_data_builder::{at, ProductionOrderBuilder};
use line_scheduler::domain::schedule::ProductionEntry;
use line_scheduler::domain::types::PhaseName;
use line_scheduler::tracking::{
    stored_ranges, DateRangeUpdate, DateTarget, DateWriter, InMemoryTrackingService, TrackingError,
    TrackingService,
};
use std::sync::Arc;
use std::time::Duration;

fn seeded() -> Arc<InMemoryTrackingService> {
    let tracking = Arc::new(InMemoryTrackingService::new());
    tracking.add_production_order(
        ProductionOrderBuilder::new("po-1", "IOT-200", 1)
            .phase(PhaseName::Smt, at(2, 8, 0), at(2, 9, 0), "ready")
            .phase(PhaseName::Reflow, at(2, 9, 0), at(2, 10, 0), "not_ready")
            .build(),
    );
    tracking.add_production_order(
        ProductionOrderBuilder::new("po-2", "IOT-200", 1)
            .phase(PhaseName::Smt, at(2, 10, 0), at(2, 11, 0), "not_ready")
            .build(),
    );
    tracking
}

fn writer(tracking: &Arc<InMemoryTrackingService>, max_attempts: u32) -> DateWriter {
    let service: Arc<dyn TrackingService> = tracking.clone();
    DateWriter::new(service, max_attempts, Duration::from_millis(1))
}

fn live_entry(tracking: &InMemoryTrackingService, id: &str) -> ProductionEntry {
    tracking.production_order(id).unwrap().into_live_entry().unwrap()
}

fn shifted(entry: &ProductionEntry, days: i64) -> ProductionEntry {
    let mut moved = entry.clone();
    for phase in moved.phases.iter_mut() {
        phase.start += ChronoDuration::days(days);
        phase.end += ChronoDuration::days(days);
    }
    moved
}

fn phase_update(id: &str, start: chrono::NaiveDateTime, end: chrono::NaiveDateTime) -> DateRangeUpdate {
    DateRangeUpdate {
        target: DateTarget::Phase(id.to_string()),
        previous: None,
        start,
        end,
    }
}

#[tokio::test]
async fn test_naive_start_first_write_is_rejected_when_moving_later() {
    let tracking = seeded();

    // 新开始 day3 08:00 晚于已存储结束 day2 09:00
    let err = tracking
        .update_phase_start("po-1-SMT", at(3, 8, 0))
        .await
        .unwrap_err();

    assert!(matches!(err, TrackingError::Rejected { status: 422, .. }));
    assert!(!err.is_transient());
    assert_eq!(tracking.phase("po-1-SMT").unwrap().starts_at, Some(at(2, 8, 0)));
}

#[tokio::test]
async fn test_moving_entry_later_writes_end_first() {
    let tracking = seeded();
    let entry = live_entry(&tracking, "po-1");
    let stored = stored_ranges(&[entry.clone()]);

    let report = writer(&tracking, 3)
        .push_entries(&[shifted(&entry, 1)], &stored)
        .await;

    assert!(report.is_clean(), "{:?}", report);
    assert_eq!(report.written, 3);
    let smt = tracking.phase("po-1-SMT").unwrap();
    assert_eq!(smt.starts_at, Some(at(3, 8, 0)));
    assert_eq!(smt.ends_at, Some(at(3, 9, 0)));
    let order = tracking.production_order("po-1").unwrap();
    assert_eq!(order.starts_at, Some(at(3, 8, 0)));
    assert_eq!(order.ends_at, Some(at(3, 10, 0)));

    let log = tracking.write_log();
    assert_eq!(log[0], "update_phase_end:po-1-SMT");
    assert_eq!(log[1], "update_phase_start:po-1-SMT");
}

#[tokio::test]
async fn test_moving_entry_earlier_writes_start_first() {
    let tracking = seeded();
    let entry = live_entry(&tracking, "po-2");
    let stored = stored_ranges(&[entry.clone()]);

    let report = writer(&tracking, 3)
        .push_entries(&[shifted(&entry, -1)], &stored)
        .await;

    assert!(report.is_clean(), "{:?}", report);
    let log = tracking.write_log();
    assert_eq!(log[0], "update_phase_start:po-2-SMT");
    assert_eq!(log[1], "update_phase_end:po-2-SMT");
    assert_eq!(tracking.phase("po-2-SMT").unwrap().ends_at, Some(at(1, 11, 0)));
}

#[tokio::test]
async fn test_transient_failures_are_retried() {
    let tracking = seeded();
    tracking.inject_transient_failures("update_phase_start", 2);

    let report = writer(&tracking, 3)
        .push_updates(vec![phase_update("po-1-SMT", at(2, 8, 30), at(2, 9, 0))])
        .await;

    assert!(report.is_clean(), "{:?}", report);
    assert_eq!(report.written, 1);
    assert_eq!(report.retries, 2);
    assert_eq!(tracking.phase("po-1-SMT").unwrap().starts_at, Some(at(2, 8, 30)));
}

#[tokio::test]
async fn test_exhausted_retries_are_recorded_and_pass_continues() {
    let tracking = seeded();
    tracking.inject_transient_failures("update_phase_end", 3);

    let report = writer(&tracking, 3)
        .push_updates(vec![
            phase_update("po-1-SMT", at(2, 8, 0), at(2, 8, 50)),
            phase_update("po-2-SMT", at(2, 10, 0), at(2, 10, 50)),
        ])
        .await;

    assert_eq!(report.attempted, 2);
    assert_eq!(report.written, 1);
    assert_eq!(report.retries, 2);
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].target, DateTarget::Phase("po-1-SMT".to_string()));
    assert_eq!(tracking.phase("po-1-SMT").unwrap().ends_at, Some(at(2, 9, 0)));
    assert_eq!(tracking.phase("po-2-SMT").unwrap().ends_at, Some(at(2, 10, 50)));
}

#[tokio::test]
async fn test_permanent_rejection_is_not_retried() {
    let tracking = seeded();
    tracking.reject_operation("update_phase_start");

    let report = writer(&tracking, 5)
        .push_updates(vec![phase_update("po-1-SMT", at(2, 8, 30), at(2, 9, 0))])
        .await;

    assert_eq!(report.written, 0);
    assert_eq!(report.retries, 0);
    assert_eq!(report.failures.len(), 1);
    assert!(tracking.write_log().is_empty());
}

#[tokio::test]
async fn test_checkpointed_phases_are_not_rewritten() {
    let tracking = Arc::new(InMemoryTrackingService::new());
    tracking.add_production_order(
        ProductionOrderBuilder::new("po-3", "IOT-200", 1)
            .phase(PhaseName::Smt, at(2, 8, 0), at(2, 9, 0), "started")
            .phase(PhaseName::Reflow, at(2, 9, 0), at(2, 10, 0), "not_ready")
            .build(),
    );
    let mut entry = live_entry(&tracking, "po-3");
    entry.phases[1].start = at(2, 9, 30);
    entry.phases[1].end = at(2, 10, 30);

    let (updates, unbound) = DateWriter::updates_for_entry(&entry, &stored_ranges(&[entry.clone()]));
    assert_eq!(unbound, 0);
    assert_eq!(updates.len(), 2);
    assert_eq!(updates[0].target, DateTarget::Phase("po-3-Reflow".to_string()));
    assert_eq!(updates[1].target, DateTarget::Order("po-3".to_string()));

    entry.phases[1].phase_id = None;
    let report = writer(&tracking, 3).push_entries(&[entry], &Default::default()).await;
    assert_eq!(report.skipped_unbound, 1);
    assert!(!report.is_clean());
    assert_eq!(tracking.phase("po-3-SMT").unwrap().starts_at, Some(at(2, 8, 0)));
}
