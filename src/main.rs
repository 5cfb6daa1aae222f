// ==========================================
// 单线生产排程引擎 - 演示入口
// ==========================================
// 用法: line-scheduler [db_path] [now]
// - db_path 缺省为用户数据目录下的 line_scheduler.db
// - now 格式 2026-03-02T08:00:00Z (缺省为本地当前时间)
// 以 NovaBoard 演示数据生成一次提议排程并输出 JSON
// LINE_SCHEDULER_LOG_FORMAT=json 时日志以 JSON 输出
// ==========================================

use anyhow::Context;
use line_scheduler::config::ConfigManager;
use line_scheduler::db::get_default_db_path;
use line_scheduler::repository::FailureRecordRepository;
use line_scheduler::tracking::dto::parse_wire_datetime;
use line_scheduler::tracking::{InMemoryTrackingService, TrackingService};
use line_scheduler::{logging, SchedulingApi};
use std::sync::Arc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    match std::env::var("LINE_SCHEDULER_LOG_FORMAT").as_deref() {
        Ok("json") => logging::init_json(),
        _ => logging::init(),
    }

    let mut args = std::env::args().skip(1);
    let db_path = args.next().unwrap_or_else(get_default_db_path);
    let now = match args.next() {
        Some(raw) => parse_wire_datetime(&raw).with_context(|| format!("无法解析时间: {}", raw))?,
        None => chrono::Local::now().naive_local(),
    };

    tracing::info!("==================================================");
    tracing::info!("{} v{}", line_scheduler::APP_NAME, line_scheduler::VERSION);
    tracing::info!(db_path = %db_path, now = %now, "启动");
    tracing::info!("==================================================");

    let config = ConfigManager::new(&db_path)
        .context("无法打开配置库")?
        .load_engine_config()
        .context("引擎配置无效")?;
    let record_repo = Arc::new(FailureRecordRepository::new(&db_path).context("无法打开故障记录库")?);

    let tracking: Arc<dyn TrackingService> = Arc::new(InMemoryTrackingService::novaboard_demo(now));
    let api = SchedulingApi::connect(tracking, &config, record_repo).await?;

    let schedule = api.propose_schedule(now, &[]).await?;
    for late in schedule.late_entries() {
        tracing::warn!(internal_id = %late.entry.internal_id, slack_minutes = late.slack_minutes, "预计延期");
    }

    println!("{}", serde_json::to_string_pretty(&schedule)?);
    Ok(())
}
