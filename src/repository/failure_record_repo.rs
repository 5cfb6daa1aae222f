// ==========================================
// 单线生产排程引擎 - 故障记录仓储
// ==========================================
// 职责: 管理 failure_record 表
// 说明: 记录在人工决策前落库,进程崩溃重启后可继续恢复流程
// 红线: Repository 不含业务逻辑
// ==========================================

use crate::db::{ensure_schema, open_sqlite_connection};
use crate::domain::failure::FailureRecord;
use crate::domain::types::{PhaseName, RecoveryDecision};
use crate::repository::error::{RepositoryError, RepositoryResult};
use chrono::NaiveDateTime;
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::sync::{Arc, Mutex};

const SELECT_COLUMNS: &str = r#"
    record_id,
    schedule_position,
    order_id,
    entry_id,
    internal_id,
    failed_phase_id,
    failed_phase,
    failed_at,
    entry_snapshot_json,
    schedule_snapshot_json,
    decision,
    resolved_at
"#;

/// 行映射的中间结构 (JSON/枚举字段尚未解析)
struct FailureRecordRow {
    record_id: String,
    schedule_position: i64,
    order_id: Option<String>,
    entry_id: Option<String>,
    internal_id: String,
    failed_phase_id: Option<String>,
    failed_phase: String,
    failed_at: NaiveDateTime,
    entry_snapshot_json: String,
    schedule_snapshot_json: String,
    decision: Option<String>,
    resolved_at: Option<NaiveDateTime>,
}

impl FailureRecordRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            record_id: row.get(0)?,
            schedule_position: row.get(1)?,
            order_id: row.get(2)?,
            entry_id: row.get(3)?,
            internal_id: row.get(4)?,
            failed_phase_id: row.get(5)?,
            failed_phase: row.get(6)?,
            failed_at: row.get(7)?,
            entry_snapshot_json: row.get(8)?,
            schedule_snapshot_json: row.get(9)?,
            decision: row.get(10)?,
            resolved_at: row.get(11)?,
        })
    }

    fn into_record(self) -> RepositoryResult<FailureRecord> {
        let failed_phase: PhaseName =
            self.failed_phase
                .parse()
                .map_err(|e: crate::engine::error::EngineError| RepositoryError::FieldValueError {
                    field: "failed_phase".to_string(),
                    message: e.to_string(),
                })?;

        let decision = match self.decision {
            Some(raw) => Some(raw.parse::<RecoveryDecision>().map_err(|e| {
                RepositoryError::FieldValueError {
                    field: "decision".to_string(),
                    message: e.to_string(),
                }
            })?),
            None => None,
        };

        let schedule_position =
            usize::try_from(self.schedule_position).map_err(|_| RepositoryError::FieldValueError {
                field: "schedule_position".to_string(),
                message: format!("负数位置: {}", self.schedule_position),
            })?;

        Ok(FailureRecord {
            record_id: self.record_id,
            schedule_position,
            order_id: self.order_id,
            entry_id: self.entry_id,
            internal_id: self.internal_id,
            failed_phase_id: self.failed_phase_id,
            failed_phase,
            failed_at: self.failed_at,
            entry_snapshot: serde_json::from_str(&self.entry_snapshot_json)?,
            schedule_snapshot: serde_json::from_str(&self.schedule_snapshot_json)?,
            decision,
            resolved_at: self.resolved_at,
        })
    }
}

// ==========================================
// FailureRecordRepository - 故障记录仓储
// ==========================================
pub struct FailureRecordRepository {
    conn: Arc<Mutex<Connection>>,
}

impl FailureRecordRepository {
    pub fn new(db_path: &str) -> RepositoryResult<Self> {
        let conn = open_sqlite_connection(db_path)?;
        ensure_schema(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn from_connection(conn: Arc<Mutex<Connection>>) -> RepositoryResult<Self> {
        {
            let guard = conn
                .lock()
                .map_err(|e| RepositoryError::LockError(e.to_string()))?;
            ensure_schema(&guard)?;
        }
        Ok(Self { conn })
    }

    fn get_conn(&self) -> RepositoryResult<std::sync::MutexGuard<Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    /// 写入故障记录
    pub fn insert(&self, record: &FailureRecord) -> RepositoryResult<()> {
        let entry_json = serde_json::to_string(&record.entry_snapshot)?;
        let schedule_json = serde_json::to_string(&record.schedule_snapshot)?;
        let position = i64::try_from(record.schedule_position).map_err(|_| {
            RepositoryError::FieldValueError {
                field: "schedule_position".to_string(),
                message: format!("位置过大: {}", record.schedule_position),
            }
        })?;

        let conn = self.get_conn()?;
        conn.execute(
            r#"
            INSERT INTO failure_record (
                record_id,
                schedule_position,
                order_id,
                entry_id,
                internal_id,
                failed_phase_id,
                failed_phase,
                failed_at,
                entry_snapshot_json,
                schedule_snapshot_json,
                decision,
                resolved_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
            "#,
            params![
                record.record_id,
                position,
                record.order_id,
                record.entry_id,
                record.internal_id,
                record.failed_phase_id,
                record.failed_phase.as_str(),
                record.failed_at,
                entry_json,
                schedule_json,
                record.decision.map(|d| d.to_db_str()),
                record.resolved_at,
            ],
        )?;
        Ok(())
    }

    /// 按ID查找
    pub fn find_by_id(&self, record_id: &str) -> RepositoryResult<Option<FailureRecord>> {
        let conn = self.get_conn()?;
        let sql = format!("SELECT {} FROM failure_record WHERE record_id = ?1", SELECT_COLUMNS);
        let row = conn
            .query_row(&sql, params![record_id], FailureRecordRow::from_row)
            .optional()?;
        row.map(FailureRecordRow::into_record).transpose()
    }

    /// 最早一条尚未决策的记录
    pub fn find_open(&self) -> RepositoryResult<Option<FailureRecord>> {
        let conn = self.get_conn()?;
        let sql = format!(
            "SELECT {} FROM failure_record WHERE decision IS NULL ORDER BY failed_at ASC, created_at ASC LIMIT 1",
            SELECT_COLUMNS
        );
        let row = conn
            .query_row(&sql, [], FailureRecordRow::from_row)
            .optional()?;
        row.map(FailureRecordRow::into_record).transpose()
    }

    /// 全部记录 (按失败时间)
    pub fn list_all(&self) -> RepositoryResult<Vec<FailureRecord>> {
        let conn = self.get_conn()?;
        let sql = format!(
            "SELECT {} FROM failure_record ORDER BY failed_at ASC, created_at ASC",
            SELECT_COLUMNS
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map([], FailureRecordRow::from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        rows.into_iter().map(FailureRecordRow::into_record).collect()
    }

    /// 登记人工决策
    ///
    /// 已决策的记录不可再次决策。
    pub fn resolve(
        &self,
        record_id: &str,
        decision: RecoveryDecision,
        resolved_at: NaiveDateTime,
    ) -> RepositoryResult<()> {
        let conn = self.get_conn()?;
        let updated = conn.execute(
            r#"
            UPDATE failure_record
            SET decision = ?2, resolved_at = ?3
            WHERE record_id = ?1 AND decision IS NULL
            "#,
            params![record_id, decision.to_db_str(), resolved_at],
        )?;

        if updated == 0 {
            let existing: Option<Option<String>> = conn
                .query_row(
                    "SELECT decision FROM failure_record WHERE record_id = ?1",
                    params![record_id],
                    |row| row.get(0),
                )
                .optional()?;
            return match existing {
                None => Err(RepositoryError::NotFound {
                    entity: "FailureRecord".to_string(),
                    id: record_id.to_string(),
                }),
                Some(previous) => Err(RepositoryError::InvalidStateTransition {
                    from: previous.unwrap_or_else(|| "open".to_string()),
                    to: decision.to_db_str().to_string(),
                }),
            };
        }

        tracing::info!(record_id, decision = %decision, "故障记录已决策");
        Ok(())
    }
}
