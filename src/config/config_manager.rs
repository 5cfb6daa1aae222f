// ==========================================
// 单线生产排程引擎 - 配置管理器
// ==========================================
// 职责: 配置加载、查询、覆写管理
// 存储: config_kv 表 (key-value + scope)
// ==========================================

use crate::config::engine_config::EngineConfig;
use crate::db::{ensure_schema, open_sqlite_connection};
use crate::repository::error::{RepositoryError, RepositoryResult};
use rusqlite::{params, Connection, OptionalExtension};
use serde::de::DeserializeOwned;
use serde_json::json;
use std::collections::{BTreeMap, HashMap};
use std::str::FromStr;
use std::sync::{Arc, Mutex};

// ==========================================
// ConfigManager - 配置管理器
// ==========================================
pub struct ConfigManager {
    conn: Arc<Mutex<Connection>>,
}

impl ConfigManager {
    /// 创建新的 ConfigManager 实例
    ///
    /// # 参数
    /// - db_path: 数据库文件路径
    pub fn new(db_path: &str) -> RepositoryResult<Self> {
        let conn = open_sqlite_connection(db_path)?;
        ensure_schema(&conn)?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// 从已有连接创建 ConfigManager
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

    /// 从 config_kv 表读取配置值（scope_id='global'）
    ///
    /// # 返回
    /// - Some(String): 配置值
    /// - None: 配置不存在
    pub fn get_global_config_value(&self, key: &str) -> RepositoryResult<Option<String>> {
        let conn = self.get_conn()?;
        let value = conn
            .query_row(
                "SELECT value FROM config_kv WHERE scope_id = ?1 AND key = ?2",
                params![ConfigScope::Global.scope_id(), key],
                |row| row.get::<_, String>(0),
            )
            .optional()?;
        Ok(value)
    }

    /// 写入配置值 (UPSERT)
    pub fn set_config_value(&self, key: &str, value: &str) -> RepositoryResult<()> {
        let conn = self.get_conn()?;
        conn.execute(
            "INSERT INTO config_kv (scope_id, key, value) VALUES (?1, ?2, ?3)
             ON CONFLICT(scope_id, key) DO UPDATE SET value = ?3, updated_at = datetime('now')",
            params![ConfigScope::Global.scope_id(), key, value],
        )?;
        tracing::info!(config_key = key, value = value, "配置已更新");
        Ok(())
    }

    /// 获取所有配置的快照（JSON格式, 按键排序）
    pub fn get_config_snapshot(&self) -> RepositoryResult<String> {
        let conn = self.get_conn()?;

        let mut stmt = conn.prepare(
            "SELECT key, value FROM config_kv WHERE scope_id = ?1 ORDER BY key",
        )?;
        let rows = stmt.query_map(params![ConfigScope::Global.scope_id()], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?;

        let mut config_map: BTreeMap<String, String> = BTreeMap::new();
        for row in rows {
            let (key, value) = row?;
            config_map.insert(key, value);
        }

        Ok(serde_json::to_string(&json!(config_map))?)
    }

    /// 解析数值配置; 缺失时使用默认值, 格式错误报错
    fn get_parsed<T: FromStr>(&self, key: &str, default: T) -> RepositoryResult<T>
    where
        T::Err: std::fmt::Display,
    {
        match self.get_global_config_value(key)? {
            None => Ok(default),
            Some(raw) => raw
                .trim()
                .parse::<T>()
                .map_err(|e| RepositoryError::FieldValueError {
                    field: key.to_string(),
                    message: format!("'{}': {}", raw, e),
                }),
        }
    }

    /// 解析 JSON 配置; 缺失时使用默认值
    fn get_json<T: DeserializeOwned>(&self, key: &str, default: T) -> RepositoryResult<T> {
        match self.get_global_config_value(key)? {
            None => Ok(default),
            Some(raw) => serde_json::from_str(&raw).map_err(|e| RepositoryError::FieldValueError {
                field: key.to_string(),
                message: e.to_string(),
            }),
        }
    }

    /// 加载引擎配置
    ///
    /// 班次或排序策略无效时直接报错 (构造期错误)。
    pub fn load_engine_config(&self) -> RepositoryResult<EngineConfig> {
        let defaults = EngineConfig::default();

        let customer_tiers: HashMap<String, u32> =
            self.get_json(config_keys::CUSTOMER_TIERS, defaults.customer_tiers.clone())?;
        let manual_sequence: Vec<String> =
            self.get_json(config_keys::MANUAL_SEQUENCE, defaults.manual_sequence.clone())?;

        let config = EngineConfig {
            shift_start_hour: self.get_parsed(config_keys::SHIFT_START_HOUR, defaults.shift_start_hour)?,
            shift_end_hour: self.get_parsed(config_keys::SHIFT_END_HOUR, defaults.shift_end_hour)?,
            sequencing_policy: self
                .get_global_config_value(config_keys::SEQUENCING_POLICY)?
                .unwrap_or_else(|| defaults.sequencing_policy.clone()),
            customer_tiers,
            manual_sequence,
            date_write_max_attempts: self.get_parsed(
                config_keys::DATE_WRITE_MAX_ATTEMPTS,
                defaults.date_write_max_attempts,
            )?,
            date_write_backoff_ms: self.get_parsed(
                config_keys::DATE_WRITE_BACKOFF_MS,
                defaults.date_write_backoff_ms,
            )?,
        };

        config.validate().map_err(|e| RepositoryError::FieldValueError {
            field: "engine_config".to_string(),
            message: e.to_string(),
        })?;

        tracing::debug!(
            shift_start = config.shift_start_hour,
            shift_end = config.shift_end_hour,
            policy = %config.sequencing_policy,
            "引擎配置已加载"
        );
        Ok(config)
    }
}

// ==========================================
// ConfigScope - 配置作用域
// ==========================================
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigScope {
    Global,                          // 全局
    Customer { customer: String },   // 客户
}

impl ConfigScope {
    pub fn scope_id(&self) -> String {
        match self {
            ConfigScope::Global => "global".to_string(),
            ConfigScope::Customer { customer } => format!("customer/{}", customer),
        }
    }
}

// ==========================================
// 配置键常量
// ==========================================
pub mod config_keys {
    // 班次
    pub const SHIFT_START_HOUR: &str = "shift_start_hour";
    pub const SHIFT_END_HOUR: &str = "shift_end_hour";

    // 排序
    pub const SEQUENCING_POLICY: &str = "sequencing_policy";
    pub const CUSTOMER_TIERS: &str = "customer_tiers"; // 客户等级 (JSON)
    pub const MANUAL_SEQUENCE: &str = "manual_sequence"; // 人工顺序 (JSON 订单ID数组)

    // 日期回写
    pub const DATE_WRITE_MAX_ATTEMPTS: &str = "date_write_max_attempts";
    pub const DATE_WRITE_BACKOFF_MS: &str = "date_write_backoff_ms";
}
