// ==========================================
// 单线生产排程引擎 - 配置层
// ==========================================
// 职责: 系统配置管理 (config_kv 表 + 类型化 EngineConfig)
// ==========================================

pub mod config_manager;
pub mod engine_config;

// 重导出核心配置管理器
pub use config_manager::{config_keys, ConfigManager, ConfigScope};
pub use engine_config::EngineConfig;
