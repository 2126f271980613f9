// ==========================================
// 渔场设施预定与物资管理系统 - 配置层
// ==========================================
// 职责: 运行参数管理 (提醒天数 / 会话过期 / 预警开关)
// 存储: config_kv 表, scope_id='global'
// ==========================================

pub mod config_manager;

pub use config_manager::{config_keys, ConfigManager};
