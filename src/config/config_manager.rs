// ==========================================
// 渔场设施预定与物资管理系统 - 配置管理器
// ==========================================
// 职责: 运行参数的加载与覆写 (config_kv 表, scope_id='global')
// 解析失败回落默认值, 不让坏配置阻断业务
// ==========================================

use crate::repository::error::{RepositoryError, RepositoryResult};
use crate::services::sweeper_service::SweeperConfig;
use rusqlite::{params, Connection, OptionalExtension};
use std::sync::{Arc, Mutex};

// ==========================================
// ConfigManager - 配置管理器
// ==========================================
pub struct ConfigManager {
    conn: Arc<Mutex<Connection>>,
}

impl ConfigManager {
    /// 从已有连接创建, 幂等补应用统一 PRAGMA
    pub fn from_connection(conn: Arc<Mutex<Connection>>) -> RepositoryResult<Self> {
        {
            let guard = conn
                .lock()
                .map_err(|e| RepositoryError::LockError(e.to_string()))?;
            crate::db::configure_sqlite_connection(&guard)?;
        }
        Ok(Self { conn })
    }

    fn lock(&self) -> RepositoryResult<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    /// 读取 global 作用域的配置值
    pub fn get_global(&self, key: &str) -> RepositoryResult<Option<String>> {
        let conn = self.lock()?;
        let value = conn
            .query_row(
                "SELECT value FROM config_kv WHERE scope_id = 'global' AND key = ?1",
                params![key],
                |row| row.get::<_, String>(0),
            )
            .optional()?;
        Ok(value)
    }

    fn get_or_default(&self, key: &str, default: &str) -> RepositoryResult<String> {
        Ok(self.get_global(key)?.unwrap_or_else(|| default.to_string()))
    }

    /// 覆写 global 作用域的配置值 (UPSERT)
    pub fn set_global(&self, key: &str, value: &str) -> RepositoryResult<()> {
        if key.trim().is_empty() {
            return Err(RepositoryError::ValidationError(
                "配置键不能为空".to_string(),
            ));
        }
        let conn = self.lock()?;
        conn.execute(
            r#"
            INSERT INTO config_kv (scope_id, key, value, updated_at)
            VALUES ('global', ?1, ?2, datetime('now', 'localtime'))
            ON CONFLICT(scope_id, key)
            DO UPDATE SET value = ?2, updated_at = datetime('now', 'localtime')
            "#,
            params![key.trim(), value],
        )?;
        Ok(())
    }

    /// 列出 global 作用域的全部配置项
    pub fn list_global(&self) -> RepositoryResult<Vec<(String, String)>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT key, value FROM config_kv WHERE scope_id = 'global' ORDER BY key",
        )?;
        let rows = stmt
            .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    // ===== 类型化读取 (带默认值) =====

    /// 低库存预警开关 (默认开)
    pub fn low_stock_alert_enabled(&self) -> RepositoryResult<bool> {
        let value = self.get_or_default(config_keys::LOW_STOCK_ALERT_ENABLED, "true")?;
        Ok(!matches!(
            value.trim().to_lowercase().as_str(),
            "false" | "0" | "off"
        ))
    }

    /// 预定到期提醒的提前天数列表 (默认 7,1)
    pub fn reservation_reminder_days(&self) -> RepositoryResult<Vec<i64>> {
        let value = self.get_or_default(config_keys::RESERVATION_REMINDER_DAYS, "7,1")?;
        let mut days: Vec<i64> = value
            .split(',')
            .filter_map(|s| s.trim().parse::<i64>().ok())
            .filter(|d| (0..=365).contains(d))
            .collect();
        days.sort_unstable();
        days.dedup();
        if days.is_empty() {
            tracing::warn!(
                config_key = config_keys::RESERVATION_REMINDER_DAYS,
                raw_value = %value,
                "提醒天数配置格式错误, 使用默认值"
            );
            return Ok(vec![7, 1]);
        }
        Ok(days)
    }

    /// 借用归还提醒的提前天数 (默认 3)
    pub fn loan_reminder_days(&self) -> RepositoryResult<i64> {
        let value = self.get_or_default(config_keys::LOAN_REMINDER_DAYS, "3")?;
        Ok(value
            .trim()
            .parse::<i64>()
            .ok()
            .filter(|d| (0..=365).contains(d))
            .unwrap_or(3))
    }

    /// 对话会话过期时长, 小时 (默认 72)
    pub fn session_ttl_hours(&self) -> RepositoryResult<i64> {
        let value = self.get_or_default(config_keys::SESSION_TTL_HOURS, "72")?;
        Ok(value
            .trim()
            .parse::<i64>()
            .ok()
            .filter(|h| *h > 0)
            .unwrap_or(72))
    }

    /// 接收管理通知的渠道用户 ID 列表 (默认空)
    pub fn admin_channel_ids(&self) -> RepositoryResult<Vec<String>> {
        let value = self.get_or_default(config_keys::ADMIN_CHANNEL_IDS, "")?;
        Ok(value
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect())
    }

    /// 按当前配置组装清扫参数
    pub fn sweeper_config(&self) -> RepositoryResult<SweeperConfig> {
        Ok(SweeperConfig {
            reservation_reminder_days: self.reservation_reminder_days()?,
            loan_reminder_days: self.loan_reminder_days()?,
            session_ttl_hours: self.session_ttl_hours()?,
        })
    }
}

// ==========================================
// 配置键常量
// ==========================================
pub mod config_keys {
    /// 低库存预警开关
    pub const LOW_STOCK_ALERT_ENABLED: &str = "low_stock_alert_enabled";
    /// 预定到期提醒提前天数 (逗号分隔)
    pub const RESERVATION_REMINDER_DAYS: &str = "reservation_reminder_days";
    /// 借用归还提醒提前天数
    pub const LOAN_REMINDER_DAYS: &str = "loan_reminder_days";
    /// 对话会话过期时长 (小时)
    pub const SESSION_TTL_HOURS: &str = "session_ttl_hours";
    /// 管理通知渠道用户 ID (逗号分隔)
    pub const ADMIN_CHANNEL_IDS: &str = "admin_channel_ids";
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{configure_sqlite_connection, init_db_schema};

    fn setup() -> ConfigManager {
        let conn = Connection::open_in_memory().unwrap();
        configure_sqlite_connection(&conn).unwrap();
        init_db_schema(&conn).unwrap();
        ConfigManager::from_connection(Arc::new(Mutex::new(conn))).unwrap()
    }

    #[test]
    fn test_defaults_when_table_empty() {
        let config = setup();
        assert!(config.low_stock_alert_enabled().unwrap());
        assert_eq!(config.reservation_reminder_days().unwrap(), vec![1, 7]);
        assert_eq!(config.loan_reminder_days().unwrap(), 3);
        assert_eq!(config.session_ttl_hours().unwrap(), 72);
        assert!(config.admin_channel_ids().unwrap().is_empty());
    }

    #[test]
    fn test_set_and_read_back() {
        let config = setup();
        config
            .set_global(config_keys::RESERVATION_REMINDER_DAYS, "14, 3, 3, 1")
            .unwrap();
        config.set_global(config_keys::SESSION_TTL_HOURS, "24").unwrap();
        config
            .set_global(config_keys::ADMIN_CHANNEL_IDS, "U-a, U-b")
            .unwrap();
        config
            .set_global(config_keys::LOW_STOCK_ALERT_ENABLED, "false")
            .unwrap();

        assert_eq!(config.reservation_reminder_days().unwrap(), vec![1, 3, 14]);
        assert_eq!(config.session_ttl_hours().unwrap(), 24);
        assert_eq!(
            config.admin_channel_ids().unwrap(),
            vec!["U-a".to_string(), "U-b".to_string()]
        );
        assert!(!config.low_stock_alert_enabled().unwrap());

        // 覆写同键
        config.set_global(config_keys::SESSION_TTL_HOURS, "48").unwrap();
        assert_eq!(config.session_ttl_hours().unwrap(), 48);
    }

    #[test]
    fn test_malformed_values_fall_back() {
        let config = setup();
        config
            .set_global(config_keys::RESERVATION_REMINDER_DAYS, "很多天")
            .unwrap();
        config.set_global(config_keys::LOAN_REMINDER_DAYS, "-2").unwrap();
        config.set_global(config_keys::SESSION_TTL_HOURS, "0").unwrap();

        assert_eq!(config.reservation_reminder_days().unwrap(), vec![1, 7]);
        assert_eq!(config.loan_reminder_days().unwrap(), 3);
        assert_eq!(config.session_ttl_hours().unwrap(), 72);
    }

    #[test]
    fn test_sweeper_config_assembly() {
        let config = setup();
        config
            .set_global(config_keys::RESERVATION_REMINDER_DAYS, "5")
            .unwrap();
        let sweeper = config.sweeper_config().unwrap();
        assert_eq!(sweeper.reservation_reminder_days, vec![5]);
        assert_eq!(sweeper.loan_reminder_days, 3);
        assert_eq!(sweeper.session_ttl_hours, 72);
    }

    #[test]
    fn test_empty_key_rejected() {
        let config = setup();
        assert!(matches!(
            config.set_global("  ", "v").unwrap_err(),
            RepositoryError::ValidationError(_)
        ));
    }
}
