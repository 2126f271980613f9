// ==========================================
// 渔场设施预定与物资管理系统 - 配置 API
// ==========================================
// 职责: 运行参数的查询与覆写, 每次覆写记操作日志
// 已知键做取值校验, 未知键按普通字符串存取
// ==========================================

use std::sync::Arc;

use crate::api::error::{ApiError, ApiResult};
use crate::api::pond_api::require_admin;
use crate::config::config_manager::{config_keys, ConfigManager};
use crate::domain::action_log::{ActionLog, ActionType};
use crate::domain::actor::ActorContext;
use crate::repository::ActionLogRepository;
use serde::{Deserialize, Serialize};

// ==========================================
// ConfigApi - 运行参数
// ==========================================
pub struct ConfigApi {
    config: Arc<ConfigManager>,
    action_log_repo: Arc<ActionLogRepository>,
}

impl ConfigApi {
    pub fn new(config: Arc<ConfigManager>, action_log_repo: Arc<ActionLogRepository>) -> Self {
        Self {
            config,
            action_log_repo,
        }
    }

    /// 查询全部运行参数
    pub fn list_configs(&self) -> ApiResult<Vec<ConfigItem>> {
        let rows = self.config.list_global()?;
        Ok(rows
            .into_iter()
            .map(|(key, value)| ConfigItem { key, value })
            .collect())
    }

    /// 查询单个运行参数
    pub fn get_config(&self, key: &str) -> ApiResult<Option<ConfigItem>> {
        let value = self.config.get_global(key)?;
        Ok(value.map(|value| ConfigItem {
            key: key.to_string(),
            value,
        }))
    }

    /// 覆写运行参数
    pub fn update_config(&self, key: &str, value: &str, actor: &ActorContext) -> ApiResult<()> {
        let admin_id = require_admin(actor)?;
        if key.trim().is_empty() {
            return Err(ApiError::InvalidInput("配置键不能为空".to_string()));
        }
        validate_known_key(key.trim(), value)?;

        self.config.set_global(key.trim(), value)?;
        let log = ActionLog::new(ActionType::ConfigChange, Some(admin_id.to_string()))
            .with_details(format!("配置覆写: {} = {}", key.trim(), value));
        if let Err(e) = self.action_log_repo.insert(&log) {
            tracing::warn!("操作日志记录失败: action={}, err={}", log.action_type, e);
        }
        Ok(())
    }
}

/// 已知键的取值校验, 未知键放行
fn validate_known_key(key: &str, value: &str) -> ApiResult<()> {
    match key {
        config_keys::LOW_STOCK_ALERT_ENABLED => {
            let v = value.trim().to_lowercase();
            if !matches!(v.as_str(), "true" | "false" | "1" | "0" | "on" | "off") {
                return Err(ApiError::InvalidInput(
                    "预警开关取值须为 true/false".to_string(),
                ));
            }
        }
        config_keys::RESERVATION_REMINDER_DAYS => {
            let ok = !value.trim().is_empty()
                && value
                    .split(',')
                    .all(|s| s.trim().parse::<i64>().map_or(false, |d| (0..=365).contains(&d)));
            if !ok {
                return Err(ApiError::InvalidInput(
                    "提醒天数须为 0-365 的整数, 逗号分隔".to_string(),
                ));
            }
        }
        config_keys::LOAN_REMINDER_DAYS => {
            if value
                .trim()
                .parse::<i64>()
                .map_or(true, |d| !(0..=365).contains(&d))
            {
                return Err(ApiError::InvalidInput(
                    "提醒天数须为 0-365 的整数".to_string(),
                ));
            }
        }
        config_keys::SESSION_TTL_HOURS => {
            if value.trim().parse::<i64>().map_or(true, |h| h <= 0) {
                return Err(ApiError::InvalidInput("会话过期时长须为正整数".to_string()));
            }
        }
        _ => {}
    }
    Ok(())
}

// ==========================================
// DTO 类型定义
// ==========================================

/// 运行参数项 (global 作用域)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigItem {
    pub key: String,
    pub value: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{configure_sqlite_connection, init_db_schema};
    use crate::engine::repositories::ResourceRepositories;
    use rusqlite::Connection;
    use std::sync::Mutex;

    fn setup() -> (ConfigApi, Arc<ConfigManager>, i64) {
        let conn = Connection::open_in_memory().unwrap();
        configure_sqlite_connection(&conn).unwrap();
        init_db_schema(&conn).unwrap();
        let conn = Arc::new(Mutex::new(conn));
        let repos = ResourceRepositories::from_conn(conn.clone());
        let config = Arc::new(ConfigManager::from_connection(conn).unwrap());
        let api = ConfigApi::new(config.clone(), repos.action_log_repo.clone());
        let admin_id = repos
            .admin_repo
            .insert("admin", "hash", "管理员", "admin")
            .unwrap();
        (api, config, admin_id)
    }

    #[test]
    fn test_update_requires_admin_and_validates() {
        let (api, config, admin_id) = setup();
        let admin = ActorContext::admin(admin_id);

        let err = api
            .update_config(
                config_keys::SESSION_TTL_HOURS,
                "24",
                &ActorContext::requester("U-1"),
            )
            .unwrap_err();
        assert!(matches!(err, ApiError::Unauthorized(_)));

        let err = api
            .update_config(config_keys::SESSION_TTL_HOURS, "-5", &admin)
            .unwrap_err();
        assert!(matches!(err, ApiError::InvalidInput(_)));
        let err = api
            .update_config(config_keys::RESERVATION_REMINDER_DAYS, "7,很多", &admin)
            .unwrap_err();
        assert!(matches!(err, ApiError::InvalidInput(_)));

        api.update_config(config_keys::SESSION_TTL_HOURS, "24", &admin)
            .unwrap();
        assert_eq!(config.session_ttl_hours().unwrap(), 24);
    }

    #[test]
    fn test_list_and_get_round_trip() {
        let (api, _config, admin_id) = setup();
        let admin = ActorContext::admin(admin_id);

        assert!(api.get_config("unset_key").unwrap().is_none());
        api.update_config(config_keys::LOAN_REMINDER_DAYS, "5", &admin)
            .unwrap();
        api.update_config("farm_display_name", "东湖渔场", &admin)
            .unwrap();

        let item = api
            .get_config(config_keys::LOAN_REMINDER_DAYS)
            .unwrap()
            .unwrap();
        assert_eq!(item.value, "5");

        let all = api.list_configs().unwrap();
        assert_eq!(all.len(), 2);
        assert!(all.iter().any(|c| c.key == "farm_display_name"));
    }
}
