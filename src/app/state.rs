// ==========================================
// 渔场设施预定与物资管理系统 - 应用状态
// ==========================================
// 职责: 从单一 SQLite 连接装配仓储/引擎/服务/API
// 红线: 进程内只开一条连接, 全部数据访问经由同一把锁
// ==========================================

use anyhow::Context;
use rusqlite::Connection;
use std::sync::{Arc, Mutex};

use crate::api::{
    CancellationApi, ConfigApi, DashboardApi, EquipmentApi, PondApi, SessionApi, StockApi,
};
use crate::config::ConfigManager;
use crate::db;
use crate::engine::{AvailabilityEngine, OptionalNotificationSink, ResourceRepositories};
use crate::services::{ApprovalService, LedgerService, MaintenanceSweeper, SessionService};

/// 应用状态
///
/// 持有全部 API 实例和共享资源, 由二进制入口装配一次后共享
pub struct AppState {
    /// 数据库路径 (内存库为 ":memory:")
    pub db_path: String,

    /// 仓储集合 (运维脚本需要直查时使用)
    pub repos: ResourceRepositories,

    /// 运行参数
    pub config: Arc<ConfigManager>,

    /// 鱼池目录与预定API
    pub pond_api: Arc<PondApi>,

    /// 器材目录与借用API
    pub equipment_api: Arc<EquipmentApi>,

    /// 物资目录/台账/领用API
    pub stock_api: Arc<StockApi>,

    /// 取消申请API
    pub cancellation_api: Arc<CancellationApi>,

    /// 对话预定API
    pub session_api: Arc<SessionApi>,

    /// 驾驶舱API
    pub dashboard_api: Arc<DashboardApi>,

    /// 运行参数API
    pub config_api: Arc<ConfigApi>,

    /// 到期巡检服务
    pub sweeper: Arc<MaintenanceSweeper>,
}

impl AppState {
    /// 创建不外发通知的实例 (离线运维与测试)
    pub fn new(db_path: &str) -> anyhow::Result<Self> {
        Self::with_notifier(db_path, OptionalNotificationSink::none())
    }

    /// 创建 AppState, 业务通知经由给定投递者出站
    ///
    /// # 参数
    /// - db_path: 数据库文件路径
    /// - notifier: 通知投递者 (审批/台账/巡检共用)
    ///
    /// # 说明
    /// 该方法会:
    /// 1. 打开数据库并应用统一 PRAGMA
    /// 2. 幂等建表并写入 schema_version
    /// 3. 初始化全部 Repository / Engine / 服务 / API
    pub fn with_notifier(
        db_path: &str,
        notifier: OptionalNotificationSink,
    ) -> anyhow::Result<Self> {
        tracing::info!("初始化AppState, 数据库路径: {}", db_path);

        let conn = db::open_sqlite_connection(db_path)
            .with_context(|| format!("无法打开数据库: {}", db_path))?;
        db::init_db_schema(&conn).context("数据库建表失败")?;
        let conn = Arc::new(Mutex::new(conn));

        Self::from_shared_conn(db_path, conn, notifier)
    }

    /// 在已配置好的共享连接上装配 (内存库测试从这里进)
    pub fn from_shared_conn(
        db_path: &str,
        conn: Arc<Mutex<Connection>>,
        notifier: OptionalNotificationSink,
    ) -> anyhow::Result<Self> {
        // ==========================================
        // 初始化Repository层
        // ==========================================
        let repos = ResourceRepositories::from_conn(conn.clone());

        // 运行参数
        let config = Arc::new(ConfigManager::from_connection(conn.clone())?);

        // ==========================================
        // 初始化Engine层
        // ==========================================
        let availability = Arc::new(AvailabilityEngine::new(repos.clone()));

        // ==========================================
        // 初始化服务层
        // ==========================================
        let approvals = Arc::new(ApprovalService::new(
            conn.clone(),
            repos.clone(),
            notifier.clone(),
        ));
        let ledger = Arc::new(LedgerService::new(
            conn.clone(),
            repos.action_log_repo.clone(),
            notifier.clone(),
        ));
        let sessions = Arc::new(SessionService::new(repos.clone(), approvals.clone()));

        let sweeper_cfg = config.sweeper_config()?;
        tracing::info!(
            "巡检参数: 预定提醒={:?} 归还提醒提前{}天 会话保留{}小时",
            sweeper_cfg.reservation_reminder_days,
            sweeper_cfg.loan_reminder_days,
            sweeper_cfg.session_ttl_hours
        );
        let sweeper = Arc::new(MaintenanceSweeper::new(
            conn,
            repos.clone(),
            notifier,
            sweeper_cfg,
        ));

        // ==========================================
        // 初始化API层
        // ==========================================
        let pond_api = Arc::new(PondApi::new(
            repos.clone(),
            availability.clone(),
            approvals.clone(),
        ));
        let equipment_api = Arc::new(EquipmentApi::new(
            repos.clone(),
            availability.clone(),
            approvals.clone(),
        ));
        let stock_api = Arc::new(StockApi::new(
            repos.clone(),
            ledger,
            approvals.clone(),
        ));
        let cancellation_api = Arc::new(CancellationApi::new(repos.clone(), approvals));
        let session_api = Arc::new(SessionApi::new(repos.clone(), availability, sessions));
        let dashboard_api = Arc::new(DashboardApi::new(repos.clone()));
        let config_api = Arc::new(ConfigApi::new(
            config.clone(),
            repos.action_log_repo.clone(),
        ));

        tracing::info!("AppState初始化完成");

        Ok(Self {
            db_path: db_path.to_string(),
            repos,
            config,
            pond_api,
            equipment_api,
            stock_api,
            cancellation_api,
            session_api,
            dashboard_api,
            config_api,
            sweeper,
        })
    }

    /// 获取数据库路径
    pub fn get_db_path(&self) -> &str {
        &self.db_path
    }
}

// ==========================================
// 默认数据库路径辅助函数
// ==========================================

/// 获取默认数据库路径
///
/// 允许通过环境变量 FISH_POND_RMS_DB_PATH 显式指定 (便于调试/测试/CI),
/// 未指定时使用工作目录下的 fish_pond_rms.db
pub fn get_default_db_path() -> String {
    if let Ok(path) = std::env::var("FISH_POND_RMS_DB_PATH") {
        let trimmed = path.trim();
        if !trimmed.is_empty() {
            return trimmed.to_string();
        }
    }
    "./fish_pond_rms.db".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ActorContext;

    #[test]
    fn test_get_default_db_path() {
        let path = get_default_db_path();
        assert!(!path.is_empty());
        assert!(path.ends_with(".db"));
    }

    #[test]
    fn test_appstate_boots_on_memory_db() {
        let state = AppState::new(":memory:").unwrap();

        // 空库上驾驶舱可直接使用
        let summary = state.dashboard_api.summary().unwrap();
        assert_eq!(summary.pending_cancellations, 0);
        assert_eq!(summary.active_sessions, 0);

        // 各 API 共享同一连接: 经 pond_api 建池后 dashboard 立即可见
        let admin_id = state
            .repos
            .admin_repo
            .insert("admin", "hash", "管理员", "admin")
            .unwrap();
        let admin = ActorContext::admin(admin_id);
        state
            .pond_api
            .create_pond("A1", "A", None, crate::domain::PondSizeClass::Large, &admin)
            .unwrap();

        let summary = state.dashboard_api.summary().unwrap();
        assert_eq!(summary.ponds.available, 1);
    }
}
