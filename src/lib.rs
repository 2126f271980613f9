// ==========================================
// 渔场设施预定与物资管理系统 - 核心库
// ==========================================
// 技术栈: Rust + SQLite
// 系统定位: 预定审批与库存台账 (管理员最终控制权)
// ==========================================

// ==========================================
// 模块声明
// ==========================================

// 领域层 - 实体与类型
pub mod domain;

// 数据仓储层 - 数据访问
pub mod repository;

// 引擎层 - 可用量与状态机规则
pub mod engine;

// 服务层 - 持有事务的业务服务
pub mod services;

// 配置层 - 运行参数
pub mod config;

// 数据库基础设施（连接初始化/PRAGMA 统一）
pub mod db;

// 日志系统
pub mod logging;

// API 层 - 业务接口
pub mod api;

// 应用层 - 装配与消息通道
pub mod app;

// ==========================================
// 重导出核心类型
// ==========================================

// 领域类型
pub use domain::types::{
    CatalogStatus, DateWindow, HoldKind, HoldStatus, LedgerEntryKind, PondSizeClass, PondStatus,
};

// 领域实体
pub use domain::{
    ActionLog, ActionType, ActorContext, ActorRole, Admin, CancellationRequest, Equipment,
    EquipmentCategory, EquipmentLoan, Pond, PondReservation, StockCategory, StockItem,
    StockLedgerEntry, StockRequisition, UserSession,
};

// 引擎
pub use engine::{
    AvailabilityEngine, HoldLifecycle, Notification, NotificationKind, NotificationSink,
    OptionalNotificationSink, ResourceRepositories,
};

// 服务
pub use services::{
    ApprovalService, LedgerService, MaintenanceSweeper, SessionService, SweepReport,
};

// API
pub use api::{
    ApiError, ApiResult, CancellationApi, ConfigApi, DashboardApi, EquipmentApi, PondApi,
    SessionApi, StockApi,
};

// ==========================================
// 常量定义
// ==========================================

// 系统版本
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

// 系统名称
pub const APP_NAME: &str = "渔场设施预定与物资管理系统";

// ==========================================
// 预编译检查
// ==========================================

// 确保编译时所有模块可见
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }
}
