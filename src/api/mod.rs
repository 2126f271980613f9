// ==========================================
// 渔场设施预定与物资管理系统 - API 层
// ==========================================
// 职责: 管理端与渠道适配层的统一入口
// 本层只做入参校验/鉴权/错误转换, 业务在 Services 与 Engine 层
// ==========================================

pub mod error;

pub mod cancellation_api;
pub mod config_api;
pub mod dashboard_api;
pub mod equipment_api;
pub mod pond_api;
pub mod session_api;
pub mod stock_api;

// 重导出核心类型
pub use error::{ApiError, ApiResult, ErrorBody};

pub use cancellation_api::CancellationApi;
pub use config_api::{ConfigApi, ConfigItem};
pub use dashboard_api::{DashboardApi, DashboardSummary, PendingQueue, StatusCount};
pub use equipment_api::{EquipmentApi, EquipmentAvailabilityRow};
pub use pond_api::PondApi;
pub use session_api::SessionApi;
pub use stock_api::StockApi;
