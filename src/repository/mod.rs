// ==========================================
// 渔场设施预定与物资管理系统 - 数据仓储层
// ==========================================
// 红线: Repository 不含业务逻辑
// ==========================================
// 职责: 提供数据访问接口,屏蔽数据库细节
// 约束: 所有查询使用参数化,防止 SQL 注入
// 涉及容量的"检查+写入"在 services 层的事务内完成
// ==========================================

pub mod action_log_repo;
pub mod admin_repo;
pub mod cancellation_repo;
pub mod equipment_repo;
pub mod error;
pub mod loan_repo;
pub mod pond_repo;
pub mod requisition_repo;
pub mod reservation_repo;
pub mod session_repo;
pub mod stock_repo;

// 重导出核心仓储
pub use action_log_repo::ActionLogRepository;
pub use admin_repo::AdminRepository;
pub use cancellation_repo::CancellationRepository;
pub use equipment_repo::EquipmentRepository;
pub use error::{RepositoryError, RepositoryResult};
pub use loan_repo::LoanRepository;
pub use pond_repo::{PondRepository, PondStatusCount};
pub use requisition_repo::RequisitionRepository;
pub use reservation_repo::ReservationRepository;
pub use session_repo::SessionRepository;
pub use stock_repo::StockRepository;
