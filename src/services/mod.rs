// ==========================================
// 渔场设施预定与物资管理系统 - 服务层
// ==========================================
// 职责: 持有事务的业务服务 (审批流 / 台账 / 定时清扫 / 会话)
// 红线: 容量护栏与状态写入必须在同一事务内,
// 检查与提交之间不允许出现可见窗口
// ==========================================

pub mod approval_service;
pub mod ledger_service;
pub mod session_service;
pub mod sweeper_service;

// 重导出核心服务
pub use approval_service::ApprovalService;
pub use ledger_service::{LedgerService, PostedEntry};
pub use session_service::{SessionReply, SessionService};
pub use sweeper_service::{MaintenanceSweeper, SweepReport, SweeperConfig};
