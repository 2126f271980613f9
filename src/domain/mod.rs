// ==========================================
// 渔场设施预定与物资管理系统 - 领域模型层
// ==========================================
// 职责: 定义领域实体、类型、状态机取值
// 红线: 不含数据访问逻辑,不含引擎逻辑
// ==========================================

pub mod action_log;
pub mod actor;
pub mod admin;
pub mod cancellation;
pub mod equipment;
pub mod pond;
pub mod session;
pub mod stock;
pub mod types;

// 重导出核心类型
pub use action_log::{ActionLog, ActionType};
pub use actor::{ActorContext, ActorRole};
pub use admin::Admin;
pub use cancellation::CancellationRequest;
pub use equipment::{
    Equipment, EquipmentCategory, EquipmentLoan, LineReturn, LoanDraft, LoanLine, LoanLineDraft,
};
pub use pond::{Pond, PondReservation, ReservationDraft};
pub use session::{ConversationState, UserSession};
pub use stock::{
    LedgerMeta, LineApproval, RequisitionDraft, RequisitionLine, RequisitionLineDraft,
    StockCategory, StockItem, StockLedgerEntry, StockRequisition,
};
pub use types::{
    CatalogStatus, DateWindow, HoldKind, HoldStatus, LedgerEntryKind, PondSizeClass, PondStatus,
};
