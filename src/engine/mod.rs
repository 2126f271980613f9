// ==========================================
// 渔场设施预定与物资管理系统 - 引擎层
// ==========================================
// 职责: 可用量计算与状态机规则, 不落库不开事务
// 红线: Engine 不拼 SQL, 拒绝必须给出结构化原因
// 涉及容量的"检查+写入"由 services 层在事务内执行
// ==========================================

pub mod availability;
pub mod events;
pub mod lifecycle;
pub mod repositories;

// 重导出核心引擎
pub use availability::AvailabilityEngine;
pub use events::{
    NoOpNotificationSink, Notification, NotificationKind, NotificationSink, NotificationTarget,
    OptionalNotificationSink,
};
pub use lifecycle::HoldLifecycle;
pub use repositories::ResourceRepositories;
