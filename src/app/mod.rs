// ==========================================
// 渔场设施预定与物资管理系统 - 应用层
// ==========================================
// 职责: 装配共享状态, 对接消息通道出站
// ==========================================

pub mod channel;
pub mod state;

// 重导出
pub use channel::{
    channel_pipeline, ChannelNotificationSink, ChannelTransport, ConsoleChannelTransport,
    NotificationDispatcher,
};
pub use state::{get_default_db_path, AppState};
