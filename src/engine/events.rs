// ==========================================
// 渔场设施预定与物资管理系统 - 通知事件
// ==========================================
// 职责: 定义通知投递 trait, 隔离具体消息渠道
// 说明: Engine/Services 层只依赖 trait, 渠道适配器在外层注入
// 约束: 通知投递失败不回滚业务事务, 调用方只告警
// ==========================================

use serde::{Deserialize, Serialize};
use std::error::Error;
use std::sync::Arc;

// ==========================================
// 通知类型
// ==========================================

/// 通知触发类型
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum NotificationKind {
    /// 新预定待审
    ReservationSubmitted,
    /// 预定已批准
    ReservationApproved,
    /// 预定已驳回
    ReservationRejected,
    /// 预定到期提醒
    ReservationExpiryReminder,
    /// 新借用待审
    LoanSubmitted,
    /// 借用已批准
    LoanApproved,
    /// 借用已驳回
    LoanRejected,
    /// 归还日临近提醒
    LoanReturnReminder,
    /// 借用已逾期
    LoanOverdue,
    /// 新领用申请待审
    RequisitionSubmitted,
    /// 领用已批准
    RequisitionApproved,
    /// 领用已驳回
    RequisitionRejected,
    /// 取消申请待审
    CancellationSubmitted,
    /// 取消申请已裁决
    CancellationDecided,
    /// 物资低于预警阈值
    LowStockAlert,
}

impl NotificationKind {
    /// 转换为字符串标识
    pub fn as_str(&self) -> &str {
        match self {
            NotificationKind::ReservationSubmitted => "ReservationSubmitted",
            NotificationKind::ReservationApproved => "ReservationApproved",
            NotificationKind::ReservationRejected => "ReservationRejected",
            NotificationKind::ReservationExpiryReminder => "ReservationExpiryReminder",
            NotificationKind::LoanSubmitted => "LoanSubmitted",
            NotificationKind::LoanApproved => "LoanApproved",
            NotificationKind::LoanRejected => "LoanRejected",
            NotificationKind::LoanReturnReminder => "LoanReturnReminder",
            NotificationKind::LoanOverdue => "LoanOverdue",
            NotificationKind::RequisitionSubmitted => "RequisitionSubmitted",
            NotificationKind::RequisitionApproved => "RequisitionApproved",
            NotificationKind::RequisitionRejected => "RequisitionRejected",
            NotificationKind::CancellationSubmitted => "CancellationSubmitted",
            NotificationKind::CancellationDecided => "CancellationDecided",
            NotificationKind::LowStockAlert => "LowStockAlert",
        }
    }
}

/// 通知收件方
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum NotificationTarget {
    /// 单个渠道用户 (申请人)
    Requester(String),
    /// 管理员通知群
    AdminChannel,
}

/// 一条待投递的通知
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
    /// 通知类型
    pub kind: NotificationKind,
    /// 收件方
    pub target: NotificationTarget,
    /// 消息正文
    pub text: String,
    /// 关联单号 (排障追溯)
    pub hold_id: Option<String>,
}

impl Notification {
    /// 发给申请人的通知
    pub fn to_requester(
        kind: NotificationKind,
        channel_user_id: impl Into<String>,
        text: impl Into<String>,
        hold_id: Option<String>,
    ) -> Self {
        Self {
            kind,
            target: NotificationTarget::Requester(channel_user_id.into()),
            text: text.into(),
            hold_id,
        }
    }

    /// 发给管理员群的通知
    pub fn to_admins(
        kind: NotificationKind,
        text: impl Into<String>,
        hold_id: Option<String>,
    ) -> Self {
        Self {
            kind,
            target: NotificationTarget::AdminChannel,
            text: text.into(),
            hold_id,
        }
    }
}

// ==========================================
// 通知投递 Trait
// ==========================================

/// 通知投递者 Trait
///
/// 引擎与服务层只构造 Notification 并交给投递者,
/// 不关心具体渠道 (消息机器人 / 邮件 / 仅日志)
pub trait NotificationSink: Send + Sync {
    /// 投递一条通知
    fn deliver(&self, notification: Notification) -> Result<(), Box<dyn Error + Send + Sync>>;
}

/// 空操作投递者
///
/// 用于不需要外发通知的场景 (如单元测试)
#[derive(Debug, Clone, Default)]
pub struct NoOpNotificationSink;

impl NotificationSink for NoOpNotificationSink {
    fn deliver(&self, notification: Notification) -> Result<(), Box<dyn Error + Send + Sync>> {
        tracing::debug!(
            "NoOpNotificationSink: 跳过通知投递 - kind={}, target={:?}",
            notification.kind.as_str(),
            notification.target
        );
        Ok(())
    }
}

/// 可选的通知投递包装
///
/// 简化 Option<Arc<dyn NotificationSink>> 的使用
#[derive(Clone)]
pub struct OptionalNotificationSink {
    inner: Option<Arc<dyn NotificationSink>>,
}

impl OptionalNotificationSink {
    /// 创建带投递者的实例
    pub fn with_sink(sink: Arc<dyn NotificationSink>) -> Self {
        Self { inner: Some(sink) }
    }

    /// 创建空实例 (不投递)
    pub fn none() -> Self {
        Self { inner: None }
    }

    /// 投递通知 (未配置投递者时静默跳过)
    pub fn deliver(&self, notification: Notification) -> Result<(), Box<dyn Error + Send + Sync>> {
        match &self.inner {
            Some(sink) => sink.deliver(notification),
            None => {
                tracing::debug!(
                    "OptionalNotificationSink: 未配置投递者, 跳过通知 - kind={}",
                    notification.kind.as_str()
                );
                Ok(())
            }
        }
    }

    /// 投递通知并吞掉错误 (业务事务已提交, 投递失败只告警)
    pub fn deliver_best_effort(&self, notification: Notification) {
        let kind = notification.kind.as_str().to_string();
        if let Err(e) = self.deliver(notification) {
            tracing::warn!("通知投递失败: kind={}, err={}", kind, e);
        }
    }

    /// 检查是否配置了投递者
    pub fn is_configured(&self) -> bool {
        self.inner.is_some()
    }
}

impl Default for OptionalNotificationSink {
    fn default() -> Self {
        Self::none()
    }
}
