// ==========================================
// 渔场设施预定与物资管理系统 - 审批服务
// ==========================================
// 职责: 预定/借用/领用/取消申请四类单据的提交与状态迁移
// 红线:
// - 审批必须在事务内重查冲突并排除自身, 检查与写入之间无可见窗口
// - 多行单据全有或全无, 任一行不满足则整单回滚
// - 日志与通知在提交之后补记, 失败只打日志不回滚
// 提交侧校验是乐观的: pending 单据允许互相重叠,
// 冲突最终在审批护栏处裁决
// ==========================================

use crate::domain::action_log::{ActionLog, ActionType};
use crate::domain::actor::ActorContext;
use crate::domain::cancellation::CancellationRequest;
use crate::domain::equipment::{EquipmentLoan, LineReturn, LoanDraft};
use crate::domain::pond::{PondReservation, ReservationDraft};
use crate::domain::stock::{LedgerMeta, LineApproval, RequisitionDraft, StockRequisition};
use crate::domain::types::{DateWindow, HoldKind, HoldStatus, PondStatus};
use crate::engine::events::{Notification, NotificationKind, OptionalNotificationSink};
use crate::engine::lifecycle::HoldLifecycle;
use crate::engine::repositories::ResourceRepositories;
use crate::repository::error::{RepositoryError, RepositoryResult};
use crate::services::ledger_service::{apply_ledger_op_tx, LedgerOp};
use chrono::{Local, NaiveDateTime};
use rusqlite::{params, Connection, OptionalExtension, Transaction};
use std::sync::{Arc, Mutex};
use uuid::Uuid;

// ==========================================
// ApprovalService - 审批服务
// ==========================================
pub struct ApprovalService {
    conn: Arc<Mutex<Connection>>,
    repos: ResourceRepositories,
    notifier: OptionalNotificationSink,
}

impl ApprovalService {
    /// 创建审批服务 (repos 须与 conn 共用同一连接)
    pub fn new(
        conn: Arc<Mutex<Connection>>,
        repos: ResourceRepositories,
        notifier: OptionalNotificationSink,
    ) -> Self {
        Self {
            conn,
            repos,
            notifier,
        }
    }

    fn lock(&self) -> RepositoryResult<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    /// 补记操作日志, 失败只告警
    fn record_log(&self, log: ActionLog) {
        if let Err(e) = self.repos.action_log_repo.insert(&log) {
            tracing::warn!("操作日志记录失败: action={}, err={}", log.action_type, e);
        }
    }

    /// 通知申请人, 单据未留渠道用户时静默跳过
    fn notify_requester(
        &self,
        kind: NotificationKind,
        channel_user_id: Option<&str>,
        text: String,
        hold_id: Option<String>,
    ) {
        match channel_user_id {
            Some(uid) => self
                .notifier
                .deliver_best_effort(Notification::to_requester(kind, uid, text, hold_id)),
            None => tracing::debug!("单据无渠道用户, 跳过通知: kind={}", kind.as_str()),
        }
    }

    fn notify_admins(&self, kind: NotificationKind, text: String, hold_id: Option<String>) {
        self.notifier
            .deliver_best_effort(Notification::to_admins(kind, text, hold_id));
    }

    // 各单据的提交与迁移拆分在子模块, 入口仅保留构造与公共辅助
}

/// 管理员鉴权, 返回管理员数值 ID
fn require_admin(actor: &ActorContext) -> RepositoryResult<i64> {
    actor
        .admin_id()
        .ok_or_else(|| RepositoryError::Unauthorized("仅管理员可执行该操作".to_string()))
}

fn now_local() -> NaiveDateTime {
    Local::now().naive_local()
}

mod cancellations;
mod guard;
mod loans;
mod requisitions;
mod reservations;
