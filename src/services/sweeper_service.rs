// ==========================================
// 渔场设施预定与物资管理系统 - 到期巡检服务
// ==========================================
// 职责: 每日定时任务 (结单/逾期/到期提醒/会话清理)
// 要求:
// - 幂等: 当日重复执行不产生重复状态迁移
// - 不中断: 单行失败计入报告并继续, 巡检本身不返回错误
// 状态写入带状态前置条件, 与并发的人工操作互不踩踏
// ==========================================

use crate::domain::action_log::{ActionLog, ActionType};
use crate::domain::equipment::EquipmentLoan;
use crate::domain::pond::PondReservation;
use crate::domain::types::HoldStatus;
use crate::engine::events::{Notification, NotificationKind, OptionalNotificationSink};
use crate::engine::repositories::ResourceRepositories;
use crate::repository::error::{RepositoryError, RepositoryResult};
use chrono::{Duration, Local, NaiveDate};
use rusqlite::{params, Connection};
use std::sync::{Arc, Mutex};
use tracing::instrument;

/// 巡检参数 (提醒提前量与会话保留时长)
#[derive(Debug, Clone)]
pub struct SweeperConfig {
    /// 预定到期前第几天发提醒
    pub reservation_reminder_days: Vec<i64>,
    /// 归还日前几天发提醒
    pub loan_reminder_days: i64,
    /// 会话闲置多少小时后清理
    pub session_ttl_hours: i64,
}

impl Default for SweeperConfig {
    fn default() -> Self {
        Self {
            reservation_reminder_days: vec![7, 1],
            loan_reminder_days: 3,
            session_ttl_hours: 72,
        }
    }
}

/// 一次巡检的结果汇总
#[derive(Debug, Clone, Default)]
pub struct SweepReport {
    /// 自动结单的预定数
    pub completed_reservations: usize,
    /// 新标记逾期的借用单数
    pub overdue_loans: usize,
    /// 发出的预定到期提醒数
    pub reservation_reminders: usize,
    /// 发出的归还提醒数
    pub loan_reminders: usize,
    /// 清理的闲置会话数
    pub purged_sessions: usize,
    /// 跳过的失败行数
    pub errors: usize,
}

// ==========================================
// MaintenanceSweeper - 到期巡检
// ==========================================
pub struct MaintenanceSweeper {
    conn: Arc<Mutex<Connection>>,
    repos: ResourceRepositories,
    notifier: OptionalNotificationSink,
    config: SweeperConfig,
}

impl MaintenanceSweeper {
    /// 创建巡检服务 (repos 须与 conn 共用同一连接)
    pub fn new(
        conn: Arc<Mutex<Connection>>,
        repos: ResourceRepositories,
        notifier: OptionalNotificationSink,
        config: SweeperConfig,
    ) -> Self {
        Self {
            conn,
            repos,
            notifier,
            config,
        }
    }

    /// 执行全部巡检步骤
    #[instrument(skip(self, today), fields(today = %today))]
    pub fn run_daily(&self, today: NaiveDate) -> SweepReport {
        let mut report = SweepReport::default();
        self.complete_expired_reservations(today, &mut report);
        self.mark_overdue_loans(today, &mut report);
        self.send_reservation_reminders(today, &mut report);
        self.send_loan_reminders(today, &mut report);
        self.purge_stale_sessions(&mut report);
        tracing::info!(
            "巡检完成: 结单{} 逾期{} 预定提醒{} 归还提醒{} 清理会话{} 失败{}",
            report.completed_reservations,
            report.overdue_loans,
            report.reservation_reminders,
            report.loan_reminders,
            report.purged_sessions,
            report.errors
        );
        report
    }

    /// 使用窗口已整体结束的已批准预定自动结单
    fn complete_expired_reservations(&self, today: NaiveDate, report: &mut SweepReport) {
        let candidates = match self.repos.reservation_repo.find_by_status(HoldStatus::Approved) {
            Ok(rows) => rows,
            Err(e) => {
                tracing::error!("到期预定查询失败: {}", e);
                report.errors += 1;
                return;
            }
        };
        for reservation in candidates
            .iter()
            .filter(|r| r.window().ended_before(today))
        {
            match self.complete_one_reservation(reservation) {
                Ok(true) => report.completed_reservations += 1,
                Ok(false) => {} // 并发操作已改过状态, 跳过
                Err(e) => {
                    tracing::warn!("预定结单失败: id={}, err={}", reservation.id, e);
                    report.errors += 1;
                }
            }
        }
    }

    /// 单笔结单, 带状态前置条件
    fn complete_one_reservation(&self, reservation: &PondReservation) -> RepositoryResult<bool> {
        let changed = {
            let conn = self
                .conn
                .lock()
                .map_err(|e| RepositoryError::LockError(e.to_string()))?;
            conn.execute(
                "UPDATE pond_reservations SET status = 'completed' WHERE id = ?1 AND status = 'approved'",
                params![reservation.id],
            )?
        };
        if changed == 0 {
            return Ok(false);
        }
        self.record_log(
            ActionLog::new(ActionType::CompleteReservation, None)
                .with_pond(reservation.pond_id)
                .with_reservation(&reservation.id)
                .with_details(format!(
                    "到期自动结单: {} {}",
                    reservation.pond_code.as_deref().unwrap_or("?"),
                    reservation.window()
                )),
        );
        Ok(true)
    }

    /// 超过约定归还日的借用单标记逾期 (approved 表示批了一直没来取也算)
    fn mark_overdue_loans(&self, today: NaiveDate, report: &mut SweepReport) {
        let mut candidates = Vec::new();
        for status in [HoldStatus::Approved, HoldStatus::Borrowed] {
            match self.repos.loan_repo.find_by_status(status) {
                Ok(rows) => candidates.extend(rows),
                Err(e) => {
                    tracing::error!("逾期借用查询失败: {}", e);
                    report.errors += 1;
                }
            }
        }
        for loan in candidates.iter().filter(|l| l.return_date < today) {
            match self.mark_one_overdue(loan) {
                Ok(true) => report.overdue_loans += 1,
                Ok(false) => {}
                Err(e) => {
                    tracing::warn!("逾期标记失败: id={}, err={}", loan.id, e);
                    report.errors += 1;
                }
            }
        }
    }

    fn mark_one_overdue(&self, loan: &EquipmentLoan) -> RepositoryResult<bool> {
        let changed = {
            let conn = self
                .conn
                .lock()
                .map_err(|e| RepositoryError::LockError(e.to_string()))?;
            conn.execute(
                "UPDATE equipment_loans SET status = 'overdue' WHERE id = ?1 AND status IN ('approved', 'borrowed')",
                params![loan.id],
            )?
        };
        if changed == 0 {
            return Ok(false);
        }
        self.record_log(
            ActionLog::new(ActionType::MarkOverdue, None)
                .with_loan(&loan.id)
                .with_details(format!(
                    "逾期: {} 应于 {} 归还",
                    loan.user_name,
                    loan.return_date.format("%Y-%m-%d")
                )),
        );
        if let Some(uid) = loan.channel_user_id.as_deref() {
            self.notifier.deliver_best_effort(Notification::to_requester(
                NotificationKind::LoanOverdue,
                uid,
                format!(
                    "您借用的器材已逾期 (约定归还日 {}), 请尽快归还",
                    loan.return_date.format("%Y-%m-%d")
                ),
                Some(loan.id.clone()),
            ));
        }
        Ok(true)
    }

    /// 预定到期提醒 (按配置的提前天数精确命中)
    fn send_reservation_reminders(&self, today: NaiveDate, report: &mut SweepReport) {
        for days in &self.config.reservation_reminder_days {
            let target = today + Duration::days(*days);
            let rows = match self.repos.reservation_repo.find_approved_ending_on(target) {
                Ok(rows) => rows,
                Err(e) => {
                    tracing::error!("到期提醒查询失败: {}", e);
                    report.errors += 1;
                    continue;
                }
            };
            for reservation in &rows {
                let Some(uid) = reservation.channel_user_id.as_deref() else {
                    continue;
                };
                self.notifier.deliver_best_effort(Notification::to_requester(
                    NotificationKind::ReservationExpiryReminder,
                    uid,
                    format!(
                        "您预定的 {} 将于 {} 到期 (剩余 {} 天)",
                        reservation.pond_code.as_deref().unwrap_or("?"),
                        reservation.end_date.format("%Y-%m-%d"),
                        days
                    ),
                    Some(reservation.id.clone()),
                ));
                report.reservation_reminders += 1;
            }
        }
    }

    /// 归还日临近提醒
    fn send_loan_reminders(&self, today: NaiveDate, report: &mut SweepReport) {
        let target = today + Duration::days(self.config.loan_reminder_days);
        let rows = match self.repos.loan_repo.find_borrowed_due_on(target) {
            Ok(rows) => rows,
            Err(e) => {
                tracing::error!("归还提醒查询失败: {}", e);
                report.errors += 1;
                return;
            }
        };
        for loan in &rows {
            let Some(uid) = loan.channel_user_id.as_deref() else {
                continue;
            };
            self.notifier.deliver_best_effort(Notification::to_requester(
                NotificationKind::LoanReturnReminder,
                uid,
                format!(
                    "您借用的器材需在 {} 前归还",
                    loan.return_date.format("%Y-%m-%d")
                ),
                Some(loan.id.clone()),
            ));
            report.loan_reminders += 1;
        }
    }

    /// 清理闲置超时的对话会话
    fn purge_stale_sessions(&self, report: &mut SweepReport) {
        let cutoff = Local::now().naive_local() - Duration::hours(self.config.session_ttl_hours);
        match self.repos.session_repo.purge_older_than(cutoff) {
            Ok(purged) => report.purged_sessions = purged,
            Err(e) => {
                tracing::error!("会话清理失败: {}", e);
                report.errors += 1;
            }
        }
    }

    fn record_log(&self, log: ActionLog) {
        if let Err(e) = self.repos.action_log_repo.insert(&log) {
            tracing::warn!("操作日志记录失败: action={}, err={}", log.action_type, e);
        }
    }
}
