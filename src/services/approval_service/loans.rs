// ==========================================
// 器材借用的提交与状态迁移
// ==========================================
// 借用走共享池口径: 审批时按窗口重算每项器材的已承诺量,
// 任一行超出可用量则整单不批

use super::*;
use crate::domain::equipment::LoanLine;
use crate::domain::types::CatalogStatus;
use std::collections::HashSet;

impl ApprovalService {
    /// 提交器材借用
    ///
    /// 提交侧只校验绝对上限 (单行数量不超过器材总量),
    /// 窗口内的占用竞争留给审批护栏
    pub fn submit_loan(&self, draft: LoanDraft) -> RepositoryResult<EquipmentLoan> {
        let user_name = draft.user_name.trim();
        if user_name.is_empty() {
            return Err(RepositoryError::ValidationError(
                "申请人姓名不能为空".to_string(),
            ));
        }
        let window = DateWindow::new(draft.borrow_date, draft.return_date).ok_or_else(|| {
            RepositoryError::ValidationError("归还日期不能早于借出日期".to_string())
        })?;
        if draft.items.is_empty() {
            return Err(RepositoryError::ValidationError(
                "至少需要一条借用明细".to_string(),
            ));
        }
        let mut seen = HashSet::new();
        for line in &draft.items {
            if line.quantity <= 0 {
                return Err(RepositoryError::ValidationError(
                    "借用数量必须为正".to_string(),
                ));
            }
            if !seen.insert(line.equipment_id) {
                return Err(RepositoryError::ValidationError(
                    "同一器材不能重复填写".to_string(),
                ));
            }
        }

        let mut lines = Vec::with_capacity(draft.items.len());
        for line in &draft.items {
            let equipment = self
                .repos
                .equipment_repo
                .find_by_id(line.equipment_id)?
                .ok_or_else(|| RepositoryError::NotFound {
                    entity: "器材".to_string(),
                    id: line.equipment_id.to_string(),
                })?;
            if equipment.status != CatalogStatus::Active {
                return Err(RepositoryError::BusinessRuleViolation(format!(
                    "器材已停用: {}",
                    equipment.name
                )));
            }
            if line.quantity > equipment.total_quantity {
                return Err(RepositoryError::CapacityExceeded {
                    resource: equipment.name,
                    requested: line.quantity,
                    available: equipment.total_quantity,
                });
            }
            lines.push(LoanLine {
                id: 0,
                loan_id: String::new(),
                equipment_id: line.equipment_id,
                equipment_name: Some(equipment.name),
                unit: Some(equipment.unit),
                quantity: line.quantity,
                returned_quantity: 0,
            });
        }

        let loan = EquipmentLoan {
            id: Uuid::new_v4().to_string(),
            user_name: user_name.to_string(),
            channel_user_id: draft.channel_user_id,
            phone: draft.phone,
            purpose: draft.purpose,
            borrow_date: window.start,
            return_date: window.end,
            actual_return_date: None,
            status: HoldStatus::Pending,
            reject_reason: None,
            decided_by: None,
            decided_at: None,
            created_at: now_local(),
            items: lines,
        };
        let id = self.repos.loan_repo.insert(&loan)?;
        tracing::info!(
            "借用提交: id={}, user={}, lines={}",
            id,
            loan.user_name,
            loan.items.len()
        );

        self.record_log(
            ActionLog::new(ActionType::SubmitLoan, loan.channel_user_id.clone())
                .with_loan(&id)
                .with_details(format!(
                    "{} 借用 {} 项器材 {}",
                    loan.user_name,
                    loan.items.len(),
                    window
                )),
        );
        self.notify_admins(
            NotificationKind::LoanSubmitted,
            format!(
                "新的器材借用申请: {} 共 {} 项 {}",
                loan.user_name,
                loan.items.len(),
                window
            ),
            Some(id.clone()),
        );
        self.reload_loan(&id)
    }

    /// 审批通过借用
    ///
    /// 全有或全无: 按窗口重算每项器材已承诺量 (排除自身),
    /// 任一行超出可用量则整单回滚
    pub fn approve_loan(&self, id: &str, actor: &ActorContext) -> RepositoryResult<EquipmentLoan> {
        let admin_id = require_admin(actor)?;
        let now = now_local();

        let row = {
            let mut conn = self.lock()?;
            let tx = conn.transaction()?;
            let row = guard::load_loan_tx(&tx, id)?;
            HoldLifecycle::assert_transition(
                HoldKind::EquipmentLoan,
                row.status,
                HoldStatus::Approved,
            )?;
            let lines = guard::load_loan_lines_tx(&tx, id)?;
            for line in &lines {
                let available = if line.active {
                    let committed =
                        guard::committed_equipment_tx(&tx, line.equipment_id, row.window, id)?;
                    (line.total_quantity - committed).max(0)
                } else {
                    0
                };
                if line.quantity > available {
                    return Err(RepositoryError::CapacityExceeded {
                        resource: line.equipment_name.clone(),
                        requested: line.quantity,
                        available,
                    });
                }
            }
            guard::decide_loan_tx(&tx, id, HoldStatus::Approved, admin_id, None, now)?;
            tx.commit()?;
            row
        };
        tracing::info!("借用审批通过: id={}, user={}", id, row.user_name);

        self.record_log(
            ActionLog::new(ActionType::ApproveLoan, Some(actor.actor_id.clone()))
                .with_loan(id)
                .with_details(format!("审批通过: {} {}", row.user_name, row.window)),
        );
        self.notify_requester(
            NotificationKind::LoanApproved,
            row.channel_user_id.as_deref(),
            format!("您的器材借用已通过, 借用期 {}", row.window),
            Some(id.to_string()),
        );
        self.reload_loan(id)
    }

    /// 驳回借用
    pub fn reject_loan(
        &self,
        id: &str,
        reason: Option<&str>,
        actor: &ActorContext,
    ) -> RepositoryResult<EquipmentLoan> {
        let admin_id = require_admin(actor)?;
        let now = now_local();

        let row = {
            let mut conn = self.lock()?;
            let tx = conn.transaction()?;
            let row = guard::load_loan_tx(&tx, id)?;
            HoldLifecycle::assert_transition(
                HoldKind::EquipmentLoan,
                row.status,
                HoldStatus::Rejected,
            )?;
            guard::decide_loan_tx(&tx, id, HoldStatus::Rejected, admin_id, reason, now)?;
            tx.commit()?;
            row
        };

        self.record_log(
            ActionLog::new(ActionType::RejectLoan, Some(actor.actor_id.clone()))
                .with_loan(id)
                .with_details(format!("驳回: {}", reason.unwrap_or("未注明原因"))),
        );
        let text = match reason {
            Some(r) => format!("很抱歉, 您的器材借用未通过审核 ({})", r),
            None => "很抱歉, 您的器材借用未通过审核".to_string(),
        };
        self.notify_requester(
            NotificationKind::LoanRejected,
            row.channel_user_id.as_deref(),
            text,
            Some(id.to_string()),
        );
        self.reload_loan(id)
    }

    /// 取消借用
    ///
    /// 待审核与已批准的单均可取消, 预占的器材数量随之释放;
    /// 已取走的单只能走归还流程. 申请人限本人的单, 管理员不受归属限制
    pub fn cancel_loan(&self, id: &str, actor: &ActorContext) -> RepositoryResult<EquipmentLoan> {
        let row = {
            let mut conn = self.lock()?;
            let tx = conn.transaction()?;
            let row = guard::load_loan_tx(&tx, id)?;
            if !actor.is_admin()
                && (row.channel_user_id.is_none()
                    || actor.channel_user_id != row.channel_user_id)
            {
                return Err(RepositoryError::Unauthorized(
                    "只能取消本人的借用申请".to_string(),
                ));
            }
            HoldLifecycle::assert_transition(
                HoldKind::EquipmentLoan,
                row.status,
                HoldStatus::Cancelled,
            )?;
            guard::set_loan_status_tx(&tx, id, HoldStatus::Cancelled)?;
            tx.commit()?;
            row
        };

        self.record_log(
            ActionLog::new(ActionType::CancelLoan, Some(actor.actor_id.clone()))
                .with_loan(id)
                .with_details(format!("取消借用: {}", row.user_name)),
        );
        self.reload_loan(id)
    }

    /// 登记取走器材
    pub fn mark_borrowed(&self, id: &str, actor: &ActorContext) -> RepositoryResult<EquipmentLoan> {
        require_admin(actor)?;

        let row = {
            let mut conn = self.lock()?;
            let tx = conn.transaction()?;
            let row = guard::load_loan_tx(&tx, id)?;
            HoldLifecycle::assert_transition(
                HoldKind::EquipmentLoan,
                row.status,
                HoldStatus::Borrowed,
            )?;
            guard::set_loan_status_tx(&tx, id, HoldStatus::Borrowed)?;
            tx.commit()?;
            row
        };

        self.record_log(
            ActionLog::new(ActionType::MarkBorrowed, Some(actor.actor_id.clone()))
                .with_loan(id)
                .with_details(format!("器材已取走: {}", row.user_name)),
        );
        self.reload_loan(id)
    }

    /// 归还登记
    ///
    /// `returns` 为 None 时按全额归还处理; 提供明细时按行累加本次归还量,
    /// 未还清的单保持 borrowed/overdue, 全部还清后置 returned 并记实际归还日
    pub fn mark_returned(
        &self,
        id: &str,
        returns: Option<&[LineReturn]>,
        actor: &ActorContext,
    ) -> RepositoryResult<EquipmentLoan> {
        require_admin(actor)?;
        let today = Local::now().date_naive();

        let (row, closed) = {
            let mut conn = self.lock()?;
            let tx = conn.transaction()?;
            let row = guard::load_loan_tx(&tx, id)?;
            if !matches!(row.status, HoldStatus::Borrowed | HoldStatus::Overdue) {
                return Err(RepositoryError::InvalidStateTransition {
                    from: row.status.to_string(),
                    to: HoldStatus::Returned.to_string(),
                });
            }
            let lines = guard::load_loan_lines_tx(&tx, id)?;
            match returns {
                None => {
                    for line in &lines {
                        if line.returned_quantity < line.quantity {
                            guard::update_loan_line_returned_tx(&tx, line.line_id, line.quantity)?;
                        }
                    }
                }
                Some(entries) => {
                    if entries.is_empty() {
                        return Err(RepositoryError::ValidationError(
                            "归还明细不能为空".to_string(),
                        ));
                    }
                    let mut seen = HashSet::new();
                    for entry in entries {
                        if entry.quantity <= 0 {
                            return Err(RepositoryError::ValidationError(
                                "归还数量必须为正".to_string(),
                            ));
                        }
                        if !seen.insert(entry.equipment_id) {
                            return Err(RepositoryError::ValidationError(
                                "同一器材不能重复填写".to_string(),
                            ));
                        }
                        let line = lines
                            .iter()
                            .find(|l| l.equipment_id == entry.equipment_id)
                            .ok_or_else(|| {
                                RepositoryError::ValidationError(format!(
                                    "借用单中不存在该器材: {}",
                                    entry.equipment_id
                                ))
                            })?;
                        let new_returned = line.returned_quantity + entry.quantity;
                        if new_returned > line.quantity {
                            return Err(RepositoryError::ValidationError(format!(
                                "归还数量超过借出数量: {}",
                                line.equipment_name
                            )));
                        }
                        guard::update_loan_line_returned_tx(&tx, line.line_id, new_returned)?;
                    }
                }
            }

            let after = guard::load_loan_lines_tx(&tx, id)?;
            let closed = after.iter().all(|l| l.returned_quantity >= l.quantity);
            if closed {
                guard::close_loan_returned_tx(&tx, id, today)?;
            }
            tx.commit()?;
            (row, closed)
        };
        tracing::info!("归还登记: id={}, closed={}", id, closed);

        self.record_log(
            ActionLog::new(ActionType::MarkReturned, Some(actor.actor_id.clone()))
                .with_loan(id)
                .with_details(if closed {
                    format!("全部归还: {}", row.user_name)
                } else {
                    format!("部分归还: {}", row.user_name)
                }),
        );
        self.reload_loan(id)
    }

    fn reload_loan(&self, id: &str) -> RepositoryResult<EquipmentLoan> {
        self.repos
            .loan_repo
            .find_by_id(id)?
            .ok_or_else(|| RepositoryError::NotFound {
                entity: "借用单".to_string(),
                id: id.to_string(),
            })
    }
}
