// ==========================================
// 物资领用的提交与状态迁移
// ==========================================
// 物资是消耗性资源: 审批即出库, 扣减与状态迁移同事务;
// approved 是终态, 不存在归还

use super::*;
use crate::domain::stock::RequisitionLine;
use crate::domain::types::CatalogStatus;
use std::collections::HashSet;

impl ApprovalService {
    /// 提交物资领用申请
    ///
    /// 提交侧不校验库存余额: 审批前库存随时可能变化,
    /// 不足与否在审批事务内裁决
    pub fn submit_requisition(
        &self,
        draft: RequisitionDraft,
    ) -> RepositoryResult<StockRequisition> {
        let user_name = draft.user_name.trim();
        if user_name.is_empty() {
            return Err(RepositoryError::ValidationError(
                "申请人姓名不能为空".to_string(),
            ));
        }
        if draft.items.is_empty() {
            return Err(RepositoryError::ValidationError(
                "至少需要一条领用明细".to_string(),
            ));
        }
        let mut seen = HashSet::new();
        for line in &draft.items {
            if line.requested_quantity <= 0 {
                return Err(RepositoryError::ValidationError(
                    "领用数量必须为正".to_string(),
                ));
            }
            if !seen.insert(line.item_id) {
                return Err(RepositoryError::ValidationError(
                    "同一物资不能重复填写".to_string(),
                ));
            }
        }

        let mut lines = Vec::with_capacity(draft.items.len());
        for line in &draft.items {
            let item = self
                .repos
                .stock_repo
                .find_item_by_id(line.item_id)?
                .ok_or_else(|| RepositoryError::NotFound {
                    entity: "物资".to_string(),
                    id: line.item_id.to_string(),
                })?;
            if item.status != CatalogStatus::Active {
                return Err(RepositoryError::BusinessRuleViolation(format!(
                    "物资已停用: {}",
                    item.name
                )));
            }
            lines.push(RequisitionLine {
                id: 0,
                requisition_id: String::new(),
                item_id: line.item_id,
                item_name: Some(item.name),
                unit: Some(item.unit),
                requested_quantity: line.requested_quantity,
                approved_quantity: None,
            });
        }

        let requisition = StockRequisition {
            id: Uuid::new_v4().to_string(),
            user_name: user_name.to_string(),
            channel_user_id: draft.channel_user_id,
            phone: draft.phone,
            purpose: draft.purpose,
            status: HoldStatus::Pending,
            reject_reason: None,
            decided_by: None,
            decided_at: None,
            created_at: now_local(),
            items: lines,
        };
        let id = self.repos.requisition_repo.insert(&requisition)?;
        tracing::info!(
            "领用提交: id={}, user={}, lines={}",
            id,
            requisition.user_name,
            requisition.items.len()
        );

        self.record_log(
            ActionLog::new(
                ActionType::SubmitRequisition,
                requisition.channel_user_id.clone(),
            )
            .with_requisition(&id)
            .with_details(format!(
                "{} 领用 {} 项物资",
                requisition.user_name,
                requisition.items.len()
            )),
        );
        self.notify_admins(
            NotificationKind::RequisitionSubmitted,
            format!(
                "新的物资领用申请: {} 共 {} 项",
                requisition.user_name,
                requisition.items.len()
            ),
            Some(id.clone()),
        );
        self.reload_requisition(&id)
    }

    /// 审批通过领用并出库
    ///
    /// 全有或全无: 每行按裁定量在同一事务内走台账出库,
    /// 任一行余额不足则整单回滚, 申请保持 pending。
    /// `overrides` 可按行下调裁定量, 不允许超过申请量
    pub fn approve_requisition(
        &self,
        id: &str,
        overrides: Option<&[LineApproval]>,
        actor: &ActorContext,
    ) -> RepositoryResult<StockRequisition> {
        let admin_id = require_admin(actor)?;
        let now = now_local();

        let (row, posted) = {
            let mut conn = self.lock()?;
            let tx = conn.transaction()?;
            let row = guard::load_requisition_tx(&tx, id)?;
            HoldLifecycle::assert_transition(
                HoldKind::StockRequisition,
                row.status,
                HoldStatus::Approved,
            )?;
            let lines = guard::load_requisition_lines_tx(&tx, id)?;
            if let Some(overrides) = overrides {
                for o in overrides {
                    if !lines.iter().any(|l| l.item_id == o.item_id) {
                        return Err(RepositoryError::ValidationError(format!(
                            "申请单中不存在该物资: {}",
                            o.item_id
                        )));
                    }
                }
            }

            let mut posted = Vec::new();
            for line in &lines {
                let approved = overrides
                    .and_then(|os| os.iter().find(|o| o.item_id == line.item_id))
                    .map(|o| o.approved_quantity)
                    .unwrap_or(line.requested_quantity);
                if approved < 0 {
                    return Err(RepositoryError::ValidationError(format!(
                        "裁定数量不能为负: {}",
                        line.item_name
                    )));
                }
                if approved > line.requested_quantity {
                    return Err(RepositoryError::ValidationError(format!(
                        "裁定数量不能超过申请数量: {}",
                        line.item_name
                    )));
                }
                if approved > 0 {
                    let meta = LedgerMeta {
                        note: Some(format!("物资领用: {}", row.user_name)),
                        reference_no: Some(id.to_string()),
                        created_by: Some(admin_id),
                    };
                    let entry = apply_ledger_op_tx(
                        &tx,
                        line.item_id,
                        &LedgerOp::Out { quantity: approved },
                        &meta,
                        now,
                    )?;
                    if let Some(entry) = entry {
                        posted.push(entry);
                    }
                }
                guard::update_requisition_line_approved_tx(&tx, line.line_id, approved)?;
            }
            guard::decide_requisition_tx(&tx, id, HoldStatus::Approved, admin_id, None, now)?;
            tx.commit()?;
            (row, posted)
        };
        tracing::info!("领用审批通过: id={}, 出库 {} 笔", id, posted.len());

        for p in &posted {
            self.record_log(
                ActionLog::new(ActionType::StockOut, Some(actor.actor_id.clone()))
                    .with_item(p.entry.item_id)
                    .with_requisition(id)
                    .with_details(format!(
                        "领用出库: {} 数量{} 余额{}",
                        p.entry.item_name.as_deref().unwrap_or("?"),
                        p.entry.quantity,
                        p.balance_after
                    )),
            );
            if p.low_stock {
                self.notify_admins(
                    NotificationKind::LowStockAlert,
                    format!(
                        "物资低库存预警: {} 余额仅剩 {}",
                        p.entry.item_name.as_deref().unwrap_or("?"),
                        p.balance_after
                    ),
                    Some(p.entry.id.clone()),
                );
            }
        }
        self.record_log(
            ActionLog::new(ActionType::ApproveRequisition, Some(actor.actor_id.clone()))
                .with_requisition(id)
                .with_details(format!("审批通过: {} 出库 {} 笔", row.user_name, posted.len())),
        );
        self.notify_requester(
            NotificationKind::RequisitionApproved,
            row.channel_user_id.as_deref(),
            "您的物资领用已通过, 请到仓库领取".to_string(),
            Some(id.to_string()),
        );
        self.reload_requisition(id)
    }

    /// 驳回领用
    pub fn reject_requisition(
        &self,
        id: &str,
        reason: Option<&str>,
        actor: &ActorContext,
    ) -> RepositoryResult<StockRequisition> {
        let admin_id = require_admin(actor)?;
        let now = now_local();

        let row = {
            let mut conn = self.lock()?;
            let tx = conn.transaction()?;
            let row = guard::load_requisition_tx(&tx, id)?;
            HoldLifecycle::assert_transition(
                HoldKind::StockRequisition,
                row.status,
                HoldStatus::Rejected,
            )?;
            guard::decide_requisition_tx(&tx, id, HoldStatus::Rejected, admin_id, reason, now)?;
            tx.commit()?;
            row
        };

        self.record_log(
            ActionLog::new(ActionType::RejectRequisition, Some(actor.actor_id.clone()))
                .with_requisition(id)
                .with_details(format!("驳回: {}", reason.unwrap_or("未注明原因"))),
        );
        let text = match reason {
            Some(r) => format!("很抱歉, 您的物资领用未通过审核 ({})", r),
            None => "很抱歉, 您的物资领用未通过审核".to_string(),
        };
        self.notify_requester(
            NotificationKind::RequisitionRejected,
            row.channel_user_id.as_deref(),
            text,
            Some(id.to_string()),
        );
        self.reload_requisition(id)
    }

    /// 取消领用 (申请人限本人的待审核单)
    pub fn cancel_requisition(
        &self,
        id: &str,
        actor: &ActorContext,
    ) -> RepositoryResult<StockRequisition> {
        let row = {
            let mut conn = self.lock()?;
            let tx = conn.transaction()?;
            let row = guard::load_requisition_tx(&tx, id)?;
            if !actor.is_admin() {
                if row.channel_user_id.is_none()
                    || actor.channel_user_id != row.channel_user_id
                {
                    return Err(RepositoryError::Unauthorized(
                        "只能取消本人的领用申请".to_string(),
                    ));
                }
            }
            HoldLifecycle::assert_transition(
                HoldKind::StockRequisition,
                row.status,
                HoldStatus::Cancelled,
            )?;
            guard::set_requisition_status_tx(&tx, id, HoldStatus::Cancelled)?;
            tx.commit()?;
            row
        };

        self.record_log(
            ActionLog::new(ActionType::CancelRequisition, Some(actor.actor_id.clone()))
                .with_requisition(id)
                .with_details(format!("取消领用: {}", row.user_name)),
        );
        self.reload_requisition(id)
    }

    fn reload_requisition(&self, id: &str) -> RepositoryResult<StockRequisition> {
        self.repos
            .requisition_repo
            .find_by_id(id)?
            .ok_or_else(|| RepositoryError::NotFound {
                entity: "领用申请".to_string(),
                id: id.to_string(),
            })
    }
}
