// ==========================================
// 鱼池预定的提交与状态迁移
// ==========================================

use super::*;

impl ApprovalService {
    /// 提交鱼池预定
    ///
    /// 提交侧只拦截确定无望的申请 (鱼池检修中或与已批准单重叠),
    /// 与其他 pending 单重叠的提交予以放行, 由审批护栏裁决
    pub fn submit_reservation(&self, draft: ReservationDraft) -> RepositoryResult<PondReservation> {
        let user_name = draft.user_name.trim();
        if user_name.is_empty() {
            return Err(RepositoryError::ValidationError(
                "申请人姓名不能为空".to_string(),
            ));
        }
        let window = DateWindow::new(draft.start_date, draft.end_date).ok_or_else(|| {
            RepositoryError::ValidationError("结束日期不能早于开始日期".to_string())
        })?;
        if let Some(q) = draft.fish_quantity {
            if q <= 0 {
                return Err(RepositoryError::ValidationError(
                    "投苗数量必须为正".to_string(),
                ));
            }
        }

        let pond = self
            .repos
            .pond_repo
            .find_by_id(draft.pond_id)?
            .ok_or_else(|| RepositoryError::NotFound {
                entity: "鱼池".to_string(),
                id: draft.pond_id.to_string(),
            })?;
        if pond.status == PondStatus::Maintenance {
            return Err(RepositoryError::CapacityExceeded {
                resource: pond.pond_code,
                requested: 1,
                available: 0,
            });
        }
        let conflicts =
            self.repos
                .reservation_repo
                .find_approved_overlapping(draft.pond_id, window, None)?;
        if !conflicts.is_empty() {
            return Err(RepositoryError::CapacityExceeded {
                resource: pond.pond_code,
                requested: 1,
                available: 0,
            });
        }

        let reservation = PondReservation {
            id: Uuid::new_v4().to_string(),
            pond_id: draft.pond_id,
            pond_code: Some(pond.pond_code.clone()),
            user_name: user_name.to_string(),
            fish_type: draft.fish_type,
            fish_quantity: draft.fish_quantity,
            phone: draft.phone,
            channel_user_id: draft.channel_user_id,
            start_date: window.start,
            end_date: window.end,
            status: HoldStatus::Pending,
            reject_reason: None,
            decided_by: None,
            decided_at: None,
            created_at: now_local(),
        };
        let id = self.repos.reservation_repo.insert(&reservation)?;
        tracing::info!(
            "预定提交: id={}, pond={}, window={}",
            id,
            pond.pond_code,
            window
        );

        self.record_log(
            ActionLog::new(
                ActionType::SubmitReservation,
                reservation.channel_user_id.clone(),
            )
            .with_pond(reservation.pond_id)
            .with_reservation(&id)
            .with_details(format!(
                "{} 预定 {} {}",
                reservation.user_name, pond.pond_code, window
            )),
        );
        self.notify_admins(
            NotificationKind::ReservationSubmitted,
            format!(
                "新的鱼池预定申请: {} 预定 {} {}",
                reservation.user_name, pond.pond_code, window
            ),
            Some(id),
        );
        Ok(reservation)
    }

    /// 审批通过预定
    ///
    /// 护栏与状态写入在同一事务内: 重查同池已批准单 (排除自身) 与鱼池检修状态
    pub fn approve_reservation(
        &self,
        id: &str,
        actor: &ActorContext,
    ) -> RepositoryResult<PondReservation> {
        let admin_id = require_admin(actor)?;
        let now = now_local();

        let row = {
            let mut conn = self.lock()?;
            let tx = conn.transaction()?;
            let row = guard::load_reservation_tx(&tx, id)?;
            HoldLifecycle::assert_transition(
                HoldKind::PondReservation,
                row.status,
                HoldStatus::Approved,
            )?;
            if row.pond_status == PondStatus::Maintenance {
                return Err(RepositoryError::CapacityExceeded {
                    resource: row.pond_code,
                    requested: 1,
                    available: 0,
                });
            }
            if guard::approved_overlap_exists_tx(&tx, row.pond_id, row.window, id)? {
                return Err(RepositoryError::CapacityExceeded {
                    resource: row.pond_code,
                    requested: 1,
                    available: 0,
                });
            }
            guard::decide_reservation_tx(&tx, id, HoldStatus::Approved, admin_id, None, now)?;
            tx.commit()?;
            row
        };
        tracing::info!("预定审批通过: id={}, pond={}", id, row.pond_code);

        self.record_log(
            ActionLog::new(ActionType::ApproveReservation, Some(actor.actor_id.clone()))
                .with_pond(row.pond_id)
                .with_reservation(id)
                .with_details(format!(
                    "审批通过: {} {} {}",
                    row.user_name, row.pond_code, row.window
                )),
        );
        self.notify_requester(
            NotificationKind::ReservationApproved,
            row.channel_user_id.as_deref(),
            format!("您的鱼池预定已通过: {} {}", row.pond_code, row.window),
            Some(id.to_string()),
        );
        self.reload_reservation(id)
    }

    /// 驳回预定
    pub fn reject_reservation(
        &self,
        id: &str,
        reason: Option<&str>,
        actor: &ActorContext,
    ) -> RepositoryResult<PondReservation> {
        let admin_id = require_admin(actor)?;
        let now = now_local();

        let row = {
            let mut conn = self.lock()?;
            let tx = conn.transaction()?;
            let row = guard::load_reservation_tx(&tx, id)?;
            HoldLifecycle::assert_transition(
                HoldKind::PondReservation,
                row.status,
                HoldStatus::Rejected,
            )?;
            guard::decide_reservation_tx(&tx, id, HoldStatus::Rejected, admin_id, reason, now)?;
            tx.commit()?;
            row
        };

        self.record_log(
            ActionLog::new(ActionType::RejectReservation, Some(actor.actor_id.clone()))
                .with_pond(row.pond_id)
                .with_reservation(id)
                .with_details(format!(
                    "驳回: {} ({})",
                    row.pond_code,
                    reason.unwrap_or("未注明原因")
                )),
        );
        let text = match reason {
            Some(r) => format!(
                "很抱歉, 您的鱼池预定未通过审核: {} ({})",
                row.pond_code, r
            ),
            None => format!("很抱歉, 您的鱼池预定未通过审核: {}", row.pond_code),
        };
        self.notify_requester(
            NotificationKind::ReservationRejected,
            row.channel_user_id.as_deref(),
            text,
            Some(id.to_string()),
        );
        self.reload_reservation(id)
    }

    /// 取消预定
    ///
    /// 待审核与已批准的单均可取消, 占用的时段随之释放;
    /// 申请人仅可取消本人的单 (渠道身份核对), 管理员不受归属限制
    pub fn cancel_reservation(
        &self,
        id: &str,
        actor: &ActorContext,
    ) -> RepositoryResult<PondReservation> {
        let row = {
            let mut conn = self.lock()?;
            let tx = conn.transaction()?;
            let row = guard::load_reservation_tx(&tx, id)?;
            if !actor.is_admin()
                && (row.channel_user_id.is_none()
                    || actor.channel_user_id != row.channel_user_id)
            {
                return Err(RepositoryError::Unauthorized(
                    "只能取消本人的预定".to_string(),
                ));
            }
            HoldLifecycle::assert_transition(
                HoldKind::PondReservation,
                row.status,
                HoldStatus::Cancelled,
            )?;
            guard::set_reservation_status_tx(&tx, id, HoldStatus::Cancelled)?;
            tx.commit()?;
            row
        };

        self.record_log(
            ActionLog::new(ActionType::CancelReservation, Some(actor.actor_id.clone()))
                .with_pond(row.pond_id)
                .with_reservation(id)
                .with_details(format!("取消预定: {} {}", row.pond_code, row.window)),
        );
        self.reload_reservation(id)
    }

    /// 结单 (使用窗口结束后由到期巡检自动调用, 也可手工触发)
    pub fn complete_reservation(
        &self,
        id: &str,
        actor: &ActorContext,
    ) -> RepositoryResult<PondReservation> {
        require_admin(actor)?;

        let row = {
            let mut conn = self.lock()?;
            let tx = conn.transaction()?;
            let row = guard::load_reservation_tx(&tx, id)?;
            HoldLifecycle::assert_transition(
                HoldKind::PondReservation,
                row.status,
                HoldStatus::Completed,
            )?;
            guard::set_reservation_status_tx(&tx, id, HoldStatus::Completed)?;
            tx.commit()?;
            row
        };

        self.record_log(
            ActionLog::new(ActionType::CompleteReservation, Some(actor.actor_id.clone()))
                .with_pond(row.pond_id)
                .with_reservation(id)
                .with_details(format!("预定结单: {}", row.pond_code)),
        );
        self.reload_reservation(id)
    }

    fn reload_reservation(&self, id: &str) -> RepositoryResult<PondReservation> {
        self.repos
            .reservation_repo
            .find_by_id(id)?
            .ok_or_else(|| RepositoryError::NotFound {
                entity: "预定单".to_string(),
                id: id.to_string(),
            })
    }
}
