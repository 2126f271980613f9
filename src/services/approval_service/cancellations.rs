// ==========================================
// 取消申请的提交与裁决
// ==========================================
// 取消申请挂在已批准的鱼池预定上:
// 批准取消时, 申请与底层预定单在同一事务内各自迁移

use super::*;

impl ApprovalService {
    /// 对待审核或已批准的预定提交取消申请
    ///
    /// 留联系电话供管理员人工核实;
    /// 同一预定同时只允许一张待处理的取消申请
    pub fn submit_cancellation(
        &self,
        reservation_id: &str,
        reason: Option<&str>,
        phone: Option<&str>,
        actor: &ActorContext,
    ) -> RepositoryResult<CancellationRequest> {
        let reservation = self
            .repos
            .reservation_repo
            .find_by_id(reservation_id)?
            .ok_or_else(|| RepositoryError::NotFound {
                entity: "预定单".to_string(),
                id: reservation_id.to_string(),
            })?;

        if !actor.is_admin() {
            if reservation.channel_user_id.is_none()
                || actor.channel_user_id != reservation.channel_user_id
            {
                return Err(RepositoryError::Unauthorized(
                    "只能对本人的预定申请取消".to_string(),
                ));
            }
        }
        if !matches!(
            reservation.status,
            HoldStatus::Pending | HoldStatus::Approved
        ) {
            return Err(RepositoryError::BusinessRuleViolation(
                "该预定当前状态不支持申请取消".to_string(),
            ));
        }
        if self
            .repos
            .cancellation_repo
            .find_pending_by_reservation(reservation_id)?
            .is_some()
        {
            return Err(RepositoryError::BusinessRuleViolation(
                "该预定已有待处理的取消申请".to_string(),
            ));
        }

        let request = CancellationRequest {
            id: Uuid::new_v4().to_string(),
            reservation_id: reservation_id.to_string(),
            reason: reason.map(str::to_string),
            phone: phone.map(str::to_string),
            status: HoldStatus::Pending,
            decided_by: None,
            decided_at: None,
            created_at: now_local(),
            pond_code: None,
            reservation_user_name: None,
        };
        let id = self.repos.cancellation_repo.insert(&request)?;
        tracing::info!("取消申请提交: id={}, reservation={}", id, reservation_id);

        self.record_log(
            ActionLog::new(
                ActionType::SubmitCancellation,
                reservation.channel_user_id.clone(),
            )
            .with_reservation(reservation_id)
            .with_details(format!(
                "{} 申请取消预定 ({})",
                reservation.user_name,
                reason.unwrap_or("未注明原因")
            )),
        );
        self.notify_admins(
            NotificationKind::CancellationSubmitted,
            format!(
                "新的取消申请: {} 的预定 {}",
                reservation.user_name,
                reservation.pond_code.as_deref().unwrap_or("?")
            ),
            Some(id.clone()),
        );
        self.reload_cancellation(&id)
    }

    /// 批准取消申请
    ///
    /// 申请置 approved 且底层预定置 cancelled, 两笔写入同一事务
    pub fn approve_cancellation(
        &self,
        id: &str,
        actor: &ActorContext,
    ) -> RepositoryResult<CancellationRequest> {
        let admin_id = require_admin(actor)?;
        let now = now_local();

        let (row, reservation) = {
            let mut conn = self.lock()?;
            let tx = conn.transaction()?;
            let row = guard::load_cancellation_tx(&tx, id)?;
            HoldLifecycle::assert_transition(
                HoldKind::CancellationRequest,
                row.status,
                HoldStatus::Approved,
            )?;
            let reservation = guard::load_reservation_tx(&tx, &row.reservation_id)?;
            HoldLifecycle::assert_transition(
                HoldKind::PondReservation,
                reservation.status,
                HoldStatus::Cancelled,
            )?;
            guard::decide_cancellation_tx(&tx, id, HoldStatus::Approved, admin_id, now)?;
            guard::set_reservation_status_tx(&tx, &row.reservation_id, HoldStatus::Cancelled)?;
            tx.commit()?;
            (row, reservation)
        };
        tracing::info!(
            "取消申请批准: id={}, reservation={}",
            id,
            row.reservation_id
        );

        self.record_log(
            ActionLog::new(ActionType::ApproveCancellation, Some(actor.actor_id.clone()))
                .with_pond(reservation.pond_id)
                .with_reservation(&row.reservation_id)
                .with_details(format!(
                    "批准取消: {} {}",
                    reservation.pond_code, reservation.window
                )),
        );
        self.notify_requester(
            NotificationKind::CancellationDecided,
            reservation.channel_user_id.as_deref(),
            format!(
                "您的取消申请已通过, 预定 {} {} 已取消",
                reservation.pond_code, reservation.window
            ),
            Some(id.to_string()),
        );
        self.reload_cancellation(id)
    }

    /// 驳回取消申请, 底层预定保持原状态
    pub fn reject_cancellation(
        &self,
        id: &str,
        actor: &ActorContext,
    ) -> RepositoryResult<CancellationRequest> {
        let admin_id = require_admin(actor)?;
        let now = now_local();

        let (row, reservation) = {
            let mut conn = self.lock()?;
            let tx = conn.transaction()?;
            let row = guard::load_cancellation_tx(&tx, id)?;
            HoldLifecycle::assert_transition(
                HoldKind::CancellationRequest,
                row.status,
                HoldStatus::Rejected,
            )?;
            let reservation = guard::load_reservation_tx(&tx, &row.reservation_id)?;
            guard::decide_cancellation_tx(&tx, id, HoldStatus::Rejected, admin_id, now)?;
            tx.commit()?;
            (row, reservation)
        };

        self.record_log(
            ActionLog::new(ActionType::RejectCancellation, Some(actor.actor_id.clone()))
                .with_reservation(&row.reservation_id)
                .with_details(format!("驳回取消申请: {}", reservation.pond_code)),
        );
        self.notify_requester(
            NotificationKind::CancellationDecided,
            reservation.channel_user_id.as_deref(),
            format!(
                "您的取消申请未通过, 预定 {} {} 保持有效",
                reservation.pond_code, reservation.window
            ),
            Some(id.to_string()),
        );
        self.reload_cancellation(id)
    }

    fn reload_cancellation(&self, id: &str) -> RepositoryResult<CancellationRequest> {
        self.repos
            .cancellation_repo
            .find_by_id(id)?
            .ok_or_else(|| RepositoryError::NotFound {
                entity: "取消申请".to_string(),
                id: id.to_string(),
            })
    }
}
