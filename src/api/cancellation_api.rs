// ==========================================
// 渔场设施预定与物资管理系统 - 取消申请 API
// ==========================================
// 职责: 预定取消申请的提交与裁决封装
// 红线: 批准裁决与底层预定置 cancelled 必须同一事务 (审批服务保证)
// ==========================================

use std::sync::Arc;

use crate::api::error::{ApiError, ApiResult};
use crate::domain::actor::ActorContext;
use crate::domain::cancellation::CancellationRequest;
use crate::domain::types::HoldStatus;
use crate::engine::repositories::ResourceRepositories;
use crate::services::approval_service::ApprovalService;

// ==========================================
// CancellationApi - 取消申请
// ==========================================
pub struct CancellationApi {
    repos: ResourceRepositories,
    approvals: Arc<ApprovalService>,
}

impl CancellationApi {
    pub fn new(repos: ResourceRepositories, approvals: Arc<ApprovalService>) -> Self {
        Self { repos, approvals }
    }

    /// 对待审核或已批准的预定提交取消申请
    pub fn submit(
        &self,
        reservation_id: &str,
        reason: Option<&str>,
        phone: Option<&str>,
        actor: &ActorContext,
    ) -> ApiResult<CancellationRequest> {
        Ok(self
            .approvals
            .submit_cancellation(reservation_id, reason, phone, actor)?)
    }

    /// 批准取消申请, 底层预定同事务置 cancelled
    pub fn approve(&self, id: &str, actor: &ActorContext) -> ApiResult<CancellationRequest> {
        Ok(self.approvals.approve_cancellation(id, actor)?)
    }

    /// 驳回取消申请, 底层预定保持原状态
    pub fn reject(&self, id: &str, actor: &ActorContext) -> ApiResult<CancellationRequest> {
        Ok(self.approvals.reject_cancellation(id, actor)?)
    }

    pub fn get(&self, id: &str) -> ApiResult<CancellationRequest> {
        self.repos
            .cancellation_repo
            .find_by_id(id)?
            .ok_or_else(|| ApiError::NotFound(format!("取消申请(id={})不存在", id)))
    }

    pub fn list(&self, status: Option<HoldStatus>) -> ApiResult<Vec<CancellationRequest>> {
        let rows = match status {
            Some(status) => self.repos.cancellation_repo.find_by_status(status)?,
            None => self.repos.cancellation_repo.find_all()?,
        };
        Ok(rows)
    }

    /// 某预定名下的待处理取消申请
    pub fn pending_for_reservation(
        &self,
        reservation_id: &str,
    ) -> ApiResult<Option<CancellationRequest>> {
        Ok(self
            .repos
            .cancellation_repo
            .find_pending_by_reservation(reservation_id)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{configure_sqlite_connection, init_db_schema};
    use crate::domain::pond::ReservationDraft;
    use crate::domain::types::PondSizeClass;
    use crate::engine::events::OptionalNotificationSink;
    use chrono::NaiveDate;
    use rusqlite::Connection;
    use std::sync::{Arc, Mutex};

    struct Fixture {
        api: CancellationApi,
        approvals: Arc<ApprovalService>,
        repos: ResourceRepositories,
        admin_id: i64,
        pond_id: i64,
    }

    fn setup() -> Fixture {
        let conn = Connection::open_in_memory().unwrap();
        configure_sqlite_connection(&conn).unwrap();
        init_db_schema(&conn).unwrap();
        let conn = Arc::new(Mutex::new(conn));
        let repos = ResourceRepositories::from_conn(conn.clone());
        let approvals = Arc::new(ApprovalService::new(
            conn,
            repos.clone(),
            OptionalNotificationSink::none(),
        ));
        let api = CancellationApi::new(repos.clone(), approvals.clone());
        let admin_id = repos
            .admin_repo
            .insert("admin", "hash", "管理员", "admin")
            .unwrap();
        let pond_id = repos
            .pond_repo
            .insert("A1", "A", None, PondSizeClass::Medium)
            .unwrap();
        Fixture {
            api,
            approvals,
            repos,
            admin_id,
            pond_id,
        }
    }

    fn d(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    fn approved_reservation(fx: &Fixture) -> String {
        let r = fx
            .approvals
            .submit_reservation(ReservationDraft {
                pond_id: fx.pond_id,
                user_name: "张三".to_string(),
                fish_type: None,
                fish_quantity: None,
                phone: Some("13800000000".to_string()),
                channel_user_id: Some("U-张三".to_string()),
                start_date: d("2025-03-01"),
                end_date: d("2025-09-01"),
            })
            .unwrap();
        fx.approvals
            .approve_reservation(&r.id, &ActorContext::admin(fx.admin_id))
            .unwrap();
        r.id
    }

    #[test]
    fn test_approve_cancels_underlying_reservation() {
        let fx = setup();
        let admin = ActorContext::admin(fx.admin_id);
        let reservation_id = approved_reservation(&fx);

        let cr = fx
            .api
            .submit(
                &reservation_id,
                Some("转售鱼苗, 不再承包"),
                Some("13800000000"),
                &ActorContext::requester("U-张三"),
            )
            .unwrap();
        assert_eq!(cr.status, HoldStatus::Pending);
        assert!(fx
            .api
            .pending_for_reservation(&reservation_id)
            .unwrap()
            .is_some());

        let decided = fx.api.approve(&cr.id, &admin).unwrap();
        assert_eq!(decided.status, HoldStatus::Approved);
        let reservation = fx
            .repos
            .reservation_repo
            .find_by_id(&reservation_id)
            .unwrap()
            .unwrap();
        assert_eq!(reservation.status, HoldStatus::Cancelled);
        assert!(fx
            .api
            .pending_for_reservation(&reservation_id)
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_duplicate_pending_request_rejected() {
        let fx = setup();
        let requester = ActorContext::requester("U-张三");
        let reservation_id = approved_reservation(&fx);

        fx.api
            .submit(&reservation_id, None, None, &requester)
            .unwrap();
        let err = fx
            .api
            .submit(&reservation_id, None, None, &requester)
            .unwrap_err();
        assert!(matches!(err, ApiError::BusinessRuleViolation(_)));
    }

    #[test]
    fn test_reject_keeps_reservation_untouched() {
        let fx = setup();
        let admin = ActorContext::admin(fx.admin_id);
        let reservation_id = approved_reservation(&fx);

        let cr = fx
            .api
            .submit(&reservation_id, None, None, &ActorContext::requester("U-张三"))
            .unwrap();
        let decided = fx.api.reject(&cr.id, &admin).unwrap();
        assert_eq!(decided.status, HoldStatus::Rejected);

        let reservation = fx
            .repos
            .reservation_repo
            .find_by_id(&reservation_id)
            .unwrap()
            .unwrap();
        assert_eq!(reservation.status, HoldStatus::Approved);

        assert_eq!(fx.api.list(Some(HoldStatus::Rejected)).unwrap().len(), 1);
        assert_eq!(fx.api.list(None).unwrap().len(), 1);
    }
}
