// ==========================================
// 渔场设施预定与物资管理系统 - 鱼池 API
// ==========================================
// 职责: 鱼池目录维护 + 预定流转的对外封装
// 架构: API 层 -> Services/Engine 层, 本层只做入参校验与错误转换
// ==========================================

use std::sync::Arc;

use crate::api::error::{ApiError, ApiResult};
use crate::domain::action_log::{ActionLog, ActionType};
use crate::domain::actor::ActorContext;
use crate::domain::pond::{Pond, PondReservation, ReservationDraft};
use crate::domain::types::{DateWindow, HoldStatus, PondSizeClass, PondStatus};
use crate::engine::availability::AvailabilityEngine;
use crate::engine::repositories::ResourceRepositories;
use crate::services::approval_service::ApprovalService;
use chrono::NaiveDate;

// ==========================================
// PondApi - 鱼池目录与预定
// ==========================================
pub struct PondApi {
    repos: ResourceRepositories,
    availability: Arc<AvailabilityEngine>,
    approvals: Arc<ApprovalService>,
}

impl PondApi {
    pub fn new(
        repos: ResourceRepositories,
        availability: Arc<AvailabilityEngine>,
        approvals: Arc<ApprovalService>,
    ) -> Self {
        Self {
            repos,
            availability,
            approvals,
        }
    }

    // ==========================================
    // 目录维护 (管理员)
    // ==========================================

    /// 查询全部鱼池
    pub fn list_ponds(&self) -> ApiResult<Vec<Pond>> {
        Ok(self.repos.pond_repo.find_all()?)
    }

    /// 按分区查询鱼池
    pub fn list_ponds_by_zone(&self, zone: &str) -> ApiResult<Vec<Pond>> {
        Ok(self.repos.pond_repo.find_by_zone(zone)?)
    }

    /// 查询单个鱼池
    pub fn get_pond(&self, id: i64) -> ApiResult<Pond> {
        self.repos
            .pond_repo
            .find_by_id(id)?
            .ok_or_else(|| ApiError::NotFound(format!("鱼池(id={})不存在", id)))
    }

    /// 新建鱼池
    ///
    /// # 参数
    /// - `pond_code`: 池号 (如 A1), 全场唯一
    /// - `zone`: 场区分区
    pub fn create_pond(
        &self,
        pond_code: &str,
        zone: &str,
        name: Option<&str>,
        size_class: PondSizeClass,
        actor: &ActorContext,
    ) -> ApiResult<Pond> {
        let admin_id = require_admin(actor)?;
        if pond_code.trim().is_empty() {
            return Err(ApiError::InvalidInput("池号不能为空".to_string()));
        }
        if zone.trim().is_empty() {
            return Err(ApiError::InvalidInput("分区不能为空".to_string()));
        }

        let id = self
            .repos
            .pond_repo
            .insert(pond_code.trim(), zone.trim(), name, size_class)?;
        self.record_log(
            ActionLog::new(ActionType::CatalogChange, Some(admin_id.to_string()))
                .with_pond(id)
                .with_details(format!("新建鱼池: {}", pond_code.trim())),
        );
        self.get_pond(id)
    }

    /// 更新鱼池基础信息
    pub fn update_pond(
        &self,
        id: i64,
        name: Option<&str>,
        size_class: PondSizeClass,
        zone: &str,
        actor: &ActorContext,
    ) -> ApiResult<Pond> {
        let admin_id = require_admin(actor)?;
        if zone.trim().is_empty() {
            return Err(ApiError::InvalidInput("分区不能为空".to_string()));
        }
        let updated = self
            .repos
            .pond_repo
            .update_info(id, name, size_class, zone.trim())?;
        if !updated {
            return Err(ApiError::NotFound(format!("鱼池(id={})不存在", id)));
        }
        self.record_log(
            ActionLog::new(ActionType::CatalogChange, Some(admin_id.to_string()))
                .with_pond(id)
                .with_details("更新鱼池信息".to_string()),
        );
        self.get_pond(id)
    }

    /// 切换鱼池状态 (空闲/占用/维护)
    pub fn set_pond_status(
        &self,
        id: i64,
        status: PondStatus,
        actor: &ActorContext,
    ) -> ApiResult<Pond> {
        let admin_id = require_admin(actor)?;
        let pond = self.get_pond(id)?;
        let updated = self.repos.pond_repo.update_status(id, status)?;
        if !updated {
            return Err(ApiError::NotFound(format!("鱼池(id={})不存在", id)));
        }
        self.record_log(
            ActionLog::new(ActionType::PondStatusChange, Some(admin_id.to_string()))
                .with_pond(id)
                .with_details(format!(
                    "鱼池状态: {} {} -> {}",
                    pond.pond_code, pond.status, status
                )),
        );
        self.get_pond(id)
    }

    /// 删除鱼池
    ///
    /// 仍被未完结预定单引用的鱼池不可删除
    pub fn delete_pond(&self, id: i64, actor: &ActorContext) -> ApiResult<()> {
        let admin_id = require_admin(actor)?;
        let pond = self.get_pond(id)?;
        let active = self.repos.pond_repo.count_active_reservations(id)?;
        if active > 0 {
            return Err(ApiError::BusinessRuleViolation(format!(
                "鱼池 {} 仍有 {} 笔未完结预定, 不能删除",
                pond.pond_code, active
            )));
        }
        let deleted = self.repos.pond_repo.delete(id)?;
        if !deleted {
            return Err(ApiError::NotFound(format!("鱼池(id={})不存在", id)));
        }
        self.record_log(
            ActionLog::new(ActionType::CatalogChange, Some(admin_id.to_string()))
                .with_pond(id)
                .with_details(format!("删除鱼池: {}", pond.pond_code)),
        );
        Ok(())
    }

    // ==========================================
    // 可用量查询
    // ==========================================

    /// 查询鱼池在指定窗口内的可用量 (0 或 1)
    pub fn check_availability(
        &self,
        pond_id: i64,
        start_date: NaiveDate,
        end_date: NaiveDate,
    ) -> ApiResult<i64> {
        let window = DateWindow::new(start_date, end_date)
            .ok_or_else(|| ApiError::InvalidInput("结束日期不能早于开始日期".to_string()))?;
        Ok(self.availability.pond_availability(pond_id, window)?)
    }

    /// 指定日期可预定的鱼池列表
    pub fn list_available_ponds(&self, on_date: NaiveDate) -> ApiResult<Vec<Pond>> {
        Ok(self.availability.available_ponds(on_date)?)
    }

    // ==========================================
    // 预定流转 (委托审批服务)
    // ==========================================

    /// 提交预定申请
    pub fn submit_reservation(&self, draft: ReservationDraft) -> ApiResult<PondReservation> {
        Ok(self.approvals.submit_reservation(draft)?)
    }

    /// 批准预定
    pub fn approve_reservation(
        &self,
        id: &str,
        actor: &ActorContext,
    ) -> ApiResult<PondReservation> {
        Ok(self.approvals.approve_reservation(id, actor)?)
    }

    /// 驳回预定
    pub fn reject_reservation(
        &self,
        id: &str,
        reason: Option<&str>,
        actor: &ActorContext,
    ) -> ApiResult<PondReservation> {
        Ok(self.approvals.reject_reservation(id, reason, actor)?)
    }

    /// 取消预定
    pub fn cancel_reservation(
        &self,
        id: &str,
        actor: &ActorContext,
    ) -> ApiResult<PondReservation> {
        Ok(self.approvals.cancel_reservation(id, actor)?)
    }

    /// 结单
    pub fn complete_reservation(
        &self,
        id: &str,
        actor: &ActorContext,
    ) -> ApiResult<PondReservation> {
        Ok(self.approvals.complete_reservation(id, actor)?)
    }

    // ==========================================
    // 预定查询
    // ==========================================

    /// 查询单笔预定
    pub fn get_reservation(&self, id: &str) -> ApiResult<PondReservation> {
        self.repos
            .reservation_repo
            .find_by_id(id)?
            .ok_or_else(|| ApiError::NotFound(format!("预定单(id={})不存在", id)))
    }

    /// 查询预定列表 (可按状态过滤)
    pub fn list_reservations(
        &self,
        status: Option<HoldStatus>,
    ) -> ApiResult<Vec<PondReservation>> {
        let rows = match status {
            Some(status) => self.repos.reservation_repo.find_by_status(status)?,
            None => self.repos.reservation_repo.find_all()?,
        };
        Ok(rows)
    }

    /// 查询某鱼池的全部预定
    pub fn list_reservations_by_pond(&self, pond_id: i64) -> ApiResult<Vec<PondReservation>> {
        Ok(self.repos.reservation_repo.find_by_pond(pond_id)?)
    }

    /// 查询某渠道用户的预定 (机器人"我的预定")
    pub fn list_reservations_by_user(
        &self,
        channel_user_id: &str,
    ) -> ApiResult<Vec<PondReservation>> {
        Ok(self
            .repos
            .reservation_repo
            .find_by_channel_user(channel_user_id)?)
    }

    /// 查询 N 天内到期的已批准预定
    pub fn list_expiring_reservations(
        &self,
        today: NaiveDate,
        days: i64,
    ) -> ApiResult<Vec<PondReservation>> {
        if days < 0 {
            return Err(ApiError::InvalidInput("天数不能为负".to_string()));
        }
        Ok(self.repos.reservation_repo.find_expiring_within(today, days)?)
    }

    fn record_log(&self, log: ActionLog) {
        if let Err(e) = self.repos.action_log_repo.insert(&log) {
            tracing::warn!("操作日志记录失败: action={}, err={}", log.action_type, e);
        }
    }
}

pub(crate) fn require_admin(actor: &ActorContext) -> ApiResult<i64> {
    actor
        .admin_id()
        .ok_or_else(|| ApiError::Unauthorized("仅管理员可执行该操作".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{configure_sqlite_connection, init_db_schema};
    use crate::engine::events::OptionalNotificationSink;
    use rusqlite::Connection;
    use std::sync::Mutex;

    fn setup() -> (PondApi, ResourceRepositories, i64) {
        let conn = Connection::open_in_memory().unwrap();
        configure_sqlite_connection(&conn).unwrap();
        init_db_schema(&conn).unwrap();
        let conn = Arc::new(Mutex::new(conn));
        let repos = ResourceRepositories::from_conn(conn.clone());
        let availability = Arc::new(AvailabilityEngine::new(repos.clone()));
        let approvals = Arc::new(ApprovalService::new(
            conn,
            repos.clone(),
            OptionalNotificationSink::none(),
        ));
        let api = PondApi::new(repos.clone(), availability, approvals);
        let admin_id = repos
            .admin_repo
            .insert("admin", "hash", "管理员", "admin")
            .unwrap();
        (api, repos, admin_id)
    }

    fn d(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    #[test]
    fn test_catalog_crud_requires_admin() {
        let (api, _repos, admin_id) = setup();
        let admin = ActorContext::admin(admin_id);

        let err = api
            .create_pond("A1", "A", None, PondSizeClass::Small, &ActorContext::requester("U-1"))
            .unwrap_err();
        assert!(matches!(err, ApiError::Unauthorized(_)));

        let pond = api
            .create_pond("A1", "A", Some("一号池"), PondSizeClass::Small, &admin)
            .unwrap();
        assert_eq!(pond.pond_code, "A1");

        // 池号唯一
        let err = api
            .create_pond("A1", "A", None, PondSizeClass::Small, &admin)
            .unwrap_err();
        assert!(matches!(err, ApiError::BusinessRuleViolation(_)));

        let updated = api
            .update_pond(pond.id, Some("改名"), PondSizeClass::Large, "B", &admin)
            .unwrap();
        assert_eq!(updated.name.as_deref(), Some("改名"));
        assert_eq!(updated.zone, "B");

        let flipped = api
            .set_pond_status(pond.id, PondStatus::Maintenance, &admin)
            .unwrap();
        assert_eq!(flipped.status, PondStatus::Maintenance);
    }

    #[test]
    fn test_delete_guard_blocks_while_reservation_active() {
        let (api, _repos, admin_id) = setup();
        let admin = ActorContext::admin(admin_id);
        let pond = api
            .create_pond("A1", "A", None, PondSizeClass::Medium, &admin)
            .unwrap();

        let r = api
            .submit_reservation(ReservationDraft {
                pond_id: pond.id,
                user_name: "张三".to_string(),
                fish_type: None,
                fish_quantity: None,
                phone: None,
                channel_user_id: Some("U-张三".to_string()),
                start_date: d("2025-03-01"),
                end_date: d("2025-03-10"),
            })
            .unwrap();

        let err = api.delete_pond(pond.id, &admin).unwrap_err();
        assert!(matches!(err, ApiError::BusinessRuleViolation(_)));

        // 取消后可删除
        api.cancel_reservation(&r.id, &admin).unwrap();
        api.delete_pond(pond.id, &admin).unwrap();
        assert!(matches!(
            api.get_pond(pond.id).unwrap_err(),
            ApiError::NotFound(_)
        ));
    }

    #[test]
    fn test_check_availability_window_validation() {
        let (api, _repos, admin_id) = setup();
        let admin = ActorContext::admin(admin_id);
        let pond = api
            .create_pond("A1", "A", None, PondSizeClass::Medium, &admin)
            .unwrap();

        // 单日窗口合法
        assert_eq!(
            api.check_availability(pond.id, d("2025-03-01"), d("2025-03-01"))
                .unwrap(),
            1
        );
        // 倒置窗口拒绝
        let err = api
            .check_availability(pond.id, d("2025-03-10"), d("2025-03-01"))
            .unwrap_err();
        assert!(matches!(err, ApiError::InvalidInput(_)));
        // 未知鱼池
        let err = api
            .check_availability(999, d("2025-03-01"), d("2025-03-02"))
            .unwrap_err();
        assert!(matches!(err, ApiError::NotFound(_)));
    }

    #[test]
    fn test_reservation_queries() {
        let (api, _repos, admin_id) = setup();
        let admin = ActorContext::admin(admin_id);
        let pond = api
            .create_pond("A1", "A", None, PondSizeClass::Medium, &admin)
            .unwrap();
        let r = api
            .submit_reservation(ReservationDraft {
                pond_id: pond.id,
                user_name: "张三".to_string(),
                fish_type: Some("草鱼".to_string()),
                fish_quantity: Some(500),
                phone: None,
                channel_user_id: Some("U-张三".to_string()),
                start_date: d("2025-03-01"),
                end_date: d("2025-03-10"),
            })
            .unwrap();
        api.approve_reservation(&r.id, &admin).unwrap();

        assert_eq!(api.list_reservations(None).unwrap().len(), 1);
        assert_eq!(
            api.list_reservations(Some(HoldStatus::Approved)).unwrap().len(),
            1
        );
        assert_eq!(api.list_reservations_by_pond(pond.id).unwrap().len(), 1);
        assert_eq!(api.list_reservations_by_user("U-张三").unwrap().len(), 1);
        assert!(api.list_reservations_by_user("U-别人").unwrap().is_empty());

        // 到期窗口查询: 3/10 结束, 从 3/8 看 2 天内到期
        assert_eq!(
            api.list_expiring_reservations(d("2025-03-08"), 2).unwrap().len(),
            1
        );
        assert!(api
            .list_expiring_reservations(d("2025-03-01"), 2)
            .unwrap()
            .is_empty());
    }
}
