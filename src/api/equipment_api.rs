// ==========================================
// 渔场设施预定与物资管理系统 - 器材 API
// ==========================================
// 职责: 器材分类/目录维护 + 借用单流转的对外封装
// 红线: 数量护栏在审批服务事务内完成, 本层不做占用计算
// ==========================================

use std::sync::Arc;

use crate::api::error::{ApiError, ApiResult};
use crate::api::pond_api::require_admin;
use crate::domain::action_log::{ActionLog, ActionType};
use crate::domain::actor::ActorContext;
use crate::domain::equipment::{
    Equipment, EquipmentCategory, EquipmentLoan, LineReturn, LoanDraft,
};
use crate::domain::types::{CatalogStatus, DateWindow, HoldStatus};
use crate::engine::availability::AvailabilityEngine;
use crate::engine::repositories::ResourceRepositories;
use crate::services::approval_service::ApprovalService;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

// ==========================================
// EquipmentApi - 器材目录与借用
// ==========================================
pub struct EquipmentApi {
    repos: ResourceRepositories,
    availability: Arc<AvailabilityEngine>,
    approvals: Arc<ApprovalService>,
}

impl EquipmentApi {
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
    // 分类维护 (管理员)
    // ==========================================

    pub fn list_categories(&self) -> ApiResult<Vec<EquipmentCategory>> {
        Ok(self.repos.equipment_repo.find_all_categories()?)
    }

    pub fn create_category(
        &self,
        name: &str,
        description: Option<&str>,
        actor: &ActorContext,
    ) -> ApiResult<EquipmentCategory> {
        let admin_id = require_admin(actor)?;
        if name.trim().is_empty() {
            return Err(ApiError::InvalidInput("分类名称不能为空".to_string()));
        }
        let id = self
            .repos
            .equipment_repo
            .insert_category(name.trim(), description)?;
        self.record_log(
            ActionLog::new(ActionType::CatalogChange, Some(admin_id.to_string()))
                .with_details(format!("新建器材分类: {}", name.trim())),
        );
        self.get_category(id)
    }

    pub fn update_category(
        &self,
        id: i64,
        name: &str,
        description: Option<&str>,
        actor: &ActorContext,
    ) -> ApiResult<EquipmentCategory> {
        let admin_id = require_admin(actor)?;
        if name.trim().is_empty() {
            return Err(ApiError::InvalidInput("分类名称不能为空".to_string()));
        }
        self.repos
            .equipment_repo
            .update_category(id, name.trim(), description)?;
        self.record_log(
            ActionLog::new(ActionType::CatalogChange, Some(admin_id.to_string()))
                .with_details(format!("更新器材分类: {}", name.trim())),
        );
        self.get_category(id)
    }

    /// 删除分类, 分类下仍有器材时拒绝
    pub fn delete_category(&self, id: i64, actor: &ActorContext) -> ApiResult<()> {
        let admin_id = require_admin(actor)?;
        self.repos.equipment_repo.delete_category(id)?;
        self.record_log(
            ActionLog::new(ActionType::CatalogChange, Some(admin_id.to_string()))
                .with_details(format!("删除器材分类: id={}", id)),
        );
        Ok(())
    }

    fn get_category(&self, id: i64) -> ApiResult<EquipmentCategory> {
        self.repos
            .equipment_repo
            .find_category_by_id(id)?
            .ok_or_else(|| ApiError::NotFound(format!("器材分类(id={})不存在", id)))
    }

    // ==========================================
    // 器材维护 (管理员)
    // ==========================================

    pub fn list_equipment(&self) -> ApiResult<Vec<Equipment>> {
        Ok(self.repos.equipment_repo.find_all()?)
    }

    pub fn list_active_equipment(&self) -> ApiResult<Vec<Equipment>> {
        Ok(self.repos.equipment_repo.find_active()?)
    }

    pub fn list_equipment_by_category(&self, category_id: i64) -> ApiResult<Vec<Equipment>> {
        Ok(self.repos.equipment_repo.find_by_category(category_id)?)
    }

    pub fn get_equipment(&self, id: i64) -> ApiResult<Equipment> {
        self.repos
            .equipment_repo
            .find_by_id(id)?
            .ok_or_else(|| ApiError::NotFound(format!("器材(id={})不存在", id)))
    }

    pub fn create_equipment(
        &self,
        name: &str,
        category_id: Option<i64>,
        total_quantity: i64,
        unit: &str,
        description: Option<&str>,
        actor: &ActorContext,
    ) -> ApiResult<Equipment> {
        let admin_id = require_admin(actor)?;
        validate_equipment_input(name, total_quantity, unit)?;
        let id = self.repos.equipment_repo.insert(
            name.trim(),
            category_id,
            total_quantity,
            unit.trim(),
            description,
        )?;
        self.record_log(
            ActionLog::new(ActionType::CatalogChange, Some(admin_id.to_string()))
                .with_details(format!("新建器材: {} x{}", name.trim(), total_quantity)),
        );
        self.get_equipment(id)
    }

    /// 更新器材信息
    ///
    /// 总量下调不追回已批准/借出的占用, 窗口可用量按下限 0 计算
    pub fn update_equipment(
        &self,
        id: i64,
        name: &str,
        category_id: Option<i64>,
        total_quantity: i64,
        unit: &str,
        description: Option<&str>,
        actor: &ActorContext,
    ) -> ApiResult<Equipment> {
        let admin_id = require_admin(actor)?;
        validate_equipment_input(name, total_quantity, unit)?;
        self.repos.equipment_repo.update_info(
            id,
            name.trim(),
            category_id,
            total_quantity,
            unit.trim(),
            description,
        )?;
        self.record_log(
            ActionLog::new(ActionType::CatalogChange, Some(admin_id.to_string()))
                .with_details(format!("更新器材: {} 总量{}", name.trim(), total_quantity)),
        );
        self.get_equipment(id)
    }

    /// 启用/停用器材, 停用后窗口可用量按 0 计算
    pub fn set_equipment_status(
        &self,
        id: i64,
        status: CatalogStatus,
        actor: &ActorContext,
    ) -> ApiResult<Equipment> {
        let admin_id = require_admin(actor)?;
        let equipment = self.get_equipment(id)?;
        self.repos.equipment_repo.update_status(id, status)?;
        self.record_log(
            ActionLog::new(ActionType::CatalogChange, Some(admin_id.to_string()))
                .with_details(format!(
                    "器材状态: {} {} -> {}",
                    equipment.name, equipment.status, status
                )),
        );
        self.get_equipment(id)
    }

    /// 删除器材
    ///
    /// 仍被未完结借用单引用的器材不可删除;
    /// 历史明细行的引用由外键约束兜底
    pub fn delete_equipment(&self, id: i64, actor: &ActorContext) -> ApiResult<()> {
        let admin_id = require_admin(actor)?;
        let equipment = self.get_equipment(id)?;
        let active = self.repos.loan_repo.count_active_for_equipment(id)?;
        if active > 0 {
            return Err(ApiError::BusinessRuleViolation(format!(
                "器材 {} 仍有 {} 笔未完结借用, 不能删除",
                equipment.name, active
            )));
        }
        self.repos.equipment_repo.delete(id)?;
        self.record_log(
            ActionLog::new(ActionType::CatalogChange, Some(admin_id.to_string()))
                .with_details(format!("删除器材: {}", equipment.name)),
        );
        Ok(())
    }

    // ==========================================
    // 可用量查询
    // ==========================================

    /// 单件器材在借用窗口内的可用数量
    pub fn check_availability(
        &self,
        equipment_id: i64,
        borrow_date: NaiveDate,
        return_date: NaiveDate,
    ) -> ApiResult<i64> {
        let window = new_window(borrow_date, return_date)?;
        Ok(self.availability.equipment_availability(equipment_id, window)?)
    }

    /// 全部在用器材在窗口内的可用数量 (借用入口列表)
    pub fn availability_board(
        &self,
        borrow_date: NaiveDate,
        return_date: NaiveDate,
    ) -> ApiResult<Vec<EquipmentAvailabilityRow>> {
        let window = new_window(borrow_date, return_date)?;
        let board = self.availability.equipment_availability_board(window)?;
        Ok(board
            .into_iter()
            .map(|(equipment, available_quantity)| EquipmentAvailabilityRow {
                equipment,
                available_quantity,
            })
            .collect())
    }

    // ==========================================
    // 借用单流转 (委托审批服务)
    // ==========================================

    pub fn submit_loan(&self, draft: LoanDraft) -> ApiResult<EquipmentLoan> {
        Ok(self.approvals.submit_loan(draft)?)
    }

    pub fn approve_loan(&self, id: &str, actor: &ActorContext) -> ApiResult<EquipmentLoan> {
        Ok(self.approvals.approve_loan(id, actor)?)
    }

    pub fn reject_loan(
        &self,
        id: &str,
        reason: Option<&str>,
        actor: &ActorContext,
    ) -> ApiResult<EquipmentLoan> {
        Ok(self.approvals.reject_loan(id, reason, actor)?)
    }

    pub fn cancel_loan(&self, id: &str, actor: &ActorContext) -> ApiResult<EquipmentLoan> {
        Ok(self.approvals.cancel_loan(id, actor)?)
    }

    /// 取走登记
    pub fn mark_borrowed(&self, id: &str, actor: &ActorContext) -> ApiResult<EquipmentLoan> {
        Ok(self.approvals.mark_borrowed(id, actor)?)
    }

    /// 归还登记, `returns` 为 None 时按全额归还处理
    pub fn mark_returned(
        &self,
        id: &str,
        returns: Option<&[LineReturn]>,
        actor: &ActorContext,
    ) -> ApiResult<EquipmentLoan> {
        Ok(self.approvals.mark_returned(id, returns, actor)?)
    }

    // ==========================================
    // 借用单查询
    // ==========================================

    pub fn get_loan(&self, id: &str) -> ApiResult<EquipmentLoan> {
        self.repos
            .loan_repo
            .find_by_id(id)?
            .ok_or_else(|| ApiError::NotFound(format!("借用单(id={})不存在", id)))
    }

    pub fn list_loans(&self, status: Option<HoldStatus>) -> ApiResult<Vec<EquipmentLoan>> {
        let rows = match status {
            Some(status) => self.repos.loan_repo.find_by_status(status)?,
            None => self.repos.loan_repo.find_all()?,
        };
        Ok(rows)
    }

    /// 查询某渠道用户的借用单 (机器人"我的借用")
    pub fn list_loans_by_user(&self, channel_user_id: &str) -> ApiResult<Vec<EquipmentLoan>> {
        Ok(self.repos.loan_repo.find_by_channel_user(channel_user_id)?)
    }

    /// 约定归还日为指定日期的在借单
    pub fn list_loans_due_on(&self, due_date: NaiveDate) -> ApiResult<Vec<EquipmentLoan>> {
        Ok(self.repos.loan_repo.find_borrowed_due_on(due_date)?)
    }

    fn record_log(&self, log: ActionLog) {
        if let Err(e) = self.repos.action_log_repo.insert(&log) {
            tracing::warn!("操作日志记录失败: action={}, err={}", log.action_type, e);
        }
    }
}

fn validate_equipment_input(name: &str, total_quantity: i64, unit: &str) -> ApiResult<()> {
    if name.trim().is_empty() {
        return Err(ApiError::InvalidInput("器材名称不能为空".to_string()));
    }
    if total_quantity < 0 {
        return Err(ApiError::InvalidInput("器材总量不能为负".to_string()));
    }
    if unit.trim().is_empty() {
        return Err(ApiError::InvalidInput("计量单位不能为空".to_string()));
    }
    Ok(())
}

fn new_window(start: NaiveDate, end: NaiveDate) -> ApiResult<DateWindow> {
    DateWindow::new(start, end)
        .ok_or_else(|| ApiError::InvalidInput("归还日期不能早于借用日期".to_string()))
}

// ==========================================
// API 输出 DTO
// ==========================================

/// 可用量看板行
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EquipmentAvailabilityRow {
    pub equipment: Equipment,
    pub available_quantity: i64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{configure_sqlite_connection, init_db_schema};
    use crate::domain::equipment::LoanLineDraft;
    use crate::engine::events::OptionalNotificationSink;
    use rusqlite::Connection;
    use std::sync::Mutex;

    fn setup() -> (EquipmentApi, ResourceRepositories, i64) {
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
        let api = EquipmentApi::new(repos.clone(), availability, approvals);
        let admin_id = repos
            .admin_repo
            .insert("admin", "hash", "管理员", "admin")
            .unwrap();
        (api, repos, admin_id)
    }

    fn d(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    fn loan_draft(equipment_id: i64, quantity: i64, range: (&str, &str)) -> LoanDraft {
        LoanDraft {
            user_name: "张三".to_string(),
            channel_user_id: Some("U-张三".to_string()),
            phone: None,
            purpose: Some("巡塘".to_string()),
            borrow_date: d(range.0),
            return_date: d(range.1),
            items: vec![LoanLineDraft {
                equipment_id,
                quantity,
            }],
        }
    }

    #[test]
    fn test_category_crud_and_delete_guard() {
        let (api, _repos, admin_id) = setup();
        let admin = ActorContext::admin(admin_id);

        let cat = api
            .create_category("捕捞工具", Some("网具类"), &admin)
            .unwrap();
        let cat = api
            .update_category(cat.id, "捕捞网具", None, &admin)
            .unwrap();
        assert_eq!(cat.name, "捕捞网具");

        let tent = api
            .create_equipment("帐篷", Some(cat.id), 5, "顶", None, &admin)
            .unwrap();
        assert_eq!(tent.category_name.as_deref(), Some("捕捞网具"));

        // 分类下仍有器材, 不能删除
        let err = api.delete_category(cat.id, &admin).unwrap_err();
        assert!(matches!(err, ApiError::BusinessRuleViolation(_)));

        api.delete_equipment(tent.id, &admin).unwrap();
        api.delete_category(cat.id, &admin).unwrap();
        assert!(api.list_categories().unwrap().is_empty());
    }

    #[test]
    fn test_equipment_input_validation() {
        let (api, _repos, admin_id) = setup();
        let admin = ActorContext::admin(admin_id);

        let err = api
            .create_equipment("  ", None, 5, "顶", None, &admin)
            .unwrap_err();
        assert!(matches!(err, ApiError::InvalidInput(_)));
        let err = api
            .create_equipment("帐篷", None, -1, "顶", None, &admin)
            .unwrap_err();
        assert!(matches!(err, ApiError::InvalidInput(_)));
        let err = api
            .create_equipment("帐篷", None, 5, "", None, &admin)
            .unwrap_err();
        assert!(matches!(err, ApiError::InvalidInput(_)));

        // 非管理员一律拒绝
        let err = api
            .create_equipment("帐篷", None, 5, "顶", None, &ActorContext::requester("U-1"))
            .unwrap_err();
        assert!(matches!(err, ApiError::Unauthorized(_)));
    }

    #[test]
    fn test_availability_board_reflects_commitments() {
        let (api, _repos, admin_id) = setup();
        let admin = ActorContext::admin(admin_id);
        let tent = api
            .create_equipment("帐篷", None, 5, "顶", None, &admin)
            .unwrap();
        let boat = api
            .create_equipment("小船", None, 2, "艘", None, &admin)
            .unwrap();

        let loan = api
            .submit_loan(loan_draft(tent.id, 3, ("2025-04-01", "2025-04-05")))
            .unwrap();
        api.approve_loan(&loan.id, &admin).unwrap();

        let board = api
            .availability_board(d("2025-04-03"), d("2025-04-04"))
            .unwrap();
        let by_id = |id: i64| {
            board
                .iter()
                .find(|row| row.equipment.id == id)
                .map(|row| row.available_quantity)
                .unwrap()
        };
        assert_eq!(by_id(tent.id), 2);
        assert_eq!(by_id(boat.id), 2);

        // 窗口错开后恢复全量
        assert_eq!(
            api.check_availability(tent.id, d("2025-04-06"), d("2025-04-08"))
                .unwrap(),
            5
        );
        // 停用后可用量归零
        api.set_equipment_status(tent.id, CatalogStatus::Inactive, &admin)
            .unwrap();
        assert_eq!(
            api.check_availability(tent.id, d("2025-04-06"), d("2025-04-08"))
                .unwrap(),
            0
        );
    }

    #[test]
    fn test_delete_guard_blocks_active_loan() {
        let (api, _repos, admin_id) = setup();
        let admin = ActorContext::admin(admin_id);
        let tent = api
            .create_equipment("帐篷", None, 5, "顶", None, &admin)
            .unwrap();

        let loan = api
            .submit_loan(loan_draft(tent.id, 2, ("2025-04-01", "2025-04-05")))
            .unwrap();
        let err = api.delete_equipment(tent.id, &admin).unwrap_err();
        assert!(matches!(err, ApiError::BusinessRuleViolation(_)));

        // 取消后不再被未完结单引用, 但历史明细仍挡外键删除
        api.cancel_loan(&loan.id, &admin).unwrap();
        let err = api.delete_equipment(tent.id, &admin).unwrap_err();
        assert!(matches!(err, ApiError::BusinessRuleViolation(_)));
    }

    #[test]
    fn test_loan_flow_through_api() {
        let (api, _repos, admin_id) = setup();
        let admin = ActorContext::admin(admin_id);
        let tent = api
            .create_equipment("帐篷", None, 5, "顶", None, &admin)
            .unwrap();

        let loan = api
            .submit_loan(loan_draft(tent.id, 2, ("2025-04-01", "2025-04-05")))
            .unwrap();
        assert_eq!(loan.status, HoldStatus::Pending);

        api.approve_loan(&loan.id, &admin).unwrap();
        api.mark_borrowed(&loan.id, &admin).unwrap();
        let returned = api.mark_returned(&loan.id, None, &admin).unwrap();
        assert_eq!(returned.status, HoldStatus::Returned);
        assert!(returned.fully_returned());

        assert_eq!(api.list_loans(None).unwrap().len(), 1);
        assert_eq!(
            api.list_loans(Some(HoldStatus::Returned)).unwrap().len(),
            1
        );
        assert_eq!(api.list_loans_by_user("U-张三").unwrap().len(), 1);
    }
}
