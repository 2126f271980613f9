// ==========================================
// 渔场设施预定与物资管理系统 - 物资 API
// ==========================================
// 职责: 物资分类/目录维护 + 台账出入库 + 领用申请流转
// 红线: 余额只能经台账服务变动, 本层不直接改 current_quantity
// ==========================================

use std::sync::Arc;

use crate::api::error::{ApiError, ApiResult};
use crate::api::pond_api::require_admin;
use crate::domain::action_log::{ActionLog, ActionType};
use crate::domain::actor::ActorContext;
use crate::domain::stock::{
    LedgerMeta, LineApproval, RequisitionDraft, StockCategory, StockItem, StockLedgerEntry,
    StockRequisition,
};
use crate::domain::types::{CatalogStatus, HoldStatus};
use crate::engine::repositories::ResourceRepositories;
use crate::services::approval_service::ApprovalService;
use crate::services::ledger_service::{LedgerService, PostedEntry};

// ==========================================
// StockApi - 物资目录/台账/领用
// ==========================================
pub struct StockApi {
    repos: ResourceRepositories,
    ledger: Arc<LedgerService>,
    approvals: Arc<ApprovalService>,
}

impl StockApi {
    pub fn new(
        repos: ResourceRepositories,
        ledger: Arc<LedgerService>,
        approvals: Arc<ApprovalService>,
    ) -> Self {
        Self {
            repos,
            ledger,
            approvals,
        }
    }

    // ==========================================
    // 分类维护 (管理员)
    // ==========================================

    pub fn list_categories(&self) -> ApiResult<Vec<StockCategory>> {
        Ok(self.repos.stock_repo.find_all_categories()?)
    }

    pub fn create_category(
        &self,
        name: &str,
        description: Option<&str>,
        actor: &ActorContext,
    ) -> ApiResult<StockCategory> {
        let admin_id = require_admin(actor)?;
        if name.trim().is_empty() {
            return Err(ApiError::InvalidInput("分类名称不能为空".to_string()));
        }
        let id = self
            .repos
            .stock_repo
            .insert_category(name.trim(), description)?;
        self.record_log(
            ActionLog::new(ActionType::CatalogChange, Some(admin_id.to_string()))
                .with_details(format!("新建物资分类: {}", name.trim())),
        );
        self.get_category(id)
    }

    pub fn update_category(
        &self,
        id: i64,
        name: &str,
        description: Option<&str>,
        actor: &ActorContext,
    ) -> ApiResult<StockCategory> {
        let admin_id = require_admin(actor)?;
        if name.trim().is_empty() {
            return Err(ApiError::InvalidInput("分类名称不能为空".to_string()));
        }
        self.repos
            .stock_repo
            .update_category(id, name.trim(), description)?;
        self.record_log(
            ActionLog::new(ActionType::CatalogChange, Some(admin_id.to_string()))
                .with_details(format!("更新物资分类: {}", name.trim())),
        );
        self.get_category(id)
    }

    /// 删除分类, 分类下仍有物资时拒绝
    pub fn delete_category(&self, id: i64, actor: &ActorContext) -> ApiResult<()> {
        let admin_id = require_admin(actor)?;
        self.repos.stock_repo.delete_category(id)?;
        self.record_log(
            ActionLog::new(ActionType::CatalogChange, Some(admin_id.to_string()))
                .with_details(format!("删除物资分类: id={}", id)),
        );
        Ok(())
    }

    fn get_category(&self, id: i64) -> ApiResult<StockCategory> {
        let found = self
            .repos
            .stock_repo
            .find_all_categories()?
            .into_iter()
            .find(|c| c.id == id);
        found.ok_or_else(|| ApiError::NotFound(format!("物资分类(id={})不存在", id)))
    }

    // ==========================================
    // 物资维护 (管理员)
    // ==========================================

    pub fn list_items(&self) -> ApiResult<Vec<StockItem>> {
        Ok(self.repos.stock_repo.find_all_items()?)
    }

    pub fn list_active_items(&self) -> ApiResult<Vec<StockItem>> {
        Ok(self.repos.stock_repo.find_active_items()?)
    }

    pub fn get_item(&self, id: i64) -> ApiResult<StockItem> {
        self.repos
            .stock_repo
            .find_item_by_id(id)?
            .ok_or_else(|| ApiError::NotFound(format!("物资(id={})不存在", id)))
    }

    /// 新建物资
    ///
    /// 余额恒从 0 起步; `initial_quantity` 提供且为正时,
    /// 以一笔期初入库台账补记初始库存
    #[allow(clippy::too_many_arguments)]
    pub fn create_item(
        &self,
        name: &str,
        category_id: Option<i64>,
        unit: &str,
        unit_price: f64,
        min_quantity: i64,
        description: Option<&str>,
        initial_quantity: Option<i64>,
        actor: &ActorContext,
    ) -> ApiResult<StockItem> {
        let admin_id = require_admin(actor)?;
        validate_item_input(name, unit, unit_price, min_quantity)?;
        if let Some(q) = initial_quantity {
            if q < 0 {
                return Err(ApiError::InvalidInput("期初库存不能为负".to_string()));
            }
        }

        let id = self.repos.stock_repo.insert_item(
            name.trim(),
            category_id,
            unit.trim(),
            unit_price,
            min_quantity,
            description,
        )?;
        self.record_log(
            ActionLog::new(ActionType::CatalogChange, Some(admin_id.to_string()))
                .with_item(id)
                .with_details(format!("新建物资: {}", name.trim())),
        );

        if let Some(q) = initial_quantity.filter(|q| *q > 0) {
            self.ledger.post_in(
                id,
                q,
                None,
                LedgerMeta {
                    note: Some("期初建账".to_string()),
                    reference_no: None,
                    created_by: Some(admin_id),
                },
            )?;
        }
        self.get_item(id)
    }

    /// 更新物资信息, 余额不在此处修改
    #[allow(clippy::too_many_arguments)]
    pub fn update_item(
        &self,
        id: i64,
        name: &str,
        category_id: Option<i64>,
        unit: &str,
        unit_price: f64,
        min_quantity: i64,
        description: Option<&str>,
        actor: &ActorContext,
    ) -> ApiResult<StockItem> {
        let admin_id = require_admin(actor)?;
        validate_item_input(name, unit, unit_price, min_quantity)?;
        self.repos.stock_repo.update_item_info(
            id,
            name.trim(),
            category_id,
            unit.trim(),
            unit_price,
            min_quantity,
            description,
        )?;
        self.record_log(
            ActionLog::new(ActionType::CatalogChange, Some(admin_id.to_string()))
                .with_item(id)
                .with_details(format!("更新物资: {}", name.trim())),
        );
        self.get_item(id)
    }

    /// 启用/停用物资, 停用后领用入口不再展示且可用量按 0 计算
    pub fn set_item_status(
        &self,
        id: i64,
        status: CatalogStatus,
        actor: &ActorContext,
    ) -> ApiResult<StockItem> {
        let admin_id = require_admin(actor)?;
        let item = self.get_item(id)?;
        self.repos.stock_repo.update_item_status(id, status)?;
        self.record_log(
            ActionLog::new(ActionType::CatalogChange, Some(admin_id.to_string()))
                .with_item(id)
                .with_details(format!("物资状态: {} {} -> {}", item.name, item.status, status)),
        );
        self.get_item(id)
    }

    /// 删除物资, 已有台账记录时拒绝 (改用停用)
    pub fn delete_item(&self, id: i64, actor: &ActorContext) -> ApiResult<()> {
        let admin_id = require_admin(actor)?;
        let item = self.get_item(id)?;
        self.repos.stock_repo.delete_item(id)?;
        self.record_log(
            ActionLog::new(ActionType::CatalogChange, Some(admin_id.to_string()))
                .with_item(id)
                .with_details(format!("删除物资: {}", item.name)),
        );
        Ok(())
    }

    // ==========================================
    // 台账出入库 (管理员)
    // ==========================================

    /// 入库, `unit_price` 提供时同步更新参考单价
    pub fn stock_in(
        &self,
        item_id: i64,
        quantity: i64,
        unit_price: Option<f64>,
        note: Option<&str>,
        reference_no: Option<&str>,
        actor: &ActorContext,
    ) -> ApiResult<PostedEntry> {
        let admin_id = require_admin(actor)?;
        Ok(self.ledger.post_in(
            item_id,
            quantity,
            unit_price,
            ledger_meta(note, reference_no, admin_id),
        )?)
    }

    /// 出库, 余额不足时整笔失败
    pub fn stock_out(
        &self,
        item_id: i64,
        quantity: i64,
        note: Option<&str>,
        reference_no: Option<&str>,
        actor: &ActorContext,
    ) -> ApiResult<PostedEntry> {
        let admin_id = require_admin(actor)?;
        Ok(self.ledger.post_out(
            item_id,
            quantity,
            ledger_meta(note, reference_no, admin_id),
        )?)
    }

    /// 盘点校正到权威新余额, 与当前一致时不产生台账记录
    pub fn stock_adjust(
        &self,
        item_id: i64,
        new_quantity: i64,
        note: Option<&str>,
        actor: &ActorContext,
    ) -> ApiResult<Option<PostedEntry>> {
        let admin_id = require_admin(actor)?;
        Ok(self
            .ledger
            .post_adjust(item_id, new_quantity, ledger_meta(note, None, admin_id))?)
    }

    /// 当前余额 (台账投影)
    pub fn balance(&self, item_id: i64) -> ApiResult<i64> {
        Ok(self.ledger.balance(item_id)?)
    }

    /// 某物资的台账流水 (最新在前)
    pub fn item_ledger(&self, item_id: i64, limit: i64) -> ApiResult<Vec<StockLedgerEntry>> {
        validate_limit(limit)?;
        self.get_item(item_id)?;
        Ok(self.repos.stock_repo.find_ledger_by_item(item_id, limit)?)
    }

    /// 全场最近台账流水
    pub fn recent_ledger(&self, limit: i64) -> ApiResult<Vec<StockLedgerEntry>> {
        validate_limit(limit)?;
        Ok(self.repos.stock_repo.find_ledger_recent(limit)?)
    }

    /// 触发低库存预警的物资
    pub fn low_stock_items(&self) -> ApiResult<Vec<StockItem>> {
        Ok(self.repos.stock_repo.find_low_stock_items()?)
    }

    // ==========================================
    // 领用申请流转 (委托审批服务)
    // ==========================================

    pub fn submit_requisition(&self, draft: RequisitionDraft) -> ApiResult<StockRequisition> {
        Ok(self.approvals.submit_requisition(draft)?)
    }

    /// 审批通过并出库, `overrides` 可按行下调裁定量
    pub fn approve_requisition(
        &self,
        id: &str,
        overrides: Option<&[LineApproval]>,
        actor: &ActorContext,
    ) -> ApiResult<StockRequisition> {
        Ok(self.approvals.approve_requisition(id, overrides, actor)?)
    }

    pub fn reject_requisition(
        &self,
        id: &str,
        reason: Option<&str>,
        actor: &ActorContext,
    ) -> ApiResult<StockRequisition> {
        Ok(self.approvals.reject_requisition(id, reason, actor)?)
    }

    pub fn cancel_requisition(&self, id: &str, actor: &ActorContext) -> ApiResult<StockRequisition> {
        Ok(self.approvals.cancel_requisition(id, actor)?)
    }

    pub fn get_requisition(&self, id: &str) -> ApiResult<StockRequisition> {
        self.repos
            .requisition_repo
            .find_by_id(id)?
            .ok_or_else(|| ApiError::NotFound(format!("领用申请(id={})不存在", id)))
    }

    pub fn list_requisitions(
        &self,
        status: Option<HoldStatus>,
    ) -> ApiResult<Vec<StockRequisition>> {
        let rows = match status {
            Some(status) => self.repos.requisition_repo.find_by_status(status)?,
            None => self.repos.requisition_repo.find_all()?,
        };
        Ok(rows)
    }

    /// 查询某渠道用户的领用申请
    pub fn list_requisitions_by_user(
        &self,
        channel_user_id: &str,
    ) -> ApiResult<Vec<StockRequisition>> {
        Ok(self
            .repos
            .requisition_repo
            .find_by_channel_user(channel_user_id)?)
    }

    fn record_log(&self, log: ActionLog) {
        if let Err(e) = self.repos.action_log_repo.insert(&log) {
            tracing::warn!("操作日志记录失败: action={}, err={}", log.action_type, e);
        }
    }
}

fn validate_item_input(name: &str, unit: &str, unit_price: f64, min_quantity: i64) -> ApiResult<()> {
    if name.trim().is_empty() {
        return Err(ApiError::InvalidInput("物资名称不能为空".to_string()));
    }
    if unit.trim().is_empty() {
        return Err(ApiError::InvalidInput("计量单位不能为空".to_string()));
    }
    if unit_price < 0.0 {
        return Err(ApiError::InvalidInput("参考单价不能为负".to_string()));
    }
    if min_quantity < 0 {
        return Err(ApiError::InvalidInput("预警阈值不能为负".to_string()));
    }
    Ok(())
}

fn validate_limit(limit: i64) -> ApiResult<()> {
    if limit <= 0 {
        return Err(ApiError::InvalidInput("条数必须为正".to_string()));
    }
    Ok(())
}

fn ledger_meta(note: Option<&str>, reference_no: Option<&str>, admin_id: i64) -> LedgerMeta {
    LedgerMeta {
        note: note.map(|s| s.to_string()),
        reference_no: reference_no.map(|s| s.to_string()),
        created_by: Some(admin_id),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{configure_sqlite_connection, init_db_schema};
    use crate::domain::stock::RequisitionLineDraft;
    use crate::engine::events::OptionalNotificationSink;
    use rusqlite::Connection;
    use std::sync::{Arc, Mutex};

    fn setup() -> (StockApi, ResourceRepositories, i64) {
        let conn = Connection::open_in_memory().unwrap();
        configure_sqlite_connection(&conn).unwrap();
        init_db_schema(&conn).unwrap();
        let conn = Arc::new(Mutex::new(conn));
        let repos = ResourceRepositories::from_conn(conn.clone());
        let ledger = Arc::new(LedgerService::new(
            conn.clone(),
            repos.action_log_repo.clone(),
            OptionalNotificationSink::none(),
        ));
        let approvals = Arc::new(ApprovalService::new(
            conn,
            repos.clone(),
            OptionalNotificationSink::none(),
        ));
        let api = StockApi::new(repos.clone(), ledger, approvals);
        let admin_id = repos
            .admin_repo
            .insert("admin", "hash", "管理员", "admin")
            .unwrap();
        (api, repos, admin_id)
    }

    fn requisition_draft(lines: &[(i64, i64)]) -> RequisitionDraft {
        RequisitionDraft {
            user_name: "张三".to_string(),
            channel_user_id: Some("U-张三".to_string()),
            phone: None,
            purpose: Some("春投".to_string()),
            items: lines
                .iter()
                .map(|(item_id, requested_quantity)| RequisitionLineDraft {
                    item_id: *item_id,
                    requested_quantity: *requested_quantity,
                })
                .collect(),
        }
    }

    #[test]
    fn test_create_item_with_opening_stock() {
        let (api, repos, admin_id) = setup();
        let admin = ActorContext::admin(admin_id);

        let item = api
            .create_item("化肥", None, "袋", 50.0, 3, None, Some(10), &admin)
            .unwrap();
        assert_eq!(item.current_quantity, 10);

        // 期初库存以台账记录落地, 可重放复原
        let ledger = api.item_ledger(item.id, 10).unwrap();
        assert_eq!(ledger.len(), 1);
        assert_eq!(ledger[0].signed_effect, 10);
        assert_eq!(ledger[0].note.as_deref(), Some("期初建账"));
        assert_eq!(repos.stock_repo.replay_balance(item.id).unwrap(), 10);

        // 不带期初的物资余额为 0
        let bare = api
            .create_item("渔网线", None, "卷", 12.0, 0, None, None, &admin)
            .unwrap();
        assert_eq!(bare.current_quantity, 0);
        assert!(api.item_ledger(bare.id, 10).unwrap().is_empty());
    }

    #[test]
    fn test_ledger_ops_require_admin() {
        let (api, _repos, admin_id) = setup();
        let admin = ActorContext::admin(admin_id);
        let requester = ActorContext::requester("U-1");
        let item = api
            .create_item("化肥", None, "袋", 50.0, 0, None, None, &admin)
            .unwrap();

        let err = api
            .stock_in(item.id, 5, None, None, None, &requester)
            .unwrap_err();
        assert!(matches!(err, ApiError::Unauthorized(_)));

        api.stock_in(item.id, 10, Some(55.0), Some("春季采购"), Some("PO-001"), &admin)
            .unwrap();
        let posted = api
            .stock_out(item.id, 4, Some("投肥"), None, &admin)
            .unwrap();
        assert_eq!(posted.balance_after, 6);
        assert_eq!(api.balance(item.id).unwrap(), 6);
    }

    #[test]
    fn test_insufficient_stock_maps_with_detail() {
        let (api, _repos, admin_id) = setup();
        let admin = ActorContext::admin(admin_id);
        let item = api
            .create_item("化肥", None, "袋", 50.0, 0, None, Some(10), &admin)
            .unwrap();

        let err = api.stock_out(item.id, 15, None, None, &admin).unwrap_err();
        match err {
            ApiError::InsufficientStock {
                requested,
                available,
                ..
            } => {
                assert_eq!(requested, 15);
                assert_eq!(available, 10);
            }
            other => panic!("意外错误: {:?}", other),
        }
        assert_eq!(api.balance(item.id).unwrap(), 10);
    }

    #[test]
    fn test_requisition_approval_with_line_override() {
        let (api, _repos, admin_id) = setup();
        let admin = ActorContext::admin(admin_id);
        let feed = api
            .create_item("鱼饲料", None, "袋", 80.0, 0, None, Some(20), &admin)
            .unwrap();

        let req = api
            .submit_requisition(requisition_draft(&[(feed.id, 8)]))
            .unwrap();
        assert_eq!(req.status, HoldStatus::Pending);

        let approved = api
            .approve_requisition(
                &req.id,
                Some(&[LineApproval {
                    item_id: feed.id,
                    approved_quantity: 5,
                }]),
                &admin,
            )
            .unwrap();
        assert_eq!(approved.status, HoldStatus::Approved);
        assert_eq!(approved.items[0].approved_quantity, Some(5));
        assert_eq!(api.balance(feed.id).unwrap(), 15);
    }

    #[test]
    fn test_requisition_all_or_nothing() {
        let (api, _repos, admin_id) = setup();
        let admin = ActorContext::admin(admin_id);
        let feed = api
            .create_item("鱼饲料", None, "袋", 80.0, 0, None, Some(20), &admin)
            .unwrap();
        let lime = api
            .create_item("生石灰", None, "袋", 8.0, 0, None, Some(2), &admin)
            .unwrap();

        // 第二行超出余额, 整单回滚
        let req = api
            .submit_requisition(requisition_draft(&[(feed.id, 5), (lime.id, 4)]))
            .unwrap();
        let err = api.approve_requisition(&req.id, None, &admin).unwrap_err();
        assert!(matches!(err, ApiError::InsufficientStock { .. }));

        let reloaded = api.get_requisition(&req.id).unwrap();
        assert_eq!(reloaded.status, HoldStatus::Pending);
        assert_eq!(api.balance(feed.id).unwrap(), 20);
        assert_eq!(api.balance(lime.id).unwrap(), 2);
    }

    #[test]
    fn test_low_stock_listing_and_item_delete_guard() {
        let (api, _repos, admin_id) = setup();
        let admin = ActorContext::admin(admin_id);
        let item = api
            .create_item("化肥", None, "袋", 50.0, 3, None, Some(10), &admin)
            .unwrap();

        assert!(api.low_stock_items().unwrap().is_empty());
        api.stock_out(item.id, 8, None, None, &admin).unwrap();
        let low = api.low_stock_items().unwrap();
        assert_eq!(low.len(), 1);
        assert!(low[0].is_low_stock());

        // 已有台账的物资删除被拒, 改走停用
        let err = api.delete_item(item.id, &admin).unwrap_err();
        assert!(matches!(err, ApiError::BusinessRuleViolation(_)));
        let item = api
            .set_item_status(item.id, CatalogStatus::Inactive, &admin)
            .unwrap();
        assert_eq!(item.status, CatalogStatus::Inactive);

        // 从未记账的物资可直接删除
        let fresh = api
            .create_item("备用桶", None, "个", 15.0, 0, None, None, &admin)
            .unwrap();
        api.delete_item(fresh.id, &admin).unwrap();
        assert!(matches!(
            api.get_item(fresh.id).unwrap_err(),
            ApiError::NotFound(_)
        ));
    }
}
