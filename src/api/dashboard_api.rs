// ==========================================
// 渔场设施预定与物资管理系统 - 看板 API
// ==========================================
// 职责: 管理端首页聚合查询 + 操作日志审计视图
// 架构: API 层 -> Repository 层, 只读, 不做任何写入
// ==========================================

use crate::api::error::{ApiError, ApiResult};
use crate::domain::action_log::ActionLog;
use crate::domain::stock::{StockItem, StockLedgerEntry};
use crate::domain::types::HoldStatus;
use crate::engine::repositories::ResourceRepositories;
use crate::repository::pond_repo::PondStatusCount;
use serde::{Deserialize, Serialize};

// ==========================================
// DashboardApi - 看板聚合
// ==========================================
pub struct DashboardApi {
    repos: ResourceRepositories,
}

impl DashboardApi {
    pub fn new(repos: ResourceRepositories) -> Self {
        Self { repos }
    }

    /// 首页总览
    pub fn summary(&self) -> ApiResult<DashboardSummary> {
        Ok(DashboardSummary {
            ponds: self.repos.pond_repo.status_counts()?,
            reservations: status_counts(self.repos.reservation_repo.count_by_status()?),
            loans: status_counts(self.repos.loan_repo.count_by_status()?),
            requisitions: status_counts(self.repos.requisition_repo.count_by_status()?),
            pending_cancellations: self.repos.cancellation_repo.count_pending()?,
            active_equipment: self.repos.equipment_repo.count_active()?,
            low_stock_items: self.repos.stock_repo.find_low_stock_items()?,
            total_stock_value: self.repos.stock_repo.total_stock_value()?,
            active_sessions: self.repos.session_repo.count()?,
        })
    }

    /// 管理员待办队列 (各类待审核单数)
    pub fn pending_queue(&self) -> ApiResult<PendingQueue> {
        Ok(PendingQueue {
            reservations: pending_of(self.repos.reservation_repo.count_by_status()?),
            loans: pending_of(self.repos.loan_repo.count_by_status()?),
            requisitions: pending_of(self.repos.requisition_repo.count_by_status()?),
            cancellations: self.repos.cancellation_repo.count_pending()?,
        })
    }

    // ==========================================
    // 操作日志审计视图
    // ==========================================

    /// 最近操作
    pub fn recent_actions(&self, limit: i64) -> ApiResult<Vec<ActionLog>> {
        if limit <= 0 || limit > 1000 {
            return Err(ApiError::InvalidInput("limit必须在1-1000之间".to_string()));
        }
        Ok(self.repos.action_log_repo.find_recent(limit)?)
    }

    /// 某预定单的完整操作轨迹
    pub fn actions_for_reservation(&self, reservation_id: &str) -> ApiResult<Vec<ActionLog>> {
        Ok(self
            .repos
            .action_log_repo
            .find_by_reservation(reservation_id)?)
    }

    /// 某借用单的完整操作轨迹
    pub fn actions_for_loan(&self, loan_id: &str) -> ApiResult<Vec<ActionLog>> {
        Ok(self.repos.action_log_repo.find_by_loan(loan_id)?)
    }

    /// 某领用申请的完整操作轨迹
    pub fn actions_for_requisition(&self, requisition_id: &str) -> ApiResult<Vec<ActionLog>> {
        Ok(self
            .repos
            .action_log_repo
            .find_by_requisition(requisition_id)?)
    }

    /// 全场最近台账流水 (看板侧栏)
    pub fn recent_ledger(&self, limit: i64) -> ApiResult<Vec<StockLedgerEntry>> {
        if limit <= 0 || limit > 1000 {
            return Err(ApiError::InvalidInput("limit必须在1-1000之间".to_string()));
        }
        Ok(self.repos.stock_repo.find_ledger_recent(limit)?)
    }
}

fn status_counts(rows: Vec<(HoldStatus, i64)>) -> Vec<StatusCount> {
    rows.into_iter()
        .map(|(status, count)| StatusCount { status, count })
        .collect()
}

fn pending_of(rows: Vec<(HoldStatus, i64)>) -> i64 {
    rows.iter()
        .find(|(status, _)| *status == HoldStatus::Pending)
        .map(|(_, count)| *count)
        .unwrap_or(0)
}

// ==========================================
// DTO 类型定义
// ==========================================

/// 单状态计数
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusCount {
    pub status: HoldStatus,
    pub count: i64,
}

/// 首页总览
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DashboardSummary {
    pub ponds: PondStatusCount,
    pub reservations: Vec<StatusCount>,
    pub loans: Vec<StatusCount>,
    pub requisitions: Vec<StatusCount>,
    pub pending_cancellations: i64,
    pub active_equipment: i64,
    pub low_stock_items: Vec<StockItem>,
    pub total_stock_value: f64,
    pub active_sessions: i64,
}

/// 管理员待办队列
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PendingQueue {
    pub reservations: i64,
    pub loans: i64,
    pub requisitions: i64,
    pub cancellations: i64,
}
