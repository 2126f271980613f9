// ==========================================
// 渔场设施预定与物资管理系统 - 物资领域模型
// ==========================================
// 物资为消耗性资源: 无时间窗口, 领用审批时永久扣减
// current_quantity 是台账 (stock_ledger) 的缓存投影,
// 必须能从台账从零重放精确复原
// ==========================================

use crate::domain::types::{CatalogStatus, HoldStatus, LedgerEntryKind};
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

// ==========================================
// StockCategory - 物资分类
// ==========================================
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StockCategory {
    pub id: i64,
    pub name: String,
    pub description: Option<String>,
    pub created_at: NaiveDateTime,
    /// 分类下在用物资数 (列表查询时联表求出)
    pub item_count: i64,
}

// ==========================================
// StockItem - 物资目录实体
// ==========================================
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StockItem {
    pub id: i64,
    pub name: String,
    pub category_id: Option<i64>,
    pub category_name: Option<String>,
    pub unit: String,
    pub unit_price: f64,
    /// 台账投影, 不变式: >= 0
    pub current_quantity: i64,
    /// 低库存预警阈值, 0 表示不启用
    pub min_quantity: i64,
    pub description: Option<String>,
    pub status: CatalogStatus,
    pub created_at: NaiveDateTime,
}

impl StockItem {
    /// 是否触发低库存预警
    pub fn is_low_stock(&self) -> bool {
        self.min_quantity > 0 && self.current_quantity <= self.min_quantity
    }
}

// ==========================================
// StockLedgerEntry - 台账记录 (不可变, 只追加)
// ==========================================
// signed_effect: in=+quantity, out=-quantity, adjust=带符号差额
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StockLedgerEntry {
    pub id: String,                 // UUID
    pub item_id: i64,
    pub item_name: Option<String>,
    pub entry_kind: LedgerEntryKind,
    /// 数量幅值 (恒为正)
    pub quantity: i64,
    /// 对余额的带符号影响
    pub signed_effect: i64,
    pub unit_price: Option<f64>,
    pub total_price: Option<f64>,
    pub reference_no: Option<String>,
    pub note: Option<String>,
    pub created_by: Option<i64>,
    pub admin_name: Option<String>,
    pub created_at: NaiveDateTime,
}

// ==========================================
// LedgerMeta - 记账附加信息
// ==========================================
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LedgerMeta {
    pub note: Option<String>,
    pub reference_no: Option<String>,
    pub created_by: Option<i64>,
}

// ==========================================
// StockRequisition - 物资领用申请 (单头)
// ==========================================
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StockRequisition {
    pub id: String,                 // UUID

    // ===== 申请人信息 =====
    pub user_name: String,
    pub channel_user_id: Option<String>,
    pub phone: Option<String>,
    pub purpose: Option<String>,

    // ===== 状态机字段 =====
    pub status: HoldStatus,
    pub reject_reason: Option<String>,
    pub decided_by: Option<i64>,
    pub decided_at: Option<NaiveDateTime>,

    pub created_at: NaiveDateTime,

    // ===== 明细行 =====
    pub items: Vec<RequisitionLine>,
}

// ==========================================
// RequisitionLine - 领用明细行
// ==========================================
// approved_quantity 在审批时裁定, 允许低于申请量, 不允许超过
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequisitionLine {
    pub id: i64,
    pub requisition_id: String,
    pub item_id: i64,
    pub item_name: Option<String>,
    pub unit: Option<String>,
    pub requested_quantity: i64,
    pub approved_quantity: Option<i64>,
}

// ==========================================
// RequisitionDraft - 提交领用申请的入参
// ==========================================
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequisitionDraft {
    pub user_name: String,
    pub channel_user_id: Option<String>,
    pub phone: Option<String>,
    pub purpose: Option<String>,
    pub items: Vec<RequisitionLineDraft>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequisitionLineDraft {
    pub item_id: i64,
    pub requested_quantity: i64,
}

/// 审批时的单行裁定量
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LineApproval {
    pub item_id: i64,
    pub approved_quantity: i64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn item(current: i64, min: i64) -> StockItem {
        StockItem {
            id: 1,
            name: "鱼饲料".to_string(),
            category_id: None,
            category_name: None,
            unit: "袋".to_string(),
            unit_price: 35.0,
            current_quantity: current,
            min_quantity: min,
            description: None,
            status: CatalogStatus::Active,
            created_at: NaiveDate::from_ymd_opt(2025, 1, 1)
                .unwrap()
                .and_hms_opt(8, 0, 0)
                .unwrap(),
        }
    }

    #[test]
    fn test_low_stock_threshold() {
        assert!(item(3, 5).is_low_stock());
        assert!(item(5, 5).is_low_stock());
        assert!(!item(6, 5).is_low_stock());
        // 阈值为 0 时不启用预警
        assert!(!item(0, 0).is_low_stock());
    }
}
