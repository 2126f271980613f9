// ==========================================
// 渔场设施预定与物资管理系统 - 器材领域模型
// ==========================================
// 器材为共享池资源: 可用量 = 总量 - 窗口内已承诺借出量
// 可用性口径: 仅 approved/borrowed/overdue 占用, pending 不占用
// 部分归还会释放对应数量 (quantity - returned_quantity)
// ==========================================

use crate::domain::types::{CatalogStatus, DateWindow, HoldStatus};
use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

// ==========================================
// EquipmentCategory - 器材分类
// ==========================================
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EquipmentCategory {
    pub id: i64,
    pub name: String,
    pub description: Option<String>,
    pub created_at: NaiveDateTime,
    /// 分类下在用器材数 (列表查询时联表求出)
    pub equipment_count: i64,
}

// ==========================================
// Equipment - 器材目录实体
// ==========================================
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Equipment {
    pub id: i64,
    pub name: String,
    pub category_id: Option<i64>,
    pub category_name: Option<String>,
    pub total_quantity: i64,
    pub unit: String,
    pub description: Option<String>,
    pub status: CatalogStatus,
    pub created_at: NaiveDateTime,
}

// ==========================================
// EquipmentLoan - 器材借用单 (单头)
// ==========================================
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EquipmentLoan {
    pub id: String,                 // UUID

    // ===== 申请人信息 =====
    pub user_name: String,
    pub channel_user_id: Option<String>,
    pub phone: Option<String>,
    pub purpose: Option<String>,

    // ===== 借用窗口 =====
    pub borrow_date: NaiveDate,
    pub return_date: NaiveDate,
    pub actual_return_date: Option<NaiveDate>,

    // ===== 状态机字段 =====
    pub status: HoldStatus,
    pub reject_reason: Option<String>,
    pub decided_by: Option<i64>,
    pub decided_at: Option<NaiveDateTime>,

    pub created_at: NaiveDateTime,

    // ===== 明细行 =====
    pub items: Vec<LoanLine>,
}

impl EquipmentLoan {
    pub fn window(&self) -> DateWindow {
        DateWindow {
            start: self.borrow_date,
            end: self.return_date,
        }
    }

    /// 距离约定归还日剩余天数 (负数表示已逾期)
    pub fn days_until_return(&self, today: NaiveDate) -> i64 {
        (self.return_date - today).num_days()
    }

    /// 所有明细行是否均已全额归还
    pub fn fully_returned(&self) -> bool {
        self.items
            .iter()
            .all(|line| line.returned_quantity >= line.quantity)
    }
}

// ==========================================
// LoanLine - 借用明细行
// ==========================================
// 不变式: 0 <= returned_quantity <= quantity
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoanLine {
    pub id: i64,
    pub loan_id: String,
    pub equipment_id: i64,
    pub equipment_name: Option<String>,
    pub unit: Option<String>,
    pub quantity: i64,
    pub returned_quantity: i64,
}

impl LoanLine {
    /// 尚未归还的数量 (仍占用器材池)
    pub fn outstanding(&self) -> i64 {
        (self.quantity - self.returned_quantity).max(0)
    }
}

// ==========================================
// LoanDraft - 提交借用的入参
// ==========================================
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoanDraft {
    pub user_name: String,
    pub channel_user_id: Option<String>,
    pub phone: Option<String>,
    pub purpose: Option<String>,
    pub borrow_date: NaiveDate,
    pub return_date: NaiveDate,
    pub items: Vec<LoanLineDraft>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoanLineDraft {
    pub equipment_id: i64,
    pub quantity: i64,
}

/// 归还登记的单行入参, quantity 为本次归还数量 (增量)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LineReturn {
    pub equipment_id: i64,
    pub quantity: i64,
}
