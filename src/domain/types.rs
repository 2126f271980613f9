// ==========================================
// 渔场设施预定与物资管理系统 - 领域类型定义
// ==========================================
// 序列化格式: snake_case (与数据库存储一致)
// ==========================================

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;

// ==========================================
// 预定单类别 (Hold Kind)
// ==========================================
// 鱼池预定 / 器材借用 / 物资领用 / 取消申请
// 共用同一套状态机,合法迁移按类别收窄
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HoldKind {
    PondReservation,
    EquipmentLoan,
    StockRequisition,
    CancellationRequest,
}

impl fmt::Display for HoldKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HoldKind::PondReservation => write!(f, "pond_reservation"),
            HoldKind::EquipmentLoan => write!(f, "equipment_loan"),
            HoldKind::StockRequisition => write!(f, "stock_requisition"),
            HoldKind::CancellationRequest => write!(f, "cancellation_request"),
        }
    }
}

// ==========================================
// 预定单状态 (Hold Status)
// ==========================================
// 状态机:
//   pending   -> approved / rejected / cancelled
//   approved  -> cancelled / completed / borrowed / overdue
//   borrowed  -> returned / overdue
//   overdue   -> returned
// rejected / cancelled / completed / returned 为终态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HoldStatus {
    Pending,
    Approved,
    Rejected,
    Cancelled,
    Completed,
    Borrowed,
    Returned,
    Overdue,
}

impl fmt::Display for HoldStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_db_str())
    }
}

impl HoldStatus {
    /// 从数据库字符串解析状态
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "pending" => Some(HoldStatus::Pending),
            "approved" => Some(HoldStatus::Approved),
            "rejected" => Some(HoldStatus::Rejected),
            "cancelled" => Some(HoldStatus::Cancelled),
            "completed" => Some(HoldStatus::Completed),
            "borrowed" => Some(HoldStatus::Borrowed),
            "returned" => Some(HoldStatus::Returned),
            "overdue" => Some(HoldStatus::Overdue),
            _ => None,
        }
    }

    /// 转换为数据库存储的字符串
    pub fn to_db_str(&self) -> &'static str {
        match self {
            HoldStatus::Pending => "pending",
            HoldStatus::Approved => "approved",
            HoldStatus::Rejected => "rejected",
            HoldStatus::Cancelled => "cancelled",
            HoldStatus::Completed => "completed",
            HoldStatus::Borrowed => "borrowed",
            HoldStatus::Returned => "returned",
            HoldStatus::Overdue => "overdue",
        }
    }

    /// 是否终态 (终态之后不允许任何迁移)
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            HoldStatus::Rejected
                | HoldStatus::Cancelled
                | HoldStatus::Completed
                | HoldStatus::Returned
        )
    }
}

// ==========================================
// 鱼池状态 (Pond Status)
// ==========================================
// maintenance 状态的鱼池不参与可用性计算
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PondStatus {
    Available,
    Occupied,
    Maintenance,
}

impl fmt::Display for PondStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_db_str())
    }
}

impl PondStatus {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "available" => Some(PondStatus::Available),
            "occupied" => Some(PondStatus::Occupied),
            "maintenance" => Some(PondStatus::Maintenance),
            _ => None,
        }
    }

    pub fn to_db_str(&self) -> &'static str {
        match self {
            PondStatus::Available => "available",
            PondStatus::Occupied => "occupied",
            PondStatus::Maintenance => "maintenance",
        }
    }
}

// ==========================================
// 鱼池规格 (Pond Size Class)
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PondSizeClass {
    Small,
    Medium,
    Large,
}

impl fmt::Display for PondSizeClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_db_str())
    }
}

impl PondSizeClass {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "small" => Some(PondSizeClass::Small),
            "medium" => Some(PondSizeClass::Medium),
            "large" => Some(PondSizeClass::Large),
            _ => None,
        }
    }

    pub fn to_db_str(&self) -> &'static str {
        match self {
            PondSizeClass::Small => "small",
            PondSizeClass::Medium => "medium",
            PondSizeClass::Large => "large",
        }
    }
}

// ==========================================
// 目录状态 (Catalog Status)
// ==========================================
// 器材/物资共用: 软停用, 不物理删除
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CatalogStatus {
    Active,
    Inactive,
}

impl fmt::Display for CatalogStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_db_str())
    }
}

impl CatalogStatus {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "active" => Some(CatalogStatus::Active),
            "inactive" => Some(CatalogStatus::Inactive),
            _ => None,
        }
    }

    pub fn to_db_str(&self) -> &'static str {
        match self {
            CatalogStatus::Active => "active",
            CatalogStatus::Inactive => "inactive",
        }
    }
}

// ==========================================
// 台账记账类别 (Ledger Entry Kind)
// ==========================================
// in: 入库, out: 出库, adjust: 盘点调整
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LedgerEntryKind {
    In,
    Out,
    Adjust,
}

impl fmt::Display for LedgerEntryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_db_str())
    }
}

impl LedgerEntryKind {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "in" => Some(LedgerEntryKind::In),
            "out" => Some(LedgerEntryKind::Out),
            "adjust" => Some(LedgerEntryKind::Adjust),
            _ => None,
        }
    }

    pub fn to_db_str(&self) -> &'static str {
        match self {
            LedgerEntryKind::In => "in",
            LedgerEntryKind::Out => "out",
            LedgerEntryKind::Adjust => "adjust",
        }
    }
}

// ==========================================
// 日期窗口 (Date Window)
// ==========================================
// 闭区间 [start, end], 按自然日计算
// start == end 表示单日使用, 合法
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateWindow {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateWindow {
    /// 构造窗口, end 早于 start 时返回 None
    pub fn new(start: NaiveDate, end: NaiveDate) -> Option<Self> {
        if end < start {
            return None;
        }
        Some(DateWindow { start, end })
    }

    /// 闭区间重叠判定: existing.start <= requested.end AND existing.end >= requested.start
    pub fn overlaps(&self, other: &DateWindow) -> bool {
        self.start <= other.end && self.end >= other.start
    }

    /// 窗口天数 (闭区间, 单日窗口为 1 天)
    pub fn days(&self) -> i64 {
        (self.end - self.start).num_days() + 1
    }

    /// 窗口是否已整体过期 (end 早于给定日期)
    pub fn ended_before(&self, date: NaiveDate) -> bool {
        self.end < date
    }
}

impl fmt::Display for DateWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}, {}]",
            self.start.format("%Y-%m-%d"),
            self.end.format("%Y-%m-%d")
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn test_hold_status_round_trip() {
        for s in [
            HoldStatus::Pending,
            HoldStatus::Approved,
            HoldStatus::Rejected,
            HoldStatus::Cancelled,
            HoldStatus::Completed,
            HoldStatus::Borrowed,
            HoldStatus::Returned,
            HoldStatus::Overdue,
        ] {
            assert_eq!(HoldStatus::from_str(s.to_db_str()), Some(s));
        }
        assert_eq!(HoldStatus::from_str("unknown"), None);
    }

    #[test]
    fn test_hold_status_terminal() {
        assert!(HoldStatus::Rejected.is_terminal());
        assert!(HoldStatus::Cancelled.is_terminal());
        assert!(HoldStatus::Completed.is_terminal());
        assert!(HoldStatus::Returned.is_terminal());
        // overdue 仍可归还, 不是终态
        assert!(!HoldStatus::Overdue.is_terminal());
        assert!(!HoldStatus::Pending.is_terminal());
        assert!(!HoldStatus::Approved.is_terminal());
        assert!(!HoldStatus::Borrowed.is_terminal());
    }

    #[test]
    fn test_date_window_ordering() {
        assert!(DateWindow::new(d(2025, 1, 10), d(2025, 1, 9)).is_none());
        // 单日窗口合法
        let w = DateWindow::new(d(2025, 1, 10), d(2025, 1, 10)).unwrap();
        assert_eq!(w.days(), 1);
    }

    #[test]
    fn test_date_window_overlap_inclusive() {
        let base = DateWindow::new(d(2025, 1, 10), d(2025, 1, 20)).unwrap();

        // 完全重叠
        assert!(base.overlaps(&DateWindow::new(d(2025, 1, 12), d(2025, 1, 18)).unwrap()));
        // 部分重叠
        assert!(base.overlaps(&DateWindow::new(d(2025, 1, 15), d(2025, 1, 25)).unwrap()));
        // 边界日重叠 (闭区间语义)
        assert!(base.overlaps(&DateWindow::new(d(2025, 1, 20), d(2025, 1, 25)).unwrap()));
        assert!(base.overlaps(&DateWindow::new(d(2025, 1, 1), d(2025, 1, 10)).unwrap()));
        // 不重叠
        assert!(!base.overlaps(&DateWindow::new(d(2025, 1, 21), d(2025, 1, 25)).unwrap()));
        assert!(!base.overlaps(&DateWindow::new(d(2025, 1, 1), d(2025, 1, 9)).unwrap()));
    }
}
