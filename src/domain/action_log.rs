// ==========================================
// 渔场设施预定与物资管理系统 - 操作日志领域模型
// ==========================================
// 红线: 所有状态迁移与出入库必须记录
// 记录失败只打日志, 不回滚触发它的业务事务
// 对齐: scripts/schema.sql action_logs 表
// ==========================================

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

// ==========================================
// ActionLog - 操作日志
// ==========================================
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionLog {
    // ===== 主键 =====
    pub log_id: String,            // 日志ID (UUID)
    pub action_type: String,       // 操作类型 (存储为字符串)
    pub created_at: NaiveDateTime, // 操作时间戳

    // ===== 关联实体 (按需填写) =====
    pub pond_id: Option<i64>,
    pub reservation_id: Option<String>,
    pub loan_id: Option<String>,
    pub requisition_id: Option<String>,
    pub item_id: Option<i64>,

    // ===== 操作人与描述 =====
    pub actor_id: Option<String>,
    pub details: Option<String>,
}

// ==========================================
// ActionType - 操作类型
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ActionType {
    // ===== 鱼池预定 =====
    SubmitReservation,
    ApproveReservation,
    RejectReservation,
    CancelReservation,
    CompleteReservation,
    // ===== 器材借用 =====
    SubmitLoan,
    ApproveLoan,
    RejectLoan,
    CancelLoan,
    MarkBorrowed,
    MarkReturned,
    MarkOverdue,
    // ===== 物资领用与台账 =====
    SubmitRequisition,
    ApproveRequisition,
    RejectRequisition,
    CancelRequisition,
    StockIn,
    StockOut,
    StockAdjust,
    // ===== 取消申请 =====
    SubmitCancellation,
    ApproveCancellation,
    RejectCancellation,
    // ===== 目录维护 =====
    PondStatusChange,
    CatalogChange,
    // ===== 运行参数 =====
    ConfigChange,
}

impl ActionType {
    /// 转换为字符串 (用于数据库存储)
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionType::SubmitReservation => "SubmitReservation",
            ActionType::ApproveReservation => "ApproveReservation",
            ActionType::RejectReservation => "RejectReservation",
            ActionType::CancelReservation => "CancelReservation",
            ActionType::CompleteReservation => "CompleteReservation",
            ActionType::SubmitLoan => "SubmitLoan",
            ActionType::ApproveLoan => "ApproveLoan",
            ActionType::RejectLoan => "RejectLoan",
            ActionType::CancelLoan => "CancelLoan",
            ActionType::MarkBorrowed => "MarkBorrowed",
            ActionType::MarkReturned => "MarkReturned",
            ActionType::MarkOverdue => "MarkOverdue",
            ActionType::SubmitRequisition => "SubmitRequisition",
            ActionType::ApproveRequisition => "ApproveRequisition",
            ActionType::RejectRequisition => "RejectRequisition",
            ActionType::CancelRequisition => "CancelRequisition",
            ActionType::StockIn => "StockIn",
            ActionType::StockOut => "StockOut",
            ActionType::StockAdjust => "StockAdjust",
            ActionType::SubmitCancellation => "SubmitCancellation",
            ActionType::ApproveCancellation => "ApproveCancellation",
            ActionType::RejectCancellation => "RejectCancellation",
            ActionType::PondStatusChange => "PondStatusChange",
            ActionType::CatalogChange => "CatalogChange",
            ActionType::ConfigChange => "ConfigChange",
        }
    }

    /// 从字符串解析
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "SubmitReservation" => Some(ActionType::SubmitReservation),
            "ApproveReservation" => Some(ActionType::ApproveReservation),
            "RejectReservation" => Some(ActionType::RejectReservation),
            "CancelReservation" => Some(ActionType::CancelReservation),
            "CompleteReservation" => Some(ActionType::CompleteReservation),
            "SubmitLoan" => Some(ActionType::SubmitLoan),
            "ApproveLoan" => Some(ActionType::ApproveLoan),
            "RejectLoan" => Some(ActionType::RejectLoan),
            "CancelLoan" => Some(ActionType::CancelLoan),
            "MarkBorrowed" => Some(ActionType::MarkBorrowed),
            "MarkReturned" => Some(ActionType::MarkReturned),
            "MarkOverdue" => Some(ActionType::MarkOverdue),
            "SubmitRequisition" => Some(ActionType::SubmitRequisition),
            "ApproveRequisition" => Some(ActionType::ApproveRequisition),
            "RejectRequisition" => Some(ActionType::RejectRequisition),
            "CancelRequisition" => Some(ActionType::CancelRequisition),
            "StockIn" => Some(ActionType::StockIn),
            "StockOut" => Some(ActionType::StockOut),
            "StockAdjust" => Some(ActionType::StockAdjust),
            "SubmitCancellation" => Some(ActionType::SubmitCancellation),
            "ApproveCancellation" => Some(ActionType::ApproveCancellation),
            "RejectCancellation" => Some(ActionType::RejectCancellation),
            "PondStatusChange" => Some(ActionType::PondStatusChange),
            "CatalogChange" => Some(ActionType::CatalogChange),
            "ConfigChange" => Some(ActionType::ConfigChange),
            _ => None,
        }
    }
}

// ==========================================
// ActionLog 辅助方法
// ==========================================
impl ActionLog {
    /// 创建新的操作日志
    ///
    /// # 参数
    /// - `action_type`: 操作类型
    /// - `actor_id`: 操作人 (管理员 ID 或渠道用户 ID, 可选)
    pub fn new(action_type: ActionType, actor_id: Option<String>) -> Self {
        Self {
            log_id: uuid::Uuid::new_v4().to_string(),
            action_type: action_type.as_str().to_string(),
            created_at: chrono::Local::now().naive_local(),
            pond_id: None,
            reservation_id: None,
            loan_id: None,
            requisition_id: None,
            item_id: None,
            actor_id,
            details: None,
        }
    }

    pub fn with_pond(mut self, pond_id: i64) -> Self {
        self.pond_id = Some(pond_id);
        self
    }

    pub fn with_reservation(mut self, reservation_id: &str) -> Self {
        self.reservation_id = Some(reservation_id.to_string());
        self
    }

    pub fn with_loan(mut self, loan_id: &str) -> Self {
        self.loan_id = Some(loan_id.to_string());
        self
    }

    pub fn with_requisition(mut self, requisition_id: &str) -> Self {
        self.requisition_id = Some(requisition_id.to_string());
        self
    }

    pub fn with_item(mut self, item_id: i64) -> Self {
        self.item_id = Some(item_id);
        self
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }
}
