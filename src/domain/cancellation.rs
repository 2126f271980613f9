// ==========================================
// 渔场设施预定与物资管理系统 - 取消申请领域模型
// ==========================================
// 取消申请是挂在鱼池预定单上的二级单据:
// 批准取消申请时, 底层预定单在同一事务内迁移到 cancelled
// ==========================================

use crate::domain::types::HoldStatus;
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CancellationRequest {
    pub id: String,                 // UUID
    pub reservation_id: String,
    pub reason: Option<String>,
    pub phone: Option<String>,

    /// 仅使用 pending / approved / rejected 三态
    pub status: HoldStatus,
    pub decided_by: Option<i64>,
    pub decided_at: Option<NaiveDateTime>,

    pub created_at: NaiveDateTime,

    // ===== 联表展示字段 =====
    pub pond_code: Option<String>,
    pub reservation_user_name: Option<String>,
}
