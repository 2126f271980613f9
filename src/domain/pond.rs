// ==========================================
// 渔场设施预定与物资管理系统 - 鱼池领域模型
// ==========================================
// 鱼池为排他资源: 同一时间窗口内至多一张占用单
// 可用性口径: pending 与 approved 均计入占用 (防并发提交互相饿死)
// ==========================================

use crate::domain::types::{DateWindow, HoldStatus, PondSizeClass, PondStatus};
use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

// ==========================================
// Pond - 鱼池目录实体
// ==========================================
// 对齐: scripts/schema.sql ponds 表
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Pond {
    pub id: i64,
    pub pond_code: String,          // 池号 (如 A1, C12)
    pub zone: String,               // 场区分区 (A-G)
    pub name: Option<String>,
    pub size_class: PondSizeClass,
    pub status: PondStatus,

    // ===== 平面图位置 (百分比) =====
    pub pos_x: Option<f64>,
    pub pos_y: Option<f64>,
    pub width: Option<f64>,
    pub height: Option<f64>,

    pub created_at: NaiveDateTime,
}

// ==========================================
// PondReservation - 鱼池预定单
// ==========================================
// 对齐: scripts/schema.sql pond_reservations 表
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PondReservation {
    pub id: String,                 // UUID
    pub pond_id: i64,
    /// 联表展示字段 (列表查询时填充)
    pub pond_code: Option<String>,

    // ===== 申请人信息 =====
    pub user_name: String,
    pub fish_type: Option<String>,
    pub fish_quantity: Option<i64>,
    pub phone: Option<String>,
    pub channel_user_id: Option<String>,

    // ===== 使用窗口 (闭区间自然日) =====
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,

    // ===== 状态机字段 =====
    pub status: HoldStatus,
    pub reject_reason: Option<String>,
    pub decided_by: Option<i64>,
    pub decided_at: Option<NaiveDateTime>,

    pub created_at: NaiveDateTime,
}

impl PondReservation {
    pub fn window(&self) -> DateWindow {
        DateWindow {
            start: self.start_date,
            end: self.end_date,
        }
    }

    /// 距离到期剩余天数 (负数表示已过期)
    pub fn days_until_end(&self, today: NaiveDate) -> i64 {
        (self.end_date - today).num_days()
    }
}

// ==========================================
// ReservationDraft - 提交预定的入参
// ==========================================
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReservationDraft {
    pub pond_id: i64,
    pub user_name: String,
    pub fish_type: Option<String>,
    pub fish_quantity: Option<i64>,
    pub phone: Option<String>,
    pub channel_user_id: Option<String>,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
}
