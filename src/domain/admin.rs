// ==========================================
// 渔场设施预定与物资管理系统 - 管理员领域模型
// ==========================================
// 认证本身不在核心范围内; 这里只承载审批记录里的
// decided_by 外键与目录维护
// ==========================================

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Admin {
    pub id: i64,
    pub username: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub name: String,
    pub role: String,
    pub created_at: NaiveDateTime,
}
