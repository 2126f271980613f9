// ==========================================
// 渔场设施预定与物资管理系统 - 操作者上下文
// ==========================================
// 职责: 每次状态机调用显式携带操作者身份
// 红线: 不使用任何全局会话状态
// ==========================================

use serde::{Deserialize, Serialize};
use std::fmt;

/// 操作者角色
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActorRole {
    /// 管理员: 可执行审批/驳回/出入库等管理操作
    Admin,
    /// 申请人: 仅可提交与取消本人的单据
    Requester,
}

impl fmt::Display for ActorRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ActorRole::Admin => write!(f, "admin"),
            ActorRole::Requester => write!(f, "requester"),
        }
    }
}

/// 操作者上下文
///
/// 管理员的 `actor_id` 为 admins 表主键的字符串形式;
/// 申请人的 `channel_user_id` 用于取消操作的归属校验。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActorContext {
    pub actor_id: String,
    pub role: ActorRole,
    /// 外部消息渠道用户 ID (申请人可选)
    pub channel_user_id: Option<String>,
}

impl ActorContext {
    /// 管理员上下文
    pub fn admin(admin_id: i64) -> Self {
        ActorContext {
            actor_id: admin_id.to_string(),
            role: ActorRole::Admin,
            channel_user_id: None,
        }
    }

    /// 申请人上下文 (携带渠道用户 ID)
    pub fn requester(channel_user_id: &str) -> Self {
        ActorContext {
            actor_id: channel_user_id.to_string(),
            role: ActorRole::Requester,
            channel_user_id: Some(channel_user_id.to_string()),
        }
    }

    pub fn is_admin(&self) -> bool {
        self.role == ActorRole::Admin
    }

    /// 管理员数值 ID (申请人返回 None)
    pub fn admin_id(&self) -> Option<i64> {
        if self.role == ActorRole::Admin {
            self.actor_id.parse::<i64>().ok()
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_admin_context() {
        let ctx = ActorContext::admin(7);
        assert!(ctx.is_admin());
        assert_eq!(ctx.admin_id(), Some(7));
        assert!(ctx.channel_user_id.is_none());
    }

    #[test]
    fn test_requester_context() {
        let ctx = ActorContext::requester("U1234567890");
        assert!(!ctx.is_admin());
        assert_eq!(ctx.admin_id(), None);
        assert_eq!(ctx.channel_user_id.as_deref(), Some("U1234567890"));
    }
}
