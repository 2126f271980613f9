// ==========================================
// 渔场设施预定与物资管理系统 - 会话状态领域模型
// ==========================================
// 聊天机器人多轮对话的逐步收集状态
// 红线: 对话状态用带标签联合类型建模, 不用自由 JSON 字典,
//       未知载荷解析即失败而不是带病运行
// ==========================================

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

// ==========================================
// ConversationState - 对话步骤 (带标签联合)
// ==========================================
// 鱼池预定对话: 姓名 -> 鱼种 -> 数量 -> 起始日期 -> 月数 -> 确认
// 每一步携带此前已收集的字段
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "step", content = "data", rename_all = "snake_case")]
pub enum ConversationState {
    /// 空闲 (无进行中的对话)
    Idle,
    /// 已选池, 等待输入姓名
    AwaitingName { pond_id: i64 },
    /// 等待输入鱼种
    AwaitingFishType { pond_id: i64, user_name: String },
    /// 等待输入投放数量
    AwaitingQuantity {
        pond_id: i64,
        user_name: String,
        fish_type: String,
    },
    /// 等待输入起始日期
    AwaitingStartDate {
        pond_id: i64,
        user_name: String,
        fish_type: String,
        fish_quantity: i64,
    },
    /// 等待输入承包月数
    AwaitingDuration {
        pond_id: i64,
        user_name: String,
        fish_type: String,
        fish_quantity: i64,
        start_date: NaiveDate,
    },
    /// 等待确认提交
    AwaitingConfirm {
        pond_id: i64,
        user_name: String,
        fish_type: String,
        fish_quantity: i64,
        start_date: NaiveDate,
        end_date: NaiveDate,
    },
}

impl ConversationState {
    /// 步骤名 (用于日志与调试)
    pub fn step_name(&self) -> &'static str {
        match self {
            ConversationState::Idle => "idle",
            ConversationState::AwaitingName { .. } => "awaiting_name",
            ConversationState::AwaitingFishType { .. } => "awaiting_fish_type",
            ConversationState::AwaitingQuantity { .. } => "awaiting_quantity",
            ConversationState::AwaitingStartDate { .. } => "awaiting_start_date",
            ConversationState::AwaitingDuration { .. } => "awaiting_duration",
            ConversationState::AwaitingConfirm { .. } => "awaiting_confirm",
        }
    }
}

// ==========================================
// UserSession - 会话记录
// ==========================================
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserSession {
    pub channel_user_id: String,
    pub state: ConversationState,
    pub updated_at: NaiveDateTime,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn test_state_json_round_trip() {
        let state = ConversationState::AwaitingDuration {
            pond_id: 12,
            user_name: "张三".to_string(),
            fish_type: "草鱼".to_string(),
            fish_quantity: 800,
            start_date: NaiveDate::from_ymd_opt(2025, 3, 1).unwrap(),
        };

        let json = serde_json::to_string(&state).unwrap();
        let parsed: ConversationState = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, state);
        assert_eq!(parsed.step_name(), "awaiting_duration");
    }

    #[test]
    fn test_unknown_step_fails_parse() {
        let json = r#"{"step":"awaiting_magic","data":{"pond_id":1}}"#;
        let parsed: Result<ConversationState, _> = serde_json::from_str(json);
        assert!(parsed.is_err());
    }

    #[test]
    fn test_idle_round_trip() {
        let json = serde_json::to_string(&ConversationState::Idle).unwrap();
        let parsed: ConversationState = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, ConversationState::Idle);
    }
}
