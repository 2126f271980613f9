// ==========================================
// 渔场设施预定与物资管理系统 - 会话 API
// ==========================================
// 职责: 消息渠道机器人的预定对话入口
// 渠道适配器只与本层交互: 选池列表 / 开启对话 / 逐步应答 / 退出
// ==========================================

use std::sync::Arc;

use crate::api::error::ApiResult;
use crate::domain::pond::{Pond, PondReservation};
use crate::engine::availability::AvailabilityEngine;
use crate::engine::repositories::ResourceRepositories;
use crate::services::session_service::{SessionReply, SessionService};
use chrono::NaiveDate;

// ==========================================
// SessionApi - 渠道对话
// ==========================================
pub struct SessionApi {
    repos: ResourceRepositories,
    availability: Arc<AvailabilityEngine>,
    sessions: Arc<SessionService>,
}

impl SessionApi {
    pub fn new(
        repos: ResourceRepositories,
        availability: Arc<AvailabilityEngine>,
        sessions: Arc<SessionService>,
    ) -> Self {
        Self {
            repos,
            availability,
            sessions,
        }
    }

    /// 指定日期可预定的鱼池 (机器人选池菜单)
    pub fn available_ponds(&self, on_date: NaiveDate) -> ApiResult<Vec<Pond>> {
        Ok(self.availability.available_ponds(on_date)?)
    }

    /// 用户在选池菜单中点选鱼池, 开启预定对话
    pub fn start_reservation(
        &self,
        channel_user_id: &str,
        pond_id: i64,
    ) -> ApiResult<SessionReply> {
        Ok(self.sessions.start_reservation(channel_user_id, pond_id)?)
    }

    /// 用户发来一条文本, 按当前对话步骤推进
    pub fn handle_message(&self, channel_user_id: &str, text: &str) -> ApiResult<SessionReply> {
        Ok(self.sessions.handle_message(channel_user_id, text)?)
    }

    /// 用户主动退出对话
    pub fn cancel_dialog(&self, channel_user_id: &str) -> ApiResult<SessionReply> {
        Ok(self.sessions.cancel_dialog(channel_user_id)?)
    }

    /// 该渠道用户名下的预定 (机器人"我的预定")
    pub fn my_reservations(&self, channel_user_id: &str) -> ApiResult<Vec<PondReservation>> {
        Ok(self
            .repos
            .reservation_repo
            .find_by_channel_user(channel_user_id)?)
    }
}
