// ==========================================
// 渔场设施预定与物资管理系统 - 预定对话服务
// ==========================================
// 职责: 鱼池预定的多轮对话推进 (选池 -> 姓名 -> 鱼种 -> 数量
//       -> 起始日期 -> 时长 -> 确认提交)
// 红线: 对话状态机只认 ConversationState 枚举,
//       损坏会话一律重置为 Idle 而不是带病推进;
//       最终提交走 ApprovalService, 本服务不直接写预定表
// ==========================================

use crate::domain::pond::ReservationDraft;
use crate::domain::session::ConversationState;
use crate::domain::types::PondStatus;
use crate::engine::repositories::ResourceRepositories;
use crate::repository::error::{RepositoryError, RepositoryResult};
use crate::services::approval_service::ApprovalService;
use chrono::{Months, NaiveDate};
use std::sync::Arc;

/// 一轮对话的处理结果
#[derive(Debug, Clone)]
pub struct SessionReply {
    /// 回复给用户的文案
    pub text: String,
    /// 本轮处理后的对话步骤 (Idle 表示对话已结束或未开始)
    pub state: ConversationState,
    /// 最终提交成功时携带预定单号
    pub reservation_id: Option<String>,
}

impl SessionReply {
    fn prompt(text: impl Into<String>, state: ConversationState) -> Self {
        Self {
            text: text.into(),
            state,
            reservation_id: None,
        }
    }

    fn finished(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            state: ConversationState::Idle,
            reservation_id: None,
        }
    }
}

// ==========================================
// SessionService - 对话推进
// ==========================================
pub struct SessionService {
    repos: ResourceRepositories,
    approvals: Arc<ApprovalService>,
}

impl SessionService {
    pub fn new(repos: ResourceRepositories, approvals: Arc<ApprovalService>) -> Self {
        Self { repos, approvals }
    }

    /// 从选定鱼池开启预定对话
    ///
    /// 鱼池不存在报 NotFound; 状态不是空闲时不开启对话, 仅回复提示
    pub fn start_reservation(
        &self,
        channel_user_id: &str,
        pond_id: i64,
    ) -> RepositoryResult<SessionReply> {
        let pond = self
            .repos
            .pond_repo
            .find_by_id(pond_id)?
            .ok_or_else(|| RepositoryError::NotFound {
                entity: "鱼池".to_string(),
                id: pond_id.to_string(),
            })?;
        if pond.status != PondStatus::Available {
            return Ok(SessionReply::finished(format!(
                "鱼池 {} 当前不可预定, 请选择其他鱼池",
                pond.pond_code
            )));
        }

        let state = ConversationState::AwaitingName { pond_id };
        self.repos.session_repo.upsert(channel_user_id, &state)?;
        tracing::info!(
            "开启预定对话: user={}, pond={}",
            channel_user_id,
            pond.pond_code
        );
        Ok(SessionReply::prompt(
            format!("开始预定鱼池 {}, 请输入承包人姓名", pond.pond_code),
            state,
        ))
    }

    /// 推进一轮对话
    ///
    /// 依当前步骤解析输入并前进; 无效输入停留在原步骤重新提问
    pub fn handle_message(
        &self,
        channel_user_id: &str,
        text: &str,
    ) -> RepositoryResult<SessionReply> {
        let state = self.load_state(channel_user_id)?;
        let input = text.trim();

        match state {
            ConversationState::Idle => Ok(SessionReply::finished(
                "当前没有进行中的预定对话, 请先在鱼池列表中选择鱼池",
            )),

            ConversationState::AwaitingName { pond_id } => {
                if input.is_empty() {
                    return Ok(SessionReply::prompt(
                        "承包人姓名不能为空, 请重新输入",
                        ConversationState::AwaitingName { pond_id },
                    ));
                }
                self.advance(
                    channel_user_id,
                    ConversationState::AwaitingFishType {
                        pond_id,
                        user_name: input.to_string(),
                    },
                    "请输入养殖鱼种 (如: 草鱼)",
                )
            }

            ConversationState::AwaitingFishType { pond_id, user_name } => {
                if input.is_empty() {
                    return Ok(SessionReply::prompt(
                        "鱼种不能为空, 请重新输入",
                        ConversationState::AwaitingFishType { pond_id, user_name },
                    ));
                }
                self.advance(
                    channel_user_id,
                    ConversationState::AwaitingQuantity {
                        pond_id,
                        user_name,
                        fish_type: input.to_string(),
                    },
                    "请输入投苗数量 (尾)",
                )
            }

            ConversationState::AwaitingQuantity {
                pond_id,
                user_name,
                fish_type,
            } => match input.parse::<i64>() {
                Ok(quantity) if quantity > 0 => self.advance(
                    channel_user_id,
                    ConversationState::AwaitingStartDate {
                        pond_id,
                        user_name,
                        fish_type,
                        fish_quantity: quantity,
                    },
                    "请输入起始日期, 格式如 2025-03-01",
                ),
                _ => Ok(SessionReply::prompt(
                    "请输入大于 0 的整数数量",
                    ConversationState::AwaitingQuantity {
                        pond_id,
                        user_name,
                        fish_type,
                    },
                )),
            },

            ConversationState::AwaitingStartDate {
                pond_id,
                user_name,
                fish_type,
                fish_quantity,
            } => match NaiveDate::parse_from_str(input, "%Y-%m-%d") {
                Ok(start_date) => self.advance(
                    channel_user_id,
                    ConversationState::AwaitingDuration {
                        pond_id,
                        user_name,
                        fish_type,
                        fish_quantity,
                        start_date,
                    },
                    "请输入承包时长 (1-12 个月)",
                ),
                Err(_) => Ok(SessionReply::prompt(
                    "日期格式不正确, 请按 2025-03-01 的格式输入",
                    ConversationState::AwaitingStartDate {
                        pond_id,
                        user_name,
                        fish_type,
                        fish_quantity,
                    },
                )),
            },

            ConversationState::AwaitingDuration {
                pond_id,
                user_name,
                fish_type,
                fish_quantity,
                start_date,
            } => {
                let months = input.parse::<i64>().ok().filter(|m| (1..=12).contains(m));
                let end_date =
                    months.and_then(|m| start_date.checked_add_months(Months::new(m as u32)));
                match end_date {
                    Some(end_date) => {
                        self.confirm_summary(
                            channel_user_id,
                            pond_id,
                            user_name,
                            fish_type,
                            fish_quantity,
                            start_date,
                            end_date,
                        )
                    }
                    None => Ok(SessionReply::prompt(
                        "请输入 1 到 12 之间的月数",
                        ConversationState::AwaitingDuration {
                            pond_id,
                            user_name,
                            fish_type,
                            fish_quantity,
                            start_date,
                        },
                    )),
                }
            }

            ConversationState::AwaitingConfirm {
                pond_id,
                user_name,
                fish_type,
                fish_quantity,
                start_date,
                end_date,
            } => {
                if is_confirm(input) {
                    self.submit(
                        channel_user_id,
                        ReservationDraft {
                            pond_id,
                            user_name,
                            fish_type: Some(fish_type),
                            fish_quantity: Some(fish_quantity),
                            phone: None,
                            channel_user_id: Some(channel_user_id.to_string()),
                            start_date,
                            end_date,
                        },
                    )
                } else if is_abort(input) {
                    self.repos.session_repo.delete(channel_user_id)?;
                    Ok(SessionReply::finished("已取消本次预定"))
                } else {
                    Ok(SessionReply::prompt(
                        "请回复\"确认\"提交申请, 或回复\"取消\"放弃",
                        ConversationState::AwaitingConfirm {
                            pond_id,
                            user_name,
                            fish_type,
                            fish_quantity,
                            start_date,
                            end_date,
                        },
                    ))
                }
            }
        }
    }

    /// 用户主动退出对话
    pub fn cancel_dialog(&self, channel_user_id: &str) -> RepositoryResult<SessionReply> {
        self.repos.session_repo.delete(channel_user_id)?;
        Ok(SessionReply::finished("已退出预定流程"))
    }

    /// 读取当前对话步骤, 损坏会话重置为 Idle
    fn load_state(&self, channel_user_id: &str) -> RepositoryResult<ConversationState> {
        match self.repos.session_repo.find(channel_user_id) {
            Ok(Some(session)) => Ok(session.state),
            Ok(None) => Ok(ConversationState::Idle),
            Err(RepositoryError::FieldValueError { field, message }) => {
                tracing::warn!(
                    "会话状态损坏, 重置: user={}, field={}, err={}",
                    channel_user_id,
                    field,
                    message
                );
                self.repos.session_repo.delete(channel_user_id)?;
                Ok(ConversationState::Idle)
            }
            Err(e) => Err(e),
        }
    }

    fn advance(
        &self,
        channel_user_id: &str,
        next: ConversationState,
        prompt: &str,
    ) -> RepositoryResult<SessionReply> {
        self.repos.session_repo.upsert(channel_user_id, &next)?;
        Ok(SessionReply::prompt(prompt, next))
    }

    /// 汇总已收集字段并进入确认步骤
    #[allow(clippy::too_many_arguments)]
    fn confirm_summary(
        &self,
        channel_user_id: &str,
        pond_id: i64,
        user_name: String,
        fish_type: String,
        fish_quantity: i64,
        start_date: NaiveDate,
        end_date: NaiveDate,
    ) -> RepositoryResult<SessionReply> {
        // 对话期间鱼池可能被删除, 此时终止对话而不是带错提交
        let Some(pond) = self.repos.pond_repo.find_by_id(pond_id)? else {
            self.repos.session_repo.delete(channel_user_id)?;
            return Ok(SessionReply::finished("鱼池信息已变更, 请重新开始预定"));
        };
        let text = format!(
            "请确认预定信息:\n鱼池: {}\n承包人: {}\n鱼种: {}\n数量: {} 尾\n起始: {}\n结束: {}\n回复\"确认\"提交申请, 回复\"取消\"放弃",
            pond.pond_code,
            user_name,
            fish_type,
            fish_quantity,
            start_date.format("%Y-%m-%d"),
            end_date.format("%Y-%m-%d")
        );
        self.advance(
            channel_user_id,
            ConversationState::AwaitingConfirm {
                pond_id,
                user_name,
                fish_type,
                fish_quantity,
                start_date,
                end_date,
            },
            &text,
        )
    }

    /// 确认后的最终提交
    ///
    /// 占用冲突与鱼池失效按对话结果回复, 不向调用方抛错;
    /// 其余错误 (数据库故障等) 原样上抛且保留会话
    fn submit(
        &self,
        channel_user_id: &str,
        draft: ReservationDraft,
    ) -> RepositoryResult<SessionReply> {
        match self.approvals.submit_reservation(draft) {
            Ok(reservation) => {
                self.repos.session_repo.delete(channel_user_id)?;
                Ok(SessionReply {
                    text: format!(
                        "预定申请已提交, 单号 {}, 请等待管理员审核",
                        reservation.id
                    ),
                    state: ConversationState::Idle,
                    reservation_id: Some(reservation.id),
                })
            }
            Err(RepositoryError::CapacityExceeded { resource, .. }) => {
                self.repos.session_repo.delete(channel_user_id)?;
                Ok(SessionReply::finished(format!(
                    "鱼池 {} 在该时段已被占用, 请重新选择日期",
                    resource
                )))
            }
            Err(RepositoryError::NotFound { .. }) => {
                self.repos.session_repo.delete(channel_user_id)?;
                Ok(SessionReply::finished("鱼池信息已变更, 请重新开始预定"))
            }
            Err(e) => Err(e),
        }
    }
}

fn is_confirm(input: &str) -> bool {
    input == "确认" || input.eq_ignore_ascii_case("yes") || input.eq_ignore_ascii_case("y")
}

fn is_abort(input: &str) -> bool {
    input == "取消" || input.eq_ignore_ascii_case("no") || input.eq_ignore_ascii_case("n")
}
