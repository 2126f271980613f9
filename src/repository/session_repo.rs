// ==========================================
// 渔场设施预定与物资管理系统 - 会话状态数据仓储
// ==========================================
// state 列存 ConversationState 的 JSON 序列化,
// 解析失败按损坏会话处理, 由 services::session_service 负责重置
// ==========================================

use crate::domain::session::{ConversationState, UserSession};
use crate::repository::error::{RepositoryError, RepositoryResult};
use chrono::NaiveDateTime;
use rusqlite::{params, Connection, OptionalExtension};
use std::sync::{Arc, Mutex};

/// 会话状态仓储
pub struct SessionRepository {
    conn: Arc<Mutex<Connection>>,
}

impl SessionRepository {
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    fn get_conn(&self) -> RepositoryResult<std::sync::MutexGuard<Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    /// 写入或覆盖某用户的会话状态
    pub fn upsert(
        &self,
        channel_user_id: &str,
        state: &ConversationState,
    ) -> RepositoryResult<()> {
        let conn = self.get_conn()?;
        let state_json = serde_json::to_string(state)?;
        conn.execute(
            r#"
            INSERT INTO user_sessions (channel_user_id, state, updated_at)
            VALUES (?1, ?2, datetime('now', 'localtime'))
            ON CONFLICT(channel_user_id)
            DO UPDATE SET state = excluded.state, updated_at = excluded.updated_at
            "#,
            params![channel_user_id, state_json],
        )?;
        Ok(())
    }

    /// 读取某用户的会话状态
    pub fn find(&self, channel_user_id: &str) -> RepositoryResult<Option<UserSession>> {
        let conn = self.get_conn()?;
        let row = conn
            .query_row(
                "SELECT channel_user_id, state, updated_at FROM user_sessions WHERE channel_user_id = ?1",
                params![channel_user_id],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                    ))
                },
            )
            .optional()?;

        match row {
            Some((channel_user_id, state_json, updated_at_str)) => {
                let state: ConversationState = serde_json::from_str(&state_json)?;
                let updated_at =
                    NaiveDateTime::parse_from_str(&updated_at_str, "%Y-%m-%d %H:%M:%S")
                        .map_err(|e| RepositoryError::FieldValueError {
                            field: "updated_at".to_string(),
                            message: e.to_string(),
                        })?;
                Ok(Some(UserSession {
                    channel_user_id,
                    state,
                    updated_at,
                }))
            }
            None => Ok(None),
        }
    }

    /// 删除某用户的会话状态
    pub fn delete(&self, channel_user_id: &str) -> RepositoryResult<()> {
        let conn = self.get_conn()?;
        conn.execute(
            "DELETE FROM user_sessions WHERE channel_user_id = ?1",
            params![channel_user_id],
        )?;
        Ok(())
    }

    /// 清理超时会话, 返回清理条数
    pub fn purge_older_than(&self, cutoff: NaiveDateTime) -> RepositoryResult<usize> {
        let conn = self.get_conn()?;
        let purged = conn.execute(
            "DELETE FROM user_sessions WHERE updated_at < ?1",
            params![cutoff.format("%Y-%m-%d %H:%M:%S").to_string()],
        )?;
        Ok(purged)
    }

    /// 当前会话数 (看板)
    pub fn count(&self) -> RepositoryResult<i64> {
        let conn = self.get_conn()?;
        let count: i64 =
            conn.query_row("SELECT COUNT(*) FROM user_sessions", [], |row| row.get(0))?;
        Ok(count)
    }
}
