// ==========================================
// 渔场设施预定与物资管理系统 - 操作日志数据仓储
// ==========================================
// 只追加审计流水; 记录失败不应回滚业务事务,
// 调用方对 insert 的错误只告警不上抛
// ==========================================

use crate::domain::action_log::ActionLog;
use crate::repository::error::{RepositoryError, RepositoryResult};
use chrono::NaiveDateTime;
use rusqlite::{params, Connection, Result as SqliteResult, Row};
use std::sync::{Arc, Mutex};

const LOG_COLUMNS: &str = r#"
    log_id, action_type, pond_id, reservation_id, loan_id,
    requisition_id, item_id, actor_id, details, created_at
"#;

/// 操作日志仓储
pub struct ActionLogRepository {
    conn: Arc<Mutex<Connection>>,
}

impl ActionLogRepository {
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    fn get_conn(&self) -> RepositoryResult<std::sync::MutexGuard<Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    /// 追加一条操作日志
    pub fn insert(&self, log: &ActionLog) -> RepositoryResult<()> {
        let conn = self.get_conn()?;
        conn.execute(
            r#"
            INSERT INTO action_logs (
                log_id, action_type, pond_id, reservation_id, loan_id,
                requisition_id, item_id, actor_id, details, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
            "#,
            params![
                log.log_id,
                log.action_type,
                log.pond_id,
                log.reservation_id,
                log.loan_id,
                log.requisition_id,
                log.item_id,
                log.actor_id,
                log.details,
                log.created_at.format("%Y-%m-%d %H:%M:%S").to_string(),
            ],
        )?;
        Ok(())
    }

    /// 最近 N 条日志 (看板与排障)
    pub fn find_recent(&self, limit: i64) -> RepositoryResult<Vec<ActionLog>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(&format!(
            r#"
            SELECT {LOG_COLUMNS} FROM action_logs
            ORDER BY created_at DESC, log_id DESC
            LIMIT ?1
            "#
        ))?;

        let logs = stmt
            .query_map(params![limit], map_log_row)?
            .collect::<SqliteResult<Vec<_>>>()?;
        Ok(logs)
    }

    /// 按操作类型查询
    pub fn find_by_action_type(&self, action_type: &str) -> RepositoryResult<Vec<ActionLog>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(&format!(
            r#"
            SELECT {LOG_COLUMNS} FROM action_logs
            WHERE action_type = ?1
            ORDER BY created_at DESC, log_id DESC
            "#
        ))?;

        let logs = stmt
            .query_map(params![action_type], map_log_row)?
            .collect::<SqliteResult<Vec<_>>>()?;
        Ok(logs)
    }

    /// 某预定单的完整操作轨迹
    pub fn find_by_reservation(&self, reservation_id: &str) -> RepositoryResult<Vec<ActionLog>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(&format!(
            r#"
            SELECT {LOG_COLUMNS} FROM action_logs
            WHERE reservation_id = ?1
            ORDER BY created_at, log_id
            "#
        ))?;

        let logs = stmt
            .query_map(params![reservation_id], map_log_row)?
            .collect::<SqliteResult<Vec<_>>>()?;
        Ok(logs)
    }

    /// 某借用单的完整操作轨迹
    pub fn find_by_loan(&self, loan_id: &str) -> RepositoryResult<Vec<ActionLog>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(&format!(
            r#"
            SELECT {LOG_COLUMNS} FROM action_logs
            WHERE loan_id = ?1
            ORDER BY created_at, log_id
            "#
        ))?;

        let logs = stmt
            .query_map(params![loan_id], map_log_row)?
            .collect::<SqliteResult<Vec<_>>>()?;
        Ok(logs)
    }

    /// 某领用申请的完整操作轨迹
    pub fn find_by_requisition(&self, requisition_id: &str) -> RepositoryResult<Vec<ActionLog>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(&format!(
            r#"
            SELECT {LOG_COLUMNS} FROM action_logs
            WHERE requisition_id = ?1
            ORDER BY created_at, log_id
            "#
        ))?;

        let logs = stmt
            .query_map(params![requisition_id], map_log_row)?
            .collect::<SqliteResult<Vec<_>>>()?;
        Ok(logs)
    }

    /// 日志总条数
    pub fn count(&self) -> RepositoryResult<i64> {
        let conn = self.get_conn()?;
        let count: i64 =
            conn.query_row("SELECT COUNT(*) FROM action_logs", [], |row| row.get(0))?;
        Ok(count)
    }
}

fn map_log_row(row: &Row) -> SqliteResult<ActionLog> {
    let created_at_str: String = row.get(9)?;
    let created_at = NaiveDateTime::parse_from_str(&created_at_str, "%Y-%m-%d %H:%M:%S")
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(9, rusqlite::types::Type::Text, Box::new(e))
        })?;

    Ok(ActionLog {
        log_id: row.get(0)?,
        action_type: row.get(1)?,
        pond_id: row.get(2)?,
        reservation_id: row.get(3)?,
        loan_id: row.get(4)?,
        requisition_id: row.get(5)?,
        item_id: row.get(6)?,
        actor_id: row.get(7)?,
        details: row.get(8)?,
        created_at,
    })
}
