// ==========================================
// 渔场设施预定与物资管理系统 - 取消申请数据仓储
// ==========================================

use crate::domain::cancellation::CancellationRequest;
use crate::domain::types::HoldStatus;
use crate::repository::error::{RepositoryError, RepositoryResult};
use chrono::NaiveDateTime;
use rusqlite::{params, Connection, OptionalExtension, Result as SqliteResult, Row};
use std::sync::{Arc, Mutex};

const CANCELLATION_COLUMNS: &str = r#"
    c.id, c.reservation_id, c.reason, c.phone, c.status,
    c.decided_by, c.decided_at, c.created_at,
    p.pond_code, r.user_name
"#;

/// 预定取消申请仓储
/// 职责: 管理 cancellation_requests 表的插入与查询
pub struct CancellationRepository {
    conn: Arc<Mutex<Connection>>,
}

impl CancellationRepository {
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    fn get_conn(&self) -> RepositoryResult<std::sync::MutexGuard<Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    /// 插入取消申请
    pub fn insert(&self, request: &CancellationRequest) -> RepositoryResult<String> {
        let conn = self.get_conn()?;
        conn.execute(
            r#"
            INSERT INTO cancellation_requests (
                id, reservation_id, reason, phone, status,
                decided_by, decided_at, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            "#,
            params![
                request.id,
                request.reservation_id,
                request.reason,
                request.phone,
                request.status.to_db_str(),
                request.decided_by,
                request
                    .decided_at
                    .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string()),
                request.created_at.format("%Y-%m-%d %H:%M:%S").to_string(),
            ],
        )?;
        Ok(request.id.clone())
    }

    /// 按主键查询取消申请
    pub fn find_by_id(&self, id: &str) -> RepositoryResult<Option<CancellationRequest>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(&format!(
            r#"
            SELECT {CANCELLATION_COLUMNS}
            FROM cancellation_requests c
            JOIN pond_reservations r ON c.reservation_id = r.id
            JOIN ponds p ON r.pond_id = p.id
            WHERE c.id = ?1
            "#
        ))?;

        let request = stmt
            .query_row(params![id], map_cancellation_row)
            .optional()?;
        Ok(request)
    }

    /// 查询全部取消申请
    pub fn find_all(&self) -> RepositoryResult<Vec<CancellationRequest>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(&format!(
            r#"
            SELECT {CANCELLATION_COLUMNS}
            FROM cancellation_requests c
            JOIN pond_reservations r ON c.reservation_id = r.id
            JOIN ponds p ON r.pond_id = p.id
            ORDER BY c.created_at DESC
            "#
        ))?;

        let requests = stmt
            .query_map([], map_cancellation_row)?
            .collect::<SqliteResult<Vec<_>>>()?;
        Ok(requests)
    }

    /// 按状态查询取消申请
    pub fn find_by_status(&self, status: HoldStatus) -> RepositoryResult<Vec<CancellationRequest>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(&format!(
            r#"
            SELECT {CANCELLATION_COLUMNS}
            FROM cancellation_requests c
            JOIN pond_reservations r ON c.reservation_id = r.id
            JOIN ponds p ON r.pond_id = p.id
            WHERE c.status = ?1
            ORDER BY c.created_at DESC
            "#
        ))?;

        let requests = stmt
            .query_map(params![status.to_db_str()], map_cancellation_row)?
            .collect::<SqliteResult<Vec<_>>>()?;
        Ok(requests)
    }

    /// 查询某预定单下待处理的取消申请 (防重复提交)
    pub fn find_pending_by_reservation(
        &self,
        reservation_id: &str,
    ) -> RepositoryResult<Option<CancellationRequest>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(&format!(
            r#"
            SELECT {CANCELLATION_COLUMNS}
            FROM cancellation_requests c
            JOIN pond_reservations r ON c.reservation_id = r.id
            JOIN ponds p ON r.pond_id = p.id
            WHERE c.reservation_id = ?1 AND c.status = 'pending'
            "#
        ))?;

        let request = stmt
            .query_row(params![reservation_id], map_cancellation_row)
            .optional()?;
        Ok(request)
    }

    /// 待处理取消申请数量
    pub fn count_pending(&self) -> RepositoryResult<i64> {
        let conn = self.get_conn()?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM cancellation_requests WHERE status = 'pending'",
            [],
            |row| row.get(0),
        )?;
        Ok(count)
    }
}

/// 行映射: cancellation_requests 联 pond_reservations/ponds -> CancellationRequest
fn map_cancellation_row(row: &Row) -> SqliteResult<CancellationRequest> {
    let status_str: String = row.get(4)?;
    let decided_at_str: Option<String> = row.get(6)?;
    let created_at_str: String = row.get(7)?;

    let status = HoldStatus::from_str(&status_str).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            4,
            rusqlite::types::Type::Text,
            format!("未知取消申请状态: {}", status_str).into(),
        )
    })?;
    let decided_at = decided_at_str
        .and_then(|s| NaiveDateTime::parse_from_str(&s, "%Y-%m-%d %H:%M:%S").ok());
    let created_at = NaiveDateTime::parse_from_str(&created_at_str, "%Y-%m-%d %H:%M:%S")
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(7, rusqlite::types::Type::Text, Box::new(e))
        })?;

    Ok(CancellationRequest {
        id: row.get(0)?,
        reservation_id: row.get(1)?,
        reason: row.get(2)?,
        phone: row.get(3)?,
        status,
        decided_by: row.get(5)?,
        decided_at,
        created_at,
        pond_code: row.get(8)?,
        reservation_user_name: row.get(9)?,
    })
}
