// ==========================================
// 渔场设施预定与物资管理系统 - 鱼池预定数据仓储
// ==========================================
// 红线: Repository 不含业务逻辑
// 状态迁移的"检查+写入"事务由 services::approval_service 持有
// ==========================================

use crate::domain::pond::PondReservation;
use crate::domain::types::{DateWindow, HoldStatus};
use crate::repository::error::{RepositoryError, RepositoryResult};
use chrono::{NaiveDate, NaiveDateTime};
use rusqlite::{params, Connection, OptionalExtension, Result as SqliteResult, Row};
use std::sync::{Arc, Mutex};

const RESERVATION_COLUMNS: &str = r#"
    r.id, r.pond_id, p.pond_code, r.user_name, r.fish_type, r.fish_quantity,
    r.phone, r.channel_user_id, r.start_date, r.end_date, r.status,
    r.reject_reason, r.decided_by, r.decided_at, r.created_at
"#;

// ==========================================
// ReservationRepository - 鱼池预定仓储
// ==========================================

/// 鱼池预定仓储
/// 职责: 管理 pond_reservations 表的插入与查询
pub struct ReservationRepository {
    conn: Arc<Mutex<Connection>>,
}

impl ReservationRepository {
    /// 创建新的预定仓储实例
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    /// 获取数据库连接
    fn get_conn(&self) -> RepositoryResult<std::sync::MutexGuard<Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    /// 插入预定单
    pub fn insert(&self, reservation: &PondReservation) -> RepositoryResult<String> {
        let conn = self.get_conn()?;
        conn.execute(
            r#"
            INSERT INTO pond_reservations (
                id, pond_id, user_name, fish_type, fish_quantity, phone,
                channel_user_id, start_date, end_date, status, reject_reason,
                decided_by, decided_at, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)
            "#,
            params![
                reservation.id,
                reservation.pond_id,
                reservation.user_name,
                reservation.fish_type,
                reservation.fish_quantity,
                reservation.phone,
                reservation.channel_user_id,
                reservation.start_date.format("%Y-%m-%d").to_string(),
                reservation.end_date.format("%Y-%m-%d").to_string(),
                reservation.status.to_db_str(),
                reservation.reject_reason,
                reservation.decided_by,
                reservation
                    .decided_at
                    .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string()),
                reservation.created_at.format("%Y-%m-%d %H:%M:%S").to_string(),
            ],
        )?;
        Ok(reservation.id.clone())
    }

    /// 按主键查询预定单
    pub fn find_by_id(&self, id: &str) -> RepositoryResult<Option<PondReservation>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(&format!(
            r#"
            SELECT {RESERVATION_COLUMNS}
            FROM pond_reservations r
            JOIN ponds p ON r.pond_id = p.id
            WHERE r.id = ?1
            "#
        ))?;

        let reservation = stmt
            .query_row(params![id], map_reservation_row)
            .optional()?;
        Ok(reservation)
    }

    /// 查询全部预定单 (最新提交在前)
    pub fn find_all(&self) -> RepositoryResult<Vec<PondReservation>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(&format!(
            r#"
            SELECT {RESERVATION_COLUMNS}
            FROM pond_reservations r
            JOIN ponds p ON r.pond_id = p.id
            ORDER BY r.created_at DESC
            "#
        ))?;

        let reservations = stmt
            .query_map([], map_reservation_row)?
            .collect::<SqliteResult<Vec<_>>>()?;
        Ok(reservations)
    }

    /// 按状态查询预定单
    pub fn find_by_status(&self, status: HoldStatus) -> RepositoryResult<Vec<PondReservation>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(&format!(
            r#"
            SELECT {RESERVATION_COLUMNS}
            FROM pond_reservations r
            JOIN ponds p ON r.pond_id = p.id
            WHERE r.status = ?1
            ORDER BY r.created_at DESC
            "#
        ))?;

        let reservations = stmt
            .query_map(params![status.to_db_str()], map_reservation_row)?
            .collect::<SqliteResult<Vec<_>>>()?;
        Ok(reservations)
    }

    /// 按鱼池查询预定单
    pub fn find_by_pond(&self, pond_id: i64) -> RepositoryResult<Vec<PondReservation>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(&format!(
            r#"
            SELECT {RESERVATION_COLUMNS}
            FROM pond_reservations r
            JOIN ponds p ON r.pond_id = p.id
            WHERE r.pond_id = ?1
            ORDER BY r.start_date
            "#
        ))?;

        let reservations = stmt
            .query_map(params![pond_id], map_reservation_row)?
            .collect::<SqliteResult<Vec<_>>>()?;
        Ok(reservations)
    }

    /// 按渠道用户查询预定单 (机器人"我的预定")
    pub fn find_by_channel_user(
        &self,
        channel_user_id: &str,
    ) -> RepositoryResult<Vec<PondReservation>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(&format!(
            r#"
            SELECT {RESERVATION_COLUMNS}
            FROM pond_reservations r
            JOIN ponds p ON r.pond_id = p.id
            WHERE r.channel_user_id = ?1
            ORDER BY r.created_at DESC
            "#
        ))?;

        let reservations = stmt
            .query_map(params![channel_user_id], map_reservation_row)?
            .collect::<SqliteResult<Vec<_>>>()?;
        Ok(reservations)
    }

    /// 查询与给定窗口重叠的待审+已批预定 (可用性查询口径)
    ///
    /// # 参数
    /// - `pond_id`: 鱼池
    /// - `window`: 请求窗口 (闭区间, 重叠判定含边界)
    /// - `exclude_id`: 排除的单号 (可选)
    pub fn find_active_overlapping(
        &self,
        pond_id: i64,
        window: DateWindow,
        exclude_id: Option<&str>,
    ) -> RepositoryResult<Vec<PondReservation>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(&format!(
            r#"
            SELECT {RESERVATION_COLUMNS}
            FROM pond_reservations r
            JOIN ponds p ON r.pond_id = p.id
            WHERE r.pond_id = ?1
              AND r.start_date <= ?2
              AND r.end_date >= ?3
              AND r.status IN ('pending', 'approved')
              AND (?4 IS NULL OR r.id != ?4)
            ORDER BY r.start_date
            "#
        ))?;

        let reservations = stmt
            .query_map(
                params![
                    pond_id,
                    window.end.format("%Y-%m-%d").to_string(),
                    window.start.format("%Y-%m-%d").to_string(),
                    exclude_id,
                ],
                map_reservation_row,
            )?
            .collect::<SqliteResult<Vec<_>>>()?;
        Ok(reservations)
    }

    /// 查询与给定窗口重叠的已批准预定 (提交拦截与审批护栏口径)
    pub fn find_approved_overlapping(
        &self,
        pond_id: i64,
        window: DateWindow,
        exclude_id: Option<&str>,
    ) -> RepositoryResult<Vec<PondReservation>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(&format!(
            r#"
            SELECT {RESERVATION_COLUMNS}
            FROM pond_reservations r
            JOIN ponds p ON r.pond_id = p.id
            WHERE r.pond_id = ?1
              AND r.start_date <= ?2
              AND r.end_date >= ?3
              AND r.status = 'approved'
              AND (?4 IS NULL OR r.id != ?4)
            ORDER BY r.start_date
            "#
        ))?;

        let reservations = stmt
            .query_map(
                params![
                    pond_id,
                    window.end.format("%Y-%m-%d").to_string(),
                    window.start.format("%Y-%m-%d").to_string(),
                    exclude_id,
                ],
                map_reservation_row,
            )?
            .collect::<SqliteResult<Vec<_>>>()?;
        Ok(reservations)
    }

    /// 查询指定归还日到期的已批准预定 (到期提醒用)
    pub fn find_approved_ending_on(
        &self,
        end_date: NaiveDate,
    ) -> RepositoryResult<Vec<PondReservation>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(&format!(
            r#"
            SELECT {RESERVATION_COLUMNS}
            FROM pond_reservations r
            JOIN ponds p ON r.pond_id = p.id
            WHERE r.status = 'approved' AND r.end_date = ?1
            ORDER BY r.end_date
            "#
        ))?;

        let reservations = stmt
            .query_map(
                params![end_date.format("%Y-%m-%d").to_string()],
                map_reservation_row,
            )?
            .collect::<SqliteResult<Vec<_>>>()?;
        Ok(reservations)
    }

    /// 查询 N 天内到期的已批准预定
    pub fn find_expiring_within(
        &self,
        today: NaiveDate,
        days: i64,
    ) -> RepositoryResult<Vec<PondReservation>> {
        let conn = self.get_conn()?;
        let until = today + chrono::Duration::days(days);
        let mut stmt = conn.prepare(&format!(
            r#"
            SELECT {RESERVATION_COLUMNS}
            FROM pond_reservations r
            JOIN ponds p ON r.pond_id = p.id
            WHERE r.status = 'approved'
              AND r.end_date >= ?1 AND r.end_date <= ?2
            ORDER BY r.end_date
            "#
        ))?;

        let reservations = stmt
            .query_map(
                params![
                    today.format("%Y-%m-%d").to_string(),
                    until.format("%Y-%m-%d").to_string()
                ],
                map_reservation_row,
            )?
            .collect::<SqliteResult<Vec<_>>>()?;
        Ok(reservations)
    }

    /// 各状态单量统计
    pub fn count_by_status(&self) -> RepositoryResult<Vec<(HoldStatus, i64)>> {
        let conn = self.get_conn()?;
        let mut stmt =
            conn.prepare("SELECT status, COUNT(*) FROM pond_reservations GROUP BY status")?;
        let rows = stmt
            .query_map([], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
            })?
            .collect::<SqliteResult<Vec<_>>>()?;

        let mut counts = Vec::new();
        for (status_str, count) in rows {
            if let Some(status) = HoldStatus::from_str(&status_str) {
                counts.push((status, count));
            }
        }
        Ok(counts)
    }
}

/// 行映射: pond_reservations 联 ponds -> PondReservation
fn map_reservation_row(row: &Row) -> SqliteResult<PondReservation> {
    let start_date_str: String = row.get(8)?;
    let end_date_str: String = row.get(9)?;
    let status_str: String = row.get(10)?;
    let decided_at_str: Option<String> = row.get(13)?;
    let created_at_str: String = row.get(14)?;

    let start_date = NaiveDate::parse_from_str(&start_date_str, "%Y-%m-%d").map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(8, rusqlite::types::Type::Text, Box::new(e))
    })?;
    let end_date = NaiveDate::parse_from_str(&end_date_str, "%Y-%m-%d").map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(9, rusqlite::types::Type::Text, Box::new(e))
    })?;
    let status = HoldStatus::from_str(&status_str).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            10,
            rusqlite::types::Type::Text,
            format!("未知预定状态: {}", status_str).into(),
        )
    })?;
    let decided_at = decided_at_str
        .and_then(|s| NaiveDateTime::parse_from_str(&s, "%Y-%m-%d %H:%M:%S").ok());
    let created_at = NaiveDateTime::parse_from_str(&created_at_str, "%Y-%m-%d %H:%M:%S")
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(14, rusqlite::types::Type::Text, Box::new(e))
        })?;

    Ok(PondReservation {
        id: row.get(0)?,
        pond_id: row.get(1)?,
        pond_code: row.get(2)?,
        user_name: row.get(3)?,
        fish_type: row.get(4)?,
        fish_quantity: row.get(5)?,
        phone: row.get(6)?,
        channel_user_id: row.get(7)?,
        start_date,
        end_date,
        status,
        reject_reason: row.get(11)?,
        decided_by: row.get(12)?,
        decided_at,
        created_at,
    })
}
