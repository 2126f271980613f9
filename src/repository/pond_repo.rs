// ==========================================
// 渔场设施预定与物资管理系统 - 鱼池数据仓储
// ==========================================
// 红线: Repository 不含业务逻辑
// ==========================================

use crate::domain::pond::Pond;
use crate::domain::types::{PondSizeClass, PondStatus};
use crate::repository::error::{RepositoryError, RepositoryResult};
use chrono::{NaiveDate, NaiveDateTime};
use rusqlite::{params, Connection, OptionalExtension, Result as SqliteResult, Row};
use std::sync::{Arc, Mutex};

/// 各状态鱼池数量统计
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct PondStatusCount {
    pub available: i64,
    pub occupied: i64,
    pub maintenance: i64,
}

// ==========================================
// PondRepository - 鱼池仓储
// ==========================================

/// 鱼池仓储
/// 职责: 管理 ponds 表的 CRUD 操作与目录查询
pub struct PondRepository {
    conn: Arc<Mutex<Connection>>,
}

impl PondRepository {
    /// 创建新的鱼池仓储实例
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    /// 获取数据库连接
    fn get_conn(&self) -> RepositoryResult<std::sync::MutexGuard<Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    /// 新建鱼池
    ///
    /// # 参数
    /// - `pond_code`: 池号 (唯一)
    /// - `zone`: 分区
    /// - `name`: 展示名 (可选)
    /// - `size_class`: 规格
    ///
    /// # 返回
    /// - Ok(id): 新鱼池主键
    pub fn insert(
        &self,
        pond_code: &str,
        zone: &str,
        name: Option<&str>,
        size_class: PondSizeClass,
    ) -> RepositoryResult<i64> {
        let conn = self.get_conn()?;
        let now = chrono::Local::now().format("%Y-%m-%d %H:%M:%S").to_string();
        conn.execute(
            r#"
            INSERT INTO ponds (pond_code, zone, name, size_class, status, created_at)
            VALUES (?1, ?2, ?3, ?4, 'available', ?5)
            "#,
            params![pond_code, zone, name, size_class.to_db_str(), now],
        )?;
        Ok(conn.last_insert_rowid())
    }

    /// 按主键查询鱼池
    pub fn find_by_id(&self, id: i64) -> RepositoryResult<Option<Pond>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT id, pond_code, zone, name, size_class, status,
                   pos_x, pos_y, width, height, created_at
            FROM ponds
            WHERE id = ?1
            "#,
        )?;

        let pond = stmt.query_row(params![id], map_pond_row).optional()?;
        Ok(pond)
    }

    /// 按池号查询鱼池
    pub fn find_by_code(&self, pond_code: &str) -> RepositoryResult<Option<Pond>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT id, pond_code, zone, name, size_class, status,
                   pos_x, pos_y, width, height, created_at
            FROM ponds
            WHERE pond_code = ?1
            "#,
        )?;

        let pond = stmt.query_row(params![pond_code], map_pond_row).optional()?;
        Ok(pond)
    }

    /// 查询全部鱼池 (按分区、池号排序)
    pub fn find_all(&self) -> RepositoryResult<Vec<Pond>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT id, pond_code, zone, name, size_class, status,
                   pos_x, pos_y, width, height, created_at
            FROM ponds
            ORDER BY zone, length(pond_code), pond_code
            "#,
        )?;

        let ponds = stmt
            .query_map([], map_pond_row)?
            .collect::<SqliteResult<Vec<_>>>()?;
        Ok(ponds)
    }

    /// 按分区查询鱼池
    pub fn find_by_zone(&self, zone: &str) -> RepositoryResult<Vec<Pond>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT id, pond_code, zone, name, size_class, status,
                   pos_x, pos_y, width, height, created_at
            FROM ponds
            WHERE zone = ?1
            ORDER BY length(pond_code), pond_code
            "#,
        )?;

        let ponds = stmt
            .query_map(params![zone], map_pond_row)?
            .collect::<SqliteResult<Vec<_>>>()?;
        Ok(ponds)
    }

    /// 查询指定日期无占用单的可用鱼池
    ///
    /// 口径: 状态为 available, 且不存在 pending/approved 且
    /// end_date >= 给定日期的预定单 (与原始口径一致, pending 计入占用)
    pub fn find_available(&self, on_date: NaiveDate) -> RepositoryResult<Vec<Pond>> {
        let conn = self.get_conn()?;
        let date_str = on_date.format("%Y-%m-%d").to_string();
        let mut stmt = conn.prepare(
            r#"
            SELECT id, pond_code, zone, name, size_class, status,
                   pos_x, pos_y, width, height, created_at
            FROM ponds
            WHERE status = 'available'
              AND id NOT IN (
                  SELECT pond_id FROM pond_reservations
                  WHERE status IN ('pending', 'approved')
                    AND end_date >= ?1
              )
            ORDER BY zone, length(pond_code), pond_code
            "#,
        )?;

        let ponds = stmt
            .query_map(params![date_str], map_pond_row)?
            .collect::<SqliteResult<Vec<_>>>()?;
        Ok(ponds)
    }

    /// 更新鱼池状态
    ///
    /// # 返回
    /// - Ok(true): 更新成功
    /// - Ok(false): 鱼池不存在
    pub fn update_status(&self, id: i64, status: PondStatus) -> RepositoryResult<bool> {
        let conn = self.get_conn()?;
        let rows = conn.execute(
            "UPDATE ponds SET status = ?1 WHERE id = ?2",
            params![status.to_db_str(), id],
        )?;
        Ok(rows > 0)
    }

    /// 更新鱼池基础信息
    pub fn update_info(
        &self,
        id: i64,
        name: Option<&str>,
        size_class: PondSizeClass,
        zone: &str,
    ) -> RepositoryResult<bool> {
        let conn = self.get_conn()?;
        let rows = conn.execute(
            "UPDATE ponds SET name = ?1, size_class = ?2, zone = ?3 WHERE id = ?4",
            params![name, size_class.to_db_str(), zone, id],
        )?;
        Ok(rows > 0)
    }

    /// 删除鱼池 (调用方需先确认无未完结预定单)
    pub fn delete(&self, id: i64) -> RepositoryResult<bool> {
        let conn = self.get_conn()?;
        let rows = conn.execute("DELETE FROM ponds WHERE id = ?1", params![id])?;
        Ok(rows > 0)
    }

    /// 统计非终态预定单引用数 (删除守卫用)
    pub fn count_active_reservations(&self, pond_id: i64) -> RepositoryResult<i64> {
        let conn = self.get_conn()?;
        let count: i64 = conn.query_row(
            r#"
            SELECT COUNT(*) FROM pond_reservations
            WHERE pond_id = ?1 AND status IN ('pending', 'approved')
            "#,
            params![pond_id],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    /// 各状态鱼池数量
    pub fn status_counts(&self) -> RepositoryResult<PondStatusCount> {
        let conn = self.get_conn()?;
        let mut counts = PondStatusCount {
            available: 0,
            occupied: 0,
            maintenance: 0,
        };

        let mut stmt = conn.prepare("SELECT status, COUNT(*) FROM ponds GROUP BY status")?;
        let rows = stmt
            .query_map([], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
            })?
            .collect::<SqliteResult<Vec<_>>>()?;

        for (status, count) in rows {
            match status.as_str() {
                "available" => counts.available = count,
                "occupied" => counts.occupied = count,
                "maintenance" => counts.maintenance = count,
                _ => {}
            }
        }
        Ok(counts)
    }
}

/// 行映射: ponds 表 -> Pond
fn map_pond_row(row: &Row) -> SqliteResult<Pond> {
    let size_class_str: String = row.get(4)?;
    let status_str: String = row.get(5)?;
    let created_at_str: String = row.get(10)?;

    let size_class = PondSizeClass::from_str(&size_class_str).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            4,
            rusqlite::types::Type::Text,
            format!("未知鱼池规格: {}", size_class_str).into(),
        )
    })?;
    let status = PondStatus::from_str(&status_str).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            5,
            rusqlite::types::Type::Text,
            format!("未知鱼池状态: {}", status_str).into(),
        )
    })?;
    let created_at = NaiveDateTime::parse_from_str(&created_at_str, "%Y-%m-%d %H:%M:%S")
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(10, rusqlite::types::Type::Text, Box::new(e))
        })?;

    Ok(Pond {
        id: row.get(0)?,
        pond_code: row.get(1)?,
        zone: row.get(2)?,
        name: row.get(3)?,
        size_class,
        status,
        pos_x: row.get(6)?,
        pos_y: row.get(7)?,
        width: row.get(8)?,
        height: row.get(9)?,
        created_at,
    })
}
