// ==========================================
// 渔场设施预定与物资管理系统 - 管理员数据仓储
// ==========================================

use crate::domain::admin::Admin;
use crate::repository::error::{RepositoryError, RepositoryResult};
use chrono::NaiveDateTime;
use rusqlite::{params, Connection, OptionalExtension, Result as SqliteResult, Row};
use std::sync::{Arc, Mutex};

const ADMIN_COLUMNS: &str = "id, username, password_hash, name, role, created_at";

/// 管理员仓储
pub struct AdminRepository {
    conn: Arc<Mutex<Connection>>,
}

impl AdminRepository {
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    fn get_conn(&self) -> RepositoryResult<std::sync::MutexGuard<Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    /// 新建管理员 (password_hash 由调用方算好)
    pub fn insert(
        &self,
        username: &str,
        password_hash: &str,
        name: &str,
        role: &str,
    ) -> RepositoryResult<i64> {
        let conn = self.get_conn()?;
        conn.execute(
            r#"
            INSERT INTO admins (username, password_hash, name, role, created_at)
            VALUES (?1, ?2, ?3, ?4, datetime('now', 'localtime'))
            "#,
            params![username, password_hash, name, role],
        )?;
        Ok(conn.last_insert_rowid())
    }

    /// 按主键查询管理员
    pub fn find_by_id(&self, id: i64) -> RepositoryResult<Option<Admin>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {ADMIN_COLUMNS} FROM admins WHERE id = ?1"
        ))?;

        let admin = stmt.query_row(params![id], map_admin_row).optional()?;
        Ok(admin)
    }

    /// 按用户名查询管理员 (登录)
    pub fn find_by_username(&self, username: &str) -> RepositoryResult<Option<Admin>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {ADMIN_COLUMNS} FROM admins WHERE username = ?1"
        ))?;

        let admin = stmt
            .query_row(params![username], map_admin_row)
            .optional()?;
        Ok(admin)
    }

    /// 查询全部管理员
    pub fn find_all(&self) -> RepositoryResult<Vec<Admin>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {ADMIN_COLUMNS} FROM admins ORDER BY id"
        ))?;

        let admins = stmt
            .query_map([], map_admin_row)?
            .collect::<SqliteResult<Vec<_>>>()?;
        Ok(admins)
    }

    /// 更新密码散列
    pub fn update_password(&self, id: i64, password_hash: &str) -> RepositoryResult<()> {
        let conn = self.get_conn()?;
        let affected = conn.execute(
            "UPDATE admins SET password_hash = ?1 WHERE id = ?2",
            params![password_hash, id],
        )?;
        if affected == 0 {
            return Err(RepositoryError::NotFound {
                entity: "管理员".to_string(),
                id: id.to_string(),
            });
        }
        Ok(())
    }

    /// 删除管理员 (至少保留一名)
    pub fn delete(&self, id: i64) -> RepositoryResult<()> {
        let conn = self.get_conn()?;
        let total: i64 = conn.query_row("SELECT COUNT(*) FROM admins", [], |row| row.get(0))?;
        if total <= 1 {
            return Err(RepositoryError::BusinessRuleViolation(
                "不能删除最后一名管理员".to_string(),
            ));
        }
        let affected = conn.execute("DELETE FROM admins WHERE id = ?1", params![id])?;
        if affected == 0 {
            return Err(RepositoryError::NotFound {
                entity: "管理员".to_string(),
                id: id.to_string(),
            });
        }
        Ok(())
    }
}

fn map_admin_row(row: &Row) -> SqliteResult<Admin> {
    let created_at_str: String = row.get(5)?;
    let created_at = NaiveDateTime::parse_from_str(&created_at_str, "%Y-%m-%d %H:%M:%S")
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(5, rusqlite::types::Type::Text, Box::new(e))
        })?;

    Ok(Admin {
        id: row.get(0)?,
        username: row.get(1)?,
        password_hash: row.get(2)?,
        name: row.get(3)?,
        role: row.get(4)?,
        created_at,
    })
}
