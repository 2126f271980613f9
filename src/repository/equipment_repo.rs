// ==========================================
// 渔场设施预定与物资管理系统 - 器材目录数据仓储
// ==========================================
// 覆盖 equipment_categories / equipment 两张目录表
// ==========================================

use crate::domain::equipment::{Equipment, EquipmentCategory};
use crate::domain::types::CatalogStatus;
use crate::repository::error::{RepositoryError, RepositoryResult};
use chrono::NaiveDateTime;
use rusqlite::{params, Connection, OptionalExtension, Result as SqliteResult, Row};
use std::sync::{Arc, Mutex};

const EQUIPMENT_COLUMNS: &str = r#"
    e.id, e.name, e.category_id, c.name AS category_name,
    e.total_quantity, e.unit, e.description, e.status, e.created_at
"#;

/// 器材目录仓储
/// 职责: 器材分类与器材台账的增删改查
pub struct EquipmentRepository {
    conn: Arc<Mutex<Connection>>,
}

impl EquipmentRepository {
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    fn get_conn(&self) -> RepositoryResult<std::sync::MutexGuard<Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    // ==========================================
    // 分类维护
    // ==========================================

    /// 新建器材分类
    pub fn insert_category(
        &self,
        name: &str,
        description: Option<&str>,
    ) -> RepositoryResult<i64> {
        let conn = self.get_conn()?;
        conn.execute(
            "INSERT INTO equipment_categories (name, description, created_at) VALUES (?1, ?2, datetime('now', 'localtime'))",
            params![name, description],
        )?;
        Ok(conn.last_insert_rowid())
    }

    /// 查询全部分类 (带分类下器材数)
    pub fn find_all_categories(&self) -> RepositoryResult<Vec<EquipmentCategory>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT c.id, c.name, c.description, c.created_at, COUNT(e.id) AS equipment_count
            FROM equipment_categories c
            LEFT JOIN equipment e ON e.category_id = c.id
            GROUP BY c.id
            ORDER BY c.name
            "#,
        )?;

        let categories = stmt
            .query_map([], map_category_row)?
            .collect::<SqliteResult<Vec<_>>>()?;
        Ok(categories)
    }

    /// 按主键查询分类
    pub fn find_category_by_id(&self, id: i64) -> RepositoryResult<Option<EquipmentCategory>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT c.id, c.name, c.description, c.created_at, COUNT(e.id) AS equipment_count
            FROM equipment_categories c
            LEFT JOIN equipment e ON e.category_id = c.id
            WHERE c.id = ?1
            GROUP BY c.id
            "#,
        )?;

        let category = stmt.query_row(params![id], map_category_row).optional()?;
        Ok(category)
    }

    /// 更新分类名称与描述
    pub fn update_category(
        &self,
        id: i64,
        name: &str,
        description: Option<&str>,
    ) -> RepositoryResult<()> {
        let conn = self.get_conn()?;
        let affected = conn.execute(
            "UPDATE equipment_categories SET name = ?1, description = ?2 WHERE id = ?3",
            params![name, description, id],
        )?;
        if affected == 0 {
            return Err(RepositoryError::NotFound {
                entity: "器材分类".to_string(),
                id: id.to_string(),
            });
        }
        Ok(())
    }

    /// 删除分类 (分类下仍有器材时拒绝)
    pub fn delete_category(&self, id: i64) -> RepositoryResult<()> {
        let conn = self.get_conn()?;
        let in_use: i64 = conn.query_row(
            "SELECT COUNT(*) FROM equipment WHERE category_id = ?1",
            params![id],
            |row| row.get(0),
        )?;
        if in_use > 0 {
            return Err(RepositoryError::BusinessRuleViolation(format!(
                "分类下仍有 {} 件器材, 不能删除",
                in_use
            )));
        }
        let affected = conn.execute(
            "DELETE FROM equipment_categories WHERE id = ?1",
            params![id],
        )?;
        if affected == 0 {
            return Err(RepositoryError::NotFound {
                entity: "器材分类".to_string(),
                id: id.to_string(),
            });
        }
        Ok(())
    }

    // ==========================================
    // 器材维护
    // ==========================================

    /// 新建器材
    pub fn insert(
        &self,
        name: &str,
        category_id: Option<i64>,
        total_quantity: i64,
        unit: &str,
        description: Option<&str>,
    ) -> RepositoryResult<i64> {
        let conn = self.get_conn()?;
        conn.execute(
            r#"
            INSERT INTO equipment (name, category_id, total_quantity, unit, description, status, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, 'active', datetime('now', 'localtime'))
            "#,
            params![name, category_id, total_quantity, unit, description],
        )?;
        Ok(conn.last_insert_rowid())
    }

    /// 按主键查询器材
    pub fn find_by_id(&self, id: i64) -> RepositoryResult<Option<Equipment>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(&format!(
            r#"
            SELECT {EQUIPMENT_COLUMNS}
            FROM equipment e
            LEFT JOIN equipment_categories c ON e.category_id = c.id
            WHERE e.id = ?1
            "#
        ))?;

        let equipment = stmt.query_row(params![id], map_equipment_row).optional()?;
        Ok(equipment)
    }

    /// 查询全部器材
    pub fn find_all(&self) -> RepositoryResult<Vec<Equipment>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(&format!(
            r#"
            SELECT {EQUIPMENT_COLUMNS}
            FROM equipment e
            LEFT JOIN equipment_categories c ON e.category_id = c.id
            ORDER BY c.name, e.name
            "#
        ))?;

        let equipment = stmt
            .query_map([], map_equipment_row)?
            .collect::<SqliteResult<Vec<_>>>()?;
        Ok(equipment)
    }

    /// 查询在用器材 (借用入口只展示 active)
    pub fn find_active(&self) -> RepositoryResult<Vec<Equipment>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(&format!(
            r#"
            SELECT {EQUIPMENT_COLUMNS}
            FROM equipment e
            LEFT JOIN equipment_categories c ON e.category_id = c.id
            WHERE e.status = 'active'
            ORDER BY c.name, e.name
            "#
        ))?;

        let equipment = stmt
            .query_map([], map_equipment_row)?
            .collect::<SqliteResult<Vec<_>>>()?;
        Ok(equipment)
    }

    /// 按分类查询器材
    pub fn find_by_category(&self, category_id: i64) -> RepositoryResult<Vec<Equipment>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(&format!(
            r#"
            SELECT {EQUIPMENT_COLUMNS}
            FROM equipment e
            LEFT JOIN equipment_categories c ON e.category_id = c.id
            WHERE e.category_id = ?1
            ORDER BY e.name
            "#
        ))?;

        let equipment = stmt
            .query_map(params![category_id], map_equipment_row)?
            .collect::<SqliteResult<Vec<_>>>()?;
        Ok(equipment)
    }

    /// 更新器材信息
    pub fn update_info(
        &self,
        id: i64,
        name: &str,
        category_id: Option<i64>,
        total_quantity: i64,
        unit: &str,
        description: Option<&str>,
    ) -> RepositoryResult<()> {
        let conn = self.get_conn()?;
        let affected = conn.execute(
            r#"
            UPDATE equipment
            SET name = ?1, category_id = ?2, total_quantity = ?3, unit = ?4, description = ?5
            WHERE id = ?6
            "#,
            params![name, category_id, total_quantity, unit, description, id],
        )?;
        if affected == 0 {
            return Err(RepositoryError::NotFound {
                entity: "器材".to_string(),
                id: id.to_string(),
            });
        }
        Ok(())
    }

    /// 更新器材启停状态
    pub fn update_status(&self, id: i64, status: CatalogStatus) -> RepositoryResult<()> {
        let conn = self.get_conn()?;
        let affected = conn.execute(
            "UPDATE equipment SET status = ?1 WHERE id = ?2",
            params![status.to_db_str(), id],
        )?;
        if affected == 0 {
            return Err(RepositoryError::NotFound {
                entity: "器材".to_string(),
                id: id.to_string(),
            });
        }
        Ok(())
    }

    /// 删除器材 (有借用明细引用时交由外键约束拒绝)
    pub fn delete(&self, id: i64) -> RepositoryResult<()> {
        let conn = self.get_conn()?;
        let affected = conn.execute("DELETE FROM equipment WHERE id = ?1", params![id])?;
        if affected == 0 {
            return Err(RepositoryError::NotFound {
                entity: "器材".to_string(),
                id: id.to_string(),
            });
        }
        Ok(())
    }

    /// 在用器材总数 (看板)
    pub fn count_active(&self) -> RepositoryResult<i64> {
        let conn = self.get_conn()?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM equipment WHERE status = 'active'",
            [],
            |row| row.get(0),
        )?;
        Ok(count)
    }
}

fn map_category_row(row: &Row) -> SqliteResult<EquipmentCategory> {
    let created_at_str: String = row.get(3)?;
    let created_at = NaiveDateTime::parse_from_str(&created_at_str, "%Y-%m-%d %H:%M:%S")
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(3, rusqlite::types::Type::Text, Box::new(e))
        })?;

    Ok(EquipmentCategory {
        id: row.get(0)?,
        name: row.get(1)?,
        description: row.get(2)?,
        created_at,
        equipment_count: row.get(4)?,
    })
}

fn map_equipment_row(row: &Row) -> SqliteResult<Equipment> {
    let status_str: String = row.get(7)?;
    let created_at_str: String = row.get(8)?;

    let status = CatalogStatus::from_str(&status_str).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            7,
            rusqlite::types::Type::Text,
            format!("未知器材状态: {}", status_str).into(),
        )
    })?;
    let created_at = NaiveDateTime::parse_from_str(&created_at_str, "%Y-%m-%d %H:%M:%S")
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(8, rusqlite::types::Type::Text, Box::new(e))
        })?;

    Ok(Equipment {
        id: row.get(0)?,
        name: row.get(1)?,
        category_id: row.get(2)?,
        category_name: row.get(3)?,
        total_quantity: row.get(4)?,
        unit: row.get(5)?,
        description: row.get(6)?,
        status,
        created_at,
    })
}
