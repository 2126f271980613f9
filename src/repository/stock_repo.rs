// ==========================================
// 渔场设施预定与物资管理系统 - 物资目录与台账数据仓储
// ==========================================
// 覆盖 stock_categories / stock_items / stock_ledger 三张表
// 红线: 台账追加与余额更新的"检查+写入"事务由 services::ledger_service 持有,
// 仓储只做只读查询与目录维护
// ==========================================

use crate::domain::stock::{StockCategory, StockItem, StockLedgerEntry};
use crate::domain::types::{CatalogStatus, LedgerEntryKind};
use crate::repository::error::{RepositoryError, RepositoryResult};
use chrono::NaiveDateTime;
use rusqlite::{params, Connection, OptionalExtension, Result as SqliteResult, Row};
use std::sync::{Arc, Mutex};

const ITEM_COLUMNS: &str = r#"
    i.id, i.name, i.category_id, c.name AS category_name, i.unit,
    i.unit_price, i.current_quantity, i.min_quantity, i.description,
    i.status, i.created_at
"#;

const LEDGER_COLUMNS: &str = r#"
    g.id, g.item_id, i.name AS item_name, g.entry_kind, g.quantity,
    g.signed_effect, g.unit_price, g.total_price, g.reference_no,
    g.note, g.created_by, a.name AS admin_name, g.created_at
"#;

/// 物资目录与台账仓储
pub struct StockRepository {
    conn: Arc<Mutex<Connection>>,
}

impl StockRepository {
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

    /// 新建物资分类
    pub fn insert_category(
        &self,
        name: &str,
        description: Option<&str>,
    ) -> RepositoryResult<i64> {
        let conn = self.get_conn()?;
        conn.execute(
            "INSERT INTO stock_categories (name, description, created_at) VALUES (?1, ?2, datetime('now', 'localtime'))",
            params![name, description],
        )?;
        Ok(conn.last_insert_rowid())
    }

    /// 查询全部分类 (带分类下物资数)
    pub fn find_all_categories(&self) -> RepositoryResult<Vec<StockCategory>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT c.id, c.name, c.description, c.created_at, COUNT(i.id) AS item_count
            FROM stock_categories c
            LEFT JOIN stock_items i ON i.category_id = c.id
            GROUP BY c.id
            ORDER BY c.name
            "#,
        )?;

        let categories = stmt
            .query_map([], map_stock_category_row)?
            .collect::<SqliteResult<Vec<_>>>()?;
        Ok(categories)
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
            "UPDATE stock_categories SET name = ?1, description = ?2 WHERE id = ?3",
            params![name, description, id],
        )?;
        if affected == 0 {
            return Err(RepositoryError::NotFound {
                entity: "物资分类".to_string(),
                id: id.to_string(),
            });
        }
        Ok(())
    }

    /// 删除分类 (分类下仍有物资时拒绝)
    pub fn delete_category(&self, id: i64) -> RepositoryResult<()> {
        let conn = self.get_conn()?;
        let in_use: i64 = conn.query_row(
            "SELECT COUNT(*) FROM stock_items WHERE category_id = ?1",
            params![id],
            |row| row.get(0),
        )?;
        if in_use > 0 {
            return Err(RepositoryError::BusinessRuleViolation(format!(
                "分类下仍有 {} 种物资, 不能删除",
                in_use
            )));
        }
        let affected =
            conn.execute("DELETE FROM stock_categories WHERE id = ?1", params![id])?;
        if affected == 0 {
            return Err(RepositoryError::NotFound {
                entity: "物资分类".to_string(),
                id: id.to_string(),
            });
        }
        Ok(())
    }

    // ==========================================
    // 物资维护
    // ==========================================

    /// 新建物资
    ///
    /// 余额恒从 0 起步, 初始库存走台账入库 (services::ledger_service) 补记,
    /// 保证 current_quantity 始终可由台账重放复原
    pub fn insert_item(
        &self,
        name: &str,
        category_id: Option<i64>,
        unit: &str,
        unit_price: f64,
        min_quantity: i64,
        description: Option<&str>,
    ) -> RepositoryResult<i64> {
        let conn = self.get_conn()?;
        conn.execute(
            r#"
            INSERT INTO stock_items (
                name, category_id, unit, unit_price, current_quantity,
                min_quantity, description, status, created_at
            ) VALUES (?1, ?2, ?3, ?4, 0, ?5, ?6, 'active', datetime('now', 'localtime'))
            "#,
            params![name, category_id, unit, unit_price, min_quantity, description],
        )?;
        Ok(conn.last_insert_rowid())
    }

    /// 按主键查询物资
    pub fn find_item_by_id(&self, id: i64) -> RepositoryResult<Option<StockItem>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(&format!(
            r#"
            SELECT {ITEM_COLUMNS}
            FROM stock_items i
            LEFT JOIN stock_categories c ON i.category_id = c.id
            WHERE i.id = ?1
            "#
        ))?;

        let item = stmt.query_row(params![id], map_stock_item_row).optional()?;
        Ok(item)
    }

    /// 查询全部物资
    pub fn find_all_items(&self) -> RepositoryResult<Vec<StockItem>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(&format!(
            r#"
            SELECT {ITEM_COLUMNS}
            FROM stock_items i
            LEFT JOIN stock_categories c ON i.category_id = c.id
            ORDER BY c.name, i.name
            "#
        ))?;

        let items = stmt
            .query_map([], map_stock_item_row)?
            .collect::<SqliteResult<Vec<_>>>()?;
        Ok(items)
    }

    /// 查询在用物资 (领用入口只展示 active)
    pub fn find_active_items(&self) -> RepositoryResult<Vec<StockItem>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(&format!(
            r#"
            SELECT {ITEM_COLUMNS}
            FROM stock_items i
            LEFT JOIN stock_categories c ON i.category_id = c.id
            WHERE i.status = 'active'
            ORDER BY c.name, i.name
            "#
        ))?;

        let items = stmt
            .query_map([], map_stock_item_row)?
            .collect::<SqliteResult<Vec<_>>>()?;
        Ok(items)
    }

    /// 查询触发低库存预警的物资 (min_quantity = 0 表示不启用)
    pub fn find_low_stock_items(&self) -> RepositoryResult<Vec<StockItem>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(&format!(
            r#"
            SELECT {ITEM_COLUMNS}
            FROM stock_items i
            LEFT JOIN stock_categories c ON i.category_id = c.id
            WHERE i.status = 'active'
              AND i.min_quantity > 0
              AND i.current_quantity <= i.min_quantity
            ORDER BY CAST(i.current_quantity AS REAL) / i.min_quantity
            "#
        ))?;

        let items = stmt
            .query_map([], map_stock_item_row)?
            .collect::<SqliteResult<Vec<_>>>()?;
        Ok(items)
    }

    /// 更新物资信息 (余额只能经台账变动, 此处不可改)
    pub fn update_item_info(
        &self,
        id: i64,
        name: &str,
        category_id: Option<i64>,
        unit: &str,
        unit_price: f64,
        min_quantity: i64,
        description: Option<&str>,
    ) -> RepositoryResult<()> {
        let conn = self.get_conn()?;
        let affected = conn.execute(
            r#"
            UPDATE stock_items
            SET name = ?1, category_id = ?2, unit = ?3, unit_price = ?4,
                min_quantity = ?5, description = ?6
            WHERE id = ?7
            "#,
            params![name, category_id, unit, unit_price, min_quantity, description, id],
        )?;
        if affected == 0 {
            return Err(RepositoryError::NotFound {
                entity: "物资".to_string(),
                id: id.to_string(),
            });
        }
        Ok(())
    }

    /// 更新物资启停状态
    pub fn update_item_status(&self, id: i64, status: CatalogStatus) -> RepositoryResult<()> {
        let conn = self.get_conn()?;
        let affected = conn.execute(
            "UPDATE stock_items SET status = ?1 WHERE id = ?2",
            params![status.to_db_str(), id],
        )?;
        if affected == 0 {
            return Err(RepositoryError::NotFound {
                entity: "物资".to_string(),
                id: id.to_string(),
            });
        }
        Ok(())
    }

    /// 删除物资 (已有台账记录时拒绝, 保护审计链)
    pub fn delete_item(&self, id: i64) -> RepositoryResult<()> {
        let conn = self.get_conn()?;
        let ledger_count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM stock_ledger WHERE item_id = ?1",
            params![id],
            |row| row.get(0),
        )?;
        if ledger_count > 0 {
            return Err(RepositoryError::BusinessRuleViolation(format!(
                "物资已有 {} 条台账记录, 不能删除",
                ledger_count
            )));
        }
        let affected = conn.execute("DELETE FROM stock_items WHERE id = ?1", params![id])?;
        if affected == 0 {
            return Err(RepositoryError::NotFound {
                entity: "物资".to_string(),
                id: id.to_string(),
            });
        }
        Ok(())
    }

    // ==========================================
    // 台账查询 (只读)
    // ==========================================

    /// 按物资查询台账 (最新在前)
    pub fn find_ledger_by_item(
        &self,
        item_id: i64,
        limit: i64,
    ) -> RepositoryResult<Vec<StockLedgerEntry>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(&format!(
            r#"
            SELECT {LEDGER_COLUMNS}
            FROM stock_ledger g
            JOIN stock_items i ON g.item_id = i.id
            LEFT JOIN admins a ON g.created_by = a.id
            WHERE g.item_id = ?1
            ORDER BY g.created_at DESC, g.id DESC
            LIMIT ?2
            "#
        ))?;

        let entries = stmt
            .query_map(params![item_id, limit], map_ledger_row)?
            .collect::<SqliteResult<Vec<_>>>()?;
        Ok(entries)
    }

    /// 最近台账记录 (全部物资, 看板用)
    pub fn find_ledger_recent(&self, limit: i64) -> RepositoryResult<Vec<StockLedgerEntry>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(&format!(
            r#"
            SELECT {LEDGER_COLUMNS}
            FROM stock_ledger g
            JOIN stock_items i ON g.item_id = i.id
            LEFT JOIN admins a ON g.created_by = a.id
            ORDER BY g.created_at DESC, g.id DESC
            LIMIT ?1
            "#
        ))?;

        let entries = stmt
            .query_map(params![limit], map_ledger_row)?
            .collect::<SqliteResult<Vec<_>>>()?;
        Ok(entries)
    }

    /// 从台账重放某物资的余额 (对账校验用)
    pub fn replay_balance(&self, item_id: i64) -> RepositoryResult<i64> {
        let conn = self.get_conn()?;
        let balance: i64 = conn.query_row(
            "SELECT COALESCE(SUM(signed_effect), 0) FROM stock_ledger WHERE item_id = ?1",
            params![item_id],
            |row| row.get(0),
        )?;
        Ok(balance)
    }

    /// 库存总值 (看板)
    pub fn total_stock_value(&self) -> RepositoryResult<f64> {
        let conn = self.get_conn()?;
        let value: f64 = conn.query_row(
            "SELECT COALESCE(SUM(current_quantity * unit_price), 0.0) FROM stock_items WHERE status = 'active'",
            [],
            |row| row.get(0),
        )?;
        Ok(value)
    }
}

fn map_stock_category_row(row: &Row) -> SqliteResult<StockCategory> {
    let created_at_str: String = row.get(3)?;
    let created_at = NaiveDateTime::parse_from_str(&created_at_str, "%Y-%m-%d %H:%M:%S")
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(3, rusqlite::types::Type::Text, Box::new(e))
        })?;

    Ok(StockCategory {
        id: row.get(0)?,
        name: row.get(1)?,
        description: row.get(2)?,
        created_at,
        item_count: row.get(4)?,
    })
}

fn map_stock_item_row(row: &Row) -> SqliteResult<StockItem> {
    let status_str: String = row.get(9)?;
    let created_at_str: String = row.get(10)?;

    let status = CatalogStatus::from_str(&status_str).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            9,
            rusqlite::types::Type::Text,
            format!("未知物资状态: {}", status_str).into(),
        )
    })?;
    let created_at = NaiveDateTime::parse_from_str(&created_at_str, "%Y-%m-%d %H:%M:%S")
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(10, rusqlite::types::Type::Text, Box::new(e))
        })?;

    Ok(StockItem {
        id: row.get(0)?,
        name: row.get(1)?,
        category_id: row.get(2)?,
        category_name: row.get(3)?,
        unit: row.get(4)?,
        unit_price: row.get(5)?,
        current_quantity: row.get(6)?,
        min_quantity: row.get(7)?,
        description: row.get(8)?,
        status,
        created_at,
    })
}

fn map_ledger_row(row: &Row) -> SqliteResult<StockLedgerEntry> {
    let entry_kind_str: String = row.get(3)?;
    let created_at_str: String = row.get(12)?;

    let entry_kind = LedgerEntryKind::from_str(&entry_kind_str).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            3,
            rusqlite::types::Type::Text,
            format!("未知台账类型: {}", entry_kind_str).into(),
        )
    })?;
    let created_at = NaiveDateTime::parse_from_str(&created_at_str, "%Y-%m-%d %H:%M:%S")
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(12, rusqlite::types::Type::Text, Box::new(e))
        })?;

    Ok(StockLedgerEntry {
        id: row.get(0)?,
        item_id: row.get(1)?,
        item_name: row.get(2)?,
        entry_kind,
        quantity: row.get(4)?,
        signed_effect: row.get(5)?,
        unit_price: row.get(6)?,
        total_price: row.get(7)?,
        reference_no: row.get(8)?,
        note: row.get(9)?,
        created_by: row.get(10)?,
        admin_name: row.get(11)?,
        created_at,
    })
}
