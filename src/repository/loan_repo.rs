// ==========================================
// 渔场设施预定与物资管理系统 - 器材借用数据仓储
// ==========================================
// 单头 (equipment_loans) + 明细行 (equipment_loan_items) 聚合
// 插入整单在仓储内部事务完成; 状态迁移由 services::approval_service 持有
// ==========================================

use crate::domain::equipment::{EquipmentLoan, LoanLine};
use crate::domain::types::{DateWindow, HoldStatus};
use crate::repository::error::{RepositoryError, RepositoryResult};
use chrono::{NaiveDate, NaiveDateTime};
use rusqlite::{params, Connection, OptionalExtension, Result as SqliteResult, Row};
use std::sync::{Arc, Mutex};

const LOAN_COLUMNS: &str = r#"
    l.id, l.user_name, l.channel_user_id, l.phone, l.purpose,
    l.borrow_date, l.return_date, l.actual_return_date, l.status,
    l.reject_reason, l.decided_by, l.decided_at, l.created_at
"#;

/// 器材借用仓储
pub struct LoanRepository {
    conn: Arc<Mutex<Connection>>,
}

impl LoanRepository {
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    fn get_conn(&self) -> RepositoryResult<std::sync::MutexGuard<Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    /// 插入整张借用单 (单头 + 明细行, 同一事务)
    pub fn insert(&self, loan: &EquipmentLoan) -> RepositoryResult<String> {
        let mut conn = self.get_conn()?;
        let tx = conn.transaction()?;

        tx.execute(
            r#"
            INSERT INTO equipment_loans (
                id, user_name, channel_user_id, phone, purpose,
                borrow_date, return_date, actual_return_date, status,
                reject_reason, decided_by, decided_at, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)
            "#,
            params![
                loan.id,
                loan.user_name,
                loan.channel_user_id,
                loan.phone,
                loan.purpose,
                loan.borrow_date.format("%Y-%m-%d").to_string(),
                loan.return_date.format("%Y-%m-%d").to_string(),
                loan.actual_return_date
                    .map(|d| d.format("%Y-%m-%d").to_string()),
                loan.status.to_db_str(),
                loan.reject_reason,
                loan.decided_by,
                loan.decided_at
                    .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string()),
                loan.created_at.format("%Y-%m-%d %H:%M:%S").to_string(),
            ],
        )?;

        for line in &loan.items {
            tx.execute(
                r#"
                INSERT INTO equipment_loan_items (loan_id, equipment_id, quantity, returned_quantity)
                VALUES (?1, ?2, ?3, ?4)
                "#,
                params![loan.id, line.equipment_id, line.quantity, line.returned_quantity],
            )?;
        }

        tx.commit()?;
        Ok(loan.id.clone())
    }

    /// 按主键查询借用单 (含明细行)
    pub fn find_by_id(&self, id: &str) -> RepositoryResult<Option<EquipmentLoan>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {LOAN_COLUMNS} FROM equipment_loans l WHERE l.id = ?1"
        ))?;

        let loan = stmt.query_row(params![id], map_loan_row).optional()?;
        match loan {
            Some(mut loan) => {
                loan.items = load_loan_lines(&conn, &loan.id)?;
                Ok(Some(loan))
            }
            None => Ok(None),
        }
    }

    /// 查询全部借用单 (含明细行, 最新提交在前)
    pub fn find_all(&self) -> RepositoryResult<Vec<EquipmentLoan>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {LOAN_COLUMNS} FROM equipment_loans l ORDER BY l.created_at DESC"
        ))?;
        let mut loans = stmt
            .query_map([], map_loan_row)?
            .collect::<SqliteResult<Vec<_>>>()?;

        for loan in &mut loans {
            loan.items = load_loan_lines(&conn, &loan.id)?;
        }
        Ok(loans)
    }

    /// 按状态查询借用单 (含明细行)
    pub fn find_by_status(&self, status: HoldStatus) -> RepositoryResult<Vec<EquipmentLoan>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(&format!(
            r#"
            SELECT {LOAN_COLUMNS} FROM equipment_loans l
            WHERE l.status = ?1
            ORDER BY l.created_at DESC
            "#
        ))?;
        let mut loans = stmt
            .query_map(params![status.to_db_str()], map_loan_row)?
            .collect::<SqliteResult<Vec<_>>>()?;

        for loan in &mut loans {
            loan.items = load_loan_lines(&conn, &loan.id)?;
        }
        Ok(loans)
    }

    /// 按渠道用户查询借用单 (机器人"我的借用")
    pub fn find_by_channel_user(
        &self,
        channel_user_id: &str,
    ) -> RepositoryResult<Vec<EquipmentLoan>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(&format!(
            r#"
            SELECT {LOAN_COLUMNS} FROM equipment_loans l
            WHERE l.channel_user_id = ?1
            ORDER BY l.created_at DESC
            "#
        ))?;
        let mut loans = stmt
            .query_map(params![channel_user_id], map_loan_row)?
            .collect::<SqliteResult<Vec<_>>>()?;

        for loan in &mut loans {
            loan.items = load_loan_lines(&conn, &loan.id)?;
        }
        Ok(loans)
    }

    /// 窗口内某器材的已承诺借出量
    ///
    /// 口径: 单状态 approved/borrowed/overdue 且窗口重叠 (含边界),
    /// 明细按未归还量 (quantity - returned_quantity) 计
    pub fn committed_quantity(
        &self,
        equipment_id: i64,
        window: DateWindow,
        exclude_loan_id: Option<&str>,
    ) -> RepositoryResult<i64> {
        let conn = self.get_conn()?;
        let committed: i64 = conn.query_row(
            r#"
            SELECT COALESCE(SUM(li.quantity - li.returned_quantity), 0)
            FROM equipment_loan_items li
            JOIN equipment_loans l ON li.loan_id = l.id
            WHERE li.equipment_id = ?1
              AND l.status IN ('approved', 'borrowed', 'overdue')
              AND l.borrow_date <= ?2
              AND l.return_date >= ?3
              AND (?4 IS NULL OR l.id != ?4)
            "#,
            params![
                equipment_id,
                window.end.format("%Y-%m-%d").to_string(),
                window.start.format("%Y-%m-%d").to_string(),
                exclude_loan_id,
            ],
            |row| row.get(0),
        )?;
        Ok(committed)
    }

    /// 统计非终态借用单引用数 (删除守卫用)
    pub fn count_active_for_equipment(&self, equipment_id: i64) -> RepositoryResult<i64> {
        let conn = self.get_conn()?;
        let count: i64 = conn.query_row(
            r#"
            SELECT COUNT(DISTINCT l.id)
            FROM equipment_loan_items li
            JOIN equipment_loans l ON li.loan_id = l.id
            WHERE li.equipment_id = ?1
              AND l.status IN ('pending', 'approved', 'borrowed', 'overdue')
            "#,
            params![equipment_id],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    /// 查询指定归还日到期的借出中借用单 (归还提醒用)
    pub fn find_borrowed_due_on(
        &self,
        return_date: NaiveDate,
    ) -> RepositoryResult<Vec<EquipmentLoan>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(&format!(
            r#"
            SELECT {LOAN_COLUMNS} FROM equipment_loans l
            WHERE l.status = 'borrowed' AND l.return_date = ?1
            ORDER BY l.created_at
            "#
        ))?;
        let mut loans = stmt
            .query_map(
                params![return_date.format("%Y-%m-%d").to_string()],
                map_loan_row,
            )?
            .collect::<SqliteResult<Vec<_>>>()?;

        for loan in &mut loans {
            loan.items = load_loan_lines(&conn, &loan.id)?;
        }
        Ok(loans)
    }

    /// 各状态单量统计
    pub fn count_by_status(&self) -> RepositoryResult<Vec<(HoldStatus, i64)>> {
        let conn = self.get_conn()?;
        let mut stmt =
            conn.prepare("SELECT status, COUNT(*) FROM equipment_loans GROUP BY status")?;
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

/// 装载借用单的全部明细行 (联器材表取名称与单位)
fn load_loan_lines(conn: &Connection, loan_id: &str) -> RepositoryResult<Vec<LoanLine>> {
    let mut stmt = conn.prepare(
        r#"
        SELECT li.id, li.loan_id, li.equipment_id, e.name, e.unit,
               li.quantity, li.returned_quantity
        FROM equipment_loan_items li
        LEFT JOIN equipment e ON li.equipment_id = e.id
        WHERE li.loan_id = ?1
        ORDER BY li.id
        "#,
    )?;

    let lines = stmt
        .query_map(params![loan_id], map_loan_line_row)?
        .collect::<SqliteResult<Vec<_>>>()?;
    Ok(lines)
}

fn map_loan_row(row: &Row) -> SqliteResult<EquipmentLoan> {
    let borrow_date_str: String = row.get(5)?;
    let return_date_str: String = row.get(6)?;
    let actual_return_str: Option<String> = row.get(7)?;
    let status_str: String = row.get(8)?;
    let decided_at_str: Option<String> = row.get(11)?;
    let created_at_str: String = row.get(12)?;

    let borrow_date = NaiveDate::parse_from_str(&borrow_date_str, "%Y-%m-%d").map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(5, rusqlite::types::Type::Text, Box::new(e))
    })?;
    let return_date = NaiveDate::parse_from_str(&return_date_str, "%Y-%m-%d").map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(6, rusqlite::types::Type::Text, Box::new(e))
    })?;
    let actual_return_date =
        actual_return_str.and_then(|s| NaiveDate::parse_from_str(&s, "%Y-%m-%d").ok());
    let status = HoldStatus::from_str(&status_str).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            8,
            rusqlite::types::Type::Text,
            format!("未知借用状态: {}", status_str).into(),
        )
    })?;
    let decided_at = decided_at_str
        .and_then(|s| NaiveDateTime::parse_from_str(&s, "%Y-%m-%d %H:%M:%S").ok());
    let created_at = NaiveDateTime::parse_from_str(&created_at_str, "%Y-%m-%d %H:%M:%S")
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(12, rusqlite::types::Type::Text, Box::new(e))
        })?;

    Ok(EquipmentLoan {
        id: row.get(0)?,
        user_name: row.get(1)?,
        channel_user_id: row.get(2)?,
        phone: row.get(3)?,
        purpose: row.get(4)?,
        borrow_date,
        return_date,
        actual_return_date,
        status,
        reject_reason: row.get(9)?,
        decided_by: row.get(10)?,
        decided_at,
        created_at,
        items: Vec::new(),
    })
}

fn map_loan_line_row(row: &Row) -> SqliteResult<LoanLine> {
    Ok(LoanLine {
        id: row.get(0)?,
        loan_id: row.get(1)?,
        equipment_id: row.get(2)?,
        equipment_name: row.get(3)?,
        unit: row.get(4)?,
        quantity: row.get(5)?,
        returned_quantity: row.get(6)?,
    })
}
