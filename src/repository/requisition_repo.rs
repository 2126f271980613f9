// ==========================================
// 渔场设施预定与物资管理系统 - 物资领用申请数据仓储
// ==========================================
// 单头 (stock_requisitions) + 明细行 (stock_requisition_items) 聚合
// 审批扣减与台账落账由 services::approval_service / services::ledger_service 持有
// ==========================================

use crate::domain::stock::{RequisitionLine, StockRequisition};
use crate::domain::types::HoldStatus;
use crate::repository::error::{RepositoryError, RepositoryResult};
use chrono::NaiveDateTime;
use rusqlite::{params, Connection, OptionalExtension, Result as SqliteResult, Row};
use std::sync::{Arc, Mutex};

const REQUISITION_COLUMNS: &str = r#"
    q.id, q.user_name, q.channel_user_id, q.phone, q.purpose,
    q.status, q.reject_reason, q.decided_by, q.decided_at, q.created_at
"#;

/// 物资领用申请仓储
pub struct RequisitionRepository {
    conn: Arc<Mutex<Connection>>,
}

impl RequisitionRepository {
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    fn get_conn(&self) -> RepositoryResult<std::sync::MutexGuard<Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    /// 插入整张领用申请 (单头 + 明细行, 同一事务)
    pub fn insert(&self, requisition: &StockRequisition) -> RepositoryResult<String> {
        let mut conn = self.get_conn()?;
        let tx = conn.transaction()?;

        tx.execute(
            r#"
            INSERT INTO stock_requisitions (
                id, user_name, channel_user_id, phone, purpose,
                status, reject_reason, decided_by, decided_at, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
            "#,
            params![
                requisition.id,
                requisition.user_name,
                requisition.channel_user_id,
                requisition.phone,
                requisition.purpose,
                requisition.status.to_db_str(),
                requisition.reject_reason,
                requisition.decided_by,
                requisition
                    .decided_at
                    .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string()),
                requisition.created_at.format("%Y-%m-%d %H:%M:%S").to_string(),
            ],
        )?;

        for line in &requisition.items {
            tx.execute(
                r#"
                INSERT INTO stock_requisition_items (requisition_id, item_id, requested_quantity, approved_quantity)
                VALUES (?1, ?2, ?3, ?4)
                "#,
                params![
                    requisition.id,
                    line.item_id,
                    line.requested_quantity,
                    line.approved_quantity
                ],
            )?;
        }

        tx.commit()?;
        Ok(requisition.id.clone())
    }

    /// 按主键查询领用申请 (含明细行)
    pub fn find_by_id(&self, id: &str) -> RepositoryResult<Option<StockRequisition>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {REQUISITION_COLUMNS} FROM stock_requisitions q WHERE q.id = ?1"
        ))?;

        let requisition = stmt
            .query_row(params![id], map_requisition_row)
            .optional()?;
        match requisition {
            Some(mut requisition) => {
                requisition.items = load_requisition_lines(&conn, &requisition.id)?;
                Ok(Some(requisition))
            }
            None => Ok(None),
        }
    }

    /// 查询全部领用申请 (含明细行, 最新提交在前)
    pub fn find_all(&self) -> RepositoryResult<Vec<StockRequisition>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {REQUISITION_COLUMNS} FROM stock_requisitions q ORDER BY q.created_at DESC"
        ))?;
        let mut requisitions = stmt
            .query_map([], map_requisition_row)?
            .collect::<SqliteResult<Vec<_>>>()?;

        for requisition in &mut requisitions {
            requisition.items = load_requisition_lines(&conn, &requisition.id)?;
        }
        Ok(requisitions)
    }

    /// 按状态查询领用申请 (含明细行)
    pub fn find_by_status(&self, status: HoldStatus) -> RepositoryResult<Vec<StockRequisition>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(&format!(
            r#"
            SELECT {REQUISITION_COLUMNS} FROM stock_requisitions q
            WHERE q.status = ?1
            ORDER BY q.created_at DESC
            "#
        ))?;
        let mut requisitions = stmt
            .query_map(params![status.to_db_str()], map_requisition_row)?
            .collect::<SqliteResult<Vec<_>>>()?;

        for requisition in &mut requisitions {
            requisition.items = load_requisition_lines(&conn, &requisition.id)?;
        }
        Ok(requisitions)
    }

    /// 按渠道用户查询领用申请 (机器人"我的申请")
    pub fn find_by_channel_user(
        &self,
        channel_user_id: &str,
    ) -> RepositoryResult<Vec<StockRequisition>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(&format!(
            r#"
            SELECT {REQUISITION_COLUMNS} FROM stock_requisitions q
            WHERE q.channel_user_id = ?1
            ORDER BY q.created_at DESC
            "#
        ))?;
        let mut requisitions = stmt
            .query_map(params![channel_user_id], map_requisition_row)?
            .collect::<SqliteResult<Vec<_>>>()?;

        for requisition in &mut requisitions {
            requisition.items = load_requisition_lines(&conn, &requisition.id)?;
        }
        Ok(requisitions)
    }

    /// 各状态单量统计
    pub fn count_by_status(&self) -> RepositoryResult<Vec<(HoldStatus, i64)>> {
        let conn = self.get_conn()?;
        let mut stmt =
            conn.prepare("SELECT status, COUNT(*) FROM stock_requisitions GROUP BY status")?;
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

/// 装载领用申请的全部明细行 (联物资表取名称与单位)
fn load_requisition_lines(
    conn: &Connection,
    requisition_id: &str,
) -> RepositoryResult<Vec<RequisitionLine>> {
    let mut stmt = conn.prepare(
        r#"
        SELECT ri.id, ri.requisition_id, ri.item_id, i.name, i.unit,
               ri.requested_quantity, ri.approved_quantity
        FROM stock_requisition_items ri
        LEFT JOIN stock_items i ON ri.item_id = i.id
        WHERE ri.requisition_id = ?1
        ORDER BY ri.id
        "#,
    )?;

    let lines = stmt
        .query_map(params![requisition_id], map_requisition_line_row)?
        .collect::<SqliteResult<Vec<_>>>()?;
    Ok(lines)
}

fn map_requisition_row(row: &Row) -> SqliteResult<StockRequisition> {
    let status_str: String = row.get(5)?;
    let decided_at_str: Option<String> = row.get(8)?;
    let created_at_str: String = row.get(9)?;

    let status = HoldStatus::from_str(&status_str).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            5,
            rusqlite::types::Type::Text,
            format!("未知领用状态: {}", status_str).into(),
        )
    })?;
    let decided_at = decided_at_str
        .and_then(|s| NaiveDateTime::parse_from_str(&s, "%Y-%m-%d %H:%M:%S").ok());
    let created_at = NaiveDateTime::parse_from_str(&created_at_str, "%Y-%m-%d %H:%M:%S")
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(9, rusqlite::types::Type::Text, Box::new(e))
        })?;

    Ok(StockRequisition {
        id: row.get(0)?,
        user_name: row.get(1)?,
        channel_user_id: row.get(2)?,
        phone: row.get(3)?,
        purpose: row.get(4)?,
        status,
        reject_reason: row.get(6)?,
        decided_by: row.get(7)?,
        decided_at,
        created_at,
        items: Vec::new(),
    })
}

fn map_requisition_line_row(row: &Row) -> SqliteResult<RequisitionLine> {
    Ok(RequisitionLine {
        id: row.get(0)?,
        requisition_id: row.get(1)?,
        item_id: row.get(2)?,
        item_name: row.get(3)?,
        unit: row.get(4)?,
        requested_quantity: row.get(5)?,
        approved_quantity: row.get(6)?,
    })
}
