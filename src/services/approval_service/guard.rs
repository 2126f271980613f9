// ==========================================
// 审批护栏 - 事务内的重查与写回
// ==========================================
// 这里的函数只接受 &Transaction: 连接互斥锁不可重入,
// 事务持有期间一律不得经由 Repository 再取连接
// ==========================================

use super::*;
use chrono::NaiveDate;
use rusqlite::types::Type;

fn fmt_date(d: NaiveDate) -> String {
    d.format("%Y-%m-%d").to_string()
}

fn fmt_datetime(t: NaiveDateTime) -> String {
    t.format("%Y-%m-%d %H:%M:%S").to_string()
}

fn parse_date(idx: usize, s: &str) -> rusqlite::Result<NaiveDate> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn parse_status(idx: usize, s: &str) -> rusqlite::Result<HoldStatus> {
    HoldStatus::from_str(s).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            idx,
            Type::Text,
            format!("未知单据状态: {}", s).into(),
        )
    })
}

fn parse_pond_status(idx: usize, s: &str) -> rusqlite::Result<PondStatus> {
    PondStatus::from_str(s).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            idx,
            Type::Text,
            format!("未知鱼池状态: {}", s).into(),
        )
    })
}

// ==========================================
// 鱼池预定
// ==========================================

/// 事务内加载的预定单关键字段 (联 ponds 取池号与鱼池状态)
pub(super) struct ReservationRow {
    pub pond_id: i64,
    pub pond_code: String,
    pub pond_status: PondStatus,
    pub user_name: String,
    pub channel_user_id: Option<String>,
    pub window: DateWindow,
    pub status: HoldStatus,
}

pub(super) fn load_reservation_tx(tx: &Transaction, id: &str) -> RepositoryResult<ReservationRow> {
    let row = tx
        .query_row(
            r#"
            SELECT r.pond_id, p.pond_code, p.status, r.user_name,
                   r.channel_user_id, r.start_date, r.end_date, r.status
            FROM pond_reservations r
            JOIN ponds p ON r.pond_id = p.id
            WHERE r.id = ?1
            "#,
            params![id],
            |row| {
                let pond_status: String = row.get(2)?;
                let start: String = row.get(5)?;
                let end: String = row.get(6)?;
                let status: String = row.get(7)?;
                Ok(ReservationRow {
                    pond_id: row.get(0)?,
                    pond_code: row.get(1)?,
                    pond_status: parse_pond_status(2, &pond_status)?,
                    user_name: row.get(3)?,
                    channel_user_id: row.get(4)?,
                    window: DateWindow {
                        start: parse_date(5, &start)?,
                        end: parse_date(6, &end)?,
                    },
                    status: parse_status(7, &status)?,
                })
            },
        )
        .optional()?;
    row.ok_or_else(|| RepositoryError::NotFound {
        entity: "预定单".to_string(),
        id: id.to_string(),
    })
}

/// 同池同窗口是否存在其他已批准单 (闭区间重叠, 排除自身)
pub(super) fn approved_overlap_exists_tx(
    tx: &Transaction,
    pond_id: i64,
    window: DateWindow,
    exclude_id: &str,
) -> RepositoryResult<bool> {
    let count: i64 = tx.query_row(
        r#"
        SELECT COUNT(*)
        FROM pond_reservations
        WHERE pond_id = ?1
          AND status = 'approved'
          AND start_date <= ?2
          AND end_date >= ?3
          AND id != ?4
        "#,
        params![
            pond_id,
            fmt_date(window.end),
            fmt_date(window.start),
            exclude_id
        ],
        |row| row.get(0),
    )?;
    Ok(count > 0)
}

pub(super) fn decide_reservation_tx(
    tx: &Transaction,
    id: &str,
    to: HoldStatus,
    decided_by: i64,
    reject_reason: Option<&str>,
    now: NaiveDateTime,
) -> RepositoryResult<()> {
    tx.execute(
        r#"
        UPDATE pond_reservations
        SET status = ?1, reject_reason = ?2, decided_by = ?3, decided_at = ?4
        WHERE id = ?5
        "#,
        params![to.to_db_str(), reject_reason, decided_by, fmt_datetime(now), id],
    )?;
    Ok(())
}

/// 仅改状态 (取消/完成不覆盖审批人信息)
pub(super) fn set_reservation_status_tx(
    tx: &Transaction,
    id: &str,
    to: HoldStatus,
) -> RepositoryResult<()> {
    tx.execute(
        "UPDATE pond_reservations SET status = ?1 WHERE id = ?2",
        params![to.to_db_str(), id],
    )?;
    Ok(())
}

// ==========================================
// 器材借用
// ==========================================

pub(super) struct LoanRow {
    pub user_name: String,
    pub channel_user_id: Option<String>,
    pub window: DateWindow,
    pub status: HoldStatus,
}

pub(super) fn load_loan_tx(tx: &Transaction, id: &str) -> RepositoryResult<LoanRow> {
    let row = tx
        .query_row(
            r#"
            SELECT user_name, channel_user_id, borrow_date, return_date, status
            FROM equipment_loans
            WHERE id = ?1
            "#,
            params![id],
            |row| {
                let start: String = row.get(2)?;
                let end: String = row.get(3)?;
                let status: String = row.get(4)?;
                Ok(LoanRow {
                    user_name: row.get(0)?,
                    channel_user_id: row.get(1)?,
                    window: DateWindow {
                        start: parse_date(2, &start)?,
                        end: parse_date(3, &end)?,
                    },
                    status: parse_status(4, &status)?,
                })
            },
        )
        .optional()?;
    row.ok_or_else(|| RepositoryError::NotFound {
        entity: "借用单".to_string(),
        id: id.to_string(),
    })
}

/// 明细行连同器材目录信息 (审批护栏与归还登记共用)
pub(super) struct LoanLineRow {
    pub line_id: i64,
    pub equipment_id: i64,
    pub equipment_name: String,
    pub total_quantity: i64,
    pub active: bool,
    pub quantity: i64,
    pub returned_quantity: i64,
}

pub(super) fn load_loan_lines_tx(
    tx: &Transaction,
    loan_id: &str,
) -> RepositoryResult<Vec<LoanLineRow>> {
    let mut stmt = tx.prepare(
        r#"
        SELECT li.id, li.equipment_id, e.name, e.total_quantity, e.status,
               li.quantity, li.returned_quantity
        FROM equipment_loan_items li
        JOIN equipment e ON li.equipment_id = e.id
        WHERE li.loan_id = ?1
        ORDER BY li.id
        "#,
    )?;
    let lines = stmt
        .query_map(params![loan_id], |row| {
            let status: String = row.get(4)?;
            Ok(LoanLineRow {
                line_id: row.get(0)?,
                equipment_id: row.get(1)?,
                equipment_name: row.get(2)?,
                total_quantity: row.get(3)?,
                active: status == "active",
                quantity: row.get(5)?,
                returned_quantity: row.get(6)?,
            })
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(lines)
}

/// 窗口内已承诺的器材数量 (approved/borrowed/overdue, 扣除已归还, 排除自身)
pub(super) fn committed_equipment_tx(
    tx: &Transaction,
    equipment_id: i64,
    window: DateWindow,
    exclude_loan_id: &str,
) -> RepositoryResult<i64> {
    let committed: i64 = tx.query_row(
        r#"
        SELECT COALESCE(SUM(li.quantity - li.returned_quantity), 0)
        FROM equipment_loan_items li
        JOIN equipment_loans l ON li.loan_id = l.id
        WHERE li.equipment_id = ?1
          AND l.status IN ('approved', 'borrowed', 'overdue')
          AND l.borrow_date <= ?2
          AND l.return_date >= ?3
          AND l.id != ?4
        "#,
        params![
            equipment_id,
            fmt_date(window.end),
            fmt_date(window.start),
            exclude_loan_id
        ],
        |row| row.get(0),
    )?;
    Ok(committed)
}

pub(super) fn decide_loan_tx(
    tx: &Transaction,
    id: &str,
    to: HoldStatus,
    decided_by: i64,
    reject_reason: Option<&str>,
    now: NaiveDateTime,
) -> RepositoryResult<()> {
    tx.execute(
        r#"
        UPDATE equipment_loans
        SET status = ?1, reject_reason = ?2, decided_by = ?3, decided_at = ?4
        WHERE id = ?5
        "#,
        params![to.to_db_str(), reject_reason, decided_by, fmt_datetime(now), id],
    )?;
    Ok(())
}

pub(super) fn set_loan_status_tx(
    tx: &Transaction,
    id: &str,
    to: HoldStatus,
) -> RepositoryResult<()> {
    tx.execute(
        "UPDATE equipment_loans SET status = ?1 WHERE id = ?2",
        params![to.to_db_str(), id],
    )?;
    Ok(())
}

/// 全额归还: 状态置 returned 并记实际归还日
pub(super) fn close_loan_returned_tx(
    tx: &Transaction,
    id: &str,
    actual_return_date: NaiveDate,
) -> RepositoryResult<()> {
    tx.execute(
        "UPDATE equipment_loans SET status = 'returned', actual_return_date = ?1 WHERE id = ?2",
        params![fmt_date(actual_return_date), id],
    )?;
    Ok(())
}

pub(super) fn update_loan_line_returned_tx(
    tx: &Transaction,
    line_id: i64,
    returned_quantity: i64,
) -> RepositoryResult<()> {
    tx.execute(
        "UPDATE equipment_loan_items SET returned_quantity = ?1 WHERE id = ?2",
        params![returned_quantity, line_id],
    )?;
    Ok(())
}

// ==========================================
// 物资领用
// ==========================================

pub(super) struct RequisitionRow {
    pub user_name: String,
    pub channel_user_id: Option<String>,
    pub status: HoldStatus,
}

pub(super) fn load_requisition_tx(tx: &Transaction, id: &str) -> RepositoryResult<RequisitionRow> {
    let row = tx
        .query_row(
            r#"
            SELECT user_name, channel_user_id, status
            FROM stock_requisitions
            WHERE id = ?1
            "#,
            params![id],
            |row| {
                let status: String = row.get(2)?;
                Ok(RequisitionRow {
                    user_name: row.get(0)?,
                    channel_user_id: row.get(1)?,
                    status: parse_status(2, &status)?,
                })
            },
        )
        .optional()?;
    row.ok_or_else(|| RepositoryError::NotFound {
        entity: "领用申请".to_string(),
        id: id.to_string(),
    })
}

pub(super) struct RequisitionLineRow {
    pub line_id: i64,
    pub item_id: i64,
    pub item_name: String,
    pub requested_quantity: i64,
}

pub(super) fn load_requisition_lines_tx(
    tx: &Transaction,
    requisition_id: &str,
) -> RepositoryResult<Vec<RequisitionLineRow>> {
    let mut stmt = tx.prepare(
        r#"
        SELECT ri.id, ri.item_id, s.name, ri.requested_quantity
        FROM stock_requisition_items ri
        JOIN stock_items s ON ri.item_id = s.id
        WHERE ri.requisition_id = ?1
        ORDER BY ri.id
        "#,
    )?;
    let lines = stmt
        .query_map(params![requisition_id], |row| {
            Ok(RequisitionLineRow {
                line_id: row.get(0)?,
                item_id: row.get(1)?,
                item_name: row.get(2)?,
                requested_quantity: row.get(3)?,
            })
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(lines)
}

pub(super) fn decide_requisition_tx(
    tx: &Transaction,
    id: &str,
    to: HoldStatus,
    decided_by: i64,
    reject_reason: Option<&str>,
    now: NaiveDateTime,
) -> RepositoryResult<()> {
    tx.execute(
        r#"
        UPDATE stock_requisitions
        SET status = ?1, reject_reason = ?2, decided_by = ?3, decided_at = ?4
        WHERE id = ?5
        "#,
        params![to.to_db_str(), reject_reason, decided_by, fmt_datetime(now), id],
    )?;
    Ok(())
}

pub(super) fn set_requisition_status_tx(
    tx: &Transaction,
    id: &str,
    to: HoldStatus,
) -> RepositoryResult<()> {
    tx.execute(
        "UPDATE stock_requisitions SET status = ?1 WHERE id = ?2",
        params![to.to_db_str(), id],
    )?;
    Ok(())
}

pub(super) fn update_requisition_line_approved_tx(
    tx: &Transaction,
    line_id: i64,
    approved_quantity: i64,
) -> RepositoryResult<()> {
    tx.execute(
        "UPDATE stock_requisition_items SET approved_quantity = ?1 WHERE id = ?2",
        params![approved_quantity, line_id],
    )?;
    Ok(())
}

// ==========================================
// 取消申请
// ==========================================

pub(super) struct CancellationRow {
    pub reservation_id: String,
    pub status: HoldStatus,
}

pub(super) fn load_cancellation_tx(tx: &Transaction, id: &str) -> RepositoryResult<CancellationRow> {
    let row = tx
        .query_row(
            "SELECT reservation_id, status FROM cancellation_requests WHERE id = ?1",
            params![id],
            |row| {
                let status: String = row.get(1)?;
                Ok(CancellationRow {
                    reservation_id: row.get(0)?,
                    status: parse_status(1, &status)?,
                })
            },
        )
        .optional()?;
    row.ok_or_else(|| RepositoryError::NotFound {
        entity: "取消申请".to_string(),
        id: id.to_string(),
    })
}

pub(super) fn decide_cancellation_tx(
    tx: &Transaction,
    id: &str,
    to: HoldStatus,
    decided_by: i64,
    now: NaiveDateTime,
) -> RepositoryResult<()> {
    tx.execute(
        r#"
        UPDATE cancellation_requests
        SET status = ?1, decided_by = ?2, decided_at = ?3
        WHERE id = ?4
        "#,
        params![to.to_db_str(), decided_by, fmt_datetime(now), id],
    )?;
    Ok(())
}
