// ==========================================
// 渔场设施预定与物资管理系统 - 物资台账服务
// ==========================================
// 职责: 台账追加与余额投影的原子落账
// 不变式:
// - 出库后余额不得为负, 违反时整笔不写 (InsufficientStock)
// - current_quantity 必须等于该物资全部 signed_effect 之和
// - 台账只追加, 不改不删
// 盘点 (adjust) 记录的是权威新余额与原余额的带符号差额
// ==========================================

use crate::domain::action_log::{ActionLog, ActionType};
use crate::domain::stock::{LedgerMeta, StockLedgerEntry};
use crate::domain::types::LedgerEntryKind;
use crate::engine::events::{Notification, NotificationKind, OptionalNotificationSink};
use crate::repository::error::{RepositoryError, RepositoryResult};
use crate::repository::ActionLogRepository;
use chrono::NaiveDateTime;
use rusqlite::{params, Connection, OptionalExtension, Transaction};
use std::sync::{Arc, Mutex};
use uuid::Uuid;

/// 一次落账的结果
#[derive(Debug, Clone)]
pub struct PostedEntry {
    /// 写入的台账记录
    pub entry: StockLedgerEntry,
    /// 落账后的余额
    pub balance_after: i64,
    /// 是否触发低库存预警
    pub low_stock: bool,
}

/// 台账操作
pub(crate) enum LedgerOp {
    /// 入库, 可选更新参考单价
    In {
        quantity: i64,
        unit_price: Option<f64>,
    },
    /// 出库
    Out { quantity: i64 },
    /// 盘点校正到权威新余额
    AdjustTo { new_quantity: i64 },
}

// ==========================================
// LedgerService - 台账服务
// ==========================================
pub struct LedgerService {
    conn: Arc<Mutex<Connection>>,
    log_repo: Arc<ActionLogRepository>,
    notifier: OptionalNotificationSink,
}

impl LedgerService {
    /// 创建台账服务 (log_repo 须与 conn 共用同一连接)
    pub fn new(
        conn: Arc<Mutex<Connection>>,
        log_repo: Arc<ActionLogRepository>,
        notifier: OptionalNotificationSink,
    ) -> Self {
        Self {
            conn,
            log_repo,
            notifier,
        }
    }

    /// 入库
    ///
    /// # 参数
    /// - `unit_price`: 本次进价, 提供时同步更新物资参考单价
    pub fn post_in(
        &self,
        item_id: i64,
        quantity: i64,
        unit_price: Option<f64>,
        meta: LedgerMeta,
    ) -> RepositoryResult<PostedEntry> {
        let posted = self.post_locked(item_id, LedgerOp::In { quantity, unit_price }, &meta)?;
        // In 必定产生记录
        posted.ok_or_else(|| RepositoryError::InternalError("入库未产生台账记录".to_string()))
    }

    /// 出库 (余额不足时整笔失败, 不产生任何写入)
    pub fn post_out(
        &self,
        item_id: i64,
        quantity: i64,
        meta: LedgerMeta,
    ) -> RepositoryResult<PostedEntry> {
        let posted = self.post_locked(item_id, LedgerOp::Out { quantity }, &meta)?;
        posted.ok_or_else(|| RepositoryError::InternalError("出库未产生台账记录".to_string()))
    }

    /// 盘点校正到权威新余额
    ///
    /// # 返回
    /// - Ok(Some): 差额非零, 已落账
    /// - Ok(None): 新余额与当前一致, 不产生记录
    pub fn post_adjust(
        &self,
        item_id: i64,
        new_quantity: i64,
        meta: LedgerMeta,
    ) -> RepositoryResult<Option<PostedEntry>> {
        self.post_locked(item_id, LedgerOp::AdjustTo { new_quantity }, &meta)
    }

    /// 当前余额
    pub fn balance(&self, item_id: i64) -> RepositoryResult<i64> {
        let conn = self
            .conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))?;
        let balance: Option<i64> = conn
            .query_row(
                "SELECT current_quantity FROM stock_items WHERE id = ?1",
                params![item_id],
                |row| row.get(0),
            )
            .optional()?;
        balance.ok_or_else(|| RepositoryError::NotFound {
            entity: "物资".to_string(),
            id: item_id.to_string(),
        })
    }

    /// 加锁开事务落账, 提交后补记日志与预警
    fn post_locked(
        &self,
        item_id: i64,
        op: LedgerOp,
        meta: &LedgerMeta,
    ) -> RepositoryResult<Option<PostedEntry>> {
        let now = chrono::Local::now().naive_local();
        let posted = {
            let mut conn = self
                .conn
                .lock()
                .map_err(|e| RepositoryError::LockError(e.to_string()))?;
            let tx = conn.transaction()?;
            let posted = apply_ledger_op_tx(&tx, item_id, &op, meta, now)?;
            tx.commit()?;
            posted
        };

        if let Some(posted) = &posted {
            tracing::info!(
                "台账落账: item_id={}, kind={}, effect={}, balance={}",
                item_id,
                posted.entry.entry_kind,
                posted.entry.signed_effect,
                posted.balance_after
            );
            self.record_log(posted, meta);
            if posted.low_stock && self.low_stock_alerts_enabled() {
                self.alert_low_stock(posted);
            }
        }
        Ok(posted)
    }

    /// 低库存预警开关 (config_kv, 默认开; 读取失败视为开)
    fn low_stock_alerts_enabled(&self) -> bool {
        let Ok(conn) = self.conn.lock() else {
            return true;
        };
        let value: Option<String> = conn
            .query_row(
                "SELECT value FROM config_kv WHERE scope_id = 'global' AND key = ?1",
                params![crate::config::config_keys::LOW_STOCK_ALERT_ENABLED],
                |row| row.get(0),
            )
            .optional()
            .unwrap_or(None);
        !matches!(
            value.as_deref().map(str::trim),
            Some("false") | Some("0") | Some("off")
        )
    }

    fn record_log(&self, posted: &PostedEntry, meta: &LedgerMeta) {
        let action = match posted.entry.entry_kind {
            LedgerEntryKind::In => ActionType::StockIn,
            LedgerEntryKind::Out => ActionType::StockOut,
            LedgerEntryKind::Adjust => ActionType::StockAdjust,
        };
        let item_name = posted.entry.item_name.as_deref().unwrap_or("?");
        let log = ActionLog::new(action, meta.created_by.map(|id| id.to_string()))
            .with_item(posted.entry.item_id)
            .with_details(format!(
                "{}: {} 数量{} 余额{}",
                action.as_str(),
                item_name,
                posted.entry.quantity,
                posted.balance_after
            ));
        if let Err(e) = self.log_repo.insert(&log) {
            tracing::warn!("操作日志记录失败: {}", e);
        }
    }

    fn alert_low_stock(&self, posted: &PostedEntry) {
        let item_name = posted.entry.item_name.as_deref().unwrap_or("?");
        self.notifier.deliver_best_effort(Notification::to_admins(
            NotificationKind::LowStockAlert,
            format!("物资低库存预警: {} 余额仅剩 {}", item_name, posted.balance_after),
            Some(posted.entry.id.clone()),
        ));
    }
}

/// 事务内落账核心: 读余额、校验、追加台账、刷新投影
///
/// 领用审批在自己的事务里按行调用, 保证扣减与状态迁移同事务
pub(crate) fn apply_ledger_op_tx(
    tx: &Transaction,
    item_id: i64,
    op: &LedgerOp,
    meta: &LedgerMeta,
    now: NaiveDateTime,
) -> RepositoryResult<Option<PostedEntry>> {
    let row: Option<(String, f64, i64, i64)> = tx
        .query_row(
            "SELECT name, unit_price, current_quantity, min_quantity FROM stock_items WHERE id = ?1",
            params![item_id],
            |row| {
                Ok((
                    row.get(0)?,
                    row.get(1)?,
                    row.get(2)?,
                    row.get(3)?,
                ))
            },
        )
        .optional()?;
    let (item_name, item_price, balance, min_quantity) =
        row.ok_or_else(|| RepositoryError::NotFound {
            entity: "物资".to_string(),
            id: item_id.to_string(),
        })?;

    let (kind, quantity, signed_effect, entry_price, price_override) = match op {
        LedgerOp::In { quantity, unit_price } => {
            if *quantity <= 0 {
                return Err(RepositoryError::FieldValueError {
                    field: "quantity".to_string(),
                    message: "入库数量必须为正".to_string(),
                });
            }
            let price = unit_price.unwrap_or(item_price);
            (LedgerEntryKind::In, *quantity, *quantity, Some(price), *unit_price)
        }
        LedgerOp::Out { quantity } => {
            if *quantity <= 0 {
                return Err(RepositoryError::FieldValueError {
                    field: "quantity".to_string(),
                    message: "出库数量必须为正".to_string(),
                });
            }
            if *quantity > balance {
                return Err(RepositoryError::InsufficientStock {
                    item: item_name,
                    requested: *quantity,
                    available: balance,
                });
            }
            (LedgerEntryKind::Out, *quantity, -*quantity, Some(item_price), None)
        }
        LedgerOp::AdjustTo { new_quantity } => {
            if *new_quantity < 0 {
                return Err(RepositoryError::FieldValueError {
                    field: "new_quantity".to_string(),
                    message: "盘点余额不能为负".to_string(),
                });
            }
            let delta = new_quantity - balance;
            if delta == 0 {
                return Ok(None);
            }
            (LedgerEntryKind::Adjust, delta.abs(), delta, None, None)
        }
    };

    let new_balance = balance + signed_effect;
    let entry_id = Uuid::new_v4().to_string();
    let total_price = entry_price.map(|p| p * quantity as f64);

    tx.execute(
        r#"
        INSERT INTO stock_ledger (
            id, item_id, entry_kind, quantity, signed_effect, unit_price,
            total_price, reference_no, note, created_by, created_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
        "#,
        params![
            entry_id,
            item_id,
            kind.to_db_str(),
            quantity,
            signed_effect,
            entry_price,
            total_price,
            meta.reference_no,
            meta.note,
            meta.created_by,
            now.format("%Y-%m-%d %H:%M:%S").to_string(),
        ],
    )?;

    match price_override {
        Some(price) => {
            tx.execute(
                "UPDATE stock_items SET current_quantity = ?1, unit_price = ?2 WHERE id = ?3",
                params![new_balance, price, item_id],
            )?;
        }
        None => {
            tx.execute(
                "UPDATE stock_items SET current_quantity = ?1 WHERE id = ?2",
                params![new_balance, item_id],
            )?;
        }
    }

    let entry = StockLedgerEntry {
        id: entry_id,
        item_id,
        item_name: Some(item_name),
        entry_kind: kind,
        quantity,
        signed_effect,
        unit_price: entry_price,
        total_price,
        reference_no: meta.reference_no.clone(),
        note: meta.note.clone(),
        created_by: meta.created_by,
        admin_name: None,
        created_at: now,
    };
    Ok(Some(PostedEntry {
        low_stock: min_quantity > 0 && new_balance <= min_quantity,
        balance_after: new_balance,
        entry,
    }))
}
