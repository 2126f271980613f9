// ==========================================
// 渔场设施预定与物资管理系统 - 可用量计算引擎
// ==========================================
// 职责: 按资源类型计算窗口内可用量
// 口径:
// - 鱼池: 独占资源, pending/approved 均计入占用 (防并行提交互相挤占),
//   维护中一律不可用; 可用量为 0 或 1
// - 器材: 共享池, 仅 approved/borrowed/overdue 的未归还量计入占用,
//   pending 不占用; 可用量 = 总量 - 窗口内已承诺量
// - 物资: 无时间维度, 可用量即当前台账余额
// 停用 (inactive) 资源可用量一律为 0
// ==========================================

use crate::domain::equipment::Equipment;
use crate::domain::pond::Pond;
use crate::domain::types::{CatalogStatus, DateWindow, PondStatus};
use crate::engine::repositories::ResourceRepositories;
use crate::repository::error::{RepositoryError, RepositoryResult};
use chrono::NaiveDate;
use tracing::instrument;

// ==========================================
// AvailabilityEngine - 可用量计算
// ==========================================
pub struct AvailabilityEngine {
    repos: ResourceRepositories,
}

impl AvailabilityEngine {
    pub fn new(repos: ResourceRepositories) -> Self {
        Self { repos }
    }

    /// 鱼池窗口可用量 (0 或 1)
    ///
    /// # 参数
    /// - `pond_id`: 鱼池 ID
    /// - `window`: 请求窗口 (闭区间, 允许 start == end 单日使用)
    ///
    /// # 返回
    /// - Ok(1): 窗口内可预定
    /// - Ok(0): 维护中或已有 pending/approved 预定重叠
    /// - Err(NotFound): 鱼池不存在
    #[instrument(skip(self, window), fields(window = %window))]
    pub fn pond_availability(&self, pond_id: i64, window: DateWindow) -> RepositoryResult<i64> {
        let pond = self.require_pond(pond_id)?;
        if pond.status == PondStatus::Maintenance {
            return Ok(0);
        }

        let overlapping = self
            .repos
            .reservation_repo
            .find_active_overlapping(pond_id, window, None)?;
        if overlapping.is_empty() {
            Ok(1)
        } else {
            Ok(0)
        }
    }

    /// 器材窗口可用量 (总量 - 已承诺量, 下限 0)
    ///
    /// # 返回
    /// - Err(NotFound): 器材不存在
    #[instrument(skip(self, window), fields(window = %window))]
    pub fn equipment_availability(
        &self,
        equipment_id: i64,
        window: DateWindow,
    ) -> RepositoryResult<i64> {
        let equipment = self.require_equipment(equipment_id)?;
        if equipment.status == CatalogStatus::Inactive {
            return Ok(0);
        }

        let committed = self
            .repos
            .loan_repo
            .committed_quantity(equipment_id, window, None)?;
        Ok((equipment.total_quantity - committed).max(0))
    }

    /// 物资可用量 (当前台账余额)
    ///
    /// # 返回
    /// - Err(NotFound): 物资不存在
    pub fn stock_availability(&self, item_id: i64) -> RepositoryResult<i64> {
        let item = self
            .repos
            .stock_repo
            .find_item_by_id(item_id)?
            .ok_or_else(|| RepositoryError::NotFound {
                entity: "物资".to_string(),
                id: item_id.to_string(),
            })?;
        if item.status == CatalogStatus::Inactive {
            return Ok(0);
        }
        Ok(item.current_quantity)
    }

    /// 指定日期可预定的鱼池列表 (机器人选池)
    pub fn available_ponds(&self, on_date: NaiveDate) -> RepositoryResult<Vec<Pond>> {
        self.repos.pond_repo.find_available(on_date)
    }

    /// 全部在用器材在窗口内的可用量 (借用入口列表)
    pub fn equipment_availability_board(
        &self,
        window: DateWindow,
    ) -> RepositoryResult<Vec<(Equipment, i64)>> {
        let equipment = self.repos.equipment_repo.find_active()?;
        let mut board = Vec::with_capacity(equipment.len());
        for item in equipment {
            let committed = self
                .repos
                .loan_repo
                .committed_quantity(item.id, window, None)?;
            let available = (item.total_quantity - committed).max(0);
            board.push((item, available));
        }
        Ok(board)
    }

    fn require_pond(&self, pond_id: i64) -> RepositoryResult<Pond> {
        self.repos
            .pond_repo
            .find_by_id(pond_id)?
            .ok_or_else(|| RepositoryError::NotFound {
                entity: "鱼池".to_string(),
                id: pond_id.to_string(),
            })
    }

    fn require_equipment(&self, equipment_id: i64) -> RepositoryResult<Equipment> {
        self.repos
            .equipment_repo
            .find_by_id(equipment_id)?
            .ok_or_else(|| RepositoryError::NotFound {
                entity: "器材".to_string(),
                id: equipment_id.to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::init_db_schema;
    use crate::domain::pond::PondReservation;
    use crate::domain::types::{HoldStatus, PondSizeClass};
    use chrono::NaiveDate;
    use rusqlite::Connection;
    use std::sync::{Arc, Mutex};

    fn setup() -> (ResourceRepositories, AvailabilityEngine) {
        let conn = Connection::open_in_memory().unwrap();
        init_db_schema(&conn).unwrap();
        let conn = Arc::new(Mutex::new(conn));
        let repos = ResourceRepositories::from_conn(conn);
        let engine = AvailabilityEngine::new(repos.clone());
        (repos, engine)
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn window(start: NaiveDate, end: NaiveDate) -> DateWindow {
        DateWindow::new(start, end).unwrap()
    }

    fn reservation(pond_id: i64, start: NaiveDate, end: NaiveDate, status: HoldStatus) -> PondReservation {
        PondReservation {
            id: uuid::Uuid::new_v4().to_string(),
            pond_id,
            pond_code: None,
            user_name: "张三".to_string(),
            fish_type: Some("草鱼".to_string()),
            fish_quantity: Some(500),
            phone: None,
            channel_user_id: Some("U001".to_string()),
            start_date: start,
            end_date: end,
            status,
            reject_reason: None,
            decided_by: None,
            decided_at: None,
            created_at: date(2025, 1, 1).and_hms_opt(8, 0, 0).unwrap(),
        }
    }

    #[test]
    fn test_pond_availability_counts_pending_and_approved() {
        let (repos, engine) = setup();
        let pond_id = repos
            .pond_repo
            .insert("A1", "A", Some("A1号池"), PondSizeClass::Medium)
            .unwrap();

        let win = window(date(2025, 1, 10), date(2025, 1, 20));
        assert_eq!(engine.pond_availability(pond_id, win).unwrap(), 1);

        // pending 预定也计入占用
        repos
            .reservation_repo
            .insert(&reservation(
                pond_id,
                date(2025, 1, 15),
                date(2025, 1, 25),
                HoldStatus::Pending,
            ))
            .unwrap();
        assert_eq!(engine.pond_availability(pond_id, win).unwrap(), 0);

        // 不重叠窗口不受影响
        let later = window(date(2025, 1, 26), date(2025, 1, 30));
        assert_eq!(engine.pond_availability(pond_id, later).unwrap(), 1);
    }

    #[test]
    fn test_pond_availability_ignores_terminal_holds() {
        let (repos, engine) = setup();
        let pond_id = repos
            .pond_repo
            .insert("A2", "A", Some("A2号池"), PondSizeClass::Medium)
            .unwrap();

        for status in [
            HoldStatus::Rejected,
            HoldStatus::Cancelled,
            HoldStatus::Completed,
        ] {
            repos
                .reservation_repo
                .insert(&reservation(
                    pond_id,
                    date(2025, 2, 1),
                    date(2025, 2, 10),
                    status,
                ))
                .unwrap();
        }

        let win = window(date(2025, 2, 1), date(2025, 2, 10));
        assert_eq!(engine.pond_availability(pond_id, win).unwrap(), 1);
    }

    #[test]
    fn test_pond_availability_inclusive_boundary_overlap() {
        let (repos, engine) = setup();
        let pond_id = repos
            .pond_repo
            .insert("A3", "A", Some("A3号池"), PondSizeClass::Medium)
            .unwrap();
        repos
            .reservation_repo
            .insert(&reservation(
                pond_id,
                date(2025, 3, 1),
                date(2025, 3, 10),
                HoldStatus::Approved,
            ))
            .unwrap();

        // 同日边界接触按重叠处理
        let touching = window(date(2025, 3, 10), date(2025, 3, 15));
        assert_eq!(engine.pond_availability(pond_id, touching).unwrap(), 0);

        // 次日起不重叠
        let after = window(date(2025, 3, 11), date(2025, 3, 15));
        assert_eq!(engine.pond_availability(pond_id, after).unwrap(), 1);
    }

    #[test]
    fn test_pond_availability_maintenance_always_zero() {
        let (repos, engine) = setup();
        let pond_id = repos
            .pond_repo
            .insert("B1", "B", Some("B1号池"), PondSizeClass::Large)
            .unwrap();
        repos
            .pond_repo
            .update_status(pond_id, PondStatus::Maintenance)
            .unwrap();

        let win = window(date(2025, 4, 1), date(2025, 4, 5));
        assert_eq!(engine.pond_availability(pond_id, win).unwrap(), 0);
    }

    #[test]
    fn test_pond_availability_unknown_pond_is_not_found() {
        let (_repos, engine) = setup();
        let win = window(date(2025, 4, 1), date(2025, 4, 5));
        let err = engine.pond_availability(9999, win).unwrap_err();
        assert!(matches!(err, RepositoryError::NotFound { .. }));
    }

    #[test]
    fn test_equipment_availability_pending_does_not_reserve() {
        let (repos, engine) = setup();
        let equipment_id = repos
            .equipment_repo
            .insert("帐篷", None, 5, "顶", None)
            .unwrap();

        let win = window(date(2025, 6, 1), date(2025, 6, 5));
        assert_eq!(engine.equipment_availability(equipment_id, win).unwrap(), 5);

        // pending 借用不占用
        let mut loan = crate::domain::equipment::EquipmentLoan {
            id: uuid::Uuid::new_v4().to_string(),
            user_name: "李四".to_string(),
            channel_user_id: None,
            phone: None,
            purpose: None,
            borrow_date: date(2025, 6, 1),
            return_date: date(2025, 6, 5),
            actual_return_date: None,
            status: HoldStatus::Pending,
            reject_reason: None,
            decided_by: None,
            decided_at: None,
            created_at: date(2025, 5, 28).and_hms_opt(9, 0, 0).unwrap(),
            items: vec![crate::domain::equipment::LoanLine {
                id: 0,
                loan_id: String::new(),
                equipment_id,
                equipment_name: None,
                unit: None,
                quantity: 3,
                returned_quantity: 0,
            }],
        };
        repos.loan_repo.insert(&loan).unwrap();
        assert_eq!(engine.equipment_availability(equipment_id, win).unwrap(), 5);

        // approved 后占用 3, 剩 2
        loan.id = uuid::Uuid::new_v4().to_string();
        loan.status = HoldStatus::Approved;
        repos.loan_repo.insert(&loan).unwrap();
        assert_eq!(engine.equipment_availability(equipment_id, win).unwrap(), 2);

        // 不重叠窗口恢复满量
        let later = window(date(2025, 6, 6), date(2025, 6, 10));
        assert_eq!(engine.equipment_availability(equipment_id, later).unwrap(), 5);
    }

    #[test]
    fn test_equipment_availability_partial_return_releases() {
        let (repos, engine) = setup();
        let equipment_id = repos
            .equipment_repo
            .insert("救生衣", None, 10, "件", None)
            .unwrap();

        let loan = crate::domain::equipment::EquipmentLoan {
            id: uuid::Uuid::new_v4().to_string(),
            user_name: "王五".to_string(),
            channel_user_id: None,
            phone: None,
            purpose: None,
            borrow_date: date(2025, 7, 1),
            return_date: date(2025, 7, 10),
            actual_return_date: None,
            status: HoldStatus::Borrowed,
            reject_reason: None,
            decided_by: None,
            decided_at: None,
            created_at: date(2025, 6, 28).and_hms_opt(9, 0, 0).unwrap(),
            items: vec![crate::domain::equipment::LoanLine {
                id: 0,
                loan_id: String::new(),
                equipment_id,
                equipment_name: None,
                unit: None,
                quantity: 6,
                returned_quantity: 4,
            }],
        };
        repos.loan_repo.insert(&loan).unwrap();

        // 未归还 2 件计入占用
        let win = window(date(2025, 7, 5), date(2025, 7, 8));
        assert_eq!(engine.equipment_availability(equipment_id, win).unwrap(), 8);
    }

    #[test]
    fn test_stock_availability_is_current_balance() {
        let (repos, engine) = setup();
        let item_id = repos
            .stock_repo
            .insert_item("鱼饲料", None, "袋", 35.0, 5, None)
            .unwrap();

        // 新建物资余额恒为 0
        assert_eq!(engine.stock_availability(item_id).unwrap(), 0);

        let err = engine.stock_availability(8888).unwrap_err();
        assert!(matches!(err, RepositoryError::NotFound { .. }));
    }
}
