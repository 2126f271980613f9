// ==========================================
// 渔场设施预定与物资管理系统 - 单据状态机规则
// ==========================================
// 职责: 定义各类单据的合法状态迁移表
// 红线: 无状态、无副作用、无 I/O 操作
// 迁移差异:
// - 鱼池预定: approved 可走 completed (到期回收)
// - 器材借用: approved 可走 borrowed/overdue, 借出后可逾期可归还
// - 物资领用: approved 即扣减完成, 为终态
// - 取消申请: 仅 pending 可裁决, 不支持撤回
// ==========================================

use crate::domain::types::{HoldKind, HoldStatus};
use crate::repository::error::{RepositoryError, RepositoryResult};

// ==========================================
// HoldLifecycle - 状态迁移规则表
// ==========================================
pub struct HoldLifecycle;

impl HoldLifecycle {
    /// 某状态下允许迁往的目标状态
    pub fn allowed_targets(kind: HoldKind, from: HoldStatus) -> &'static [HoldStatus] {
        use HoldStatus::*;
        match kind {
            HoldKind::PondReservation => match from {
                Pending => &[Approved, Rejected, Cancelled],
                Approved => &[Cancelled, Completed],
                _ => &[],
            },
            HoldKind::EquipmentLoan => match from {
                Pending => &[Approved, Rejected, Cancelled],
                Approved => &[Cancelled, Borrowed, Overdue],
                Borrowed => &[Returned, Overdue],
                Overdue => &[Returned],
                _ => &[],
            },
            HoldKind::StockRequisition => match from {
                Pending => &[Approved, Rejected, Cancelled],
                _ => &[],
            },
            HoldKind::CancellationRequest => match from {
                Pending => &[Approved, Rejected],
                _ => &[],
            },
        }
    }

    /// 判断迁移是否合法
    pub fn can_transition(kind: HoldKind, from: HoldStatus, to: HoldStatus) -> bool {
        Self::allowed_targets(kind, from).contains(&to)
    }

    /// 校验迁移, 非法时返回结构化错误
    pub fn assert_transition(
        kind: HoldKind,
        from: HoldStatus,
        to: HoldStatus,
    ) -> RepositoryResult<()> {
        if Self::can_transition(kind, from, to) {
            Ok(())
        } else {
            Err(RepositoryError::InvalidStateTransition {
                from: from.to_string(),
                to: to.to_string(),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use HoldStatus::*;

    #[test]
    fn test_pending_decisions() {
        for kind in [
            HoldKind::PondReservation,
            HoldKind::EquipmentLoan,
            HoldKind::StockRequisition,
        ] {
            assert!(HoldLifecycle::can_transition(kind, Pending, Approved));
            assert!(HoldLifecycle::can_transition(kind, Pending, Rejected));
            assert!(HoldLifecycle::can_transition(kind, Pending, Cancelled));
            assert!(!HoldLifecycle::can_transition(kind, Pending, Completed));
        }
    }

    #[test]
    fn test_pond_reservation_terminal_states() {
        let kind = HoldKind::PondReservation;
        assert!(HoldLifecycle::can_transition(kind, Approved, Completed));
        assert!(HoldLifecycle::can_transition(kind, Approved, Cancelled));
        assert!(!HoldLifecycle::can_transition(kind, Approved, Borrowed));

        for terminal in [Rejected, Cancelled, Completed] {
            assert!(HoldLifecycle::allowed_targets(kind, terminal).is_empty());
        }
    }

    #[test]
    fn test_equipment_loan_borrow_cycle() {
        let kind = HoldKind::EquipmentLoan;
        assert!(HoldLifecycle::can_transition(kind, Approved, Borrowed));
        assert!(HoldLifecycle::can_transition(kind, Borrowed, Returned));
        assert!(HoldLifecycle::can_transition(kind, Borrowed, Overdue));
        assert!(HoldLifecycle::can_transition(kind, Overdue, Returned));

        // 逾期重复扫描不构成合法迁移, 扫描侧必须先过滤
        assert!(!HoldLifecycle::can_transition(kind, Overdue, Overdue));
        assert!(!HoldLifecycle::can_transition(kind, Returned, Borrowed));
    }

    #[test]
    fn test_equipment_loan_never_picked_up_can_go_overdue() {
        // 已批准但一直未领取, 过了归还日也按逾期处理
        assert!(HoldLifecycle::can_transition(
            HoldKind::EquipmentLoan,
            Approved,
            Overdue
        ));
    }

    #[test]
    fn test_stock_requisition_approved_is_terminal() {
        let kind = HoldKind::StockRequisition;
        assert!(HoldLifecycle::allowed_targets(kind, Approved).is_empty());
        assert!(!HoldLifecycle::can_transition(kind, Approved, Cancelled));
    }

    #[test]
    fn test_cancellation_request_no_withdraw() {
        let kind = HoldKind::CancellationRequest;
        assert!(HoldLifecycle::can_transition(kind, Pending, Approved));
        assert!(HoldLifecycle::can_transition(kind, Pending, Rejected));
        assert!(!HoldLifecycle::can_transition(kind, Pending, Cancelled));
    }

    #[test]
    fn test_assert_transition_reports_states() {
        let err = HoldLifecycle::assert_transition(
            HoldKind::PondReservation,
            Completed,
            Approved,
        )
        .unwrap_err();
        match err {
            RepositoryError::InvalidStateTransition { from, to } => {
                assert_eq!(from, "completed");
                assert_eq!(to, "approved");
            }
            other => panic!("意外错误: {:?}", other),
        }
    }
}
