// ==========================================
// 器材借用全流程端到端测试
// ==========================================
// 目标: 验证有限数量器材在重叠窗口下的占用核算
// 覆盖: EquipmentApi -> ApprovalService(借用) -> AvailabilityEngine
// ==========================================

#[path = "test_helpers.rs"]
mod test_helpers;

use test_helpers::{d, seed_admin, setup_test_env};

use fish_pond_rms::api::ApiError;
use fish_pond_rms::domain::{HoldStatus, LineReturn, LoanDraft, LoanLineDraft};

fn loan(user: &str, borrow: &str, ret: &str, items: Vec<LoanLineDraft>) -> LoanDraft {
    LoanDraft {
        user_name: user.to_string(),
        channel_user_id: Some(format!("U-{}", user)),
        phone: None,
        purpose: Some("塘口作业".to_string()),
        borrow_date: d(borrow),
        return_date: d(ret),
        items,
    }
}

#[test]
fn test_tent_pool_3_plus_3_exceeds_5() {
    let (_tmp, state) = setup_test_env();
    let admin = seed_admin(&state);
    let tent = state
        .equipment_api
        .create_equipment("帐篷", None, 5, "顶", None, &admin)
        .unwrap();

    let first = state
        .equipment_api
        .submit_loan(loan(
            "张三",
            "2025-04-01",
            "2025-04-10",
            vec![LoanLineDraft {
                equipment_id: tent.id,
                quantity: 3,
            }],
        ))
        .unwrap();
    state.equipment_api.approve_loan(&first.id, &admin).unwrap();

    // 剩余 2 顶, 重叠窗口再借 3 顶被拒
    let second = state
        .equipment_api
        .submit_loan(loan(
            "李四",
            "2025-04-05",
            "2025-04-15",
            vec![LoanLineDraft {
                equipment_id: tent.id,
                quantity: 3,
            }],
        ))
        .unwrap();
    let err = state
        .equipment_api
        .approve_loan(&second.id, &admin)
        .unwrap_err();
    match err {
        ApiError::CapacityExceeded {
            resource,
            requested,
            available,
        } => {
            assert!(resource.contains("帐篷"));
            assert_eq!(requested, 3);
            assert_eq!(available, 2);
        }
        other => panic!("期望容量错误, 实得 {:?}", other),
    }

    // 完全错开的窗口不受影响
    let board = state
        .equipment_api
        .availability_board(d("2025-05-01"), d("2025-05-03"))
        .unwrap();
    let row = board
        .iter()
        .find(|r| r.equipment.id == tent.id)
        .expect("台账应包含帐篷");
    assert_eq!(row.available_quantity, 5);
}

#[test]
fn test_return_releases_equipment_for_next_loan() {
    let (_tmp, state) = setup_test_env();
    let admin = seed_admin(&state);
    let pump = state
        .equipment_api
        .create_equipment("抽水泵", None, 2, "台", None, &admin)
        .unwrap();

    let first = state
        .equipment_api
        .submit_loan(loan(
            "张三",
            "2025-04-01",
            "2025-04-20",
            vec![LoanLineDraft {
                equipment_id: pump.id,
                quantity: 2,
            }],
        ))
        .unwrap();
    state.equipment_api.approve_loan(&first.id, &admin).unwrap();
    state.equipment_api.mark_borrowed(&first.id, &admin).unwrap();

    let second = state
        .equipment_api
        .submit_loan(loan(
            "李四",
            "2025-04-10",
            "2025-04-18",
            vec![LoanLineDraft {
                equipment_id: pump.id,
                quantity: 1,
            }],
        ))
        .unwrap();
    assert!(state
        .equipment_api
        .approve_loan(&second.id, &admin)
        .is_err());

    // 归还后占用解除
    let returned = state
        .equipment_api
        .mark_returned(&first.id, None, &admin)
        .unwrap();
    assert_eq!(returned.status, HoldStatus::Returned);

    let approved = state
        .equipment_api
        .approve_loan(&second.id, &admin)
        .unwrap();
    assert_eq!(approved.status, HoldStatus::Approved);
}

#[test]
fn test_multi_line_approval_is_all_or_nothing() {
    let (_tmp, state) = setup_test_env();
    let admin = seed_admin(&state);
    let net = state
        .equipment_api
        .create_equipment("拉网", None, 4, "张", None, &admin)
        .unwrap();
    let boat = state
        .equipment_api
        .create_equipment("小船", None, 1, "条", None, &admin)
        .unwrap();

    // 占住小船
    let holder = state
        .equipment_api
        .submit_loan(loan(
            "张三",
            "2025-04-01",
            "2025-04-30",
            vec![LoanLineDraft {
                equipment_id: boat.id,
                quantity: 1,
            }],
        ))
        .unwrap();
    state.equipment_api.approve_loan(&holder.id, &admin).unwrap();

    // 两行申请: 拉网足够, 小船不够 -> 整单拒绝
    let mixed = state
        .equipment_api
        .submit_loan(loan(
            "李四",
            "2025-04-10",
            "2025-04-20",
            vec![
                LoanLineDraft {
                    equipment_id: net.id,
                    quantity: 2,
                },
                LoanLineDraft {
                    equipment_id: boat.id,
                    quantity: 1,
                },
            ],
        ))
        .unwrap();
    let err = state
        .equipment_api
        .approve_loan(&mixed.id, &admin)
        .unwrap_err();
    assert!(matches!(err, ApiError::CapacityExceeded { ref resource, .. } if resource.contains("小船")));

    // 拉网行不得被部分占用
    let board = state
        .equipment_api
        .availability_board(d("2025-04-10"), d("2025-04-20"))
        .unwrap();
    let net_row = board.iter().find(|r| r.equipment.id == net.id).unwrap();
    assert_eq!(net_row.available_quantity, 4);

    let row = state.equipment_api.get_loan(&mixed.id).unwrap();
    assert_eq!(row.status, HoldStatus::Pending);
}

#[test]
fn test_partial_return_keeps_loan_open() {
    let (_tmp, state) = setup_test_env();
    let admin = seed_admin(&state);
    let bucket = state
        .equipment_api
        .create_equipment("鱼筐", None, 10, "只", None, &admin)
        .unwrap();

    let l = state
        .equipment_api
        .submit_loan(loan(
            "张三",
            "2025-04-01",
            "2025-04-08",
            vec![LoanLineDraft {
                equipment_id: bucket.id,
                quantity: 6,
            }],
        ))
        .unwrap();
    state.equipment_api.approve_loan(&l.id, &admin).unwrap();
    state.equipment_api.mark_borrowed(&l.id, &admin).unwrap();

    // 先还 4 只, 单子保持借出
    let partial = state
        .equipment_api
        .mark_returned(
            &l.id,
            Some(&[LineReturn {
                equipment_id: bucket.id,
                quantity: 4,
            }]),
            &admin,
        )
        .unwrap();
    assert_eq!(partial.status, HoldStatus::Borrowed);
    assert!(!partial.fully_returned());

    // 补还剩余 2 只后闭单
    let full = state
        .equipment_api
        .mark_returned(
            &l.id,
            Some(&[LineReturn {
                equipment_id: bucket.id,
                quantity: 2,
            }]),
            &admin,
        )
        .unwrap();
    assert_eq!(full.status, HoldStatus::Returned);
    assert!(full.fully_returned());
}
