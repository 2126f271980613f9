// ==========================================
// 并发审批竞争测试
// ==========================================
// 目标: 两个管理员线程同时批准冲突单据时, 恰好一胜一败, 无半途状态
// 覆盖: 共享连接互斥 -> 审批事务内可用量护栏
// ==========================================

#[path = "test_helpers.rs"]
mod test_helpers;

use test_helpers::{d, seed_admin, setup_test_env};

use std::sync::Arc;
use std::thread;

use fish_pond_rms::api::ApiError;
use fish_pond_rms::domain::{
    HoldStatus, LoanDraft, LoanLineDraft, PondSizeClass, ReservationDraft,
};

#[test]
fn test_concurrent_reservation_approval_single_winner() {
    let (_tmp, state) = setup_test_env();
    let state = Arc::new(state);
    let admin = seed_admin(&state);
    let pond = state
        .pond_api
        .create_pond("A1", "A", None, PondSizeClass::Large, &admin)
        .unwrap();

    let first = state
        .pond_api
        .submit_reservation(ReservationDraft {
            pond_id: pond.id,
            user_name: "张三".to_string(),
            fish_type: None,
            fish_quantity: None,
            phone: None,
            channel_user_id: Some("U-zhang".to_string()),
            start_date: d("2025-03-01"),
            end_date: d("2025-06-01"),
        })
        .unwrap();
    let second = state
        .pond_api
        .submit_reservation(ReservationDraft {
            pond_id: pond.id,
            user_name: "李四".to_string(),
            fish_type: None,
            fish_quantity: None,
            phone: None,
            channel_user_id: Some("U-li".to_string()),
            start_date: d("2025-04-01"),
            end_date: d("2025-07-01"),
        })
        .unwrap();

    let mut handles = Vec::new();
    for id in [first.id.clone(), second.id.clone()] {
        let state = state.clone();
        let admin = admin.clone();
        handles.push(thread::spawn(move || {
            state.pond_api.approve_reservation(&id, &admin)
        }));
    }
    let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

    let wins = results.iter().filter(|r| r.is_ok()).count();
    assert_eq!(wins, 1);
    let loss = results
        .into_iter()
        .find_map(|r| r.err())
        .expect("应有一笔因冲突落败");
    assert!(matches!(loss, ApiError::CapacityExceeded { .. }));

    // 落败方保持待审, 胜出方已批准
    let statuses = [
        state.pond_api.get_reservation(&first.id).unwrap().status,
        state.pond_api.get_reservation(&second.id).unwrap().status,
    ];
    assert!(statuses.contains(&HoldStatus::Approved));
    assert!(statuses.contains(&HoldStatus::Pending));
}

#[test]
fn test_concurrent_loan_approval_respects_pool_total() {
    let (_tmp, state) = setup_test_env();
    let state = Arc::new(state);
    let admin = seed_admin(&state);
    let tent = state
        .equipment_api
        .create_equipment("帐篷", None, 5, "顶", None, &admin)
        .unwrap();

    let loan = |user: &str| {
        state
            .equipment_api
            .submit_loan(LoanDraft {
                user_name: user.to_string(),
                channel_user_id: Some(format!("U-{}", user)),
                phone: None,
                purpose: None,
                borrow_date: d("2025-03-01"),
                return_date: d("2025-03-10"),
                items: vec![LoanLineDraft {
                    equipment_id: tent.id,
                    quantity: 3,
                }],
            })
            .unwrap()
    };
    let first = loan("张三");
    let second = loan("李四");

    let mut handles = Vec::new();
    for id in [first.id.clone(), second.id.clone()] {
        let state = state.clone();
        let admin = admin.clone();
        handles.push(thread::spawn(move || {
            state.equipment_api.approve_loan(&id, &admin)
        }));
    }
    let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
    let loss = results
        .into_iter()
        .find_map(|r| r.err())
        .expect("超出总量的一笔应落败");
    match loss {
        ApiError::CapacityExceeded {
            requested,
            available,
            ..
        } => {
            assert_eq!(requested, 3);
            assert_eq!(available, 2);
        }
        other => panic!("预期容量护栏错误, 实际: {:?}", other),
    }
}
