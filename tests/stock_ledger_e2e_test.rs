// ==========================================
// 物资台账全流程端到端测试
// ==========================================
// 目标: 验证 "余额即台账回放" 在入库/出库/盘点/领用审批下恒成立
// 覆盖: StockApi -> LedgerService -> StockRepository
// ==========================================

#[path = "test_helpers.rs"]
mod test_helpers;

use test_helpers::{seed_admin, setup_test_env};

use fish_pond_rms::api::ApiError;
use fish_pond_rms::app::AppState;
use fish_pond_rms::domain::{
    ActorContext, HoldStatus, LedgerEntryKind, LineApproval, RequisitionDraft,
    RequisitionLineDraft,
};

fn seed_item(state: &AppState, admin: &ActorContext, name: &str, initial: i64) -> i64 {
    state
        .stock_api
        .create_item(name, None, "袋", 25.0, 5, None, Some(initial), admin)
        .unwrap()
        .id
}

#[test]
fn test_overdraw_rejected_then_partial_out_succeeds() {
    let (_tmp, state) = setup_test_env();
    let admin = seed_admin(&state);
    let fertilizer = seed_item(&state, &admin, "化肥", 10);

    // 超提 15 整笔拒绝, 余额不动
    let err = state
        .stock_api
        .stock_out(fertilizer, 15, None, None, &admin)
        .unwrap_err();
    match err {
        ApiError::InsufficientStock {
            item,
            requested,
            available,
        } => {
            assert!(item.contains("化肥"));
            assert_eq!(requested, 15);
            assert_eq!(available, 10);
        }
        other => panic!("期望库存不足, 实得 {:?}", other),
    }
    assert_eq!(state.stock_api.balance(fertilizer).unwrap(), 10);

    // 改提 4 成功
    let posted = state
        .stock_api
        .stock_out(fertilizer, 4, Some("B3 池施肥"), None, &admin)
        .unwrap();
    assert_eq!(posted.balance_after, 6);

    // 台账仅两笔: 期初入库 + 本次出库 (被拒的超提不留痕)
    let ledger = state.stock_api.item_ledger(fertilizer, 10).unwrap();
    assert_eq!(ledger.len(), 2);
    assert_eq!(ledger[0].entry_kind, LedgerEntryKind::Out);
    assert_eq!(ledger[0].signed_effect, -4);
}

#[test]
fn test_requisition_line_override_and_ledger_linkage() {
    let (_tmp, state) = setup_test_env();
    let admin = seed_admin(&state);
    let feed = seed_item(&state, &admin, "鱼饲料", 20);

    let req = state
        .stock_api
        .submit_requisition(RequisitionDraft {
            user_name: "张三".to_string(),
            channel_user_id: Some("U-zhang".to_string()),
            phone: None,
            purpose: Some("春季投喂".to_string()),
            items: vec![RequisitionLineDraft {
                item_id: feed,
                requested_quantity: 8,
            }],
        })
        .unwrap();

    // 审批时按行下调到 5
    let approved = state
        .stock_api
        .approve_requisition(
            &req.id,
            Some(&[LineApproval {
                item_id: feed,
                approved_quantity: 5,
            }]),
            &admin,
        )
        .unwrap();
    assert_eq!(approved.status, HoldStatus::Approved);
    assert_eq!(approved.items[0].approved_quantity, Some(5));

    // 按裁定量出库
    assert_eq!(state.stock_api.balance(feed).unwrap(), 15);
    let ledger = state.stock_api.item_ledger(feed, 10).unwrap();
    assert_eq!(ledger[0].quantity, 5);
    assert_eq!(ledger[0].entry_kind, LedgerEntryKind::Out);
}

#[test]
fn test_multi_line_requisition_rolls_back_whole_tx() {
    let (_tmp, state) = setup_test_env();
    let admin = seed_admin(&state);
    let feed = seed_item(&state, &admin, "鱼饲料", 20);
    let lime = seed_item(&state, &admin, "生石灰", 2);

    let req = state
        .stock_api
        .submit_requisition(RequisitionDraft {
            user_name: "李四".to_string(),
            channel_user_id: None,
            phone: None,
            purpose: None,
            items: vec![
                RequisitionLineDraft {
                    item_id: feed,
                    requested_quantity: 5,
                },
                RequisitionLineDraft {
                    item_id: lime,
                    requested_quantity: 4,
                },
            ],
        })
        .unwrap();

    let err = state
        .stock_api
        .approve_requisition(&req.id, None, &admin)
        .unwrap_err();
    assert!(matches!(err, ApiError::InsufficientStock { ref item, .. } if item.contains("生石灰")));

    // 第一行的出库随事务一起回滚
    assert_eq!(state.stock_api.balance(feed).unwrap(), 20);
    assert_eq!(state.stock_api.balance(lime).unwrap(), 2);
    let row = state.stock_api.get_requisition(&req.id).unwrap();
    assert_eq!(row.status, HoldStatus::Pending);
}

#[test]
fn test_balance_equals_ledger_replay_after_mixed_ops() {
    let (_tmp, state) = setup_test_env();
    let admin = seed_admin(&state);
    let salt = seed_item(&state, &admin, "粗盐", 0);

    state
        .stock_api
        .stock_in(salt, 30, Some(1.8), Some("进货"), Some("PO-2025-001"), &admin)
        .unwrap();
    state
        .stock_api
        .stock_out(salt, 12, Some("消毒"), None, &admin)
        .unwrap();
    // 盘点修正到 20 (产生 +2 调整)
    let adjust = state
        .stock_api
        .stock_adjust(salt, 20, Some("月末盘点"), &admin)
        .unwrap()
        .expect("数量有变化应产生调整记录");
    assert_eq!(adjust.entry.entry_kind, LedgerEntryKind::Adjust);
    assert_eq!(adjust.entry.signed_effect, 2);

    // 盘到相同数量时不写流水
    assert!(state
        .stock_api
        .stock_adjust(salt, 20, Some("复盘"), &admin)
        .unwrap()
        .is_none());

    let balance = state.stock_api.balance(salt).unwrap();
    assert_eq!(balance, 20);
    assert_eq!(
        state.repos.stock_repo.replay_balance(salt).unwrap(),
        balance
    );
}

#[test]
fn test_low_stock_items_surface_on_dashboard() {
    let (_tmp, state) = setup_test_env();
    let admin = seed_admin(&state);
    // min_quantity 为 5, 余额降到 3 后进入预警清单
    let feed = seed_item(&state, &admin, "鱼饲料", 8);
    state
        .stock_api
        .stock_out(feed, 5, None, None, &admin)
        .unwrap();

    let low = state.stock_api.low_stock_items().unwrap();
    assert_eq!(low.len(), 1);
    assert_eq!(low[0].id, feed);

    let summary = state.dashboard_api.summary().unwrap();
    assert_eq!(summary.low_stock_items.len(), 1);
    assert!((summary.total_stock_value - 3.0 * 25.0).abs() < f64::EPSILON);
}
