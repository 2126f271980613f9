// ==========================================
// 鱼池预定全流程端到端测试
// ==========================================
// 目标: 验证 "对话提单 -> 审批 -> 冲突判定 -> 取消释放" 的完整链路
// 覆盖: SessionApi -> ApprovalService -> AvailabilityEngine -> DashboardApi
// ==========================================

#[path = "test_helpers.rs"]
mod test_helpers;

use test_helpers::{d, seed_admin, setup_test_env};

use fish_pond_rms::api::ApiError;
use fish_pond_rms::domain::{
    ActorContext, HoldStatus, PondSizeClass, ReservationDraft,
};

fn draft(pond_id: i64, user: &str, start: &str, end: &str) -> ReservationDraft {
    ReservationDraft {
        pond_id,
        user_name: user.to_string(),
        fish_type: Some("草鱼".to_string()),
        fish_quantity: Some(500),
        phone: None,
        channel_user_id: Some(format!("U-{}", user)),
        start_date: d(start),
        end_date: d(end),
    }
}

#[test]
fn test_dialog_submit_then_approve_shows_in_my_reservations() {
    let (_tmp, state) = setup_test_env();
    let admin = seed_admin(&state);
    let pond = state
        .pond_api
        .create_pond("A1", "A", None, PondSizeClass::Large, &admin)
        .unwrap();

    // 渠道用户走完整的多轮对话
    let user = "U-chan-001";
    state.session_api.start_reservation(user, pond.id).unwrap();
    state.session_api.handle_message(user, "张三").unwrap();
    state.session_api.handle_message(user, "草鱼").unwrap();
    state.session_api.handle_message(user, "500").unwrap();
    state.session_api.handle_message(user, "2025-03-01").unwrap();
    let confirm = state.session_api.handle_message(user, "6").unwrap();
    assert!(confirm.text.contains("确认"));

    let done = state.session_api.handle_message(user, "确认").unwrap();
    let reservation_id = done.reservation_id.expect("确认后应返回预定单号");

    // 提交后处于待审, 管理员批准
    let r = state.pond_api.get_reservation(&reservation_id).unwrap();
    assert_eq!(r.status, HoldStatus::Pending);
    assert_eq!(r.start_date, d("2025-03-01"));
    assert_eq!(r.end_date, d("2025-09-01"));

    state
        .pond_api
        .approve_reservation(&reservation_id, &admin)
        .unwrap();

    let mine = state.session_api.my_reservations(user).unwrap();
    assert_eq!(mine.len(), 1);
    assert_eq!(mine[0].status, HoldStatus::Approved);

    // 驾驶舱同步可见
    let summary = state.dashboard_api.summary().unwrap();
    let approved = summary
        .reservations
        .iter()
        .find(|s| s.status == HoldStatus::Approved)
        .map(|s| s.count)
        .unwrap_or(0);
    assert_eq!(approved, 1);
}

#[test]
fn test_overlapping_approvals_second_loses() {
    let (_tmp, state) = setup_test_env();
    let admin = seed_admin(&state);
    let pond = state
        .pond_api
        .create_pond("B1", "B", None, PondSizeClass::Medium, &admin)
        .unwrap();

    let first = state
        .pond_api
        .submit_reservation(draft(pond.id, "张三", "2025-03-01", "2025-06-01"))
        .unwrap();
    let second = state
        .pond_api
        .submit_reservation(draft(pond.id, "李四", "2025-05-01", "2025-08-01"))
        .unwrap();

    state.pond_api.approve_reservation(&first.id, &admin).unwrap();

    // 同池重叠窗口, 第二笔批准时护栏拒绝
    let err = state
        .pond_api
        .approve_reservation(&second.id, &admin)
        .unwrap_err();
    assert!(matches!(err, ApiError::CapacityExceeded { .. }));

    // 落败方保持待审, 不产生半途状态
    let row = state.pond_api.get_reservation(&second.id).unwrap();
    assert_eq!(row.status, HoldStatus::Pending);

    // 窗口可用量归零
    let free = state
        .pond_api
        .check_availability(pond.id, d("2025-05-01"), d("2025-05-02"))
        .unwrap();
    assert_eq!(free, 0);
}

#[test]
fn test_disjoint_windows_share_one_pond() {
    let (_tmp, state) = setup_test_env();
    let admin = seed_admin(&state);
    let pond = state
        .pond_api
        .create_pond("C1", "C", None, PondSizeClass::Medium, &admin)
        .unwrap();

    let spring = state
        .pond_api
        .submit_reservation(draft(pond.id, "张三", "2025-03-01", "2025-05-31"))
        .unwrap();
    let autumn = state
        .pond_api
        .submit_reservation(draft(pond.id, "李四", "2025-06-01", "2025-09-30"))
        .unwrap();

    state.pond_api.approve_reservation(&spring.id, &admin).unwrap();
    let approved = state.pond_api.approve_reservation(&autumn.id, &admin).unwrap();
    assert_eq!(approved.status, HoldStatus::Approved);
}

#[test]
fn test_cancel_frees_window_for_rival() {
    let (_tmp, state) = setup_test_env();
    let admin = seed_admin(&state);
    let pond = state
        .pond_api
        .create_pond("D1", "D", None, PondSizeClass::Large, &admin)
        .unwrap();

    let winner = state
        .pond_api
        .submit_reservation(draft(pond.id, "张三", "2025-03-01", "2025-06-01"))
        .unwrap();
    let rival = state
        .pond_api
        .submit_reservation(draft(pond.id, "李四", "2025-04-01", "2025-07-01"))
        .unwrap();

    state.pond_api.approve_reservation(&winner.id, &admin).unwrap();
    assert!(state
        .pond_api
        .approve_reservation(&rival.id, &admin)
        .is_err());

    // 申请人本人取消已批准的预定
    let requester = ActorContext::requester("U-张三");
    state
        .pond_api
        .cancel_reservation(&winner.id, &requester)
        .unwrap();

    // 窗口释放, 落败方重批成功
    let approved = state.pond_api.approve_reservation(&rival.id, &admin).unwrap();
    assert_eq!(approved.status, HoldStatus::Approved);
}

#[test]
fn test_expired_dialog_is_rejected_politely() {
    let (_tmp, state) = setup_test_env();
    let admin = seed_admin(&state);
    state
        .pond_api
        .create_pond("E1", "E", None, PondSizeClass::Small, &admin)
        .unwrap();

    // 未开启对话时的游离文本不落库, 仅提示
    let reply = state
        .session_api
        .handle_message("U-wanderer", "随便说点什么")
        .unwrap();
    assert!(reply.reservation_id.is_none());
    assert!(reply.text.contains("选择鱼池"));
    assert_eq!(
        state.session_api.my_reservations("U-wanderer").unwrap().len(),
        0
    );
}
