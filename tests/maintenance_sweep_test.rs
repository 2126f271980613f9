// ==========================================
// 每日巡检端到端测试
// ==========================================
// 目标: 验证结单/逾期/提醒/会话清理一轮跑全, 且重复执行安全
// 覆盖: MaintenanceSweeper -> 仓储 -> NotificationSink
// ==========================================

#[path = "test_helpers.rs"]
mod test_helpers;

use test_helpers::{d, seed_admin};

use std::sync::{Arc, Mutex};

use rusqlite::Connection;
use tempfile::NamedTempFile;

use fish_pond_rms::app::AppState;
use fish_pond_rms::domain::{
    ActorContext, HoldStatus, LoanDraft, LoanLineDraft, PondSizeClass, ReservationDraft,
};
use fish_pond_rms::engine::{
    Notification, NotificationKind, NotificationSink, OptionalNotificationSink,
};

#[derive(Default)]
struct RecordingSink {
    delivered: Mutex<Vec<Notification>>,
}

impl NotificationSink for RecordingSink {
    fn deliver(
        &self,
        notification: Notification,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        self.delivered.lock().unwrap().push(notification);
        Ok(())
    }
}

impl RecordingSink {
    fn count_of(&self, kind: NotificationKind) -> usize {
        self.delivered
            .lock()
            .unwrap()
            .iter()
            .filter(|n| n.kind == kind)
            .count()
    }
}

fn setup_with_sink() -> (NamedTempFile, AppState, Arc<RecordingSink>) {
    let temp_file = NamedTempFile::new().unwrap();
    let db_path = temp_file.path().to_str().unwrap().to_string();
    let sink = Arc::new(RecordingSink::default());
    let state = AppState::with_notifier(
        &db_path,
        OptionalNotificationSink::with_sink(sink.clone()),
    )
    .unwrap();
    (temp_file, state, sink)
}

fn approved_reservation(state: &AppState, admin: &ActorContext, code: &str, start: &str, end: &str) -> String {
    let pond = state
        .pond_api
        .create_pond(code, "A", None, PondSizeClass::Medium, admin)
        .unwrap();
    let r = state
        .pond_api
        .submit_reservation(ReservationDraft {
            pond_id: pond.id,
            user_name: "张三".to_string(),
            fish_type: None,
            fish_quantity: None,
            phone: None,
            channel_user_id: Some("U-zhang".to_string()),
            start_date: d(start),
            end_date: d(end),
        })
        .unwrap();
    state.pond_api.approve_reservation(&r.id, admin).unwrap();
    r.id
}

fn borrowed_loan(state: &AppState, admin: &ActorContext, name: &str, start: &str, end: &str) -> String {
    let eq = state
        .equipment_api
        .create_equipment(name, None, 10, "件", None, admin)
        .unwrap();
    let l = state
        .equipment_api
        .submit_loan(LoanDraft {
            user_name: "李四".to_string(),
            channel_user_id: Some("U-li".to_string()),
            phone: None,
            purpose: None,
            borrow_date: d(start),
            return_date: d(end),
            items: vec![LoanLineDraft {
                equipment_id: eq.id,
                quantity: 2,
            }],
        })
        .unwrap();
    state.equipment_api.approve_loan(&l.id, admin).unwrap();
    state.equipment_api.mark_borrowed(&l.id, admin).unwrap();
    l.id
}

#[test]
fn test_daily_sweep_covers_all_steps_and_reruns_safely() {
    let (tmp, state, sink) = setup_with_sink();
    let admin = seed_admin(&state);
    let today = d("2025-03-11");

    // 窗口已整体结束 -> 自动结单
    let expired = approved_reservation(&state, &admin, "A1", "2025-02-01", "2025-03-10");
    // 7 天后到期 -> 提醒
    let ending_soon = approved_reservation(&state, &admin, "A2", "2025-02-01", "2025-03-18");
    // 逾期借用
    let overdue = borrowed_loan(&state, &admin, "增氧机", "2025-03-01", "2025-03-10");
    // 3 天后到归还日 -> 提醒
    let due_soon = borrowed_loan(&state, &admin, "水质检测仪", "2025-03-01", "2025-03-14");

    // 一个闲置已久的对话会话 (直接把时间戳改旧)
    let stale_pond = state
        .pond_api
        .create_pond("Z9", "G", None, PondSizeClass::Small, &admin)
        .unwrap();
    state
        .session_api
        .start_reservation("U-stale", stale_pond.id)
        .unwrap();
    let aged = {
        let conn = Connection::open(tmp.path()).unwrap();
        conn.execute(
            "UPDATE user_sessions SET updated_at = '2000-01-01 00:00:00'",
            [],
        )
        .unwrap()
    };

    let report = state.sweeper.run_daily(today);

    assert_eq!(report.completed_reservations, 1);
    assert_eq!(report.overdue_loans, 1);
    assert_eq!(report.reservation_reminders, 1);
    assert_eq!(report.loan_reminders, 1);
    assert_eq!(report.purged_sessions, aged);
    assert_eq!(report.errors, 0);

    assert_eq!(
        state.pond_api.get_reservation(&expired).unwrap().status,
        HoldStatus::Completed
    );
    assert_eq!(
        state.pond_api.get_reservation(&ending_soon).unwrap().status,
        HoldStatus::Approved
    );
    assert_eq!(
        state.equipment_api.get_loan(&overdue).unwrap().status,
        HoldStatus::Overdue
    );
    assert_eq!(
        state.equipment_api.get_loan(&due_soon).unwrap().status,
        HoldStatus::Borrowed
    );

    assert_eq!(sink.count_of(NotificationKind::LoanOverdue), 1);
    assert_eq!(sink.count_of(NotificationKind::ReservationExpiryReminder), 1);
    assert_eq!(sink.count_of(NotificationKind::LoanReturnReminder), 1);

    // 当日重复执行: 状态迁移类不再发生, 提醒按当前快照重发
    let rerun = state.sweeper.run_daily(today);
    assert_eq!(rerun.completed_reservations, 0);
    assert_eq!(rerun.overdue_loans, 0);
    assert_eq!(rerun.reservation_reminders, 1);
    assert_eq!(rerun.loan_reminders, 1);
    assert_eq!(rerun.purged_sessions, 0);
    assert_eq!(rerun.errors, 0);
}

#[test]
fn test_sweep_on_quiet_day_reports_zeroes() {
    let (_tmp, state, sink) = setup_with_sink();
    let admin = seed_admin(&state);
    approved_reservation(&state, &admin, "B1", "2025-03-01", "2025-06-01");

    let report = state.sweeper.run_daily(d("2025-03-02"));
    assert_eq!(report.completed_reservations, 0);
    assert_eq!(report.overdue_loans, 0);
    assert_eq!(report.reservation_reminders, 0);
    assert_eq!(report.loan_reminders, 0);
    assert_eq!(report.errors, 0);
    assert_eq!(sink.count_of(NotificationKind::ReservationExpiryReminder), 0);
}
