// 每日巡检入口: 自动结单到期预定 / 标记逾期借用 / 发提醒 / 清理闲置会话。
//
// Usage:
//   cargo run --bin run_daily_maintenance -- [db_path] [yyyy-mm-dd]
//
// 由外部调度器 (cron / 计划任务) 每天拉起一次; 日期参数缺省为今天,
// 补跑历史日期时显式传入。巡检逐行容错, 单行失败不中断整轮。

use anyhow::Context;
use chrono::{Local, NaiveDate};

use fish_pond_rms::app::{get_default_db_path, AppState};
use fish_pond_rms::logging;

fn main() -> anyhow::Result<()> {
    logging::init();

    let mut args = std::env::args().skip(1);
    let db_path = args
        .next()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(get_default_db_path);
    let today = match args.next() {
        Some(raw) => NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
            .with_context(|| format!("日期格式应为 yyyy-mm-dd: {}", raw))?,
        None => Local::now().date_naive(),
    };

    tracing::info!("每日巡检启动: db={}, 基准日={}", db_path, today);

    let state = AppState::new(&db_path)?;
    let report = state.sweeper.run_daily(today);

    println!("巡检完成 ({}):", today);
    println!("  自动结单预定: {}", report.completed_reservations);
    println!("  新标记逾期借用: {}", report.overdue_loans);
    println!("  预定到期提醒: {}", report.reservation_reminders);
    println!("  归还提醒: {}", report.loan_reminders);
    println!("  清理闲置会话: {}", report.purged_sessions);
    if report.errors > 0 {
        println!("  跳过失败行: {} (详见日志)", report.errors);
    }
    Ok(())
}
