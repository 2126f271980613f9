// ==========================================
// 渔场设施预定与物资管理系统 - 主入口
// ==========================================
// 运行形态: 无界面常驻进程
// - 标准输入模拟渠道消息, 一行一条: <渠道用户ID> <内容>
// - 业务通知经控制台通道出站
// ==========================================

use std::sync::{Arc, Mutex};

use anyhow::Context;
use chrono::Local;
use tokio::io::AsyncBufReadExt;

use fish_pond_rms::app::{channel_pipeline, get_default_db_path, AppState, ConsoleChannelTransport};
use fish_pond_rms::config::ConfigManager;
use fish_pond_rms::db;
use fish_pond_rms::engine::OptionalNotificationSink;
use fish_pond_rms::logging;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    logging::init();

    tracing::info!("==================================================");
    tracing::info!("{}", fish_pond_rms::APP_NAME);
    tracing::info!("系统版本: {}", fish_pond_rms::VERSION);
    tracing::info!("==================================================");

    let db_path = get_default_db_path();
    tracing::info!("使用数据库: {}", db_path);

    let conn = db::open_sqlite_connection(&db_path)
        .with_context(|| format!("无法打开数据库: {}", db_path))?;
    db::init_db_schema(&conn).context("数据库建表失败")?;
    db::seed_demo_ponds(&conn).context("鱼池种子数据写入失败")?;
    let conn = Arc::new(Mutex::new(conn));

    // 通知管线: 服务层同步入队, 分发器异步出站
    let config = Arc::new(ConfigManager::from_connection(conn.clone())?);
    let (sink, dispatcher) = channel_pipeline(Arc::new(ConsoleChannelTransport), config);
    let state = AppState::from_shared_conn(
        &db_path,
        conn,
        OptionalNotificationSink::with_sink(Arc::new(sink)),
    )?;
    let dispatcher_task = tokio::spawn(dispatcher.run());

    println!("渠道模拟已就绪, 一行一条: <渠道用户ID> <内容>, Ctrl-D 退出");
    println!("支持指令: 鱼池 | 预定 <鱼池ID> | 我的预定 | 退出预定; 其余文本进入对话流程");

    let mut lines = tokio::io::BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let Some((user, text)) = line.split_once(char::is_whitespace) else {
            println!("格式: <渠道用户ID> <内容>");
            continue;
        };
        handle_channel_line(&state, user.trim(), text.trim());
    }

    // stdin 关闭后结束进程; state 持有的 sink 随之释放, 分发器排空队列后退出
    drop(state);
    dispatcher_task.await.context("通知分发器异常退出")?;
    Ok(())
}

/// 渠道消息的顶层指令分流, 非指令文本交给对话流程
fn handle_channel_line(state: &AppState, user: &str, text: &str) {
    let today = Local::now().date_naive();
    let reply = match text {
        "鱼池" | "查询鱼池" => state.session_api.available_ponds(today).map(|ponds| {
            if ponds.is_empty() {
                "今日暂无空闲鱼池".to_string()
            } else {
                let rows: Vec<String> = ponds
                    .iter()
                    .map(|p| format!("[{}] {}区 {} ({})", p.id, p.zone, p.pond_code, p.size_class))
                    .collect();
                format!("今日空闲鱼池:\n{}", rows.join("\n"))
            }
        }),
        "我的预定" => state.session_api.my_reservations(user).map(|rs| {
            if rs.is_empty() {
                "您当前没有预定记录".to_string()
            } else {
                let rows: Vec<String> = rs
                    .iter()
                    .map(|r| {
                        format!(
                            "{} {} {} ~ {} [{}]",
                            r.pond_code.as_deref().unwrap_or("-"),
                            r.user_name,
                            r.start_date,
                            r.end_date,
                            r.status
                        )
                    })
                    .collect();
                rows.join("\n")
            }
        }),
        "退出预定" => state.session_api.cancel_dialog(user).map(|r| r.text),
        _ => match text.strip_prefix("预定") {
            Some(rest) => match rest.trim().parse::<i64>() {
                Ok(pond_id) => state
                    .session_api
                    .start_reservation(user, pond_id)
                    .map(|r| r.text),
                Err(_) => Ok("格式: 预定 <鱼池ID>, 鱼池ID可通过\"鱼池\"指令查询".to_string()),
            },
            None => state.session_api.handle_message(user, text).map(|r| r.text),
        },
    };

    match reply {
        Ok(text) => println!("[{}] {}", user, text),
        Err(e) => println!("[{}] 处理失败: {}", user, e),
    }
}
