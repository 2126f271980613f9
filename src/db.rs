// ==========================================
// 渔场设施预定与物资管理系统 - SQLite 连接初始化
// ==========================================
// 目标:
// - 统一所有 Connection::open 的 PRAGMA 行为，避免“部分模块外键开启/部分不开启”
// - 统一 busy_timeout，减少并发写入时的偶发 busy 错误
// - 提供建表 + 种子数据入口，测试与二进制共用同一套 schema
// ==========================================

use chrono::Local;
use rusqlite::{params, Connection, OptionalExtension};
use std::time::Duration;

/// 默认 busy_timeout（毫秒）
pub const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;

/// 当前代码所期望的 schema_version（与 `scripts/schema.sql` 对齐）
pub const CURRENT_SCHEMA_VERSION: i64 = 1;

/// 内嵌的建表脚本
const SCHEMA_SQL: &str = include_str!("../scripts/schema.sql");

/// 配置 SQLite 连接的统一 PRAGMA
///
/// 说明：
/// - foreign_keys 需要“每个连接”单独开启
/// - busy_timeout 需要“每个连接”单独配置
pub fn configure_sqlite_connection(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch("PRAGMA foreign_keys = ON;")?;
    conn.busy_timeout(Duration::from_millis(DEFAULT_BUSY_TIMEOUT_MS))?;
    Ok(())
}

/// 打开 SQLite 连接并应用统一配置
pub fn open_sqlite_connection(db_path: &str) -> rusqlite::Result<Connection> {
    let conn = Connection::open(db_path)?;
    configure_sqlite_connection(&conn)?;
    Ok(conn)
}

/// 建表（幂等）并在首次建库时写入 schema_version
pub fn init_db_schema(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(SCHEMA_SQL)?;

    let existing = read_schema_version(conn)?;
    if existing.is_none() || existing == Some(0) {
        let now = Local::now().format("%Y-%m-%d %H:%M:%S").to_string();
        conn.execute(
            "INSERT INTO schema_version (version, applied_at) VALUES (?1, ?2)",
            params![CURRENT_SCHEMA_VERSION, now],
        )?;
        conn.execute(
            "INSERT OR IGNORE INTO config_scope (scope_id, scope_type, scope_key, created_at)
             VALUES ('global', 'GLOBAL', 'GLOBAL', ?1)",
            params![now],
        )?;
        tracing::info!("数据库初始化完成: schema_version={}", CURRENT_SCHEMA_VERSION);
    }
    Ok(())
}

/// 读取 schema_version（若表不存在则返回 None）
pub fn read_schema_version(conn: &Connection) -> rusqlite::Result<Option<i64>> {
    let has_table: bool = conn
        .query_row(
            "SELECT 1 FROM sqlite_master WHERE type='table' AND name='schema_version' LIMIT 1",
            [],
            |_row| Ok(true),
        )
        .optional()?
        .unwrap_or(false);

    if !has_table {
        return Ok(None);
    }

    let v: Option<i64> = conn.query_row("SELECT MAX(version) FROM schema_version", [], |row| row.get(0))?;
    Ok(v)
}

/// 按场区平面图种入示范鱼池（幂等，pond_code 冲突时跳过）
///
/// # 参数
/// - `conn`: 已初始化 schema 的连接
///
/// # 返回
/// - Ok(inserted): 本次实际新增的鱼池数
pub fn seed_demo_ponds(conn: &Connection) -> rusqlite::Result<usize> {
    // (编号, 分区, 规格, x, y, 宽, 高), 位置为平面图百分比
    const PONDS: &[(&str, &str, &str, f64, f64, f64, f64)] = &[
        // A 区 - 大型土池
        ("A1", "A", "large", 44.0, 8.0, 14.0, 12.0),
        ("A2", "A", "large", 35.0, 5.0, 5.0, 5.0),
        ("A3", "A", "large", 14.0, 5.0, 10.0, 8.0),
        ("A4", "A", "large", 4.0, 5.0, 8.0, 8.0),
        // B 区 - 中型土池
        ("B1", "B", "medium", 44.0, 22.0, 8.0, 8.0),
        ("B2", "B", "medium", 36.0, 22.0, 8.0, 8.0),
        ("B3", "B", "medium", 30.0, 22.0, 6.0, 6.0),
        ("B4", "B", "medium", 24.0, 15.0, 6.0, 6.0),
        ("B5", "B", "medium", 18.0, 15.0, 5.0, 5.0),
        ("B6", "B", "medium", 12.0, 15.0, 5.0, 5.0),
        ("B7", "B", "medium", 6.0, 15.0, 5.0, 5.0),
        // C 区 - 中型土池（中排）
        ("C1", "C", "medium", 40.0, 32.0, 5.0, 5.0),
        ("C2", "C", "medium", 35.0, 32.0, 5.0, 5.0),
        ("C3", "C", "medium", 30.0, 32.0, 5.0, 5.0),
        ("C4", "C", "medium", 25.0, 32.0, 5.0, 5.0),
        ("C5", "C", "medium", 20.0, 32.0, 5.0, 5.0),
        ("C6", "C", "medium", 10.0, 28.0, 8.0, 8.0),
        ("C7", "C", "medium", 40.0, 40.0, 5.0, 5.0),
        ("C8", "C", "medium", 35.0, 40.0, 5.0, 5.0),
        ("C9", "C", "medium", 30.0, 40.0, 5.0, 5.0),
        ("C10", "C", "medium", 25.0, 40.0, 5.0, 5.0),
        ("C11", "C", "medium", 20.0, 40.0, 5.0, 5.0),
        ("C12", "C", "medium", 15.0, 45.0, 5.0, 5.0),
        ("C13", "C", "medium", 10.0, 45.0, 5.0, 5.0),
        ("C14", "C", "medium", 5.0, 45.0, 5.0, 5.0),
        // D 区 - 中型土池（下排）
        ("D1", "D", "medium", 40.0, 50.0, 5.0, 5.0),
        ("D2", "D", "medium", 35.0, 50.0, 5.0, 5.0),
        ("D3", "D", "medium", 30.0, 50.0, 5.0, 5.0),
        ("D4", "D", "medium", 25.0, 50.0, 5.0, 5.0),
        ("D5", "D", "medium", 20.0, 50.0, 5.0, 5.0),
        ("D6", "D", "large", 35.0, 62.0, 12.0, 10.0),
        // E 区 - 室内水泥池
        ("E1", "E", "small", 60.0, 58.0, 4.0, 4.0),
        ("E2", "E", "small", 64.0, 58.0, 4.0, 4.0),
        ("E3", "E", "small", 68.0, 58.0, 4.0, 4.0),
        ("E4", "E", "small", 72.0, 55.0, 4.0, 4.0),
        ("E5", "E", "small", 76.0, 55.0, 4.0, 4.0),
        // F 区 - 小型池（右上）
        ("F1", "F", "small", 55.0, 45.0, 4.0, 4.0),
        ("F2", "F", "small", 55.0, 38.0, 4.0, 4.0),
        ("F3", "F", "small", 55.0, 32.0, 4.0, 4.0),
        ("F4", "F", "small", 55.0, 26.0, 4.0, 4.0),
        ("F5", "F", "small", 55.0, 20.0, 4.0, 4.0),
        ("F6", "F", "small", 60.0, 15.0, 4.0, 4.0),
        ("F7", "F", "small", 64.0, 10.0, 4.0, 4.0),
        ("F8", "F", "small", 60.0, 5.0, 4.0, 4.0),
        // G 区 - 小型池（右侧）
        ("G1", "G", "small", 75.0, 12.0, 5.0, 5.0),
        ("G2", "G", "medium", 72.0, 38.0, 8.0, 8.0),
        ("G3", "G", "small", 82.0, 12.0, 4.0, 4.0),
        ("G4", "G", "small", 82.0, 17.0, 4.0, 4.0),
        ("G5", "G", "small", 82.0, 22.0, 4.0, 4.0),
        ("G6", "G", "small", 82.0, 27.0, 4.0, 4.0),
        ("G7", "G", "small", 82.0, 32.0, 4.0, 4.0),
        ("G8", "G", "small", 82.0, 37.0, 4.0, 4.0),
        ("G10", "G", "small", 85.0, 48.0, 4.0, 4.0),
    ];

    let now = Local::now().format("%Y-%m-%d %H:%M:%S").to_string();
    let tx = conn.unchecked_transaction()?;
    let mut inserted = 0usize;
    for (code, zone, size_class, x, y, w, h) in PONDS {
        let n = tx.execute(
            "INSERT OR IGNORE INTO ponds
                 (pond_code, zone, name, size_class, status, pos_x, pos_y, width, height, created_at)
             VALUES (?1, ?2, ?3, ?4, 'available', ?5, ?6, ?7, ?8, ?9)",
            params![code, zone, format!("{}号池", code), size_class, x, y, w, h, now],
        )?;
        inserted += n;
    }
    tx.commit()?;

    if inserted > 0 {
        tracing::info!("示范鱼池种子完成: 新增 {} 口", inserted);
    }
    Ok(inserted)
}
