// ==========================================
// 测试辅助函数
// ==========================================
// 职责: 提供集成测试所需的临时数据库与应用装配
// ==========================================

use chrono::NaiveDate;
use tempfile::NamedTempFile;

use fish_pond_rms::app::AppState;
use fish_pond_rms::domain::ActorContext;

/// 在临时数据库文件上装配完整应用
///
/// # 返回
/// - NamedTempFile: 临时数据库文件 (需要保持存活)
/// - AppState: 全部 API 就绪的应用状态
pub fn setup_test_env() -> (NamedTempFile, AppState) {
    let temp_file = NamedTempFile::new().unwrap();
    let db_path = temp_file.path().to_str().unwrap().to_string();
    let state = AppState::new(&db_path).unwrap();
    (temp_file, state)
}

/// 种入一名管理员并返回其操作上下文
pub fn seed_admin(state: &AppState) -> ActorContext {
    let admin_id = state
        .repos
        .admin_repo
        .insert("admin", "hash", "管理员", "admin")
        .unwrap();
    ActorContext::admin(admin_id)
}

/// 解析 yyyy-mm-dd 测试常量
pub fn d(s: &str) -> NaiveDate {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
}
