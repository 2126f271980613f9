// ==========================================
// 渔场设施预定与物资管理系统 - 仓储聚合
// ==========================================
// 职责: 聚合资源目录与单据仓储, 统一从共享连接构造
// 约束: 全部仓储共用同一 Arc<Mutex<Connection>>,
// 进程内所有数据访问经由同一把锁串行化
// ==========================================

use rusqlite::Connection;
use std::sync::{Arc, Mutex};

use crate::repository::{
    ActionLogRepository, AdminRepository, CancellationRepository, EquipmentRepository,
    LoanRepository, PondRepository, RequisitionRepository, ReservationRepository,
    SessionRepository, StockRepository,
};

/// 资源仓储集合
///
/// 聚合可用量计算、审批流与接口层所需的全部 Repository,
/// 简化依赖注入。
#[derive(Clone)]
pub struct ResourceRepositories {
    /// 鱼池目录仓储
    pub pond_repo: Arc<PondRepository>,
    /// 鱼池预定仓储
    pub reservation_repo: Arc<ReservationRepository>,
    /// 取消申请仓储
    pub cancellation_repo: Arc<CancellationRepository>,
    /// 器材目录仓储
    pub equipment_repo: Arc<EquipmentRepository>,
    /// 器材借用仓储
    pub loan_repo: Arc<LoanRepository>,
    /// 物资目录与台账仓储
    pub stock_repo: Arc<StockRepository>,
    /// 物资领用申请仓储
    pub requisition_repo: Arc<RequisitionRepository>,
    /// 会话状态仓储
    pub session_repo: Arc<SessionRepository>,
    /// 操作日志仓储
    pub action_log_repo: Arc<ActionLogRepository>,
    /// 管理员仓储
    pub admin_repo: Arc<AdminRepository>,
}

impl ResourceRepositories {
    /// 从共享连接构造全部仓储
    pub fn from_conn(conn: Arc<Mutex<Connection>>) -> Self {
        Self {
            pond_repo: Arc::new(PondRepository::new(conn.clone())),
            reservation_repo: Arc::new(ReservationRepository::new(conn.clone())),
            cancellation_repo: Arc::new(CancellationRepository::new(conn.clone())),
            equipment_repo: Arc::new(EquipmentRepository::new(conn.clone())),
            loan_repo: Arc::new(LoanRepository::new(conn.clone())),
            stock_repo: Arc::new(StockRepository::new(conn.clone())),
            requisition_repo: Arc::new(RequisitionRepository::new(conn.clone())),
            session_repo: Arc::new(SessionRepository::new(conn.clone())),
            action_log_repo: Arc::new(ActionLogRepository::new(conn.clone())),
            admin_repo: Arc::new(AdminRepository::new(conn)),
        }
    }
}
