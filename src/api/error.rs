// ==========================================
// 渔场设施预定与物资管理系统 - API层错误类型
// ==========================================
// 职责: 转换 Repository 错误为用户可读的业务错误,
// 并提供边界输出用的 {code, message, details} 结构
// 约束: 错误信息必须带显式原因, 不吞细节
// ==========================================

use crate::repository::error::RepositoryError;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// API层错误类型
#[derive(Error, Debug)]
pub enum ApiError {
    // ==========================================
    // 业务规则错误
    // ==========================================
    #[error("无效输入: {0}")]
    InvalidInput(String),

    #[error("资源未找到: {0}")]
    NotFound(String),

    #[error("业务规则违反: {0}")]
    BusinessRuleViolation(String),

    #[error("无效的状态转换: from={from} to={to}")]
    InvalidStateTransition { from: String, to: String },

    #[error("容量不足: {resource} 请求{requested} 可用{available}")]
    CapacityExceeded {
        resource: String,
        requested: i64,
        available: i64,
    },

    #[error("库存不足: {item} 请求{requested} 剩余{available}")]
    InsufficientStock {
        item: String,
        requested: i64,
        available: i64,
    },

    #[error("无权操作: {0}")]
    Unauthorized(String),

    #[error("数据验证失败: {0}")]
    ValidationError(String),

    // ==========================================
    // 数据访问错误
    // ==========================================
    #[error("数据库错误: {0}")]
    DatabaseError(String),

    #[error("数据库连接失败: {0}")]
    DatabaseConnectionError(String),

    #[error("数据库事务失败: {0}")]
    DatabaseTransactionError(String),

    // ==========================================
    // 通用错误
    // ==========================================
    #[error("内部错误: {0}")]
    InternalError(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

// ==========================================
// 从 RepositoryError 转换
// 目的: 将仓储层的技术错误转换为用户可读的业务错误
// ==========================================
impl From<RepositoryError> for ApiError {
    fn from(err: RepositoryError) -> Self {
        match err {
            // 数据库错误
            RepositoryError::NotFound { entity, id } => {
                ApiError::NotFound(format!("{}(id={})不存在", entity, id))
            }
            RepositoryError::DatabaseConnectionError(msg) => ApiError::DatabaseConnectionError(msg),
            RepositoryError::LockError(msg) => {
                ApiError::DatabaseConnectionError(format!("数据库锁获取失败: {}", msg))
            }
            RepositoryError::DatabaseTransactionError(msg) => {
                ApiError::DatabaseTransactionError(msg)
            }
            RepositoryError::DatabaseQueryError(msg) => ApiError::DatabaseError(msg),
            RepositoryError::UniqueConstraintViolation(msg) => {
                ApiError::BusinessRuleViolation(format!("唯一约束违反: {}", msg))
            }
            RepositoryError::ForeignKeyViolation(msg) => {
                ApiError::BusinessRuleViolation(format!("外键约束违反: {}", msg))
            }

            // 业务规则错误
            RepositoryError::BusinessRuleViolation(msg) => ApiError::BusinessRuleViolation(msg),
            RepositoryError::InvalidStateTransition { from, to } => {
                ApiError::InvalidStateTransition { from, to }
            }
            RepositoryError::CapacityExceeded {
                resource,
                requested,
                available,
            } => ApiError::CapacityExceeded {
                resource,
                requested,
                available,
            },
            RepositoryError::InsufficientStock {
                item,
                requested,
                available,
            } => ApiError::InsufficientStock {
                item,
                requested,
                available,
            },
            RepositoryError::Unauthorized(msg) => ApiError::Unauthorized(msg),

            // 数据质量错误
            RepositoryError::ValidationError(msg) => ApiError::ValidationError(msg),
            RepositoryError::FieldValueError { field, message } => {
                ApiError::InvalidInput(format!("字段{}错误: {}", field, message))
            }

            // 通用错误
            RepositoryError::InternalError(msg) => ApiError::InternalError(msg),
            RepositoryError::Other(err) => ApiError::Other(err),
        }
    }
}

/// Result 类型别名
pub type ApiResult<T> = Result<T, ApiError>;

// ==========================================
// 边界输出结构
// ==========================================

/// 边界层 (HTTP/机器人) 输出的错误体
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    /// 稳定的错误码 (SCREAMING_SNAKE_CASE)
    pub code: String,
    /// 用户可读的错误消息
    pub message: String,
    /// 结构化细节 (容量/库存/状态冲突时填充)
    pub details: Option<serde_json::Value>,
}

impl ApiError {
    /// 稳定错误码
    pub fn code(&self) -> &'static str {
        match self {
            ApiError::InvalidInput(_) => "INVALID_INPUT",
            ApiError::NotFound(_) => "NOT_FOUND",
            ApiError::BusinessRuleViolation(_) => "BUSINESS_RULE_VIOLATION",
            ApiError::InvalidStateTransition { .. } => "INVALID_STATE",
            ApiError::CapacityExceeded { .. } => "CAPACITY_EXCEEDED",
            ApiError::InsufficientStock { .. } => "INSUFFICIENT_STOCK",
            ApiError::Unauthorized(_) => "UNAUTHORIZED",
            ApiError::ValidationError(_) => "VALIDATION_ERROR",
            ApiError::DatabaseError(_)
            | ApiError::DatabaseConnectionError(_)
            | ApiError::DatabaseTransactionError(_) => "DATABASE_ERROR",
            ApiError::InternalError(_) | ApiError::Other(_) => "INTERNAL_ERROR",
        }
    }

    /// 转换为边界输出的错误体
    pub fn to_body(&self) -> ErrorBody {
        let details = match self {
            ApiError::CapacityExceeded {
                resource,
                requested,
                available,
            } => Some(serde_json::json!({
                "resource": resource,
                "requested": requested,
                "available": available,
            })),
            ApiError::InsufficientStock {
                item,
                requested,
                available,
            } => Some(serde_json::json!({
                "item": item,
                "requested": requested,
                "available": available,
            })),
            ApiError::InvalidStateTransition { from, to } => Some(serde_json::json!({
                "from": from,
                "to": to,
            })),
            _ => None,
        };
        ErrorBody {
            code: self.code().to_string(),
            message: self.to_string(),
            details,
        }
    }
}
