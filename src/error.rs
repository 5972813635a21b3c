//! 统一错误类型模块
//!
//! 提供 permsync 库中所有可失败操作的错误类型定义。
//!
//! 权限解析本身永远不会失败（缺失的组、格式错误的节点和循环继承都只会
//! 产生诊断信息），只有文档修改、宿主交互和持久化会返回错误。

use thiserror::Error as ThisError;

/// permsync 库的统一结果类型
pub type Result<T> = std::result::Result<T, Error>;

/// permsync 库的错误类型
#[derive(Debug, ThisError)]
pub enum Error {
    /// 配置文档错误
    #[error("Document error: {0}")]
    Document(#[from] DocumentError),

    /// 宿主会话交互错误
    #[error("Host error: {0}")]
    Host(#[from] HostError),

    /// 组不存在
    #[error("No such group {0}")]
    UnknownGroup(String),

    /// 持久化错误
    #[error("Persistence error: {0}")]
    Persistence(String),

    /// 内部错误
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// 创建一个内部错误
    pub fn internal(msg: impl Into<String>) -> Self {
        Error::Internal(msg.into())
    }

    /// 创建一个持久化错误
    pub fn persistence(msg: impl Into<String>) -> Self {
        Error::Persistence(msg.into())
    }

    /// 锁中毒时使用的统一错误
    pub(crate) fn lock_poisoned() -> Self {
        Error::Internal("lock poisoned".into())
    }
}

/// 配置文档相关错误
#[derive(Debug, Clone, PartialEq, Eq, ThisError)]
pub enum DocumentError {
    /// 路径为空或包含空段
    #[error("invalid path: '{0}'")]
    InvalidPath(String),
    /// 名称不能作为路径段使用
    #[error("invalid name: '{0}'")]
    InvalidName(String),
    /// 文档解析失败
    #[error("failed to parse document: {0}")]
    Parse(String),
    /// 文档序列化失败
    #[error("failed to serialize document: {0}")]
    Serialize(String),
}

/// 宿主会话相关错误
#[derive(Debug, Clone, PartialEq, Eq, ThisError)]
pub enum HostError {
    /// 无法为主体创建覆盖层
    #[error("failed to attach overlay for {principal}: {reason}")]
    AttachFailed { principal: String, reason: String },
    /// 覆盖层句柄已失效
    #[error("overlay handle for {0} is no longer valid")]
    InvalidHandle(String),
    /// 宿主重新计算失败
    #[error("recalculation failed for {principal}: {reason}")]
    RecalculateFailed { principal: String, reason: String },
}
