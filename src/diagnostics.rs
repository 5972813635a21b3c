//! 诊断信息模块
//!
//! 权限解析从不失败，遇到问题数据时只会修复或跳过，并产生一条诊断信息：
//!
//! - **嵌套修复**: 规范化器修复了错误的嵌套结构
//! - **非布尔节点**: 权限节下存在非布尔值的条目
//! - **循环继承**: 组的继承图中存在环
//!
//! 每条诊断都会通过 `tracing` 输出，同时交给可插拔的 [`DiagnosticSink`]，
//! 方便宿主和测试观察。
//!
//! ## 使用示例
//!
//! ```rust
//! use permsync::diagnostics::{Diagnostic, DiagnosticKind, DiagnosticSink, InMemoryDiagnostics};
//!
//! let sink = InMemoryDiagnostics::new();
//! sink.record(Diagnostic::recursive_inheritance("admin", "moderator"));
//!
//! let events = sink.get_by_kind(DiagnosticKind::RecursiveInheritance);
//! assert_eq!(events.len(), 1);
//! assert_eq!(events[0].message, "In group admin: recursive inheritance from moderator");
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, PoisonError, RwLock};

/// 诊断严重程度
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum Severity {
    /// 调试信息
    Debug,
    /// 一般信息
    #[default]
    Info,
    /// 警告
    Warning,
    /// 错误
    Error,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Severity::Debug => write!(f, "DEBUG"),
            Severity::Info => write!(f, "INFO"),
            Severity::Warning => write!(f, "WARNING"),
            Severity::Error => write!(f, "ERROR"),
        }
    }
}

/// 诊断类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DiagnosticKind {
    /// 修复了错误的嵌套
    NestingRepaired,
    /// 存在非布尔值的权限条目
    NonBooleanNode,
    /// 循环继承
    RecursiveInheritance,
    /// 规范化名称时发生冲突
    DuplicateName,
    /// 宿主拆除覆盖层失败（已容忍）
    DetachFailed,
    /// 批量重算时某个覆盖层更新失败（已跳过）
    RecomputeFailed,
    /// 持久化失败
    PersistFailed,
}

impl std::fmt::Display for DiagnosticKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DiagnosticKind::NestingRepaired => write!(f, "nesting_repaired"),
            DiagnosticKind::NonBooleanNode => write!(f, "non_boolean_node"),
            DiagnosticKind::RecursiveInheritance => write!(f, "recursive_inheritance"),
            DiagnosticKind::DuplicateName => write!(f, "duplicate_name"),
            DiagnosticKind::DetachFailed => write!(f, "detach_failed"),
            DiagnosticKind::RecomputeFailed => write!(f, "recompute_failed"),
            DiagnosticKind::PersistFailed => write!(f, "persist_failed"),
        }
    }
}

/// 一条诊断信息
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Diagnostic {
    /// 诊断类型
    pub kind: DiagnosticKind,
    /// 严重程度
    pub severity: Severity,
    /// 相关对象（节描述、组名或主体 ID）
    pub subject: String,
    /// 人类可读的消息
    pub message: String,
    /// 产生时间
    pub timestamp: DateTime<Utc>,
}

impl Diagnostic {
    /// 创建新的诊断
    pub fn new(
        kind: DiagnosticKind,
        severity: Severity,
        subject: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            severity,
            subject: subject.into(),
            message: message.into(),
            timestamp: Utc::now(),
        }
    }

    // ========================================================================
    // 便捷构造方法
    // ========================================================================

    /// 规范化器修复了 `section` 中的嵌套
    pub fn nesting_repaired(section: impl Into<String>) -> Self {
        let section = section.into();
        let message = format!("Fixed broken nesting in {section}.");
        Self::new(DiagnosticKind::NestingRepaired, Severity::Info, section, message)
    }

    /// `section` 中存在非布尔条目，`first` 为第一个，`more` 为其余数量
    pub fn non_boolean(section: impl Into<String>, first: &str, more: usize) -> Self {
        let section = section.into();
        let message = if more == 0 {
            format!("In {section}: {first} is non-boolean.")
        } else {
            format!("In {section}: {first} is non-boolean (+{more} more).")
        };
        Self::new(DiagnosticKind::NonBooleanNode, Severity::Warning, section, message)
    }

    /// 组 `group` 对 `parent` 的继承构成环
    pub fn recursive_inheritance(group: impl Into<String>, parent: impl std::fmt::Display) -> Self {
        let group = group.into();
        let message = format!("In group {group}: recursive inheritance from {parent}");
        Self::new(
            DiagnosticKind::RecursiveInheritance,
            Severity::Warning,
            group,
            message,
        )
    }

    /// `scope` 下 `key` 规范化后与已有条目冲突
    pub fn duplicate_name(scope: &str, key: &str, canonical: &str) -> Self {
        let message = format!("In {scope}: {key} duplicates {canonical} and was ignored");
        Self::new(DiagnosticKind::DuplicateName, Severity::Warning, scope, message)
    }

    /// 拆除 `principal` 的覆盖层失败
    pub fn detach_failed(principal: impl Into<String>, reason: impl std::fmt::Display) -> Self {
        let principal = principal.into();
        let message = format!("Overlay for {principal} was already gone: {reason}");
        Self::new(DiagnosticKind::DetachFailed, Severity::Debug, principal, message)
    }

    /// 批量重算时 `principal` 的覆盖层更新失败
    pub fn recompute_failed(principal: impl Into<String>, reason: impl std::fmt::Display) -> Self {
        let principal = principal.into();
        let message = format!("Could not update overlay for {principal}: {reason}");
        Self::new(DiagnosticKind::RecomputeFailed, Severity::Warning, principal, message)
    }

    /// 持久化失败
    pub fn persist_failed(reason: impl std::fmt::Display) -> Self {
        let message = format!("Failed to save configuration: {reason}");
        Self::new(DiagnosticKind::PersistFailed, Severity::Error, "document", message)
    }

    /// 检查是否是警告或更高级别
    pub fn is_warning(&self) -> bool {
        matches!(self.severity, Severity::Warning | Severity::Error)
    }
}

// ============================================================================
// DiagnosticSink Trait
// ============================================================================

/// 诊断接收器 trait
pub trait DiagnosticSink: Send + Sync {
    /// 记录一条诊断
    fn record(&self, diagnostic: Diagnostic);
}

/// 通过 `tracing` 输出诊断，然后交给接收器
pub(crate) fn emit(sink: &dyn DiagnosticSink, diagnostic: Diagnostic) {
    match diagnostic.severity {
        Severity::Debug => tracing::debug!(
            kind = %diagnostic.kind,
            subject = %diagnostic.subject,
            "{}",
            diagnostic.message
        ),
        Severity::Info => tracing::info!(
            kind = %diagnostic.kind,
            subject = %diagnostic.subject,
            "{}",
            diagnostic.message
        ),
        Severity::Warning => tracing::warn!(
            kind = %diagnostic.kind,
            subject = %diagnostic.subject,
            "{}",
            diagnostic.message
        ),
        Severity::Error => tracing::error!(
            kind = %diagnostic.kind,
            subject = %diagnostic.subject,
            "{}",
            diagnostic.message
        ),
    }
    sink.record(diagnostic);
}

// ============================================================================
// InMemoryDiagnostics
// ============================================================================

/// 内存诊断接收器
///
/// 用于测试和开发环境；克隆后共享同一份记录
#[derive(Debug, Default, Clone)]
pub struct InMemoryDiagnostics {
    entries: Arc<RwLock<Vec<Diagnostic>>>,
}

impl InMemoryDiagnostics {
    /// 创建新的内存接收器
    pub fn new() -> Self {
        Self::default()
    }

    /// 获取所有诊断
    pub fn get_all(&self) -> Vec<Diagnostic> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// 按类型获取诊断
    pub fn get_by_kind(&self, kind: DiagnosticKind) -> Vec<Diagnostic> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|d| d.kind == kind)
            .cloned()
            .collect()
    }

    /// 获取所有警告
    pub fn warnings(&self) -> Vec<Diagnostic> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|d| d.is_warning())
            .cloned()
            .collect()
    }

    /// 诊断数量
    pub fn count(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// 清空
    pub fn clear(&self) {
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}

impl DiagnosticSink for InMemoryDiagnostics {
    fn record(&self, diagnostic: Diagnostic) {
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(diagnostic);
    }
}

// ============================================================================
// NoOpDiagnostics
// ============================================================================

/// 空操作接收器，只保留 `tracing` 输出
#[derive(Debug, Default, Clone, Copy)]
pub struct NoOpDiagnostics;

impl DiagnosticSink for NoOpDiagnostics {
    fn record(&self, _diagnostic: Diagnostic) {}
}
