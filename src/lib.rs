//! # permsync
//!
//! 基于组与世界的权限解析引擎，并把结果同步到宿主的在线会话。
//!
//! ## 功能特性
//!
//! - **组继承解析**: 深度优先、先父后子，循环继承只产生警告
//! - **主体权限计算**: 组 < 主体全局权限 < 主体世界权限
//! - **节点规范化**: 自动修复错误的嵌套，跳过非布尔条目
//! - **覆盖层同步**: 上线、离线、切换世界和组变化时只重算受影响的会话
//! - **管理性修改**: 设置/取消权限、修改成员关系，并按配置保存
//!
//! ## Features
//!
//! - `yaml` - 启用 YAML 配置文档支持（默认启用）
//! - `full` - 启用所有功能
//!
//! ## 权限解析示例
//!
#![cfg_attr(feature = "yaml", doc = "```rust")]
#![cfg_attr(not(feature = "yaml"), doc = "```rust,ignore")]
//! use permsync::{Document, PermissionStore, PrincipalId};
//!
//! let doc = Document::from_yaml_str(r#"
//! groups:
//!   default:
//!     permissions:
//!       world.build: false
//!   member:
//!     inheritance: [default]
//!     permissions:
//!       world.build: true
//!     worlds:
//!       arena:
//!         world.build: false
//! users:
//!   u1:
//!     groups: [member]
//! "#).unwrap();
//!
//! let mut store = PermissionStore::new(doc);
//! let u1 = PrincipalId::new("u1");
//!
//! assert_eq!(store.resolve_for_principal(&u1, "overworld").get("world.build"), Some(true));
//! assert_eq!(store.resolve_for_principal(&u1, "arena").get("world.build"), Some(false));
//! ```
//!
//! ## 会话同步示例
//!
//! ```rust
//! use permsync::manager::PermissionManager;
//! use permsync::sync::InMemoryHost;
//! use permsync::{Document, PermissionStore, Principal, PrincipalId};
//!
//! let host = InMemoryHost::new();
//! let mut manager = PermissionManager::new(PermissionStore::new(Document::new()), host.clone());
//! manager.create_group("default").unwrap();
//!
//! host.join("u1", "overworld");
//! manager.register(&Principal::new("u1", "Steve")).unwrap();
//!
//! manager.set_principal_permission(&PrincipalId::new("u1"), "nether:fire.immune", true).unwrap();
//! assert_eq!(host.has_permission("u1", "fire.immune"), None);
//!
//! manager.world_changed(&PrincipalId::new("u1"), "nether").unwrap();
//! assert_eq!(host.has_permission("u1", "fire.immune"), Some(true));
//! ```

pub mod computer;
pub mod config;
pub mod diagnostics;
pub mod document;
pub mod error;
pub mod group;
pub mod manager;
pub mod node;
pub mod normalizer;
pub mod principal;
pub mod resolver;
pub mod store;
pub mod sync;

pub use error::{DocumentError, Error, HostError, Result};

// ============================================================================
// 数据模型导出
// ============================================================================

pub use config::EngineConfig;
pub use document::{Document, Section, Value};
pub use group::{Group, GroupName, PermissionInfo};
pub use node::{PermissionMap, ScopedNode};
pub use principal::{Principal, PrincipalId};

// ============================================================================
// 引擎导出
// ============================================================================

pub use diagnostics::{Diagnostic, DiagnosticKind, DiagnosticSink, InMemoryDiagnostics, Severity};
pub use manager::{InMemoryPersistence, NoOpPersistence, PermissionManager, Persistence};
pub use store::PermissionStore;
pub use sync::{AttachmentSynchronizer, PermissionOverlay, SessionHost};
