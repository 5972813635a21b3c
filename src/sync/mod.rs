//! 会话覆盖层同步模块
//!
//! 宿主为每个在线主体维护一个权限覆盖层，[`AttachmentSynchronizer`] 负责让覆盖层
//! 的内容始终等于该主体在当前世界的有效权限：
//!
//! - 主体上线时挂载覆盖层并计算权限
//! - 主体离线时拆除覆盖层（句柄已失效也能容忍）
//! - 组定义变化时只重算受影响的主体
//!
//! 覆盖层的内容总是整体替换，然后只请求一次宿主重算。
//!
//! ## 示例
//!
//! ```rust
//! use permsync::sync::{AttachmentSynchronizer, InMemoryHost};
//! use permsync::{Document, PermissionStore, Principal};
//!
//! let mut doc = Document::new();
//! doc.set("groups/default/permissions/chat", true).unwrap();
//! let mut store = PermissionStore::new(doc);
//!
//! let host = InMemoryHost::new();
//! host.join("u1", "overworld");
//!
//! let sync = AttachmentSynchronizer::new(host.clone());
//! sync.register(&mut store, &Principal::new("u1", "Steve")).unwrap();
//!
//! assert_eq!(host.has_permission("u1", "chat"), Some(true));
//! assert_eq!(host.recalculations("u1"), 1);
//! ```

mod memory;

pub use memory::{InMemoryHost, InMemoryOverlay};

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, RwLock};

use crate::diagnostics::{emit, Diagnostic, DiagnosticSink, NoOpDiagnostics};
use crate::error::{Error, HostError, Result};
use crate::group::GroupName;
use crate::node::PermissionMap;
use crate::principal::{Principal, PrincipalId};
use crate::store::PermissionStore;

// ============================================================================
// 宿主接口
// ============================================================================

/// 宿主为单个主体维护的权限覆盖层
pub trait PermissionOverlay: Send {
    /// 用 `permissions` 整体替换覆盖层内容
    fn replace_all(&mut self, permissions: &PermissionMap) -> Result<()>;

    /// 请求宿主重新计算该主体的有效权限
    fn recalculate(&mut self) -> Result<()>;
}

/// 宿主会话接口
pub trait SessionHost: Send + Sync {
    /// 覆盖层句柄类型
    type Overlay: PermissionOverlay;

    /// 为主体挂载新的覆盖层
    fn attach(&self, principal: &PrincipalId) -> Result<Self::Overlay>;

    /// 拆除覆盖层；句柄失效时返回 [`HostError::InvalidHandle`]
    fn detach(&self, principal: &PrincipalId, overlay: Self::Overlay) -> Result<()>;

    /// 主体当前所在的世界；宿主不知道时返回 `None`
    fn current_world(&self, principal: &PrincipalId) -> Option<String>;
}

// ============================================================================
// AttachmentSynchronizer
// ============================================================================

/// 覆盖层同步器
///
/// 在线覆盖层登记在内部的 `RwLock` 中，同步器本身可以在线程间共享；
/// 文档通过 `&mut PermissionStore` 传入。
pub struct AttachmentSynchronizer<H: SessionHost> {
    host: H,
    overlays: RwLock<HashMap<PrincipalId, H::Overlay>>,
    diagnostics: Arc<dyn DiagnosticSink>,
}

impl<H: SessionHost> AttachmentSynchronizer<H> {
    /// 创建同步器
    pub fn new(host: H) -> Self {
        Self::with_diagnostics(host, Arc::new(NoOpDiagnostics))
    }

    /// 使用自定义诊断接收器创建同步器
    pub fn with_diagnostics(host: H, diagnostics: Arc<dyn DiagnosticSink>) -> Self {
        Self {
            host,
            overlays: RwLock::new(HashMap::new()),
            diagnostics,
        }
    }

    /// 宿主
    pub fn host(&self) -> &H {
        &self.host
    }

    /// 为主体挂载覆盖层并按当前世界计算权限
    ///
    /// 已有的覆盖层会先被拆除。
    pub fn register(&self, store: &mut PermissionStore, principal: &Principal) -> Result<()> {
        let id = &principal.id;

        let previous = self
            .overlays
            .write()
            .map_err(|_| Error::lock_poisoned())?
            .remove(id);
        if let Some(overlay) = previous {
            self.detach_tolerant(id, overlay);
        }

        let overlay = self.host.attach(id)?;
        self.overlays
            .write()
            .map_err(|_| Error::lock_poisoned())?
            .insert(id.clone(), overlay);

        tracing::debug!(principal = %id, name = %principal.name, "Registered overlay");
        self.refresh(store, id)
    }

    /// 拆除主体的覆盖层；返回之前是否已注册
    pub fn unregister(&self, id: &PrincipalId) -> Result<bool> {
        let overlay = self
            .overlays
            .write()
            .map_err(|_| Error::lock_poisoned())?
            .remove(id);

        match overlay {
            Some(overlay) => {
                self.detach_tolerant(id, overlay);
                tracing::debug!(principal = %id, "Unregistered overlay");
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// 拆除所有覆盖层，返回拆除的数量
    pub fn unregister_all(&self) -> Result<usize> {
        let drained: Vec<_> = self
            .overlays
            .write()
            .map_err(|_| Error::lock_poisoned())?
            .drain()
            .collect();

        let count = drained.len();
        for (id, overlay) in drained {
            self.detach_tolerant(&id, overlay);
        }
        Ok(count)
    }

    /// 按 `world` 重算主体的覆盖层；没有覆盖层时什么也不做
    ///
    /// 宿主报告句柄失效时，覆盖层会从登记表中移除，并返回该错误。
    pub fn recompute(&self, store: &mut PermissionStore, id: &PrincipalId, world: &str) -> Result<()> {
        self.recompute_in(store, id, Some(world))
    }

    /// 按宿主报告的当前世界重算主体的覆盖层
    ///
    /// 宿主不知道主体所在的世界时只使用全局权限。
    pub fn refresh(&self, store: &mut PermissionStore, id: &PrincipalId) -> Result<()> {
        let world = self.host.current_world(id);
        self.recompute_in(store, id, world.as_deref())
    }

    /// 重算所有在线主体，返回成功重算的数量
    ///
    /// 单个覆盖层失败不会中断其余主体的重算，失败通过诊断报告。
    pub fn refresh_all(&self, store: &mut PermissionStore) -> Result<usize> {
        let live = self.live_principals()?;
        Ok(self.refresh_each(store, live))
    }

    /// 组定义变化后，重算成员关系与受影响组有交集的在线主体
    ///
    /// 受影响的组是 `group` 以及所有直接或间接继承它的组。没有记录的主体
    /// 视为默认组成员。失败处理与 [`Self::refresh_all`] 相同，返回成功重算的数量。
    pub fn recompute_affected_by_group_change(
        &self,
        store: &mut PermissionStore,
        group: &GroupName,
    ) -> Result<usize> {
        let affected: HashSet<GroupName> = store.dependent_groups(group);

        let targets: Vec<PrincipalId> = self
            .live_principals()?
            .into_iter()
            .filter(|id| {
                store
                    .principal_groups(id)
                    .iter()
                    .any(|g| affected.contains(g))
            })
            .collect();
        let count = self.refresh_each(store, targets);

        tracing::debug!(group = %group, affected = affected.len(), recomputed = count, "Group change applied");
        Ok(count)
    }

    fn refresh_each(&self, store: &mut PermissionStore, ids: Vec<PrincipalId>) -> usize {
        let mut count = 0;
        for id in ids {
            match self.refresh(store, &id) {
                Ok(()) => count += 1,
                Err(err) => emit(
                    self.diagnostics.as_ref(),
                    Diagnostic::recompute_failed(id.as_str(), err),
                ),
            }
        }
        count
    }

    fn recompute_in(
        &self,
        store: &mut PermissionStore,
        id: &PrincipalId,
        world: Option<&str>,
    ) -> Result<()> {
        if !self.is_registered(id) {
            return Ok(());
        }

        let permissions = store.resolve_principal(id, world);

        let mut overlays = self.overlays.write().map_err(|_| Error::lock_poisoned())?;
        let Some(overlay) = overlays.get_mut(id) else {
            return Ok(());
        };
        let applied = overlay
            .replace_all(&permissions)
            .and_then(|()| overlay.recalculate());

        if let Err(err) = applied {
            if matches!(err, Error::Host(HostError::InvalidHandle(_))) {
                overlays.remove(id);
                tracing::debug!(principal = %id, "Dropped overlay with invalid handle");
            }
            return Err(err);
        }

        tracing::trace!(principal = %id, ?world, nodes = permissions.len(), "Recomputed overlay");
        Ok(())
    }

    /// 当前在线（已挂载覆盖层）的主体，按 ID 排序
    pub fn live_principals(&self) -> Result<Vec<PrincipalId>> {
        let mut ids: Vec<PrincipalId> = self
            .overlays
            .read()
            .map_err(|_| Error::lock_poisoned())?
            .keys()
            .cloned()
            .collect();
        ids.sort();
        Ok(ids)
    }

    /// 主体是否已挂载覆盖层
    pub fn is_registered(&self, id: &PrincipalId) -> bool {
        self.overlays
            .read()
            .map(|overlays| overlays.contains_key(id))
            .unwrap_or(false)
    }

    fn detach_tolerant(&self, id: &PrincipalId, overlay: H::Overlay) {
        if let Err(err) = self.host.detach(id, overlay) {
            emit(
                self.diagnostics.as_ref(),
                Diagnostic::detach_failed(id.as_str(), err),
            );
        }
    }
}
