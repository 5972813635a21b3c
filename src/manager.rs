//! 权限管理器模块
//!
//! [`PermissionManager`] 把存储、同步器和持久化组合在一起，提供宿主直接调用的
//! 生命周期入口和管理性修改：
//!
//! 1. 修改文档
//! 2. 按配置请求保存
//! 3. 只重算受影响的在线主体（单个主体，或依赖某个组的所有主体）
//!
//! ## 示例
//!
//! ```rust
//! use permsync::manager::{InMemoryPersistence, PermissionManager};
//! use permsync::sync::InMemoryHost;
//! use permsync::{Document, PermissionStore, Principal};
//! use std::sync::Arc;
//!
//! let mut doc = Document::new();
//! doc.set("groups/default/permissions/chat", true).unwrap();
//!
//! let host = InMemoryHost::new();
//! let persistence = InMemoryPersistence::new();
//! let mut manager = PermissionManager::new(PermissionStore::new(doc), host.clone())
//!     .with_persistence(Arc::new(persistence.clone()));
//!
//! host.join("u1", "overworld");
//! manager.register(&Principal::new("u1", "Steve")).unwrap();
//! assert_eq!(host.has_permission("u1", "chat"), Some(true));
//!
//! manager.set_group_permission("default", "chat", false).unwrap();
//! assert_eq!(host.has_permission("u1", "chat"), Some(false));
//! assert_eq!(persistence.count(), 1);
//! ```

use std::sync::{Arc, PoisonError, RwLock};

use crate::diagnostics::{emit, Diagnostic};
use crate::document::Document;
use crate::error::{Error, Result};
use crate::group::GroupName;
use crate::node::{PermissionMap, ScopedNode};
use crate::principal::{Principal, PrincipalId};
use crate::store::PermissionStore;
use crate::sync::{AttachmentSynchronizer, SessionHost};

// ============================================================================
// Persistence Trait
// ============================================================================

/// 文档持久化 trait
///
/// 空文档永远不会被保存，避免加载失败后覆盖磁盘上的配置。
pub trait Persistence: Send + Sync {
    /// 保存文档
    fn save(&self, document: &Document) -> Result<()>;
}

/// 不做任何保存
#[derive(Debug, Default, Clone, Copy)]
pub struct NoOpPersistence;

impl Persistence for NoOpPersistence {
    fn save(&self, _document: &Document) -> Result<()> {
        Ok(())
    }
}

/// 内存持久化
///
/// 记录每次保存的文档快照；克隆后共享记录
#[derive(Debug, Default, Clone)]
pub struct InMemoryPersistence {
    saved: Arc<RwLock<Vec<Document>>>,
}

impl InMemoryPersistence {
    /// 创建新的内存持久化
    pub fn new() -> Self {
        Self::default()
    }

    /// 保存次数
    pub fn count(&self) -> usize {
        self.saved.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// 最后一次保存的文档
    pub fn last(&self) -> Option<Document> {
        self.saved
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .last()
            .cloned()
    }
}

impl Persistence for InMemoryPersistence {
    fn save(&self, document: &Document) -> Result<()> {
        self.saved
            .write()
            .map_err(|_| Error::persistence("lock poisoned"))?
            .push(document.clone());
        Ok(())
    }
}

// ============================================================================
// PermissionManager
// ============================================================================

/// 权限管理器
pub struct PermissionManager<H: SessionHost> {
    store: PermissionStore,
    sync: AttachmentSynchronizer<H>,
    persistence: Arc<dyn Persistence>,
}

impl<H: SessionHost> PermissionManager<H> {
    /// 创建管理器；同步器与存储共用诊断接收器
    pub fn new(store: PermissionStore, host: H) -> Self {
        let sync = AttachmentSynchronizer::with_diagnostics(host, store.diagnostics_handle());
        Self {
            store,
            sync,
            persistence: Arc::new(NoOpPersistence),
        }
    }

    /// 设置持久化后端
    pub fn with_persistence(mut self, persistence: Arc<dyn Persistence>) -> Self {
        self.persistence = persistence;
        self
    }

    /// 存储
    pub fn store(&self) -> &PermissionStore {
        &self.store
    }

    /// 可变存储
    ///
    /// 直接修改不会触发保存和重算，修改后需要自行调用 `refresh_*`。
    pub fn store_mut(&mut self) -> &mut PermissionStore {
        &mut self.store
    }

    /// 同步器
    pub fn synchronizer(&self) -> &AttachmentSynchronizer<H> {
        &self.sync
    }

    // ========================================================================
    // 生命周期
    // ========================================================================

    /// 主体上线：同步记录、挂载覆盖层并计算权限
    ///
    /// 记录变化与修复合并为一次保存，保存失败只产生诊断，不影响上线。
    pub fn register(&mut self, principal: &Principal) -> Result<()> {
        let record_changed = self.store.sync_principal_record(principal);
        let result = self.sync.register(&mut self.store, principal);

        let repaired = self.store.take_repaired();
        let config = self.store.config();
        let should_save = (record_changed && config.persist_on_change)
            || (repaired && config.persist_repairs);
        if should_save {
            self.save_or_report();
        }
        result
    }

    /// 主体离线
    pub fn unregister(&mut self, id: &PrincipalId) -> Result<bool> {
        self.sync.unregister(id)
    }

    /// 主体切换了世界
    pub fn world_changed(&mut self, id: &PrincipalId, world: &str) -> Result<()> {
        let result = self.sync.recompute(&mut self.store, id, world);
        self.persist_repairs();
        result
    }

    /// 重算单个主体
    pub fn refresh_for_principal(&mut self, id: &PrincipalId) -> Result<()> {
        let result = self.sync.refresh(&mut self.store, id);
        self.persist_repairs();
        result
    }

    /// 重算依赖某个组的所有主体
    pub fn refresh_for_group(&mut self, group: &GroupName) -> Result<usize> {
        let result = self
            .sync
            .recompute_affected_by_group_change(&mut self.store, group);
        self.persist_repairs();
        result
    }

    /// 重算所有在线主体
    pub fn refresh_all(&mut self) -> Result<usize> {
        let result = self.sync.refresh_all(&mut self.store);
        self.persist_repairs();
        result
    }

    /// 替换文档并重算所有在线主体
    pub fn reload(&mut self, document: Document) -> Result<usize> {
        self.store.replace_document(document);
        tracing::info!(groups = self.store.group_names().len(), "Reloaded permission document");
        self.refresh_all()
    }

    /// 拆除所有覆盖层
    pub fn shutdown(&mut self) -> Result<usize> {
        let count = self.sync.unregister_all()?;
        self.persist_repairs();
        tracing::info!(detached = count, "Permission manager shut down");
        Ok(count)
    }

    /// 主体在某个世界的有效权限（不影响覆盖层）
    pub fn effective_permissions(&mut self, id: &PrincipalId, world: &str) -> PermissionMap {
        let permissions = self.store.resolve_for_principal(id, world);
        self.persist_repairs();
        permissions
    }

    // ========================================================================
    // 管理性修改
    // ========================================================================

    /// 创建组；已存在时返回 `false`
    pub fn create_group(&mut self, group: impl Into<GroupName>) -> Result<bool> {
        let created = self.store.create_group(group)?;
        if created {
            self.persist_change()?;
        }
        Ok(created)
    }

    /// 设置组的父组列表
    pub fn set_group_inheritance(
        &mut self,
        group: impl Into<GroupName>,
        parents: &[GroupName],
    ) -> Result<usize> {
        let group = group.into();
        self.store.set_group_inheritance(&group, parents)?;
        self.persist_change()?;
        self.refresh_for_group(&group)
    }

    /// 设置组的显示前缀
    pub fn set_group_prefix(&mut self, group: impl Into<GroupName>, prefix: &str) -> Result<()> {
        self.store.set_group_prefix(&group.into(), prefix)?;
        self.persist_change()
    }

    /// 设置组权限，`node` 可以是 `world:node` 形式；返回重算的主体数量
    pub fn set_group_permission(
        &mut self,
        group: impl Into<GroupName>,
        node: &str,
        value: bool,
    ) -> Result<usize> {
        let group = group.into();
        let node = self.parse_node(node)?;
        self.store.set_group_permission(&group, &node, value)?;
        self.persist_change()?;
        self.refresh_for_group(&group)
    }

    /// 取消组权限；原本未设置时返回 `false`
    pub fn unset_group_permission(&mut self, group: impl Into<GroupName>, node: &str) -> Result<bool> {
        let group = group.into();
        let node = self.parse_node(node)?;
        let removed = self.store.unset_group_permission(&group, &node)?;
        if removed {
            self.persist_change()?;
            self.refresh_for_group(&group)?;
        }
        Ok(removed)
    }

    /// 设置主体所属的组
    pub fn set_principal_groups(&mut self, id: &PrincipalId, groups: &[GroupName]) -> Result<()> {
        self.store.set_principal_groups(id, groups)?;
        self.persist_change()?;
        self.refresh_for_principal(id)
    }

    /// 将主体加入组；已在组中时返回 `false`
    pub fn add_principal_group(&mut self, id: &PrincipalId, group: impl Into<GroupName>) -> Result<bool> {
        let added = self.store.add_principal_group(id, &group.into())?;
        self.persist_change()?;
        self.refresh_for_principal(id)?;
        Ok(added)
    }

    /// 将主体移出组；原本不在组中时返回 `false`
    pub fn remove_principal_group(
        &mut self,
        id: &PrincipalId,
        group: impl Into<GroupName>,
    ) -> Result<bool> {
        let removed = self.store.remove_principal_group(id, &group.into())?;
        self.persist_change()?;
        self.refresh_for_principal(id)?;
        Ok(removed)
    }

    /// 设置主体权限，`node` 可以是 `world:node` 形式
    pub fn set_principal_permission(&mut self, id: &PrincipalId, node: &str, value: bool) -> Result<()> {
        let node = self.parse_node(node)?;
        self.store.set_principal_permission(id, &node, value)?;
        self.persist_change()?;
        self.refresh_for_principal(id)
    }

    /// 取消主体权限；原本未设置时返回 `false`
    pub fn unset_principal_permission(&mut self, id: &PrincipalId, node: &str) -> Result<bool> {
        let node = self.parse_node(node)?;
        let removed = self.store.unset_principal_permission(id, &node)?;
        if removed {
            self.persist_change()?;
            self.refresh_for_principal(id)?;
        }
        Ok(removed)
    }

    fn parse_node(&self, input: &str) -> Result<ScopedNode> {
        ScopedNode::parse(input, self.store.config().world_delimiter)
    }

    // ========================================================================
    // 持久化
    // ========================================================================

    fn persist_change(&mut self) -> Result<()> {
        if !self.store.config().persist_on_change {
            return Ok(());
        }
        self.save()
    }

    /// 规范化器修改过文档时按配置保存；失败只产生诊断
    fn persist_repairs(&mut self) {
        if !self.store.take_repaired() || !self.store.config().persist_repairs {
            return;
        }
        self.save_or_report();
    }

    fn save_or_report(&self) {
        if let Err(err) = self.save() {
            emit(self.store.diagnostics(), Diagnostic::persist_failed(err));
        }
    }

    fn save(&self) -> Result<()> {
        let document = self.store.document();
        if document.is_empty() {
            tracing::debug!("Skipping save of empty document");
            return Ok(());
        }
        self.persistence.save(document)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::diagnostics::{DiagnosticKind, InMemoryDiagnostics};
    use crate::error::DocumentError;
    use crate::sync::InMemoryHost;

    struct FailingPersistence;

    impl Persistence for FailingPersistence {
        fn save(&self, _document: &Document) -> Result<()> {
            Err(Error::persistence("disk full"))
        }
    }

    fn document() -> Document {
        let mut doc = Document::new();
        doc.set("groups/default/permissions/chat", true).unwrap();
        doc.set("groups/member/inheritance", vec!["default"]).unwrap();
        doc.set("groups/member/permissions/build", true).unwrap();
        doc.set("users/u1/name", "Steve").unwrap();
        doc.set("users/u1/groups", vec!["member"]).unwrap();
        doc
    }

    fn manager_with(
        doc: Document,
        config: EngineConfig,
    ) -> (PermissionManager<InMemoryHost>, InMemoryHost, InMemoryPersistence, InMemoryDiagnostics) {
        let host = InMemoryHost::new();
        let persistence = InMemoryPersistence::new();
        let sink = InMemoryDiagnostics::new();
        let store = PermissionStore::with_config(doc, config, Arc::new(sink.clone()));
        let manager = PermissionManager::new(store, host.clone())
            .with_persistence(Arc::new(persistence.clone()));
        (manager, host, persistence, sink)
    }

    fn online(manager: &mut PermissionManager<InMemoryHost>, host: &InMemoryHost, id: &str, world: &str) {
        host.join(id, world);
        manager.register(&Principal::new(id, id)).unwrap();
    }

    #[test]
    fn test_register_syncs_record_and_persists() {
        let (mut manager, host, persistence, _) = manager_with(document(), EngineConfig::default());
        host.join("u1", "overworld");

        manager.register(&Principal::new("u1", "Steve2")).unwrap();

        assert_eq!(persistence.count(), 1);
        let saved = persistence.last().unwrap();
        assert_eq!(saved.get_string("users/u1/name"), Some("Steve2"));
        assert_eq!(host.has_permission("u1", "build"), Some(true));
    }

    #[test]
    fn test_group_mutation_refreshes_dependents() {
        let (mut manager, host, persistence, _) = manager_with(document(), EngineConfig::default());
        online(&mut manager, &host, "u1", "overworld");
        online(&mut manager, &host, "u2", "overworld");

        let recomputed = manager.set_group_permission("member", "fly", true).unwrap();
        assert_eq!(recomputed, 1);
        assert_eq!(host.has_permission("u1", "fly"), Some(true));
        assert_eq!(host.has_permission("u2", "fly"), None);

        let recomputed = manager
            .set_group_permission("default", "nether:fire", true)
            .unwrap();
        assert_eq!(recomputed, 2);
        assert!(persistence.count() >= 2);

        assert!(manager.unset_group_permission("member", "fly").unwrap());
        assert_eq!(host.has_permission("u1", "fly"), None);
        assert!(!manager.unset_group_permission("member", "fly").unwrap());
    }

    #[test]
    fn test_unknown_group_mutation_fails() {
        let (mut manager, _, persistence, _) = manager_with(document(), EngineConfig::default());
        let err = manager.set_group_permission("ghost", "x", true).unwrap_err();
        assert!(matches!(err, Error::UnknownGroup(_)));
        assert_eq!(persistence.count(), 0);
    }

    #[test]
    fn test_principal_mutations() {
        let (mut manager, host, _, _) = manager_with(document(), EngineConfig::default());
        online(&mut manager, &host, "u2", "arena");
        let id = PrincipalId::new("u2");

        manager.set_principal_permission(&id, "arena:build", true).unwrap();
        assert_eq!(host.has_permission("u2", "build"), Some(true));
        // 新记录从默认组开始
        assert_eq!(
            manager.store().principal_groups(&id),
            vec![GroupName::new("default")]
        );

        manager.add_principal_group(&id, "member").unwrap();
        host.change_world("u2", "overworld");
        manager.world_changed(&id, "overworld").unwrap();
        assert_eq!(host.has_permission("u2", "build"), Some(true));

        manager.remove_principal_group(&id, "member").unwrap();
        assert_eq!(host.has_permission("u2", "build"), None);
    }

    #[test]
    fn test_repairs_persisted_when_enabled() {
        let mut doc = document();
        doc.set("groups/default/permissions/world/build", false).unwrap();

        let (mut manager, host, persistence, sink) = manager_with(doc.clone(), EngineConfig::default());
        online(&mut manager, &host, "u3", "overworld");
        assert_eq!(persistence.count(), 1);
        assert_eq!(sink.get_by_kind(DiagnosticKind::NestingRepaired).len(), 1);

        let (mut manager, host, persistence, _) = manager_with(doc, EngineConfig::read_only());
        online(&mut manager, &host, "u3", "overworld");
        assert_eq!(persistence.count(), 0);
        assert_eq!(host.has_permission("u3", "world.build"), Some(false));
    }

    #[test]
    fn test_persist_failure_is_diagnosed() {
        let mut doc = document();
        doc.set("users/u1/permissions/a/b", true).unwrap();
        let sink = InMemoryDiagnostics::new();
        let store = PermissionStore::with_config(doc, EngineConfig::default(), Arc::new(sink.clone()));
        let host = InMemoryHost::new();
        let mut manager =
            PermissionManager::new(store, host.clone()).with_persistence(Arc::new(FailingPersistence));

        host.join("u1", "overworld");
        // 名字一致，不需要保存记录；只有修复需要保存
        manager.register(&Principal::new("u1", "Steve")).unwrap();

        assert_eq!(sink.get_by_kind(DiagnosticKind::PersistFailed).len(), 1);
        assert_eq!(host.has_permission("u1", "a.b"), Some(true));
    }

    #[test]
    fn test_register_survives_failed_record_save() {
        let sink = InMemoryDiagnostics::new();
        let store = PermissionStore::with_config(document(), EngineConfig::default(), Arc::new(sink.clone()));
        let host = InMemoryHost::new();
        let mut manager =
            PermissionManager::new(store, host.clone()).with_persistence(Arc::new(FailingPersistence));

        host.join("u1", "overworld");
        manager.register(&Principal::new("u1", "Steve2")).unwrap();

        assert!(manager.synchronizer().is_registered(&PrincipalId::new("u1")));
        assert_eq!(host.has_permission("u1", "build"), Some(true));
        assert_eq!(sink.get_by_kind(DiagnosticKind::PersistFailed).len(), 1);
        assert_eq!(
            manager.store().document().get_string("users/u1/name"),
            Some("Steve2")
        );
    }

    #[test]
    fn test_invalid_world_in_node_rejected() {
        let (mut manager, _, persistence, _) = manager_with(document(), EngineConfig::default());

        let err = manager
            .set_group_permission("member", "a/b:fly", true)
            .unwrap_err();
        assert!(matches!(err, Error::Document(DocumentError::InvalidName(_))));

        let err = manager
            .set_principal_permission(&PrincipalId::new("u1"), ":fly", true)
            .unwrap_err();
        assert!(matches!(err, Error::Document(DocumentError::InvalidName(_))));
        assert_eq!(persistence.count(), 0);
    }

    #[test]
    fn test_empty_document_never_saved() {
        let (mut manager, _, persistence, _) = manager_with(Document::new(), EngineConfig::default());
        manager.create_group("staff").unwrap();
        assert_eq!(persistence.count(), 1);

        manager.reload(Document::new()).unwrap();
        manager.save().unwrap();
        assert_eq!(persistence.count(), 1);
    }

    #[test]
    fn test_reload_and_shutdown() {
        let (mut manager, host, _, _) = manager_with(document(), EngineConfig::default());
        online(&mut manager, &host, "u1", "overworld");
        assert_eq!(host.has_permission("u1", "chat"), Some(true));

        let mut replacement = Document::new();
        replacement.set("groups/default/permissions/chat", false).unwrap();
        assert_eq!(manager.reload(replacement).unwrap(), 1);
        assert_eq!(host.has_permission("u1", "chat"), Some(false));

        assert_eq!(manager.shutdown().unwrap(), 1);
        assert!(!host.is_attached("u1"));
        assert!(!manager.unregister(&PrincipalId::new("u1")).unwrap());
    }

    #[test]
    fn test_effective_permissions() {
        let (mut manager, _, _, _) = manager_with(document(), EngineConfig::default());
        let perms = manager.effective_permissions(&PrincipalId::new("u1"), "overworld");
        assert_eq!(perms.nodes(), vec!["chat", "build"]);
    }
}
