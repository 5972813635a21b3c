//! 内存宿主实现
//!
//! 用于嵌入式场景和测试。宿主与它发出的覆盖层共享同一份会话状态，
//! 克隆宿主也共享这份状态。

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use super::{PermissionOverlay, SessionHost};
use crate::error::{Error, HostError, Result};
use crate::node::PermissionMap;
use crate::principal::PrincipalId;

#[derive(Debug, Default)]
struct Session {
    world: String,
    /// 当前有效句柄的代号；0 表示没有挂载覆盖层
    generation: u64,
    permissions: PermissionMap,
    recalculations: usize,
}

#[derive(Debug, Default)]
struct HostState {
    sessions: HashMap<PrincipalId, Session>,
    next_generation: u64,
}

type SharedState = Arc<RwLock<HostState>>;

/// 内存宿主
#[derive(Debug, Clone, Default)]
pub struct InMemoryHost {
    state: SharedState,
}

impl InMemoryHost {
    /// 创建空宿主
    pub fn new() -> Self {
        Self::default()
    }

    /// 主体上线并进入 `world`
    pub fn join(&self, id: impl Into<PrincipalId>, world: impl Into<String>) {
        let mut state = self.write();
        state.sessions.insert(
            id.into(),
            Session {
                world: world.into(),
                ..Default::default()
            },
        );
    }

    /// 主体切换世界
    pub fn change_world(&self, id: impl Into<PrincipalId>, world: impl Into<String>) {
        if let Some(session) = self.write().sessions.get_mut(&id.into()) {
            session.world = world.into();
        }
    }

    /// 主体离线；其覆盖层句柄随之失效
    pub fn quit(&self, id: impl Into<PrincipalId>) {
        self.write().sessions.remove(&id.into());
    }

    /// 让主体当前的覆盖层句柄失效
    pub fn invalidate_handle(&self, id: impl Into<PrincipalId>) {
        if let Some(session) = self.write().sessions.get_mut(&id.into()) {
            session.generation = 0;
        }
    }

    /// 主体是否挂载了有效的覆盖层
    pub fn is_attached(&self, id: impl Into<PrincipalId>) -> bool {
        self.read()
            .sessions
            .get(&id.into())
            .is_some_and(|s| s.generation != 0)
    }

    /// 覆盖层当前的内容；没有有效覆盖层时返回 `None`
    pub fn permissions_of(&self, id: impl Into<PrincipalId>) -> Option<PermissionMap> {
        self.read()
            .sessions
            .get(&id.into())
            .filter(|s| s.generation != 0)
            .map(|s| s.permissions.clone())
    }

    /// 覆盖层中某个节点的值
    pub fn has_permission(&self, id: impl Into<PrincipalId>, node: &str) -> Option<bool> {
        self.permissions_of(id)?.get(node)
    }

    /// 宿主为主体执行过的重算次数
    pub fn recalculations(&self, id: impl Into<PrincipalId>) -> usize {
        self.read()
            .sessions
            .get(&id.into())
            .map_or(0, |s| s.recalculations)
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, HostState> {
        self.state
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, HostState> {
        self.state
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

impl SessionHost for InMemoryHost {
    type Overlay = InMemoryOverlay;

    fn attach(&self, principal: &PrincipalId) -> Result<InMemoryOverlay> {
        let mut state = self.state.write().map_err(|_| Error::lock_poisoned())?;
        state.next_generation += 1;
        let generation = state.next_generation;

        let session = state
            .sessions
            .get_mut(principal)
            .ok_or_else(|| HostError::AttachFailed {
                principal: principal.to_string(),
                reason: "principal is not online".into(),
            })?;
        session.generation = generation;
        session.permissions.clear();

        Ok(InMemoryOverlay {
            principal: principal.clone(),
            generation,
            state: Arc::clone(&self.state),
        })
    }

    fn detach(&self, principal: &PrincipalId, overlay: InMemoryOverlay) -> Result<()> {
        let mut state = self.state.write().map_err(|_| Error::lock_poisoned())?;
        let session = state
            .sessions
            .get_mut(principal)
            .filter(|s| s.generation == overlay.generation)
            .ok_or_else(|| HostError::InvalidHandle(principal.to_string()))?;
        session.generation = 0;
        session.permissions.clear();
        Ok(())
    }

    fn current_world(&self, principal: &PrincipalId) -> Option<String> {
        self.read().sessions.get(principal).map(|s| s.world.clone())
    }
}

/// 内存覆盖层句柄
#[derive(Debug)]
pub struct InMemoryOverlay {
    principal: PrincipalId,
    generation: u64,
    state: SharedState,
}

impl InMemoryOverlay {
    fn with_session<T>(&self, f: impl FnOnce(&mut Session) -> T) -> Result<T> {
        let mut state = self.state.write().map_err(|_| Error::lock_poisoned())?;
        let session = state
            .sessions
            .get_mut(&self.principal)
            .filter(|s| s.generation == self.generation)
            .ok_or_else(|| HostError::InvalidHandle(self.principal.to_string()))?;
        Ok(f(session))
    }
}

impl PermissionOverlay for InMemoryOverlay {
    fn replace_all(&mut self, permissions: &PermissionMap) -> Result<()> {
        self.with_session(|session| session.permissions = permissions.clone())
    }

    fn recalculate(&mut self) -> Result<()> {
        self.with_session(|session| session.recalculations += 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_attach_requires_session() {
        let host = InMemoryHost::new();
        assert!(host.attach(&PrincipalId::new("nobody")).is_err());

        host.join("p", "world");
        assert!(host.attach(&PrincipalId::new("p")).is_ok());
        assert!(host.is_attached("p"));
    }

    #[test]
    fn test_overlay_writes_through() {
        let host = InMemoryHost::new();
        host.join("p", "world");
        let mut overlay = host.attach(&PrincipalId::new("p")).unwrap();

        let perms: PermissionMap = [("fly", true)].into_iter().collect();
        overlay.replace_all(&perms).unwrap();
        overlay.recalculate().unwrap();

        assert_eq!(host.has_permission("p", "fly"), Some(true));
        assert_eq!(host.recalculations("p"), 1);
        assert_eq!(host.current_world(&PrincipalId::new("p")).as_deref(), Some("world"));
    }

    #[test]
    fn test_stale_handle_rejected() {
        let host = InMemoryHost::new();
        host.join("p", "world");
        let id = PrincipalId::new("p");
        let mut first = host.attach(&id).unwrap();
        let second = host.attach(&id).unwrap();

        let err = first.replace_all(&PermissionMap::new()).unwrap_err();
        assert!(matches!(err, Error::Host(HostError::InvalidHandle(_))));
        assert!(host.detach(&id, first).is_err());
        assert!(host.detach(&id, second).is_ok());
        assert!(!host.is_attached("p"));
    }

    #[test]
    fn test_quit_invalidates() {
        let host = InMemoryHost::new();
        host.join("p", "world");
        let id = PrincipalId::new("p");
        let overlay = host.attach(&id).unwrap();
        host.quit("p");
        assert!(host.detach(&id, overlay).is_err());
        assert!(host.current_world(&id).is_none());
    }
}
