//! 主体权限计算模块
//!
//! 优先级从低到高：
//!
//! | 来源 | 说明 |
//! |------|------|
//! | 组（按成员列表顺序） | 每个组已包含其父组与世界权限 |
//! | 主体全局权限 | `users/<id>/permissions` |
//! | 主体世界权限 | `users/<id>/worlds/<world>` |
//!
//! 覆盖以完整节点字符串为单位；没有记录的主体等同于默认组。

use crate::node::{world_layer, PermissionMap};
use crate::principal::PrincipalId;
use crate::store::PermissionStore;

impl PermissionStore {
    /// 计算主体在某个世界中的有效权限
    ///
    /// ```rust
    /// use permsync::{Document, PermissionStore, PrincipalId};
    ///
    /// let mut doc = Document::new();
    /// doc.set("groups/default/permissions/chat", true).unwrap();
    /// doc.set("users/steve/groups", vec!["default"]).unwrap();
    /// doc.set("users/steve/permissions/chat", false).unwrap();
    ///
    /// let mut store = PermissionStore::new(doc);
    /// let steve = store.resolve_for_principal(&PrincipalId::new("steve"), "overworld");
    /// assert_eq!(steve.get("chat"), Some(false));
    ///
    /// let stranger = store.resolve_for_principal(&PrincipalId::new("alex"), "overworld");
    /// assert_eq!(stranger.get("chat"), Some(true));
    /// ```
    pub fn resolve_for_principal(&mut self, id: &PrincipalId, world: &str) -> PermissionMap {
        self.resolve_principal(id, Some(world))
    }

    /// 计算主体不在任何世界时的有效权限（只合并全局权限）
    pub fn resolve_global_for_principal(&mut self, id: &PrincipalId) -> PermissionMap {
        self.resolve_principal(id, None)
    }

    pub(crate) fn resolve_principal(&mut self, id: &PrincipalId, world: Option<&str>) -> PermissionMap {
        let world = world_layer(world);

        if !self.has_record(id) {
            let default_group = self.default_group();
            return self.resolve_group(&default_group, world, &[]);
        }

        let mut permissions = PermissionMap::new();
        for group in self.principal_groups(id) {
            let granted = self.resolve_group(&group, world, &[]);
            permissions.merge(&granted);
        }

        let path = id.section_path();
        let own = self.read_permissions(&format!("{path}/permissions"), &format!("user {id}"));
        permissions.merge(&own);

        if let Some(world) = world {
            let in_world = self.read_permissions(
                &format!("{path}/worlds/{world}"),
                &format!("user {id} world {world}"),
            );
            permissions.merge(&in_world);
        }

        tracing::trace!(principal = %id, ?world, nodes = permissions.len(), "Resolved principal permissions");
        permissions
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::Document;

    fn id(s: &str) -> PrincipalId {
        PrincipalId::new(s)
    }

    fn base_document() -> Document {
        let mut doc = Document::new();
        doc.set("groups/default/permissions/world.build", false).unwrap();
        doc.set("groups/default/permissions/chat", true).unwrap();
        doc.set("groups/member/inheritance", vec!["default"]).unwrap();
        doc.set("groups/member/permissions/world.build", true).unwrap();
        doc.set("groups/member/worlds/arena/world.build", false)
            .unwrap();
        doc.set("groups/muted/permissions/chat", false).unwrap();
        doc
    }

    #[test]
    fn test_unknown_principal_uses_default_group() {
        let mut store = PermissionStore::new(base_document());
        let stranger = store.resolve_for_principal(&id("nobody"), "overworld");
        let default = store.resolve_group_permissions(&"default".into(), "overworld");
        assert_eq!(stranger, default);
        assert_eq!(stranger.get("world.build"), Some(false));
    }

    #[test]
    fn test_record_without_groups_gets_nothing_from_groups() {
        let mut doc = base_document();
        doc.set("users/loner/name", "Loner").unwrap();
        let mut store = PermissionStore::new(doc);
        assert!(store.resolve_for_principal(&id("loner"), "overworld").is_empty());
    }

    #[test]
    fn test_group_list_order() {
        let mut doc = base_document();
        doc.set("users/a/groups", vec!["default", "muted"]).unwrap();
        doc.set("users/b/groups", vec!["muted", "default"]).unwrap();
        let mut store = PermissionStore::new(doc);

        assert_eq!(store.resolve_for_principal(&id("a"), "w").get("chat"), Some(false));
        assert_eq!(store.resolve_for_principal(&id("b"), "w").get("chat"), Some(true));
    }

    #[test]
    fn test_principal_overrides() {
        let mut doc = base_document();
        doc.set("users/steve/groups", vec!["member"]).unwrap();
        doc.set("users/steve/permissions/chat", false).unwrap();
        doc.set("users/steve/worlds/lobby/chat", true).unwrap();
        doc.set("users/steve/worlds/arena/world.build", true).unwrap();
        let mut store = PermissionStore::new(doc);

        let overworld = store.resolve_for_principal(&id("steve"), "overworld");
        assert_eq!(overworld.get("chat"), Some(false));
        assert_eq!(overworld.get("world.build"), Some(true));

        let lobby = store.resolve_for_principal(&id("steve"), "lobby");
        assert_eq!(lobby.get("chat"), Some(true));

        // 主体世界权限覆盖组世界权限
        let arena = store.resolve_for_principal(&id("steve"), "arena");
        assert_eq!(arena.get("world.build"), Some(true));
    }

    #[test]
    fn test_member_scenario() {
        let mut doc = base_document();
        doc.set("users/u1/groups", vec!["member"]).unwrap();
        let mut store = PermissionStore::new(doc);

        assert_eq!(
            store.resolve_for_principal(&id("u1"), "overworld").get("world.build"),
            Some(true)
        );
        assert_eq!(
            store.resolve_for_principal(&id("u1"), "arena").get("world.build"),
            Some(false)
        );
        assert_eq!(
            store.resolve_for_principal(&id("u2"), "overworld").get("world.build"),
            Some(false)
        );
    }

    #[test]
    fn test_world_names_are_case_sensitive() {
        let mut doc = base_document();
        doc.set("users/u1/groups", vec!["member"]).unwrap();
        let mut store = PermissionStore::new(doc);
        assert_eq!(
            store.resolve_for_principal(&id("u1"), "Arena").get("world.build"),
            Some(true)
        );
    }

    #[test]
    fn test_global_resolution_skips_world_layers() {
        let mut doc = base_document();
        doc.set("users/u1/groups", vec!["member"]).unwrap();
        doc.set("users/u1/worlds/arena/chat", false).unwrap();
        let mut store = PermissionStore::new(doc);

        let global = store.resolve_global_for_principal(&id("u1"));
        assert_eq!(global.get("world.build"), Some(true));
        assert_eq!(global.get("chat"), Some(true));
        assert_eq!(global, store.resolve_for_principal(&id("u1"), ""));
    }

    #[test]
    fn test_repair_during_resolution_marks_store() {
        let mut doc = base_document();
        doc.set("users/u1/groups", vec!["member"]).unwrap();
        doc.set("users/u1/permissions/fly/fast", true).unwrap();
        let mut store = PermissionStore::new(doc);

        let perms = store.resolve_for_principal(&id("u1"), "overworld");
        assert_eq!(perms.get("fly.fast"), Some(true));
        assert!(store.take_repaired());
        assert!(!store.take_repaired());
        assert_eq!(
            store.document().get_bool("users/u1/permissions/fly.fast"),
            Some(true)
        );
    }
}
