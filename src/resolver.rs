//! 组继承解析模块
//!
//! 深度优先、先父后子地合并组权限：
//!
//! 1. 按声明顺序合并每个父组的解析结果（后声明的父组覆盖先声明的）
//! 2. 合并组自身的全局权限
//! 3. 合并组在当前世界的权限
//!
//! 每次递归都携带一份只属于该调用的祖先列表；父组已在祖先列表中时产生
//! 循环继承警告并跳过这条边，解析继续进行。
//!
//! ```rust
//! use permsync::{Document, GroupName, PermissionStore};
//!
//! let mut doc = Document::new();
//! doc.set("groups/default/permissions/world.build", false).unwrap();
//! doc.set("groups/member/inheritance", vec!["default"]).unwrap();
//! doc.set("groups/member/permissions/chat.color", true).unwrap();
//!
//! let mut store = PermissionStore::new(doc);
//! let perms = store.resolve_group_permissions(&GroupName::new("member"), "overworld");
//!
//! assert_eq!(perms.nodes(), vec!["world.build", "chat.color"]);
//! ```

use std::collections::HashSet;

use crate::diagnostics::{emit, Diagnostic};
use crate::group::GroupName;
use crate::node::{world_layer, PermissionMap};
use crate::store::PermissionStore;

impl PermissionStore {
    /// 解析组在某个世界中的有效权限（包含继承）
    ///
    /// 组不存在时返回空映射。世界名为空或包含 `/` 时只使用全局权限。
    pub fn resolve_group_permissions(&mut self, group: &GroupName, world: &str) -> PermissionMap {
        self.resolve_group(group, world_layer(Some(world)), &[])
    }

    /// `world` 已经过 `world_layer` 过滤；`None` 表示不合并世界权限
    pub(crate) fn resolve_group(
        &mut self,
        group: &GroupName,
        world: Option<&str>,
        ancestors: &[GroupName],
    ) -> PermissionMap {
        if !self.group_exists(group) {
            return PermissionMap::new();
        }

        let mut lineage = ancestors.to_vec();
        lineage.push(group.clone());

        let mut permissions = PermissionMap::new();

        for parent in self.inheritance(group) {
            if lineage.contains(&parent) {
                emit(
                    self.diagnostics(),
                    Diagnostic::recursive_inheritance(group.as_str(), &parent),
                );
                continue;
            }
            let inherited = self.resolve_group(&parent, world, &lineage);
            permissions.merge(&inherited);
        }

        let path = group.section_path();
        let own = self.read_permissions(&format!("{path}/permissions"), &format!("group {group}"));
        permissions.merge(&own);

        if let Some(world) = world {
            let in_world = self.read_permissions(
                &format!("{path}/worlds/{world}"),
                &format!("group {group} world {world}"),
            );
            permissions.merge(&in_world);
        }

        permissions
    }

    /// 直接或间接继承自 `group` 的所有组（包含 `group` 本身）
    pub fn dependent_groups(&self, group: &GroupName) -> HashSet<GroupName> {
        let mut closure = HashSet::new();
        self.collect_dependents(group, &mut closure);
        closure
    }

    fn collect_dependents(&self, group: &GroupName, closure: &mut HashSet<GroupName>) {
        if !closure.insert(group.clone()) {
            return;
        }
        for child in self.group_names() {
            if self.inheritance(&child).contains(group) {
                self.collect_dependents(&child, closure);
            }
        }
    }

    /// 组的继承链（所有直接和间接父组，按首次出现的深度优先顺序）
    pub fn inheritance_chain(&self, group: &GroupName) -> Vec<GroupName> {
        let mut chain = Vec::new();
        let mut visited = HashSet::new();
        visited.insert(group.clone());
        self.collect_chain(group, &mut chain, &mut visited);
        chain
    }

    fn collect_chain(
        &self,
        group: &GroupName,
        chain: &mut Vec<GroupName>,
        visited: &mut HashSet<GroupName>,
    ) {
        for parent in self.inheritance(group) {
            if !self.group_exists(&parent) || !visited.insert(parent.clone()) {
                continue;
            }
            chain.push(parent.clone());
            self.collect_chain(&parent, chain, visited);
        }
    }

    /// 让 `group` 继承 `parent` 是否会形成环
    pub fn would_create_cycle(&self, group: &GroupName, parent: &GroupName) -> bool {
        group == parent || self.inheritance_chain(parent).contains(group)
    }
}
