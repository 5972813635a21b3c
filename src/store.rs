//! 权限存储模块
//!
//! [`PermissionStore`] 持有配置文档，是组、主体与权限节的唯一访问入口：
//!
//! - 文档进入存储时，`groups` 与 `users` 下的键会被规范化为小写
//! - 查询：组、成员关系、直接定义的权限信息
//! - 管理性修改：设置/取消权限、修改成员关系（首次赋值时创建记录）
//!
//! 权限解析见 [`crate::resolver`] 与 [`crate::computer`]。

use std::sync::Arc;

use indexmap::IndexMap;

use crate::config::EngineConfig;
use crate::diagnostics::{emit, Diagnostic, DiagnosticSink, NoOpDiagnostics};
use crate::document::{Document, Value};
use crate::error::{Error, Result};
use crate::group::{Group, GroupName, PermissionInfo};
use crate::node::{PermissionMap, ScopedNode};
use crate::normalizer::normalize_section;
use crate::principal::{Principal, PrincipalId};

/// 权限存储
pub struct PermissionStore {
    document: Document,
    config: EngineConfig,
    diagnostics: Arc<dyn DiagnosticSink>,
    repaired: bool,
}

impl PermissionStore {
    /// 使用默认配置创建存储
    pub fn new(document: Document) -> Self {
        Self::with_config(document, EngineConfig::default(), Arc::new(NoOpDiagnostics))
    }

    /// 使用自定义配置与诊断接收器创建存储
    pub fn with_config(
        document: Document,
        config: EngineConfig,
        diagnostics: Arc<dyn DiagnosticSink>,
    ) -> Self {
        let mut store = Self {
            document,
            config,
            diagnostics,
            repaired: false,
        };
        store.canonicalize();
        store
    }

    /// 当前文档
    pub fn document(&self) -> &Document {
        &self.document
    }

    /// 引擎配置
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// 诊断接收器
    pub fn diagnostics(&self) -> &dyn DiagnosticSink {
        self.diagnostics.as_ref()
    }

    pub(crate) fn diagnostics_handle(&self) -> Arc<dyn DiagnosticSink> {
        Arc::clone(&self.diagnostics)
    }

    /// 替换整个文档（例如重新加载配置后）
    pub fn replace_document(&mut self, document: Document) {
        self.document = document;
        self.repaired = false;
        self.canonicalize();
    }

    /// 自上次调用以来规范化器是否修改过文档，并清除该标记
    pub fn take_repaired(&mut self) -> bool {
        std::mem::take(&mut self.repaired)
    }

    /// 默认组
    pub fn default_group(&self) -> GroupName {
        GroupName::new(&self.config.default_group)
    }

    fn canonicalize(&mut self) {
        for scope in ["groups", "users"] {
            let Some(section) = self.document.section_mut(scope) else {
                continue;
            };
            let dropped = section.rekey(|key| match scope {
                "groups" => GroupName::new(key).into(),
                _ => PrincipalId::new(key).into(),
            });
            for (key, renamed) in dropped {
                emit(
                    self.diagnostics.as_ref(),
                    Diagnostic::duplicate_name(scope, &key, &renamed),
                );
            }
        }
    }

    /// 读取并规范化 `path` 处的权限节；节不存在时返回空映射
    pub(crate) fn read_permissions(&mut self, path: &str, description: &str) -> PermissionMap {
        let Some(section) = self.document.section_mut(path) else {
            return PermissionMap::new();
        };
        let normalized = normalize_section(
            section,
            description,
            self.config.node_delimiter,
            self.diagnostics.as_ref(),
        );
        if normalized.repairs > 0 {
            self.repaired = true;
        }
        normalized.permissions
    }

    fn node_key(&self, node: &str) -> String {
        node.replace(
            crate::document::PATH_SEPARATOR,
            &self.config.node_delimiter.to_string(),
        )
    }

    // ========================================================================
    // 组查询
    // ========================================================================

    /// 组是否存在
    pub fn group_exists(&self, group: &GroupName) -> bool {
        self.document.is_section(&group.section_path())
    }

    /// 获取组
    pub fn group(&self, name: impl Into<GroupName>) -> Option<Group> {
        let name = name.into();
        let section = self.document.section(&name.section_path())?;
        let prefix = section.get_string("prefix").map(str::to_string);
        Some(Group::new(name, prefix))
    }

    /// 所有已定义组的名称
    pub fn group_names(&self) -> Vec<GroupName> {
        self.document
            .section("groups")
            .map(|groups| {
                groups
                    .iter()
                    .filter(|(_, v)| v.is_section())
                    .map(|(k, _)| GroupName::new(k))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// 所有组；没有 `groups` 节时只返回默认组
    pub fn all_groups(&self) -> Vec<Group> {
        if !self.document.is_section("groups") {
            return vec![Group::new(self.default_group(), None)];
        }
        self.group_names()
            .into_iter()
            .filter_map(|name| self.group(name))
            .collect()
    }

    /// 组直接声明的父组（按声明顺序，不检查是否存在）
    pub fn inheritance(&self, group: &GroupName) -> Vec<GroupName> {
        self.document
            .get_string_list(&format!("{}/inheritance", group.section_path()))
            .iter()
            .map(GroupName::new)
            .collect()
    }

    /// 组的直接权限信息
    pub fn group_info(&mut self, group: impl Into<GroupName>) -> Option<PermissionInfo> {
        let group = group.into();
        if !self.group_exists(&group) {
            return None;
        }
        let groups = self
            .inheritance(&group)
            .into_iter()
            .filter(|g| self.group_exists(g))
            .collect();
        let path = group.section_path();
        Some(self.permission_info(&path, &format!("group {group}"), groups))
    }

    // ========================================================================
    // 主体查询
    // ========================================================================

    /// 主体是否有记录
    pub fn has_record(&self, id: &PrincipalId) -> bool {
        self.document.is_section(&id.section_path())
    }

    /// 所有有记录的主体
    pub fn principal_ids(&self) -> Vec<PrincipalId> {
        self.document
            .section("users")
            .map(|users| {
                users
                    .iter()
                    .filter(|(_, v)| v.is_section())
                    .map(|(k, _)| PrincipalId::new(k))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// 主体所属的组；没有记录的主体隐式属于默认组
    pub fn principal_groups(&self, id: &PrincipalId) -> Vec<GroupName> {
        if !self.has_record(id) {
            return vec![self.default_group()];
        }
        self.document
            .get_string_list(&format!("{}/groups", id.section_path()))
            .iter()
            .map(GroupName::new)
            .collect()
    }

    /// 在 `groups` 列表中显式列出该组的主体
    pub fn group_members(&self, group: impl Into<GroupName>) -> Vec<PrincipalId> {
        let group = group.into();
        self.principal_ids()
            .into_iter()
            .filter(|id| self.principal_groups(id).contains(&group))
            .collect()
    }

    /// 主体的直接权限信息
    pub fn principal_info(&mut self, id: &PrincipalId) -> Option<PermissionInfo> {
        if !self.has_record(id) {
            return None;
        }
        let groups = self
            .principal_groups(id)
            .into_iter()
            .filter(|g| self.group_exists(g))
            .collect();
        let path = id.section_path();
        Some(self.permission_info(&path, &format!("user {id}"), groups))
    }

    /// 按显示名查找主体（`name` 字段或以名字为键的旧记录）
    pub fn find_principal_by_name(&self, name: &str) -> Option<PrincipalId> {
        let legacy_key = PrincipalId::new(name);
        self.document.section("users")?.iter().find_map(|(key, value)| {
            let record = value.as_section()?;
            let matches = record.get_string("name") == Some(name) || key == legacy_key.as_str();
            matches.then(|| PrincipalId::new(key))
        })
    }

    /// 同步主体记录
    ///
    /// 以显示名为键的旧记录会被移动到 ID 下，并保证 `name` 字段与当前显示名一致。
    /// 返回文档是否被修改。
    pub fn sync_principal_record(&mut self, principal: &Principal) -> bool {
        let mut changed = false;
        let path = principal.id.section_path();

        if !self.document.is_section(&path) {
            let legacy_key = PrincipalId::new(&principal.name);
            if legacy_key != principal.id {
                if let Some(users) = self.document.section_mut("users") {
                    let legacy = users
                        .get_entry(legacy_key.as_str())
                        .filter(|v| v.is_section())
                        .is_some();
                    if legacy {
                        if let Some(record) = users.remove_entry(legacy_key.as_str()) {
                            users.insert(principal.id.as_str(), record);
                            tracing::info!(
                                principal = %principal.id,
                                legacy = %legacy_key,
                                "Moved principal record to its id"
                            );
                            changed = true;
                        }
                    }
                }
            }
        }

        if let Some(record) = self.document.section_mut(&path) {
            if record.get_string("name") != Some(principal.name.as_str()) {
                record.insert("name", principal.name.as_str());
                changed = true;
            }
        }

        changed
    }

    fn permission_info(
        &mut self,
        path: &str,
        description: &str,
        groups: Vec<GroupName>,
    ) -> PermissionInfo {
        let permissions =
            self.read_permissions(&format!("{path}/permissions"), description);
        let world_names = self
            .document
            .section(&format!("{path}/worlds"))
            .map(|worlds| {
                worlds
                    .iter()
                    .filter(|(_, v)| v.is_section())
                    .map(|(k, _)| k.to_string())
                    .collect::<Vec<_>>()
            })
            .unwrap_or_default();

        let mut worlds = IndexMap::new();
        for world in world_names {
            let map = self.read_permissions(
                &format!("{path}/worlds/{world}"),
                &format!("{description} world {world}"),
            );
            worlds.insert(world, map);
        }

        PermissionInfo {
            groups,
            permissions,
            worlds,
        }
    }

    // ========================================================================
    // 管理性修改
    // ========================================================================

    /// 创建组；已存在时返回 `false`
    pub fn create_group(&mut self, group: impl Into<GroupName>) -> Result<bool> {
        let group = group.into();
        if self.group_exists(&group) {
            return Ok(false);
        }
        self.document.create_section(&group.section_path())?;
        Ok(true)
    }

    /// 设置组的父组列表
    pub fn set_group_inheritance(&mut self, group: &GroupName, parents: &[GroupName]) -> Result<()> {
        self.require_group(group)?;
        let parents: Vec<String> = parents.iter().map(|g| g.as_str().to_string()).collect();
        self.document
            .set(&format!("{}/inheritance", group.section_path()), parents)
    }

    /// 设置组的显示前缀
    pub fn set_group_prefix(&mut self, group: &GroupName, prefix: &str) -> Result<()> {
        self.require_group(group)?;
        self.document
            .set(&format!("{}/prefix", group.section_path()), prefix)
    }

    /// 设置组权限
    pub fn set_group_permission(
        &mut self,
        group: &GroupName,
        node: &ScopedNode,
        value: bool,
    ) -> Result<()> {
        self.require_group(group)?;
        let key = self.node_key(&node.node);
        let path = format!("{}/{}", group.section_path(), node.section_path()?);
        self.document.create_section(&path)?.insert(key, value);
        Ok(())
    }

    /// 取消组权限；原本未设置时返回 `false`
    pub fn unset_group_permission(&mut self, group: &GroupName, node: &ScopedNode) -> Result<bool> {
        self.require_group(group)?;
        let key = self.node_key(&node.node);
        let path = format!("{}/{}", group.section_path(), node.section_path()?);
        Ok(self
            .document
            .section_mut(&path)
            .and_then(|section| section.remove_entry(&key))
            .is_some())
    }

    /// 设置主体所属的组
    pub fn set_principal_groups(&mut self, id: &PrincipalId, groups: &[GroupName]) -> Result<()> {
        self.ensure_principal_record(id)?;
        let groups: Vec<String> = groups.iter().map(|g| g.as_str().to_string()).collect();
        self.document
            .set(&format!("{}/groups", id.section_path()), groups)
    }

    /// 将主体加入组；已在组中时返回 `false`
    pub fn add_principal_group(&mut self, id: &PrincipalId, group: &GroupName) -> Result<bool> {
        self.ensure_principal_record(id)?;
        let mut groups = self.principal_groups(id);
        if groups.contains(group) {
            return Ok(false);
        }
        groups.push(group.clone());
        self.set_principal_groups(id, &groups)?;
        Ok(true)
    }

    /// 将主体移出组；原本不在组中时返回 `false`
    pub fn remove_principal_group(&mut self, id: &PrincipalId, group: &GroupName) -> Result<bool> {
        self.ensure_principal_record(id)?;
        let mut groups = self.principal_groups(id);
        let before = groups.len();
        groups.retain(|g| g != group);
        if groups.len() == before {
            return Ok(false);
        }
        self.set_principal_groups(id, &groups)?;
        Ok(true)
    }

    /// 设置主体权限
    pub fn set_principal_permission(
        &mut self,
        id: &PrincipalId,
        node: &ScopedNode,
        value: bool,
    ) -> Result<()> {
        let key = self.node_key(&node.node);
        let path = format!("{}/{}", id.section_path(), node.section_path()?);
        self.ensure_principal_record(id)?;
        self.document.create_section(&path)?.insert(key, value);
        Ok(())
    }

    /// 取消主体权限；原本未设置时返回 `false`
    pub fn unset_principal_permission(&mut self, id: &PrincipalId, node: &ScopedNode) -> Result<bool> {
        let key = self.node_key(&node.node);
        let path = format!("{}/{}", id.section_path(), node.section_path()?);
        Ok(self
            .document
            .section_mut(&path)
            .and_then(|section| section.remove_entry(&key))
            .is_some())
    }

    fn require_group(&self, group: &GroupName) -> Result<()> {
        if self.group_exists(group) {
            Ok(())
        } else {
            Err(Error::UnknownGroup(group.to_string()))
        }
    }

    /// 主体第一次被赋值时创建记录，初始属于默认组
    fn ensure_principal_record(&mut self, id: &PrincipalId) -> Result<()> {
        if self.has_record(id) {
            return Ok(());
        }
        let default_group = Value::from(vec![self.default_group().as_str()]);
        self.document
            .create_section(&id.section_path())?
            .insert("groups", default_group);
        Ok(())
    }
}
