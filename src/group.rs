//! 组定义模块
//!
//! 组的存在完全由 `groups` 节下的子键决定，没有单独的组注册表。

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::document::canonical_segment;
use crate::node::PermissionMap;

/// 组名
///
/// 组名比较不区分大小写：进入系统时统一转为小写，之后使用普通的相等与哈希。
/// 组名总是单个路径段，其中的 `/` 会被转义为 `%2f`。
///
/// ```rust
/// use permsync::GroupName;
///
/// assert_eq!(GroupName::new("Admin"), GroupName::new("ADMIN"));
/// assert_eq!(GroupName::new("Admin").as_str(), "admin");
/// assert_eq!(GroupName::new("Staff/Mods").as_str(), "staff%2fmods");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct GroupName(String);

impl GroupName {
    /// 创建并规范化
    pub fn new(name: impl AsRef<str>) -> Self {
        Self(canonical_segment(name.as_ref()))
    }

    /// 规范化后的组名
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// 文档中的组节路径
    pub(crate) fn section_path(&self) -> String {
        format!("groups/{}", self.0)
    }
}

impl From<String> for GroupName {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

impl From<&str> for GroupName {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<GroupName> for String {
    fn from(value: GroupName) -> Self {
        value.0
    }
}

impl fmt::Display for GroupName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// 组的只读视图
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Group {
    name: GroupName,
    prefix: String,
}

impl Group {
    pub(crate) fn new(name: GroupName, prefix: Option<String>) -> Self {
        let prefix = prefix.unwrap_or_else(|| name.as_str().to_string());
        Self { name, prefix }
    }

    /// 组名
    pub fn name(&self) -> &GroupName {
        &self.name
    }

    /// 显示前缀（默认与组名相同）
    pub fn prefix(&self) -> &str {
        &self.prefix
    }
}

impl fmt::Display for Group {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Group{{name={}}}", self.name)
    }
}

/// 组或主体上直接定义的权限信息（不含继承）
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermissionInfo {
    /// 继承的组（对组而言）或所属的组（对主体而言），只包含存在的组
    pub groups: Vec<GroupName>,
    /// 全局权限（已规范化）
    pub permissions: PermissionMap,
    /// 各世界的权限（已规范化），按文档顺序
    pub worlds: IndexMap<String, PermissionMap>,
}

impl PermissionInfo {
    /// 定义了世界权限的世界名
    pub fn world_names(&self) -> Vec<&str> {
        self.worlds.keys().map(String::as_str).collect()
    }

    /// 某个世界的权限；未定义时返回空映射
    pub fn world_permissions(&self, world: &str) -> PermissionMap {
        self.worlds.get(world).cloned().unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_group_name_case_insensitive() {
        let a = GroupName::new("VIP");
        let b = GroupName::from("vip");
        assert_eq!(a, b);

        let mut set = std::collections::HashSet::new();
        set.insert(a);
        assert!(set.contains(&GroupName::new(" Vip ")));
    }

    #[test]
    fn test_group_name_is_single_segment() {
        let name = GroupName::new("a/b");
        assert_eq!(name.section_path(), "groups/a%2fb");
        assert_ne!(name, GroupName::new("a"));
    }

    #[test]
    fn test_group_prefix_defaults_to_name() {
        let group = Group::new(GroupName::new("Member"), None);
        assert_eq!(group.prefix(), "member");
        assert_eq!(group.to_string(), "Group{name=member}");

        let styled = Group::new(GroupName::new("admin"), Some("[A]".into()));
        assert_eq!(styled.prefix(), "[A]");
    }

    #[test]
    fn test_permission_info_worlds() {
        let mut info = PermissionInfo::default();
        info.worlds.insert(
            "nether".into(),
            [("fire.immune", true)].into_iter().collect(),
        );
        assert_eq!(info.world_names(), vec!["nether"]);
        assert_eq!(info.world_permissions("nether").get("fire.immune"), Some(true));
        assert!(info.world_permissions("end").is_empty());
    }
}
