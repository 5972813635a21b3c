//! 权限节点与有效权限映射
//!
//! [`PermissionMap`] 是解析的输出：权限节点到布尔值的有序映射。
//! 写入已存在的键时，旧位置会被移除，新值追加到末尾，因此迭代顺序
//! 始终反映声明与覆盖的先后（“后写者胜”）。

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::document::PATH_SEPARATOR;
use crate::error::{DocumentError, Result};

/// 有效权限映射
///
/// 注意：`PartialEq` 只比较内容，不比较顺序；需要比较顺序时请使用
/// [`PermissionMap::nodes`]。
///
/// ```rust
/// use permsync::PermissionMap;
///
/// let mut perms = PermissionMap::new();
/// perms.insert("world.build", true);
/// perms.insert("chat.color", true);
/// perms.insert("world.build", false);
///
/// assert_eq!(perms.get("world.build"), Some(false));
/// assert_eq!(perms.nodes(), vec!["chat.color", "world.build"]);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PermissionMap {
    entries: IndexMap<String, bool>,
}

impl PermissionMap {
    /// 创建空映射
    pub fn new() -> Self {
        Self::default()
    }

    /// 写入节点，已存在时移动到末尾
    pub fn insert(&mut self, node: impl Into<String>, value: bool) {
        let node = node.into();
        self.entries.shift_remove(&node);
        self.entries.insert(node, value);
    }

    /// 以后写者胜的语义合并另一个映射
    pub fn merge(&mut self, other: &PermissionMap) {
        for (node, value) in &other.entries {
            self.insert(node.clone(), *value);
        }
    }

    /// 读取节点值
    pub fn get(&self, node: &str) -> Option<bool> {
        self.entries.get(node).copied()
    }

    /// 是否包含节点
    pub fn contains(&self, node: &str) -> bool {
        self.entries.contains_key(node)
    }

    /// 移除节点
    pub fn remove(&mut self, node: &str) -> Option<bool> {
        self.entries.shift_remove(node)
    }

    /// 节点数量
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// 是否为空
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// 清空
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// 按顺序遍历
    pub fn iter(&self) -> impl Iterator<Item = (&str, bool)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), *v))
    }

    /// 按顺序返回节点名
    pub fn nodes(&self) -> Vec<&str> {
        self.entries.keys().map(String::as_str).collect()
    }
}

impl<S: Into<String>> FromIterator<(S, bool)> for PermissionMap {
    fn from_iter<I: IntoIterator<Item = (S, bool)>>(iter: I) -> Self {
        let mut map = PermissionMap::new();
        for (node, value) in iter {
            map.insert(node, value);
        }
        map
    }
}

impl<S: Into<String>> Extend<(S, bool)> for PermissionMap {
    fn extend<I: IntoIterator<Item = (S, bool)>>(&mut self, iter: I) {
        for (node, value) in iter {
            self.insert(node, value);
        }
    }
}

impl IntoIterator for PermissionMap {
    type Item = (String, bool);
    type IntoIter = indexmap::map::IntoIter<String, bool>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}

/// 可能带世界前缀的权限节点
///
/// 管理输入使用 `world:node` 表示只在某个世界生效的节点
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ScopedNode {
    /// 世界名，`None` 表示全局
    pub world: Option<String>,
    /// 权限节点
    pub node: String,
}

impl ScopedNode {
    /// 全局节点
    pub fn global(node: impl Into<String>) -> Self {
        Self {
            world: None,
            node: node.into(),
        }
    }

    /// 世界节点
    pub fn in_world(world: impl Into<String>, node: impl Into<String>) -> Self {
        Self {
            world: Some(world.into()),
            node: node.into(),
        }
    }

    /// 按第一个 `delimiter` 拆分 `world:node`
    ///
    /// 世界名为空或包含 `/` 时返回错误。
    pub fn parse(input: &str, delimiter: char) -> Result<Self> {
        match input.split_once(delimiter) {
            Some((world, node)) => {
                validate_world(world)?;
                Ok(Self::in_world(world, node))
            }
            None => Ok(Self::global(input)),
        }
    }

    /// 相对于主体/组节的子节路径
    pub fn section_path(&self) -> Result<String> {
        match &self.world {
            Some(world) => {
                validate_world(world)?;
                Ok(format!("worlds/{world}"))
            }
            None => Ok("permissions".to_string()),
        }
    }
}

/// 世界名不能为空，也不能包含路径分隔符
pub(crate) fn validate_world(world: &str) -> Result<()> {
    if world.is_empty() || world.contains(PATH_SEPARATOR) {
        return Err(DocumentError::InvalidName(world.to_string()).into());
    }
    Ok(())
}

/// 解析时使用的世界层；没有世界或世界名无效时只使用全局权限
pub(crate) fn world_layer(world: Option<&str>) -> Option<&str> {
    let world = world.filter(|w| !w.is_empty())?;
    if world.contains(PATH_SEPARATOR) {
        tracing::warn!(world, "Ignoring world name containing a path separator");
        return None;
    }
    Some(world)
}

impl fmt::Display for ScopedNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.world {
            Some(world) => write!(f, "{}:{}", world, self.node),
            None => write!(f, "{}", self.node),
        }
    }
}
