//! # 配置文档模块
//!
//! 权限数据保存在一棵分层的配置文档中，每个节都可以通过 `/` 分隔的路径访问，
//! 例如 `groups/admin/worlds/nether`。
//!
//! ```text
//! groups/<name>/prefix: string
//! groups/<name>/inheritance: [string]
//! groups/<name>/permissions/<node>: bool
//! groups/<name>/worlds/<world>/<node>: bool
//! users/<id>/name: string
//! users/<id>/groups: [string]
//! users/<id>/permissions/<node>: bool
//! users/<id>/worlds/<world>/<node>: bool
//! ```
//!
//! 从磁盘加载和保存文档不属于本库的职责；本模块只提供内存中的文档模型，
//! 以及 JSON / YAML 文本与文档之间的转换。
//!
//! ## 示例
//!
//! ```rust
//! use permsync::document::Document;
//!
//! let mut doc = Document::new();
//! doc.set("groups/default/permissions/world.build", false).unwrap();
//! doc.set("users/steve/groups", vec!["member"]).unwrap();
//!
//! assert!(doc.is_section("groups/default"));
//! assert_eq!(doc.get_bool("groups/default/permissions/world.build"), Some(false));
//! assert_eq!(doc.get_string_list("users/steve/groups"), vec!["member".to_string()]);
//! ```

mod section;

pub use section::{Section, Value, PATH_SEPARATOR};

use serde::{Deserialize, Serialize};
use std::ops::{Deref, DerefMut};

use crate::error::{DocumentError, Result};

/// 配置文档根节点
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Document {
    root: Section,
}

/// 把名称规范化为单个路径段：去除首尾空白、转为小写，`/` 转义为 `%2f`
pub(crate) fn canonical_segment(name: &str) -> String {
    name.trim().to_lowercase().replace(PATH_SEPARATOR, "%2f")
}

impl Document {
    /// 创建空文档
    pub fn new() -> Self {
        Self::default()
    }

    /// 由根节创建文档
    pub fn from_section(root: Section) -> Self {
        Self { root }
    }

    /// 取出根节
    pub fn into_section(self) -> Section {
        self.root
    }

    /// 从 JSON 文本解析
    pub fn from_json_str(text: &str) -> Result<Self> {
        if text.trim().is_empty() {
            return Ok(Self::new());
        }
        serde_json::from_str(text).map_err(|e| DocumentError::Parse(e.to_string()).into())
    }

    /// 从 JSON 值转换
    pub fn from_json_value(value: serde_json::Value) -> Result<Self> {
        serde_json::from_value(value).map_err(|e| DocumentError::Parse(e.to_string()).into())
    }

    /// 转换为 JSON 值
    pub fn to_json_value(&self) -> Result<serde_json::Value> {
        serde_json::to_value(self).map_err(|e| DocumentError::Serialize(e.to_string()).into())
    }

    /// 从 YAML 文本解析
    #[cfg(feature = "yaml")]
    pub fn from_yaml_str(text: &str) -> Result<Self> {
        if text.trim().is_empty() {
            return Ok(Self::new());
        }
        serde_yaml_ng::from_str(text).map_err(|e| DocumentError::Parse(e.to_string()).into())
    }

    /// 序列化为 YAML 文本
    #[cfg(feature = "yaml")]
    pub fn to_yaml_string(&self) -> Result<String> {
        serde_yaml_ng::to_string(self).map_err(|e| DocumentError::Serialize(e.to_string()).into())
    }
}

impl Deref for Document {
    type Target = Section;

    fn deref(&self) -> &Section {
        &self.root
    }
}

impl DerefMut for Document {
    fn deref_mut(&mut self) -> &mut Section {
        &mut self.root
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_json() {
        let doc = Document::from_json_str(
            r#"{
                "groups": {
                    "default": {
                        "permissions": { "world.build": false, "chat.color": "red" }
                    }
                }
            }"#,
        )
        .unwrap();
        assert_eq!(doc.get_bool("groups/default/permissions/world.build"), Some(false));
        assert_eq!(
            doc.get_string("groups/default/permissions/chat.color"),
            Some("red")
        );
    }

    #[test]
    fn test_json_preserves_order() {
        let doc = Document::from_json_str(r#"{ "b": true, "a": false, "c": true }"#).unwrap();
        assert_eq!(doc.keys(false), vec!["b", "a", "c"]);
    }

    #[test]
    fn test_empty_text_is_empty_document() {
        assert!(Document::from_json_str("  ").unwrap().is_empty());
    }

    #[test]
    fn test_invalid_json() {
        assert!(Document::from_json_str("{ nope").is_err());
    }

    #[test]
    fn test_json_value_round_trip() {
        let mut doc = Document::new();
        doc.set("users/alex/name", "Alex").unwrap();
        let value = doc.to_json_value().unwrap();
        assert_eq!(value["users"]["alex"]["name"], "Alex");
    }

    #[cfg(feature = "yaml")]
    #[test]
    fn test_from_yaml() {
        let doc = Document::from_yaml_str(
            "groups:\n  member:\n    inheritance:\n    - default\n    permissions:\n      world.build: true\n",
        )
        .unwrap();
        assert_eq!(
            doc.get_string_list("groups/member/inheritance"),
            vec!["default".to_string()]
        );
        assert_eq!(doc.get_bool("groups/member/permissions/world.build"), Some(true));
        let text = doc.to_yaml_string().unwrap();
        assert!(text.contains("world.build: true"));
    }
}
