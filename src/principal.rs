//! 主体（玩家）标识

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::document::canonical_segment;

/// 主体 ID
///
/// 不透明的稳定标识（通常是 UUID 字符串）。进入系统时去除首尾空白并转为小写，
/// `/` 转义为 `%2f`，之后使用普通的相等比较。
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct PrincipalId(String);

impl PrincipalId {
    /// 创建并规范化
    pub fn new(id: impl AsRef<str>) -> Self {
        Self(canonical_segment(id.as_ref()))
    }

    /// 规范化后的字符串
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// 文档中的记录路径
    pub(crate) fn section_path(&self) -> String {
        format!("users/{}", self.0)
    }
}

impl From<String> for PrincipalId {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

impl From<&str> for PrincipalId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<PrincipalId> for String {
    fn from(value: PrincipalId) -> Self {
        value.0
    }
}

impl fmt::Display for PrincipalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// 主体：稳定 ID 加上当前显示名
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    /// 主体 ID
    pub id: PrincipalId,
    /// 显示名
    pub name: String,
}

impl Principal {
    /// 创建主体
    pub fn new(id: impl Into<PrincipalId>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_principal_id_canonical() {
        let a = PrincipalId::new(" 1F2E-AB ");
        let b = PrincipalId::from("1f2e-ab");
        assert_eq!(a, b);
        assert_eq!(a.as_str(), "1f2e-ab");
        assert_eq!(a.section_path(), "users/1f2e-ab");
        assert_eq!(PrincipalId::new("x/y").section_path(), "users/x%2fy");
    }

    #[test]
    fn test_principal_serde() {
        let p = Principal::new("ABC", "Steve");
        let json = serde_json::to_string(&p).unwrap();
        assert_eq!(json, r#"{"id":"abc","name":"Steve"}"#);
        let back: Principal = serde_json::from_str(r#"{"id":"XyZ","name":"Alex"}"#).unwrap();
        assert_eq!(back.id.as_str(), "xyz");
    }
}
