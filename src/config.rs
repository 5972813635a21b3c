//! 引擎配置模块

use serde::{Deserialize, Serialize};

/// 权限引擎配置
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// 没有记录的主体隐式所属的组
    pub default_group: String,

    /// 权限节点内部的分隔符（例如 `world.build`）
    pub node_delimiter: char,

    /// `world:node` 形式输入中世界名与节点之间的分隔符
    pub world_delimiter: char,

    /// 规范化器修复文档后是否请求保存
    pub persist_repairs: bool,

    /// 管理性修改后是否请求保存
    pub persist_on_change: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            default_group: "default".to_string(),
            node_delimiter: '.',
            world_delimiter: ':',
            persist_repairs: true,
            persist_on_change: true,
        }
    }
}

impl EngineConfig {
    /// 创建新的配置
    pub fn new() -> Self {
        Self::default()
    }

    /// 设置默认组
    pub fn with_default_group(mut self, group: impl Into<String>) -> Self {
        self.default_group = group.into();
        self
    }

    /// 设置节点分隔符
    pub fn with_node_delimiter(mut self, delimiter: char) -> Self {
        self.node_delimiter = delimiter;
        self
    }

    /// 设置世界分隔符
    pub fn with_world_delimiter(mut self, delimiter: char) -> Self {
        self.world_delimiter = delimiter;
        self
    }

    /// 设置是否保存规范化修复
    pub fn with_persist_repairs(mut self, enabled: bool) -> Self {
        self.persist_repairs = enabled;
        self
    }

    /// 设置是否在修改后保存
    pub fn with_persist_on_change(mut self, enabled: bool) -> Self {
        self.persist_on_change = enabled;
        self
    }

    /// 只读配置：从不请求保存
    pub fn read_only() -> Self {
        Self {
            persist_repairs: false,
            persist_on_change: false,
            ..Default::default()
        }
    }
}
