//! 配置节与配置值

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::error::{DocumentError, Result};

/// 路径分隔符
pub const PATH_SEPARATOR: char = '/';

/// 配置值
///
/// 标量、字符串列表或嵌套的配置节
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    /// 空值
    Null,
    /// 布尔值
    Bool(bool),
    /// 整数
    Integer(i64),
    /// 浮点数
    Float(f64),
    /// 字符串
    String(String),
    /// 列表
    List(Vec<Value>),
    /// 嵌套节
    Section(Section),
}

impl Value {
    /// 作为布尔值读取
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// 作为字符串读取
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    /// 作为节读取
    pub fn as_section(&self) -> Option<&Section> {
        match self {
            Value::Section(s) => Some(s),
            _ => None,
        }
    }

    /// 作为可变节读取
    pub fn as_section_mut(&mut self) -> Option<&mut Section> {
        match self {
            Value::Section(s) => Some(s),
            _ => None,
        }
    }

    /// 是否为节
    pub fn is_section(&self) -> bool {
        matches!(self, Value::Section(_))
    }

    /// 标量的字符串形式（列表和节返回 `None`）
    fn scalar_string(&self) -> Option<String> {
        match self {
            Value::Bool(b) => Some(b.to_string()),
            Value::Integer(i) => Some(i.to_string()),
            Value::Float(f) => Some(f.to_string()),
            Value::String(s) => Some(s.clone()),
            _ => None,
        }
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Integer(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::String(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::String(value)
    }
}

impl From<Vec<String>> for Value {
    fn from(value: Vec<String>) -> Self {
        Value::List(value.into_iter().map(Value::String).collect())
    }
}

impl From<Vec<&str>> for Value {
    fn from(value: Vec<&str>) -> Self {
        Value::List(value.into_iter().map(Value::from).collect())
    }
}

impl From<Section> for Value {
    fn from(value: Section) -> Self {
        Value::Section(value)
    }
}

/// 配置节
///
/// 保持插入顺序的键值映射，可以通过 `/` 分隔的路径访问嵌套节。
/// 键本身可以包含 `.`（权限节点名），但不应包含 `/`。
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Section {
    entries: IndexMap<String, Value>,
}

/// 将路径拆分为段，拒绝空路径和空段
fn split_path(path: &str) -> Result<Vec<&str>> {
    let segments: Vec<&str> = path.split(PATH_SEPARATOR).collect();
    if path.is_empty() || segments.iter().any(|s| s.is_empty()) {
        return Err(DocumentError::InvalidPath(path.to_string()).into());
    }
    Ok(segments)
}

/// 确保槽位是一个节（标量会被替换），并返回它
fn ensure_section(slot: &mut Value) -> &mut Section {
    if !slot.is_section() {
        *slot = Value::Section(Section::new());
    }
    match slot {
        Value::Section(section) => section,
        _ => unreachable!("slot was just replaced by a section"),
    }
}

impl Section {
    /// 创建空节
    pub fn new() -> Self {
        Self::default()
    }

    /// 直接子键数量
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// 是否没有直接子键
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// 按顺序遍历直接子项
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// 读取直接子项（不解析路径）
    pub fn get_entry(&self, key: &str) -> Option<&Value> {
        self.entries.get(key)
    }

    /// 写入直接子项（不解析路径），已存在的键保留原位置
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.entries.insert(key.into(), value.into())
    }

    /// 删除直接子项（不解析路径），保持其余条目顺序
    pub fn remove_entry(&mut self, key: &str) -> Option<Value> {
        self.entries.shift_remove(key)
    }

    /// 按段读取
    pub(crate) fn get_by_segments<S: AsRef<str>>(&self, segments: &[S]) -> Option<&Value> {
        let (last, parents) = segments.split_last()?;
        let mut current = self;
        for segment in parents {
            current = current.entries.get(segment.as_ref())?.as_section()?;
        }
        current.entries.get(last.as_ref())
    }

    /// 按段删除
    pub(crate) fn remove_by_segments<S: AsRef<str>>(&mut self, segments: &[S]) -> Option<Value> {
        let (last, parents) = segments.split_last()?;
        let mut current = self;
        for segment in parents {
            current = current.entries.get_mut(segment.as_ref())?.as_section_mut()?;
        }
        current.entries.shift_remove(last.as_ref())
    }

    /// 按路径读取值
    pub fn get(&self, path: &str) -> Option<&Value> {
        let segments = split_path(path).ok()?;
        self.get_by_segments(&segments)
    }

    /// 按路径读取可变值
    pub fn get_mut(&mut self, path: &str) -> Option<&mut Value> {
        let segments = split_path(path).ok()?;
        let (last, parents) = segments.split_last()?;
        let mut current = self;
        for segment in parents {
            current = current.entries.get_mut(*segment)?.as_section_mut()?;
        }
        current.entries.get_mut(*last)
    }

    /// 按路径读取子节
    pub fn section(&self, path: &str) -> Option<&Section> {
        self.get(path)?.as_section()
    }

    /// 按路径读取可变子节
    pub fn section_mut(&mut self, path: &str) -> Option<&mut Section> {
        self.get_mut(path)?.as_section_mut()
    }

    /// 按路径创建子节（中间节会一并创建，已存在的节原样返回）
    pub fn create_section(&mut self, path: &str) -> Result<&mut Section> {
        let segments = split_path(path)?;
        let mut current = self;
        for segment in segments {
            let slot = current
                .entries
                .entry(segment.to_string())
                .or_insert_with(|| Value::Section(Section::new()));
            current = ensure_section(slot);
        }
        Ok(current)
    }

    /// 按路径写入值，必要时创建中间节
    pub fn set(&mut self, path: &str, value: impl Into<Value>) -> Result<()> {
        let mut segments = split_path(path)?;
        let last = segments.pop().unwrap_or_default();
        let parent = if segments.is_empty() {
            self
        } else {
            self.create_section(&segments.join("/"))?
        };
        parent.entries.insert(last.to_string(), value.into());
        Ok(())
    }

    /// 按路径删除值
    pub fn remove(&mut self, path: &str) -> Option<Value> {
        let segments = split_path(path).ok()?;
        self.remove_by_segments(&segments)
    }

    /// 路径是否存在
    pub fn contains(&self, path: &str) -> bool {
        self.get(path).is_some()
    }

    /// 路径上的值是否为布尔值
    pub fn is_bool(&self, path: &str) -> bool {
        self.get_bool(path).is_some()
    }

    /// 路径上的值是否为节
    pub fn is_section(&self, path: &str) -> bool {
        self.section(path).is_some()
    }

    /// 读取布尔值
    pub fn get_bool(&self, path: &str) -> Option<bool> {
        self.get(path)?.as_bool()
    }

    /// 读取字符串
    pub fn get_string(&self, path: &str) -> Option<&str> {
        self.get(path)?.as_str()
    }

    /// 读取字符串列表
    ///
    /// 不存在或不是列表时返回空列表；列表中的标量会被转换为字符串，
    /// 嵌套列表和节会被忽略
    pub fn get_string_list(&self, path: &str) -> Vec<String> {
        match self.get(path) {
            Some(Value::List(items)) => items.iter().filter_map(Value::scalar_string).collect(),
            _ => Vec::new(),
        }
    }

    /// 列出键
    ///
    /// `recursive` 为 `false` 时只返回直接子键；为 `true` 时按深度优先顺序返回
    /// 所有后代的相对路径（包括中间节）
    pub fn keys(&self, recursive: bool) -> Vec<String> {
        if !recursive {
            return self.entries.keys().cloned().collect();
        }
        self.walk()
            .into_iter()
            .map(|(segments, _)| segments.join("/"))
            .collect()
    }

    /// 所有后代数量
    pub fn descendant_count(&self) -> usize {
        self.entries
            .values()
            .map(|v| 1 + v.as_section().map_or(0, Section::descendant_count))
            .sum()
    }

    /// 深度优先遍历所有后代，返回段列表和值
    pub(crate) fn walk(&self) -> Vec<(Vec<String>, &Value)> {
        let mut out = Vec::new();
        let mut prefix = Vec::new();
        self.walk_into(&mut prefix, &mut out);
        out
    }

    fn walk_into<'a>(&'a self, prefix: &mut Vec<String>, out: &mut Vec<(Vec<String>, &'a Value)>) {
        for (key, value) in &self.entries {
            prefix.push(key.clone());
            out.push((prefix.clone(), value));
            if let Value::Section(child) = value {
                child.walk_into(prefix, out);
            }
            prefix.pop();
        }
    }

    /// 对直接子键重新命名。若新名称已存在，则保留先出现的条目，
    /// 返回被丢弃的 `(原始键, 新名称)`
    pub(crate) fn rekey(&mut self, rename: impl Fn(&str) -> String) -> Vec<(String, String)> {
        let mut dropped = Vec::new();
        let mut entries = IndexMap::with_capacity(self.entries.len());
        for (key, value) in std::mem::take(&mut self.entries) {
            let renamed = rename(&key);
            if entries.contains_key(&renamed) {
                dropped.push((key, renamed));
                continue;
            }
            entries.insert(renamed, value);
        }
        self.entries = entries;
        dropped
    }
}
