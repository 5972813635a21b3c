//! 权限节规范化模块
//!
//! 权限节应当是一个扁平的 `节点 -> 布尔值` 映射，但手工编辑的配置经常出现两种
//! 错误形状：
//!
//! - 节点名中的 `.` 被写成了嵌套（`world: { build: true }`），或者键本身包含 `/`；
//! - 删除条目后遗留的空节。
//!
//! 规范化器会反复修复直到某一轮不再有改动，然后读取顶层键：布尔值进入结果，
//! 其余条目被跳过并汇总成一条警告。整个过程永远不会返回错误。
//!
//! ```rust
//! use permsync::document::Section;
//! use permsync::diagnostics::InMemoryDiagnostics;
//! use permsync::normalizer::normalize_section;
//!
//! let mut section = Section::new();
//! section.set("world/build", true).unwrap();
//! section.insert("chat.color", "red");
//!
//! let sink = InMemoryDiagnostics::new();
//! let normalized = normalize_section(&mut section, "group admin", '.', &sink);
//!
//! // 扁平化 world/build，再删除留下的空节 world
//! assert_eq!(normalized.repairs, 2);
//! assert_eq!(normalized.permissions.get("world.build"), Some(true));
//! assert_eq!(normalized.rejected, 1);
//! assert_eq!(sink.count(), 2);
//! ```

use crate::diagnostics::{emit, Diagnostic, DiagnosticSink};
use crate::document::{Section, Value, PATH_SEPARATOR};
use crate::node::PermissionMap;

/// 规范化结果
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Normalized {
    /// 读取到的权限
    pub permissions: PermissionMap,
    /// 本次执行的修复次数
    pub repairs: usize,
    /// 被跳过的非布尔条目数
    pub rejected: usize,
}

/// 遍历快照中记录的条目形状
enum Shape {
    Bool(bool),
    EmptySection,
    Other,
}

fn shape_of(value: &Value) -> Shape {
    match value {
        Value::Bool(b) => Shape::Bool(*b),
        Value::Section(s) if s.is_empty() => Shape::EmptySection,
        _ => Shape::Other,
    }
}

/// 修复错误的嵌套和空节，返回修复次数
pub fn repair_nesting(section: &mut Section, delimiter: char) -> usize {
    let mut repairs = 0;

    loop {
        let mut fixed_now = false;
        let snapshot: Vec<(Vec<String>, Shape)> = section
            .walk()
            .into_iter()
            .map(|(segments, value)| (segments, shape_of(value)))
            .collect();

        for (segments, shape) in snapshot {
            match shape {
                Shape::Bool(value) => {
                    let flat = segments
                        .join(&PATH_SEPARATOR.to_string())
                        .replace(PATH_SEPARATOR, &delimiter.to_string());
                    if segments.len() == 1 && flat == segments[0] {
                        continue;
                    }
                    // 同一轮前面的修复可能已经移走了该条目
                    if section.get_by_segments(&segments).and_then(Value::as_bool) != Some(value) {
                        continue;
                    }
                    section.remove_by_segments(&segments);
                    section.insert(flat, value);
                    repairs += 1;
                    fixed_now = true;
                }
                Shape::EmptySection => {
                    let still_empty = section
                        .get_by_segments(&segments)
                        .and_then(Value::as_section)
                        .is_some_and(Section::is_empty);
                    if still_empty {
                        section.remove_by_segments(&segments);
                        repairs += 1;
                        fixed_now = true;
                    }
                }
                Shape::Other => {}
            }
        }

        if !fixed_now {
            return repairs;
        }
    }
}

/// 规范化并读取一个权限节
///
/// `description` 用于诊断信息，例如 `group admin world nether`。
pub fn normalize_section(
    section: &mut Section,
    description: &str,
    delimiter: char,
    sink: &dyn DiagnosticSink,
) -> Normalized {
    let repairs = repair_nesting(section, delimiter);
    if repairs > 0 {
        emit(sink, Diagnostic::nesting_repaired(description));
    }

    let mut permissions = PermissionMap::new();
    let mut rejected = 0;
    let mut first_failure: Option<&str> = None;

    for (key, value) in section.iter() {
        match value.as_bool() {
            Some(granted) => permissions.insert(key, granted),
            None => {
                rejected += 1;
                first_failure.get_or_insert(key);
            }
        }
    }

    if let Some(first) = first_failure {
        emit(sink, Diagnostic::non_boolean(description, first, rejected - 1));
    }

    Normalized {
        permissions,
        repairs,
        rejected,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::{DiagnosticKind, InMemoryDiagnostics};

    #[test]
    fn test_clean_section_untouched() {
        let mut section = Section::new();
        section.insert("world.build", true);
        section.insert("chat", false);
        let sink = InMemoryDiagnostics::new();

        let result = normalize_section(&mut section, "group a", '.', &sink);

        assert_eq!(result.repairs, 0);
        assert_eq!(result.permissions.nodes(), vec!["world.build", "chat"]);
        assert_eq!(sink.count(), 0);
    }

    #[test]
    fn test_flattens_deep_nesting() {
        let mut section = Section::new();
        section.set("a/b/c", true).unwrap();
        section.set("a/d", false).unwrap();
        let sink = InMemoryDiagnostics::new();

        let result = normalize_section(&mut section, "group a", '.', &sink);

        assert_eq!(result.permissions.get("a.b.c"), Some(true));
        assert_eq!(result.permissions.get("a.d"), Some(false));
        assert!(!section.contains("a"));
        assert_eq!(result.rejected, 0);
        // 只输出一条修复信息
        assert_eq!(sink.get_by_kind(DiagnosticKind::NestingRepaired).len(), 1);
    }

    #[test]
    fn test_flat_key_with_separator() {
        let mut section = Section::new();
        section.insert("world/build", true);
        let repairs = repair_nesting(&mut section, '.');
        assert_eq!(repairs, 1);
        assert_eq!(section.get_entry("world.build"), Some(&Value::Bool(true)));
        assert!(section.get_entry("world/build").is_none());
    }

    #[test]
    fn test_prunes_empty_branches() {
        let mut section = Section::new();
        section.create_section("x/y/z").unwrap();
        section.insert("keep", true);

        let repairs = repair_nesting(&mut section, '.');

        assert_eq!(repairs, 3);
        assert_eq!(section.keys(true), vec!["keep"]);
    }

    #[test]
    fn test_non_boolean_summary() {
        let mut section = Section::new();
        section.insert("ok", true);
        section.insert("bad.one", "yes");
        section.insert("bad.two", 1i64);
        section.insert("bad.three", Value::List(vec![]));
        let sink = InMemoryDiagnostics::new();

        let result = normalize_section(&mut section, "user steve", '.', &sink);

        assert_eq!(result.permissions.len(), 1);
        assert_eq!(result.rejected, 3);
        let warnings = sink.get_by_kind(DiagnosticKind::NonBooleanNode);
        assert_eq!(warnings.len(), 1);
        assert_eq!(
            warnings[0].message,
            "In user steve: bad.one is non-boolean (+2 more)."
        );
    }

    #[test]
    fn test_idempotent() {
        let mut section = Section::new();
        section.set("fly/fast", true).unwrap();
        section.insert("build", false);
        section.create_section("empty").unwrap();
        let sink = InMemoryDiagnostics::new();

        let first = normalize_section(&mut section, "group a", '.', &sink);
        let second = normalize_section(&mut section, "group a", '.', &sink);

        assert!(first.repairs > 0);
        assert_eq!(second.repairs, 0);
        assert_eq!(first.permissions, second.permissions);
        assert_eq!(first.permissions.nodes(), second.permissions.nodes());
    }

    #[test]
    fn test_separator_delimiter_does_not_loop() {
        let mut section = Section::new();
        section.insert("a/b", true);
        assert_eq!(repair_nesting(&mut section, '/'), 0);
    }
}
