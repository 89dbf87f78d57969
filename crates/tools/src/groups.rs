//! Tool groups: named aliases that expand to concrete tool names.

use std::collections::{HashMap, HashSet};

use tracing::debug;

/// Prefix reserved for group names.
pub const GROUP_PREFIX: &str = "group:";

/// Built-in groups. Members are already normalized.
const BUILTIN_GROUPS: &[(&str, &[&str])] = &[
    ("group:fs", &["read", "write", "edit", "apply_patch"]),
    ("group:runtime", &["exec", "process"]),
    ("group:sessions", &[
        "sessions_list",
        "sessions_history",
        "sessions_send",
        "sessions_spawn",
        "session_status",
    ]),
    ("group:memory", &["memory_search", "memory_get"]),
    ("group:web", &["web_search", "web_fetch"]),
    ("group:ui", &["browser", "canvas"]),
    ("group:automation", &["cron", "gateway"]),
    ("group:messaging", &["message"]),
    ("group:nodes", &["nodes"]),
];

/// Canonical form of a tool name: trimmed, lower-cased, legacy aliases mapped.
pub fn normalize_tool_name(name: &str) -> String {
    let name = name.trim().to_ascii_lowercase();
    match name.as_str() {
        "bash" => "exec".to_string(),
        "apply-patch" => "apply_patch".to_string(),
        _ => name,
    }
}

/// Expands group names into member tool names.
pub trait ToolGroups: Send + Sync {
    /// Members of `group` (normalized name), or `None` if it isn't a group.
    fn members(&self, group: &str) -> Option<&[String]>;

    /// Normalize and expand `names`. Non-group names map to themselves,
    /// unknown `group:*` names expand to nothing. Duplicates are dropped,
    /// first occurrence wins.
    fn expand_tool_groups(&self, names: &[String]) -> Vec<String> {
        let mut seen = HashSet::new();
        let mut out = Vec::with_capacity(names.len());
        for raw in names {
            let name = normalize_tool_name(raw);
            if name.is_empty() {
                continue;
            }
            if let Some(members) = self.members(&name) {
                for member in members {
                    if seen.insert(member.clone()) {
                        out.push(member.clone());
                    }
                }
            } else if name.starts_with(GROUP_PREFIX) {
                debug!(group = %name, "unknown tool group, expanding to nothing");
            } else if seen.insert(name.clone()) {
                out.push(name);
            }
        }
        out
    }
}

/// Registry of tool groups: the built-ins plus any registered extras.
#[derive(Debug, Clone)]
pub struct ToolGroupRegistry {
    groups: HashMap<String, Vec<String>>,
}

impl Default for ToolGroupRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}

impl ToolGroupRegistry {
    /// Registry with no groups at all.
    pub fn empty() -> Self {
        Self {
            groups: HashMap::new(),
        }
    }

    /// Registry holding the built-in groups.
    pub fn builtin() -> Self {
        let groups = BUILTIN_GROUPS
            .iter()
            .map(|(name, members)| {
                (
                    (*name).to_string(),
                    members.iter().map(|m| (*m).to_string()).collect(),
                )
            })
            .collect();
        Self { groups }
    }

    /// Add or replace a group. The name gets the `group:` prefix if missing;
    /// members are normalized.
    pub fn with_group(mut self, name: &str, members: &[&str]) -> Self {
        let mut name = normalize_tool_name(name);
        if !name.starts_with(GROUP_PREFIX) {
            name = format!("{GROUP_PREFIX}{name}");
        }
        let members = members.iter().map(|m| normalize_tool_name(m)).collect();
        self.groups.insert(name, members);
        self
    }

    pub fn group_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.groups.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

impl ToolGroups for ToolGroupRegistry {
    fn members(&self, group: &str) -> Option<&[String]> {
        self.groups.get(group).map(Vec::as_slice)
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {super::*, rstest::rstest};

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| (*s).to_string()).collect()
    }

    #[rstest]
    #[case(" Exec ", "exec")]
    #[case("BASH", "exec")]
    #[case("apply-patch", "apply_patch")]
    #[case("Web_Fetch", "web_fetch")]
    fn normalizes_names(#[case] raw: &str, #[case] expected: &str) {
        assert_eq!(normalize_tool_name(raw), expected);
    }

    #[test]
    fn expands_groups_and_keeps_plain_names() {
        let registry = ToolGroupRegistry::builtin();
        let expanded = registry.expand_tool_groups(&names(&["group:runtime", "Image", "exec"]));
        assert_eq!(expanded, names(&["exec", "process", "image"]));
    }

    #[test]
    fn group_names_are_case_insensitive() {
        let registry = ToolGroupRegistry::builtin();
        assert_eq!(
            registry.expand_tool_groups(&names(&["GROUP:UI"])),
            names(&["browser", "canvas"])
        );
    }

    #[test]
    fn unknown_group_expands_to_nothing() {
        let registry = ToolGroupRegistry::builtin();
        assert!(registry.expand_tool_groups(&names(&["group:nope", " "])).is_empty());
    }

    #[test]
    fn custom_groups() {
        let registry = ToolGroupRegistry::empty().with_group("research", &["Web_Search", "bash"]);
        assert_eq!(registry.group_names(), vec!["group:research"]);
        assert_eq!(
            registry.expand_tool_groups(&names(&["group:research", "group:fs"])),
            names(&["web_search", "exec"])
        );
    }
}
