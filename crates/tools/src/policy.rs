//! Sandbox tool policy.
//!
//! Allow and deny lists are resolved per tier with this precedence:
//! agent-specific config, then global config, then compiled-in defaults.
//! Each list is resolved on its own, so an agent may override `deny` while
//! inheriting `allow` from the global tier.

use std::fmt;

use {
    parley_common::glob::glob_match,
    parley_config::{ParleyConfig, ToolPolicyConfig, normalize_agent_id},
    serde::Serialize,
    tracing::debug,
};

use crate::groups::{ToolGroups, normalize_tool_name};

#[cfg(feature = "metrics")]
use parley_metrics::{counter, labels, policy as policy_metrics};

/// Tools a sandboxed session may use when nothing is configured.
pub const DEFAULT_SANDBOX_ALLOW: &[&str] = &[
    "exec",
    "process",
    "read",
    "write",
    "edit",
    "apply_patch",
    "image",
    "sessions_list",
    "sessions_history",
    "sessions_send",
    "sessions_spawn",
    "session_status",
];

/// Tools a sandboxed session may never use when nothing is configured.
pub const DEFAULT_SANDBOX_DENY: &[&str] = &["browser", "canvas", "nodes", "cron", "gateway"];

/// Tool always granted to sandboxed sessions unless a list mentions it.
const IMAGE_TOOL: &str = "image";

/// An allow/deny pair.
///
/// Deny always wins. An empty allow list permits everything not denied.
/// Entries containing `*` are glob patterns; `group:*` names are expanded.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ToolPolicy {
    pub allow: Vec<String>,
    pub deny: Vec<String>,
}

impl ToolPolicy {
    pub fn new(allow: Vec<String>, deny: Vec<String>) -> Self {
        Self { allow, deny }
    }

    pub fn is_allowed(&self, name: &str, groups: &dyn ToolGroups) -> bool {
        is_tool_allowed(self, name, groups)
    }
}

/// Decide whether `name` passes `policy`.
pub fn is_tool_allowed(policy: &ToolPolicy, name: &str, groups: &dyn ToolGroups) -> bool {
    let name = normalize_tool_name(name);
    let deny = groups.expand_tool_groups(&policy.deny);
    if matches_any(&deny, &name) {
        return false;
    }
    let allow = groups.expand_tool_groups(&policy.allow);
    allow.is_empty() || matches_any(&allow, &name)
}

fn matches_any(patterns: &[String], name: &str) -> bool {
    patterns.iter().any(|pattern| {
        if pattern.contains('*') {
            glob_match(pattern, name)
        } else {
            pattern == name
        }
    })
}

/// Which tier a resolved list came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PolicyOrigin {
    Agent,
    Global,
    Default,
}

impl PolicyOrigin {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Agent => "agent",
            Self::Global => "global",
            Self::Default => "default",
        }
    }
}

impl fmt::Display for PolicyOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Provenance of one resolved list, for diagnostics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PolicySource {
    pub source: PolicyOrigin,
    /// Config path the list was read from, or `"default"`.
    pub config_key: String,
}

impl PolicySource {
    fn default_tier() -> Self {
        Self {
            source: PolicyOrigin::Default,
            config_key: "default".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PolicySources {
    pub allow: PolicySource,
    pub deny: PolicySource,
}

/// Effective policy for one sandboxed agent. Lists are normalized and
/// group-expanded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SandboxToolPolicy {
    pub allow: Vec<String>,
    pub deny: Vec<String>,
    pub sources: PolicySources,
}

impl SandboxToolPolicy {
    pub fn as_policy(&self) -> ToolPolicy {
        ToolPolicy::new(self.allow.clone(), self.deny.clone())
    }

    pub fn is_allowed(&self, name: &str) -> bool {
        let name = normalize_tool_name(name);
        if matches_any(&self.deny, &name) {
            return false;
        }
        self.allow.is_empty() || matches_any(&self.allow, &name)
    }
}

#[derive(Clone, Copy)]
enum ListKind {
    Allow,
    Deny,
}

impl ListKind {
    fn as_str(self) -> &'static str {
        match self {
            Self::Allow => "allow",
            Self::Deny => "deny",
        }
    }

    fn pick(self, cfg: &ToolPolicyConfig) -> Option<&Vec<String>> {
        match self {
            Self::Allow => cfg.allow.as_ref(),
            Self::Deny => cfg.deny.as_ref(),
        }
    }

    fn defaults(self) -> &'static [&'static str] {
        match self {
            Self::Allow => DEFAULT_SANDBOX_ALLOW,
            Self::Deny => DEFAULT_SANDBOX_DENY,
        }
    }
}

/// Resolve the sandbox tool policy for `agent_id` (or the global tier only
/// when `None`).
///
/// After resolution, `image` is appended to the allow list unless either
/// list already names it. An allow-all list (empty) stays allow-all.
pub fn resolve_sandbox_tool_policy_for_agent(
    cfg: &ParleyConfig,
    agent_id: Option<&str>,
    groups: &dyn ToolGroups,
) -> SandboxToolPolicy {
    let agent_id = agent_id
        .map(normalize_agent_id)
        .filter(|id| !id.is_empty());
    let agent_tools = agent_id
        .as_deref()
        .and_then(|id| cfg.agents.find(id))
        .map(|agent| &agent.tools.sandbox.tools);

    let (allow, allow_source) = resolve_list(
        ListKind::Allow,
        agent_id.as_deref(),
        agent_tools,
        &cfg.tools.sandbox.tools,
    );
    let (deny, deny_source) = resolve_list(
        ListKind::Deny,
        agent_id.as_deref(),
        agent_tools,
        &cfg.tools.sandbox.tools,
    );

    let mut allow = groups.expand_tool_groups(&allow);
    let deny = groups.expand_tool_groups(&deny);

    let mentions_image = allow.iter().chain(deny.iter()).any(|t| t == IMAGE_TOOL);
    if !mentions_image {
        if allow.is_empty() {
            allow.push("*".to_string());
        }
        allow.push(IMAGE_TOOL.to_string());
    }

    debug!(
        agent_id = agent_id.as_deref().unwrap_or("-"),
        allow_source = %allow_source.source,
        deny_source = %deny_source.source,
        allow = allow.len(),
        deny = deny.len(),
        "resolved sandbox tool policy"
    );

    #[cfg(feature = "metrics")]
    counter!(
        policy_metrics::RESOLUTIONS_TOTAL,
        labels::ALLOW_ORIGIN => allow_source.source.as_str(),
        labels::DENY_ORIGIN => deny_source.source.as_str()
    )
    .increment(1);

    SandboxToolPolicy {
        allow,
        deny,
        sources: PolicySources {
            allow: allow_source,
            deny: deny_source,
        },
    }
}

fn resolve_list(
    kind: ListKind,
    agent_id: Option<&str>,
    agent_tools: Option<&ToolPolicyConfig>,
    global_tools: &ToolPolicyConfig,
) -> (Vec<String>, PolicySource) {
    if let (Some(id), Some(list)) = (agent_id, agent_tools.and_then(|t| kind.pick(t))) {
        let source = PolicySource {
            source: PolicyOrigin::Agent,
            config_key: format!("agents.list[{id}].tools.sandbox.tools.{}", kind.as_str()),
        };
        return (list.clone(), source);
    }
    if let Some(list) = kind.pick(global_tools) {
        let source = PolicySource {
            source: PolicyOrigin::Global,
            config_key: format!("tools.sandbox.tools.{}", kind.as_str()),
        };
        return (list.clone(), source);
    }
    let defaults = kind.defaults().iter().map(|t| (*t).to_string()).collect();
    (defaults, PolicySource::default_tier())
}
