/// Config schema types (session, tools, agents, channels).
///
/// Keys are camelCase on disk; snake_case aliases are accepted for the keys
/// people tend to type by hand in TOML.
use std::collections::HashMap;

use {
    serde::{Deserialize, Deserializer, Serialize},
    tracing::warn,
};

/// Root configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ParleyConfig {
    pub session: SessionConfig,
    pub tools: ToolsConfig,
    pub agents: AgentsConfig,
    pub channels: ChannelsConfig,
}

// ── Session ─────────────────────────────────────────────────────────────────

/// How direct conversations map onto sessions.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SessionScope {
    /// Every sender shares one global session.
    Global,
    /// Each sender gets their own session; the main key is the owner's.
    #[default]
    PerSender,
}

impl SessionScope {
    /// Parse a scope value. Accepts `global`, `per-sender` and `per_sender`.
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "global" => Some(Self::Global),
            "per-sender" | "per_sender" => Some(Self::PerSender),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Global => "global",
            Self::PerSender => "per-sender",
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SessionConfig {
    /// Key of the owner's main session. Blank means the built-in default.
    #[serde(alias = "main_key")]
    pub main_key: Option<String>,
    /// Session scope; unknown values fall back to `per-sender`.
    #[serde(deserialize_with = "lenient_scope", skip_serializing_if = "Option::is_none")]
    pub scope: Option<SessionScope>,
}

// ── Tools ───────────────────────────────────────────────────────────────────

/// Tools configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolsConfig {
    pub sandbox: SandboxToolsConfig,
}

/// `tools.sandbox` / `agents.list[].tools.sandbox`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SandboxToolsConfig {
    pub tools: ToolPolicyConfig,
}

/// Raw allow/deny lists as written in config.
///
/// `None` means "not configured" and lets the next precedence tier decide.
/// A value that is not a list of strings is treated as `None`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolPolicyConfig {
    #[serde(
        deserialize_with = "lenient_string_list",
        skip_serializing_if = "Option::is_none"
    )]
    pub allow: Option<Vec<String>>,
    #[serde(
        deserialize_with = "lenient_string_list",
        skip_serializing_if = "Option::is_none"
    )]
    pub deny: Option<Vec<String>>,
}

// ── Agents ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct AgentsConfig {
    /// Agent handling messages that don't name one.
    #[serde(alias = "default_id")]
    pub default_id: Option<String>,
    pub list: Vec<AgentConfig>,
}

impl AgentsConfig {
    /// Find an agent entry. Ids compare trimmed and case-insensitively.
    pub fn find(&self, agent_id: &str) -> Option<&AgentConfig> {
        let wanted = normalize_agent_id(agent_id);
        self.list
            .iter()
            .find(|agent| normalize_agent_id(&agent.id) == wanted)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    pub id: String,
    pub tools: AgentToolsConfig,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentToolsConfig {
    pub sandbox: SandboxToolsConfig,
}

/// Canonical form of an agent id.
pub fn normalize_agent_id(agent_id: &str) -> String {
    agent_id.trim().to_ascii_lowercase()
}

// ── Channels ────────────────────────────────────────────────────────────────

/// Channel settings, keyed by channel id (`telegram`, `discord`, ...).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ChannelsConfig {
    /// Channel used by outbound actions that don't name one.
    pub default: Option<String>,
    #[serde(flatten)]
    pub channels: HashMap<String, ChannelConfig>,
}

impl ChannelsConfig {
    pub fn get(&self, channel: &str) -> Option<&ChannelConfig> {
        self.channels.get(channel)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ChannelConfig {
    /// Account used when an outbound action doesn't name one.
    #[serde(alias = "default_account")]
    pub default_account: Option<String>,
    /// Sender ids allowed to reach the agent; empty means everyone. Entries
    /// may use `*` wildcards.
    #[serde(alias = "allow_from")]
    pub allow_from: Vec<String>,
    /// Per-group settings; the `"*"` entry applies to every group.
    pub groups: HashMap<String, GroupConfig>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct GroupConfig {
    #[serde(alias = "require_mention")]
    pub require_mention: Option<bool>,
}

// ── Lenient field parsers ───────────────────────────────────────────────────

fn lenient_string_list<'de, D>(deserializer: D) -> Result<Option<Vec<String>>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(value.and_then(string_list_from_value))
}

fn string_list_from_value(value: serde_json::Value) -> Option<Vec<String>> {
    match value {
        serde_json::Value::Null => None,
        serde_json::Value::Array(items) => {
            let mut out = Vec::with_capacity(items.len());
            for item in items {
                match item {
                    serde_json::Value::String(s) => out.push(s),
                    other => {
                        warn!(entry = %other, "ignoring tool list with a non-string entry");
                        return None;
                    },
                }
            }
            Some(out)
        },
        other => {
            warn!(value = %other, "ignoring tool list that is not an array");
            None
        },
    }
}

fn lenient_scope<'de, D>(deserializer: D) -> Result<Option<SessionScope>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        None | Some(serde_json::Value::Null) => None,
        Some(serde_json::Value::String(raw)) => {
            let parsed = SessionScope::parse(&raw);
            if parsed.is_none() {
                warn!(scope = %raw, "unknown session.scope, using per-sender");
            }
            parsed
        },
        Some(other) => {
            warn!(scope = %other, "session.scope must be a string, using per-sender");
            None
        },
    })
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {super::*, serde_json::json};

    fn parse(value: serde_json::Value) -> ParleyConfig {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn empty_config_is_all_defaults() {
        let cfg = parse(json!({}));
        assert!(cfg.session.main_key.is_none());
        assert!(cfg.session.scope.is_none());
        assert_eq!(cfg.tools.sandbox.tools, ToolPolicyConfig::default());
        assert!(cfg.agents.list.is_empty());
    }

    #[test]
    fn camel_case_and_snake_case_keys() {
        let cfg = parse(json!({
            "session": { "mainKey": "owner", "scope": "global" },
            "agents": { "default_id": "ops" }
        }));
        assert_eq!(cfg.session.main_key.as_deref(), Some("owner"));
        assert_eq!(cfg.session.scope, Some(SessionScope::Global));
        assert_eq!(cfg.agents.default_id.as_deref(), Some("ops"));

        let cfg = parse(json!({ "session": { "main_key": "boss", "scope": "per_sender" } }));
        assert_eq!(cfg.session.main_key.as_deref(), Some("boss"));
        assert_eq!(cfg.session.scope, Some(SessionScope::PerSender));
    }

    #[test]
    fn unknown_scope_is_ignored() {
        let cfg = parse(json!({ "session": { "scope": "everyone" } }));
        assert!(cfg.session.scope.is_none());
        let cfg = parse(json!({ "session": { "scope": 3 } }));
        assert!(cfg.session.scope.is_none());
    }

    #[test]
    fn malformed_tool_lists_are_treated_as_absent() {
        let cfg = parse(json!({
            "tools": { "sandbox": { "tools": { "allow": "exec", "deny": ["browser", 7] } } }
        }));
        assert!(cfg.tools.sandbox.tools.allow.is_none());
        assert!(cfg.tools.sandbox.tools.deny.is_none());
    }

    #[test]
    fn empty_list_is_configured() {
        let cfg = parse(json!({ "tools": { "sandbox": { "tools": { "allow": [] } } } }));
        assert_eq!(cfg.tools.sandbox.tools.allow, Some(vec![]));
        assert!(cfg.tools.sandbox.tools.deny.is_none());
    }

    #[test]
    fn agent_lookup_is_case_insensitive() {
        let cfg = parse(json!({
            "agents": { "list": [
                { "id": "Research", "tools": { "sandbox": { "tools": { "deny": ["image"] } } } }
            ] }
        }));
        let agent = cfg.agents.find(" research ").unwrap();
        assert_eq!(agent.tools.sandbox.tools.deny, Some(vec!["image".to_string()]));
        assert!(cfg.agents.find("other").is_none());
    }

    #[test]
    fn channels_flatten_with_default() {
        let cfg = parse(json!({
            "channels": {
                "default": "telegram",
                "telegram": {
                    "defaultAccount": "bot1",
                    "allow_from": ["alice", "admin_*"],
                    "groups": { "*": { "requireMention": true }, "-100": { "require_mention": false } }
                }
            }
        }));
        assert_eq!(cfg.channels.default.as_deref(), Some("telegram"));
        let tg = cfg.channels.get("telegram").unwrap();
        assert_eq!(tg.default_account.as_deref(), Some("bot1"));
        assert_eq!(tg.allow_from, vec!["alice", "admin_*"]);
        assert_eq!(tg.groups["*"].require_mention, Some(true));
        assert_eq!(tg.groups["-100"].require_mention, Some(false));
    }
}
