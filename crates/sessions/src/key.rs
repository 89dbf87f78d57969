use std::fmt;

use serde::{Deserialize, Serialize};

/// Prefix of agent-scoped session keys: `agent:<agentId>:<rest>`.
const AGENT_PREFIX: &str = "agent:";

/// Opaque identifier of one logical conversation.
///
/// Keys are assigned once and never rewritten; everything else in this crate
/// only inspects them.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionKey(String);

impl SessionKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// Build an agent-scoped key, e.g. `agent:ops:main`.
    pub fn for_agent(agent_id: &str, rest: &str) -> Self {
        Self(format!(
            "{AGENT_PREFIX}{}:{rest}",
            agent_id.trim().to_ascii_lowercase()
        ))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }

    /// Split an `agent:<agentId>:<rest>` key into `(agentId, rest)`.
    ///
    /// Returns `None` for keys without the prefix or with an empty id/rest.
    pub fn parse_agent(&self) -> Option<(&str, &str)> {
        let tail = self.0.strip_prefix(AGENT_PREFIX)?;
        let (agent_id, rest) = tail.split_once(':')?;
        if agent_id.trim().is_empty() || rest.is_empty() {
            return None;
        }
        Some((agent_id, rest))
    }

    /// Agent id encoded in the key, if any.
    pub fn agent_id(&self) -> Option<&str> {
        self.parse_agent().map(|(id, _)| id)
    }
}

impl fmt::Display for SessionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for SessionKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl From<String> for SessionKey {
    fn from(key: String) -> Self {
        Self(key)
    }
}

impl From<&str> for SessionKey {
    fn from(key: &str) -> Self {
        Self(key.to_string())
    }
}
