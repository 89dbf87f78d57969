//! Session classification.
//!
//! Rules are evaluated top to bottom and the first match wins:
//! 1. key equals the alias or main key → `main`
//! 2. `cron:` prefix → `cron`
//! 3. `hook:` prefix → `hook`
//! 4. `node-` / `node:` prefix → `node`
//! 5. gateway reports a group chat → `group`
//! 6. key contains `:group:` / `:channel:` → `group`
//! 7. anything else → `other`

use std::fmt;

use {
    serde::{Deserialize, Serialize},
    tracing::debug,
};

use crate::alias::SessionDescriptor;

#[cfg(feature = "metrics")]
use parley_metrics::{counter, labels, session as session_metrics};

/// Channel reported for automation sessions.
pub const INTERNAL_CHANNEL: &str = "internal";

/// Channel reported when nothing identifies the origin.
pub const UNKNOWN_CHANNEL: &str = "unknown";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionKind {
    Main,
    Cron,
    Hook,
    Node,
    Group,
    Other,
}

impl SessionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Main => "main",
            Self::Cron => "cron",
            Self::Hook => "hook",
            Self::Node => "node",
            Self::Group => "group",
            Self::Other => "other",
        }
    }

    /// Automation sessions are never addressable from a chat channel.
    pub fn is_internal(&self) -> bool {
        matches!(self, Self::Cron | Self::Hook | Self::Node)
    }
}

impl fmt::Display for SessionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classify a session key. Total: every input maps to exactly one kind.
pub fn classify_session_kind(
    key: &str,
    alias: &str,
    main_key: &str,
    gateway_kind: Option<&str>,
) -> SessionKind {
    if key == alias || key == main_key {
        return SessionKind::Main;
    }
    if key.starts_with("cron:") {
        return SessionKind::Cron;
    }
    if key.starts_with("hook:") {
        return SessionKind::Hook;
    }
    if key.starts_with("node-") || key.starts_with("node:") {
        return SessionKind::Node;
    }
    if gateway_kind == Some("group") {
        return SessionKind::Group;
    }
    if key.contains(":group:") || key.contains(":channel:") {
        return SessionKind::Group;
    }
    SessionKind::Other
}

/// Work out which channel a session came from.
///
/// Internal kinds always report [`INTERNAL_CHANNEL`]. Otherwise the explicit
/// channel, then the last known channel, then the account token of an
/// `account:group:id` / `account:channel:id` key, then [`UNKNOWN_CHANNEL`].
pub fn derive_channel(
    kind: SessionKind,
    channel: Option<&str>,
    last_channel: Option<&str>,
    key: &str,
) -> String {
    if kind.is_internal() {
        return INTERNAL_CHANNEL.to_string();
    }
    if let Some(channel) = non_blank(channel) {
        return channel.to_string();
    }
    if let Some(last) = non_blank(last_channel) {
        return last.to_string();
    }
    let tokens: Vec<&str> = key.split(':').filter(|t| !t.is_empty()).collect();
    if tokens.len() >= 3 && matches!(tokens[1], "group" | "channel") {
        return tokens[0].to_string();
    }
    UNKNOWN_CHANNEL.to_string()
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

/// Everything the inbound path needs to know about a session key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionClassification {
    pub kind: SessionKind,
    pub channel: String,
    pub display_key: String,
}

/// Per-message hints supplied by the channel adapter.
#[derive(Debug, Clone, Copy, Default)]
pub struct ChannelHints<'a> {
    /// `"group"` when the adapter knows the chat is a group.
    pub gateway_kind: Option<&'a str>,
    pub channel: Option<&'a str>,
    pub last_channel: Option<&'a str>,
}

/// Classify `key` and derive its channel in one go. Computed fresh per
/// message because the hints change between messages.
pub fn classify_session(
    descriptor: &SessionDescriptor,
    key: &str,
    hints: ChannelHints<'_>,
) -> SessionClassification {
    let kind = classify_session_kind(
        key,
        &descriptor.alias,
        &descriptor.main_key,
        hints.gateway_kind,
    );
    let channel = derive_channel(kind, hints.channel, hints.last_channel, key);
    debug!(session_key = key, kind = %kind, channel = %channel, "classified session");

    #[cfg(feature = "metrics")]
    counter!(session_metrics::CLASSIFIED_TOTAL, labels::KIND => kind.as_str()).increment(1);

    SessionClassification {
        kind,
        channel,
        display_key: descriptor.display_key(key).to_string(),
    }
}
