use std::fmt;

use {
    anyhow::Result,
    async_trait::async_trait,
    serde::{Deserialize, Serialize},
    serde_json::Value,
};

use crate::payload::ToolResult;

// ── Channel actions (plugin overrides) ──────────────────────────────────────

/// Message actions a channel plugin may take over.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelAction {
    Send,
    Poll,
}

impl ChannelAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Send => "send",
            Self::Poll => "poll",
        }
    }
}

impl fmt::Display for ChannelAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One action offered to a channel plugin.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionRequest {
    pub channel: String,
    pub action: ChannelAction,
    /// Action parameters, camelCase JSON.
    pub params: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub account_id: Option<String>,
    /// Opaque gateway call options.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gateway: Option<Value>,
    /// Opaque context of the tool invocation that triggered the action.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_context: Option<Value>,
    pub dry_run: bool,
}

/// A channel-specific override for message actions.
///
/// Returning `Ok(None)` declines the action and lets the generic sender
/// handle it.
#[async_trait]
pub trait ChannelActionPlugin: Send + Sync {
    /// Channel identifier (e.g. "telegram", "discord").
    fn id(&self) -> &str;

    /// Actions this plugin is willing to see. Others are never offered.
    fn actions(&self) -> &[ChannelAction];

    async fn handle_action(&self, request: &ActionRequest) -> Result<Option<ToolResult>>;
}

// ── Generic send primitives ─────────────────────────────────────────────────

/// Request for the generic cross-channel message sender.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SendMessageRequest {
    pub channel: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub account_id: Option<String>,
    pub to: String,
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub media_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reply_to_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thread_id: Option<String>,
    pub gif_playback: bool,
    pub best_effort: bool,
    pub dry_run: bool,
}

/// Request for the generic cross-channel poll sender.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SendPollRequest {
    pub channel: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub account_id: Option<String>,
    pub to: String,
    pub question: String,
    pub options: Vec<String>,
    pub max_selections: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_hours: Option<u32>,
    pub dry_run: bool,
}

/// What a channel reports back for a delivered message or poll.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendReceipt {
    pub message_id: String,
    pub channel_id: String,
}

/// Generic sender backed by the concrete channel clients.
#[async_trait]
pub trait OutboundSender: Send + Sync {
    async fn send_message(&self, request: &SendMessageRequest) -> Result<SendReceipt>;
    async fn send_poll(&self, request: &SendPollRequest) -> Result<SendReceipt>;
    /// Send a "typing" indicator. No-op by default.
    async fn send_typing(&self, _channel: &str, _account_id: Option<&str>, _to: &str) -> Result<()> {
        Ok(())
    }
}

// ── Mirroring ───────────────────────────────────────────────────────────────

/// Where a successful send should be copied, e.g. into a session transcript.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MirrorTarget {
    pub session_key: String,
    /// Text to record instead of the sent content.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub media_urls: Vec<String>,
}

#[async_trait]
pub trait MirrorSink: Send + Sync {
    async fn mirror(
        &self,
        target: &MirrorTarget,
        request: &SendMessageRequest,
        receipt: &SendReceipt,
    ) -> Result<()>;
}
