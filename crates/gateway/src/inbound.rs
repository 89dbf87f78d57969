use {
    parley_channels::{
        MentionGatingInput, ThreadStarter, configured_require_mention, gating::WILDCARD_GROUP,
        is_allowed, resolve_mention_gating, resolve_require_mention,
    },
    parley_common::events::now_ms,
    parley_config::normalize_agent_id,
    parley_sessions::{
        ChannelHints, SessionClassification, SessionKey, SessionKind, classify_session,
    },
    parley_tools::{SandboxToolPolicy, resolve_sandbox_tool_policy_for_agent},
    serde::{Deserialize, Serialize},
    tracing::debug,
};

use crate::state::GatewayState;

/// Agent used when neither the session key nor config names one.
pub const DEFAULT_AGENT_ID: &str = "main";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatType {
    Direct,
    Group,
}

impl ChatType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Direct => "direct",
            Self::Group => "group",
        }
    }
}

/// What a channel adapter knows about one inbound message.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InboundMessage {
    pub session_key: SessionKey,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel: Option<String>,
    /// Channel the session was last active on.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_channel: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chat_type: Option<ChatType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub account_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sender_id: Option<String>,
    /// Group the message was posted in, for per-group `requireMention`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group_id: Option<String>,
    /// `None` when the adapter can't tell whether the bot was mentioned.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mentioned: Option<bool>,
    /// E.g. a reply to one of the bot's own messages.
    #[serde(default)]
    pub implicit_mention: bool,
    /// Skip mention gating, e.g. for an authorized control command.
    #[serde(default)]
    pub bypass_mention: bool,
    /// Adapter-side `requireMention`, weighed against config by the
    /// gateway's mention order.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub require_mention: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thread_id: Option<String>,
    #[serde(default)]
    pub text: String,
}

impl InboundMessage {
    pub fn new(session_key: impl Into<SessionKey>, text: impl Into<String>) -> Self {
        Self {
            session_key: session_key.into(),
            channel: None,
            last_channel: None,
            chat_type: None,
            account_id: None,
            sender_id: None,
            group_id: None,
            mentioned: None,
            implicit_mention: false,
            bypass_mention: false,
            require_mention: None,
            thread_id: None,
            text: text.into(),
        }
    }

    pub fn with_channel(mut self, channel: impl Into<String>) -> Self {
        self.channel = Some(channel.into());
        self
    }

    pub fn with_chat_type(mut self, chat_type: ChatType) -> Self {
        self.chat_type = Some(chat_type);
        self
    }

    pub fn with_account(mut self, account_id: impl Into<String>) -> Self {
        self.account_id = Some(account_id.into());
        self
    }

    pub fn with_sender(mut self, sender_id: impl Into<String>) -> Self {
        self.sender_id = Some(sender_id.into());
        self
    }

    pub fn in_group(mut self, group_id: impl Into<String>) -> Self {
        self.chat_type = Some(ChatType::Group);
        self.group_id = Some(group_id.into());
        self
    }

    pub fn with_mentioned(mut self, mentioned: bool) -> Self {
        self.mentioned = Some(mentioned);
        self
    }

    pub fn in_thread(mut self, thread_id: impl Into<String>) -> Self {
        self.thread_id = Some(thread_id.into());
        self
    }

    /// Cache key for the thread this message belongs to, if any.
    pub fn thread_key(&self) -> Option<String> {
        let thread = self.thread_id.as_deref()?;
        Some(format!(
            "{}:{}:{thread}",
            self.channel.as_deref().unwrap_or("unknown"),
            self.account_id.as_deref().unwrap_or("-"),
        ))
    }
}

/// Whether the agent should run for an inbound message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum InboundGate {
    Accepted,
    /// Sender is not on the channel's `allowFrom` list.
    NotAllowed,
    /// Group message without the mention the group requires.
    MentionRequired,
}

impl InboundGate {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Accepted => "accepted",
            Self::NotAllowed => "not-allowed",
            Self::MentionRequired => "mention-required",
        }
    }
}

/// Where an inbound message goes and what the agent run may do.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InboundRoute {
    pub session_key: SessionKey,
    pub agent_id: String,
    pub classification: SessionClassification,
    pub tool_policy: SandboxToolPolicy,
    pub gate: InboundGate,
    /// Mentioned explicitly, implicitly or via bypass.
    pub was_mentioned: bool,
    /// Earlier message that opened this message's thread.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thread_starter: Option<ThreadStarter>,
}

impl InboundRoute {
    pub fn is_accepted(&self) -> bool {
        self.gate == InboundGate::Accepted
    }
}

/// Classify the message's session, resolve the agent and its tool policy,
/// and decide whether the sender and mention state let the agent run.
pub async fn route_inbound(state: &GatewayState, message: &InboundMessage) -> InboundRoute {
    let config = state.config().await;
    let descriptor = state.descriptor().await;

    let key = message.session_key.as_str();
    let classification = classify_session(&descriptor, key, ChannelHints {
        gateway_kind: message.chat_type.map(|t| t.as_str()),
        channel: message.channel.as_deref(),
        last_channel: message.last_channel.as_deref(),
    });

    let agent_id = message
        .session_key
        .agent_id()
        .or(config.agents.default_id.as_deref())
        .map(normalize_agent_id)
        .filter(|id| !id.is_empty())
        .unwrap_or_else(|| DEFAULT_AGENT_ID.to_string());

    let tool_policy =
        resolve_sandbox_tool_policy_for_agent(&config, Some(&agent_id), state.tool_groups.as_ref());

    let channel_config = message
        .channel
        .as_deref()
        .and_then(|channel| config.channels.get(channel));
    let sender = message.sender_id.as_deref().unwrap_or_default();

    let mut was_mentioned = message.mentioned.unwrap_or(false) || message.implicit_mention;
    let gate = if let Some(cfg) = channel_config
        && !is_allowed(sender, &cfg.allow_from)
    {
        InboundGate::NotAllowed
    } else if classification.kind == SessionKind::Group {
        let configured = channel_config.and_then(|cfg| {
            configured_require_mention(cfg, message.group_id.as_deref().unwrap_or(WILDCARD_GROUP))
        });
        let gating = resolve_mention_gating(MentionGatingInput {
            require_mention: resolve_require_mention(
                configured,
                message.require_mention,
                state.mention_order,
            ),
            can_detect_mention: message.mentioned.is_some(),
            was_mentioned: message.mentioned.unwrap_or(false),
            implicit_mention: message.implicit_mention,
            bypass: message.bypass_mention,
        });
        was_mentioned = gating.effective_was_mentioned;
        if gating.should_skip {
            InboundGate::MentionRequired
        } else {
            InboundGate::Accepted
        }
    } else {
        InboundGate::Accepted
    };

    let mut thread_starter = None;
    if gate != InboundGate::NotAllowed
        && let Some(thread_key) = message.thread_key()
    {
        thread_starter = state.thread_starters.get(&thread_key);
        if thread_starter.is_none() {
            state.thread_starters.insert(thread_key, ThreadStarter {
                text: message.text.clone(),
                sender_id: message.sender_id.clone(),
                timestamp_ms: Some(now_ms()),
            });
        }
    }

    if gate == InboundGate::Accepted {
        debug!(
            session_key = key,
            display_key = %classification.display_key,
            kind = %classification.kind,
            channel = %classification.channel,
            agent_id = %agent_id,
            "routed inbound message"
        );
    } else {
        debug!(
            session_key = key,
            channel = %classification.channel,
            sender_id = sender,
            gate = gate.as_str(),
            "skipped inbound message"
        );
    }

    InboundRoute {
        session_key: message.session_key.clone(),
        agent_id,
        classification,
        tool_policy,
        gate,
        was_mentioned,
        thread_starter,
    }
}
