use {
    serde::{Deserialize, Serialize},
    std::fmt,
};

/// Token an agent replies with when it wants nothing sent.
pub const SILENT_REPLY_TOKEN: &str = "NO_REPLY";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FragmentKind {
    Text,
    Media,
}

/// One unit of an agent's outbound reply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplyFragment {
    pub kind: FragmentKind,
    /// Text, or the primary media URI for media fragments.
    pub payload: String,
    /// Queue key: fragments for one target are delivered in order.
    pub target_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reply_to_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thread_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub account_id: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub media_urls: Vec<String>,
}

impl ReplyFragment {
    pub fn text(target_id: impl Into<String>, text: impl Into<String>) -> Self {
        Self::new(FragmentKind::Text, target_id.into(), text.into())
    }

    pub fn media(target_id: impl Into<String>, url: impl Into<String>) -> Self {
        let url = url.into();
        let mut fragment = Self::new(FragmentKind::Media, target_id.into(), url.clone());
        fragment.media_urls.push(url);
        fragment
    }

    fn new(kind: FragmentKind, target_id: String, payload: String) -> Self {
        Self {
            kind,
            payload,
            target_id,
            reply_to_id: None,
            thread_id: None,
            channel: None,
            account_id: None,
            media_urls: Vec::new(),
        }
    }

    pub fn with_reply_to(mut self, reply_to_id: impl Into<String>) -> Self {
        self.reply_to_id = Some(reply_to_id.into());
        self
    }

    pub fn with_thread(mut self, thread_id: impl Into<String>) -> Self {
        self.thread_id = Some(thread_id.into());
        self
    }

    pub fn with_channel(mut self, channel: impl Into<String>) -> Self {
        self.channel = Some(channel.into());
        self
    }

    pub fn with_account(mut self, account_id: impl Into<String>) -> Self {
        self.account_id = Some(account_id.into());
        self
    }
}

/// What a channel reports for a delivered fragment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DispatchResult {
    pub channel: String,
    pub message_id: String,
    /// Milliseconds since the Unix epoch.
    pub timestamp: u64,
}

/// Why a fragment never reached a queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SkipReason {
    Empty,
    Silent,
    Closed,
}

impl SkipReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Empty => "empty",
            Self::Silent => "silent",
            Self::Closed => "closed",
        }
    }
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// True when `text` is exactly the silent token, ignoring surrounding space.
pub fn is_silent_reply(text: &str) -> bool {
    text.trim() == SILENT_REPLY_TOKEN
}

/// Prepare a fragment for queueing.
///
/// Blank and silent text fragments are skipped. `response_prefix` is
/// prepended to text that doesn't already start with it. Media fragments
/// pass through untouched.
pub fn normalize_reply(
    mut fragment: ReplyFragment,
    response_prefix: Option<&str>,
) -> Result<ReplyFragment, SkipReason> {
    if fragment.kind == FragmentKind::Media {
        return Ok(fragment);
    }
    if fragment.payload.trim().is_empty() {
        return Err(SkipReason::Empty);
    }
    if is_silent_reply(&fragment.payload) {
        return Err(SkipReason::Silent);
    }
    if let Some(prefix) = response_prefix.map(str::trim).filter(|p| !p.is_empty())
        && !fragment.payload.starts_with(prefix)
    {
        fragment.payload = format!("{prefix} {}", fragment.payload);
    }
    Ok(fragment)
}
