use std::sync::Arc;

use {
    async_trait::async_trait,
    parley_auto_reply::{DispatchResult, FragmentKind, ReplyDeliverer, ReplyFragment, TypingIndicator},
    parley_channels::{MirrorTarget, OutboundActionResult, OutboundContext, SendAction},
    parley_common::events::now_ms,
};

use crate::state::GatewayState;

/// Delivers reply fragments through the outbound send service.
///
/// Fragment-level `channel`/`account_id` win over the deliverer's defaults,
/// which in turn fall back to config.
pub struct OutboundDeliverer {
    state: Arc<GatewayState>,
    channel: Option<String>,
    account_id: Option<String>,
    mirror: Option<MirrorTarget>,
}

impl OutboundDeliverer {
    pub fn new(state: Arc<GatewayState>) -> Self {
        Self {
            state,
            channel: None,
            account_id: None,
            mirror: None,
        }
    }

    pub fn with_channel(mut self, channel: impl Into<String>) -> Self {
        self.channel = Some(channel.into());
        self
    }

    pub fn with_account(mut self, account_id: impl Into<String>) -> Self {
        self.account_id = Some(account_id.into());
        self
    }

    /// Copy every successful send into this session's transcript.
    pub fn with_mirror(mut self, mirror: MirrorTarget) -> Self {
        self.mirror = Some(mirror);
        self
    }

    async fn context_for(&self, fragment: &ReplyFragment) -> OutboundContext {
        let mut ctx = OutboundContext::new(self.state.config().await);
        ctx.channel = fragment.channel.clone().or_else(|| self.channel.clone());
        ctx.account_id = fragment
            .account_id
            .clone()
            .or_else(|| self.account_id.clone());
        ctx.mirror = self.mirror.clone();
        ctx
    }
}

fn send_action(fragment: &ReplyFragment) -> SendAction {
    let mut action = SendAction {
        to: fragment.target_id.clone(),
        reply_to_id: fragment.reply_to_id.clone(),
        thread_id: fragment.thread_id.clone(),
        ..Default::default()
    };
    match fragment.kind {
        FragmentKind::Text => action.content = fragment.payload.clone(),
        FragmentKind::Media => {
            action.media_url = Some(fragment.payload.clone());
        },
    }
    action
}

/// Message id reported by the core sender or, for plugin sends, a
/// `messageId` field in the plugin payload.
fn message_id(result: &OutboundActionResult) -> String {
    if let Some(receipt) = &result.send_result {
        return receipt.message_id.clone();
    }
    result
        .payload
        .get("messageId")
        .and_then(|v| v.as_str())
        .unwrap_or_default()
        .to_string()
}

#[async_trait]
impl ReplyDeliverer for OutboundDeliverer {
    async fn deliver(&self, fragment: &ReplyFragment) -> anyhow::Result<DispatchResult> {
        let ctx = self.context_for(fragment).await;
        let result = self
            .state
            .outbound
            .execute_send_action(&ctx, send_action(fragment))
            .await?;
        Ok(DispatchResult {
            message_id: message_id(&result),
            channel: result.channel,
            timestamp: now_ms(),
        })
    }
}

/// Typing indicator backed by the generic sender of one channel account.
///
/// Channels expire typing on their own, so stop is a no-op.
pub struct ChannelTyping {
    state: Arc<GatewayState>,
    channel: String,
    account_id: Option<String>,
}

impl ChannelTyping {
    pub fn new(state: Arc<GatewayState>, channel: impl Into<String>) -> Self {
        Self {
            state,
            channel: channel.into(),
            account_id: None,
        }
    }

    pub fn with_account(mut self, account_id: impl Into<String>) -> Self {
        self.account_id = Some(account_id.into());
        self
    }
}

#[async_trait]
impl TypingIndicator for ChannelTyping {
    async fn start_typing(&self, target_id: &str) -> anyhow::Result<()> {
        self.state
            .outbound
            .sender()
            .send_typing(&self.channel, self.account_id.as_deref(), target_id)
            .await
    }

    async fn stop_typing(&self, _target_id: &str) -> anyhow::Result<()> {
        Ok(())
    }
}
