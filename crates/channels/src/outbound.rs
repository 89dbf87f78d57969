//! Outbound send service.
//!
//! A send or poll is first offered to the channel's action plugin (unless
//! dry-run). When the plugin declines, or there is none, the generic sender
//! handles it.

use std::sync::Arc;

use {
    parley_config::ParleyConfig,
    serde::{Deserialize, Serialize},
    serde_json::{Value, json},
    tracing::{debug, info, warn},
};

use crate::{
    error::{Context, Error, Result},
    payload::{ToolResult, extract_tool_payload},
    plugin::{
        ActionRequest, ChannelAction, MirrorSink, MirrorTarget, OutboundSender,
        SendMessageRequest, SendPollRequest, SendReceipt,
    },
    registry::ChannelActionRegistry,
};

#[cfg(feature = "metrics")]
use parley_metrics::{counter, labels, outbound as outbound_metrics};

/// Read-only view of one send/poll action.
#[derive(Debug, Clone)]
pub struct OutboundContext {
    pub cfg: Arc<ParleyConfig>,
    /// Channel id; falls back to `channels.default`.
    pub channel: Option<String>,
    /// Account id; falls back to the channel's `defaultAccount`.
    pub account_id: Option<String>,
    pub tool_context: Option<Value>,
    pub gateway: Option<Value>,
    pub dry_run: bool,
    pub mirror: Option<MirrorTarget>,
}

impl OutboundContext {
    pub fn new(cfg: Arc<ParleyConfig>) -> Self {
        Self {
            cfg,
            channel: None,
            account_id: None,
            tool_context: None,
            gateway: None,
            dry_run: false,
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

    pub fn with_mirror(mut self, mirror: MirrorTarget) -> Self {
        self.mirror = Some(mirror);
        self
    }

    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// Explicit channel, then `channels.default`. Lower-cased.
    pub fn resolve_channel(&self) -> Result<String> {
        non_blank(self.channel.as_deref())
            .or_else(|| non_blank(self.cfg.channels.default.as_deref()))
            .map(str::to_ascii_lowercase)
            .context("channel is required")
    }

    /// Explicit account, then the channel's `defaultAccount`.
    pub fn resolve_account(&self, channel: &str) -> Option<String> {
        non_blank(self.account_id.as_deref())
            .or_else(|| {
                self.cfg
                    .channels
                    .get(channel)
                    .and_then(|c| non_blank(c.default_account.as_deref()))
            })
            .map(str::to_string)
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

/// Parameters of a send action.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SendAction {
    pub to: String,
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub media_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reply_to_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thread_id: Option<String>,
    pub gif_playback: bool,
    /// Report a failed send in the result instead of failing the action.
    pub best_effort: bool,
}

/// Parameters of a poll action.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PollAction {
    pub to: String,
    pub question: String,
    pub options: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_selections: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_hours: Option<u32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HandledBy {
    Plugin,
    Core,
}

impl HandledBy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Plugin => "plugin",
            Self::Core => "core",
        }
    }
}

/// Normalized outcome of a send or poll action.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OutboundActionResult {
    pub handled_by: HandledBy,
    pub channel: String,
    /// Plugin: the extracted tool payload. Core: the send receipt.
    pub payload: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_result: Option<ToolResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub send_result: Option<SendReceipt>,
    pub dry_run: bool,
}

/// Routes send/poll actions to a channel plugin or the generic sender.
pub struct OutboundSendService {
    sender: Arc<dyn OutboundSender>,
    plugins: Arc<ChannelActionRegistry>,
    mirror: Option<Arc<dyn MirrorSink>>,
}

impl OutboundSendService {
    pub fn new(sender: Arc<dyn OutboundSender>) -> Self {
        Self {
            sender,
            plugins: Arc::new(ChannelActionRegistry::new()),
            mirror: None,
        }
    }

    pub fn with_plugins(mut self, plugins: Arc<ChannelActionRegistry>) -> Self {
        self.plugins = plugins;
        self
    }

    pub fn with_mirror(mut self, mirror: Arc<dyn MirrorSink>) -> Self {
        self.mirror = Some(mirror);
        self
    }

    pub fn sender(&self) -> &Arc<dyn OutboundSender> {
        &self.sender
    }

    pub async fn execute_send_action(
        &self,
        ctx: &OutboundContext,
        action: SendAction,
    ) -> Result<OutboundActionResult> {
        let channel = ctx.resolve_channel()?;
        let result = self.send_inner(ctx, &channel, action).await;
        record_outcome(&channel, ChannelAction::Send, &result);
        result
    }

    pub async fn execute_poll_action(
        &self,
        ctx: &OutboundContext,
        action: PollAction,
    ) -> Result<OutboundActionResult> {
        let channel = ctx.resolve_channel()?;
        let result = self.poll_inner(ctx, &channel, action).await;
        record_outcome(&channel, ChannelAction::Poll, &result);
        result
    }

    async fn send_inner(
        &self,
        ctx: &OutboundContext,
        channel: &str,
        action: SendAction,
    ) -> Result<OutboundActionResult> {
        if let Some(result) = self
            .offer_to_plugin(ctx, channel, ChannelAction::Send, &action)
            .await?
        {
            return Ok(result);
        }

        let to = non_blank(Some(action.to.as_str())).context("send requires a target (to)")?;
        let media_url = non_blank(action.media_url.as_deref()).map(str::to_string);
        if action.content.trim().is_empty() && media_url.is_none() {
            return Err(Error::invalid_input("send requires content or media"));
        }

        let request = SendMessageRequest {
            channel: channel.to_string(),
            account_id: ctx.resolve_account(channel),
            to: to.to_string(),
            content: action.content,
            media_url,
            reply_to_id: action.reply_to_id,
            thread_id: action.thread_id,
            gif_playback: action.gif_playback,
            best_effort: action.best_effort,
            dry_run: ctx.dry_run,
        };

        let receipt = match self.sender.send_message(&request).await {
            Ok(receipt) => receipt,
            Err(e) if request.best_effort => {
                warn!(channel, to = %request.to, error = %e, "best-effort send failed");
                return Ok(OutboundActionResult {
                    handled_by: HandledBy::Core,
                    channel: channel.to_string(),
                    payload: json!({ "delivered": false, "error": e.to_string() }),
                    tool_result: None,
                    send_result: None,
                    dry_run: ctx.dry_run,
                });
            },
            Err(e) => return Err(Error::collaborator(format!("{channel} send"), e)),
        };

        if !ctx.dry_run {
            self.mirror_send(ctx, &request, &receipt).await;
        }
        info!(
            channel,
            to = %request.to,
            message_id = %receipt.message_id,
            dry_run = ctx.dry_run,
            "message sent"
        );
        core_result(channel, receipt, ctx.dry_run)
    }

    async fn poll_inner(
        &self,
        ctx: &OutboundContext,
        channel: &str,
        action: PollAction,
    ) -> Result<OutboundActionResult> {
        if let Some(result) = self
            .offer_to_plugin(ctx, channel, ChannelAction::Poll, &action)
            .await?
        {
            return Ok(result);
        }

        let to = non_blank(Some(action.to.as_str())).context("poll requires a target (to)")?;
        let question =
            non_blank(Some(action.question.as_str())).context("poll requires a question")?;
        let options: Vec<String> = action
            .options
            .iter()
            .map(|o| o.trim())
            .filter(|o| !o.is_empty())
            .map(str::to_string)
            .collect();
        if options.len() < 2 {
            return Err(Error::invalid_input("poll requires at least two options"));
        }
        let max_selections = action
            .max_selections
            .unwrap_or(1)
            .clamp(1, u32::try_from(options.len()).unwrap_or(u32::MAX));

        let request = SendPollRequest {
            channel: channel.to_string(),
            account_id: ctx.resolve_account(channel),
            to: to.to_string(),
            question: question.to_string(),
            options,
            max_selections,
            duration_hours: action.duration_hours,
            dry_run: ctx.dry_run,
        };
        let receipt = self
            .sender
            .send_poll(&request)
            .await
            .map_err(|e| Error::collaborator(format!("{channel} poll"), e))?;
        info!(channel, to = %request.to, message_id = %receipt.message_id, "poll sent");
        core_result(channel, receipt, ctx.dry_run)
    }

    async fn offer_to_plugin<P: Serialize>(
        &self,
        ctx: &OutboundContext,
        channel: &str,
        action: ChannelAction,
        params: &P,
    ) -> Result<Option<OutboundActionResult>> {
        if ctx.dry_run {
            return Ok(None);
        }
        let request = ActionRequest {
            channel: channel.to_string(),
            action,
            params: serde_json::to_value(params)?,
            account_id: ctx.resolve_account(channel),
            gateway: ctx.gateway.clone(),
            tool_context: ctx.tool_context.clone(),
            dry_run: false,
        };
        let Some(tool_result) = self.plugins.dispatch_action(&request).await? else {
            return Ok(None);
        };
        debug!(channel, action = %action, "action handled by channel plugin");
        Ok(Some(OutboundActionResult {
            handled_by: HandledBy::Plugin,
            channel: channel.to_string(),
            payload: extract_tool_payload(&tool_result),
            tool_result: Some(tool_result),
            send_result: None,
            dry_run: false,
        }))
    }

    async fn mirror_send(
        &self,
        ctx: &OutboundContext,
        request: &SendMessageRequest,
        receipt: &SendReceipt,
    ) {
        let (Some(sink), Some(target)) = (&self.mirror, &ctx.mirror) else {
            return;
        };
        if let Err(e) = sink.mirror(target, request, receipt).await {
            warn!(
                channel = %request.channel,
                session_key = %target.session_key,
                error = %e,
                "failed to mirror outbound message"
            );
        }
    }
}

fn core_result(channel: &str, receipt: SendReceipt, dry_run: bool) -> Result<OutboundActionResult> {
    Ok(OutboundActionResult {
        handled_by: HandledBy::Core,
        channel: channel.to_string(),
        payload: serde_json::to_value(&receipt)?,
        tool_result: None,
        send_result: Some(receipt),
        dry_run,
    })
}

#[cfg(feature = "metrics")]
fn record_outcome(channel: &str, action: ChannelAction, result: &Result<OutboundActionResult>) {
    match result {
        Ok(r) => counter!(
            outbound_metrics::ACTIONS_TOTAL,
            labels::CHANNEL => channel.to_string(),
            labels::ACTION => action.as_str(),
            labels::HANDLED_BY => r.handled_by.as_str()
        )
        .increment(1),
        Err(_) => counter!(
            outbound_metrics::ACTION_ERRORS_TOTAL,
            labels::CHANNEL => channel.to_string(),
            labels::ACTION => action.as_str()
        )
        .increment(1),
    }
}

#[cfg(not(feature = "metrics"))]
fn record_outcome(_channel: &str, _action: ChannelAction, _result: &Result<OutboundActionResult>) {}
