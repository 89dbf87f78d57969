//! Channel-side collaborators of the gateway.
//!
//! Outbound: the send service that offers send/poll actions to a channel's
//! action plugin before falling back to the generic sender. Inbound: peer
//! allowlists, mention gating and the thread-starter cache.

pub mod cache;
pub mod error;
pub mod gating;
pub mod outbound;
pub mod payload;
pub mod plugin;
pub mod registry;

pub use {
    cache::{ThreadStarter, ThreadStarterCache},
    error::{Error, Result},
    gating::{
        MentionGating, MentionGatingInput, RequireMentionOrder, configured_require_mention,
        is_allowed, resolve_mention_gating, resolve_require_mention,
    },
    outbound::{
        HandledBy, OutboundActionResult, OutboundContext, OutboundSendService, PollAction,
        SendAction,
    },
    payload::{ContentBlock, ToolResult, extract_tool_payload},
    plugin::{
        ActionRequest, ChannelAction, ChannelActionPlugin, MirrorSink, MirrorTarget,
        OutboundSender, SendMessageRequest, SendPollRequest, SendReceipt,
    },
    registry::ChannelActionRegistry,
};
