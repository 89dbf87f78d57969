//! Reply delivery: the glue between an agent run and the channels.
//!
//! Flow: agent reply fragment → normalize (skip blank/silent, prefix) →
//! per-target queue → deliverer → channel. Typing indicators follow the
//! queue transitions.

pub mod dispatcher;
pub mod error;
pub mod reply;
pub mod typing;

pub use {
    dispatcher::{
        DeliveryReceipt, Dispatched, DispatcherOptions, ErrorCallback, IdleCallback,
        ReplyDeliverer, ReplyDispatcher,
    },
    error::{DispatchError, Result},
    reply::{
        DispatchResult, FragmentKind, ReplyFragment, SILENT_REPLY_TOKEN, SkipReason,
        is_silent_reply, normalize_reply,
    },
    typing::{
        ReplyDispatcherWithTyping, TypingIndicator, TypingOptions,
        create_reply_dispatcher_with_typing,
    },
};
