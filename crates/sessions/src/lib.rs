//! Session identity and classification.
//!
//! A session key names one logical conversation. This crate decides which key
//! is the owner's main session, how keys are presented, what kind of session
//! a key is and which channel it came from. Nothing here rewrites a key.

pub mod alias;
pub mod key;
pub mod kind;

pub use {
    alias::{
        DEFAULT_MAIN_KEY, SessionDescriptor, resolve_display_session_key,
        resolve_internal_session_key, resolve_main_session_alias,
    },
    key::SessionKey,
    kind::{
        ChannelHints, SessionClassification, SessionKind, classify_session, classify_session_kind,
        derive_channel,
    },
};
