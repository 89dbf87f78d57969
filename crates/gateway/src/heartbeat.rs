//! Heartbeat reply delivery.
//!
//! A heartbeat run asks the agent whether anything needs the owner's
//! attention. Replies that are empty or just the ack token are not sent;
//! everything else goes out through the outbound service. Every outcome is
//! emitted on the gateway's heartbeat bus.

use std::time::Instant;

use {
    parley_channels::{OutboundContext, SendAction},
    parley_common::events::{HeartbeatEvent, HeartbeatStatus},
    tracing::{info, warn},
};

use crate::state::GatewayState;

/// Token the agent replies with when nothing needs attention.
pub const HEARTBEAT_OK: &str = "HEARTBEAT_OK";

/// Longest preview carried on a heartbeat event, in characters.
pub const PREVIEW_MAX_CHARS: usize = 200;

/// Where heartbeat replies go.
#[derive(Debug, Clone, Default)]
pub struct HeartbeatTarget {
    /// Recipient; `None` means heartbeats are not delivered anywhere.
    pub to: Option<String>,
    pub channel: Option<String>,
    pub account_id: Option<String>,
}

/// Strip the ack token, including bold wrappers like `**HEARTBEAT_OK**`,
/// from the leading and trailing edges of a reply. A token inside the text
/// is left alone. Returns the remaining text and whether a token was found.
pub fn strip_heartbeat_token(text: &str) -> (String, bool) {
    let patterns = [
        format!("**{HEARTBEAT_OK}**"),
        format!("<b>{HEARTBEAT_OK}</b>"),
        HEARTBEAT_OK.to_string(),
    ];
    let mut out = text.trim();
    let mut stripped = false;
    loop {
        let before = out.len();
        for pattern in &patterns {
            if let Some(rest) = out.strip_prefix(pattern.as_str())
                && !rest.starts_with(is_word_char)
            {
                out = rest.trim_start();
                stripped = true;
            }
            if let Some(rest) = out.strip_suffix(pattern.as_str())
                && !rest.ends_with(is_word_char)
            {
                out = rest.trim_end();
                stripped = true;
            }
        }
        if out.len() == before {
            break;
        }
    }
    (out.to_string(), stripped)
}

fn is_word_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

fn preview(text: &str) -> String {
    text.chars().take(PREVIEW_MAX_CHARS).collect()
}

/// Deliver one heartbeat reply and emit its outcome.
pub async fn deliver_heartbeat_reply(
    state: &GatewayState,
    target: &HeartbeatTarget,
    reply: &str,
) -> HeartbeatEvent {
    let started = Instant::now();
    let (text, had_token) = strip_heartbeat_token(reply);

    let event = if text.is_empty() {
        let status = if had_token {
            HeartbeatStatus::OkToken
        } else {
            HeartbeatStatus::OkEmpty
        };
        HeartbeatEvent::new(status)
    } else if let Some(to) = target.to.as_deref().filter(|t| !t.trim().is_empty()) {
        send(state, target, to, &text).await
    } else {
        HeartbeatEvent::new(HeartbeatStatus::Skipped)
            .with_reason("no-target")
            .with_preview(preview(&text))
    };

    let mut event = event;
    event.duration_ms = Some(u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX));
    state.heartbeat.emit(event)
}

async fn send(state: &GatewayState, target: &HeartbeatTarget, to: &str, text: &str) -> HeartbeatEvent {
    let mut ctx = OutboundContext::new(state.config().await);
    ctx.channel = target.channel.clone();
    ctx.account_id = target.account_id.clone();
    let action = SendAction {
        to: to.to_string(),
        content: text.to_string(),
        ..Default::default()
    };

    let base = HeartbeatEvent::new(HeartbeatStatus::Sent)
        .with_to(to)
        .with_preview(preview(text));
    match state.outbound.execute_send_action(&ctx, action).await {
        Ok(result) => {
            info!(to, channel = %result.channel, "heartbeat alert sent");
            HeartbeatEvent {
                has_media: Some(false),
                ..base.with_channel(result.channel)
            }
        },
        Err(e) => {
            warn!(to, error = %e, "heartbeat alert failed");
            HeartbeatEvent {
                status: HeartbeatStatus::Failed,
                ..base.with_reason(e.to_string())
            }
        },
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {super::*, rstest::rstest};

    #[rstest]
    #[case("HEARTBEAT_OK", "", true)]
    #[case("  **HEARTBEAT_OK**\n", "", true)]
    #[case("<b>HEARTBEAT_OK</b>", "", true)]
    #[case("Meeting in 10 minutes. HEARTBEAT_OK", "Meeting in 10 minutes.", true)]
    #[case("Meeting in 10 minutes.", "Meeting in 10 minutes.", false)]
    #[case("   ", "", false)]
    #[case("HEARTBEAT_OK all quiet HEARTBEAT_OK", "all quiet", true)]
    #[case("Reply HEARTBEAT_OK when idle", "Reply HEARTBEAT_OK when idle", false)]
    #[case("HEARTBEAT_OKAY then", "HEARTBEAT_OKAY then", false)]
    fn strips_token(#[case] input: &str, #[case] text: &str, #[case] had_token: bool) {
        assert_eq!(strip_heartbeat_token(input), (text.to_string(), had_token));
    }

    #[test]
    fn preview_is_bounded() {
        let long = "é".repeat(PREVIEW_MAX_CHARS + 50);
        assert_eq!(preview(&long).chars().count(), PREVIEW_MAX_CHARS);
    }
}
