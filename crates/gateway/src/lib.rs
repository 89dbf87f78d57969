//! Gateway core: inbound routing, reply delivery and heartbeat outcomes.
//!
//! Inbound messages are classified, bound to an agent, given a sandbox tool
//! policy and gated on the channel's sender allowlist and group mention
//! rules. Agent replies flow through the reply dispatcher into the
//! outbound send service.

pub mod deliver;
pub mod heartbeat;
pub mod inbound;
pub mod state;
pub mod telemetry;

pub use {
    deliver::{ChannelTyping, OutboundDeliverer},
    heartbeat::{HeartbeatTarget, deliver_heartbeat_reply},
    inbound::{ChatType, InboundGate, InboundMessage, InboundRoute, route_inbound},
    state::GatewayState,
    telemetry::init_telemetry,
};
