//! Metric name and label definitions.
//!
//! Every metric emitted by parley is named here so the set stays documented
//! in one place.

/// Session routing metrics
pub mod session {
    /// Inbound messages classified, by session kind
    pub const CLASSIFIED_TOTAL: &str = "parley_session_classified_total";
}

/// Tool policy metrics
pub mod policy {
    /// Sandbox tool policy resolutions, by allow/deny origin
    pub const RESOLUTIONS_TOTAL: &str = "parley_policy_resolutions_total";
}

/// Reply dispatcher metrics
pub mod dispatch {
    /// Fragments accepted onto a target queue
    pub const FRAGMENTS_QUEUED_TOTAL: &str = "parley_dispatch_fragments_queued_total";
    /// Fragments skipped before queueing (empty, silent, closed)
    pub const FRAGMENTS_SKIPPED_TOTAL: &str = "parley_dispatch_fragments_skipped_total";
    /// Fragments delivered successfully
    pub const FRAGMENTS_DELIVERED_TOTAL: &str = "parley_dispatch_fragments_delivered_total";
    /// Fragments whose delivery failed or was dropped
    pub const FRAGMENTS_FAILED_TOTAL: &str = "parley_dispatch_fragments_failed_total";
    /// Delivery duration in seconds
    pub const DELIVERY_DURATION_SECONDS: &str = "parley_dispatch_delivery_duration_seconds";
}

/// Outbound send service metrics
pub mod outbound {
    /// Send/poll actions executed, by handler (plugin/core)
    pub const ACTIONS_TOTAL: &str = "parley_outbound_actions_total";
    /// Send/poll actions that failed
    pub const ACTION_ERRORS_TOTAL: &str = "parley_outbound_action_errors_total";
}

/// Heartbeat metrics
pub mod heartbeat {
    /// Heartbeat events emitted, by status
    pub const EVENTS_TOTAL: &str = "parley_heartbeat_events_total";
}

/// Common label keys
pub mod labels {
    pub const CHANNEL: &str = "channel";
    pub const KIND: &str = "kind";
    pub const ACTION: &str = "action";
    pub const HANDLED_BY: &str = "handled_by";
    pub const REASON: &str = "reason";
    pub const STATUS: &str = "status";
    pub const ALLOW_ORIGIN: &str = "allow_origin";
    pub const DENY_ORIGIN: &str = "deny_origin";
}
