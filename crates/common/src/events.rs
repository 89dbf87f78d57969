//! Heartbeat event bus.
//!
//! Each gateway instance owns one [`HeartbeatEvents`]; nothing here is
//! process-global. Listeners are plain callbacks: a listener that returns an
//! error or panics is logged and skipped, the remaining listeners still see the
//! event.

use std::{
    collections::BTreeMap,
    panic::{AssertUnwindSafe, catch_unwind},
    sync::{
        Arc, Mutex,
        atomic::{AtomicU64, Ordering},
    },
    time::{Duration, SystemTime, UNIX_EPOCH},
};

use {
    serde::{Deserialize, Serialize},
    tracing::{debug, warn},
};

#[cfg(feature = "metrics")]
use parley_metrics::{counter, heartbeat as heartbeat_metrics, labels};

// ── HeartbeatStatus ─────────────────────────────────────────────────────────

/// Outcome of one heartbeat run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum HeartbeatStatus {
    /// A heartbeat reply was delivered to a channel.
    Sent,
    /// The agent produced nothing.
    OkEmpty,
    /// The agent answered with the acknowledgement token only.
    OkToken,
    /// The run was skipped (quiet hours, busy session, no target).
    Skipped,
    /// The run or its delivery failed.
    Failed,
}

impl HeartbeatStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sent => "sent",
            Self::OkEmpty => "ok-empty",
            Self::OkToken => "ok-token",
            Self::Skipped => "skipped",
            Self::Failed => "failed",
        }
    }
}

// ── HeartbeatEvent ──────────────────────────────────────────────────────────

/// Payload broadcast to heartbeat listeners.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HeartbeatEvent {
    /// Milliseconds since the Unix epoch, stamped by [`HeartbeatEvents::emit`].
    pub ts: u64,
    pub status: HeartbeatStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preview: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub has_media: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel: Option<String>,
}

impl HeartbeatEvent {
    /// Event with only a status set; `ts` is filled in on emit.
    pub fn new(status: HeartbeatStatus) -> Self {
        Self {
            ts: 0,
            status,
            to: None,
            preview: None,
            duration_ms: None,
            has_media: None,
            reason: None,
            channel: None,
        }
    }

    pub fn with_to(mut self, to: impl Into<String>) -> Self {
        self.to = Some(to.into());
        self
    }

    pub fn with_channel(mut self, channel: impl Into<String>) -> Self {
        self.channel = Some(channel.into());
        self
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    pub fn with_preview(mut self, preview: impl Into<String>) -> Self {
        self.preview = Some(preview.into());
        self
    }
}

// ── HeartbeatEvents ─────────────────────────────────────────────────────────

/// Opaque handle returned by [`HeartbeatEvents::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ListenerId(u64);

/// Callback invoked for every emitted heartbeat event.
pub type HeartbeatListener = Arc<dyn Fn(&HeartbeatEvent) -> anyhow::Result<()> + Send + Sync>;

/// Gateway-scoped heartbeat event bus.
#[derive(Default)]
pub struct HeartbeatEvents {
    next_id: AtomicU64,
    listeners: Mutex<BTreeMap<ListenerId, HeartbeatListener>>,
    last: Mutex<Option<HeartbeatEvent>>,
}

impl HeartbeatEvents {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a listener. Listeners are called in subscription order.
    pub fn subscribe(&self, listener: HeartbeatListener) -> ListenerId {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.listeners
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(id, listener);
        debug!(listener = id.0, "heartbeat listener subscribed");
        id
    }

    /// Remove a listener. Returns false when the id was not registered.
    pub fn unsubscribe(&self, id: ListenerId) -> bool {
        self.listeners
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&id)
            .is_some()
    }

    pub fn listener_count(&self) -> usize {
        self.listeners
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .len()
    }

    /// Most recently emitted event, if any.
    pub fn last(&self) -> Option<HeartbeatEvent> {
        self.last.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Stamp `ts`, remember the event and broadcast it to every listener.
    pub fn emit(&self, mut event: HeartbeatEvent) -> HeartbeatEvent {
        event.ts = now_ms();
        *self.last.lock().unwrap_or_else(|e| e.into_inner()) = Some(event.clone());

        #[cfg(feature = "metrics")]
        counter!(
            heartbeat_metrics::EVENTS_TOTAL,
            labels::STATUS => event.status.as_str()
        )
        .increment(1);

        // Snapshot so listeners may (un)subscribe from inside a callback.
        let listeners: Vec<(ListenerId, HeartbeatListener)> = self
            .listeners
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .map(|(id, l)| (*id, Arc::clone(l)))
            .collect();

        debug!(
            status = event.status.as_str(),
            listeners = listeners.len(),
            "emitting heartbeat event"
        );
        for (id, listener) in listeners {
            match catch_unwind(AssertUnwindSafe(|| listener(&event))) {
                Ok(Ok(())) => {},
                Ok(Err(e)) => {
                    warn!(listener = id.0, error = %e, "heartbeat listener failed");
                },
                Err(_) => {
                    warn!(listener = id.0, "heartbeat listener panicked");
                },
            }
        }
        event
    }
}

/// Milliseconds since the Unix epoch.
pub fn now_ms() -> u64 {
    let since_epoch = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default();
    saturating_millis(since_epoch)
}

fn saturating_millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {super::*, std::sync::atomic::AtomicUsize};

    fn counting_listener(count: Arc<AtomicUsize>) -> HeartbeatListener {
        Arc::new(move |_event: &HeartbeatEvent| -> anyhow::Result<()> {
            count.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
    }

    #[test]
    fn millis_saturate_instead_of_wrapping() {
        assert_eq!(saturating_millis(Duration::from_millis(1_700_000_000_123)), 1_700_000_000_123);
        assert_eq!(saturating_millis(Duration::MAX), u64::MAX);
    }

    #[test]
    fn emit_stamps_ts_and_records_last() {
        let bus = HeartbeatEvents::new();
        assert!(bus.last().is_none());

        let emitted = bus.emit(HeartbeatEvent::new(HeartbeatStatus::Sent).with_to("alice"));
        assert!(emitted.ts > 0);
        assert_eq!(bus.last(), Some(emitted));
    }

    #[test]
    fn failing_listener_does_not_block_others() {
        let bus = HeartbeatEvents::new();
        let count = Arc::new(AtomicUsize::new(0));

        bus.subscribe(Arc::new(|_: &HeartbeatEvent| -> anyhow::Result<()> {
            anyhow::bail!("listener is broken")
        }));
        bus.subscribe(Arc::new(|_: &HeartbeatEvent| -> anyhow::Result<()> {
            panic!("listener exploded")
        }));
        bus.subscribe(counting_listener(Arc::clone(&count)));

        bus.emit(HeartbeatEvent::new(HeartbeatStatus::Failed).with_reason("timeout"));
        bus.emit(HeartbeatEvent::new(HeartbeatStatus::OkEmpty));
        assert_eq!(count.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn unsubscribe_stops_delivery() {
        let bus = HeartbeatEvents::new();
        let count = Arc::new(AtomicUsize::new(0));
        let id = bus.subscribe(counting_listener(Arc::clone(&count)));
        assert_eq!(bus.listener_count(), 1);

        bus.emit(HeartbeatEvent::new(HeartbeatStatus::Sent));
        assert!(bus.unsubscribe(id));
        assert!(!bus.unsubscribe(id));
        bus.emit(HeartbeatEvent::new(HeartbeatStatus::Sent));

        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert_eq!(bus.listener_count(), 0);
    }

    #[test]
    fn buses_are_independent() {
        let a = HeartbeatEvents::new();
        let b = HeartbeatEvents::new();
        a.emit(HeartbeatEvent::new(HeartbeatStatus::Skipped));
        assert!(b.last().is_none());
    }

    #[test]
    fn event_serializes_camel_case_without_nulls() {
        let mut event = HeartbeatEvent::new(HeartbeatStatus::OkToken).with_channel("telegram");
        event.duration_ms = Some(42);
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["status"], "ok-token");
        assert_eq!(json["durationMs"], 42);
        assert_eq!(json["channel"], "telegram");
        assert!(json.get("to").is_none());
    }
}
