//! Per-target reply dispatcher.
//!
//! Every target id owns a FIFO served by one spawned task; a target's next
//! fragment starts only after the previous one settled. Targets never wait
//! on each other.

use std::{
    collections::{HashMap, VecDeque},
    future::Future,
    panic::AssertUnwindSafe,
    pin::Pin,
    sync::{Arc, Mutex, MutexGuard},
    task::{Context, Poll},
};

use {
    async_trait::async_trait,
    futures::FutureExt,
    tokio::sync::{oneshot, watch},
    tracing::{debug, error, warn},
};

use crate::{
    error::{DispatchError, Result},
    reply::{DispatchResult, ReplyFragment, SkipReason, normalize_reply},
};

#[cfg(feature = "metrics")]
use parley_metrics::{counter, dispatch as dispatch_metrics, histogram, labels};

/// Sends one fragment to its channel.
#[async_trait]
pub trait ReplyDeliverer: Send + Sync {
    async fn deliver(&self, fragment: &ReplyFragment) -> anyhow::Result<DispatchResult>;
}

pub type ErrorCallback = Arc<dyn Fn(&ReplyFragment, &DispatchError) + Send + Sync>;
pub type IdleCallback = Arc<dyn Fn() + Send + Sync>;

#[derive(Clone, Default)]
pub struct DispatcherOptions {
    /// Prepended to text fragments that don't already start with it.
    pub response_prefix: Option<String>,
    /// Called for every fragment whose delivery failed.
    pub on_error: Option<ErrorCallback>,
    /// Called each time the whole dispatcher becomes idle.
    pub on_idle: Option<IdleCallback>,
}

/// Queue transitions, reported while the queue lock is held.
pub(crate) trait QueueObserver: Send + Sync {
    /// The target went from idle to having work.
    fn on_active(&self, target_id: &str);
    /// The target's queue drained.
    fn on_drained(&self, target_id: &str);
}

/// Outcome of [`ReplyDispatcher::dispatch`].
#[derive(Debug)]
pub enum Dispatched {
    Queued(DeliveryReceipt),
    Skipped(SkipReason),
}

impl Dispatched {
    pub fn is_queued(&self) -> bool {
        matches!(self, Self::Queued(_))
    }

    pub fn receipt(self) -> Option<DeliveryReceipt> {
        match self {
            Self::Queued(receipt) => Some(receipt),
            Self::Skipped(_) => None,
        }
    }

    pub fn skip_reason(&self) -> Option<SkipReason> {
        match self {
            Self::Queued(_) => None,
            Self::Skipped(reason) => Some(*reason),
        }
    }
}

/// Resolves to the fragment's own outcome. Dropping it doesn't affect
/// delivery.
#[derive(Debug)]
pub struct DeliveryReceipt {
    seq: u64,
    target_id: String,
    rx: oneshot::Receiver<Result<DispatchResult>>,
}

impl DeliveryReceipt {
    pub fn seq(&self) -> u64 {
        self.seq
    }

    pub fn target_id(&self) -> &str {
        &self.target_id
    }
}

impl Future for DeliveryReceipt {
    type Output = Result<DispatchResult>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.rx)
            .poll(cx)
            .map(|outcome| outcome.unwrap_or(Err(DispatchError::Closed)))
    }
}

struct Pending {
    seq: u64,
    fragment: ReplyFragment,
    result_tx: oneshot::Sender<Result<DispatchResult>>,
}

/// A target's queue exists exactly while its worker task is alive.
#[derive(Default)]
struct TargetQueue {
    pending: VecDeque<Pending>,
    in_flight: Option<u64>,
}

#[derive(Default)]
struct State {
    queues: HashMap<String, TargetQueue>,
    next_seq: u64,
    closed: bool,
}

struct Inner {
    deliverer: Arc<dyn ReplyDeliverer>,
    options: DispatcherOptions,
    observer: Option<Arc<dyn QueueObserver>>,
    state: Mutex<State>,
    /// Bumped every time a fragment settles.
    settled: watch::Sender<u64>,
}

impl Inner {
    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn notify_settled(&self) {
        self.settled.send_modify(|n| *n = n.wrapping_add(1));
    }
}

/// Serializes reply fragments per target. Cheap to clone.
#[derive(Clone)]
pub struct ReplyDispatcher {
    inner: Arc<Inner>,
}

impl ReplyDispatcher {
    pub fn new(deliverer: Arc<dyn ReplyDeliverer>, options: DispatcherOptions) -> Self {
        Self::build(deliverer, options, None)
    }

    pub(crate) fn with_observer(
        deliverer: Arc<dyn ReplyDeliverer>,
        options: DispatcherOptions,
        observer: Arc<dyn QueueObserver>,
    ) -> Self {
        Self::build(deliverer, options, Some(observer))
    }

    fn build(
        deliverer: Arc<dyn ReplyDeliverer>,
        options: DispatcherOptions,
        observer: Option<Arc<dyn QueueObserver>>,
    ) -> Self {
        let (settled, _) = watch::channel(0);
        Self {
            inner: Arc::new(Inner {
                deliverer,
                options,
                observer,
                state: Mutex::new(State::default()),
                settled,
            }),
        }
    }

    /// Normalize and enqueue a fragment. Must be called within a tokio
    /// runtime.
    pub fn dispatch(&self, fragment: ReplyFragment) -> Dispatched {
        let fragment = match normalize_reply(fragment, self.inner.options.response_prefix.as_deref())
        {
            Ok(fragment) => fragment,
            Err(reason) => return skipped(reason),
        };

        let (result_tx, rx) = oneshot::channel();
        let target_id = fragment.target_id.clone();
        let (seq, spawn_worker) = {
            let mut state = self.inner.lock();
            if state.closed {
                drop(state);
                return skipped(SkipReason::Closed);
            }
            let seq = state.next_seq;
            state.next_seq += 1;
            let spawn_worker = !state.queues.contains_key(&target_id);
            let queue = state.queues.entry(target_id.clone()).or_default();
            queue.pending.push_back(Pending {
                seq,
                fragment,
                result_tx,
            });
            if spawn_worker && let Some(observer) = &self.inner.observer {
                observer.on_active(&target_id);
            }
            (seq, spawn_worker)
        };

        debug!(target_id = %target_id, seq, "reply fragment queued");
        #[cfg(feature = "metrics")]
        counter!(dispatch_metrics::FRAGMENTS_QUEUED_TOTAL).increment(1);

        if spawn_worker {
            tokio::spawn(run_target(Arc::clone(&self.inner), target_id.clone()));
        }
        Dispatched::Queued(DeliveryReceipt { seq, target_id, rx })
    }

    /// Resolves once every fragment queued before this call has settled.
    ///
    /// The snapshot is taken when this is called, not when the future is
    /// first polled. Fragments queued later don't delay it. Cancel-safe.
    pub fn wait_for_idle(&self) -> impl Future<Output = ()> + Send + 'static {
        let inner = Arc::clone(&self.inner);
        let mut settled = inner.settled.subscribe();
        let bound = inner.lock().next_seq;
        async move {
            loop {
                let done = settled_before(&inner.lock(), bound);
                if done {
                    return;
                }
                if settled.changed().await.is_err() {
                    return;
                }
            }
        }
    }

    /// Fragments queued or in flight.
    pub fn pending_count(&self) -> usize {
        self.inner
            .lock()
            .queues
            .values()
            .map(|q| q.pending.len() + usize::from(q.in_flight.is_some()))
            .sum()
    }

    pub fn is_idle(&self) -> bool {
        self.pending_count() == 0
    }

    /// Stop accepting fragments. Queued fragments that haven't started settle
    /// with [`DispatchError::Closed`]; in-flight deliveries finish.
    pub fn shutdown(&self) {
        let dropped: Vec<Pending> = {
            let mut state = self.inner.lock();
            state.closed = true;
            state
                .queues
                .values_mut()
                .flat_map(|q| q.pending.drain(..))
                .collect()
        };
        if !dropped.is_empty() {
            debug!(count = dropped.len(), "dropping queued reply fragments on shutdown");
        }
        for pending in dropped {
            #[cfg(feature = "metrics")]
            counter!(
                dispatch_metrics::FRAGMENTS_FAILED_TOTAL,
                labels::REASON => DispatchError::Closed.reason()
            )
            .increment(1);
            let _ = pending.result_tx.send(Err(DispatchError::Closed));
        }
        self.inner.notify_settled();
    }
}

fn skipped(reason: SkipReason) -> Dispatched {
    debug!(reason = %reason, "reply fragment skipped");
    #[cfg(feature = "metrics")]
    counter!(dispatch_metrics::FRAGMENTS_SKIPPED_TOTAL, labels::REASON => reason.as_str())
        .increment(1);
    Dispatched::Skipped(reason)
}

fn settled_before(state: &State, bound: u64) -> bool {
    state.queues.values().all(|q| {
        q.in_flight.is_none_or(|seq| seq >= bound)
            && q.pending.front().is_none_or(|p| p.seq >= bound)
    })
}

/// Worker for one target: drains its queue, then removes it.
async fn run_target(inner: Arc<Inner>, target_id: String) {
    loop {
        let next = {
            let mut state = inner.lock();
            let Some(queue) = state.queues.get_mut(&target_id) else {
                return;
            };
            match queue.pending.pop_front() {
                Some(pending) => {
                    queue.in_flight = Some(pending.seq);
                    Some(pending)
                },
                None => {
                    state.queues.remove(&target_id);
                    if let Some(observer) = &inner.observer {
                        observer.on_drained(&target_id);
                    }
                    None
                },
            }
        };

        let Some(pending) = next else {
            let now_idle = inner.lock().queues.is_empty();
            if now_idle && let Some(on_idle) = &inner.options.on_idle {
                on_idle();
            }
            return;
        };

        let outcome = deliver_one(&inner, &pending.fragment).await;

        if let Some(queue) = inner.lock().queues.get_mut(&target_id) {
            queue.in_flight = None;
        }
        if let (Err(err), Some(on_error)) = (&outcome, &inner.options.on_error) {
            on_error(&pending.fragment, err);
        }
        let _ = pending.result_tx.send(outcome);
        inner.notify_settled();
    }
}

async fn deliver_one(inner: &Inner, fragment: &ReplyFragment) -> Result<DispatchResult> {
    #[cfg(feature = "metrics")]
    let start = std::time::Instant::now();

    let delivery = AssertUnwindSafe(inner.deliverer.deliver(fragment))
        .catch_unwind()
        .await;
    let outcome = match delivery {
        Ok(Ok(result)) => {
            debug!(
                target_id = %fragment.target_id,
                channel = %result.channel,
                message_id = %result.message_id,
                "reply fragment delivered"
            );
            Ok(result)
        },
        Ok(Err(e)) => {
            warn!(target_id = %fragment.target_id, error = %e, "reply fragment delivery failed");
            Err(DispatchError::delivery(&fragment.target_id, &e))
        },
        Err(panic) => {
            let err = DispatchError::panicked(&fragment.target_id, panic.as_ref());
            error!(target_id = %fragment.target_id, error = %err, "reply deliverer panicked");
            Err(err)
        },
    };

    #[cfg(feature = "metrics")]
    {
        histogram!(dispatch_metrics::DELIVERY_DURATION_SECONDS)
            .record(start.elapsed().as_secs_f64());
        match &outcome {
            Ok(_) => counter!(dispatch_metrics::FRAGMENTS_DELIVERED_TOTAL).increment(1),
            Err(e) => counter!(dispatch_metrics::FRAGMENTS_FAILED_TOTAL, labels::REASON => e.reason())
                .increment(1),
        }
    }

    outcome
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {
        super::*,
        std::{
            sync::atomic::{AtomicUsize, Ordering},
            time::Duration,
        },
        tokio::sync::Semaphore,
    };

    /// Records delivery order. Each delivery consumes one semaphore permit,
    /// except payloads starting with `free`.
    struct GatedDeliverer {
        gate: Semaphore,
        delivered: Mutex<Vec<String>>,
        active: Mutex<HashMap<String, usize>>,
        max_per_target: AtomicUsize,
    }

    impl GatedDeliverer {
        fn new(permits: usize) -> Arc<Self> {
            Arc::new(Self {
                gate: Semaphore::new(permits),
                delivered: Mutex::new(Vec::new()),
                active: Mutex::new(HashMap::new()),
                max_per_target: AtomicUsize::new(0),
            })
        }

        fn delivered(&self) -> Vec<String> {
            self.delivered.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl ReplyDeliverer for GatedDeliverer {
        async fn deliver(&self, fragment: &ReplyFragment) -> anyhow::Result<DispatchResult> {
            {
                let mut active = self.active.lock().unwrap();
                let n = active.entry(fragment.target_id.clone()).or_default();
                *n += 1;
                self.max_per_target.fetch_max(*n, Ordering::SeqCst);
            }
            if !fragment.payload.starts_with("free") {
                self.gate.acquire().await?.forget();
            }
            *self
                .active
                .lock()
                .unwrap()
                .get_mut(&fragment.target_id)
                .unwrap() -= 1;

            if fragment.payload == "boom" {
                anyhow::bail!("channel rejected message");
            }
            let mut delivered = self.delivered.lock().unwrap();
            delivered.push(fragment.payload.clone());
            Ok(DispatchResult {
                channel: "test".into(),
                message_id: format!("m{}", delivered.len()),
                timestamp: 1,
            })
        }
    }

    async fn within<F: Future>(fut: F) -> F::Output {
        tokio::time::timeout(Duration::from_secs(5), fut)
            .await
            .expect("timed out")
    }

    #[tokio::test]
    async fn preserves_order_per_target() {
        let deliverer = GatedDeliverer::new(100);
        let dispatcher = ReplyDispatcher::new(deliverer.clone(), DispatcherOptions::default());

        let receipts: Vec<_> = ["a1", "a2", "a3"]
            .into_iter()
            .map(|p| dispatcher.dispatch(ReplyFragment::text("a", p)).receipt().unwrap())
            .collect();
        for receipt in receipts {
            within(receipt).await.unwrap();
        }

        assert_eq!(deliverer.delivered(), vec!["a1", "a2", "a3"]);
        assert_eq!(deliverer.max_per_target.load(Ordering::SeqCst), 1);
        assert!(dispatcher.is_idle());
    }

    #[tokio::test]
    async fn targets_do_not_block_each_other() {
        let deliverer = GatedDeliverer::new(0);
        let dispatcher = ReplyDispatcher::new(deliverer.clone(), DispatcherOptions::default());

        let slow = dispatcher.dispatch(ReplyFragment::text("a", "slow")).receipt().unwrap();
        let fast = dispatcher.dispatch(ReplyFragment::text("b", "free")).receipt().unwrap();

        within(fast).await.unwrap();
        assert_eq!(deliverer.delivered(), vec!["free"]);
        assert_eq!(dispatcher.pending_count(), 1);

        deliverer.gate.add_permits(1);
        within(slow).await.unwrap();
        assert_eq!(deliverer.delivered(), vec!["free", "slow"]);
    }

    #[tokio::test]
    async fn wait_for_idle_ignores_later_fragments() {
        let deliverer = GatedDeliverer::new(0);
        let dispatcher = ReplyDispatcher::new(deliverer.clone(), DispatcherOptions::default());

        dispatcher.dispatch(ReplyFragment::text("a", "first"));
        let idle = dispatcher.wait_for_idle();
        dispatcher.dispatch(ReplyFragment::text("a", "second"));

        deliverer.gate.add_permits(1);
        within(idle).await;
        assert_eq!(deliverer.delivered(), vec!["first"]);
        assert_eq!(dispatcher.pending_count(), 1);

        deliverer.gate.add_permits(1);
        within(dispatcher.wait_for_idle()).await;
        assert!(dispatcher.is_idle());
    }

    #[tokio::test]
    async fn wait_for_idle_on_idle_dispatcher_returns_immediately() {
        let dispatcher = ReplyDispatcher::new(GatedDeliverer::new(0), DispatcherOptions::default());
        within(dispatcher.wait_for_idle()).await;
    }

    #[tokio::test]
    async fn failure_is_reported_and_queue_continues() {
        let deliverer = GatedDeliverer::new(100);
        let errors = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&errors);
        let options = DispatcherOptions {
            on_error: Some(Arc::new(move |fragment: &ReplyFragment, err: &DispatchError| {
                assert_eq!(fragment.payload, "boom");
                assert!(matches!(err, DispatchError::Delivery { .. }));
                seen.fetch_add(1, Ordering::SeqCst);
            })),
            ..Default::default()
        };
        let dispatcher = ReplyDispatcher::new(deliverer.clone(), options);

        let failed = dispatcher.dispatch(ReplyFragment::text("a", "boom")).receipt().unwrap();
        let ok = dispatcher.dispatch(ReplyFragment::text("a", "after")).receipt().unwrap();

        let err = within(failed).await.unwrap_err();
        assert!(err.to_string().contains("channel rejected message"));
        assert_eq!(within(ok).await.unwrap().message_id, "m1");
        assert_eq!(errors.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn skipped_fragments_never_reach_the_deliverer() {
        let deliverer = GatedDeliverer::new(100);
        let options = DispatcherOptions {
            response_prefix: Some("[bot]".into()),
            ..Default::default()
        };
        let dispatcher = ReplyDispatcher::new(deliverer.clone(), options);

        assert_eq!(
            dispatcher.dispatch(ReplyFragment::text("a", "  ")).skip_reason(),
            Some(SkipReason::Empty)
        );
        assert_eq!(
            dispatcher.dispatch(ReplyFragment::text("a", "NO_REPLY")).skip_reason(),
            Some(SkipReason::Silent)
        );
        let receipt = dispatcher.dispatch(ReplyFragment::text("a", "hi")).receipt().unwrap();
        within(receipt).await.unwrap();
        assert_eq!(deliverer.delivered(), vec!["[bot] hi"]);
    }

    #[tokio::test]
    async fn shutdown_drops_queued_and_finishes_in_flight() {
        let deliverer = GatedDeliverer::new(0);
        let dispatcher = ReplyDispatcher::new(deliverer.clone(), DispatcherOptions::default());

        let in_flight = dispatcher.dispatch(ReplyFragment::text("a", "one")).receipt().unwrap();
        let queued = dispatcher.dispatch(ReplyFragment::text("a", "two")).receipt().unwrap();
        // Let the worker pick up "one".
        while deliverer.active.lock().unwrap().get("a").copied() != Some(1) {
            tokio::task::yield_now().await;
        }

        dispatcher.shutdown();
        assert_eq!(within(queued).await.unwrap_err(), DispatchError::Closed);
        assert_eq!(
            dispatcher.dispatch(ReplyFragment::text("a", "three")).skip_reason(),
            Some(SkipReason::Closed)
        );

        deliverer.gate.add_permits(1);
        assert!(within(in_flight).await.is_ok());
        within(dispatcher.wait_for_idle()).await;
        assert_eq!(deliverer.delivered(), vec!["one"]);
    }

    #[tokio::test]
    async fn on_idle_fires_when_everything_drained() {
        let idles = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&idles);
        let options = DispatcherOptions {
            on_idle: Some(Arc::new(move || {
                seen.fetch_add(1, Ordering::SeqCst);
            })),
            ..Default::default()
        };
        let dispatcher = ReplyDispatcher::new(GatedDeliverer::new(100), options);

        let receipt = dispatcher.dispatch(ReplyFragment::text("a", "x")).receipt().unwrap();
        within(receipt).await.unwrap();
        within(async {
            while idles.load(Ordering::SeqCst) == 0 {
                tokio::task::yield_now().await;
            }
        })
        .await;
        assert_eq!(idles.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn dropped_receipt_does_not_cancel_delivery() {
        let deliverer = GatedDeliverer::new(100);
        let dispatcher = ReplyDispatcher::new(deliverer.clone(), DispatcherOptions::default());
        drop(dispatcher.dispatch(ReplyFragment::text("a", "fire-and-forget")));
        within(dispatcher.wait_for_idle()).await;
        assert_eq!(deliverer.delivered(), vec!["fire-and-forget"]);
    }

    /// Panics on its first delivery, then behaves.
    #[derive(Default)]
    struct FlakyDeliverer {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl ReplyDeliverer for FlakyDeliverer {
        async fn deliver(&self, fragment: &ReplyFragment) -> anyhow::Result<DispatchResult> {
            if self.calls.fetch_add(1, Ordering::SeqCst) == 0 {
                panic!("adapter bug");
            }
            Ok(DispatchResult {
                channel: "test".into(),
                message_id: fragment.payload.clone(),
                timestamp: 1,
            })
        }
    }

    #[tokio::test]
    async fn panicking_delivery_settles_and_queue_continues() {
        let deliverer = Arc::new(FlakyDeliverer::default());
        let errors = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&errors);
        let options = DispatcherOptions {
            on_error: Some(Arc::new(move |_: &ReplyFragment, err: &DispatchError| {
                assert_eq!(err.reason(), "panicked");
                seen.fetch_add(1, Ordering::SeqCst);
            })),
            ..Default::default()
        };
        let dispatcher = ReplyDispatcher::new(deliverer.clone(), options);

        let first = dispatcher.dispatch(ReplyFragment::text("a", "one")).receipt().unwrap();
        let second = dispatcher.dispatch(ReplyFragment::text("a", "two")).receipt().unwrap();

        let err = within(first).await.unwrap_err();
        assert_eq!(err, DispatchError::Panicked {
            target_id: "a".into(),
            message: "adapter bug".into(),
        });
        assert_eq!(within(second).await.unwrap().message_id, "two");
        within(dispatcher.wait_for_idle()).await;
        assert!(dispatcher.is_idle());
        assert_eq!(deliverer.calls.load(Ordering::SeqCst), 2);
        assert_eq!(errors.load(Ordering::SeqCst), 1);

        // The target still accepts work afterwards.
        let third = dispatcher.dispatch(ReplyFragment::text("a", "three")).receipt().unwrap();
        assert_eq!(within(third).await.unwrap().message_id, "three");
    }
}
