//! Typing indicators driven by the dispatcher's queue transitions.
//!
//! A target starts typing when its queue goes from idle to busy. When the
//! queue drains, the stop is held back for `idle_grace` so back-to-back
//! fragments don't flicker the indicator; [`ReplyDispatcherWithTyping::mark_dispatch_idle`]
//! ends the run and makes every stop immediate.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex, MutexGuard},
    time::Duration,
};

use {
    async_trait::async_trait,
    tokio::sync::mpsc,
    tracing::{debug, trace},
};

use crate::dispatcher::{DispatcherOptions, QueueObserver, ReplyDeliverer, ReplyDispatcher};

pub const DEFAULT_IDLE_GRACE: Duration = Duration::from_secs(2);

/// Channel-side typing indicator.
#[async_trait]
pub trait TypingIndicator: Send + Sync {
    async fn start_typing(&self, target_id: &str) -> anyhow::Result<()>;
    async fn stop_typing(&self, target_id: &str) -> anyhow::Result<()>;
}

#[derive(Debug, Clone, Copy)]
pub struct TypingOptions {
    pub idle_grace: Duration,
}

impl Default for TypingOptions {
    fn default() -> Self {
        Self {
            idle_grace: DEFAULT_IDLE_GRACE,
        }
    }
}

#[derive(Debug)]
enum TypingCommand {
    Start(String),
    Stop(String),
}

#[derive(Default)]
struct TargetTyping {
    /// Queue has work.
    active: bool,
    /// A start was sent without a matching stop.
    typing: bool,
    /// Changes on every transition; a pending grace stop only fires if it
    /// still matches.
    generation: u64,
}

#[derive(Default)]
struct TypingState {
    targets: HashMap<String, TargetTyping>,
    next_generation: u64,
    marked_idle: bool,
}

impl TypingState {
    fn bump(&mut self) -> u64 {
        self.next_generation += 1;
        self.next_generation
    }
}

/// Turns queue transitions into ordered start/stop commands.
struct TypingController {
    state: Arc<Mutex<TypingState>>,
    commands: mpsc::UnboundedSender<TypingCommand>,
    idle_grace: Duration,
}

fn lock(state: &Mutex<TypingState>) -> MutexGuard<'_, TypingState> {
    state.lock().unwrap_or_else(|e| e.into_inner())
}

impl TypingController {
    fn stop_now(
        commands: &mpsc::UnboundedSender<TypingCommand>,
        state: &mut TypingState,
        target_id: &str,
    ) {
        if let Some(target) = state.targets.remove(target_id)
            && target.typing
        {
            let _ = commands.send(TypingCommand::Stop(target_id.to_string()));
        }
    }

    fn mark_idle(&self) {
        let mut state = lock(&self.state);
        state.marked_idle = true;
        let idle: Vec<String> = state
            .targets
            .iter()
            .filter(|(_, t)| !t.active)
            .map(|(id, _)| id.clone())
            .collect();
        for target_id in idle {
            Self::stop_now(&self.commands, &mut state, &target_id);
        }
    }
}

impl QueueObserver for TypingController {
    fn on_active(&self, target_id: &str) {
        let mut state = lock(&self.state);
        let generation = state.bump();
        let target = state.targets.entry(target_id.to_string()).or_default();
        target.active = true;
        target.generation = generation;
        if !target.typing {
            target.typing = true;
            let _ = self
                .commands
                .send(TypingCommand::Start(target_id.to_string()));
        }
    }

    fn on_drained(&self, target_id: &str) {
        let mut state = lock(&self.state);
        if state.marked_idle {
            Self::stop_now(&self.commands, &mut state, target_id);
            return;
        }
        let generation = state.bump();
        let Some(target) = state.targets.get_mut(target_id) else {
            return;
        };
        target.active = false;
        target.generation = generation;

        let shared = Arc::clone(&self.state);
        let commands = self.commands.clone();
        let grace = self.idle_grace;
        let target_id = target_id.to_string();
        tokio::spawn(async move {
            tokio::time::sleep(grace).await;
            let mut state = lock(&shared);
            let still_idle = state
                .targets
                .get(&target_id)
                .is_some_and(|t| t.generation == generation && !t.active);
            if still_idle {
                Self::stop_now(&commands, &mut state, &target_id);
            }
        });
    }
}

/// Runs indicator calls one at a time, in transition order.
async fn run_indicator(
    indicator: Arc<dyn TypingIndicator>,
    mut commands: mpsc::UnboundedReceiver<TypingCommand>,
) {
    while let Some(command) = commands.recv().await {
        trace!(?command, "typing indicator");
        let result = match &command {
            TypingCommand::Start(target_id) => indicator.start_typing(target_id).await,
            TypingCommand::Stop(target_id) => indicator.stop_typing(target_id).await,
        };
        if let Err(e) = result {
            debug!(?command, error = %e, "typing indicator failed");
        }
    }
}

/// A dispatcher whose queues drive a typing indicator.
#[derive(Clone)]
pub struct ReplyDispatcherWithTyping {
    dispatcher: ReplyDispatcher,
    typing: Arc<TypingController>,
}

impl ReplyDispatcherWithTyping {
    pub fn dispatcher(&self) -> &ReplyDispatcher {
        &self.dispatcher
    }

    /// The run produced its last fragment: stop idle targets now and stop
    /// busy ones as soon as they drain.
    ///
    /// One-shot: the flag is never cleared, so every later drain on this
    /// dispatcher stops typing without the idle grace. Build a new
    /// dispatcher per agent run.
    pub fn mark_dispatch_idle(&self) {
        self.typing.mark_idle();
    }
}

/// Build a dispatcher that emits typing start/stop through `indicator`.
/// Must be called within a tokio runtime.
pub fn create_reply_dispatcher_with_typing(
    deliverer: Arc<dyn ReplyDeliverer>,
    indicator: Arc<dyn TypingIndicator>,
    options: DispatcherOptions,
    typing: TypingOptions,
) -> ReplyDispatcherWithTyping {
    let (tx, rx) = mpsc::unbounded_channel();
    tokio::spawn(run_indicator(indicator, rx));
    let controller = Arc::new(TypingController {
        state: Arc::new(Mutex::new(TypingState::default())),
        commands: tx,
        idle_grace: typing.idle_grace,
    });
    let observer: Arc<dyn QueueObserver> = controller.clone();
    ReplyDispatcherWithTyping {
        dispatcher: ReplyDispatcher::with_observer(deliverer, options, observer),
        typing: controller,
    }
}
