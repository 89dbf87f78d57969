use std::sync::Arc;

use tokio::sync::RwLock;

use {
    parley_channels::{OutboundSendService, RequireMentionOrder, ThreadStarterCache},
    parley_common::events::HeartbeatEvents,
    parley_config::ParleyConfig,
    parley_sessions::{SessionDescriptor, resolve_main_session_alias},
    parley_tools::{ToolGroupRegistry, ToolGroups},
    tracing::info,
};

/// Gateway-scoped state shared by inbound routing and reply delivery.
///
/// Passed around explicitly as `Arc<GatewayState>`.
pub struct GatewayState {
    /// Current config snapshot; replaced wholesale on reload.
    config: RwLock<Arc<ParleyConfig>>,
    /// Main-session identity derived from `config`.
    descriptor: RwLock<SessionDescriptor>,
    /// Heartbeat outcome listeners.
    pub heartbeat: HeartbeatEvents,
    pub tool_groups: Arc<dyn ToolGroups>,
    pub outbound: Arc<OutboundSendService>,
    /// Whether an adapter's `requireMention` override beats config.
    pub mention_order: RequireMentionOrder,
    /// First message seen per thread, keyed by `channel:account:thread`.
    pub thread_starters: ThreadStarterCache,
}

impl GatewayState {
    pub fn new(config: ParleyConfig, outbound: OutboundSendService) -> Arc<Self> {
        Self::with_tool_groups(config, outbound, Arc::new(ToolGroupRegistry::builtin()))
    }

    pub fn with_tool_groups(
        config: ParleyConfig,
        outbound: OutboundSendService,
        tool_groups: Arc<dyn ToolGroups>,
    ) -> Arc<Self> {
        Self::with_mention_order(config, outbound, tool_groups, RequireMentionOrder::default())
    }

    pub fn with_mention_order(
        config: ParleyConfig,
        outbound: OutboundSendService,
        tool_groups: Arc<dyn ToolGroups>,
        mention_order: RequireMentionOrder,
    ) -> Arc<Self> {
        let descriptor = resolve_main_session_alias(&config);
        Arc::new(Self {
            config: RwLock::new(Arc::new(config)),
            descriptor: RwLock::new(descriptor),
            heartbeat: HeartbeatEvents::new(),
            tool_groups,
            outbound: Arc::new(outbound),
            mention_order,
            thread_starters: ThreadStarterCache::default(),
        })
    }

    pub async fn config(&self) -> Arc<ParleyConfig> {
        Arc::clone(&*self.config.read().await)
    }

    pub async fn descriptor(&self) -> SessionDescriptor {
        self.descriptor.read().await.clone()
    }

    /// Swap in a new config and recompute the main-session identity.
    pub async fn reload(&self, config: ParleyConfig) {
        let descriptor = resolve_main_session_alias(&config);
        let mut current_config = self.config.write().await;
        let mut current_descriptor = self.descriptor.write().await;
        if *current_descriptor != descriptor {
            info!(
                main_key = %descriptor.main_key,
                alias = %descriptor.alias,
                scope = descriptor.scope.as_str(),
                "main session changed on reload"
            );
        }
        *current_config = Arc::new(config);
        *current_descriptor = descriptor;
    }
}
