use std::{collections::HashMap, sync::Arc};

use tracing::debug;

use crate::{
    error::{Error, Result},
    payload::ToolResult,
    plugin::{ActionRequest, ChannelActionPlugin},
};

/// Registry of channel action plugins, keyed by channel id.
#[derive(Default)]
pub struct ChannelActionRegistry {
    plugins: HashMap<String, Arc<dyn ChannelActionPlugin>>,
}

impl ChannelActionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a plugin; replaces any plugin with the same channel id.
    pub fn register(&mut self, plugin: Arc<dyn ChannelActionPlugin>) {
        let id = plugin.id().trim().to_ascii_lowercase();
        self.plugins.insert(id, plugin);
    }

    pub fn get(&self, channel: &str) -> Option<&Arc<dyn ChannelActionPlugin>> {
        self.plugins.get(channel)
    }

    pub fn list(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = self.plugins.keys().map(String::as_str).collect();
        ids.sort_unstable();
        ids
    }

    /// Offer `request` to the plugin of its channel.
    ///
    /// Returns `Ok(None)` when no plugin is registered, the plugin doesn't
    /// support the action, or it declines.
    pub async fn dispatch_action(&self, request: &ActionRequest) -> Result<Option<ToolResult>> {
        let Some(plugin) = self.plugins.get(&request.channel) else {
            return Ok(None);
        };
        if !plugin.actions().contains(&request.action) {
            debug!(
                channel = %request.channel,
                action = %request.action,
                "channel plugin does not handle action"
            );
            return Ok(None);
        }
        plugin.handle_action(request).await.map_err(|e| {
            Error::collaborator(format!("{} plugin {}", request.channel, request.action), e)
        })
    }
}
