//! Configuration schema and loading.
//!
//! Config files: `parley.toml`, `parley.yaml` or `parley.json`,
//! searched in `./` then `~/.config/parley/`.
//!
//! Supports `${ENV_VAR}` and `${ENV_VAR:-fallback}` substitution before parsing.

pub mod env_subst;
pub mod loader;
pub mod schema;

pub use {
    loader::{config_dir, discover_and_load, load_config, parse_config},
    schema::{
        AgentConfig, AgentsConfig, ChannelConfig, ChannelsConfig, GroupConfig, ParleyConfig,
        SessionConfig, SessionScope, ToolPolicyConfig, ToolsConfig, normalize_agent_id,
    },
};
