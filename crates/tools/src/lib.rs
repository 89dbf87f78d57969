//! Tool names, tool groups and sandbox tool policy.
//!
//! Policy: allow/deny lists resolved per agent, falling back to the global
//! sandbox config and then to compiled-in defaults. Deny always wins.

pub mod groups;
pub mod policy;

pub use {
    groups::{ToolGroupRegistry, ToolGroups, normalize_tool_name},
    policy::{
        DEFAULT_SANDBOX_ALLOW, DEFAULT_SANDBOX_DENY, PolicyOrigin, PolicySource, PolicySources,
        SandboxToolPolicy, ToolPolicy, is_tool_allowed, resolve_sandbox_tool_policy_for_agent,
    },
};
