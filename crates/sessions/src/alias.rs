//! Main-session identity: which key is "the owner's conversation" and how it
//! is presented.

use {
    parley_config::{ParleyConfig, SessionScope},
    serde::{Deserialize, Serialize},
};

/// Main key used when `session.mainKey` is absent or blank.
pub const DEFAULT_MAIN_KEY: &str = "main";

/// Alias shared by every sender when `session.scope = "global"`.
pub const GLOBAL_ALIAS: &str = "global";

/// Presentation name of the main session.
pub const DISPLAY_MAIN_KEY: &str = "main";

/// Canonical main-session identity derived from one config load.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionDescriptor {
    pub main_key: String,
    pub alias: String,
    pub scope: SessionScope,
}

impl SessionDescriptor {
    /// Build a descriptor; `alias` is a pure function of `(main_key, scope)`.
    pub fn new(main_key: &str, scope: SessionScope) -> Self {
        let main_key = normalize_main_key(Some(main_key));
        let alias = match scope {
            SessionScope::Global => GLOBAL_ALIAS.to_string(),
            SessionScope::PerSender => main_key.clone(),
        };
        Self {
            main_key,
            alias,
            scope,
        }
    }

    /// True when `key` names the main session (either spelling).
    pub fn is_main(&self, key: &str) -> bool {
        key == self.alias || key == self.main_key
    }

    pub fn display_key<'a>(&self, key: &'a str) -> &'a str {
        resolve_display_session_key(key, &self.alias, &self.main_key)
    }

    pub fn internal_key<'a>(&'a self, key: &'a str) -> &'a str {
        resolve_internal_session_key(key, &self.alias)
    }
}

/// Trim and lower-case a configured main key, falling back to
/// [`DEFAULT_MAIN_KEY`] when blank.
pub fn normalize_main_key(raw: Option<&str>) -> String {
    match raw.map(str::trim) {
        Some(key) if !key.is_empty() => key.to_ascii_lowercase(),
        _ => DEFAULT_MAIN_KEY.to_string(),
    }
}

/// Read `session.mainKey` and `session.scope` into a [`SessionDescriptor`].
pub fn resolve_main_session_alias(cfg: &ParleyConfig) -> SessionDescriptor {
    let main_key = normalize_main_key(cfg.session.main_key.as_deref());
    let scope = cfg.session.scope.unwrap_or_default();
    SessionDescriptor::new(&main_key, scope)
}

/// Presentation form of a session key: `"main"` for the main session,
/// everything else unchanged. Never use the result for routing.
pub fn resolve_display_session_key<'a>(key: &'a str, alias: &str, main_key: &str) -> &'a str {
    if key == alias || key == main_key {
        DISPLAY_MAIN_KEY
    } else {
        key
    }
}

/// Inverse of [`resolve_display_session_key`]: `"main"` maps back to `alias`.
pub fn resolve_internal_session_key<'a>(key: &'a str, alias: &'a str) -> &'a str {
    if key == DISPLAY_MAIN_KEY { alias } else { key }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {super::*, parley_config::SessionConfig};

    fn config(main_key: Option<&str>, scope: Option<SessionScope>) -> ParleyConfig {
        ParleyConfig {
            session: SessionConfig {
                main_key: main_key.map(str::to_string),
                scope,
            },
            ..Default::default()
        }
    }

    #[test]
    fn owner_per_sender() {
        let d = resolve_main_session_alias(&config(Some("owner"), Some(SessionScope::PerSender)));
        assert_eq!(d, SessionDescriptor {
            main_key: "owner".into(),
            alias: "owner".into(),
            scope: SessionScope::PerSender,
        });
    }

    #[test]
    fn global_scope_uses_global_alias() {
        let d = resolve_main_session_alias(&config(Some("owner"), Some(SessionScope::Global)));
        assert_eq!(d.main_key, "owner");
        assert_eq!(d.alias, "global");
    }

    #[test]
    fn blank_main_key_falls_back_to_default() {
        for raw in [None, Some(""), Some("   ")] {
            let d = resolve_main_session_alias(&config(raw, None));
            assert_eq!(d.main_key, DEFAULT_MAIN_KEY);
            assert_eq!(d.alias, DEFAULT_MAIN_KEY);
            assert_eq!(d.scope, SessionScope::PerSender);
        }
    }

    #[test]
    fn main_key_is_trimmed_and_lowercased() {
        let d = resolve_main_session_alias(&config(Some("  Owner "), None));
        assert_eq!(d.main_key, "owner");
    }

    #[test]
    fn display_key_hides_alias_and_main_key() {
        let d = SessionDescriptor::new("owner", SessionScope::Global);
        assert_eq!(d.display_key("global"), "main");
        assert_eq!(d.display_key("owner"), "main");
        assert_eq!(d.display_key("telegram:group:-100"), "telegram:group:-100");
    }

    #[test]
    fn internal_key_maps_main_to_alias() {
        let d = SessionDescriptor::new("owner", SessionScope::Global);
        assert_eq!(d.internal_key("main"), "global");
        assert_eq!(d.internal_key("cron:daily"), "cron:daily");
    }

    #[test]
    fn display_then_internal_round_trips() {
        let d = SessionDescriptor::new("owner", SessionScope::PerSender);
        for key in ["owner", "cron:daily-digest", "hook:x", "acct:group:1", "", "Owner"] {
            assert_eq!(d.internal_key(d.display_key(key)), key);
        }
    }
}
