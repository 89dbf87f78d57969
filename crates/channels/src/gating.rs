use {
    parley_common::glob::glob_match,
    parley_config::ChannelConfig,
    serde::{Deserialize, Serialize},
};

/// Group entry that applies to every group of a channel.
pub const WILDCARD_GROUP: &str = "*";

/// Whether `peer_id` passes a channel's `allowFrom` list.
///
/// An empty list lets everyone through. Entries match case-insensitively and
/// may contain `*` wildcards.
pub fn is_allowed(peer_id: &str, allowlist: &[String]) -> bool {
    let peer = peer_id.to_lowercase();
    allowlist.is_empty()
        || allowlist
            .iter()
            .any(|pattern| glob_match(&pattern.to_lowercase(), &peer))
}

/// Which value wins when both config and a caller override set
/// `requireMention`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RequireMentionOrder {
    /// The override wins over config.
    #[default]
    BeforeConfig,
    /// Config wins; the override only fills in when config is silent.
    AfterConfig,
}

/// `requireMention` configured for `group_id`: the group's own entry, then
/// the `"*"` entry.
pub fn configured_require_mention(channel: &ChannelConfig, group_id: &str) -> Option<bool> {
    channel
        .groups
        .get(group_id)
        .and_then(|g| g.require_mention)
        .or_else(|| {
            channel
                .groups
                .get(WILDCARD_GROUP)
                .and_then(|g| g.require_mention)
        })
}

/// Combine the configured value and an override. Mention is required when
/// neither says otherwise.
pub fn resolve_require_mention(
    config_value: Option<bool>,
    override_value: Option<bool>,
    order: RequireMentionOrder,
) -> bool {
    let resolved = match order {
        RequireMentionOrder::BeforeConfig => override_value.or(config_value),
        RequireMentionOrder::AfterConfig => config_value.or(override_value),
    };
    resolved.unwrap_or(true)
}

/// Facts about one inbound group message.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MentionGatingInput {
    pub require_mention: bool,
    /// False when the channel can't tell whether the bot was mentioned.
    pub can_detect_mention: bool,
    pub was_mentioned: bool,
    /// E.g. a reply to one of the bot's own messages.
    pub implicit_mention: bool,
    /// E.g. an authorized control command.
    pub bypass: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MentionGating {
    pub effective_was_mentioned: bool,
    pub should_skip: bool,
}

pub fn resolve_mention_gating(input: MentionGatingInput) -> MentionGating {
    let effective_was_mentioned = input.was_mentioned || input.implicit_mention || input.bypass;
    MentionGating {
        effective_was_mentioned,
        should_skip: input.require_mention && input.can_detect_mention && !effective_was_mentioned,
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {super::*, rstest::rstest, serde_json::json};

    #[test]
    fn empty_allowlist_allows_everyone() {
        assert!(is_allowed("anyone", &[]));
    }

    #[test]
    fn exact_match() {
        let list = vec!["alice".into(), "bob".into()];
        assert!(is_allowed("alice", &list));
        assert!(is_allowed("Alice", &list));
        assert!(!is_allowed("charlie", &list));
    }

    #[test]
    fn glob_patterns() {
        let list = vec!["admin_*".into(), "*@example.com".into()];
        assert!(is_allowed("admin_alice", &list));
        assert!(is_allowed("User@Example.com", &list));
        assert!(!is_allowed("user_bob", &list));
    }

    #[rstest]
    #[case(None, None, RequireMentionOrder::BeforeConfig, true)]
    #[case(None, None, RequireMentionOrder::AfterConfig, true)]
    #[case(Some(true), Some(false), RequireMentionOrder::BeforeConfig, false)]
    #[case(Some(true), Some(false), RequireMentionOrder::AfterConfig, true)]
    #[case(None, Some(false), RequireMentionOrder::AfterConfig, false)]
    #[case(Some(false), None, RequireMentionOrder::BeforeConfig, false)]
    fn require_mention_order(
        #[case] config_value: Option<bool>,
        #[case] override_value: Option<bool>,
        #[case] order: RequireMentionOrder,
        #[case] expected: bool,
    ) {
        assert_eq!(
            resolve_require_mention(config_value, override_value, order),
            expected
        );
    }

    #[test]
    fn group_entry_then_wildcard() {
        let channel: ChannelConfig = serde_json::from_value(json!({
            "groups": {
                "*": { "requireMention": false },
                "-100": { "requireMention": true },
                "-200": {}
            }
        }))
        .unwrap();
        assert_eq!(configured_require_mention(&channel, "-100"), Some(true));
        assert_eq!(configured_require_mention(&channel, "-200"), Some(false));
        assert_eq!(configured_require_mention(&channel, "-300"), Some(false));
        assert_eq!(
            configured_require_mention(&ChannelConfig::default(), "-100"),
            None
        );
    }

    #[rstest]
    #[case(true, true, false, false, false, true)]
    #[case(true, true, true, false, false, false)]
    #[case(true, true, false, true, false, false)]
    #[case(true, true, false, false, true, false)]
    #[case(true, false, false, false, false, false)]
    #[case(false, true, false, false, false, false)]
    fn mention_gating(
        #[case] require_mention: bool,
        #[case] can_detect_mention: bool,
        #[case] was_mentioned: bool,
        #[case] implicit_mention: bool,
        #[case] bypass: bool,
        #[case] should_skip: bool,
    ) {
        let gating = resolve_mention_gating(MentionGatingInput {
            require_mention,
            can_detect_mention,
            was_mentioned,
            implicit_mention,
            bypass,
        });
        assert_eq!(gating.should_skip, should_skip);
        assert_eq!(
            gating.effective_was_mentioned,
            was_mentioned || implicit_mention || bypass
        );
    }
}
