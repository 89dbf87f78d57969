use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::{env_subst::substitute_env, schema::ParleyConfig};

/// Standard config file names, checked in order.
const CONFIG_FILENAMES: &[&str] = &["parley.toml", "parley.yaml", "parley.yml", "parley.json"];

/// Load config from the given path (any supported format).
pub fn load_config(path: &Path) -> anyhow::Result<ParleyConfig> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow::anyhow!("failed to read {}: {e}", path.display()))?;
    let raw = substitute_env(&raw);
    parse_config(&raw, path)
}

/// Discover and load config from standard locations.
///
/// Search order:
/// 1. `./parley.{toml,yaml,yml,json}` (project-local)
/// 2. `~/.config/parley/parley.{toml,yaml,yml,json}` (user-global)
///
/// Never fails: a missing or unreadable file yields `ParleyConfig::default()`.
pub fn discover_and_load() -> ParleyConfig {
    let Some(path) = find_config_file() else {
        debug!("no config file found, using defaults");
        return ParleyConfig::default();
    };
    debug!(path = %path.display(), "loading config");
    load_config(&path).unwrap_or_else(|e| {
        warn!(path = %path.display(), error = %e, "failed to load config, using defaults");
        ParleyConfig::default()
    })
}

/// Returns the user-global config directory (`~/.config/parley/`).
pub fn config_dir() -> Option<PathBuf> {
    directories::ProjectDirs::from("", "", "parley").map(|d| d.config_dir().to_path_buf())
}

fn find_config_file() -> Option<PathBuf> {
    let local = CONFIG_FILENAMES.iter().map(PathBuf::from);
    let global = config_dir()
        .into_iter()
        .flat_map(|dir| CONFIG_FILENAMES.iter().map(move |name| dir.join(name)));
    local.chain(global).find(|p| p.exists())
}

/// Parse raw config text, picking the format from the file extension.
pub fn parse_config(raw: &str, path: &Path) -> anyhow::Result<ParleyConfig> {
    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("toml");

    match ext {
        "toml" => Ok(toml::from_str(raw)?),
        "yaml" | "yml" => Ok(serde_yaml::from_str(raw)?),
        "json" => Ok(serde_json::from_str(raw)?),
        _ => anyhow::bail!("unsupported config format: .{ext}"),
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {super::*, crate::schema::SessionScope};

    #[test]
    fn loads_toml_with_camel_case_keys() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("parley.toml");
        std::fs::write(
            &path,
            r#"
[session]
mainKey = "Owner"
scope = "per-sender"

[tools.sandbox.tools]
allow = ["file"]

[[agents.list]]
id = "ops"
tools.sandbox.tools.deny = ["image", "browser"]
"#,
        )
        .unwrap();

        let cfg = load_config(&path).unwrap();
        assert_eq!(cfg.session.main_key.as_deref(), Some("Owner"));
        assert_eq!(cfg.session.scope, Some(SessionScope::PerSender));
        assert_eq!(cfg.tools.sandbox.tools.allow, Some(vec!["file".to_string()]));
        let ops = cfg.agents.find("ops").unwrap();
        assert_eq!(
            ops.tools.sandbox.tools.deny,
            Some(vec!["image".to_string(), "browser".to_string()])
        );
        assert!(ops.tools.sandbox.tools.allow.is_none());
    }

    #[test]
    fn loads_yaml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("parley.yaml");
        std::fs::write(&path, "session:\n  scope: global\nchannels:\n  default: discord\n")
            .unwrap();

        let cfg = load_config(&path).unwrap();
        assert_eq!(cfg.session.scope, Some(SessionScope::Global));
        assert_eq!(cfg.channels.default.as_deref(), Some("discord"));
    }

    #[test]
    fn malformed_list_in_toml_does_not_fail_load() {
        let raw = "[tools.sandbox.tools]\nallow = \"exec\"\ndeny = [\"browser\"]\n";
        let cfg = parse_config(raw, Path::new("parley.toml")).unwrap();
        assert!(cfg.tools.sandbox.tools.allow.is_none());
        assert_eq!(cfg.tools.sandbox.tools.deny, Some(vec!["browser".to_string()]));
    }

    #[test]
    fn unsupported_extension_is_an_error() {
        let err = parse_config("", Path::new("parley.ini")).unwrap_err();
        assert!(err.to_string().contains(".ini"));
    }

    #[test]
    fn missing_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(load_config(&dir.path().join("nope.toml")).is_err());
    }
}
