//! Plugin settings.
//!
//! Loaded with figment, lowest precedence first:
//!
//! 1. built-in defaults
//! 2. the JSON settings file (`~/.fileguard/settings.json`, or `--settings`)
//! 3. `FILEGUARD_*` environment variables (`FILEGUARD_FAIL_OPEN=true`,
//!    `FILEGUARD_AUDIT__ENABLED=true`)

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use figment::Figment;
use figment::providers::{Env, Format, Json, Serialized};
use fileguard_policy::{ConfigError, EngineOptions, MatchOptions, PathResolver};
use serde::{Deserialize, Serialize};
use tracing::{Level, debug, instrument};

use crate::audit::AuditConfig;

/// Settings for one agent's supplemental protection config.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentOverrideSettings {
    pub config_path: PathBuf,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GuardSettings {
    /// Base protection config. Relative paths are resolved against the
    /// install directory.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config_path: Option<PathBuf>,

    /// Allow tool calls when the config is malformed or evaluation fails.
    #[serde(default)]
    pub fail_open: bool,

    /// Log one line per blocked call.
    #[serde(default = "default_true")]
    pub log_blocks: bool,

    #[serde(default)]
    pub agent_overrides: BTreeMap<String, AgentOverrideSettings>,

    /// Defaults to the host platform's usual filesystem behavior.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub case_insensitive: Option<bool>,

    /// Defaults to `~/.fileguard`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub install_dir: Option<PathBuf>,

    #[serde(default)]
    pub audit: AuditConfig,
}

fn default_true() -> bool {
    true
}

impl Default for GuardSettings {
    fn default() -> Self {
        Self {
            config_path: None,
            fail_open: false,
            log_blocks: true,
            agent_overrides: BTreeMap::new(),
            case_insensitive: None,
            install_dir: None,
            audit: AuditConfig::default(),
        }
    }
}

impl GuardSettings {
    /// `~/.fileguard`.
    pub fn settings_dir() -> Result<PathBuf> {
        let home = dirs::home_dir().ok_or(ConfigError::NoHomeDirectory)?;
        Ok(home.join(".fileguard"))
    }

    pub fn settings_file() -> Result<PathBuf> {
        Ok(Self::settings_dir()?.join("settings.json"))
    }

    /// Loads settings from `path`, or from the default settings file when it
    /// exists. An explicit path must exist.
    #[instrument(level = Level::TRACE)]
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let file = match path {
            Some(path) if !path.exists() => {
                bail!("settings file {} does not exist", path.display())
            }
            Some(path) => Some(path.to_path_buf()),
            None => Self::settings_file().ok().filter(|p| p.exists()),
        };
        Self::figment(file.as_deref())
            .extract()
            .with_context(|| match &file {
                Some(file) => format!("invalid settings in {}", file.display()),
                None => "invalid settings in environment".to_string(),
            })
    }

    /// The provider chain, exposed so callers can layer more on top.
    pub fn figment(file: Option<&Path>) -> Figment {
        let mut figment = Figment::from(Serialized::defaults(GuardSettings::default()));
        if let Some(file) = file {
            debug!(path = %file.display(), "merging settings file");
            figment = figment.merge(Json::file(file));
        }
        // `map` resets the provider to lowercase keys, so this must come last.
        figment.merge(
            Env::prefixed("FILEGUARD_")
                .map(|key| env_key(key.as_str()).into())
                .lowercase(false),
        )
    }

    /// The guard's own directory.
    pub fn install_dir(&self) -> Result<PathBuf> {
        match &self.install_dir {
            Some(dir) => Ok(PathResolver::new().expand_home(&dir.to_string_lossy())),
            None => Self::settings_dir(),
        }
    }

    /// Resolves a configured path: `~` is expanded and relative paths are
    /// taken relative to the install directory.
    fn resolve(&self, path: &Path) -> Result<PathBuf> {
        let expanded = PathResolver::new().expand_home(&path.to_string_lossy());
        if expanded.is_absolute() {
            Ok(expanded)
        } else {
            Ok(self.install_dir()?.join(expanded))
        }
    }

    /// The base protection config path.
    pub fn config_path(&self) -> Result<PathBuf> {
        match &self.config_path {
            Some(path) => self.resolve(path),
            None => Ok(self.install_dir()?.join("config.json")),
        }
    }

    pub fn match_options(&self) -> MatchOptions {
        match self.case_insensitive {
            Some(case_insensitive) => MatchOptions { case_insensitive },
            None => MatchOptions::default(),
        }
    }

    /// Engine construction options derived from these settings.
    pub fn engine_options(&self) -> Result<EngineOptions> {
        let mut options = EngineOptions::new(self.install_dir()?);
        options.config_path = Some(self.config_path()?);
        options.fail_open = self.fail_open;
        options.match_options = self.match_options();
        for (agent, over) in &self.agent_overrides {
            options
                .agent_overrides
                .insert(agent.clone(), self.resolve(&over.config_path)?);
        }
        Ok(options)
    }
}

/// `FAIL_OPEN` -> `failOpen`, `AUDIT__ENABLED` -> `audit.enabled`.
fn env_key(raw: &str) -> String {
    raw.split("__")
        .map(|part| {
            let mut out = String::with_capacity(part.len());
            let mut upper = false;
            for c in part.chars() {
                if c == '_' {
                    upper = true;
                } else if upper {
                    out.extend(c.to_uppercase());
                    upper = false;
                } else {
                    out.extend(c.to_lowercase());
                }
            }
            out
        })
        .collect::<Vec<_>>()
        .join(".")
}
