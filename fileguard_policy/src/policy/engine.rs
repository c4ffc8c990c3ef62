//! Engine construction: loading the base config, agent overrides and the
//! self-protection set, and deciding what happens when a config is broken.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

use tracing::{Level, debug, error, info, instrument, warn};

use super::compile::{CompiledMatcher, MatchOptions, SelfProtection};
use crate::error::{ConfigError, Result};
use crate::io::read_config_from_path;
use crate::merge::Merge;
use crate::paths::PathResolver;
use crate::types::ProtectionConfig;

/// Inputs for [`PolicyEngine::load`].
#[derive(Debug, Clone)]
pub struct EngineOptions {
    /// Base protection config. Defaults to `<install_dir>/config.json`.
    pub config_path: Option<PathBuf>,
    /// The guard's own directory; always self-protected.
    pub install_dir: PathBuf,
    pub fail_open: bool,
    /// Agent id to supplemental config file.
    pub agent_overrides: BTreeMap<String, PathBuf>,
    pub match_options: MatchOptions,
    /// Home directory for `~` expansion; `None` uses the real one.
    pub home: Option<PathBuf>,
}

impl EngineOptions {
    pub fn new(install_dir: impl Into<PathBuf>) -> Self {
        Self {
            config_path: None,
            install_dir: install_dir.into(),
            fail_open: false,
            agent_overrides: BTreeMap::new(),
            match_options: MatchOptions::default(),
            home: None,
        }
    }

    /// The base config path that will be loaded.
    pub fn config_path(&self) -> PathBuf {
        self.config_path
            .clone()
            .unwrap_or_else(|| self.install_dir.join("config.json"))
    }
}

/// Matchers for one agent, or the reason there are none.
#[derive(Debug, Clone)]
pub(crate) enum MatcherState {
    Ready(CompiledMatcher),
    /// Every request under this state is blocked.
    ConfigError(String),
}

/// The file-access policy engine.
///
/// Built once at startup; immutable afterwards.
#[derive(Debug, Clone)]
pub struct PolicyEngine {
    resolver: PathResolver,
    base_config: ProtectionConfig,
    base: MatcherState,
    agents: HashMap<String, MatcherState>,
    self_protection: SelfProtection,
    match_options: MatchOptions,
}

impl PolicyEngine {
    /// Loads the engine from disk.
    ///
    /// Never fails. A missing base config means the built-in defaults. A
    /// malformed one means defaults with `fail_open`, and a config-error
    /// engine that blocks everything without it. Agent overrides are handled
    /// the same way, per agent, except that a missing override file is only
    /// a warning.
    #[instrument(level = Level::TRACE)]
    pub fn load(options: &EngineOptions) -> Self {
        let config_path = options.config_path();
        let resolver = match &options.home {
            Some(home) => PathResolver::new().with_home(home),
            None => PathResolver::new(),
        };

        let self_protection = match SelfProtection::new(
            &options.install_dir,
            std::iter::once(config_path.clone()).chain(options.agent_overrides.values().cloned()),
            options.match_options,
        ) {
            Ok(sp) => sp,
            Err(e) => {
                // Nothing could be guaranteed about the guard's own files.
                error!(error = %e, "failed to build self-protection set; blocking all requests");
                return Self {
                    resolver,
                    base_config: ProtectionConfig::defaults(),
                    base: MatcherState::ConfigError(e.to_string()),
                    agents: HashMap::new(),
                    self_protection: SelfProtection::default(),
                    match_options: options.match_options,
                };
            }
        };

        let (base_config, base) = load_base(&config_path, options);
        let mut engine = Self {
            resolver,
            base_config,
            base,
            agents: HashMap::new(),
            self_protection,
            match_options: options.match_options,
        };

        if matches!(engine.base, MatcherState::ConfigError(_)) {
            return engine;
        }

        for (agent, path) in &options.agent_overrides {
            match read_config_from_path(path).and_then(|cfg| engine.compile_override(&cfg)) {
                Ok(matcher) => {
                    info!(agent = %agent, path = %path.display(), "loaded agent override");
                    engine
                        .agents
                        .insert(agent.clone(), MatcherState::Ready(matcher));
                }
                Err(ConfigError::NotFound(_)) => {
                    warn!(agent = %agent, path = %path.display(), "agent override file not found; using base config");
                }
                Err(e) if options.fail_open => {
                    warn!(agent = %agent, error = %e, "ignoring malformed agent override (fail-open)");
                }
                Err(e) => {
                    error!(agent = %agent, error = %e, "malformed agent override; blocking this agent");
                    engine
                        .agents
                        .insert(agent.clone(), MatcherState::ConfigError(e.to_string()));
                }
            }
        }

        engine
    }

    /// Builds an engine from an in-memory config with an empty
    /// self-protection set.
    pub fn from_config(config: ProtectionConfig, match_options: MatchOptions) -> Result<Self> {
        let matcher = CompiledMatcher::compile(&config, match_options)?;
        Ok(Self {
            resolver: PathResolver::new(),
            base_config: config,
            base: MatcherState::Ready(matcher),
            agents: HashMap::new(),
            self_protection: SelfProtection::default(),
            match_options,
        })
    }

    /// Registers `config` as a supplement to the base config for `agent`.
    pub fn with_agent_override(
        mut self,
        agent: impl Into<String>,
        config: &ProtectionConfig,
    ) -> Result<Self> {
        let matcher = self.compile_override(config)?;
        self.agents
            .insert(agent.into(), MatcherState::Ready(matcher));
        Ok(self)
    }

    /// The config error that blocks requests for `agent`, if any.
    pub fn config_error(&self, agent: Option<&str>) -> Option<&str> {
        match self.state_for(agent) {
            MatcherState::ConfigError(message) => Some(message),
            MatcherState::Ready(_) => None,
        }
    }

    /// The compiled matcher in effect for `agent`.
    pub fn matcher(&self, agent: Option<&str>) -> Option<&CompiledMatcher> {
        match self.state_for(agent) {
            MatcherState::Ready(matcher) => Some(matcher),
            MatcherState::ConfigError(_) => None,
        }
    }

    /// Agent ids with a registered override, sorted.
    pub fn agents(&self) -> Vec<&str> {
        let mut agents: Vec<&str> = self.agents.keys().map(String::as_str).collect();
        agents.sort_unstable();
        agents
    }

    pub fn self_protection(&self) -> &SelfProtection {
        &self.self_protection
    }

    pub(crate) fn resolver(&self) -> &PathResolver {
        &self.resolver
    }

    /// A base config error overrides everything; otherwise the agent's own
    /// state, falling back to the base matchers.
    pub(crate) fn state_for(&self, agent: Option<&str>) -> &MatcherState {
        if matches!(self.base, MatcherState::ConfigError(_)) {
            return &self.base;
        }
        agent
            .and_then(|id| self.agents.get(id))
            .unwrap_or(&self.base)
    }

    fn compile_override(&self, config: &ProtectionConfig) -> Result<CompiledMatcher> {
        CompiledMatcher::compile(&self.base_config.merge(config), self.match_options)
    }
}

fn load_base(path: &Path, options: &EngineOptions) -> (ProtectionConfig, MatcherState) {
    let loaded = read_config_from_path(path).and_then(|config| {
        let matcher = CompiledMatcher::compile(&config, options.match_options)?;
        Ok((config, matcher))
    });

    match loaded {
        Ok((config, matcher)) => {
            debug!(path = %path.display(), patterns = config.pattern_count(), "loaded protection config");
            (config, MatcherState::Ready(matcher))
        }
        Err(ConfigError::NotFound(_)) => {
            debug!(path = %path.display(), "no protection config; using built-in defaults");
            defaults(options)
        }
        Err(e) if options.fail_open => {
            warn!(error = %e, "malformed protection config; using built-in defaults (fail-open)");
            defaults(options)
        }
        Err(e) => {
            error!(error = %e, "malformed protection config; blocking all requests until fixed");
            (ProtectionConfig::defaults(), MatcherState::ConfigError(e.to_string()))
        }
    }
}

fn defaults(options: &EngineOptions) -> (ProtectionConfig, MatcherState) {
    let config = ProtectionConfig::defaults();
    match CompiledMatcher::compile(&config, options.match_options) {
        Ok(matcher) => (config, MatcherState::Ready(matcher)),
        Err(e) => (config, MatcherState::ConfigError(e.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::{BlockLevel, FileOperationRequest, ToolKind};
    use crate::types::{LevelConfig, ProtectionLevel};
    use serde_json::{Value, json};
    use std::fs;

    fn request(tool: ToolKind, agent: Option<&str>, params: Value) -> FileOperationRequest {
        FileOperationRequest {
            tool,
            agent_id: agent.map(str::to_string),
            cwd: PathBuf::from("/project"),
            params,
        }
    }

    fn read(path: &str) -> FileOperationRequest {
        request(ToolKind::Read, None, json!({ "file_path": path }))
    }

    fn write(path: &str) -> FileOperationRequest {
        request(ToolKind::Write, None, json!({ "file_path": path }))
    }

    fn exec(command: &str) -> FileOperationRequest {
        request(ToolKind::Exec, None, json!({ "command": command }))
    }

    fn engine(config: ProtectionConfig) -> PolicyEngine {
        PolicyEngine::from_config(config, MatchOptions::default()).unwrap()
    }

    fn blocked_level(engine: &PolicyEngine, req: &FileOperationRequest) -> Option<BlockLevel> {
        engine.evaluate(req).unwrap().block().map(|b| b.level)
    }

    fn options(dir: &Path) -> EngineOptions {
        let mut options = EngineOptions::new(dir.join("install"));
        options.home = Some(dir.join("home"));
        options
    }

    #[test]
    fn test_read_of_no_access_is_blocked() {
        let engine = engine(
            ProtectionConfig::new()
                .with_level(ProtectionLevel::NoAccess, LevelConfig::new(["**/.env"])),
        );
        let verdict = engine.evaluate(&read(".env")).unwrap();
        let block = verdict.block().unwrap();
        assert_eq!(block.level, BlockLevel::Protection(ProtectionLevel::NoAccess));
        assert!(block.reason.contains("no_access"));
        assert_eq!(block.pattern.as_deref(), Some("**/.env"));
    }

    #[test]
    fn test_read_only_blocks_write_not_read() {
        let engine = engine(ProtectionConfig::defaults());
        assert_eq!(
            blocked_level(&engine, &write("package-lock.json")),
            Some(BlockLevel::Protection(ProtectionLevel::ReadOnly))
        );
        assert_eq!(blocked_level(&engine, &read("package-lock.json")), None);
    }

    #[test]
    fn test_no_delete_only_blocks_shell_deletes() {
        let engine = engine(
            ProtectionConfig::new()
                .with_level(ProtectionLevel::NoDelete, LevelConfig::new(["**/LICENSE"])),
        );
        assert_eq!(
            blocked_level(&engine, &exec("rm LICENSE")),
            Some(BlockLevel::Protection(ProtectionLevel::NoDelete))
        );
        let edit = request(ToolKind::Edit, None, json!({ "file_path": "LICENSE" }));
        assert_eq!(blocked_level(&engine, &edit), None);
        assert_eq!(blocked_level(&engine, &exec("cat LICENSE")), None);
        assert_eq!(blocked_level(&engine, &exec("echo x > LICENSE")), None);
    }

    #[test]
    fn test_shell_read_of_secret_is_blocked() {
        let engine = engine(ProtectionConfig::defaults());
        let verdict = engine.evaluate(&exec("cat .env")).unwrap();
        let block = verdict.block().unwrap();
        assert_eq!(block.level, BlockLevel::Protection(ProtectionLevel::NoAccess));
        assert_eq!(block.path.as_deref(), Some(".env"));
    }

    #[test]
    fn test_sed_in_place_on_read_only_is_blocked() {
        let engine = engine(
            ProtectionConfig::new()
                .with_level(ProtectionLevel::ReadOnly, LevelConfig::new(["**/config.yaml"])),
        );
        let verdict = engine.evaluate(&exec("sed -i 's/a/b/' config.yaml")).unwrap();
        let block = verdict.block().unwrap();
        assert_eq!(block.level, BlockLevel::Protection(ProtectionLevel::ReadOnly));
        assert_eq!(block.operation, Some(crate::types::Operation::Write));
        assert_eq!(blocked_level(&engine, &exec("sed 's/a/b/' config.yaml")), None);
    }

    #[test]
    fn test_agent_override_is_a_union() {
        let base = ProtectionConfig::new()
            .with_level(ProtectionLevel::NoAccess, LevelConfig::new(["**/.env"]));
        let search = ProtectionConfig::new().with_level(
            ProtectionLevel::NoAccess,
            LevelConfig::new(["**/internal-docs/**"]),
        );
        let engine = engine(base).with_agent_override("search", &search).unwrap();

        let docs = json!({ "file_path": "internal-docs/secret.md" });
        let env = json!({ "file_path": ".env" });
        assert!(
            engine
                .evaluate(&request(ToolKind::Read, Some("search"), docs.clone()))
                .unwrap()
                .is_block()
        );
        assert!(!engine.evaluate(&request(ToolKind::Read, None, docs.clone())).unwrap().is_block());
        assert!(!engine.evaluate(&request(ToolKind::Read, Some("other"), docs)).unwrap().is_block());
        assert!(engine.evaluate(&request(ToolKind::Read, Some("search"), env.clone())).unwrap().is_block());
        assert!(engine.evaluate(&request(ToolKind::Read, None, env)).unwrap().is_block());
    }

    #[test]
    fn test_self_protection_blocks_writes_not_reads() {
        let dir = tempfile::tempdir().unwrap();
        let engine = PolicyEngine::load(&options(dir.path()));
        let config = dir.path().join("install/config.json").to_string_lossy().into_owned();

        let verdict = engine.evaluate(&write(&config)).unwrap();
        let block = verdict.block().unwrap();
        assert_eq!(block.level, BlockLevel::SelfProtection);
        assert!(block.reason.contains("self-protection"));

        let edit = request(ToolKind::Edit, None, json!({ "file_path": config }));
        assert!(engine.evaluate(&edit).unwrap().is_block());
        assert!(!engine.evaluate(&read(&config)).unwrap().is_block());
        assert!(
            engine
                .evaluate(&exec(&format!("rm -rf {}", dir.path().join("install").display())))
                .unwrap()
                .is_block()
        );
    }

    #[test]
    fn test_self_protection_survives_agent_override() {
        let dir = tempfile::tempdir().unwrap();
        let override_path = dir.path().join("agent.json");
        fs::write(&override_path, r#"{"protection_levels": {}}"#).unwrap();
        let mut opts = options(dir.path());
        opts.agent_overrides.insert("writer".into(), override_path.clone());
        let engine = PolicyEngine::load(&opts);

        let target = dir.path().join("install/settings.json");
        let req = request(
            ToolKind::Write,
            Some("writer"),
            json!({ "file_path": target.to_string_lossy() }),
        );
        assert_eq!(blocked_level(&engine, &req), Some(BlockLevel::SelfProtection));

        // Override files are themselves protected.
        let req = request(
            ToolKind::Write,
            Some("writer"),
            json!({ "file_path": override_path.to_string_lossy() }),
        );
        assert_eq!(blocked_level(&engine, &req), Some(BlockLevel::SelfProtection));
    }

    #[test]
    fn test_malformed_config_fail_closed_blocks_everything() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("install")).unwrap();
        fs::write(dir.path().join("install/config.json"), "{ nope").unwrap();
        let engine = PolicyEngine::load(&options(dir.path()));

        assert!(engine.config_error(None).is_some());
        for req in [read("src/main.rs"), write("notes.txt"), exec("ls")] {
            let verdict = engine.evaluate(&req).unwrap();
            let block = verdict.block().unwrap();
            assert_eq!(block.level, BlockLevel::ConfigError);
            assert!(block.reason.contains("config"));
        }
        // Requests the engine could not even parse are still config errors.
        let req = request(ToolKind::Read, None, json!({}));
        assert_eq!(blocked_level(&engine, &req), Some(BlockLevel::ConfigError));
    }

    #[test]
    fn test_malformed_config_fail_open_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("install")).unwrap();
        fs::write(dir.path().join("install/config.json"), r#"{"levels": {}}"#).unwrap();
        let mut opts = options(dir.path());
        opts.fail_open = true;
        let engine = PolicyEngine::load(&opts);

        assert!(engine.config_error(None).is_none());
        assert!(engine.evaluate(&read(".env")).unwrap().is_block());
        assert!(!engine.evaluate(&read("src/main.rs")).unwrap().is_block());
    }

    #[test]
    fn test_missing_config_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let engine = PolicyEngine::load(&options(dir.path()));
        assert!(engine.config_error(None).is_none());
        assert_eq!(
            engine.matcher(None).unwrap().levels().len(),
            ProtectionLevel::ALL.len()
        );
        assert!(engine.evaluate(&read(".env")).unwrap().is_block());
    }

    #[test]
    fn test_config_file_loaded() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("custom.json");
        fs::write(
            &path,
            r#"{"protection_levels": {"no_access": {"patterns": ["**/*.secret"]}}}"#,
        )
        .unwrap();
        let mut opts = options(dir.path());
        opts.config_path = Some(path);
        let engine = PolicyEngine::load(&opts);

        assert!(engine.evaluate(&read("db.secret")).unwrap().is_block());
        assert!(!engine.evaluate(&read(".env")).unwrap().is_block());
    }

    #[test]
    fn test_invalid_glob_is_malformed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("custom.json");
        fs::write(
            &path,
            r#"{"protection_levels": {"no_access": {"patterns": ["**/{a,b"]}}}"#,
        )
        .unwrap();
        let mut opts = options(dir.path());
        opts.config_path = Some(path);
        let engine = PolicyEngine::load(&opts);
        assert!(engine.config_error(None).unwrap().contains("{a,b"));
    }

    #[test]
    fn test_agent_override_errors() {
        let dir = tempfile::tempdir().unwrap();
        let broken = dir.path().join("broken.json");
        fs::write(&broken, "[]").unwrap();
        let mut opts = options(dir.path());
        opts.agent_overrides.insert("broken".into(), broken);
        opts.agent_overrides
            .insert("ghost".into(), dir.path().join("missing.json"));

        let engine = PolicyEngine::load(&opts);
        assert!(engine.config_error(Some("broken")).is_some());
        assert!(engine.config_error(Some("ghost")).is_none());
        assert!(engine.config_error(None).is_none());
        assert_eq!(engine.agents(), ["broken"]);
        let req = request(ToolKind::Read, Some("broken"), json!({"file_path": "a.txt"}));
        assert_eq!(blocked_level(&engine, &req), Some(BlockLevel::ConfigError));

        opts.fail_open = true;
        let engine = PolicyEngine::load(&opts);
        assert!(engine.config_error(Some("broken")).is_none());
        assert!(engine.agents().is_empty());
    }

    #[test]
    fn test_evaluation_is_deterministic() {
        let engine = engine(ProtectionConfig::defaults());
        let req = exec("cp .env /tmp/x; rm -rf .git/HEAD");
        let first = engine.evaluate(&req).unwrap();
        for _ in 0..3 {
            assert_eq!(engine.evaluate(&req).unwrap(), first);
        }
    }

    #[test]
    fn test_missing_param_is_an_error() {
        let engine = engine(ProtectionConfig::defaults());
        let err = engine
            .evaluate(&request(ToolKind::Write, None, json!({"content": "x"})))
            .unwrap_err();
        assert!(err.help().is_some());
    }
}
