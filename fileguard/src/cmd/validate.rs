use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use fileguard::settings::GuardSettings;
use fileguard::style;
use fileguard_policy::io::read_config_from_path;
use fileguard_policy::{
    CompiledMatcher, ConfigError, EngineOptions, Merge, PolicyEngine, ProtectionConfig,
    ProtectionLevel,
};
use serde::Serialize;
use tracing::{Level, instrument};

#[derive(Debug, Serialize)]
struct ConfigReport {
    path: PathBuf,
    /// `ok`, `missing` (built-in defaults apply) or `invalid`.
    status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    hint: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    levels: Vec<LevelReport>,
}

#[derive(Debug, Serialize)]
struct LevelReport {
    level: ProtectionLevel,
    patterns: usize,
}

#[derive(Debug, Serialize)]
struct AgentReport {
    agent: String,
    #[serde(flatten)]
    config: ConfigReport,
}

#[derive(Debug, Serialize)]
struct ValidateReport {
    install_dir: PathBuf,
    fail_open: bool,
    base: ConfigReport,
    agents: Vec<AgentReport>,
    self_protection: Vec<String>,
    /// Set when the engine could not start for a reason outside the config
    /// files, such as an unusable install directory.
    #[serde(skip_serializing_if = "Option::is_none")]
    engine_error: Option<String>,
}

impl ValidateReport {
    fn is_valid(&self) -> bool {
        self.engine_error.is_none()
            && self.base.status != "invalid"
            && self.agents.iter().all(|a| a.config.status != "invalid")
    }
}

/// Check the base config and every agent override without evaluating any
/// tool call. Fails when anything would put the guard in its config-error
/// state.
#[instrument(level = Level::TRACE)]
pub fn run(settings_path: Option<&Path>, json_output: bool) -> Result<()> {
    let settings = GuardSettings::load(settings_path)?;
    let options = settings.engine_options()?;
    let report = build_report(&options);

    if json_output {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_report(&report);
    }

    if report.is_valid() {
        return Ok(());
    }
    // Re-check to surface the typed error, and its hint, through display_error.
    let config_path = options.config_path();
    let base = match check(&config_path, None, &options) {
        Ok(config) => config,
        Err(e) if e.is_not_found() => ProtectionConfig::defaults(),
        Err(e) => {
            return Err(e).with_context(|| {
                format!("protection config {} is invalid", config_path.display())
            });
        }
    };
    for (agent, path) in &options.agent_overrides {
        if let Err(e) = check(path, Some(&base), &options)
            && !e.is_not_found()
        {
            return Err(e).with_context(|| format!("override for agent '{}' is invalid", agent));
        }
    }
    match report.engine_error {
        Some(error) => bail!("guard cannot start: {}", error),
        None => bail!("protection config is invalid"),
    }
}

/// Loads and compiles `path`, merged onto `base` for overrides.
fn check(
    path: &Path,
    base: Option<&ProtectionConfig>,
    options: &EngineOptions,
) -> fileguard_policy::Result<ProtectionConfig> {
    let config = read_config_from_path(path)?;
    let effective = match base {
        Some(base) => base.merge(&config),
        None => config.clone(),
    };
    CompiledMatcher::compile(&effective, options.match_options)?;
    Ok(config)
}

fn config_report(path: &Path, result: fileguard_policy::Result<ProtectionConfig>) -> ConfigReport {
    let mut report = ConfigReport {
        path: path.to_path_buf(),
        status: "ok",
        error: None,
        hint: None,
        levels: Vec::new(),
    };
    match result {
        Ok(config) => {
            report.levels = ProtectionLevel::ALL
                .into_iter()
                .map(|level| LevelReport {
                    level,
                    patterns: config.patterns(level).len(),
                })
                .collect();
        }
        Err(ConfigError::NotFound(_)) => report.status = "missing",
        Err(e) => {
            report.status = "invalid";
            report.hint = e.help();
            report.error = Some(e.to_string());
        }
    }
    report
}

fn build_report(options: &EngineOptions) -> ValidateReport {
    let config_path = options.config_path();
    let base_result = check(&config_path, None, options);
    let base_config = match &base_result {
        Ok(config) => config.clone(),
        Err(_) => ProtectionConfig::defaults(),
    };
    let base = config_report(&config_path, base_result);

    let agents = options
        .agent_overrides
        .iter()
        .map(|(agent, path)| AgentReport {
            agent: agent.clone(),
            config: config_report(path, check(path, Some(&base_config), options)),
        })
        .collect();

    let engine = PolicyEngine::load(options);
    let engine_error = match base.status {
        "invalid" => None,
        _ => engine.config_error(None).map(str::to_string),
    };
    ValidateReport {
        install_dir: options.install_dir.clone(),
        fail_open: options.fail_open,
        base,
        agents,
        self_protection: engine.self_protection().patterns().to_vec(),
        engine_error,
    }
}

fn print_status(report: &ConfigReport) {
    let status = match report.status {
        "ok" => style::green_bold("ok"),
        "missing" => style::yellow("missing, using built-in defaults"),
        other => style::red_bold(other),
    };
    println!("  {}   {}", style::cyan("path:"), report.path.display());
    println!("  {} {}", style::cyan("status:"), status);
    for level in &report.levels {
        println!(
            "    {:10} {} pattern(s)",
            style::level(level.level.as_str()),
            level.patterns
        );
    }
    if let Some(error) = &report.error {
        println!("  {}  {}", style::cyan("error:"), error);
    }
    if let Some(hint) = &report.hint {
        println!("  {}   {}", style::cyan("hint:"), style::dim(hint));
    }
}

fn print_report(report: &ValidateReport) {
    println!("{}", style::header("Protection config:"));
    print_status(&report.base);
    if report.fail_open {
        println!("  {}", style::yellow("failOpen is set: errors allow tool calls"));
    }
    println!();

    if !report.agents.is_empty() {
        println!("{}", style::header("Agent overrides:"));
        for agent in &report.agents {
            println!("  {}", style::bold(&agent.agent));
            print_status(&agent.config);
        }
        println!();
    }

    if let Some(error) = &report.engine_error {
        println!("{}", style::header("Engine:"));
        println!("  {}", style::red_bold(error));
        println!();
    }

    println!("{}", style::header("Self-protection:"));
    println!("  {} {}", style::cyan("install dir:"), report.install_dir.display());
    for pattern in &report.self_protection {
        println!("    {}", pattern);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn options(dir: &Path) -> EngineOptions {
        EngineOptions::new(dir.join("install"))
    }

    #[test]
    fn test_missing_config_is_valid() {
        let dir = tempfile::tempdir().unwrap();
        let report = build_report(&options(dir.path()));
        assert_eq!(report.base.status, "missing");
        assert!(report.is_valid());
        assert!(report.self_protection.iter().any(|p| p.ends_with("install/**")));
    }

    #[test]
    fn test_counts_patterns_per_level() {
        let dir = tempfile::tempdir().unwrap();
        let opts = options(dir.path());
        std::fs::create_dir_all(&opts.install_dir).unwrap();
        std::fs::write(
            opts.config_path(),
            r#"{"protection_levels": {"no_access": {"patterns": ["**/.env", "**/*.pem"]}}}"#,
        )
        .unwrap();
        let report = build_report(&opts);
        assert_eq!(report.base.status, "ok");
        assert_eq!(report.base.levels[0].patterns, 2);
        assert_eq!(report.base.levels[1].patterns, 0);
    }

    #[test]
    fn test_invalid_override_reported_with_hint() {
        let dir = tempfile::tempdir().unwrap();
        let mut opts = options(dir.path());
        let override_path = dir.path().join("builder.json");
        std::fs::write(&override_path, "{ not json").unwrap();
        opts.agent_overrides
            .insert("builder".into(), override_path.clone());

        let report = build_report(&opts);
        assert!(!report.is_valid());
        let agent = &report.agents[0];
        assert_eq!(agent.agent, "builder");
        assert_eq!(agent.config.status, "invalid");
        assert!(agent.config.hint.is_some());
    }
}
