//! Harness configuration.
//!
//! Every setting resolves the same way: explicit CLI flag, then environment
//! variable, then the optional JSON config file, then a default derived from
//! the user's directories.
use anyhow::{anyhow, Context, Result};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

/// Default tool command, matching a debug build in the hoard checkout.
pub const DEFAULT_HOARD_COMMAND: &str = "target/debug/hoard";
pub const HOARD_COMMAND_ENV: &str = "HOARD_COMMAND";
pub const CONFIG_DIR_ENV: &str = "HOARD_CONFIG_DIR";
pub const DATA_DIR_ENV: &str = "HOARD_DATA_DIR";
pub const TOOL_CONFIG_ENV: &str = "HOARD_TOOL_CONFIG";

/// On-disk shape of `--config`.
#[derive(Debug, Default, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct ConfigFile {
    pub hoard: Option<String>,
    pub home: Option<PathBuf>,
    pub config_dir: Option<PathBuf>,
    pub data_dir: Option<PathBuf>,
    pub tool_config: Option<PathBuf>,
}

impl ConfigFile {
    pub fn load(path: &Path) -> Result<Self> {
        let text =
            fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
        serde_json::from_str(&text).with_context(|| format!("parse {}", path.display()))
    }
}

/// Values supplied on the command line.
#[derive(Debug, Default, Clone)]
pub struct ConfigOverrides {
    pub hoard: Option<String>,
    pub home: Option<PathBuf>,
    pub config_dir: Option<PathBuf>,
    pub data_dir: Option<PathBuf>,
    pub tool_config: Option<PathBuf>,
}

/// The external tool as an argv prefix; the subcommand is appended per run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolCommand {
    pub program: PathBuf,
    pub args: Vec<String>,
}

impl ToolCommand {
    /// Split a shell-style command string and resolve bare program names on `PATH`.
    pub fn parse(command: &str) -> Result<Self> {
        let mut words = shell_words::split(command)
            .with_context(|| format!("parse hoard command: {command}"))?;
        if words.is_empty() {
            return Err(anyhow!("hoard command is empty"));
        }
        let program = words.remove(0);
        let program = if program.contains('/') {
            PathBuf::from(program)
        } else {
            which::which(&program).with_context(|| format!("locate {program} on PATH"))?
        };
        Ok(Self {
            program,
            args: words,
        })
    }
}

/// Fully resolved settings for one harness run.
#[derive(Debug, Clone)]
pub struct HarnessConfig {
    pub tool: ToolCommand,
    pub home: PathBuf,
    pub config_dir: PathBuf,
    pub data_dir: PathBuf,
    /// Copied to `<config_dir>/config.toml` on every reset.
    pub tool_config: Option<PathBuf>,
}

impl HarnessConfig {
    /// Resolve every setting. Unless `allow_user_dirs` is set, the home, config
    /// and data directories must all be given explicitly: `reset` deletes them.
    pub fn resolve(
        overrides: ConfigOverrides,
        file: Option<ConfigFile>,
        allow_user_dirs: bool,
    ) -> Result<Self> {
        Self::resolve_with(overrides, file, allow_user_dirs, |key| std::env::var(key).ok())
    }

    fn resolve_with(
        overrides: ConfigOverrides,
        file: Option<ConfigFile>,
        allow_user_dirs: bool,
        env: impl Fn(&str) -> Option<String>,
    ) -> Result<Self> {
        let file = file.unwrap_or_default();
        if !allow_user_dirs {
            ensure_isolated(&overrides, &file, &env)?;
        }

        let command = overrides
            .hoard
            .or_else(|| env(HOARD_COMMAND_ENV))
            .or(file.hoard)
            .unwrap_or_else(|| DEFAULT_HOARD_COMMAND.to_string());
        let tool = ToolCommand::parse(&command)?;

        let home = match overrides.home.or(file.home) {
            Some(home) => home,
            None => {
                dirs::home_dir().ok_or_else(|| anyhow!("cannot determine home directory"))?
            }
        };
        let config_dir = pick_path(overrides.config_dir, &env, CONFIG_DIR_ENV, file.config_dir);
        let config_dir = match config_dir {
            Some(dir) => dir,
            None => dirs::config_dir()
                .ok_or_else(|| anyhow!("cannot determine config directory"))?
                .join("hoard"),
        };
        let data_dir = match pick_path(overrides.data_dir, &env, DATA_DIR_ENV, file.data_dir) {
            Some(dir) => dir,
            None => dirs::data_dir()
                .ok_or_else(|| anyhow!("cannot determine data directory"))?
                .join("hoard"),
        };
        let tool_config =
            pick_path(overrides.tool_config, &env, TOOL_CONFIG_ENV, file.tool_config);

        Ok(Self {
            tool,
            home,
            config_dir,
            data_dir,
            tool_config,
        })
    }

    /// Environment variables the tool needs to agree with the harness on paths.
    pub fn tool_env(&self) -> BTreeMap<String, String> {
        let mut env = BTreeMap::new();
        env.insert("HOME".to_string(), self.home.display().to_string());
        env.insert(
            CONFIG_DIR_ENV.to_string(),
            self.config_dir.display().to_string(),
        );
        env.insert(DATA_DIR_ENV.to_string(), self.data_dir.display().to_string());
        env
    }
}

/// Refuse to fall back to the user's own directories.
fn ensure_isolated(
    overrides: &ConfigOverrides,
    file: &ConfigFile,
    env: &impl Fn(&str) -> Option<String>,
) -> Result<()> {
    let from_env = |key: &str| env(key).is_some_and(|value| !value.is_empty());
    let checks = [
        (
            "--home".to_string(),
            overrides.home.is_some() || file.home.is_some(),
        ),
        (
            format!("--config-dir (or {CONFIG_DIR_ENV})"),
            overrides.config_dir.is_some() || file.config_dir.is_some() || from_env(CONFIG_DIR_ENV),
        ),
        (
            format!("--data-dir (or {DATA_DIR_ENV})"),
            overrides.data_dir.is_some() || file.data_dir.is_some() || from_env(DATA_DIR_ENV),
        ),
    ];
    let missing: Vec<String> = checks
        .into_iter()
        .filter(|(_, given)| !given)
        .map(|(setting, _)| setting)
        .collect();
    if missing.is_empty() {
        return Ok(());
    }
    Err(anyhow!(
        "refusing to reset the user's own hoard directories outside CI; set {}",
        missing.join(", ")
    ))
}

fn pick_path(
    explicit: Option<PathBuf>,
    env: &impl Fn(&str) -> Option<String>,
    key: &str,
    file: Option<PathBuf>,
) -> Option<PathBuf> {
    explicit
        .or_else(|| env(key).filter(|v| !v.is_empty()).map(PathBuf::from))
        .or(file)
}
