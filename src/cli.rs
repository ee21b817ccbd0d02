//! CLI argument parsing for the harness driver.
use crate::config::ConfigOverrides;
use crate::scenarios::Scenario;
use clap::Parser;
use std::path::PathBuf;

/// Root CLI entrypoint.
#[derive(Parser, Debug)]
#[command(
    name = "hoard-harness",
    version,
    about = "Multi-machine consistency checks for the hoard backup tool",
    after_help = "Outside CI, --home, --config-dir and --data-dir must all be set: reset deletes them.\n\nExamples:\n  hoard-harness operation   (in CI)\n  hoard-harness --hoard ./target/debug/hoard --tool-config ci-tests/config.toml all\n  RUST_LOG=debug hoard-harness --home /tmp/sim/home --config-dir /tmp/sim/config --data-dir /tmp/sim/data operation"
)]
pub struct RootArgs {
    /// Scenario to run
    #[arg(value_enum)]
    pub scenario: Scenario,

    /// JSON file with default settings
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Command used to invoke hoard (split like a shell would)
    #[arg(long, value_name = "CMD")]
    pub hoard: Option<String>,

    /// Directory holding the simulated machines' staging files
    #[arg(long, value_name = "DIR")]
    pub home: Option<PathBuf>,

    /// hoard's config directory (holds the uuid file)
    #[arg(long, value_name = "DIR")]
    pub config_dir: Option<PathBuf>,

    /// hoard's data directory (holds the operation logs)
    #[arg(long, value_name = "DIR")]
    pub data_dir: Option<PathBuf>,

    /// hoard config file installed into the config directory on reset
    #[arg(long, value_name = "FILE")]
    pub tool_config: Option<PathBuf>,

    /// Default log filter when RUST_LOG is unset
    #[arg(long, value_name = "LEVEL", default_value = "info")]
    pub log_level: String,

    /// Refuse to run outside GitHub Actions, even with explicit directories
    #[arg(long)]
    pub require_ci: bool,
}

impl RootArgs {
    pub fn overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            hoard: self.hoard.clone(),
            home: self.home.clone(),
            config_dir: self.config_dir.clone(),
            data_dir: self.data_dir.clone(),
            tool_config: self.tool_config.clone(),
        }
    }
}
