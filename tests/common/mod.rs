//! Shared test infrastructure for integration tests.

use std::env;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};
use tempfile::TempDir;

fn manifest_dir() -> PathBuf {
    PathBuf::from(env::var("CARGO_MANIFEST_DIR").unwrap_or_else(|_| ".".into()))
}

/// A throwaway machine layout plus the mock hoard command that uses it.
pub struct Simulation {
    temp_dir: TempDir,
    hoard_command: String,
}

impl Simulation {
    /// Build a simulation, or `None` when the mock's prerequisites are missing.
    pub fn new() -> Option<Self> {
        let bash = which::which("bash").ok();
        let md5sum = which::which("md5sum").ok();
        let Some(bash) = bash.filter(|_| md5sum.is_some()) else {
            eprintln!("Skipping: bash and md5sum are required for the mock hoard");
            return None;
        };
        let script = manifest_dir().join("tests/mock-hoard.sh");
        let hoard_command = shell_words::join([
            bash.display().to_string(),
            script.display().to_string(),
        ]);
        let temp_dir = TempDir::new().expect("create temp dir");
        Some(Self {
            temp_dir,
            hoard_command,
        })
    }

    pub fn root(&self) -> &Path {
        self.temp_dir.path()
    }

    pub fn data_dir(&self) -> PathBuf {
        self.root().join("data")
    }

    /// Run the harness binary on `scenario` with extra environment for the mock.
    pub fn run(&self, scenario: &str, mock_env: &[(&str, &str)]) -> Output {
        let root = self.root();
        let mut cmd = Command::new(env!("CARGO_BIN_EXE_hoard-harness"));
        cmd.arg("--hoard")
            .arg(&self.hoard_command)
            .arg("--home")
            .arg(root.join("home"))
            .arg("--config-dir")
            .arg(root.join("config"))
            .arg("--data-dir")
            .arg(self.data_dir())
            .arg(scenario)
            .env_remove("RUST_LOG")
            .env_remove("MOCK_HOARD_IGNORE_CONFLICTS")
            .env_remove("MOCK_HOARD_FIXED_UUID")
            .env_remove("MOCK_HOARD_STALE_LOG")
            .env_remove("MOCK_HOARD_IGNORE_FORCE");
        for (key, value) in mock_env {
            cmd.env(key, value);
        }
        cmd.output().expect("run hoard-harness")
    }
}

pub fn text(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).into_owned()
}
