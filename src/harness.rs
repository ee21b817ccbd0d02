//! Primitives for driving hoard as a subprocess and editing its inputs.
//!
//! The harness never looks inside hoard's managed storage. It edits the
//! staging files hoard backs up, rotates the identity file, and leaves log
//! inspection to [`crate::oplog`].
use crate::config::HarnessConfig;
use crate::error::ToolInvocationError;
use crate::roles::{self, Environment, HoardFile, DIR_ROLE_ENTRIES};
use crate::util::random_bytes;
use anyhow::{anyhow, Context, Result};
use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Instant;

/// Size of the random content seeded into every staging file on reset.
pub const SEED_CONTENT_BYTES: usize = 32;
/// File name of the device identity inside the config directory.
pub const UUID_FILE_NAME: &str = "uuid";
/// Name the tool config is installed under inside the config directory.
pub const TOOL_CONFIG_FILE_NAME: &str = "config.toml";

/// Per-run settings that vary between scenario steps.
///
/// `force` adds `--force` ahead of the subcommand; `env` is laid over the
/// resolved tool environment.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Invocation {
    pub force: bool,
    pub env: BTreeMap<String, String>,
}

impl Invocation {
    /// Overlay that pins the tool to one simulated machine.
    pub fn for_environment(env: Environment) -> Self {
        let mut overlay = BTreeMap::new();
        overlay.insert("USE_ENV".to_string(), env.selector().to_string());
        Self {
            force: false,
            env: overlay,
        }
    }

    pub fn with_force(self, force: bool) -> Self {
        Self { force, ..self }
    }
}

pub struct Harness {
    config: HarnessConfig,
}

impl Harness {
    pub fn new(config: HarnessConfig) -> Self {
        Self { config }
    }

    pub fn data_dir(&self) -> &Path {
        &self.config.data_dir
    }

    pub fn config_dir(&self) -> &Path {
        &self.config.config_dir
    }

    pub fn home(&self) -> &Path {
        &self.config.home
    }

    /// Remove everything a previous run left behind and seed fresh staging files.
    pub fn reset(&self) -> Result<()> {
        remove_if_exists(&self.config.data_dir)?;
        remove_if_exists(&self.config.config_dir)?;
        for path in roles::all_staging_paths(&self.config.home) {
            remove_if_exists(&path)?;
        }

        fs::create_dir_all(&self.config.config_dir)
            .with_context(|| format!("create {}", self.config.config_dir.display()))?;
        if let Some(tool_config) = &self.config.tool_config {
            let dest = self.config.config_dir.join(TOOL_CONFIG_FILE_NAME);
            fs::copy(tool_config, &dest).with_context(|| {
                format!("install {} as {}", tool_config.display(), dest.display())
            })?;
        }
        self.seed_staging_files()?;
        tracing::debug!(home = %self.config.home.display(), "reset simulation state");
        Ok(())
    }

    fn seed_staging_files(&self) -> Result<()> {
        fs::create_dir_all(&self.config.home)
            .with_context(|| format!("create {}", self.config.home.display()))?;
        for env in Environment::ALL {
            for file in HoardFile::ALL {
                let path = roles::staging_path(&self.config.home, env, file);
                if file.is_dir() {
                    fs::create_dir_all(&path)
                        .with_context(|| format!("create {}", path.display()))?;
                    for name in DIR_ROLE_ENTRIES {
                        write_bytes(&path.join(name), &random_bytes(SEED_CONTENT_BYTES))?;
                    }
                } else {
                    write_bytes(&path, &random_bytes(SEED_CONTENT_BYTES))?;
                }
            }
        }
        Ok(())
    }

    /// Run `hoard [--force] <subcommand>` and wait for it to exit.
    ///
    /// The outer `Result` carries harness faults such as a binary that cannot
    /// be spawned. The inner `Err` is the tool refusing the run: any non-zero
    /// exit, or death by signal with `code: None`.
    pub fn run_hoard(
        &self,
        subcommand: &str,
        invocation: &Invocation,
    ) -> Result<Result<(), ToolInvocationError>> {
        let tool = &self.config.tool;
        let mut cmd = Command::new(&tool.program);
        cmd.args(&tool.args);
        if invocation.force {
            cmd.arg("--force");
        }
        cmd.arg(subcommand);
        for (key, value) in self.config.tool_env() {
            cmd.env(key, value);
        }
        for (key, value) in &invocation.env {
            cmd.env(key, value);
        }

        let start = Instant::now();
        let status = cmd
            .status()
            .with_context(|| format!("spawn {}", tool.program.display()))?;
        tracing::info!(
            subcommand,
            force = invocation.force,
            elapsed_ms = start.elapsed().as_millis() as u64,
            exit_code = status.code(),
            "hoard run complete"
        );

        if status.success() {
            Ok(Ok(()))
        } else {
            Ok(Err(ToolInvocationError {
                code: status.code(),
            }))
        }
    }

    /// Flush filesystem buffers so the tool's writes are visible to reads that follow.
    pub fn sync(&self) -> Result<()> {
        let status = Command::new("sync").status().context("spawn sync")?;
        if !status.success() {
            return Err(anyhow!("sync exited with {status}"));
        }
        Ok(())
    }

    pub fn staging_path(&self, env: Environment, file: HoardFile) -> PathBuf {
        roles::staging_path(&self.config.home, env, file)
    }

    pub fn read_hoard_file(&self, env: Environment, file: HoardFile) -> Result<Vec<u8>> {
        let path = self.staging_path(env, file);
        fs::read(&path).with_context(|| format!("read {}", path.display()))
    }

    /// Overwrite a staging file. The parent directory must already exist.
    pub fn write_hoard_file(
        &self,
        env: Environment,
        file: HoardFile,
        content: &[u8],
    ) -> Result<()> {
        write_bytes(&self.staging_path(env, file), content)
    }

    pub fn uuid_path(&self) -> PathBuf {
        self.config.config_dir.join(UUID_FILE_NAME)
    }

    /// The identity hoard will use on its next run.
    pub fn uuid(&self) -> Result<String> {
        let path = self.uuid_path();
        let text =
            fs::read_to_string(&path).with_context(|| format!("read {}", path.display()))?;
        Ok(text.trim().to_string())
    }

    /// Make hoard act as a previously seen machine.
    pub fn set_uuid(&self, uuid: &str) -> Result<()> {
        write_bytes(&self.uuid_path(), uuid.as_bytes())
    }

    /// Delete the identity file so the next run generates a new one.
    pub fn remove_uuid(&self) -> Result<()> {
        let path = self.uuid_path();
        fs::remove_file(&path).with_context(|| format!("remove {}", path.display()))
    }
}

fn write_bytes(path: &Path, bytes: &[u8]) -> Result<()> {
    fs::write(path, bytes).with_context(|| format!("write {}", path.display()))
}

fn remove_if_exists(path: &Path) -> Result<()> {
    let meta = match fs::symlink_metadata(path) {
        Ok(meta) => meta,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(()),
        Err(err) => return Err(err).with_context(|| format!("stat {}", path.display())),
    };
    let result = if meta.is_dir() {
        fs::remove_dir_all(path)
    } else {
        fs::remove_file(path)
    };
    result.with_context(|| format!("remove {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ToolCommand;
    use tempfile::TempDir;

    /// Tool backed by a shell script run through `/bin/sh`.
    fn harness_with_tool(temp: &TempDir, body: &str) -> Harness {
        let root = temp.path();
        let script = root.join("tool.sh");
        fs::write(&script, format!("{body}\n")).expect("write script");
        Harness::new(HarnessConfig {
            tool: ToolCommand {
                program: PathBuf::from("/bin/sh"),
                args: vec![script.display().to_string()],
            },
            home: root.join("home"),
            config_dir: root.join("config"),
            data_dir: root.join("data"),
            tool_config: None,
        })
    }

    #[test]
    fn reset_is_idempotent_and_seeds_every_role() {
        let temp = tempfile::tempdir().expect("tempdir");
        let harness = harness_with_tool(&temp, "exit 0");
        harness.reset().expect("first reset");
        fs::create_dir_all(harness.data_dir().join("history")).expect("mkdir data");
        harness.reset().expect("second reset");

        assert!(!harness.data_dir().exists());
        assert!(harness.config_dir().is_dir());
        for env in Environment::ALL {
            for file in HoardFile::ALL {
                let path = harness.staging_path(env, file);
                if file.is_dir() {
                    for name in DIR_ROLE_ENTRIES {
                        let len = fs::metadata(path.join(name)).expect("seeded").len();
                        assert_eq!(len, SEED_CONTENT_BYTES as u64);
                    }
                } else {
                    let content = harness.read_hoard_file(env, file).expect("read");
                    assert_eq!(content.len(), SEED_CONTENT_BYTES);
                }
            }
        }
    }

    #[test]
    fn reset_installs_tool_config() {
        let temp = tempfile::tempdir().expect("tempdir");
        let mut harness = harness_with_tool(&temp, "exit 0");
        let tool_config = temp.path().join("hoard.toml");
        fs::write(&tool_config, "exclusivity = []\n").expect("write config");
        harness.config.tool_config = Some(tool_config);
        harness.reset().expect("reset");
        let installed =
            fs::read_to_string(harness.config_dir().join(TOOL_CONFIG_FILE_NAME)).expect("read");
        assert_eq!(installed, "exclusivity = []\n");
    }

    #[test]
    fn run_hoard_maps_exit_status() {
        let temp = tempfile::tempdir().expect("tempdir");
        let harness = harness_with_tool(
            &temp,
            r#"if [ "$1" = "--force" ]; then exit 0; fi
exit 3"#,
        );
        let refused = harness
            .run_hoard("backup", &Invocation::default())
            .expect("spawn");
        assert_eq!(refused, Err(ToolInvocationError { code: Some(3) }));

        let forced = harness
            .run_hoard("backup", &Invocation::default().with_force(true))
            .expect("spawn");
        assert_eq!(forced, Ok(()));
    }

    #[test]
    fn run_hoard_applies_env_overlay_and_subcommand() {
        let temp = tempfile::tempdir().expect("tempdir");
        let out = temp.path().join("seen");
        let harness = harness_with_tool(
            &temp,
            &format!("echo \"$USE_ENV $1\" > {}", out.display()),
        );
        harness
            .run_hoard("backup", &Invocation::for_environment(Environment::Second))
            .expect("spawn")
            .expect("tool succeeds");
        let seen = fs::read_to_string(&out).expect("read marker");
        assert_eq!(seen.trim(), "2 backup");
    }

    #[test]
    fn run_hoard_treats_signal_death_as_refusal() {
        let temp = tempfile::tempdir().expect("tempdir");
        let harness = harness_with_tool(&temp, "kill -9 $$");
        let verdict = harness
            .run_hoard("backup", &Invocation::default())
            .expect("spawn");
        assert_eq!(verdict, Err(ToolInvocationError { code: None }));
    }

    #[test]
    fn sync_flushes_successfully() {
        let temp = tempfile::tempdir().expect("tempdir");
        let harness = harness_with_tool(&temp, "exit 0");
        harness.sync().expect("sync");
    }

    #[test]
    fn missing_tool_is_a_harness_fault() {
        let temp = tempfile::tempdir().expect("tempdir");
        let mut harness = harness_with_tool(&temp, "exit 0");
        harness.config.tool.program = temp.path().join("does-not-exist");
        assert!(harness.run_hoard("backup", &Invocation::default()).is_err());
    }

    #[test]
    fn write_requires_existing_parent() {
        let temp = tempfile::tempdir().expect("tempdir");
        let harness = harness_with_tool(&temp, "exit 0");
        let err = harness
            .write_hoard_file(Environment::First, HoardFile::AnonFile, b"data")
            .unwrap_err();
        let io_err = err.downcast_ref::<io::Error>().expect("io error");
        assert_eq!(io_err.kind(), io::ErrorKind::NotFound);
    }

    #[test]
    fn uuid_round_trips_through_identity_file() {
        let temp = tempfile::tempdir().expect("tempdir");
        let harness = harness_with_tool(&temp, "exit 0");
        harness.reset().expect("reset");
        harness.set_uuid("abc-123").expect("set uuid");
        fs::write(harness.uuid_path(), "abc-123\n").expect("write with newline");
        assert_eq!(harness.uuid().expect("read uuid"), "abc-123");
        harness.remove_uuid().expect("remove uuid");
        assert!(harness.uuid().is_err());
    }
}
