//! Simulated machines and the logical files each of them owns.
use std::path::{Path, PathBuf};

/// A logical machine sharing the backup target with the others.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Environment {
    First,
    Second,
}

impl Environment {
    pub const ALL: [Environment; 2] = [Environment::First, Environment::Second];

    pub fn name(self) -> &'static str {
        match self {
            Environment::First => "first",
            Environment::Second => "second",
        }
    }

    /// Value of `USE_ENV` that makes the tool's config select this machine.
    pub fn selector(self) -> &'static str {
        match self {
            Environment::First => "1",
            Environment::Second => "2",
        }
    }
}

/// A tracked file or directory, named by role rather than by path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HoardFile {
    AnonDir,
    AnonFile,
    NamedDir1,
    NamedDir2,
    NamedFile,
}

impl HoardFile {
    pub const ALL: [HoardFile; 5] = [
        HoardFile::AnonDir,
        HoardFile::AnonFile,
        HoardFile::NamedDir1,
        HoardFile::NamedDir2,
        HoardFile::NamedFile,
    ];

    pub fn name(self) -> &'static str {
        match self {
            HoardFile::AnonDir => "anon_dir",
            HoardFile::AnonFile => "anon_file",
            HoardFile::NamedDir1 => "named_dir1",
            HoardFile::NamedDir2 => "named_dir2",
            HoardFile::NamedFile => "named_file",
        }
    }

    pub fn is_dir(self) -> bool {
        matches!(
            self,
            HoardFile::AnonDir | HoardFile::NamedDir1 | HoardFile::NamedDir2
        )
    }
}

/// Files seeded inside every directory role.
pub const DIR_ROLE_ENTRIES: [&str; 3] = ["1", "2", "3"];

/// Resolve `<home>/<environment>_<role>`.
pub fn staging_path(home: &Path, env: Environment, file: HoardFile) -> PathBuf {
    home.join(format!("{}_{}", env.name(), file.name()))
}

/// Every staging path for every environment, directories included.
pub fn all_staging_paths(home: &Path) -> Vec<PathBuf> {
    Environment::ALL
        .into_iter()
        .flat_map(|env| {
            HoardFile::ALL
                .into_iter()
                .map(move |file| staging_path(home, env, file))
        })
        .collect()
}
