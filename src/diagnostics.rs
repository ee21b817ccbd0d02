//! Post-mortem dump printed when a scenario fails.
//!
//! Every section is best-effort: a section that cannot be produced is noted
//! and the rest of the report still prints.
use crate::harness::Harness;
use crate::roles::{self, Environment, HoardFile};
use crate::util::{display_path, md5_hex};
use anyhow::{Context, Result};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

/// Depth limit for the home directory listing.
const HOME_TREE_DEPTH: usize = 3;

type Section = fn(&Harness, &mut dyn Write) -> Result<()>;

pub fn report(harness: &Harness, out: &mut impl Write) {
    let sections: [(&str, Section); 5] = [
        ("Hoards", |h, out| write_tree(out, h.data_dir(), None)),
        ("Home", |h, out| write_tree(out, h.home(), Some(HOME_TREE_DEPTH))),
        ("Checksums", |h, out| write_checksums(out, h.home())),
        ("Logs", |h, out| write_logs(out, h.data_dir())),
        ("Configs", |h, out| write_configs(out, h.config_dir())),
    ];
    for (title, section) in sections {
        if let Err(err) = writeln!(out, "\n### {title}:") {
            tracing::warn!(%err, "diagnostics output closed");
            return;
        }
        if let Err(err) = section(harness, &mut *out) {
            tracing::warn!(section = title, "diagnostics section failed: {err:#}");
            let _ = writeln!(out, "(unavailable: {err:#})");
        }
    }
    let _ = out.flush();
}

fn write_tree(out: &mut dyn Write, root: &Path, max_depth: Option<usize>) -> Result<()> {
    writeln!(out, "{}", root.display())?;
    if !root.exists() {
        writeln!(out, "(missing)")?;
        return Ok(());
    }
    write_tree_level(out, root, 1, max_depth)
}

fn write_tree_level(
    out: &mut dyn Write,
    dir: &Path,
    depth: usize,
    max_depth: Option<usize>,
) -> Result<()> {
    if max_depth.is_some_and(|max| depth > max) {
        return Ok(());
    }
    for path in sorted_children(dir)? {
        let name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        let indent = "    ".repeat(depth - 1);
        let is_dir = fs::symlink_metadata(&path)
            .map(|meta| meta.is_dir())
            .unwrap_or(false);
        if is_dir {
            writeln!(out, "{indent}{name}/")?;
            write_tree_level(out, &path, depth + 1, max_depth)?;
        } else {
            writeln!(out, "{indent}{name}")?;
        }
    }
    Ok(())
}

fn sorted_children(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut children = Vec::new();
    for entry in fs::read_dir(dir).with_context(|| format!("read {}", dir.display()))? {
        children.push(entry?.path());
    }
    children.sort();
    Ok(children)
}

fn write_checksums(out: &mut dyn Write, home: &Path) -> Result<()> {
    for env in Environment::ALL {
        for file in HoardFile::ALL.into_iter().filter(|file| !file.is_dir()) {
            let path = roles::staging_path(home, env, file);
            match fs::read(&path) {
                Ok(bytes) => writeln!(out, "{}: {}", path.display(), md5_hex(&bytes))?,
                Err(err) => writeln!(out, "{}: ({err})", path.display())?,
            }
        }
    }
    Ok(())
}

/// Every regular file under `root`, recursively, in sorted order.
fn collect_files_recursive(root: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    if !root.exists() {
        return Ok(files);
    }
    for path in sorted_children(root)? {
        if path.is_dir() {
            files.extend(collect_files_recursive(&path)?);
        } else if path.is_file() {
            files.push(path);
        }
    }
    Ok(files)
}

fn write_logs(out: &mut dyn Write, data_dir: &Path) -> Result<()> {
    let logs = collect_files_recursive(data_dir)?
        .into_iter()
        .filter(|path| path.extension().is_some_and(|ext| ext == "log"));
    for path in logs {
        writeln!(out, "\n##########\n\t{}", display_path(&path, Some(data_dir)))?;
        let text = fs::read(&path).with_context(|| format!("read {}", path.display()))?;
        out.write_all(&text)?;
        writeln!(out, "\n##########")?;
    }
    Ok(())
}

fn write_configs(out: &mut dyn Write, config_dir: &Path) -> Result<()> {
    if !config_dir.exists() {
        writeln!(out, "(missing {})", config_dir.display())?;
        return Ok(());
    }
    for path in sorted_children(config_dir)? {
        if !path.is_file() {
            continue;
        }
        writeln!(out, "##### {}\n", path.display())?;
        let text = fs::read(&path).with_context(|| format!("read {}", path.display()))?;
        writeln!(out, "{}", String::from_utf8_lossy(&text))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{HarnessConfig, ToolCommand};

    fn harness_in(root: &Path) -> Harness {
        Harness::new(HarnessConfig {
            tool: ToolCommand {
                program: PathBuf::from("/bin/true"),
                args: Vec::new(),
            },
            home: root.join("home"),
            config_dir: root.join("config"),
            data_dir: root.join("data"),
            tool_config: None,
        })
    }

    fn render(harness: &Harness) -> String {
        let mut out = Vec::new();
        report(harness, &mut out);
        String::from_utf8(out).expect("utf8 report")
    }

    #[test]
    fn report_covers_every_section_after_reset() {
        let temp = tempfile::tempdir().expect("tempdir");
        let harness = harness_in(temp.path());
        harness.reset().expect("reset");
        let log_dir = harness.data_dir().join("logs");
        fs::create_dir_all(&log_dir).expect("mkdir logs");
        fs::write(log_dir.join("hoard.log"), "backup refused").expect("write log");
        fs::write(harness.config_dir().join("uuid"), "uuid-1").expect("write uuid");

        let text = render(&harness);
        for title in ["Hoards", "Home", "Checksums", "Logs", "Configs"] {
            assert!(text.contains(&format!("### {title}:")), "missing {title}");
        }
        assert!(text.contains("backup refused"));
        assert!(text.contains("uuid-1"));
        assert!(text.contains("first_anon_dir/"));
        let anon = harness
            .read_hoard_file(Environment::Second, HoardFile::NamedFile)
            .expect("read");
        assert!(text.contains(&md5_hex(&anon)));
    }

    #[test]
    fn report_survives_missing_directories() {
        let temp = tempfile::tempdir().expect("tempdir");
        let harness = harness_in(temp.path());
        let text = render(&harness);
        assert!(text.contains("### Configs:"));
        assert!(text.contains("(missing"));
    }

    #[test]
    fn home_tree_stops_at_depth_limit() {
        let temp = tempfile::tempdir().expect("tempdir");
        let deep = temp.path().join("a/b/c/d");
        fs::create_dir_all(&deep).expect("mkdir");
        fs::write(deep.join("hidden"), "x").expect("write");

        let mut out = Vec::new();
        write_tree(&mut out, temp.path(), Some(HOME_TREE_DEPTH)).expect("tree");
        let text = String::from_utf8(out).expect("utf8");
        let lines: Vec<&str> = text.lines().map(str::trim).collect();
        assert!(lines.contains(&"c/"));
        assert!(!lines.contains(&"d/"));
        assert!(!lines.contains(&"hidden"));
    }
}
