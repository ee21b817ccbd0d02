//! Multi-machine conflict detection checks.
//!
//! Two identities share one backup target. The identity holding the latest
//! logged checksum may always back up; an identity whose last-known checksum
//! is stale is refused unless the run is forced.
use crate::error::{ensure_that, AssertionFailure};
use crate::harness::{Harness, Invocation};
use crate::oplog;
use crate::roles::{Environment, HoardFile};
use crate::util::random_bytes;
use anyhow::{Context, Result};

const ANON_FILE_HOARD: &str = "anon_file";
const ANON_FILE_CHECKSUM_PATH: [&str; 3] = ["hoard", "Anonymous", ""];
const REPLACEMENT_CONTENT_BYTES: usize = 1024;

/// State carried from one step to the next.
#[derive(Debug, Clone)]
struct State {
    invocation: Invocation,
    /// Identity generated by the first run.
    first_uuid: Option<String>,
    /// Content backed up before the replacement in step 3.
    old_content: Option<Vec<u8>>,
}

pub fn run(harness: &Harness) -> Result<()> {
    let state = State {
        invocation: Invocation::for_environment(Environment::First),
        first_uuid: None,
        old_content: None,
    };
    let state = first_backup(harness, state)?;
    let state = rotated_identity(harness, state)?;
    let state = replaced_content(harness, state)?;
    let state = stale_identity_rejected(harness, state)?;
    forced_stale_write(harness, state)
}

/// Compare `content` with the checksum at `json_path` in the latest log entry of `uuid`.
pub fn checksum_matches(
    harness: &Harness,
    hoard_name: &str,
    json_path: &[&str],
    content: &[u8],
    uuid: &str,
    expect_match: bool,
    message: &str,
) -> Result<()> {
    harness.sync()?;
    let cmp = oplog::compare_latest(harness.data_dir(), uuid, hoard_name, json_path, content)
        .with_context(|| format!("read latest checksum for {uuid}/{hoard_name}"))?;
    if cmp.matches() == expect_match {
        return Ok(());
    }
    let relation = if expect_match { "to match" } else { "to NOT match" };
    Err(AssertionFailure::new(format!(
        "expected file hash {} {relation} logged checksum {} for uuid {uuid}: {message}",
        cmp.content_md5, cmp.logged
    ))
    .into())
}

fn assert_anon_file_checksum(
    harness: &Harness,
    content: &[u8],
    uuid: &str,
    expect_match: bool,
    message: &str,
) -> Result<()> {
    checksum_matches(
        harness,
        ANON_FILE_HOARD,
        &ANON_FILE_CHECKSUM_PATH,
        content,
        uuid,
        expect_match,
        message,
    )
}

fn banner(run: u32, caption: &str) {
    println!("========= HOARD RUN #{run} =========");
    if !caption.is_empty() {
        println!("{caption}");
    }
}

fn backup(harness: &Harness, invocation: &Invocation) -> Result<()> {
    harness.run_hoard("backup", invocation)?.map_err(Into::into)
}

fn first_backup(harness: &Harness, state: State) -> Result<State> {
    harness.reset()?;
    banner(1, "");
    backup(harness, &state.invocation)?;
    let first_uuid = harness.uuid().context("read uuid after first backup")?;
    Ok(State {
        first_uuid: Some(first_uuid),
        ..state
    })
}

fn rotated_identity(harness: &Harness, state: State) -> Result<State> {
    let first_uuid = state
        .first_uuid
        .as_deref()
        .context("first backup did not record a uuid")?;
    harness.remove_uuid()?;
    banner(2, "  After removing the UUID file  ");
    // Same checksums, different machine: still allowed.
    backup(harness, &state.invocation)?;
    let new_uuid = harness.uuid().context("read uuid after rotation")?;
    ensure_that(
        new_uuid != first_uuid,
        "a new UUID should have been generated",
    )?;
    Ok(state)
}

fn replaced_content(harness: &Harness, state: State) -> Result<State> {
    let uuid = harness.uuid()?;
    let old_content = harness.read_hoard_file(Environment::First, HoardFile::AnonFile)?;
    assert_anon_file_checksum(
        harness,
        &old_content,
        &uuid,
        true,
        "last checksum should match old data",
    )?;

    let new_content = random_bytes(REPLACEMENT_CONTENT_BYTES);
    ensure_that(
        new_content != old_content,
        "new content should differ from old",
    )?;
    harness.write_hoard_file(Environment::First, HoardFile::AnonFile, &new_content)?;
    ensure_that(
        harness.read_hoard_file(Environment::First, HoardFile::AnonFile)? == new_content,
        "file should contain new, different content",
    )?;
    assert_anon_file_checksum(
        harness,
        &new_content,
        &uuid,
        false,
        "new data should not match old checksum",
    )?;

    banner(3, " After replacing a file content ");
    // This identity made the last backup, so it may overwrite it.
    backup(harness, &state.invocation)?;

    assert_anon_file_checksum(
        harness,
        &old_content,
        &uuid,
        false,
        "new last checksum should no longer match old data",
    )?;
    assert_anon_file_checksum(
        harness,
        &new_content,
        &uuid,
        true,
        "new last checksum should match new data",
    )?;
    Ok(State {
        old_content: Some(old_content),
        ..state
    })
}

fn stale_identity_rejected(harness: &Harness, state: State) -> Result<State> {
    let new_uuid = harness.uuid()?;
    let first_uuid = state
        .first_uuid
        .as_deref()
        .context("first backup did not record a uuid")?;
    let old_content = state
        .old_content
        .as_deref()
        .context("content replacement did not record the old content")?;
    ensure_that(first_uuid != new_uuid, "new UUID should not match old one")?;

    harness.set_uuid(first_uuid)?;
    ensure_that(
        harness.uuid()? == first_uuid,
        "UUID should now be set to old one",
    )?;
    assert_anon_file_checksum(
        harness,
        old_content,
        &new_uuid,
        false,
        "old data should not match latest checksum (from newer UUID)",
    )?;

    harness.write_hoard_file(Environment::First, HoardFile::AnonFile, old_content)?;
    ensure_that(
        harness.read_hoard_file(Environment::First, HoardFile::AnonFile)? == old_content,
        "file should now contain the old content",
    )?;

    let invocation = state.invocation.clone().with_force(false);
    let attempts = [
        (4, "   After using first UUID/File  ", 1),
        (5, "    Doing it again to be sure   ", 2),
    ];
    for (run, caption, attempt) in attempts {
        banner(run, caption);
        match harness.run_hoard("backup", &invocation)? {
            Err(refusal) => tracing::info!(attempt, %refusal, "stale backup refused"),
            Ok(()) => {
                return Err(AssertionFailure::new(format!(
                    "Using the first UUID should have failed ({attempt})"
                ))
                .into())
            }
        }
    }
    Ok(State {
        invocation,
        ..state
    })
}

fn forced_stale_write(harness: &Harness, state: State) -> Result<()> {
    let old_content = state
        .old_content
        .as_deref()
        .context("content replacement did not record the old content")?;
    let invocation = state.invocation.with_force(true);
    banner(6, "    Doing it again to be sure   ");
    backup(harness, &invocation)?;
    let uuid = harness.uuid()?;
    assert_anon_file_checksum(
        harness,
        old_content,
        &uuid,
        true,
        "forced backup should record the old content",
    )
}
