//! Scenario selection and execution.
//!
//! Each scenario owns its whole lifecycle: it resets the simulation, drives
//! hoard through the harness, and asserts on what hoard left on disk. The
//! driver only picks scenarios and reacts to failures.
use crate::harness::Harness;
use anyhow::Result;
use clap::ValueEnum;

mod operations;

/// Scenarios selectable from the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Scenario {
    /// Stale-write rejection and force override across two identities
    Operation,
    /// Every scenario, in order
    All,
}

impl Scenario {
    /// Concrete checks a selection expands to.
    pub fn checks(self) -> &'static [Check] {
        match self {
            Scenario::Operation | Scenario::All => &[Check::Operation],
        }
    }
}

/// A single runnable check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Check {
    Operation,
}

impl Check {
    pub fn name(self) -> &'static str {
        match self {
            Check::Operation => "operation",
        }
    }

    pub fn run(self, harness: &Harness) -> Result<()> {
        match self {
            Check::Operation => operations::run(harness),
        }
    }
}
