//! Helpers for invoking the built `gmake2cmake` binary in tests.
//!
//! These utilities use `assert_cmd` to locate the current workspace's
//! `gmake2cmake` executable and run it in a controlled working directory,
//! capturing stdout/stderr for assertions.

use anyhow::{Context, Result};
use assert_cmd::Command;
use camino::Utf8Path;

/// Captured output from a `gmake2cmake` invocation.
#[derive(Debug)]
pub struct Gmake2cmakeRun {
    /// Captured stdout (lossy UTF-8).
    pub stdout: String,
    /// Captured stderr (lossy UTF-8).
    pub stderr: String,
    /// Whether the command exited successfully.
    pub success: bool,
}

/// Run `gmake2cmake` in `current_dir` with the supplied args.
///
/// # Errors
///
/// Returns an error when `gmake2cmake` cannot be located or the process
/// cannot be spawned.
pub fn run_gmake2cmake_in(current_dir: &Utf8Path, args: &[&str]) -> Result<Gmake2cmakeRun> {
    let mut cmd = Command::cargo_bin("gmake2cmake").context("locate gmake2cmake binary")?;
    let output = cmd
        .current_dir(current_dir)
        .args(args)
        .output()
        .context("run gmake2cmake command")?;
    Ok(Gmake2cmakeRun {
        stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
        stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        success: output.status.success(),
    })
}
