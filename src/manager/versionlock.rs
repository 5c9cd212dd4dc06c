// src/manager/versionlock.rs

//! Version-lock clearing
//!
//! A package locked to a specific version through the version-lock plugin
//! would make the manager refuse the replacement transactions later in the
//! conversion. The lock list is backed up through the rollback ledger and
//! cleared; the file is shared between yum and dnf, so one path covers both
//! backends.

use crate::backup::{BackupControl, RestorableFile};
use crate::config::ConversionContext;
use crate::error::Result;
use crate::exec::CommandRunner;
use crate::manager::{CallOptions, call_cmd};
use crate::prompt;
use std::fs;
use tracing::{info, warn};

/// Detect a populated version-lock list and clear it, preserving the prior
/// content for rollback.
pub fn clear_version_locks(
    ctx: &ConversionContext,
    runner: &dyn CommandRunner,
    control: &mut BackupControl,
) -> Result<()> {
    let path = &ctx.paths.versionlock_file;
    let in_use = path.is_file() && fs::metadata(path)?.len() > 0;

    if !in_use {
        info!("Usage of the version-lock plugin not detected");
        return Ok(());
    }

    warn!("The version-lock plugin is in use. It may cause the conversion to fail.");
    info!("Upon continuing, all package version locks will be cleared.");
    prompt::ask_to_continue(ctx)?;

    control.push(Box::new(RestorableFile::new(path.clone())), ctx, runner)?;

    info!("Clearing package version locks");
    call_cmd(
        ctx,
        runner,
        "versionlock",
        &["clear".to_string()],
        &CallOptions::default(),
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ConversionConfig, Paths, ToolOptions};
    use crate::exec::testing::ScriptedRunner;
    use crate::manager::BackendKind;

    fn context_with_paths(paths: Paths) -> ConversionContext {
        let options = ToolOptions {
            assume_yes: true,
            ..ToolOptions::default()
        };
        ConversionContext::new(
            ConversionConfig::default(),
            options,
            "8.5".parse().unwrap(),
            "x86_64".to_string(),
            BackendKind::Dnf,
            paths,
        )
    }

    #[test]
    fn test_no_lock_file_is_a_noop() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = context_with_paths(Paths::rooted_at(dir.path()));
        let runner = ScriptedRunner::new();
        let mut control = BackupControl::new();

        clear_version_locks(&ctx, &runner, &mut control).unwrap();
        assert_eq!(runner.calls_matching(&["versionlock"]), 0);
        assert!(control.is_empty());
    }

    #[test]
    fn test_empty_lock_file_is_a_noop() {
        let dir = tempfile::tempdir().unwrap();
        let paths = Paths::rooted_at(dir.path());
        fs::create_dir_all(paths.versionlock_file.parent().unwrap()).unwrap();
        fs::write(&paths.versionlock_file, "").unwrap();

        let ctx = context_with_paths(paths);
        let runner = ScriptedRunner::new();
        let mut control = BackupControl::new();

        clear_version_locks(&ctx, &runner, &mut control).unwrap();
        assert_eq!(runner.calls_matching(&["versionlock"]), 0);
    }

    #[test]
    fn test_populated_lock_file_is_backed_up_and_cleared() {
        let dir = tempfile::tempdir().unwrap();
        let paths = Paths::rooted_at(dir.path());
        fs::create_dir_all(paths.versionlock_file.parent().unwrap()).unwrap();
        fs::write(&paths.versionlock_file, "kernel-0:4.18.0-240.el8.*\n").unwrap();
        let lock_path = paths.versionlock_file.clone();

        let ctx = context_with_paths(paths);
        let runner = ScriptedRunner::new();
        let mut control = BackupControl::new();

        clear_version_locks(&ctx, &runner, &mut control).unwrap();
        assert_eq!(runner.calls_matching(&["versionlock", "clear"]), 1);
        assert!(!control.is_empty());

        // Simulate the plugin wiping the list, then roll back.
        fs::write(&lock_path, "").unwrap();
        control.restore_all(&ctx, &runner);
        assert_eq!(
            fs::read_to_string(&lock_path).unwrap(),
            "kernel-0:4.18.0-240.el8.*\n"
        );
    }
}
