// src/backup/mod.rs

//! Rollback ledger interfaces
//!
//! The conversion core consumes the generic backup/restore machinery
//! through exactly two operations: register a change for rollback
//! ([`BackupControl::push`], which enables the change and takes ownership)
//! and execute the rollback ([`BackupControl::restore_all`], reverse order,
//! never fatal). Everything else about ledger persistence lives outside
//! this crate.

use crate::config::ConversionContext;
use crate::error::{Error, Result};
use crate::exec::CommandRunner;
use std::fs;
use std::path::PathBuf;
use tracing::{debug, info, warn};

/// A system mutation that can be undone.
///
/// `enable` transitions false→true exactly once per object; implementations
/// perform their side effects only during that single transition. `restore`
/// is idempotent and a no-op unless previously enabled.
pub trait RestorableChange {
    fn enable(&mut self, ctx: &ConversionContext, runner: &dyn CommandRunner) -> Result<()>;
    fn restore(&mut self, ctx: &ConversionContext, runner: &dyn CommandRunner) -> Result<()>;
    fn enabled(&self) -> bool;
    /// Short human-readable description for rollback logs.
    fn describe(&self) -> String;
}

/// Stack of enabled changes, restored in reverse order on rollback.
#[derive(Default)]
pub struct BackupControl {
    changes: Vec<Box<dyn RestorableChange>>,
}

impl BackupControl {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register-for-rollback: enable the change, then own it so a later
    /// rollback can undo it. A change that fails to enable is not pushed.
    pub fn push(
        &mut self,
        mut change: Box<dyn RestorableChange>,
        ctx: &ConversionContext,
        runner: &dyn CommandRunner,
    ) -> Result<()> {
        change.enable(ctx, runner)?;
        self.changes.push(change);
        Ok(())
    }

    /// Execute-rollback: restore every owned change, newest first. A failed
    /// restore is logged and must not block the rest of the sequence.
    pub fn restore_all(&mut self, ctx: &ConversionContext, runner: &dyn CommandRunner) {
        while let Some(mut change) = self.changes.pop() {
            info!("Rollback: {}", change.describe());
            if let Err(e) = change.restore(ctx, runner) {
                warn!("Rollback of '{}' failed: {}", change.describe(), e);
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }
}

/// Snapshot of a single file's content, restorable in place.
#[derive(Debug)]
pub struct RestorableFile {
    path: PathBuf,
    saved: Option<Vec<u8>>,
    existed: bool,
    enabled: bool,
}

impl RestorableFile {
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            saved: None,
            existed: false,
            enabled: false,
        }
    }
}

impl RestorableChange for RestorableFile {
    fn enable(&mut self, _ctx: &ConversionContext, _runner: &dyn CommandRunner) -> Result<()> {
        if self.enabled {
            return Ok(());
        }
        if self.path.is_file() {
            self.saved = Some(fs::read(&self.path)?);
            self.existed = true;
            debug!("Backed up {}", self.path.display());
        } else {
            self.existed = false;
        }
        self.enabled = true;
        Ok(())
    }

    fn restore(&mut self, _ctx: &ConversionContext, _runner: &dyn CommandRunner) -> Result<()> {
        if !self.enabled {
            return Ok(());
        }
        if self.existed {
            if let Some(content) = &self.saved {
                fs::write(&self.path, content)?;
                info!("File {} restored", self.path.display());
            }
        } else if self.path.exists() {
            fs::remove_file(&self.path)?;
        }
        self.enabled = false;
        Ok(())
    }

    fn enabled(&self) -> bool {
        self.enabled
    }

    fn describe(&self) -> String {
        format!("restore file {}", self.path.display())
    }
}

/// Remove packages through the external removal tool.
///
/// Dependencies are deliberately not followed; the callers remove packages
/// they are about to replace with equivalents. With `critical` unset a
/// failed removal is logged and skipped, which is what a rollback sequence
/// needs.
pub fn remove_pkgs(runner: &dyn CommandRunner, pkgs: &[String], critical: bool) -> Result<()> {
    if pkgs.is_empty() {
        info!("No packages to remove");
        return Ok(());
    }
    for pkg in pkgs {
        info!("Removing package: {}", pkg);
        let args = vec!["-e".to_string(), "--nodeps".to_string(), pkg.clone()];
        let out = runner.run("rpm", &args)?;
        if !out.success() {
            if critical {
                return Err(Error::CommandFailed {
                    command: format!("rpm -e --nodeps {}", pkg),
                    code: out.code,
                    output: out.output,
                });
            }
            warn!("Couldn't remove {}: {}", pkg, out.output.trim());
        }
    }
    Ok(())
}
