// src/kernel/boot.rs

//! Boot loader entry and default-kernel cleanup
//!
//! On systems that name boot loader entries after the machine id, entries
//! created under a different machine id survive the kernel removal as dead
//! menu items. One cleanup pass deletes them and re-points the default
//! entry. Failures around the default entry are warnings, not fatal: the
//! boot loader falls back to some entry on its own.

use crate::config::ConversionContext;
use crate::error::Result;
use crate::exec::CommandRunner;
use std::fs;
use tracing::{debug, info, warn};

const GRUBBY: &str = "/usr/sbin/grubby";

/// Default-kernel names the conversion may substitute in.
const DEFAULT_KERNEL_MAJOR_7: &str = "kernel";
const DEFAULT_KERNEL_MAJOR_8: &str = "kernel-core";

/// Delete boot loader entries that do not belong to the current machine id
/// and re-point the default entry.
///
/// Applies only to systems using the entry-per-machine-id scheme (major
/// version 8 and later); s390x uses a different boot loader entirely.
pub fn fix_invalid_boot_entries(ctx: &ConversionContext, runner: &dyn CommandRunner) -> Result<()> {
    if ctx.version.major < 8 || ctx.arch == "s390x" {
        debug!("Boot entry cleanup not applicable to this system");
        return Ok(());
    }

    info!("Fixing boot loader entries");
    let machine_id = fs::read_to_string(&ctx.paths.machine_id)?;
    let machine_id = machine_id.trim();

    let pattern = ctx.paths.boot_entries_dir.join("*.conf");
    for entry in glob::glob(&pattern.to_string_lossy())
        .into_iter()
        .flatten()
        .flatten()
    {
        // Entries are named <machine-id>-<kernel-version>.conf.
        let file_name = entry
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        if !file_name.contains(machine_id) {
            debug!("Removing boot entry {}", entry.display());
            fs::remove_file(&entry)?;
        }
    }

    // Removing the previous default makes the boot loader pick another
    // entry; setting it explicitly keeps every consumer of the default
    // (grub2-editenv included) in agreement.
    let out = runner.run(GRUBBY, &["--default-kernel".to_string()])?;
    if !out.success() {
        warn!(
            "Couldn't get the default boot loader entry:\n{}",
            out.output
        );
        return Ok(());
    }

    let default_kernel = out.output.trim().to_string();
    debug!("Setting {} as the default boot loader entry", default_kernel);
    let out = runner.run(GRUBBY, &["--set-default".to_string(), default_kernel])?;
    if !out.success() {
        warn!(
            "Couldn't set the default boot loader entry:\n{}",
            out.output
        );
    }
    Ok(())
}

/// Rewrite the persisted default-kernel configuration when it still names a
/// vendor kernel variant, preserving every unrelated line.
pub fn fix_default_kernel(ctx: &ConversionContext) -> Result<()> {
    info!("Checking for an incorrect boot kernel");
    let path = &ctx.paths.sysconfig_kernel;
    if !path.is_file() {
        debug!("No default-kernel configuration present");
        return Ok(());
    }

    let content = fs::read_to_string(path)?;
    let vendor_kernels = ctx.vendor_kernel_names();
    let Some(leftover) = vendor_kernels
        .iter()
        .find(|kernel| content.contains(kernel.as_str()))
    else {
        debug!("Boot kernel validated");
        return Ok(());
    };

    warn!("Detected leftover boot kernel, changing to the target kernel");
    let replacement = if ctx.version.major == 7 {
        DEFAULT_KERNEL_MAJOR_7
    } else {
        DEFAULT_KERNEL_MAJOR_8
    };
    let updated = content.replace(
        &format!("DEFAULTKERNEL={}", leftover),
        &format!("DEFAULTKERNEL={}", replacement),
    );
    fs::write(path, updated)?;
    info!("Boot kernel {} was changed to {}", leftover, replacement);
    Ok(())
}
