// src/kernel/mod.rs

//! Kernel conversion
//!
//! Guarantees that exactly one correctly signed, bootable target kernel set
//! remains installed at the end of the conversion. The sequence is strict:
//! install the target kernel, resolve a possible version collision with an
//! installed kernel of the same version, verify a target kernel is really
//! present, remove the non-target kernels, fix the boot loader entries and
//! the default-kernel configuration, reinstall the removed kernel-family
//! companions and finally catch up on a deferred update. A failure before
//! the removal step leaves every original kernel in place, so the system
//! stays bootable at every point in between.

pub mod boot;

use crate::config::ConversionContext;
use crate::error::{Error, Result};
use crate::exec::CommandRunner;
use crate::manager::{CallOptions, call_cmd};
use crate::pkgset::download_pkg;
use crate::prompt;
use crate::query::{PackageInformation, PackageQuery};
use regex::Regex;
use std::collections::BTreeSet;
use std::sync::LazyLock;
use tracing::{info, warn};

/// The base kernel package name; the manager resolves the actual version.
pub const KERNEL_PKG: &str = "kernel";

/// The manager's textual marker for an install that found the requested
/// package already present, carrying the version token.
static ALREADY_INSTALLED: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r" (.*?)(?: is)? already installed").unwrap());

/// One row of a `list --showduplicates kernel` section: package column,
/// version column, repo column.
static KERNEL_LIST_ROW: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"kernel.*?\s+(\S+)\s+\S+").unwrap());

/// Divider between the installed and available sections of a list call.
const AVAILABLE_DIVIDER: &str = "Available Packages";

/// State machine replacing the running kernel with the target vendor's.
pub struct KernelConversion<'a> {
    ctx: &'a ConversionContext,
    runner: &'a dyn CommandRunner,
    query: PackageQuery<'a>,
}

impl<'a> KernelConversion<'a> {
    pub fn new(ctx: &'a ConversionContext, runner: &'a dyn CommandRunner) -> Self {
        Self {
            ctx,
            runner,
            query: PackageQuery::new(runner),
        }
    }

    /// Run the whole sequence.
    pub fn run(&self) -> Result<()> {
        let update_needed = self.install_target_kernel()?;
        self.verify_target_kernel_installed()?;

        let removed = self.remove_non_target_kernels()?;
        boot::fix_invalid_boot_entries(self.ctx, self.runner)?;
        boot::fix_default_kernel(self.ctx)?;

        if !removed.is_empty() {
            self.install_additional_kernel_pkgs(&removed)?;
        }
        if update_needed {
            self.update_target_kernel()?;
        }
        Ok(())
    }

    /// Install the target kernel. Returns whether a deferred update pass is
    /// needed because the collision path had to install an older version.
    fn install_target_kernel(&self) -> Result<bool> {
        info!("Installing the target kernel");
        let out = call_cmd(
            self.ctx,
            self.runner,
            "install",
            &[KERNEL_PKG.to_string()],
            &CallOptions::default(),
        )?;
        if !out.success() {
            return Err(Error::Fatal(format!(
                "Error occurred while attempting to install the target kernel:\n{}",
                out.output
            )));
        }

        if let Some(cap) = ALREADY_INSTALLED.captures(&out.output) {
            let reported = cap.get(1).map(|m| m.as_str()).unwrap_or_default();
            let backend = self.ctx.backend.backend();
            let non_target = self.query.pkgs_with_different_signature(
                &self.ctx.config.target.fingerprints,
                KERNEL_PKG,
            )?;
            for kernel in &non_target {
                // The manager prints a NEVRA, so compare NEVRAs.
                if reported == backend.render_nevra(&kernel.identity, false) {
                    info!(
                        "Conflict of kernels: one of the installed kernels has the same \
                         version as the latest available target kernel."
                    );
                    self.handle_no_newer_kernel_available()?;
                    return Ok(true);
                }
            }
        }
        Ok(false)
    }

    /// Resolve the case where the newest available target kernel version is
    /// already installed under the original vendor's signature.
    fn handle_no_newer_kernel_available(&self) -> Result<()> {
        let (installed, available) = self.kernel_availability()?;
        let candidates: Vec<&String> = available
            .iter()
            .filter(|version| !installed.contains(version))
            .collect();

        if let Some(newest) = candidates.last() {
            // A version not present yet cannot collide; install it and let
            // the deferred update pass reach the latest one afterwards.
            self.install_kernel_version(newest)?;
            return Ok(());
        }

        // Every available target kernel version is already installed under
        // the original signature.
        if installed.len() > 1 {
            // More than one kernel installed: removing the duplicated one
            // cannot leave the system kernel-less.
            let Some(duplicated) = available.last() else {
                return Err(Error::Fatal(
                    "No target kernel version is available for installation".to_string(),
                ));
            };
            crate::backup::remove_pkgs(
                self.runner,
                &[format!("{}-{}", KERNEL_PKG, duplicated)],
                true,
            )?;
            self.install_kernel_version(duplicated)?;
        } else if let Some(only) = installed.first() {
            self.replace_installed_kernel(only)?;
        }
        Ok(())
    }

    fn install_kernel_version(&self, version: &str) -> Result<()> {
        let pkg = format!("{}-{}", KERNEL_PKG, version);
        let out = call_cmd(
            self.ctx,
            self.runner,
            "install",
            &[pkg.clone()],
            &CallOptions::default(),
        )?;
        if !out.success() {
            // The post-install verification is the authoritative check; a
            // failure here is surfaced but not immediately fatal.
            warn!("Installing {} reported a failure:\n{}", pkg, out.output);
        }
        Ok(())
    }

    /// Installed and available kernel versions, both oldest first, rebuilt
    /// fresh on every call because installation mutates them.
    fn kernel_availability(&self) -> Result<(Vec<String>, Vec<String>)> {
        let out = call_cmd(
            self.ctx,
            self.runner,
            "list",
            &["--showduplicates".to_string(), KERNEL_PKG.to_string()],
            &CallOptions::default(),
        )?;
        let (installed_raw, available_raw) = match out.output.split_once(AVAILABLE_DIVIDER) {
            Some((installed, available)) => (installed.to_string(), available.to_string()),
            None => (out.output.clone(), String::new()),
        };
        Ok((
            extract_kernel_versions(&installed_raw),
            extract_kernel_versions(&available_raw),
        ))
    }

    /// Force-replace the only installed kernel in place with the target
    /// package of the identical version.
    ///
    /// This is the single most destructive operation in the conversion: a
    /// failure can leave the machine unbootable, and it cannot be cancelled
    /// once started. The operator must confirm.
    fn replace_installed_kernel(&self, version: &str) -> Result<()> {
        warn!(
            "The only installed kernel has the same version as the only available target \
             kernel, and it is going to be force-replaced in place. If anything goes wrong \
             with the replacement, the system will become unbootable. To have the kernel \
             installed in a safer manner, install a different kernel version first and run \
             the conversion again."
        );
        prompt::ask_to_continue(self.ctx)?;

        let pkg = format!("{}-{}", KERNEL_PKG, version);
        std::fs::create_dir_all(&self.ctx.paths.tmp_dir)?;
        download_pkg(
            self.ctx,
            self.runner,
            &pkg,
            &self.ctx.paths.tmp_dir,
            None,
            &self.ctx.options.disable_repos,
            self.ctx.enabled_repos(),
        )?;

        info!(
            "Replacing {} {} with the target kernel of the same version",
            self.ctx.config.system.name, pkg
        );

        // The downloaded file set is expanded here; the replacement tool
        // does not expand globs itself.
        let pattern = self.ctx.paths.tmp_dir.join(format!("{}*", pkg));
        let staged: Vec<String> = glob::glob(&pattern.to_string_lossy())
            .map_err(|e| Error::Fatal(format!("Invalid kernel package pattern: {}", e)))?
            .flatten()
            .map(|path| path.display().to_string())
            .collect();
        if staged.is_empty() {
            return Err(Error::Fatal(format!(
                "The downloaded {} package is missing from {}",
                pkg,
                self.ctx.paths.tmp_dir.display()
            )));
        }

        // --nodeps because some kernels depend on the release package,
        // which is absent at this stage of the conversion.
        let mut args = vec![
            "-i".to_string(),
            "--force".to_string(),
            "--nodeps".to_string(),
            "--replacepkgs".to_string(),
        ];
        args.extend(staged);

        let out = self.runner.run("rpm", &args)?;
        if !out.success() {
            return Err(Error::Fatal(format!(
                "Unable to replace the kernel package:\n{}",
                out.output
            )));
        }
        info!("Target {} installed", pkg);
        Ok(())
    }

    /// A missing target kernel after the install step aborts the whole
    /// conversion; nothing downstream may run without one.
    fn verify_target_kernel_installed(&self) -> Result<()> {
        info!("Verifying that the target kernel has been installed");
        let installed = self.query.pkgs_signed_by(
            self.ctx,
            &self.ctx.config.target.fingerprints,
            KERNEL_PKG,
        )?;
        if installed.is_empty() {
            return Err(Error::Fatal(
                "No target kernel installed. Verify that the repositories used for installing \
                 the kernel contain target packages."
                    .to_string(),
            ));
        }
        info!("The target kernel has been installed");
        Ok(())
    }

    /// Remove every installed kernel-family package not signed by the
    /// target vendor; returns what was removed so the companion packages
    /// can be reinstalled from the target repositories.
    fn remove_non_target_kernels(&self) -> Result<Vec<PackageInformation>> {
        info!("Searching for non-target kernels");
        let kernels = self.query.pkgs_with_different_signature(
            &self.ctx.config.target.fingerprints,
            "kernel*",
        )?;
        if kernels.is_empty() {
            info!("None found");
            return Ok(kernels);
        }

        info!("Removing non-target kernels:");
        for kernel in &kernels {
            info!("  {} ({})", kernel.identity.nvra(), kernel.vendor);
        }
        let nvras: Vec<String> = kernels.iter().map(|pkg| pkg.identity.nvra()).collect();
        crate::backup::remove_pkgs(self.runner, &nvras, true)?;
        Ok(kernels)
    }

    /// Reinstall the target equivalents of the removed kernel-family
    /// packages, stripping the original vendor's variant infixes from the
    /// names (`kernel-uek-devel` installs as `kernel-devel`).
    fn install_additional_kernel_pkgs(&self, removed: &[PackageInformation]) -> Result<()> {
        let names: BTreeSet<String> = removed
            .iter()
            .map(|pkg| strip_variant_infix(&pkg.identity.name, &self.ctx.config.source.kernel_variant_infixes))
            .collect();
        for name in names {
            if name == KERNEL_PKG {
                continue;
            }
            info!("Installing target {}", name);
            call_cmd(
                self.ctx,
                self.runner,
                "install",
                &[name],
                &CallOptions::default(),
            )?;
        }
        Ok(())
    }

    /// The collision path may have installed an older version on purpose;
    /// one update pass reaches the latest available target kernel.
    fn update_target_kernel(&self) -> Result<()> {
        info!("Updating the target kernel");
        call_cmd(
            self.ctx,
            self.runner,
            "update",
            &[KERNEL_PKG.to_string()],
            &CallOptions::default(),
        )?;
        Ok(())
    }
}

/// Version column tokens of a kernel listing section, in listing order.
fn extract_kernel_versions(raw: &str) -> Vec<String> {
    KERNEL_LIST_ROW
        .captures_iter(raw)
        .filter_map(|cap| cap.get(1))
        .map(|m| m.as_str().to_string())
        .collect()
}

fn strip_variant_infix(name: &str, infixes: &[String]) -> String {
    for infix in infixes {
        if name.contains(infix.as_str()) {
            return name.replacen(infix.as_str(), "", 1);
        }
    }
    name.to_string()
}
