// src/conversion.rs

//! Top-level conversion driver
//!
//! Wires the phases together in their only safe order: take the application
//! lock, clear version locks, install the essential target package set,
//! convert the kernel, then report what was left untouched. Any failure
//! triggers the rollback of every registered change before the error is
//! surfaced; components themselves never terminate the process.

use crate::applock::ApplicationLock;
use crate::backup::BackupControl;
use crate::config::ConversionContext;
use crate::error::Result;
use crate::exec::CommandRunner;
use crate::kernel::KernelConversion;
use crate::manager::versionlock;
use crate::pkgset::RestorablePackageSet;
use crate::query::{PackageQuery, classify_by_signer};
use tracing::{error, info, warn};

/// Run a full conversion. On failure every change registered for rollback
/// is restored, newest first, before the error propagates.
pub fn run(ctx: &ConversionContext, runner: &dyn CommandRunner) -> Result<()> {
    let _lock = ApplicationLock::acquire(&ctx.paths.lock_file)?;
    let mut control = BackupControl::new();

    match convert(ctx, runner, &mut control) {
        Ok(()) => {
            info!("Conversion successful");
            Ok(())
        }
        Err(err) => {
            error!("Conversion failed: {}", err);
            if !control.is_empty() {
                warn!("Rolling back the changes made so far");
                control.restore_all(ctx, runner);
            }
            Err(err)
        }
    }
}

fn convert(
    ctx: &ConversionContext,
    runner: &dyn CommandRunner,
    control: &mut BackupControl,
) -> Result<()> {
    versionlock::clear_version_locks(ctx, runner, control)?;
    survey_packages_for_replacement(ctx, runner)?;

    let package_set = RestorablePackageSet::new(
        ctx.config.target.essential_packages.clone(),
        ctx.config.target.update_packages.clone(),
    );
    control.push(Box::new(package_set), ctx, runner)?;

    KernelConversion::new(ctx, runner).run()?;

    list_third_party_pkgs_left(ctx, runner)?;
    Ok(())
}

/// Count the installed packages carrying the original vendor's signature;
/// these are the ones the conversion is going to replace. Everything else
/// (third-party software) is left alone.
fn survey_packages_for_replacement(ctx: &ConversionContext, runner: &dyn CommandRunner) -> Result<()> {
    let query = PackageQuery::new(runner);
    let packages = query.scan_all_installed()?;
    let backend = ctx.backend.backend();
    let to_replace: Vec<String> = packages
        .iter()
        .filter(|pkg| {
            pkg.fingerprint
                .as_deref()
                .is_some_and(|fp| ctx.config.source.fingerprints.iter().any(|f| f == fp))
        })
        .map(|pkg| backend.scoped_name(&pkg.identity))
        .collect();
    info!(
        "{} installed packages are signed by {} and will be replaced",
        to_replace.len(),
        ctx.config.system.name
    );
    Ok(())
}

/// List the packages that were not replaced by target-signed ones. They are
/// left untouched on purpose; the operator should know they exist.
fn list_third_party_pkgs_left(ctx: &ConversionContext, runner: &dyn CommandRunner) -> Result<()> {
    info!("Listing packages not signed by the target vendor");
    let query = PackageQuery::new(runner);
    let packages = query.scan_all_installed()?;
    let classified = classify_by_signer(packages, &ctx.config.target.fingerprints);

    if classified.untrusted.is_empty() {
        info!("All packages are now signed by the target vendor");
        return Ok(());
    }

    info!("The following packages were left unchanged:");
    for pkg in &classified.untrusted {
        info!(
            "  {}  ({})",
            pkg.identity.nevra_epoch_mid(true),
            if pkg.vendor == "(none)" { &pkg.packager } else { &pkg.vendor }
        );
    }
    Ok(())
}
