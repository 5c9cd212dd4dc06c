// src/pkgset/mod.rs

//! Transactional installation of a named package set
//!
//! [`RestorablePackageSet`] downloads and installs a set of packages as one
//! logical unit that the rollback ledger can undo. The downloads come from
//! a pinned, version-specific content source defined by a temporary
//! repository file; the install transaction itself resolves dependencies
//! against the original system repositories, because the target
//! repositories' certificates are not trusted at this point of the
//! conversion.

use crate::backup::{RestorableChange, remove_pkgs};
use crate::config::ConversionContext;
use crate::error::{Error, Result};
use crate::exec::CommandRunner;
use crate::manager::{CallOptions, call_cmd};
use std::fs;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Pinned content source for major version 7 downloads.
pub const REPO_CONTENT_MAJOR_7: &str = "\
[distroshift-baseos-7]
name=Universal Base Image 7 - added by distroshift
baseurl=https://cdn-ubi.redhat.com/content/public/ubi/dist/ubi/server/7/7Server/$basearch/os/
gpgcheck=1
enabled=1
";

/// Pinned content source for major version 8 downloads.
pub const REPO_CONTENT_MAJOR_8: &str = "\
[distroshift-baseos-8]
name=Universal Base Image 8 - BaseOS added by distroshift
baseurl=https://cdn-ubi.redhat.com/content/public/ubi/dist/ubi8/8/$basearch/baseos/os/
gpgcheck=1
enabled=1
";

/// A set of packages installed as a single unit, removable on rollback.
///
/// `enable` transitions to enabled exactly once; the download and install
/// side effects happen only during that transition. The installed record is
/// the requested name list, not the staged file list, so the public record
/// stays name-based.
#[derive(Debug)]
pub struct RestorablePackageSet {
    pkgs_to_install: Vec<String>,
    pkgs_to_update: Vec<String>,
    installed_pkgs: Vec<String>,
    updated_pkgs: Vec<String>,
    enabled: bool,
}

impl RestorablePackageSet {
    pub fn new(pkgs_to_install: Vec<String>, pkgs_to_update: Vec<String>) -> Self {
        Self {
            pkgs_to_install,
            pkgs_to_update,
            installed_pkgs: Vec::new(),
            updated_pkgs: Vec::new(),
            enabled: false,
        }
    }

    /// Names recorded as installed by this set; read by the rollback side.
    pub fn installed_pkgs(&self) -> &[String] {
        &self.installed_pkgs
    }

    /// Names of already-installed packages the transaction updated.
    pub fn updated_pkgs(&self) -> &[String] {
        &self.updated_pkgs
    }

    fn install_packages(
        &mut self,
        ctx: &ConversionContext,
        runner: &dyn CommandRunner,
    ) -> Result<()> {
        if self.pkgs_to_install.is_empty() {
            info!("All packages were already installed");
            return Ok(());
        }

        // Both directories live under paths owned exclusively by this
        // process; nothing else may race the creation.
        fs::create_dir_all(&ctx.paths.download_dir)?;
        fs::create_dir_all(&ctx.paths.repo_tmp_dir)?;

        write_pinned_repo_definition(ctx)?;

        info!("Downloading requested packages");
        let all_pkgs: Vec<String> = self
            .pkgs_to_install
            .iter()
            .chain(self.pkgs_to_update.iter())
            .cloned()
            .collect();
        let empty: Vec<String> = Vec::new();
        for pkg in &all_pkgs {
            download_pkg(
                ctx,
                runner,
                pkg,
                &ctx.paths.download_dir,
                Some(&ctx.paths.repo_tmp_dir),
                &empty,
                &empty,
            )?;
        }

        let rpm_files = staged_rpm_files(&ctx.paths.download_dir)?;
        info!("Installing the downloaded packages");
        debug!("Rpms scheduled to be installed: {}", rpm_files.join(", "));

        // The target repository certificates are not trusted yet, so the
        // dependency resolution runs against the original system repos and
        // the manager must expand $releasever itself.
        let out = call_cmd(
            ctx,
            runner,
            "install",
            &rpm_files,
            &CallOptions {
                enable_repos: Some(&empty),
                disable_repos: Some(&empty),
                no_releasever: true,
            },
        )?;
        if !out.success() {
            return Err(Error::Fatal(format!(
                "Failed to install the package set. See the package manager output for details:\n{}",
                out.output
            )));
        }

        let installed_names = pkg_names_from_rpm_paths(&rpm_files);
        info!(
            "Packages we installed or updated: {}",
            installed_names.join(", ")
        );

        self.installed_pkgs = self.pkgs_to_install.clone();
        self.updated_pkgs = self.pkgs_to_update.clone();
        Ok(())
    }
}

impl RestorableChange for RestorablePackageSet {
    fn enable(&mut self, ctx: &ConversionContext, runner: &dyn CommandRunner) -> Result<()> {
        if self.enabled {
            return Ok(());
        }
        self.install_packages(ctx, runner)?;
        self.enabled = true;
        Ok(())
    }

    /// Remove the installed set. The removal itself is not registered for
    /// rollback (no rollback-of-rollback) and a failed uninstall must not
    /// block the rest of the rollback sequence.
    fn restore(&mut self, _ctx: &ConversionContext, runner: &dyn CommandRunner) -> Result<()> {
        if !self.enabled {
            return Ok(());
        }
        info!(
            "Removing set of installed packages: {}",
            self.installed_pkgs.join(", ")
        );
        remove_pkgs(runner, &self.installed_pkgs, false)?;
        self.enabled = false;
        Ok(())
    }

    fn enabled(&self) -> bool {
        self.enabled
    }

    fn describe(&self) -> String {
        format!("remove package set [{}]", self.installed_pkgs.join(", "))
    }
}

/// Write the version-pinned repository definition the downloads use.
fn write_pinned_repo_definition(ctx: &ConversionContext) -> Result<PathBuf> {
    let content = match ctx.version.major {
        7 => REPO_CONTENT_MAJOR_7,
        8 => REPO_CONTENT_MAJOR_8,
        other => {
            return Err(Error::ConfigError(format!(
                "No pinned content source for major version {}",
                other
            )));
        }
    };
    let path = ctx
        .paths
        .repo_tmp_dir
        .join(format!("distroshift-baseos-{}.repo", ctx.version.major));
    fs::write(&path, content)?;
    debug!("Wrote pinned repository definition to {}", path.display());
    Ok(path)
}

/// Download one package (with its dependency closure) into `dest`.
///
/// With a `reposdir` the download is restricted to the repository files in
/// that directory; otherwise the given enable/disable lists and the pinned
/// release version apply. Returns the path of the downloaded package file.
pub fn download_pkg(
    ctx: &ConversionContext,
    runner: &dyn CommandRunner,
    pkg: &str,
    dest: &Path,
    reposdir: Option<&Path>,
    disable_repos: &[String],
    enable_repos: &[String],
) -> Result<PathBuf> {
    info!("Downloading package: {}", pkg);

    let mut args = vec!["--destdir".to_string(), dest.display().to_string()];
    for repo in disable_repos {
        args.push(format!("--disablerepo={}", repo));
    }
    if let Some(dir) = reposdir {
        args.push(format!("--setopt=reposdir={}", dir.display()));
    } else if let Some(releasever) = ctx.releasever() {
        args.push(format!("--releasever={}", releasever));
    }
    for repo in enable_repos {
        args.push(format!("--enablerepo={}", repo));
    }
    args.push(pkg.to_string());

    let out = runner.run("yumdownloader", &args)?;
    if !out.success() {
        return Err(Error::Fatal(format!(
            "Unable to download the {} package. See the downloader output for details:\n{}",
            pkg, out.output
        )));
    }

    locate_downloaded_pkg(pkg, dest)
}

fn locate_downloaded_pkg(pkg: &str, dest: &Path) -> Result<PathBuf> {
    let pattern = dest.join(format!("{}*.rpm", pkg));
    let matches = glob::glob(&pattern.to_string_lossy())
        .map_err(|e| Error::Fatal(format!("Invalid download pattern: {}", e)))?;
    matches
        .flatten()
        .next()
        .ok_or_else(|| {
            Error::Fatal(format!(
                "The downloaded {} package is missing from {}",
                pkg,
                dest.display()
            ))
        })
}

/// Every `.rpm` file currently staged in a directory, sorted for stable
/// transaction ordering.
fn staged_rpm_files(dir: &Path) -> Result<Vec<String>> {
    let mut files: Vec<String> = fs::read_dir(dir)?
        .flatten()
        .map(|entry| entry.path())
        .filter(|path| path.extension().is_some_and(|ext| ext == "rpm"))
        .map(|path| path.display().to_string())
        .collect();
    files.sort();
    Ok(files)
}

/// Package names read out of locally staged rpm files. A file whose header
/// cannot be read keeps its file stem so the log still names it.
fn pkg_names_from_rpm_paths(rpm_paths: &[String]) -> Vec<String> {
    rpm_paths
        .iter()
        .map(|path| match read_pkg_name(Path::new(path)) {
            Ok(name) => name,
            Err(e) => {
                debug!("Could not read package header from {}: {}", path, e);
                Path::new(path)
                    .file_stem()
                    .map(|stem| stem.to_string_lossy().into_owned())
                    .unwrap_or_else(|| path.clone())
            }
        })
        .collect()
}

fn read_pkg_name(path: &Path) -> Result<String> {
    let file = fs::File::open(path)?;
    let mut reader = BufReader::new(file);
    let pkg = rpm::Package::parse(&mut reader)
        .map_err(|e| Error::Fatal(format!("Failed to parse rpm file: {}", e)))?;
    let name = pkg
        .metadata
        .get_name()
        .map_err(|e| Error::Fatal(format!("Failed to read package name: {}", e)))?;
    Ok(name.to_string())
}
