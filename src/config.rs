// src/config.rs

//! Configuration and the per-run conversion context
//!
//! Everything a component needs to know about the system being converted is
//! collected once at startup into an immutable [`ConversionContext`] and
//! passed by reference into every constructor. Nothing reads process-wide
//! state after that point, which is what makes the kernel state machine
//! testable with a fabricated context.

use crate::error::{Error, Result};
use crate::manager::BackendKind;
use serde::Deserialize;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Default location of the configuration file.
pub const DEFAULT_CONFIG_PATH: &str = "/etc/distroshift/distroshift.toml";

/// Major.minor release version of the system being converted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReleaseVersion {
    pub major: u32,
    pub minor: u32,
}

impl FromStr for ReleaseVersion {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let (major, minor) = match s.split_once('.') {
            Some((major, minor)) => (major, minor),
            None => (s, "0"),
        };
        let major = major
            .parse()
            .map_err(|_| Error::ConfigError(format!("Invalid release version '{}'", s)))?;
        let minor = minor
            .parse()
            .map_err(|_| Error::ConfigError(format!("Invalid release version '{}'", s)))?;
        Ok(ReleaseVersion { major, minor })
    }
}

impl fmt::Display for ReleaseVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

/// On-disk configuration, deserialized from TOML.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ConversionConfig {
    pub system: SystemSection,
    pub target: TargetSection,
    pub source: SourceSection,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SystemSection {
    /// Product name of the distribution being converted away from.
    pub name: String,
    /// Release version; pins `--releasever` on manager calls.
    pub releasever: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TargetSection {
    /// Fingerprints of the signing keys the target vendor uses. A package
    /// signed by any of these counts as already converted.
    pub fingerprints: Vec<String>,
    /// Repositories the entitlement layer has activated for the target
    /// content; the default enable list for manager calls.
    pub repos: Vec<String>,
    /// Module platform id passed while the release package is absent and
    /// auto-detection is impossible (major version 8 only).
    pub platform_module_id: String,
    /// Packages installed as a restorable set before the kernel swap.
    pub essential_packages: Vec<String>,
    /// Already-installed packages the set is allowed to pull upgrades for.
    pub update_packages: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SourceSection {
    /// Fingerprints of the original vendor's signing keys; packages signed
    /// by these are the ones to replace.
    pub fingerprints: Vec<String>,
    /// Name infixes the original vendor splices into kernel-family package
    /// names (e.g. `kernel-uek-devel`); stripped when reinstalling the
    /// target equivalents.
    pub kernel_variant_infixes: Vec<String>,
}

impl Default for SystemSection {
    fn default() -> Self {
        Self {
            name: "the original distribution".to_string(),
            releasever: None,
        }
    }
}

impl Default for TargetSection {
    fn default() -> Self {
        Self {
            fingerprints: vec![
                "199e2f91fd431d51".to_string(),
                "5326810137017186".to_string(),
                "938a80caf21541eb".to_string(),
                "fd372689897da07a".to_string(),
                "45689c882fa658e0".to_string(),
            ],
            repos: Vec::new(),
            platform_module_id: "platform:el8".to_string(),
            essential_packages: Vec::new(),
            update_packages: Vec::new(),
        }
    }
}

impl Default for SourceSection {
    fn default() -> Self {
        Self {
            fingerprints: vec![
                "24c6a8a7f4a80eb5".to_string(),
                "05b555b38483c65d".to_string(),
            ],
            kernel_variant_infixes: vec!["-uek".to_string(), "-plus".to_string()],
        }
    }
}

impl Default for ConversionConfig {
    fn default() -> Self {
        Self {
            system: SystemSection::default(),
            target: TargetSection::default(),
            source: SourceSection::default(),
        }
    }
}

impl ConversionConfig {
    /// Load configuration from a specific path; a missing file yields the
    /// built-in defaults.
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content)
            .map_err(|e| Error::ConfigError(format!("Failed to parse {}: {}", path.display(), e)))
    }
}

/// Options supplied on the command line.
#[derive(Debug, Clone)]
pub struct ToolOptions {
    /// Answer every operator confirmation with yes.
    pub assume_yes: bool,
    /// Default disable list for manager calls.
    pub disable_repos: Vec<String>,
    /// Explicit enable list overriding the entitlement-activated repos.
    pub enable_repos: Option<Vec<String>>,
}

impl Default for ToolOptions {
    fn default() -> Self {
        Self {
            assume_yes: false,
            disable_repos: vec!["*".to_string()],
            enable_repos: None,
        }
    }
}

/// Filesystem locations touched during a conversion. Collected in one place
/// so tests can point every component at a temporary tree.
#[derive(Debug, Clone)]
pub struct Paths {
    /// Version-lock plugin list (shared by yum and dnf).
    pub versionlock_file: PathBuf,
    /// Persisted default-kernel configuration.
    pub sysconfig_kernel: PathBuf,
    pub machine_id: PathBuf,
    /// Boot loader entries named `<machine-id>-<kernel-version>.conf`.
    pub boot_entries_dir: PathBuf,
    /// Staging directory for downloaded replacement packages. Must not be
    /// writable by another user; only paths owned by this process go here.
    pub download_dir: PathBuf,
    /// Temporary repository definitions used for pinned downloads.
    pub repo_tmp_dir: PathBuf,
    /// Scratch space for one-off downloads (forced kernel replacement).
    pub tmp_dir: PathBuf,
    pub lock_file: PathBuf,
}

impl Default for Paths {
    fn default() -> Self {
        Self {
            versionlock_file: PathBuf::from("/etc/yum/pluginconf.d/versionlock.list"),
            sysconfig_kernel: PathBuf::from("/etc/sysconfig/kernel"),
            machine_id: PathBuf::from("/etc/machine-id"),
            boot_entries_dir: PathBuf::from("/boot/loader/entries"),
            download_dir: PathBuf::from("/usr/share/distroshift/packages"),
            repo_tmp_dir: PathBuf::from("/var/lib/distroshift/repos"),
            tmp_dir: PathBuf::from("/var/lib/distroshift/tmp"),
            lock_file: PathBuf::from("/var/run/distroshift.lock"),
        }
    }
}

impl Paths {
    /// All paths rebased under a root directory (test fixtures).
    pub fn rooted_at(root: &Path) -> Self {
        Self {
            versionlock_file: root.join("etc/yum/pluginconf.d/versionlock.list"),
            sysconfig_kernel: root.join("etc/sysconfig/kernel"),
            machine_id: root.join("etc/machine-id"),
            boot_entries_dir: root.join("boot/loader/entries"),
            download_dir: root.join("packages"),
            repo_tmp_dir: root.join("repos"),
            tmp_dir: root.join("tmp"),
            lock_file: root.join("distroshift.lock"),
        }
    }
}

/// Immutable per-run context injected into every component.
#[derive(Debug, Clone)]
pub struct ConversionContext {
    pub config: ConversionConfig,
    pub options: ToolOptions,
    pub version: ReleaseVersion,
    /// Machine architecture as reported by `uname -m`.
    pub arch: String,
    pub backend: BackendKind,
    pub paths: Paths,
}

impl ConversionContext {
    pub fn new(
        config: ConversionConfig,
        options: ToolOptions,
        version: ReleaseVersion,
        arch: String,
        backend: BackendKind,
        paths: Paths,
    ) -> Self {
        Self {
            config,
            options,
            version,
            arch,
            backend,
            paths,
        }
    }

    /// The repositories the entitlement layer has activated, unless the
    /// operator overrode the selection.
    pub fn enabled_repos(&self) -> &[String] {
        match &self.options.enable_repos {
            Some(repos) => repos,
            None => &self.config.target.repos,
        }
    }

    pub fn releasever(&self) -> Option<&str> {
        self.config.system.releasever.as_deref()
    }

    /// Kernel package names the original vendor ships under variant names
    /// (`kernel-uek`, `kernel-plus`, ...).
    pub fn vendor_kernel_names(&self) -> Vec<String> {
        self.config
            .source
            .kernel_variant_infixes
            .iter()
            .map(|infix| format!("kernel{}", infix))
            .collect()
    }
}
