// src/manager/mod.rs

//! Package-manager invocation
//!
//! Builds argument vectors for the external manager CLI and runs them. Two
//! backends exist (yum on major version 7, dnf on 8 and later); the
//! difference is selected exactly once at startup and injected through the
//! context, never branched on elsewhere.
//!
//! Flag ordering in the built argv is load bearing: the disable-repo flags
//! must precede the enable-repo flags, otherwise `--disablerepo=*` would
//! disable a repo enabled earlier on the same command line.

pub mod versionlock;

use crate::config::ConversionContext;
use crate::error::Result;
use crate::exec::{CommandOutput, CommandRunner};
use crate::nevra::PackageIdentity;
use tracing::{debug, info};

/// Which manager binary drives the conversion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    Yum,
    Dnf,
}

impl BackendKind {
    /// Pick the backend once at startup: dnf when present, yum otherwise.
    pub fn detect() -> Self {
        if which::which("dnf").is_ok() {
            BackendKind::Dnf
        } else {
            BackendKind::Yum
        }
    }

    pub fn backend(self) -> &'static dyn ManagerBackend {
        match self {
            BackendKind::Yum => &YumBackend,
            BackendKind::Dnf => &DnfBackend,
        }
    }
}

/// The places the two manager families differ.
pub trait ManagerBackend: Sync {
    fn program(&self) -> &'static str;

    /// Render a NEVRA the way this manager prints one in its output.
    ///
    /// yum puts the epoch before the name (`7:oraclelinux-release-7.9-1.0.9.el7.x86_64`),
    /// dnf before the version (`oraclelinux-release-8:8.2-1.0.8.el8.x86_64`).
    fn render_nevra(&self, identity: &PackageIdentity, include_zero_epoch: bool) -> String;

    /// How a package is named on the command line. dnf needs the `.arch`
    /// suffix so that i686 and x86_64 siblings are both converted; yum
    /// handles the bare name.
    fn scoped_name(&self, identity: &PackageIdentity) -> String;
}

pub struct YumBackend;
pub struct DnfBackend;

impl ManagerBackend for YumBackend {
    fn program(&self) -> &'static str {
        "yum"
    }

    fn render_nevra(&self, identity: &PackageIdentity, include_zero_epoch: bool) -> String {
        identity.nevra_epoch_first(include_zero_epoch)
    }

    fn scoped_name(&self, identity: &PackageIdentity) -> String {
        identity.name.clone()
    }
}

impl ManagerBackend for DnfBackend {
    fn program(&self) -> &'static str {
        "dnf"
    }

    fn render_nevra(&self, identity: &PackageIdentity, include_zero_epoch: bool) -> String {
        identity.nevra_epoch_mid(include_zero_epoch)
    }

    fn scoped_name(&self, identity: &PackageIdentity) -> String {
        match identity.arch {
            Some(arch) => format!("{}.{}", identity.name, arch),
            None => identity.name.clone(),
        }
    }
}

/// Repo selection and pinning overrides for a single manager call.
#[derive(Debug, Clone, Default)]
pub struct CallOptions<'a> {
    /// Explicit enable list; `None` inherits the entitlement-activated set.
    pub enable_repos: Option<&'a [String]>,
    /// Explicit disable list; `None` inherits the operator's disable list.
    pub disable_repos: Option<&'a [String]>,
    /// Skip the `--releasever` pin. Needed while the original system repos
    /// must expand `$releasever` themselves.
    pub no_releasever: bool,
}

/// Build the argument vector for a manager call, after the program name:
/// `[command, "-y", --disablerepo…, --releasever…, --setopt=module_platform_id…,
/// --enablerepo…, positional…]`.
pub fn build_cmd(
    ctx: &ConversionContext,
    command: &str,
    args: &[String],
    opts: &CallOptions<'_>,
) -> Vec<String> {
    let mut cmd = vec![command.to_string(), "-y".to_string()];

    let disable_repos: &[String] = match opts.disable_repos {
        Some(repos) => repos,
        None => &ctx.options.disable_repos,
    };
    for repo in disable_repos {
        cmd.push(format!("--disablerepo={}", repo));
    }

    if !opts.no_releasever {
        if let Some(releasever) = ctx.releasever() {
            cmd.push(format!("--releasever={}", releasever));
        }
    }

    // Without the release package installed the manager cannot determine the
    // modularity platform id by itself.
    if ctx.version.major == 8 {
        cmd.push(format!(
            "--setopt=module_platform_id={}",
            ctx.config.target.platform_module_id
        ));
    }

    let enable_repos: &[String] = match opts.enable_repos {
        Some(repos) => repos,
        None => ctx.enabled_repos(),
    };
    for repo in enable_repos {
        cmd.push(format!("--enablerepo={}", repo));
    }

    cmd.extend(args.iter().cloned());
    cmd
}

/// Run a manager command.
///
/// A non-zero exit is reported as success if and only if the combined output
/// says the operation had nothing to do; every other non-zero exit is handed
/// back for the caller to classify as fatal or ignorable.
pub fn call_cmd(
    ctx: &ConversionContext,
    runner: &dyn CommandRunner,
    command: &str,
    args: &[String],
    opts: &CallOptions<'_>,
) -> Result<CommandOutput> {
    let program = ctx.backend.backend().program();
    let argv = build_cmd(ctx, command, args, opts);
    info!("Calling: {} {}", program, argv.join(" "));

    let mut out = runner.run(program, &argv)?;
    if out.code == 1 && out.output.trim_end().ends_with("Error: Nothing to do") {
        debug!("{} has nothing to do, ignoring", program);
        out.code = 0;
    }
    Ok(out)
}
