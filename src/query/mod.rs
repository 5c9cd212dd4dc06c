// src/query/mod.rs

//! Query installed packages with signer metadata from the RPM database
//!
//! Uses the `rpm` command-line tool with a fixed query format: every record
//! is prefixed with a literal marker token so it can be filtered out of
//! whatever warning lines the tool mixes into the same stream, and the
//! fields are `&`-delimited. One malformed record is logged and dropped; it
//! must never abort a full-system scan.

use crate::config::ConversionContext;
use crate::error::Result;
use crate::exec::{CommandRunner, run_as_child_process};
use crate::nevra::PackageIdentity;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;
use tracing::debug;

/// Marker prefixing every record emitted by the query format.
pub const QUERY_MARKER: &str = "DSH";

/// The pseudo-package rpm keeps imported signing keys under. It is never
/// third-party software and never carries an architecture.
pub const SIGNER_PSEUDO_PACKAGE: &str = "gpg-pubkey";

/// Arch placeholder rpm prints for packages without an architecture.
const NO_ARCH_PLACEHOLDER: &str = ".(none)";

/// Query format: packager, vendor, NEVRA and the pgp signature header,
/// `&`-delimited, one newline-terminated record per package. The signature
/// falls through DSA, RSA and the legacy gpg/pgp header tags.
const QUERY_FORMAT: &str = "DSH %{PACKAGER}&%{VENDOR}&%{NAME}-%|EPOCH?{%{EPOCH}}:{0}|:%{VERSION}-%{RELEASE}.%{ARCH}&%|DSAHEADER?{%{DSAHEADER:pgpsig}}:{%|RSAHEADER?{%{RSAHEADER:pgpsig}}:{%|SIGGPG?{%{SIGGPG:pgpsig}}:{%|SIGPGP?{%{SIGPGP:pgpsig}}:{(none)}|}|}|}|\n";

static KEY_ID: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"Key ID (.*)").unwrap());

/// Everything known about one installed package. Produced only by
/// [`PackageQuery`]; lives for the duration of one query call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageInformation {
    pub packager: String,
    pub vendor: String,
    pub identity: PackageIdentity,
    /// Identifier of the key that signed the package; the literal `none`
    /// when the package is unsigned.
    pub fingerprint: Option<String>,
    pub signature: String,
}

/// Adapter over the local RPM database.
pub struct PackageQuery<'a> {
    runner: &'a dyn CommandRunner,
}

impl<'a> PackageQuery<'a> {
    pub fn new(runner: &'a dyn CommandRunner) -> Self {
        Self { runner }
    }

    /// Query packages matching a glob (`*` for all installed packages).
    pub fn installed_pkg_information(&self, pattern: &str) -> Result<Vec<PackageInformation>> {
        let mut args = vec!["--qf".to_string(), QUERY_FORMAT.to_string()];
        if pattern.contains('*') {
            args.push("-qa".to_string());
        } else {
            args.push("-q".to_string());
        }
        args.push(pattern.to_string());

        let out = self.runner.run("rpm", &args)?;
        Ok(parse_package_records(&out.output))
    }

    /// Full-database scan, run in an isolated child process so the database
    /// layer's signal handler cannot swallow an interrupt aimed at the
    /// conversion loop. The child's exit status is authoritative.
    pub fn scan_all_installed(&self) -> Result<Vec<PackageInformation>> {
        run_as_child_process(|| self.installed_pkg_information("*"))
    }

    /// Names (scoped for the active backend) of installed packages signed
    /// by any of the given fingerprints, optionally filtered by name.
    pub fn pkgs_signed_by(
        &self,
        ctx: &ConversionContext,
        fingerprints: &[String],
        pattern: &str,
    ) -> Result<Vec<String>> {
        let backend = ctx.backend.backend();
        Ok(self
            .installed_pkg_information(pattern)?
            .into_iter()
            .filter(|pkg| {
                pkg.fingerprint
                    .as_deref()
                    .is_some_and(|fp| fingerprints.iter().any(|f| f == fp))
            })
            .map(|pkg| backend.scoped_name(&pkg.identity))
            .collect())
    }

    /// Installed packages NOT signed by any of the given fingerprints,
    /// optionally filtered by name. The signing-key pseudo-package is
    /// excluded. An empty trusted set matches nothing (not everything).
    pub fn pkgs_with_different_signature(
        &self,
        fingerprints: &[String],
        pattern: &str,
    ) -> Result<Vec<PackageInformation>> {
        if fingerprints.is_empty() {
            return Ok(Vec::new());
        }
        let classified = classify_by_signer(self.installed_pkg_information(pattern)?, fingerprints);
        Ok(classified.untrusted)
    }
}

/// Partition of a package list by signer trust.
#[derive(Debug, Default)]
pub struct Classified {
    pub trusted: Vec<PackageInformation>,
    pub untrusted: Vec<PackageInformation>,
}

/// Partition packages by whether their signing key belongs to the trusted
/// set. Every input package lands in exactly one half; the signing-key
/// pseudo-package always counts as trusted because it is never itself
/// third-party software.
pub fn classify_by_signer(
    packages: Vec<PackageInformation>,
    trusted_fingerprints: &[String],
) -> Classified {
    let mut classified = Classified::default();
    for pkg in packages {
        let is_trusted = pkg
            .fingerprint
            .as_deref()
            .is_some_and(|fp| trusted_fingerprints.iter().any(|f| f == fp));
        if is_trusted || pkg.identity.name == SIGNER_PSEUDO_PACKAGE {
            classified.trusted.push(pkg);
        } else {
            classified.untrusted.push(pkg);
        }
    }
    classified
}

/// Parse the marker-prefixed records out of raw query output. Unmarked
/// lines are unrelated warnings; marked lines that fail to parse are logged
/// and dropped.
pub fn parse_package_records(output: &str) -> Vec<PackageInformation> {
    let mut packages = Vec::new();

    for line in output.lines() {
        let Some(pos) = line.find(QUERY_MARKER) else {
            continue;
        };
        let record = line[pos + QUERY_MARKER.len()..].trim_start();

        let fields: Vec<&str> = record.split('&').collect();
        let [packager, vendor, nevra, signature] = fields.as_slice() else {
            debug!("Failed to parse a package record: {}", record);
            continue;
        };

        // The signing-key pseudo-package carries no arch; rpm prints a
        // placeholder that must go before the grammar sees the string.
        let nevra = nevra.strip_suffix(NO_ARCH_PLACEHOLDER).unwrap_or(nevra);

        let identity = match PackageIdentity::parse(nevra) {
            Ok(identity) => identity,
            Err(e) => {
                debug!("Failed to parse a package: {}", e);
                continue;
            }
        };

        let fingerprint = if signature.is_empty() {
            None
        } else {
            Some(extract_fingerprint(signature))
        };

        packages.push(PackageInformation {
            packager: packager.trim().to_string(),
            vendor: vendor.to_string(),
            identity,
            fingerprint,
            signature: signature.to_string(),
        });
    }

    packages
}

/// Fingerprint of the key used to sign a package, from the pgp signature
/// header; `none` when the header carries no key id.
fn extract_fingerprint(signature: &str) -> String {
    KEY_ID
        .captures(signature)
        .and_then(|cap| cap.get(1))
        .map(|m| m.as_str().to_string())
        .unwrap_or_else(|| "none".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exec::testing::ScriptedRunner;

    const SAMPLE_OUTPUT: &str = "\
DSH Red Hat, Inc. <http://bugzilla.redhat.com/bugzilla>&Red Hat, Inc.&kernel-core-0:4.18.0-240.10.1.el8_3.x86_64&RSA/SHA256, Mon 01 Feb 2021, Key ID 199e2f91fd431d51\n\
DSH CentOS Buildsys <bugs@centos.org>&CentOS&openssl-libs-1:1.1.1g-15.el8_3.x86_64&RSA/SHA256, Tue 02 Feb 2021, Key ID 05b555b38483c65d\n\
warning: Signature not supported. Hash algorithm SHA1 not available.\n\
DSH (none)&(none)&gpg-pubkey-0:d4082792-5b32db75.(none)&(none)\n\
DSH broken&record&not-parseable&sig&extra\n";

    #[test]
    fn test_parse_package_records() {
        let packages = parse_package_records(SAMPLE_OUTPUT);
        assert_eq!(packages.len(), 3);

        assert_eq!(packages[0].identity.name, "kernel-core");
        assert_eq!(packages[0].packager, "Red Hat, Inc. <http://bugzilla.redhat.com/bugzilla>");
        assert_eq!(
            packages[0].fingerprint.as_deref(),
            Some("199e2f91fd431d51")
        );

        assert_eq!(packages[1].identity.epoch.as_deref(), Some("1"));
        assert_eq!(
            packages[1].fingerprint.as_deref(),
            Some("05b555b38483c65d")
        );
    }

    #[test]
    fn test_parse_strips_no_arch_placeholder() {
        let packages = parse_package_records(SAMPLE_OUTPUT);
        let key = &packages[2];
        assert_eq!(key.identity.name, SIGNER_PSEUDO_PACKAGE);
        assert_eq!(key.identity.version, "d4082792");
        assert_eq!(key.identity.arch, None);
        assert_eq!(key.fingerprint.as_deref(), Some("none"));
    }

    #[test]
    fn test_parse_drops_bad_records_not_whole_scan() {
        // The five-field line and the unmarked warning line both vanish
        // without taking the scan down.
        let packages = parse_package_records(SAMPLE_OUTPUT);
        assert!(packages.iter().all(|p| p.identity.name != "broken"));
    }

    #[test]
    fn test_extract_fingerprint_fallback() {
        assert_eq!(extract_fingerprint("(none)"), "none");
        assert_eq!(
            extract_fingerprint("RSA/SHA256, Mon 01 Feb 2021, Key ID 45689c882fa658e0"),
            "45689c882fa658e0"
        );
    }

    #[test]
    fn test_classify_partition_complete_and_disjoint() {
        let packages = parse_package_records(SAMPLE_OUTPUT);
        let total = packages.len();
        let trusted_set = vec!["199e2f91fd431d51".to_string()];
        let classified = classify_by_signer(packages, &trusted_set);

        assert_eq!(classified.trusted.len() + classified.untrusted.len(), total);
        assert!(classified
            .trusted
            .iter()
            .any(|p| p.identity.name == "kernel-core"));
        assert!(classified
            .untrusted
            .iter()
            .any(|p| p.identity.name == "openssl-libs"));
    }

    #[test]
    fn test_classify_never_marks_signer_package_untrusted() {
        let packages = parse_package_records(SAMPLE_OUTPUT);
        let classified = classify_by_signer(packages, &[]);
        assert!(classified
            .untrusted
            .iter()
            .all(|p| p.identity.name != SIGNER_PSEUDO_PACKAGE));
        assert!(classified
            .trusted
            .iter()
            .any(|p| p.identity.name == SIGNER_PSEUDO_PACKAGE));
    }

    #[test]
    fn test_query_uses_qa_for_globs() {
        let runner = ScriptedRunner::new().on(&["rpm"], 0, SAMPLE_OUTPUT);
        let query = PackageQuery::new(&runner);

        query.installed_pkg_information("*").unwrap();
        query.installed_pkg_information("kernel-core").unwrap();

        let calls = runner.calls.borrow();
        assert!(calls[0].contains(&"-qa".to_string()));
        assert!(calls[1].contains(&"-q".to_string()));
        assert!(!calls[1].contains(&"-qa".to_string()));
    }

    #[test]
    fn test_different_signature_requires_fingerprints() {
        let runner = ScriptedRunner::new().on(&["rpm"], 0, SAMPLE_OUTPUT);
        let query = PackageQuery::new(&runner);
        // No fingerprints to compare against: nothing to report.
        let pkgs = query.pkgs_with_different_signature(&[], "*").unwrap();
        assert!(pkgs.is_empty());
    }
}
