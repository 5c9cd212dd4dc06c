// src/nevra/mod.rs

//! Package identity strings in the RPM naming grammar
//!
//! A package identity can arrive in any of six forms: NEVRA, NEVR, NVRA,
//! NVR, ENVRA and ENVR (epoch prefixed with `:`, architecture as a trailing
//! dot-separated token). Parsing detects the form with two structural
//! probes, validates every extracted field, and finally checks that the
//! fields plus separators account for every byte of the input. The length
//! check catches splitter bugs that would otherwise silently truncate a
//! field and misclassify a package.

use crate::error::{Error, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;
use strum_macros::{Display, EnumString};

/// Epoch-embedded forms (NEVR/NEVRA): a `-digits:` marker inside the string.
static EPOCH_EMBEDDED: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"-\d+:").unwrap());

static FIELD_NAME: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^\S+$").unwrap());
static FIELD_EPOCH: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^\d+$").unwrap());
// Version and release share the same grammar: no whitespace, no dash.
static FIELD_VERSION: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^[^\s-]+$").unwrap());

/// Architectures a package record may carry.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString,
)]
pub enum PackageArch {
    #[strum(serialize = "x86_64")]
    #[serde(rename = "x86_64")]
    X86_64,
    #[strum(serialize = "s390x")]
    #[serde(rename = "s390x")]
    S390x,
    #[strum(serialize = "i686")]
    #[serde(rename = "i686")]
    I686,
    #[strum(serialize = "i86")]
    #[serde(rename = "i86")]
    I86,
    #[strum(serialize = "ppc64le")]
    #[serde(rename = "ppc64le")]
    Ppc64le,
    #[strum(serialize = "aarch64")]
    #[serde(rename = "aarch64")]
    Aarch64,
    #[strum(serialize = "noarch")]
    #[serde(rename = "noarch")]
    Noarch,
}

impl PackageArch {
    fn is_valid(token: &str) -> bool {
        PackageArch::from_str(token).is_ok()
    }
}

/// A parsed package identity: name, optional epoch, version, release and
/// optional architecture.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PackageIdentity {
    pub name: String,
    pub epoch: Option<String>,
    pub version: String,
    pub release: String,
    pub arch: Option<PackageArch>,
}

impl PackageIdentity {
    /// Parse a package identity string in any of the six accepted forms.
    pub fn parse(pkg: &str) -> Result<Self> {
        let fields = split_fields(pkg)?;
        validate_fields(pkg, &fields)
    }

    /// `name-version-release.arch` (the form utilities like `rpm -e` accept).
    pub fn nvra(&self) -> String {
        match self.arch {
            Some(arch) => format!("{}-{}-{}.{}", self.name, self.version, self.release, arch),
            None => format!("{}-{}-{}", self.name, self.version, self.release),
        }
    }

    /// NEVRA with the epoch placed before the name: `E:name-version-release.arch`.
    pub fn nevra_epoch_first(&self, include_zero_epoch: bool) -> String {
        format!("{}{}", self.epoch_prefix(include_zero_epoch), self.nvra())
    }

    /// NEVRA with the epoch placed before the version: `name-E:version-release.arch`.
    pub fn nevra_epoch_mid(&self, include_zero_epoch: bool) -> String {
        let tail = match self.arch {
            Some(arch) => format!("{}.{}", self.release, arch),
            None => self.release.clone(),
        };
        format!(
            "{}-{}{}-{}",
            self.name,
            self.epoch_prefix(include_zero_epoch),
            self.version,
            tail
        )
    }

    /// The (epoch, version, release) triple used for version ordering.
    pub fn evr(&self) -> (Option<&str>, &str, &str) {
        (self.epoch.as_deref(), &self.version, &self.release)
    }

    fn epoch_prefix(&self, include_zero_epoch: bool) -> String {
        match self.epoch.as_deref() {
            Some("0") if !include_zero_epoch => String::new(),
            Some(epoch) => format!("{}:", epoch),
            None => String::new(),
        }
    }
}

impl fmt::Display for PackageIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.nevra_epoch_mid(false))
    }
}

/// Raw fields as extracted by the splitters, before validation. Tokens are
/// kept as strings so that validation can report exactly what was seen.
#[derive(Debug, Default)]
struct RawFields<'a> {
    name: Option<&'a str>,
    epoch: Option<&'a str>,
    version: Option<&'a str>,
    release: Option<String>,
    arch: Option<&'a str>,
}

fn malformed(pkg: &str) -> Error {
    Error::MalformedIdentity(format!(
        "invalid package '{}', packages need to be in one of the following formats: \
         NEVRA, NEVR, NVRA, NVR, ENVRA, ENVR",
        pkg
    ))
}

/// Detect the grammar form and split the string into raw fields.
fn split_fields(pkg: &str) -> Result<RawFields<'_>> {
    if EPOCH_EMBEDDED.is_match(pkg) {
        return split_epoch_embedded(pkg);
    }

    // A leading `digits:` marks the epoch-first forms (ENVR/ENVRA). Any
    // other text before a colon still occupies the epoch position in the
    // fallback splitter; the epoch grammar check reports the bad token.
    let (epoch, rest) = match pkg.split_once(':') {
        Some((epoch, rest)) => (none_if_empty(epoch), rest),
        None => (None, pkg),
    };

    let mut fields = split_name_version_release(rest);
    fields.epoch = epoch;
    Ok(fields)
}

/// NEVR/NEVRA: `name-epoch:version-release[.arch]`.
fn split_epoch_embedded(pkg: &str) -> Result<RawFields<'_>> {
    let (front, release_arch) = pkg.rsplit_once('-').ok_or_else(|| malformed(pkg))?;
    let (name, epoch_version) = front.rsplit_once('-').ok_or_else(|| malformed(pkg))?;
    let (epoch, version) = epoch_version.split_once(':').ok_or_else(|| malformed(pkg))?;

    // Only a trailing token that matches the architecture enum is an arch;
    // anything else stays part of the release.
    let (release, arch) = match release_arch.rsplit_once('.') {
        Some((release, token)) if PackageArch::is_valid(token) => {
            (release.to_string(), Some(token))
        }
        _ => (release_arch.to_string(), None),
    };

    Ok(RawFields {
        name: none_if_empty(name),
        epoch: none_if_empty(epoch),
        version: none_if_empty(version),
        release: Some(release).filter(|r| !r.is_empty()),
        arch,
    })
}

/// NVR/NVRA fallback splitter: arch after the last dot, release between the
/// last two dashes, version before that, name the rest. A trailing token
/// that is not a member of the architecture enum is reattached to the
/// release (releases routinely carry extra dot-separated components).
/// Missing separators leave the corresponding fields unset so that
/// validation can name every gap at once.
fn split_name_version_release(rest: &str) -> RawFields<'_> {
    let (stem, arch_token) = match rest.rsplit_once('.') {
        Some((stem, token)) => (stem, Some(token)),
        None => (rest, None),
    };

    let (front, release) = match stem.rsplit_once('-') {
        Some((front, release)) => (front, Some(release)),
        None => (stem, None),
    };
    let (name, version) = match front.rsplit_once('-') {
        Some((name, version)) => (Some(name), Some(version)),
        None => (None, Some(front)),
    };

    let (release, arch) = match (release, arch_token) {
        (Some(release), Some(token)) if PackageArch::is_valid(token) => {
            (Some(release.to_string()), Some(token))
        }
        (Some(release), Some(token)) => (Some(format!("{}.{}", release, token)), None),
        (Some(release), None) => (Some(release.to_string()), None),
        (None, _) => (None, None),
    };

    RawFields {
        name: name.and_then(none_if_empty),
        epoch: None,
        version: version.and_then(none_if_empty),
        release: release.filter(|r| !r.is_empty()),
        arch,
    }
}

fn none_if_empty(s: &str) -> Option<&str> {
    if s.is_empty() { None } else { Some(s) }
}

/// Validate every raw field against its grammar and check the length round
/// trip. All offending fields are reported in a single error.
fn validate_fields(pkg: &str, fields: &RawFields<'_>) -> Result<PackageIdentity> {
    let mut errors = Vec::new();

    match fields.name {
        Some(name) if FIELD_NAME.is_match(name) => {}
        Some(name) => errors.push(format!("name : {}", name)),
        None => errors.push("name : [None]".to_string()),
    }
    if let Some(epoch) = fields.epoch {
        if !FIELD_EPOCH.is_match(epoch) {
            errors.push(format!("epoch : {}", epoch));
        }
    }
    match fields.version {
        Some(version) if FIELD_VERSION.is_match(version) => {}
        Some(version) => errors.push(format!("version : {}", version)),
        None => errors.push("version : [None]".to_string()),
    }
    match fields.release.as_deref() {
        Some(release) if FIELD_VERSION.is_match(release) => {}
        Some(release) => errors.push(format!("release : {}", release)),
        None => errors.push("release : [None]".to_string()),
    }
    let arch = match fields.arch {
        Some(token) => match PackageArch::from_str(token) {
            Ok(arch) => Some(arch),
            Err(_) => {
                errors.push(format!("arch : {}", token));
                None
            }
        },
        None => None,
    };

    if !errors.is_empty() {
        return Err(Error::MalformedIdentity(format!(
            "the following field(s) are invalid - {}",
            errors.join(", ")
        )));
    }

    // Length round trip: every present field plus one separator character
    // between adjacent present fields must account for the whole input.
    let lens = [
        fields.name.map(str::len),
        fields.epoch.map(str::len),
        fields.version.map(str::len),
        fields.release.as_deref().map(str::len),
        fields.arch.map(str::len),
    ];
    let present = lens.iter().flatten().count();
    let total: usize = lens.iter().flatten().sum::<usize>() + (present - 1);
    if total != pkg.len() {
        return Err(malformed(pkg));
    }

    Ok(PackageIdentity {
        name: fields.name.unwrap_or_default().to_string(),
        epoch: fields.epoch.map(str::to_string),
        version: fields.version.unwrap_or_default().to_string(),
        release: fields.release.clone().unwrap_or_default(),
        arch,
    })
}
