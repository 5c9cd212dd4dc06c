// src/lib.rs

//! distroshift
//!
//! Converts a running RPM-based Linux installation in place to a
//! binary-compatible target distribution. The dangerous parts are the
//! package identity grammar, the vendor version ordering that drives
//! upgrade decisions, and the kernel swap that must never leave the system
//! without a bootable kernel; everything destructive is sequenced so that a
//! failure partway through still rolls back to a working system.
//!
//! # Architecture
//!
//! - Identity first: every package string is parsed and validated before a
//!   single decision is made from it
//! - Explicit context: one immutable [`config::ConversionContext`] is
//!   injected into every component, no ambient state
//! - One mutation owner: a single-instance lock plus a strictly sequential
//!   pipeline, because the package-manager transaction lock permits one
//!   active mutation anyway
//! - Typed failures: fatal conditions are `Result`s all the way up; only
//!   the binary converts them into a process exit

pub mod applock;
pub mod backup;
pub mod config;
pub mod conversion;
mod error;
pub mod exec;
pub mod kernel;
pub mod manager;
pub mod nevra;
pub mod pkgset;
pub mod prompt;
pub mod query;
pub mod version;

pub use config::{ConversionConfig, ConversionContext, Paths, ReleaseVersion, ToolOptions};
pub use error::{Error, Result};
pub use exec::{CommandOutput, CommandRunner, SystemRunner};
pub use manager::BackendKind;
pub use nevra::{PackageArch, PackageIdentity};
pub use query::{PackageInformation, PackageQuery, classify_by_signer};
pub use version::{compare_identities, compare_package_versions, rpmvercmp};
