// src/version/mod.rs

//! RPM version ordering
//!
//! Reimplements the vendor label-comparison rules exactly: versions and
//! releases are segmented into alternating digit and alpha runs, digit runs
//! compare numerically, alpha runs compare lexically, a digit run beats an
//! alpha run, `~` sorts before everything including end-of-string and `^`
//! sorts after end-of-string but before any other suffix. Upgrade and
//! downgrade decisions that affect bootability hang off this ordering, so
//! no shortcut (semver or otherwise) is acceptable here.

use crate::error::{Error, Result};
use crate::nevra::PackageIdentity;
use std::cmp::Ordering;

/// Compare two version or release strings with vendor RPM rules.
pub fn rpmvercmp(a: &str, b: &str) -> Ordering {
    if a == b {
        return Ordering::Equal;
    }

    let a = a.as_bytes();
    let b = b.as_bytes();
    let (mut i, mut j) = (0, 0);

    loop {
        // Skip separator characters: anything that is not alphanumeric,
        // tilde or caret.
        while i < a.len() && !is_segment_byte(a[i]) {
            i += 1;
        }
        while j < b.len() && !is_segment_byte(b[j]) {
            j += 1;
        }

        // Tilde sorts before everything, including the end of the string.
        let a_tilde = i < a.len() && a[i] == b'~';
        let b_tilde = j < b.len() && b[j] == b'~';
        if a_tilde || b_tilde {
            if !b_tilde {
                return Ordering::Less;
            }
            if !a_tilde {
                return Ordering::Greater;
            }
            i += 1;
            j += 1;
            continue;
        }

        // Caret: sorts after the end of the string, but before any other
        // remaining suffix.
        let a_caret = i < a.len() && a[i] == b'^';
        let b_caret = j < b.len() && b[j] == b'^';
        if a_caret || b_caret {
            if a_caret && b_caret {
                i += 1;
                j += 1;
                continue;
            }
            if a_caret {
                return if j == b.len() { Ordering::Greater } else { Ordering::Less };
            }
            return if i == a.len() { Ordering::Less } else { Ordering::Greater };
        }

        if i == a.len() || j == b.len() {
            break;
        }

        // Grab the next run: all digits or all letters.
        let a_digits = a[i].is_ascii_digit();
        let b_digits = b[j].is_ascii_digit();
        let a_run = take_run(a, i, a_digits);
        let b_run = take_run(b, j, b_digits);

        // A numeric segment is always newer than an alpha segment.
        if a_digits != b_digits {
            return if a_digits { Ordering::Greater } else { Ordering::Less };
        }

        let a_seg = &a[i..a_run];
        let b_seg = &b[j..b_run];
        let cmp = if a_digits {
            compare_digit_runs(a_seg, b_seg)
        } else {
            a_seg.cmp(b_seg)
        };
        if cmp != Ordering::Equal {
            return cmp;
        }

        i = a_run;
        j = b_run;
    }

    // Whichever side has segments left is the newer one.
    if i == a.len() && j == b.len() {
        Ordering::Equal
    } else if i == a.len() {
        Ordering::Less
    } else {
        Ordering::Greater
    }
}

fn is_segment_byte(c: u8) -> bool {
    c.is_ascii_alphanumeric() || c == b'~' || c == b'^'
}

fn take_run(s: &[u8], start: usize, digits: bool) -> usize {
    let mut end = start;
    while end < s.len() && s[end].is_ascii_alphanumeric() && s[end].is_ascii_digit() == digits {
        end += 1;
    }
    end
}

fn compare_digit_runs(a: &[u8], b: &[u8]) -> Ordering {
    let a = strip_leading_zeros(a);
    let b = strip_leading_zeros(b);
    // More digits wins; equal length falls back to byte order.
    a.len().cmp(&b.len()).then_with(|| a.cmp(b))
}

fn strip_leading_zeros(s: &[u8]) -> &[u8] {
    let start = s.iter().take_while(|&&c| c == b'0').count();
    &s[start..]
}

/// Compare two (epoch, version, release) triples.
///
/// A missing epoch is lower than the literal epoch "0"; present epochs
/// compare with the same label rules as versions.
pub fn compare_evr(
    a: (Option<&str>, &str, &str),
    b: (Option<&str>, &str, &str),
) -> Ordering {
    let epoch = match (a.0, b.0) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Less,
        (Some(_), None) => Ordering::Greater,
        (Some(x), Some(y)) => rpmvercmp(x, y),
    };
    epoch
        .then_with(|| rpmvercmp(a.1, b.1))
        .then_with(|| rpmvercmp(a.2, b.2))
}

/// Order two parsed identities by (epoch, version, release).
///
/// Fails when the names differ, or when both architectures are present and
/// differ; a missing architecture on either side is tolerated.
pub fn compare_identities(a: &PackageIdentity, b: &PackageIdentity) -> Result<Ordering> {
    if a.name != b.name {
        return Err(Error::IncomparablePackages(format!(
            "the package names ('{}' and '{}') do not match",
            a.name, b.name
        )));
    }
    if let (Some(arch_a), Some(arch_b)) = (a.arch, b.arch) {
        if arch_a != arch_b {
            return Err(Error::IncomparablePackages(format!(
                "the arches ('{}' and '{}') do not match",
                arch_a, arch_b
            )));
        }
    }
    Ok(compare_evr(a.evr(), b.evr()))
}

/// Compare two package identity strings in any accepted grammar form.
pub fn compare_package_versions(first: &str, second: &str) -> Result<Ordering> {
    let a = PackageIdentity::parse(first)?;
    let b = PackageIdentity::parse(second)?;
    compare_identities(&a, &b)
}
