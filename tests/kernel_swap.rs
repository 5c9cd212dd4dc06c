// tests/kernel_swap.rs

//! End-to-end kernel conversion scenarios against a scripted runner.

mod common;

use common::{ScriptedRunner, SOURCE_KERNEL_RECORD, TARGET_KERNEL_RECORD, seed_boot_files, unattended_context};
use distroshift::backup::RestorableChange;
use distroshift::kernel::KernelConversion;
use distroshift::pkgset::RestorablePackageSet;
use std::fs;

const ALREADY_INSTALLED_OUTPUT: &str =
    "Package kernel-4.7.4-200.fc24.x86_64 is already installed.\n";

/// Both the colliding source-signed kernel and a target-signed kernel, as a
/// name-filtered query would report them mid-conversion.
fn kernel_query_records() -> String {
    format!("{}{}", SOURCE_KERNEL_RECORD, TARGET_KERNEL_RECORD)
}

#[test]
fn test_clean_install_path_touches_nothing_else() {
    let dir = tempfile::tempdir().unwrap();
    let ctx = unattended_context(8, dir.path());
    seed_boot_files(&ctx);

    let runner = ScriptedRunner::new()
        .on(&["rpm", "kernel*"], 0, TARGET_KERNEL_RECORD)
        .on(&["rpm", "-q"], 0, TARGET_KERNEL_RECORD)
        .on(&["install", "kernel"], 0, "Complete!\n");

    KernelConversion::new(&ctx, &runner).run().unwrap();

    // No collision resolution, no removals, no deferred update.
    assert_eq!(runner.calls_matching(&["list", "--showduplicates"]), 0);
    assert_eq!(runner.calls_matching(&["rpm", "-e"]), 0);
    assert_eq!(runner.calls_matching(&["--replacepkgs"]), 0);
    assert_eq!(runner.calls_matching(&["update", "kernel"]), 0);
}

#[test]
fn test_version_collision_with_multiple_installed_kernels() {
    // Installed 4.7.2-201 and 4.7.4-200, available only 4.7.4-200: the
    // duplicated version is removed and reinstalled from the target vendor,
    // and one update pass runs at the end.
    let dir = tempfile::tempdir().unwrap();
    let ctx = unattended_context(8, dir.path());
    seed_boot_files(&ctx);

    let runner = ScriptedRunner::new()
        .on(&["rpm", "kernel*"], 0, SOURCE_KERNEL_RECORD)
        .on(&["rpm", "-q"], 0, &kernel_query_records())
        .on(&["install", "kernel"], 0, ALREADY_INSTALLED_OUTPUT)
        .on(
            &["list", "--showduplicates"],
            0,
            "Installed Packages\n\
             kernel.x86_64    4.7.2-201.fc24    @updates\n\
             kernel.x86_64    4.7.4-200.fc24    @updates\n\
             Available Packages\n\
             kernel.x86_64    4.7.4-200.fc24    updates\n",
        );

    KernelConversion::new(&ctx, &runner).run().unwrap();

    // The duplicated available version was removed and reinstalled cleanly.
    assert_eq!(
        runner.calls_matching(&["rpm", "-e", "--nodeps", "kernel-4.7.4-200.fc24"]),
        2,
        "one removal for the duplicate, one for the non-target kernel"
    );
    assert_eq!(runner.calls_matching(&["install", "kernel-4.7.4-200.fc24"]), 1);
    // Never the forced in-place replacement on this path.
    assert_eq!(runner.calls_matching(&["--replacepkgs"]), 0);
    // The collision defers one final update pass.
    assert_eq!(runner.calls_matching(&["update", "kernel"]), 1);
}

#[test]
fn test_version_collision_with_single_installed_kernel() {
    // Only one kernel installed and its version equals the only available
    // target kernel: forced, dependency-ignoring in-place replacement.
    let dir = tempfile::tempdir().unwrap();
    let ctx = unattended_context(8, dir.path());
    seed_boot_files(&ctx);
    fs::create_dir_all(&ctx.paths.tmp_dir).unwrap();
    fs::write(
        ctx.paths.tmp_dir.join("kernel-4.7.4-200.fc24.x86_64.rpm"),
        b"not a real rpm",
    )
    .unwrap();

    let runner = ScriptedRunner::new()
        .on(&["rpm", "kernel*"], 0, SOURCE_KERNEL_RECORD)
        .on(&["rpm", "-q"], 0, &kernel_query_records())
        .on(&["install", "kernel"], 0, ALREADY_INSTALLED_OUTPUT)
        .on(
            &["list", "--showduplicates"],
            0,
            "Installed Packages\n\
             kernel.x86_64    4.7.4-200.fc24    @updates\n\
             Available Packages\n\
             kernel.x86_64    4.7.4-200.fc24    updates\n",
        );

    KernelConversion::new(&ctx, &runner).run().unwrap();

    // The replacement package is downloaded and force-installed in place.
    assert_eq!(runner.calls_matching(&["yumdownloader", "kernel-4.7.4-200.fc24"]), 1);
    assert_eq!(
        runner.calls_matching(&["rpm", "-i", "--force", "--nodeps", "--replacepkgs"]),
        1
    );
    // The only removal is the later non-target kernel cleanup; the single
    // installed kernel is never removed outright.
    assert_eq!(runner.calls_matching(&["rpm", "-e"]), 1);
    assert_eq!(
        runner.calls_matching(&["rpm", "-e", "--nodeps", "kernel-4.7.4-200.fc24.x86_64"]),
        1
    );
    assert_eq!(runner.calls_matching(&["update", "kernel"]), 1);
}

#[test]
fn test_boot_entries_of_other_machines_are_cleaned_up() {
    let dir = tempfile::tempdir().unwrap();
    let ctx = unattended_context(8, dir.path());
    seed_boot_files(&ctx);

    let runner = ScriptedRunner::new()
        .on(&["rpm", "kernel*"], 0, TARGET_KERNEL_RECORD)
        .on(&["rpm", "-q"], 0, TARGET_KERNEL_RECORD)
        .on(
            &["--default-kernel"],
            0,
            "/boot/vmlinuz-4.7.4-200.fc24.x86_64\n",
        );

    KernelConversion::new(&ctx, &runner).run().unwrap();

    let remaining: Vec<String> = fs::read_dir(&ctx.paths.boot_entries_dir)
        .unwrap()
        .flatten()
        .map(|entry| entry.file_name().to_string_lossy().into_owned())
        .collect();
    assert_eq!(remaining.len(), 1);
    assert!(remaining[0].starts_with("c183b2192bd44b9089a88e54c0242a0d"));
    assert_eq!(
        runner.calls_matching(&["--set-default", "/boot/vmlinuz-4.7.4-200.fc24.x86_64"]),
        1
    );
}

#[test]
fn test_package_set_enable_is_at_most_once() {
    let dir = tempfile::tempdir().unwrap();
    let ctx = unattended_context(8, dir.path());
    fs::create_dir_all(&ctx.paths.download_dir).unwrap();
    fs::write(
        ctx.paths
            .download_dir
            .join("subscription-manager-1.28.21-3.el8.x86_64.rpm"),
        b"not a real rpm",
    )
    .unwrap();

    let runner = ScriptedRunner::new();
    let mut set = RestorablePackageSet::new(vec!["subscription-manager".to_string()], Vec::new());

    set.enable(&ctx, &runner).unwrap();
    set.enable(&ctx, &runner).unwrap();
    assert_eq!(runner.calls_matching(&["install"]), 1);

    set.restore(&ctx, &runner).unwrap();
    set.restore(&ctx, &runner).unwrap();
    assert_eq!(runner.calls_matching(&["rpm", "-e", "subscription-manager"]), 1);
}
