// tests/common/mod.rs

//! Shared test utilities for the integration tests.

use distroshift::config::{ConversionConfig, ConversionContext, Paths, ToolOptions};
use distroshift::exec::{CommandOutput, CommandRunner};
use distroshift::manager::BackendKind;
use std::cell::RefCell;
use std::path::Path;

/// Query record for a kernel signed by the target vendor.
pub const TARGET_KERNEL_RECORD: &str = "\
DSH Red Hat, Inc. <http://bugzilla.redhat.com/bugzilla>&Red Hat, Inc.&kernel-0:4.7.4-200.fc24.x86_64&RSA/SHA256, Mon 01 Feb 2021, Key ID 199e2f91fd431d51\n";

/// Query record for the same kernel version signed by the original vendor.
pub const SOURCE_KERNEL_RECORD: &str = "\
DSH CentOS Buildsys <bugs@centos.org>&CentOS&kernel-0:4.7.4-200.fc24.x86_64&RSA/SHA256, Tue 02 Feb 2021, Key ID 05b555b38483c65d\n";

struct Rule {
    tokens: Vec<String>,
    code: i32,
    output: String,
}

/// Replays canned outputs for matching invocations and records every call.
/// A rule matches when each of its tokens is a substring of some element of
/// the full argv (program included); the first matching rule wins and
/// unmatched invocations succeed with empty output.
#[derive(Default)]
pub struct ScriptedRunner {
    rules: RefCell<Vec<Rule>>,
    pub calls: RefCell<Vec<Vec<String>>>,
}

impl ScriptedRunner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on(self, tokens: &[&str], code: i32, output: &str) -> Self {
        self.rules.borrow_mut().push(Rule {
            tokens: tokens.iter().map(|t| t.to_string()).collect(),
            code,
            output: output.to_string(),
        });
        self
    }

    pub fn calls_matching(&self, tokens: &[&str]) -> usize {
        self.calls
            .borrow()
            .iter()
            .filter(|argv| tokens.iter().all(|t| argv.iter().any(|a| a.contains(t))))
            .count()
    }
}

impl CommandRunner for ScriptedRunner {
    fn run(&self, program: &str, args: &[String]) -> distroshift::Result<CommandOutput> {
        let mut argv = vec![program.to_string()];
        argv.extend(args.iter().cloned());
        self.calls.borrow_mut().push(argv.clone());

        let rules = self.rules.borrow();
        for rule in rules.iter() {
            if rule
                .tokens
                .iter()
                .all(|t| argv.iter().any(|a| a.contains(t)))
            {
                return Ok(CommandOutput {
                    output: rule.output.clone(),
                    code: rule.code,
                });
            }
        }
        Ok(CommandOutput {
            output: String::new(),
            code: 0,
        })
    }
}

/// Context for an unattended conversion of a major-version-8 x86_64 system,
/// with every filesystem path under `root`.
pub fn unattended_context(major: u32, root: &Path) -> ConversionContext {
    let mut config = ConversionConfig::default();
    config.system.name = "CentOS Linux".to_string();
    config.system.releasever = Some(format!("{}.5", major));
    let options = ToolOptions {
        assume_yes: true,
        ..ToolOptions::default()
    };
    ConversionContext::new(
        config,
        options,
        format!("{}.5", major).parse().unwrap(),
        "x86_64".to_string(),
        if major >= 8 {
            BackendKind::Dnf
        } else {
            BackendKind::Yum
        },
        Paths::rooted_at(root),
    )
}

/// Seed the machine-id and a pair of boot entries, one of them stale.
pub fn seed_boot_files(ctx: &ConversionContext) {
    let machine_id = "c183b2192bd44b9089a88e54c0242a0d";
    std::fs::create_dir_all(ctx.paths.machine_id.parent().unwrap()).unwrap();
    std::fs::write(&ctx.paths.machine_id, format!("{}\n", machine_id)).unwrap();
    std::fs::create_dir_all(&ctx.paths.boot_entries_dir).unwrap();
    std::fs::write(
        ctx.paths
            .boot_entries_dir
            .join(format!("{}-4.7.4-200.fc24.conf", machine_id)),
        "title current\n",
    )
    .unwrap();
    std::fs::write(
        ctx.paths
            .boot_entries_dir
            .join("ffffffffffffffffffffffffffffffff-4.7.2-201.fc24.conf"),
        "title stale\n",
    )
    .unwrap();
}
