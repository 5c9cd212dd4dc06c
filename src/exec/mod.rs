// src/exec/mod.rs

//! External command execution
//!
//! Every interaction with the package manager, the rpm tool and the boot
//! loader utilities goes through the [`CommandRunner`] trait so the engines
//! above can be driven against scripted runners in tests. The system
//! implementation captures combined stdout+stderr output, because callers
//! classify failures by inspecting the combined stream (the "nothing to do"
//! heuristic among others).
//!
//! [`run_as_child_process`] is the isolation primitive for rpm database
//! enumeration: the enumeration runs in a forked child whose exit status is
//! authoritative, so a signal handler installed by the database layer can
//! never swallow an interrupt aimed at the top-level conversion loop.

use crate::error::{Error, Result};
use nix::sys::wait::{WaitStatus, waitpid};
use nix::unistd::{ForkResult, fork};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::io::{Read, Write};
use std::process::Command;
use tracing::debug;

/// Captured result of an external command.
#[derive(Debug, Clone)]
pub struct CommandOutput {
    /// Combined stdout and stderr, decoded lossily.
    pub output: String,
    /// Exit code; -1 when the process was terminated by a signal.
    pub code: i32,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.code == 0
    }
}

/// Object-safe runner for external commands.
pub trait CommandRunner {
    fn run(&self, program: &str, args: &[String]) -> Result<CommandOutput>;
}

/// Runs commands on the live system, blocking until they exit.
#[derive(Debug, Default)]
pub struct SystemRunner;

impl CommandRunner for SystemRunner {
    fn run(&self, program: &str, args: &[String]) -> Result<CommandOutput> {
        debug!("Calling command: {} {}", program, args.join(" "));

        let output = Command::new(program).args(args).output().map_err(|e| {
            Error::Fatal(format!(
                "Failed to execute '{}': {}. Is it installed?",
                program, e
            ))
        })?;

        let mut combined = String::from_utf8_lossy(&output.stdout).into_owned();
        combined.push_str(&String::from_utf8_lossy(&output.stderr));

        Ok(CommandOutput {
            output: combined,
            code: output.status.code().unwrap_or(-1),
        })
    }
}

/// Run a task in a forked child process and collect its result.
///
/// The child serializes its result over a pipe as JSON and its exit status
/// is what the parent trusts: a non-zero exit is an error regardless of what
/// arrived on the pipe. Used for whole-database enumeration, which installs
/// its own signal handler when run in-process.
pub fn run_as_child_process<T, F>(task: F) -> Result<T>
where
    T: Serialize + DeserializeOwned,
    F: FnOnce() -> Result<T>,
{
    let (read_fd, write_fd) =
        nix::unistd::pipe().map_err(|e| Error::Fatal(format!("Failed to create pipe: {}", e)))?;

    match unsafe { fork() } {
        Ok(ForkResult::Parent { child }) => {
            drop(write_fd);
            let mut payload = Vec::new();
            let mut reader = std::fs::File::from(read_fd);
            reader.read_to_end(&mut payload)?;

            match waitpid(child, None) {
                Ok(WaitStatus::Exited(_, 0)) => serde_json::from_slice(&payload).map_err(|e| {
                    Error::Fatal(format!("Child process result could not be decoded: {}", e))
                }),
                Ok(WaitStatus::Exited(_, code)) => Err(Error::Fatal(format!(
                    "Child process exited with status {}: {}",
                    code,
                    String::from_utf8_lossy(&payload)
                ))),
                Ok(status) => Err(Error::Fatal(format!(
                    "Child process did not exit cleanly: {:?}",
                    status
                ))),
                Err(e) => Err(Error::Fatal(format!("Failed to wait for child: {}", e))),
            }
        }
        Ok(ForkResult::Child) => {
            drop(read_fd);
            let mut writer = std::fs::File::from(write_fd);
            let code = match task() {
                Ok(value) => match serde_json::to_writer(&mut writer, &value) {
                    Ok(()) => 0,
                    Err(_) => 70,
                },
                Err(err) => {
                    let _ = write!(writer, "{}", err);
                    1
                }
            };
            let _ = writer.flush();
            std::process::exit(code);
        }
        Err(e) => Err(Error::Fatal(format!("Fork failed: {}", e))),
    }
}

/// Scripted command runner for tests.
#[cfg(test)]
pub mod testing {
    use super::{CommandOutput, CommandRunner};
    use crate::error::Result;
    use std::cell::RefCell;

    struct Rule {
        tokens: Vec<String>,
        code: i32,
        output: String,
    }

    /// Replays canned outputs for matching invocations and records every
    /// call for later assertions. A rule matches when each of its tokens is
    /// a substring of some element of the full argv (program included).
    /// Unmatched invocations succeed with empty output.
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
                .filter(|argv| {
                    tokens
                        .iter()
                        .all(|t| argv.iter().any(|a| a.contains(t)))
                })
                .count()
        }
    }

    impl CommandRunner for ScriptedRunner {
        fn run(&self, program: &str, args: &[String]) -> Result<CommandOutput> {
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
}
