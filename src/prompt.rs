// src/prompt.rs

//! Operator confirmation prompts
//!
//! The one genuinely irreversible step in a conversion (forced kernel
//! replacement) and the version-lock wipe are gated behind an explicit
//! confirmation. `--assume-yes` answers for unattended runs.

use crate::config::ConversionContext;
use crate::error::{Error, Result};
use std::io::{self, BufRead, Write};

/// Ask the operator whether to continue; declining stops the conversion.
pub fn ask_to_continue(ctx: &ConversionContext) -> Result<()> {
    if ctx.options.assume_yes {
        return Ok(());
    }

    let stdin = io::stdin();
    let mut line = String::new();
    loop {
        print!("\nContinue with the conversion? [y/n] ");
        io::stdout().flush()?;

        line.clear();
        if stdin.lock().read_line(&mut line)? == 0 {
            // End of input counts as a refusal; never plough on blind.
            return Err(Error::Fatal("Conversion interrupted by the operator".to_string()));
        }
        match line.trim().to_lowercase().as_str() {
            "y" | "yes" => return Ok(()),
            "n" | "no" => {
                return Err(Error::Fatal(
                    "Conversion interrupted by the operator".to_string(),
                ));
            }
            _ => continue,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ConversionConfig, Paths, ToolOptions};
    use crate::manager::BackendKind;

    #[test]
    fn test_assume_yes_skips_prompt() {
        let options = ToolOptions {
            assume_yes: true,
            ..ToolOptions::default()
        };
        let ctx = ConversionContext::new(
            ConversionConfig::default(),
            options,
            "8.5".parse().unwrap(),
            "x86_64".to_string(),
            BackendKind::Dnf,
            Paths::default(),
        );
        ask_to_continue(&ctx).unwrap();
    }
}
