// src/main.rs

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use distroshift::config::{
    ConversionConfig, ConversionContext, DEFAULT_CONFIG_PATH, Paths, ReleaseVersion, ToolOptions,
};
use distroshift::exec::{CommandRunner, SystemRunner};
use distroshift::manager::BackendKind;
use std::path::PathBuf;
use tracing::{error, info};

#[derive(Parser)]
#[command(name = "distroshift")]
#[command(author, version, about = "Convert a running system to a binary-compatible distribution", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Convert this system to the target distribution
    Convert {
        /// Answer yes to every confirmation prompt
        #[arg(short = 'y', long)]
        assume_yes: bool,
        /// Disable a repository for all package-manager calls (repeatable)
        #[arg(long = "disablerepo", value_name = "REPO")]
        disable_repos: Vec<String>,
        /// Enable a repository, overriding the entitled set (repeatable)
        #[arg(long = "enablerepo", value_name = "REPO")]
        enable_repos: Vec<String>,
        /// Release version of this system, e.g. 8.5
        #[arg(long, value_name = "VERSION")]
        releasever: Option<String>,
        /// Configuration file path
        #[arg(short, long, default_value = DEFAULT_CONFIG_PATH)]
        config: PathBuf,
    },
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    if let Err(e) = run(cli) {
        error!("{:#}", e);
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Some(Commands::Convert {
            assume_yes,
            disable_repos,
            enable_repos,
            releasever,
            config,
        }) => {
            if !nix::unistd::geteuid().is_root() {
                bail!("The conversion must be run as root");
            }

            let runner = SystemRunner;
            let ctx = build_context(
                &runner,
                &config,
                assume_yes,
                disable_repos,
                enable_repos,
                releasever,
            )?;

            info!(
                "Converting {} {} ({}) using {}",
                ctx.config.system.name,
                ctx.version,
                ctx.arch,
                ctx.backend.backend().program()
            );
            distroshift::conversion::run(&ctx, &runner)?;
            Ok(())
        }
        None => {
            println!("distroshift v{}", env!("CARGO_PKG_VERSION"));
            println!("Run 'distroshift --help' for usage information");
            Ok(())
        }
    }
}

fn build_context(
    runner: &dyn CommandRunner,
    config_path: &std::path::Path,
    assume_yes: bool,
    disable_repos: Vec<String>,
    enable_repos: Vec<String>,
    releasever: Option<String>,
) -> Result<ConversionContext> {
    let mut config = ConversionConfig::load_from(config_path)
        .with_context(|| format!("Failed to load {}", config_path.display()))?;
    if releasever.is_some() {
        config.system.releasever = releasever;
    }

    let version: ReleaseVersion = config
        .system
        .releasever
        .as_deref()
        .context("No release version configured; pass --releasever or set system.releasever")?
        .parse()?;

    // Architecture as the running kernel reports it.
    let uname = runner
        .run("uname", &["-m".to_string()])
        .context("Failed to probe the machine architecture")?;
    let arch = uname.output.trim().to_string();

    let mut options = ToolOptions {
        assume_yes,
        ..ToolOptions::default()
    };
    if !disable_repos.is_empty() {
        options.disable_repos = disable_repos;
    }
    if !enable_repos.is_empty() {
        options.enable_repos = Some(enable_repos);
    }

    Ok(ConversionContext::new(
        config,
        options,
        version,
        arch,
        BackendKind::detect(),
        Paths::default(),
    ))
}
