//! `fleet`: deploy, build and reboot a NixOS / nix-darwin fleet

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

mod commands;

#[derive(Parser)]
#[command(name = "fleet")]
#[command(about = "Deploy, build and reboot NixOS and nix-darwin hosts from one flake")]
#[command(version)]
struct Cli {
    /// Configuration file path (defaults apply when fleet.yaml is absent)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Flake directory, overriding `flake_path` from the configuration
    #[arg(long, global = true)]
    flake: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Copy the flake to each host and switch to its configuration
    Deploy {
        /// Comma-separated host names (empty means every host in the flake)
        #[arg(long, default_value = "")]
        hosts: String,
    },

    /// Build each host's configuration on this machine
    BuildLocal {
        /// Comma-separated host names (empty means every host in the flake)
        #[arg(long, default_value = "")]
        hosts: String,
    },

    /// Reboot hosts one at a time, waiting for each to come back
    Reboot {
        /// Comma-separated host names (empty means every host in the flake)
        #[arg(long, default_value = "")]
        hosts: String,

        /// Give up on a host after this many connection attempts
        #[arg(long)]
        max_up_attempts: Option<u64>,
    },

    /// Remove automatic GC roots and restart the garbage collector
    CleanupGcroots {
        /// Comma-separated host names (empty means every host in the flake)
        #[arg(long, default_value = "")]
        hosts: String,
    },
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();

    smol::block_on(async {
        let context = commands::Context::load(cli.config.as_deref(), cli.flake)?;

        match cli.command {
            Commands::Deploy { hosts } => commands::deploy::run(&context, &hosts).await,
            Commands::BuildLocal { hosts } => commands::build::run(&context, &hosts).await,
            Commands::Reboot {
                hosts,
                max_up_attempts,
            } => commands::reboot::run(&context, &hosts, max_up_attempts).await,
            Commands::CleanupGcroots { hosts } => commands::cleanup::run(&context, &hosts).await,
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hosts_default_to_whole_inventory() {
        let cli = Cli::try_parse_from(["fleet", "deploy"]).unwrap();
        match cli.command {
            Commands::Deploy { hosts } => assert_eq!(hosts, ""),
            _ => panic!("expected deploy"),
        }
        assert!(cli.config.is_none());
        assert!(cli.flake.is_none());
    }

    #[test]
    fn test_reboot_arguments() {
        let cli = Cli::try_parse_from([
            "fleet",
            "reboot",
            "--hosts",
            "build01,build02",
            "--max-up-attempts",
            "600",
            "--flake",
            "/srv/infra",
        ])
        .unwrap();
        match cli.command {
            Commands::Reboot {
                hosts,
                max_up_attempts,
            } => {
                assert_eq!(hosts, "build01,build02");
                assert_eq!(max_up_attempts, Some(600));
            }
            _ => panic!("expected reboot"),
        }
        assert_eq!(cli.flake, Some(PathBuf::from("/srv/infra")));
    }

    #[test]
    fn test_subcommand_names() {
        assert!(Cli::try_parse_from(["fleet", "build-local", "--hosts", "web02"]).is_ok());
        assert!(Cli::try_parse_from(["fleet", "cleanup-gcroots"]).is_ok());
        assert!(Cli::try_parse_from(["fleet", "--config", "x.yaml", "deploy"]).is_ok());
        assert!(Cli::try_parse_from(["fleet", "switch"]).is_err());
    }
}
