//! Command-line interface for jam
//!
//! Uses clap with derive for type-safe CLI parsing

use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use jam::export::Codec;
use jam::manifest::DEFAULT_SETTINGS_PATH;
use std::path::PathBuf;

/// jamctl - FreeBSD jail manager
#[derive(Parser)]
#[command(name = "jamctl")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Settings file path
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands
#[derive(Subcommand)]
pub enum Commands {
    /// Generate a jail config from a definition file and register the jail
    Create {
        /// TOML jail definition
        file: PathBuf,
    },

    /// Start a registered jail
    Start {
        /// Jail name
        name: String,
    },

    /// Stop a running jail
    Stop {
        /// Jail name
        name: String,
    },

    /// List active jails as reported by jls
    List {
        /// Output in JSON format
        #[arg(long)]
        json: bool,

        /// List registered jails and their recorded state instead
        #[arg(short, long)]
        registered: bool,
    },

    /// Show a registered jail and its generated config
    Show {
        /// Jail name
        name: String,
    },

    /// Install a base system into a jail's root
    Install {
        /// Jail name
        #[arg(required_unless_present = "print_script")]
        name: Option<String>,

        /// Print the installer script instead of running the installer
        #[arg(long)]
        print_script: bool,
    },

    /// Snapshot a jail root into an archive
    Snapshot {
        /// Jail name
        name: String,

        /// Output archive
        #[arg(short, long)]
        output: PathBuf,

        /// Compression codec (none, gzip, bzip2, xz, zstd); inferred from the file name
        #[arg(long)]
        codec: Option<Codec>,
    },

    /// Restore a jail root from an archive
    Restore {
        /// Jail name
        name: String,

        /// Input archive
        #[arg(short, long)]
        input: PathBuf,

        /// Compression codec (none, gzip, bzip2, xz, zstd); inferred from the file name
        #[arg(long)]
        codec: Option<Codec>,
    },

    /// Generate shell completions
    Completion {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

impl Cli {
    /// Parse command line arguments
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Settings file to load and whether the user asked for it explicitly
    pub fn settings_path(&self) -> (PathBuf, bool) {
        match &self.config {
            Some(path) => (path.clone(), true),
            None => (PathBuf::from(DEFAULT_SETTINGS_PATH), false),
        }
    }

    /// Generate shell completions
    pub fn generate_completion(shell: Shell) {
        clap_complete::generate(
            shell,
            &mut Cli::command(),
            "jamctl",
            &mut std::io::stdout(),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_snapshot() {
        let cli = Cli::try_parse_from([
            "jamctl", "-v", "snapshot", "web1", "-o", "/tmp/web1.tar", "--codec", "xz",
        ])
        .unwrap();

        assert!(cli.verbose);
        match cli.command {
            Commands::Snapshot { name, output, codec } => {
                assert_eq!(name, "web1");
                assert_eq!(output, PathBuf::from("/tmp/web1.tar"));
                assert_eq!(codec, Some(Codec::Xz));
            }
            _ => panic!("expected snapshot command"),
        }
    }

    #[test]
    fn test_settings_path() {
        let cli = Cli::try_parse_from(["jamctl", "list", "-r"]).unwrap();
        assert!(matches!(cli.command, Commands::List { registered: true, json: false }));
        assert_eq!(
            cli.settings_path(),
            (PathBuf::from(DEFAULT_SETTINGS_PATH), false)
        );

        let cli = Cli::try_parse_from(["jamctl", "-c", "/etc/jam.toml", "list"]).unwrap();
        assert_eq!(cli.settings_path(), (PathBuf::from("/etc/jam.toml"), true));
    }

    #[test]
    fn test_install_requires_name_or_flag() {
        assert!(Cli::try_parse_from(["jamctl", "install"]).is_err());
        assert!(Cli::try_parse_from(["jamctl", "install", "--print-script"]).is_ok());
    }
}
