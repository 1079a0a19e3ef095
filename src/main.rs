//! jamctl - command-line front end for jam

mod cli;

use cli::{Cli, Commands};
use jam::export::{self, Codec};
use jam::jail::{LifecycleController, compiler};
use jam::manifest::{self, Settings};
use jam::process::SystemRunner;
use jam::provision::{self, Installer};
use jam::registry::Registry;
use jam::{Error, Result};

use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;
use tracing_subscriber::EnvFilter;

fn main() {
    if let Err(e) = run() {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn run() -> Result<()> {
    let cli = Cli::parse_args();
    init_logging(cli.verbose);

    // Commands that don't require settings
    match &cli.command {
        Commands::Completion { shell } => {
            Cli::generate_completion(*shell);
            return Ok(());
        }
        Commands::Install {
            print_script: true,
            ..
        } => {
            println!("{}", provision::INSTALL_SCRIPT);
            return Ok(());
        }
        _ => {}
    }

    let (settings_path, explicit) = cli.settings_path();
    let settings = manifest::load_or_default(&settings_path, explicit)?;
    settings.ensure_dirs()?;

    let controller = LifecycleController::new(SystemRunner::new())
        .jail_bin(&settings.jail_bin)
        .jls_bin(&settings.jls_bin);
    let mut registry = Registry::load(&settings.registry)?;

    match cli.command {
        Commands::Create { file } => {
            let opts = manifest::load_jail(&file, &settings)?;
            if registry.contains(&opts.name) {
                return Err(Error::JailExists(opts.name));
            }
            let jail = controller.create(opts)?;
            println!(
                "Created jail '{}' ({})",
                jail.name,
                jail.config_path().display()
            );
            registry.insert(jail)?;
            registry.save()?;
        }

        Commands::Start { name } => {
            let jail = registry.get_mut(&name)?;
            let jid = controller.start(jail, &settings.context())?;
            registry.save()?;
            println!("Started jail '{}' (JID {})", name, jid);
        }

        Commands::Stop { name } => {
            let jail = registry.get_mut(&name)?;
            controller.stop(jail, &settings.context())?;
            registry.save()?;
            println!("Stopped jail '{}'", name);
        }

        Commands::List { json, registered } => {
            if registered {
                list_registered(&registry, json)?;
            } else {
                list(&controller, &settings, json)?;
            }
        }

        Commands::Show { name } => {
            let jail = registry.get(&name)?;
            println!("Name:    {}", jail.name);
            println!("State:   {}", jail.state);
            println!(
                "JID:     {}",
                jail.id.map(|id| id.to_string()).unwrap_or_else(|| "-".into())
            );
            println!("Created: {}", jail.created_at.to_rfc3339());
            println!("Path:    {}", jail.config.path.display());
            println!("Config:  {}", jail.config_path().display());
            println!();
            println!("{}", compiler::compile(&jail.config)?);
        }

        Commands::Install { name, .. } => {
            let name = name.ok_or_else(|| Error::ConfigValidation("jail name required".into()))?;
            let jail = registry.get(&name)?;
            let runner = SystemRunner::new();
            Installer::new(&runner)
                .bin(&settings.installer_bin)
                .install(&jail.config.path, &settings.context())
                .map_err(|e| e.in_jail(&name, "install"))?;
            println!("Installed base system into {}", jail.config.path.display());
        }

        Commands::Snapshot {
            name,
            output,
            codec,
        } => {
            let jail = registry.get(&name)?;
            let codec = resolve_codec(codec, &output);
            let file = File::create(&output).map_err(|e| Error::ConfigWrite {
                path: output.clone(),
                source: e,
            })?;
            let mut writer = export::snapshot(&jail.config.path, codec, BufWriter::new(file))
                .map_err(|e| e.in_jail(&name, "snapshot"))?;
            writer.flush()?;
            println!("Snapshot of '{}' written to {} ({})", name, output.display(), codec);
        }

        Commands::Restore { name, input, codec } => {
            let jail = registry.get(&name)?;
            if jail.is_running() {
                return Err(Error::InvalidState {
                    name,
                    state: jail.state.to_string(),
                    operation: "restore".into(),
                });
            }
            let codec = resolve_codec(codec, &input);
            let file = File::open(&input).map_err(|e| Error::ConfigRead {
                path: input.clone(),
                source: e,
            })?;
            let entries = export::restore(codec, BufReader::new(file), &jail.config.path)
                .map_err(|e| e.in_jail(&name, "restore"))?;
            println!(
                "Restored {} entries into {}",
                entries,
                jail.config.path.display()
            );
        }

        // Already handled above
        Commands::Completion { .. } => unreachable!(),
    }

    Ok(())
}

fn resolve_codec(codec: Option<Codec>, path: &Path) -> Codec {
    codec
        .or_else(|| Codec::from_path(path))
        .unwrap_or_default()
}

fn list_registered(registry: &Registry, json: bool) -> Result<()> {
    let jails: Vec<_> = registry.jails().collect();

    if json {
        println!("{}", serde_json::to_string_pretty(&jails)?);
        return Ok(());
    }

    println!("{:<20} {:<10} {:<6} PATH", "NAME", "STATE", "JID");
    println!("{}", "-".repeat(60));
    for jail in jails {
        println!(
            "{:<20} {:<10} {:<6} {}",
            jail.name,
            jail.state.to_string(),
            jail.id.map(|id| id.to_string()).unwrap_or_default(),
            jail.config.path.display()
        );
    }
    Ok(())
}

fn list(
    controller: &LifecycleController<SystemRunner>,
    settings: &Settings,
    json: bool,
) -> Result<()> {
    let listing = controller.list(&settings.context())?;

    if json {
        println!("{}", serde_json::to_string_pretty(&listing.jails)?);
    } else {
        println!("{:<6} {:<20} {:<18} PATH", "JID", "NAME", "IP4");
        println!("{}", "-".repeat(60));
        for jail in &listing.jails {
            println!(
                "{:<6} {:<20} {:<18} {}",
                jail.id,
                jail.name,
                jail.ipv4.as_deref().unwrap_or("-"),
                jail.path.display()
            );
        }
    }

    for err in &listing.errors {
        eprintln!("Warning: {}", err);
    }

    Ok(())
}
