//! Config subcommand handlers.

use bridgewatch_config::Config;
use bridgewatch_core::ConfigStore;

use crate::cli::{ConfigArgs, ConfigCommand, GlobalOpts};
use crate::config;
use crate::error::CliError;
use crate::output;

pub fn handle(args: ConfigArgs, global: &GlobalOpts) -> Result<(), CliError> {
    match args.command {
        ConfigCommand::Init { force } => {
            let path = config::config_file(global);
            if path.exists() && !force {
                return Err(CliError::ConfigExists {
                    path: path.display().to_string(),
                });
            }

            let mut cfg = Config::default();
            if let Some(ref devices) = global.devices_config {
                cfg.devices_config.clone_from(devices);
            }
            if let Some(ref adb) = global.adb {
                cfg.adb_program.clone_from(adb);
            }
            bridgewatch_config::save_config_to(&cfg, &path)?;

            let existed = cfg.devices_config.exists();
            let declared = ConfigStore::open(&cfg.devices_config).load()?;

            if !global.quiet {
                eprintln!("Wrote {}", path.display());
                if existed {
                    eprintln!(
                        "Using {} ({declared} declared devices)",
                        cfg.devices_config.display()
                    );
                } else {
                    eprintln!("Created {}", cfg.devices_config.display());
                }
            }
            Ok(())
        }

        ConfigCommand::Show => {
            let cfg = config::load(global)?;
            let text = format!(
                "# {}\n{}",
                config::config_file(global).display(),
                toml::to_string_pretty(&cfg)?
            );
            output::print_output(text.trim_end(), global.quiet);
            Ok(())
        }

        ConfigCommand::Path => {
            output::print_output(&config::config_file(global).display().to_string(), global.quiet);
            Ok(())
        }
    }
}
