//! Config subcommand handlers.

use crate::cli::{ConfigArgs, ConfigCommand, GlobalOpts};
use crate::config::{self, Config};
use crate::error::CliError;
use crate::output;

/// Human view of the resolved config: its origin, then the TOML itself.
fn detail(cfg: &Config, path: &str, active: &str) -> String {
    let body = toml::to_string_pretty(cfg).unwrap_or_else(|e| format!("# unrenderable: {e}\n"));
    format!("# {path}\n# active profile: {active}\n\n{}", body.trim_end())
}

pub async fn handle(args: ConfigArgs, global: &GlobalOpts) -> Result<(), CliError> {
    let path = config::config_path(global);

    match args.command {
        ConfigCommand::Path => {
            output::print_output(&path.display().to_string(), global.quiet);
            Ok(())
        }

        ConfigCommand::Show => {
            let cfg = config::load_config(global)?;
            let active = config::active_profile_name(global, &cfg);
            let display_path = path.display().to_string();
            let out = output::render_single(global.output, &cfg, |c| {
                detail(c, &display_path, &active)
            });
            output::print_output(&out, global.quiet);
            Ok(())
        }

        ConfigCommand::Init { force } => {
            if path.exists() && !force {
                return Err(CliError::ConfigExists {
                    path: path.display().to_string(),
                });
            }
            config::save_config_to(&Config::starter(), &path)?;
            tracing::info!(path = %path.display(), "wrote starter config");
            if !global.quiet {
                eprintln!("✓ Configuration written to {}", path.display());
            }
            Ok(())
        }
    }
}
