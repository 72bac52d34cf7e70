//! Command-line surface: `serve` (default), `doctor`, `config validate`/`show`
//! (teacher's `sa_gateway::cli` pattern, trimmed to this server's needs).

use clap::{Parser, Subcommand};

use maestro_domain::config::{Config, ConfigSeverity};

/// Maestro — an agent-orchestration core server.
#[derive(Debug, Parser)]
#[command(name = "maestro", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Start the gateway server (default when no subcommand is given).
    Serve,
    /// Run diagnostic checks against the current configuration.
    Doctor,
    /// Configuration utilities.
    #[command(subcommand)]
    Config(ConfigCommand),
}

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Parse the config file and report any errors.
    Validate,
    /// Dump the resolved configuration (with defaults) as TOML.
    Show,
}

/// Load the configuration from the path specified by `MAESTRO_CONFIG` (or
/// `config.toml` by default). Returns the parsed [`Config`] and the path
/// that was used. Shared by `serve`, `doctor`, and `config` subcommands.
pub fn load_config() -> anyhow::Result<(Config, String)> {
    let config_path = std::env::var("MAESTRO_CONFIG").unwrap_or_else(|_| "config.toml".into());

    let config = if std::path::Path::new(&config_path).exists() {
        let raw = std::fs::read_to_string(&config_path)
            .map_err(|e| anyhow::anyhow!("reading {config_path}: {e}"))?;
        toml::from_str(&raw).map_err(|e| anyhow::anyhow!("parsing {config_path}: {e}"))?
    } else {
        Config::default()
    };

    Ok((config, config_path))
}

pub mod config {
    use super::{Config, ConfigSeverity};

    /// Parse and validate the config, printing any issues.
    ///
    /// Returns `true` when no errors were found (warnings are tolerated).
    pub fn validate(config: &Config, config_path: &str) -> bool {
        let issues = config.validate();

        if issues.is_empty() {
            println!("Config OK ({config_path})");
            return true;
        }

        let error_count = issues
            .iter()
            .filter(|i| i.severity == ConfigSeverity::Error)
            .count();
        let warning_count = issues.len() - error_count;

        for issue in &issues {
            println!("{issue}");
        }

        println!("\n{error_count} error(s), {warning_count} warning(s) in {config_path}");

        error_count == 0
    }

    /// Dump the resolved config (with all defaults filled in) as TOML.
    pub fn show(config: &Config) {
        match toml::to_string_pretty(config) {
            Ok(output) => print!("{output}"),
            Err(e) => {
                eprintln!("Failed to serialize config: {e}");
                std::process::exit(1);
            }
        }
    }
}

pub mod doctor {
    use super::{Config, ConfigSeverity};

    /// Run all diagnostic checks and print a summary.
    pub fn run(config: &Config, config_path: &str) -> bool {
        println!("maestro doctor");
        println!("==============\n");

        let mut all_passed = true;

        check_config_file(config_path, &mut all_passed);
        check_config_validation(config, &mut all_passed);
        check_workspace(config, &mut all_passed);

        println!();
        if all_passed {
            println!("All checks passed.");
        } else {
            println!("Some checks failed. Review the output above.");
        }

        all_passed
    }

    fn check_config_file(config_path: &str, all_passed: &mut bool) {
        let exists = std::path::Path::new(config_path).exists();
        print_check(
            "Config file exists",
            exists,
            if exists {
                config_path.to_owned()
            } else {
                format!("{config_path} not found (using defaults)")
            },
        );
        if !exists {
            *all_passed = false;
        }
    }

    fn check_config_validation(config: &Config, all_passed: &mut bool) {
        let issues = config.validate();
        let error_count = issues
            .iter()
            .filter(|i| i.severity == ConfigSeverity::Error)
            .count();

        if issues.is_empty() {
            print_check("Config validation", true, "no issues".into());
        } else {
            print_check(
                "Config validation",
                error_count == 0,
                format!("{} issue(s) ({error_count} error(s))", issues.len()),
            );
            for issue in &issues {
                println!("      {issue}");
            }
            if error_count > 0 {
                *all_passed = false;
            }
        }
    }

    fn check_workspace(config: &Config, all_passed: &mut bool) {
        let path = &config.workspace.data_path;
        let exists = path.exists();
        let writable = if exists {
            let probe = path.join(".maestro_doctor_probe");
            let w = std::fs::write(&probe, b"probe").is_ok();
            let _ = std::fs::remove_file(&probe);
            w
        } else {
            std::fs::create_dir_all(path).is_ok()
        };

        let ok = writable;
        let detail = match (exists, writable) {
            (true, true) => format!("{} (writable)", path.display()),
            (true, false) => format!("{} (not writable)", path.display()),
            (false, true) => format!("{} (created)", path.display()),
            (false, false) => format!("{} (cannot create)", path.display()),
        };

        print_check("Workspace directory", ok, detail);

        if !ok {
            *all_passed = false;
        }
    }

    fn print_check(name: &str, passed: bool, detail: String) {
        let status = if passed { "PASS" } else { "FAIL" };
        println!("  [{status}] {name}: {detail}");
    }
}
