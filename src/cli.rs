use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "amoe", about = "Harvests AMOE verification emails and fills in the entry form")]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, default_value = "config/default.toml")]
    pub config: String,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Harvest verification emails and drive each one through the browser flow
    Run {
        /// Write every flow result and the summary to this JSON file
        #[arg(short, long)]
        report: Option<String>,
    },
    /// Poll the mailbox and print what was found, without opening a browser
    Harvest,
    /// Validate the configuration and print the effective settings
    Check,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parses_run_with_report() {
        let cli = Cli::try_parse_from(["amoe", "--config", "my.toml", "run", "--report", "out.json"])
            .unwrap();
        assert_eq!(cli.config, "my.toml");
        assert!(matches!(cli.command, Commands::Run { report: Some(ref r) } if r == "out.json"));
    }

    #[test]
    fn test_config_defaults_to_bundled_path() {
        let cli = Cli::try_parse_from(["amoe", "check"]).unwrap();
        assert_eq!(cli.config, "config/default.toml");
        assert!(matches!(cli.command, Commands::Check));
    }
}
