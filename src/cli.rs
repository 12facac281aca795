use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

use crate::export::ExportFormat;

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum DumpFormat {
    Jsonl,
    Csv,
}

impl From<DumpFormat> for ExportFormat {
    fn from(value: DumpFormat) -> Self {
        match value {
            DumpFormat::Jsonl => ExportFormat::Jsonl,
            DumpFormat::Csv => ExportFormat::Csv,
        }
    }
}

#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct CliOptions {
    /// Optional path to config file (YAML)
    #[arg(long, global = true)]
    pub config_path: Option<PathBuf>,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    pub log_json: bool,

    /// Override the browser profile root directory (macOS and Windows only;
    /// ignored on other hosts)
    #[arg(long, global = true)]
    pub profile_root: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Serve GET /history over HTTP
    Serve {
        /// Address to bind (overrides config)
        #[arg(long)]
        bind: Option<String>,
    },
    /// Run one history query and write the records
    Dump {
        /// Only visits on this day (YYYY-MM-DD)
        #[arg(long)]
        date: Option<String>,

        /// Output format
        #[arg(long, value_enum, default_value_t = DumpFormat::Jsonl)]
        format: DumpFormat,

        /// Write to this file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// List discovered browser profiles
    Profiles,
}

pub fn parse() -> CliOptions {
    CliOptions::parse()
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn parses_serve_with_bind() {
        let opts = CliOptions::try_parse_from(["visitscope", "serve", "--bind", "0.0.0.0:8080"])
            .expect("parse");
        match opts.command {
            Command::Serve { bind } => assert_eq!(bind.as_deref(), Some("0.0.0.0:8080")),
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn parses_dump_options() {
        let opts = CliOptions::try_parse_from([
            "visitscope",
            "dump",
            "--date",
            "2024-05-01",
            "--format",
            "csv",
            "--log-json",
        ])
        .expect("parse");
        assert!(opts.log_json);
        match opts.command {
            Command::Dump { date, format, output } => {
                assert_eq!(date.as_deref(), Some("2024-05-01"));
                assert_eq!(format, DumpFormat::Csv);
                assert!(output.is_none());
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn profile_root_help_names_supported_hosts() {
        let command = CliOptions::command();
        let arg = command
            .get_arguments()
            .find(|a| a.get_id() == "profile_root")
            .expect("profile_root arg");
        let help = arg.get_help().map(|h| h.to_string()).unwrap_or_default();
        assert!(help.contains("macOS and Windows only"), "{help}");
    }

    #[test]
    fn global_profile_root_after_subcommand() {
        let opts = CliOptions::try_parse_from([
            "visitscope",
            "profiles",
            "--profile-root",
            "/tmp/chrome",
        ])
        .expect("parse");
        assert_eq!(opts.profile_root, Some(PathBuf::from("/tmp/chrome")));
        assert!(matches!(opts.command, Command::Profiles));
    }
}
