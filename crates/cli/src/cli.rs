use crate::tracing::{LogLevel, TracingFormat};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "pipewright")]
#[command(about = "Resolve and run toolchains that turn source artifacts into target formats")]
#[command(long_about = None)]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    #[arg(
        short = 'l',
        long,
        global = true,
        help = "Set logging level",
        default_value = "warn",
        value_enum
    )]
    pub level: LogLevel,

    #[arg(long, global = true, help = "Output logs and listings in JSON format")]
    pub json: bool,

    #[arg(long, global = true, help = "Path to a TOML configuration file")]
    pub config: Option<PathBuf>,

    #[arg(
        long,
        global = true,
        env = "PIPEWRIGHT_CACHE_DIR",
        help = "Directory holding installed tool packages"
    )]
    pub cache_dir: Option<PathBuf>,

    #[arg(
        short = 'u',
        long,
        global = true,
        help = "Query the registry on every lookup instead of reusing answers"
    )]
    pub update_cache: bool,
}

impl Cli {
    /// Log format selected by the global flags.
    pub const fn tracing_format(&self) -> TracingFormat {
        if self.json {
            TracingFormat::Json
        } else {
            TracingFormat::Compact
        }
    }
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    #[command(about = "Transform an input file (or stdin) into the target type")]
    Run {
        #[arg(help = "Input file; reads stdin when omitted")]
        file: Option<PathBuf>,
        #[arg(short = 't', long, help = "Target artifact type")]
        to: String,
        #[arg(short = 'd', long = "depends", help = "Tools that must run before the output")]
        depends: Vec<String>,
    },
    #[command(about = "Show the toolchain that would produce the target type")]
    ShowToolchain {
        #[arg(help = "Input file; reads stdin when neither it nor --from is given")]
        file: Option<PathBuf>,
        #[arg(short = 't', long, help = "Target artifact type")]
        to: String,
        #[arg(
            short = 'f',
            long,
            conflicts_with = "file",
            help = "Source artifact type, instead of inspecting an input"
        )]
        from: Option<String>,
        #[arg(short = 'd', long = "depends", help = "Tools that must run before the output")]
        depends: Vec<String>,
    },
    #[command(about = "List tools that accept raw input")]
    ListInputs,
    #[command(about = "List installed tool packages")]
    ListInstalled,
}

pub fn parse() -> Cli {
    Cli::parse()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_default_values() {
        let cli = Cli::try_parse_from(["pipewright", "list-inputs"]).unwrap();

        assert_eq!(cli.level, LogLevel::Warn);
        assert!(!cli.json);
        assert!(!cli.update_cache);
        assert!(cli.config.is_none());
        assert_eq!(cli.tracing_format(), TracingFormat::Compact);
        assert!(matches!(cli.command, Commands::ListInputs));
    }

    #[test]
    fn test_run_command() {
        let cli = Cli::try_parse_from([
            "pipewright",
            "run",
            "program.lisp",
            "--to",
            "svg",
            "--depends",
            "typify",
            "-d",
            "check",
        ])
        .unwrap();

        let Commands::Run { file, to, depends } = cli.command else {
            panic!("Expected Run command");
        };
        assert_eq!(file, Some(PathBuf::from("program.lisp")));
        assert_eq!(to, "svg");
        assert_eq!(depends, vec!["typify", "check"]);
    }

    #[test]
    fn test_run_reads_stdin_without_file() {
        let cli = Cli::try_parse_from(["pipewright", "run", "-t", "kgraph"]).unwrap();
        let Commands::Run { file, .. } = cli.command else {
            panic!("Expected Run command");
        };
        assert!(file.is_none());
    }

    #[test]
    fn test_run_requires_target() {
        assert!(Cli::try_parse_from(["pipewright", "run", "program.lisp"]).is_err());
    }

    #[test]
    fn test_show_toolchain_from_type() {
        let cli = Cli::try_parse_from([
            "pipewright",
            "show-toolchain",
            "--from",
            "portgraph",
            "--to",
            "svg",
        ])
        .unwrap();

        let Commands::ShowToolchain { file, to, from, .. } = cli.command else {
            panic!("Expected ShowToolchain command");
        };
        assert!(file.is_none());
        assert_eq!(to, "svg");
        assert_eq!(from.as_deref(), Some("portgraph"));
    }

    #[test]
    fn test_show_toolchain_file_conflicts_with_from() {
        let result = Cli::try_parse_from([
            "pipewright",
            "show-toolchain",
            "program.lisp",
            "--from",
            "lisgy",
            "--to",
            "svg",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn test_global_flags() {
        let cli = Cli::try_parse_from([
            "pipewright",
            "list-installed",
            "--json",
            "--level",
            "debug",
            "--cache-dir",
            "/tmp/pipewright",
            "-u",
        ])
        .unwrap();

        assert!(cli.json);
        assert!(cli.update_cache);
        assert_eq!(cli.level, LogLevel::Debug);
        assert_eq!(cli.cache_dir, Some(PathBuf::from("/tmp/pipewright")));
        assert_eq!(cli.tracing_format(), TracingFormat::Json);
        assert!(matches!(cli.command, Commands::ListInstalled));
    }

    #[test]
    fn test_invalid_log_level() {
        let result = Cli::try_parse_from(["pipewright", "--level", "invalid", "list-inputs"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_missing_subcommand() {
        assert!(Cli::try_parse_from(["pipewright"]).is_err());
    }

    #[test]
    fn test_help_flag() {
        let err = Cli::try_parse_from(["pipewright", "--help"]).unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::DisplayHelp);
    }
}
